use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use nipkg_core::{is_manifest_file_name, PackageError, PackageManifest, Result};
use tracing::debug;
use zip::ZipArchive;

/// Archive entries under this prefix are package content. The prefix is
/// stripped on extraction.
pub const CONTENT_PREFIX: &str = "Tools/";

/// Extracts the content and manifest entries of a package archive into
/// `target_dir` and returns the relative paths of the files written.
///
/// Nothing is rolled back on failure; files written before the failing
/// entry stay where they are.
pub fn extract_package(archive_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>> {
    let failed = |reason: String| extraction_failed(archive_path, reason);
    let mut archive = open_archive(archive_path)?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| failed(format!("failed to read entry #{index}: {err}")))?;
        let name = entry.name().replace('\\', "/");
        let Some(relative) = entry_target(&name).map_err(failed)? else {
            debug!(entry = %name, "skipping archive entry");
            continue;
        };

        let out = target_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)
                .map_err(|err| failed(format!("failed to create {}: {err}", out.display())))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                failed(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        let mut file = File::create(&out)
            .map_err(|err| failed(format!("failed to create {}: {err}", out.display())))?;
        io::copy(&mut entry, &mut file)
            .map_err(|err| failed(format!("failed to write {}: {err}", out.display())))?;

        debug!(entry = %name, path = %out.display(), "extracted archive entry");
        extracted.push(relative);
    }

    Ok(extracted)
}

/// Reads the manifest at the archive root without extracting anything.
pub fn read_archive_manifest(archive_path: &Path) -> Result<PackageManifest> {
    let mut archive = open_archive(archive_path)?;
    let manifest_names = archive
        .file_names()
        .filter(|name| !name.contains(['/', '\\']) && is_manifest_file_name(name))
        .map(str::to_string)
        .collect::<Vec<_>>();

    let name = match manifest_names.as_slice() {
        [name] => name,
        [] => {
            return Err(PackageError::invalid_manifest(format!(
                "no manifest at the root of {}",
                archive_path.display()
            )))
        }
        _ => {
            return Err(PackageError::invalid_manifest(format!(
                "{} manifests at the root of {}; expected exactly one",
                manifest_names.len(),
                archive_path.display()
            )))
        }
    };

    let mut entry = archive.by_name(name).map_err(|err| {
        extraction_failed(archive_path, format!("failed to read {name}: {err}"))
    })?;
    let mut content = String::new();
    entry.read_to_string(&mut content).map_err(|err| {
        extraction_failed(archive_path, format!("failed to read {name}: {err}"))
    })?;
    PackageManifest::from_toml_str(&content)
}

fn open_archive(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive_path).map_err(|err| {
        extraction_failed(archive_path, format!("failed to open archive: {err}"))
    })?;
    ZipArchive::new(file).map_err(|err| {
        extraction_failed(archive_path, format!("not a readable package archive: {err}"))
    })
}

/// Maps an archive entry name (already using `/`) to its path below the
/// extraction target, or `None` when the entry is not extracted.
fn entry_target(name: &str) -> std::result::Result<Option<PathBuf>, String> {
    let relative = if let Some(content) = strip_prefix_ignore_case(name, CONTENT_PREFIX) {
        content
    } else if is_manifest_file_name(name) {
        name
    } else {
        return Ok(None);
    };

    if relative.trim_matches('/').is_empty() {
        return Ok(None);
    }
    sanitize_entry_path(relative).map(Some)
}

fn sanitize_entry_path(relative: &str) -> std::result::Result<PathBuf, String> {
    let mut cleaned = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(format!("archive entry '{relative}' escapes the target directory"));
            }
            Component::CurDir => {}
            Component::Normal(part) => cleaned.push(part),
        }
    }
    if cleaned.as_os_str().is_empty() {
        return Err(format!("archive entry '{relative}' has an empty path"));
    }
    Ok(cleaned)
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn extraction_failed(archive_path: &Path, reason: String) -> PackageError {
    PackageError::ArchiveExtractionFailed {
        archive: archive_path.to_path_buf(),
        reason,
    }
}
