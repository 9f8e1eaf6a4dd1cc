use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a fresh, uniquely named directory under `staging_root`.
pub fn create_staging_dir(staging_root: &Path, label: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(staging_root)?;
    let label = sanitize_label(label);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();

    loop {
        let sequence = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = staging_root.join(format!(
            "{label}-{}-{nanos}-{sequence}",
            std::process::id()
        ));
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Moves `staged` to `target`, replacing whatever directory is there. The
/// previous directory is restored if the move fails.
pub fn replace_dir(staged: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    if !target.exists() {
        return fs::rename(staged, target);
    }

    let backup = backup_path(target);
    fs::rename(target, &backup)?;
    if let Err(err) = fs::rename(staged, target) {
        fs::rename(&backup, target)?;
        return Err(err);
    }
    remove_dir_if_exists(&backup)?;
    Ok(())
}

fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sequence = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.previous-{}-{sequence}", std::process::id()))
}

fn sanitize_label(label: &str) -> String {
    let cleaned = label
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    if cleaned.trim_matches('.').is_empty() {
        "package".to_string()
    } else {
        cleaned
    }
}
