use std::path::{Path, PathBuf};

use nipkg_core::{check_package_id, ErrorKind, PackageError, Result};
use nipkg_registry::{load_package_manifest, RecordField, StoreLayout};
use nipkg_security::{sha256_file_hex, verify_sha256_file};
use tracing::{debug, info, warn};

use crate::archive::extract_package;
use crate::fs_utils::{create_staging_dir, remove_dir_if_exists, replace_dir};
use crate::manager::PackageManager;
use crate::registration::RegistrationContext;

/// One mutation of a context, run through [`PackageManager::run`].
pub trait PackageOperation {
    type Output;

    fn execute(&self, manager: &PackageManager) -> Result<Self::Output>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub package_id: String,
    pub version: String,
    pub previous_version: Option<String>,
    pub install_dir: PathBuf,
    pub archive_sha256: String,
    pub files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallOutcome {
    pub package_id: String,
    pub version: Option<String>,
    pub removed_files: bool,
}

/// Installs a package that has no installed version in the context yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOperation {
    archive: PathBuf,
    expected_sha256: Option<String>,
}

impl InstallOperation {
    pub fn new(archive: impl Into<PathBuf>, expected_sha256: Option<&str>) -> Self {
        Self {
            archive: archive.into(),
            expected_sha256: expected_sha256.map(str::to_string),
        }
    }
}

impl PackageOperation for InstallOperation {
    type Output = InstallOutcome;

    fn execute(&self, manager: &PackageManager) -> Result<InstallOutcome> {
        install_from_archive(
            manager,
            &self.archive,
            self.expected_sha256.as_deref(),
            InstallMode::Fresh,
        )
    }
}

/// Replaces the installed version of a package with the one in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOperation {
    package_id: String,
    archive: PathBuf,
    expected_sha256: Option<String>,
}

impl UpdateOperation {
    pub fn new(
        package_id: impl Into<String>,
        archive: impl Into<PathBuf>,
        expected_sha256: Option<&str>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            archive: archive.into(),
            expected_sha256: expected_sha256.map(str::to_string),
        }
    }
}

impl PackageOperation for UpdateOperation {
    type Output = InstallOutcome;

    fn execute(&self, manager: &PackageManager) -> Result<InstallOutcome> {
        check_package_id(manager.context(), &self.package_id)?;
        install_from_archive(
            manager,
            &self.archive,
            self.expected_sha256.as_deref(),
            InstallMode::Update {
                package_id: &self.package_id,
            },
        )
    }
}

/// Removes a package. The record is flagged uninstall-pending before
/// anything is touched, so an interrupted uninstall can be resumed.
///
/// A package that refuses to close or whose `unregister` hook fails keeps
/// its files and stays uninstall-pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallOperation {
    package_id: String,
}

impl UninstallOperation {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
        }
    }
}

impl PackageOperation for UninstallOperation {
    type Output = UninstallOutcome;

    fn execute(&self, manager: &PackageManager) -> Result<UninstallOutcome> {
        let context = manager.context();
        let store = manager.store();
        let package_id = self.package_id.as_str();
        check_package_id(context, package_id)?;

        let record = store
            .read_record(context, package_id)?
            .ok_or_else(|| not_installed(package_id))?;
        store.write_flag(context, package_id, RecordField::UninstallPending, true)?;
        info!(context = %context, package = package_id, "uninstalling package");

        let package_dir = manager.registry().package_dir(context, package_id)?;
        let removed_files = if package_dir.is_dir() {
            if let Some(unregistration) =
                unregister_for_removal(manager, package_id, &package_dir)?
            {
                unregistration.apply(store)?;
            }
            remove_dir_if_exists(&package_dir).map_err(|err| {
                PackageError::io(format!("failed to remove {}", package_dir.display()), err)
            })?
        } else {
            debug!(package = package_id, "package directory already removed");
            false
        };

        store.delete_record(context, package_id)?;
        info!(context = %context, package = package_id, "package uninstalled");

        Ok(UninstallOutcome {
            package_id: package_id.to_string(),
            version: record.version,
            removed_files,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableOperation {
    package_id: String,
    enabled: bool,
}

impl EnableOperation {
    pub fn new(package_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            package_id: package_id.into(),
            enabled,
        }
    }
}

impl PackageOperation for EnableOperation {
    type Output = ();

    fn execute(&self, manager: &PackageManager) -> Result<()> {
        check_package_id(manager.context(), &self.package_id)?;
        if manager.installed_version(&self.package_id)?.is_none() {
            return Err(not_installed(&self.package_id));
        }
        manager
            .registry()
            .enable_package(manager.context(), &self.package_id, self.enabled)
    }
}

#[derive(Debug, Clone, Copy)]
enum InstallMode<'a> {
    Fresh,
    Update { package_id: &'a str },
}

fn install_from_archive(
    manager: &PackageManager,
    archive: &Path,
    expected_sha256: Option<&str>,
    mode: InstallMode<'_>,
) -> Result<InstallOutcome> {
    let context = manager.context();
    let installation_path = manager.store().installation_path(context)?;
    let archive_sha256 = match expected_sha256 {
        Some(expected) => verify_sha256_file(archive, expected)?,
        None => sha256_file_hex(archive)?,
    };

    let label = archive
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging_root = StoreLayout::staging_dir(&installation_path);
    let staging = create_staging_dir(&staging_root, &label).map_err(|err| {
        PackageError::io(
            format!("failed to create a staging directory in {}", staging_root.display()),
            err,
        )
    })?;
    info!(
        context = %context,
        archive = %archive.display(),
        staging = %staging.display(),
        "installing package archive"
    );

    let result = stage_and_commit(
        manager,
        archive,
        &staging,
        &installation_path,
        archive_sha256,
        mode,
    );
    if let Err(err) = &result {
        if staging.exists() {
            warn!(
                staging = %staging.display(),
                error = %err,
                "install failed; staging directory left in place"
            );
        }
    }
    result
}

fn stage_and_commit(
    manager: &PackageManager,
    archive: &Path,
    staging: &Path,
    installation_path: &Path,
    archive_sha256: String,
    mode: InstallMode<'_>,
) -> Result<InstallOutcome> {
    let context = manager.context();
    let store = manager.store();

    let files = extract_package(archive, staging)?;
    let manifest = load_package_manifest(staging)?;
    let package_id = manifest.id.clone();
    check_package_id(context, &package_id)?;
    manifest.entry_point_spec()?;

    let previous_version = manager.installed_version(&package_id)?;
    match (mode, &previous_version) {
        (InstallMode::Fresh, Some(version)) => {
            return Err(PackageError::PackageAlreadyInstalled {
                package_id,
                version: version.clone(),
            });
        }
        (InstallMode::Update { package_id: expected }, _) if expected != package_id => {
            return Err(PackageError::invalid_manifest(format!(
                "archive contains '{package_id}', expected '{expected}'"
            )));
        }
        (InstallMode::Update { .. }, None) => return Err(not_installed(&package_id)),
        _ => {}
    }

    manager.check_dependencies(&manifest)?;

    let package_dir = StoreLayout::package_dir(installation_path, &package_id);
    let unregistration = if previous_version.is_some() && package_dir.is_dir() {
        Some(unregister_installed(manager, &package_id, &package_dir)?)
    } else {
        None
    };

    let boundary = manager.create_boundary(&package_id, staging, &manifest)?;
    let registration = boundary.register(RegistrationContext::new(context.clone(), &package_id))?;
    boundary.unload();

    replace_dir(staging, &package_dir).map_err(|err| {
        PackageError::io(
            format!(
                "failed to move {} into {}",
                staging.display(),
                package_dir.display()
            ),
            err,
        )
    })?;

    if let Some(unregistration) = &unregistration {
        unregistration.apply(store)?;
    }
    registration.apply(store)?;
    store.write_dependencies(context, &package_id, &manifest.dependencies)?;
    store.write_field(context, &package_id, RecordField::ArchiveSha256, &archive_sha256)?;
    store.write_field(context, &package_id, RecordField::Version, &manifest.version)?;
    store.clear_field(context, &package_id, RecordField::PendingVersion)?;

    info!(
        context = %context,
        package = %package_id,
        version = %manifest.version,
        previous = previous_version.as_deref().unwrap_or("none"),
        "package installed"
    );

    Ok(InstallOutcome {
        package_id,
        version: manifest.version,
        previous_version,
        install_dir: package_dir,
        archive_sha256,
        files: files.len(),
    })
}

/// Asks the installed entry point of a package to let go and to unregister.
/// The returned changes have not been applied yet.
fn unregister_installed(
    manager: &PackageManager,
    package_id: &str,
    package_dir: &Path,
) -> Result<RegistrationContext> {
    let manifest = load_package_manifest(package_dir)?;
    let boundary = manager.create_boundary(package_id, package_dir, &manifest)?;
    if !boundary.query_close()? {
        return Err(PackageError::RegistrationFailed {
            package_id: package_id.to_string(),
            reason: "package refused to close".to_string(),
        });
    }
    let unregistration =
        boundary.unregister(RegistrationContext::new(manager.context().clone(), package_id))?;
    boundary.unload();
    Ok(unregistration)
}

/// Like [`unregister_installed`], but a package whose code can no longer be
/// loaded is removed without its `unregister` hook. Keys it registered
/// under `Packages/` stay behind.
fn unregister_for_removal(
    manager: &PackageManager,
    package_id: &str,
    package_dir: &Path,
) -> Result<Option<RegistrationContext>> {
    match unregister_installed(manager, package_id, package_dir) {
        Ok(unregistration) => Ok(Some(unregistration)),
        Err(err) if is_unloadable(&err) => {
            warn!(
                package = package_id,
                error = %err,
                "installed package cannot be loaded; removing it without unregistering"
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn is_unloadable(err: &PackageError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IsolationBoundaryCreationFailed
            | ErrorKind::InvalidManifest
            | ErrorKind::InvalidEntryPoint
    )
}

fn not_installed(package_id: &str) -> PackageError {
    PackageError::PackageNotInstalled {
        package_id: package_id.to_string(),
    }
}
