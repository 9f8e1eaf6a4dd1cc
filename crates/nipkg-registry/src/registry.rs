use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nipkg_core::{
    check_package_id, derive_state, is_manifest_file_name, Context, PackageError,
    PackageManifest, PackageState, Result,
};
use serde::Serialize;
use tracing::info;

use crate::layout::StoreLayout;
use crate::record::RecordField;
use crate::store::StateStore;

/// Everything known about an installed package: what its manifest declares
/// merged with what the state store records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMetadata {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub dependencies: BTreeMap<String, String>,
    pub version: Option<String>,
    pub pending_version: Option<String>,
    pub state: PackageState,
    pub gallery_details_url: Option<String>,
    pub nuget_site: Option<String>,
}

/// An update announced by a feed, waiting for its archive to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUpdate {
    pub package_id: String,
    pub version: String,
    pub gallery_details_url: Option<String>,
    pub nuget_site: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PackageRegistry {
    store: StateStore,
}

impl PackageRegistry {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn packages_dir(&self, context: &Context) -> Result<PathBuf> {
        Ok(StoreLayout::packages_dir(
            &self.store.installation_path(context)?,
        ))
    }

    pub fn package_dir(&self, context: &Context, package_id: &str) -> Result<PathBuf> {
        Ok(self.packages_dir(context)?.join(package_id))
    }

    /// Installed packages of `context`, sorted by id. Records that do not
    /// derive to `INSTALLED` (queued installs, pending uninstalls) are left
    /// out.
    pub fn list_installed(&self, context: &Context) -> Result<Vec<PackageMetadata>> {
        let packages_dir = self.packages_dir(context)?;
        let mut packages = Vec::new();

        for package_id in self.store.list_package_ids(context)? {
            let record = self.store.read_record(context, &package_id)?;
            let state = derive_state(context, &package_id, record.as_ref());
            let Some(record) = record else {
                continue;
            };
            if !state.contains(PackageState::INSTALLED) {
                continue;
            }

            let manifest = load_package_manifest(&packages_dir.join(&package_id))?;
            packages.push(PackageMetadata {
                id: package_id,
                title: manifest.title,
                description: manifest.description,
                authors: manifest.authors,
                dependencies: manifest.dependencies,
                version: record.version,
                pending_version: record.pending_version,
                state,
                gallery_details_url: record.gallery_url,
                nuget_site: record.source_site,
            });
        }

        Ok(packages)
    }

    pub fn package_state(&self, context: &Context, package_id: &str) -> Result<PackageState> {
        let record = match self.store.read_record(context, package_id) {
            Ok(record) => record,
            Err(PackageError::ContextDoesNotExist { .. }) => None,
            Err(err) => return Err(err),
        };
        Ok(derive_state(context, package_id, record.as_ref()))
    }

    pub fn enable_package(&self, context: &Context, package_id: &str, enabled: bool) -> Result<()> {
        check_package_id(context, package_id)?;
        self.store
            .write_flag(context, package_id, RecordField::Disabled, !enabled)?;
        info!(context = %context, package = package_id, enabled, "package enablement changed");
        Ok(())
    }

    pub fn queue_uninstall(&self, context: &Context, package_id: &str) -> Result<()> {
        check_package_id(context, package_id)?;
        self.store
            .write_flag(context, package_id, RecordField::UninstallPending, true)?;
        info!(context = %context, package = package_id, "uninstall queued");
        Ok(())
    }

    /// Records a pending version. Queuing a package without a record yet is
    /// how a fresh install is announced.
    pub fn queue_update(&self, context: &Context, update: &QueuedUpdate) -> Result<()> {
        check_package_id(context, &update.package_id)?;
        let id = update.package_id.as_str();

        for (field, value) in [
            (RecordField::NuGetSite, update.nuget_site.as_deref()),
            (RecordField::GalleryDetailsUrl, update.gallery_details_url.as_deref()),
        ] {
            match value {
                Some(value) => self.store.write_field(context, id, field, value)?,
                None => self.store.clear_field(context, id, field)?,
            }
        }
        // Written last so the record only reads as update-pending once the
        // feed details are in place.
        self.store
            .write_field(context, id, RecordField::PendingVersion, &update.version)?;

        info!(context = %context, package = id, version = %update.version, "update queued");
        Ok(())
    }
}

/// Loads the single manifest file in an installation directory.
pub fn load_package_manifest(package_dir: &Path) -> Result<PackageManifest> {
    let entries = fs::read_dir(package_dir).map_err(|err| {
        PackageError::invalid_manifest(format!(
            "could not read package directory {}: {err}",
            package_dir.display()
        ))
    })?;

    let mut manifests = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            PackageError::io(format!("failed to read {}", package_dir.display()), err)
        })?;
        let path = entry.path();
        let is_manifest = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_manifest_file_name);
        if is_manifest {
            manifests.push(path);
        }
    }

    match manifests.as_slice() {
        [manifest] => PackageManifest::from_path(manifest),
        [] => Err(PackageError::invalid_manifest(format!(
            "no manifest found in {}",
            package_dir.display()
        ))),
        _ => Err(PackageError::invalid_manifest(format!(
            "{} manifests found in {}; expected exactly one",
            manifests.len(),
            package_dir.display()
        ))),
    }
}
