use std::collections::BTreeMap;

use nipkg_core::{Context, PackageError, PackageRecord, Result};

use crate::store::{StateStore, StoreKey};

pub const INSTALLED_PRODUCTS_KEY: &str = "InstalledProducts";
pub const DEPENDENCIES_KEY: &str = "Dependencies";

/// The values of an `InstalledProducts/<package id>` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Version,
    PendingVersion,
    Disabled,
    UninstallPending,
    GalleryDetailsUrl,
    NuGetSite,
    ArchiveSha256,
}

impl RecordField {
    pub const ALL: [RecordField; 7] = [
        Self::Version,
        Self::PendingVersion,
        Self::Disabled,
        Self::UninstallPending,
        Self::GalleryDetailsUrl,
        Self::NuGetSite,
        Self::ArchiveSha256,
    ];

    /// Case-insensitive lookup of a record value name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Version => "Version",
            Self::PendingVersion => "PendingVersion",
            Self::Disabled => "Disabled",
            Self::UninstallPending => "UninstallPending",
            Self::GalleryDetailsUrl => "GalleryDetailsUrl",
            Self::NuGetSite => "NuGetSite",
            Self::ArchiveSha256 => "ArchiveSha256",
        }
    }
}

impl StateStore {
    pub fn read_record(&self, context: &Context, package_id: &str) -> Result<Option<PackageRecord>> {
        let Some(key) = self.open_record_key(context, package_id)? else {
            return Ok(None);
        };

        Ok(Some(PackageRecord {
            version: key.get_value(RecordField::Version.as_str())?,
            pending_version: key.get_value(RecordField::PendingVersion.as_str())?,
            disabled: key.get_flag(RecordField::Disabled.as_str())?,
            uninstall_pending: key.get_flag(RecordField::UninstallPending.as_str())?,
            gallery_url: key.get_value(RecordField::GalleryDetailsUrl.as_str())?,
            source_site: key.get_value(RecordField::NuGetSite.as_str())?,
            archive_sha256: key.get_value(RecordField::ArchiveSha256.as_str())?,
        }))
    }

    pub fn write_field(
        &self,
        context: &Context,
        package_id: &str,
        field: RecordField,
        value: &str,
    ) -> Result<()> {
        self.create_record_key(context, package_id)?
            .set_value(field.as_str(), value)
    }

    /// Flags are written as `1`; clearing one removes the value, matching how
    /// an absent flag reads.
    pub fn write_flag(
        &self,
        context: &Context,
        package_id: &str,
        field: RecordField,
        value: bool,
    ) -> Result<()> {
        if value {
            self.write_field(context, package_id, field, "1")
        } else {
            self.clear_field(context, package_id, field)
        }
    }

    pub fn clear_field(&self, context: &Context, package_id: &str, field: RecordField) -> Result<()> {
        if let Some(key) = self.open_record_key(context, package_id)? {
            key.delete_value(field.as_str())?;
        }
        Ok(())
    }

    pub fn delete_record(&self, context: &Context, package_id: &str) -> Result<()> {
        let installed = self.installed_products(context)?;
        installed.delete_subkey_tree(&single_segment(package_id)?)?;
        Ok(())
    }

    /// Sorted ids of every package with a record in `context`.
    pub fn list_package_ids(&self, context: &Context) -> Result<Vec<String>> {
        let root = self.require_context(context)?;
        match root.open_subkey(INSTALLED_PRODUCTS_KEY)? {
            Some(installed) => installed.subkey_names(),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the recorded dependency set of a package.
    pub fn write_dependencies(
        &self,
        context: &Context,
        package_id: &str,
        dependencies: &BTreeMap<String, String>,
    ) -> Result<()> {
        let record = self.create_record_key(context, package_id)?;
        record.delete_subkey_tree(DEPENDENCIES_KEY)?;
        if dependencies.is_empty() {
            return Ok(());
        }
        let key = record.create_subkey(DEPENDENCIES_KEY)?;
        for (dependency, constraint) in dependencies {
            key.set_value(dependency, constraint)?;
        }
        Ok(())
    }

    pub fn read_dependencies(
        &self,
        context: &Context,
        package_id: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut dependencies = BTreeMap::new();
        let Some(record) = self.open_record_key(context, package_id)? else {
            return Ok(dependencies);
        };
        let Some(key) = record.open_subkey(DEPENDENCIES_KEY)? else {
            return Ok(dependencies);
        };
        for name in key.value_names()? {
            if let Some(constraint) = key.get_value(&name)? {
                dependencies.insert(name, constraint);
            }
        }
        Ok(dependencies)
    }

    fn installed_products(&self, context: &Context) -> Result<StoreKey> {
        self.require_context(context)?
            .create_subkey(INSTALLED_PRODUCTS_KEY)
    }

    fn open_record_key(&self, context: &Context, package_id: &str) -> Result<Option<StoreKey>> {
        let root = self.require_context(context)?;
        match root.open_subkey(INSTALLED_PRODUCTS_KEY)? {
            Some(installed) => installed.open_subkey(&single_segment(package_id)?),
            None => Ok(None),
        }
    }

    fn create_record_key(&self, context: &Context, package_id: &str) -> Result<StoreKey> {
        self.installed_products(context)?
            .create_subkey(&single_segment(package_id)?)
    }
}

/// Version installed for `package_id`, for dependency resolution. A missing
/// context or record reads as "not installed", never as an error.
pub fn installed_version(
    store: &StateStore,
    context: &Context,
    package_id: &str,
) -> Result<Option<String>> {
    match store.read_record(context, package_id) {
        Ok(record) => Ok(record.and_then(|record| record.version)),
        Err(PackageError::ContextDoesNotExist { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn single_segment(package_id: &str) -> Result<String> {
    if package_id.contains(['/', '\\']) {
        return Err(PackageError::Store {
            path: INSTALLED_PRODUCTS_KEY.into(),
            reason: format!("package id '{package_id}' must not contain key separators"),
        });
    }
    Ok(package_id.to_string())
}
