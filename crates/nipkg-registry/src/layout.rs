use std::path::{Path, PathBuf};

use nipkg_core::Context;

const PACKAGES_DIR: &str = "Packages";
const STAGING_DIR: &str = "Staging";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contexts_dir(&self) -> PathBuf {
        self.root.join("contexts")
    }

    pub fn context_root(&self, context: &Context) -> PathBuf {
        self.contexts_dir().join(context.storage_key())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("nipkg.toml")
    }

    pub fn packages_dir(installation_path: &Path) -> PathBuf {
        installation_path.join(PACKAGES_DIR)
    }

    pub fn package_dir(installation_path: &Path, package_id: &str) -> PathBuf {
        Self::packages_dir(installation_path).join(package_id)
    }

    pub fn staging_dir(installation_path: &Path) -> PathBuf {
        installation_path.join(STAGING_DIR)
    }
}
