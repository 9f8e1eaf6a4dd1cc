mod context;
mod error;
mod manifest;
mod package_id;
mod state;
mod version;

pub use context::Context;
pub use error::{ErrorKind, PackageError, Result, UnmetDependency};
pub use manifest::{is_manifest_file_name, EntryPointSpec, PackageManifest, MANIFEST_EXTENSION};
pub use package_id::{
    check_package_id, is_context_core_package, is_core_package, is_system_package,
    is_valid_package_id, CORE_PACKAGE_ID, PACKAGE_NAMESPACE, RUNTIME_PACKAGE_ID,
};
pub use state::{derive_state, PackageRecord, PackageState};
pub use version::PackageVersion;

#[cfg(test)]
mod tests;
