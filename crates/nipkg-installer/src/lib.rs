mod archive;
mod fs_utils;
mod isolation;
mod manager;
mod operations;
mod registration;

pub use archive::{extract_package, read_archive_manifest, CONTENT_PREFIX};
pub use isolation::{
    BoundaryEnvironment, EntryPointFactory, IsolationBoundary, ModuleLoader, PackageEntryPoint,
    PackageModule, StaticModuleLoader,
};
pub use manager::{BatchEntry, PackageManager, PendingUninstall};
pub use nipkg_core::is_valid_package_id;
pub use nipkg_registry::installed_version as get_installed_version;
pub use operations::{
    EnableOperation, InstallOperation, InstallOutcome, PackageOperation, UninstallOperation,
    UninstallOutcome, UpdateOperation,
};
pub use registration::{RegistrationChange, RegistrationContext};
