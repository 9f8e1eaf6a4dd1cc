mod layout;
mod record;
mod registry;
mod store;

pub use layout::StoreLayout;
pub use record::{installed_version, RecordField, DEPENDENCIES_KEY, INSTALLED_PRODUCTS_KEY};
pub use registry::{load_package_manifest, PackageMetadata, PackageRegistry, QueuedUpdate};
pub use store::{StateStore, StoreKey};

#[cfg(test)]
mod tests;
