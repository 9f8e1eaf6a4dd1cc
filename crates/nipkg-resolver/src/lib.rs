mod constraints;
mod order;
mod resolve;
mod types;

pub use constraints::VersionConstraint;
pub use order::install_order;
pub use resolve::check_dependencies;
pub use types::ResolvedDependency;

#[cfg(test)]
mod tests;
