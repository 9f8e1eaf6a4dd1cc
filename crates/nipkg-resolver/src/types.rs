use crate::constraints::VersionConstraint;

/// A declared dependency that is installed at a satisfying version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub package_id: String,
    pub constraint: VersionConstraint,
    pub installed_version: String,
}
