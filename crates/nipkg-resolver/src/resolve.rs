use nipkg_core::{
    is_valid_package_id, Context, PackageError, PackageManifest, PackageVersion, Result,
    UnmetDependency,
};
use tracing::{debug, warn};

use crate::constraints::VersionConstraint;
use crate::types::ResolvedDependency;

/// Checks every dependency `manifest` declares against what is installed in
/// `context`.
///
/// Ids outside the host and context package namespaces are skipped; they
/// name things this host does not manage. `installed_version` returns the
/// installed version of a package, or `None` when it is not installed.
pub fn check_dependencies<F>(
    context: &Context,
    manifest: &PackageManifest,
    mut installed_version: F,
) -> Result<Vec<ResolvedDependency>>
where
    F: FnMut(&str) -> Result<Option<String>>,
{
    let mut resolved = Vec::new();
    let mut unmet = Vec::new();

    for (package_id, raw_constraint) in &manifest.dependencies {
        if !is_valid_package_id(context, package_id) {
            warn!(
                package = %manifest.id,
                dependency = %package_id,
                "ignoring dependency outside the managed package namespaces"
            );
            continue;
        }

        let constraint = VersionConstraint::parse(raw_constraint)?;
        let installed = installed_version(package_id)?;
        let satisfied = match installed.as_deref() {
            Some(version) => {
                let parsed = PackageVersion::parse(version).map_err(|_| PackageError::Store {
                    path: package_id.into(),
                    reason: format!("installed version '{version}' is not a valid version"),
                })?;
                constraint.matches(&parsed)
            }
            None => false,
        };

        match (satisfied, installed) {
            (true, Some(installed_version)) => {
                debug!(
                    package = %manifest.id,
                    dependency = %package_id,
                    %installed_version,
                    "dependency satisfied"
                );
                resolved.push(ResolvedDependency {
                    package_id: package_id.clone(),
                    constraint,
                    installed_version,
                });
            }
            (_, installed) => unmet.push(UnmetDependency {
                package_id: package_id.clone(),
                constraint: constraint.to_string(),
                installed,
            }),
        }
    }

    if !unmet.is_empty() {
        return Err(PackageError::DependencyUnsatisfied {
            package_id: manifest.id.clone(),
            unmet,
        });
    }

    Ok(resolved)
}
