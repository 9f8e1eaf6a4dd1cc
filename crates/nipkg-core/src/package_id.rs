use crate::context::Context;
use crate::error::{PackageError, Result};

/// Namespace shared by packages that ship with the host itself.
pub const PACKAGE_NAMESPACE: &str = "NetIde.Package.";
pub const CORE_PACKAGE_ID: &str = "NetIde.Package.Core";
pub const RUNTIME_PACKAGE_ID: &str = "NetIde.Runtime";

const CORE_SUFFIX: &str = ".Package.Core";

pub fn is_valid_package_id(context: &Context, package_id: &str) -> bool {
    starts_with_ignore_case(package_id, PACKAGE_NAMESPACE)
        || starts_with_ignore_case(package_id, &context.package_namespace())
}

/// Like [`is_valid_package_id`], but also rejects ids that cannot be used
/// as a directory or store key name.
pub fn check_package_id(context: &Context, package_id: &str) -> Result<()> {
    let path_safe = !package_id.contains(['/', '\\', '\0']) && !package_id.contains("..");
    if path_safe && is_valid_package_id(context, package_id) {
        return Ok(());
    }

    Err(PackageError::InvalidPackageId {
        context: context.name().to_string(),
        package_id: package_id.to_string(),
    })
}

/// True for the core package of any context.
pub fn is_core_package(package_id: &str) -> bool {
    ends_with_ignore_case(package_id, CORE_SUFFIX)
}

pub fn is_context_core_package(package_id: &str, context: &Context) -> bool {
    package_id.eq_ignore_ascii_case(&context.core_package_id())
}

/// The runtime and the host core package are system packages in every
/// context.
pub fn is_system_package(package_id: &str) -> bool {
    package_id.eq_ignore_ascii_case(RUNTIME_PACKAGE_ID)
        || package_id.eq_ignore_ascii_case(CORE_PACKAGE_ID)
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    value.len() >= suffix.len()
        && value.as_bytes()[value.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}
