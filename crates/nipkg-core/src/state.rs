use std::fmt;

use serde::Serialize;

use crate::context::Context;
use crate::package_id::{is_context_core_package, is_system_package};

bitflags::bitflags! {
    /// Lifecycle flags of a package in one context. Only `DISABLED` and
    /// `UNINSTALL_PENDING` are ever persisted; everything else is derived.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct PackageState: u8 {
        const CORE_PACKAGE = 1 << 0;
        const SYSTEM_PACKAGE = 1 << 1;
        const INSTALLED = 1 << 2;
        const DISABLED = 1 << 3;
        const UPDATE_PENDING = 1 << 4;
        const UNINSTALL_PENDING = 1 << 5;
        const INSTALL_PENDING = 1 << 6;
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        bitflags::parser::to_writer(self, f)
    }
}

/// Raw per-package values held by the state store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRecord {
    pub version: Option<String>,
    pub pending_version: Option<String>,
    pub disabled: bool,
    pub uninstall_pending: bool,
    pub gallery_url: Option<String>,
    pub source_site: Option<String>,
    pub archive_sha256: Option<String>,
}

pub fn derive_state(
    context: &Context,
    package_id: &str,
    record: Option<&PackageRecord>,
) -> PackageState {
    let mut state = PackageState::empty();

    if is_system_package(package_id) {
        state |= PackageState::CORE_PACKAGE | PackageState::SYSTEM_PACKAGE;
    }
    if is_context_core_package(package_id, context) {
        state |= PackageState::CORE_PACKAGE;
    }

    let Some(record) = record else {
        return state;
    };

    // A queued uninstall masks whatever install or update state is left
    // in the record.
    if record.uninstall_pending {
        return state | PackageState::UNINSTALL_PENDING;
    }

    if record.version.is_some() {
        state |= PackageState::INSTALLED;
        if record.disabled {
            state |= PackageState::DISABLED;
        }
        if record.pending_version.is_some() {
            state |= PackageState::UPDATE_PENDING;
        }
    } else {
        state |= PackageState::UPDATE_PENDING | PackageState::INSTALL_PENDING;
    }

    state
}
