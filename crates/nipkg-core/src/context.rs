use std::fmt;

use crate::error::{PackageError, Result};

const EXPERIMENTAL_SUFFIX: &str = "$Exp";

/// A named installation scope under which packages are tracked
/// independently of every other context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context {
    name: String,
    experimental: bool,
}

impl Context {
    pub fn new(name: impl Into<String>, experimental: bool) -> Result<Self> {
        let name = name.into();
        validate_context_name(&name)?;
        Ok(Self { name, experimental })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn experimental(&self) -> bool {
        self.experimental
    }

    /// Directory name of this context's root inside the state store.
    pub fn storage_key(&self) -> String {
        if self.experimental {
            format!("{}{EXPERIMENTAL_SUFFIX}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Prefix shared by every package owned by this context.
    pub fn package_namespace(&self) -> String {
        format!("{}.Package.", self.name)
    }

    pub fn core_package_id(&self) -> String {
        format!("{}.Package.Core", self.name)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.experimental {
            write!(f, "{} (experimental)", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

fn validate_context_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("name must not be empty")
    } else if name.contains(['/', '\\']) {
        Some("name must not contain path separators")
    } else if name == "." || name == ".." {
        Some("name must not be a relative path component")
    } else if name.contains('\0') {
        Some("name must not contain NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PackageError::InvalidContextName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
