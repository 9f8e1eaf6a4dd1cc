use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PackageError, Result};
use crate::version::PackageVersion;

/// Extension of the manifest file that sits at the root of every package
/// archive and installation directory.
pub const MANIFEST_EXTENSION: &str = "nispec";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageManifest {
    pub id: String,
    pub version: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub entry_point: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(input)
            .map_err(|err| PackageError::invalid_manifest(format!("failed to parse: {err}")))?;

        if manifest.id.trim().is_empty() {
            return Err(PackageError::invalid_manifest("package id must not be empty"));
        }
        if manifest.entry_point.trim().is_empty() {
            return Err(PackageError::invalid_manifest(format!(
                "package '{}' declares no entry point",
                manifest.id
            )));
        }
        manifest.parsed_version()?;
        for (dependency, constraint) in &manifest.dependencies {
            if constraint.trim().is_empty() {
                return Err(PackageError::invalid_manifest(format!(
                    "dependency '{dependency}' of '{}' has an empty version constraint",
                    manifest.id
                )));
            }
        }

        Ok(manifest)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            PackageError::io(format!("failed to read manifest {}", path.display()), err)
        })?;
        Self::from_toml_str(&content)
    }

    pub fn parsed_version(&self) -> Result<PackageVersion> {
        PackageVersion::parse(&self.version)
    }

    pub fn entry_point_spec(&self) -> Result<EntryPointSpec> {
        EntryPointSpec::parse(&self.entry_point)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

pub fn is_manifest_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MANIFEST_EXTENSION))
}

/// The `"TypeName, ModuleName"` pair naming the type a package exposes as
/// its entry point and the module that provides it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPointSpec {
    pub type_name: String,
    pub module_name: String,
}

impl EntryPointSpec {
    /// Splits on the first comma; everything after it names the module.
    pub fn parse(entry_point: &str) -> Result<Self> {
        let invalid = || PackageError::InvalidEntryPoint {
            entry_point: entry_point.to_string(),
        };

        let (type_name, module_name) = entry_point.split_once(',').ok_or_else(invalid)?;
        let type_name = type_name.trim();
        let module_name = module_name.trim();
        if type_name.is_empty() || module_name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            type_name: type_name.to_string(),
            module_name: module_name.to_string(),
        })
    }
}

impl FromStr for EntryPointSpec {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for EntryPointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.type_name, self.module_name)
    }
}
