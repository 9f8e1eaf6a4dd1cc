use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use nipkg_core::Context;
use serde::Deserialize;

pub(crate) const HOME_ENV: &str = "NIPKG_HOME";

/// Settings read from `nipkg.toml` at the store root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CliConfig {
    pub(crate) default_context: Option<String>,
    pub(crate) experimental: bool,
}

impl CliConfig {
    pub(crate) fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse nipkg.toml")
    }

    /// A missing file is an empty config.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read config file {}", path.display()))
            }
        }
    }
}

pub(crate) fn resolve_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root);
    }
    if let Some(home) = env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    default_user_root()
}

pub(crate) fn default_user_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let local_app_data = env::var_os("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve the state root")?;
        return Ok(PathBuf::from(local_app_data).join("Nipkg"));
    }

    let home = env::var_os("HOME").context("HOME is not set; cannot resolve the state root")?;
    Ok(PathBuf::from(home).join(".nipkg"))
}

/// Picks the context from the command line, falling back to the config.
/// The experimental hive is used when either source asks for it.
pub(crate) fn resolve_context(
    name: Option<&str>,
    experimental: bool,
    config: &CliConfig,
) -> Result<Context> {
    let name = name
        .or(config.default_context.as_deref())
        .context("no context given; pass --context or set default_context in nipkg.toml")?;
    Ok(Context::new(name, experimental || config.experimental)?)
}
