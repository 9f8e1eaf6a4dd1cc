use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nipkg_core::{Context, PackageError, Result};
use tracing::debug;

use crate::layout::StoreLayout;

const VALUE_EXTENSION: &str = "value";
const INSTALLATION_PATH_VALUE: &str = "InstallationPath";

/// Persistent hierarchical key/value store, one tree per context.
///
/// Keys are directories and values are `<name>.value` files inside them.
/// Every value write is a temp-file-then-rename, so each single value is
/// replaced atomically; nothing spans more than one value.
#[derive(Debug, Clone)]
pub struct StateStore {
    layout: StoreLayout,
}

/// One key of a [`StateStore`] tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKey {
    path: PathBuf,
}

impl StateStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(StoreLayout::new(root))
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Returns `None` when the context root has never been created, which is
    /// different from a context with no packages.
    pub fn open_context(&self, context: &Context) -> Result<Option<StoreKey>> {
        let path = self.layout.context_root(context);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => Ok(Some(StoreKey { path })),
            Ok(_) => Err(PackageError::Store {
                path,
                reason: "context root is not a directory".to_string(),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PackageError::io(
                format!("failed to open context root {}", path.display()),
                err,
            )),
        }
    }

    pub fn require_context(&self, context: &Context) -> Result<StoreKey> {
        self.open_context(context)?
            .ok_or_else(|| PackageError::ContextDoesNotExist {
                context: context.storage_key(),
            })
    }

    pub fn create_context(&self, context: &Context, installation_path: &Path) -> Result<StoreKey> {
        let path = self.layout.context_root(context);
        fs::create_dir_all(&path).map_err(|err| {
            PackageError::io(format!("failed to create context root {}", path.display()), err)
        })?;
        let key = StoreKey { path };
        key.set_value(
            INSTALLATION_PATH_VALUE,
            &installation_path.display().to_string(),
        )?;
        Ok(key)
    }

    pub fn installation_path(&self, context: &Context) -> Result<PathBuf> {
        let key = self.require_context(context)?;
        key.get_value(INSTALLATION_PATH_VALUE)?
            .map(PathBuf::from)
            .ok_or_else(|| PackageError::Store {
                path: key.path.clone(),
                reason: format!("context has no {INSTALLATION_PATH_VALUE} value"),
            })
    }
}

impl StoreKey {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a descendant key. `relative` may span several levels separated
    /// by `/` or `\`.
    pub fn open_subkey(&self, relative: &str) -> Result<Option<StoreKey>> {
        let path = self.subkey_path(relative)?;
        if path.is_dir() {
            Ok(Some(StoreKey { path }))
        } else {
            Ok(None)
        }
    }

    pub fn create_subkey(&self, relative: &str) -> Result<StoreKey> {
        let path = self.subkey_path(relative)?;
        fs::create_dir_all(&path).map_err(|err| {
            PackageError::io(format!("failed to create key {}", path.display()), err)
        })?;
        Ok(StoreKey { path })
    }

    /// Removes a descendant key with all of its values and subkeys. Returns
    /// whether the key existed.
    pub fn delete_subkey_tree(&self, relative: &str) -> Result<bool> {
        let path = self.subkey_path(relative)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(PackageError::io(
                format!("failed to delete key {}", path.display()),
                err,
            )),
        }
    }

    /// Sorted names of the direct subkeys.
    pub fn subkey_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.read_dir()? {
            let entry = entry.map_err(|err| self.read_error(err))?;
            let file_type = entry.file_type().map_err(|err| self.read_error(err))?;
            if !file_type.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Sorted names of the values stored directly under this key.
    pub fn value_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.read_dir()? {
            let entry = entry.map_err(|err| self.read_error(err))?;
            let path = entry.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(VALUE_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn get_value(&self, name: &str) -> Result<Option<String>> {
        let path = self.value_path(name)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PackageError::io(
                format!("failed to read value {}", path.display()),
                err,
            )),
        }
    }

    /// Reads a `0`/`1` style value; absent means `false`, any non-zero
    /// integer means `true`.
    pub fn get_flag(&self, name: &str) -> Result<bool> {
        let Some(raw) = self.get_value(name)? else {
            return Ok(false);
        };
        raw.trim()
            .parse::<i64>()
            .map(|value| value != 0)
            .map_err(|_| PackageError::Store {
                path: self.path.join(name),
                reason: format!("'{}' is not an integer flag", raw.trim()),
            })
    }

    pub fn set_value(&self, name: &str, value: &str) -> Result<()> {
        let target = self.value_path(name)?;
        let write_error = |err: io::Error| {
            PackageError::io(format!("failed to write value {}", target.display()), err)
        };

        let mut temp = tempfile::NamedTempFile::new_in(&self.path).map_err(write_error)?;
        temp.write_all(value.as_bytes()).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&target).map_err(|err| write_error(err.error))?;

        debug!(key = %self.path.display(), value = name, "stored value");
        Ok(())
    }

    pub fn set_flag(&self, name: &str, value: bool) -> Result<()> {
        self.set_value(name, if value { "1" } else { "0" })
    }

    /// Returns whether the value existed.
    pub fn delete_value(&self, name: &str) -> Result<bool> {
        let path = self.value_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key = %self.path.display(), value = name, "deleted value");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(PackageError::io(
                format!("failed to delete value {}", path.display()),
                err,
            )),
        }
    }

    fn subkey_path(&self, relative: &str) -> Result<PathBuf> {
        let mut path = self.path.clone();
        for segment in relative.split(['/', '\\']) {
            validate_name(&self.path, segment)?;
            path.push(segment);
        }
        Ok(path)
    }

    fn value_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(&self.path, name)?;
        Ok(self.path.join(format!("{name}.{VALUE_EXTENSION}")))
    }

    fn read_dir(&self) -> Result<fs::ReadDir> {
        fs::read_dir(&self.path).map_err(|err| self.read_error(err))
    }

    fn read_error(&self, err: io::Error) -> PackageError {
        PackageError::io(format!("failed to read key {}", self.path.display()), err)
    }
}

fn validate_name(key: &Path, name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name == "." || name == ".." {
        Some("name must not be a relative path component")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name must not contain path separators or NUL")
    } else if name.ends_with(&format!(".{VALUE_EXTENSION}")) {
        Some("name must not end with the value file extension")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PackageError::Store {
            path: key.to_path_buf(),
            reason: format!("invalid key or value name '{name}': {reason}"),
        }),
        None => Ok(()),
    }
}
