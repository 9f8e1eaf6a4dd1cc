use anyhow::{anyhow, bail, Result};
use nipkg_core::Context;
use nipkg_registry::{RecordField, StateStore, DEPENDENCIES_KEY, INSTALLED_PRODUCTS_KEY};
use tracing::debug;

const PACKAGES_KEY: &str = "Packages";

/// A change a package asked for from one of its registration hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationChange {
    SetValue {
        key: String,
        name: String,
        value: String,
    },
    DeleteValue {
        key: String,
        name: String,
    },
    DeleteKey {
        key: String,
    },
}

/// Handed to a package's `register` and `unregister` hooks. Changes are
/// buffered and only reach the state store through [`apply`], which the
/// manager calls once every hook of the operation has succeeded.
///
/// A package may write below `InstalledProducts/<its own id>` and below
/// `Packages/<name>`. Keys are `/` or `\` separated and relative to the
/// context root.
///
/// [`apply`]: RegistrationContext::apply
#[derive(Debug, Clone)]
pub struct RegistrationContext {
    context: Context,
    package_id: String,
    changes: Vec<RegistrationChange>,
}

impl RegistrationContext {
    pub fn new(context: Context, package_id: impl Into<String>) -> Self {
        Self {
            context,
            package_id: package_id.into(),
            changes: Vec::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn changes(&self) -> &[RegistrationChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn set_value(&mut self, key: &str, name: &str, value: impl Into<String>) -> Result<()> {
        let key = self.scoped_key(key)?;
        self.check_value_name(&key, name)?;
        self.changes.push(RegistrationChange::SetValue {
            key,
            name: name.to_string(),
            value: value.into(),
        });
        Ok(())
    }

    pub fn delete_value(&mut self, key: &str, name: &str) -> Result<()> {
        let key = self.scoped_key(key)?;
        self.check_value_name(&key, name)?;
        self.changes.push(RegistrationChange::DeleteValue {
            key,
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn delete_key(&mut self, key: &str) -> Result<()> {
        let key = self.scoped_key(key)?;
        if key.eq_ignore_ascii_case(&self.record_key()) {
            bail!("the record of '{}' cannot be deleted by the package", self.package_id);
        }
        self.changes.push(RegistrationChange::DeleteKey { key });
        Ok(())
    }

    /// Writes the buffered changes to the store, in the order they were made.
    pub fn apply(&self, store: &StateStore) -> nipkg_core::Result<()> {
        let root = store.require_context(&self.context)?;
        for change in &self.changes {
            match change {
                RegistrationChange::SetValue { key, name, value } => {
                    root.create_subkey(key)?.set_value(name, value)?;
                }
                RegistrationChange::DeleteValue { key, name } => {
                    if let Some(key) = root.open_subkey(key)? {
                        key.delete_value(name)?;
                    }
                }
                RegistrationChange::DeleteKey { key } => {
                    root.delete_subkey_tree(key)?;
                }
            }
        }
        debug!(
            package = %self.package_id,
            changes = self.changes.len(),
            "applied registration changes"
        );
        Ok(())
    }

    fn record_key(&self) -> String {
        format!("{INSTALLED_PRODUCTS_KEY}/{}", self.package_id)
    }

    /// Normalizes `key` and checks that it lies within what this package
    /// may touch.
    fn scoped_key(&self, key: &str) -> Result<String> {
        let segments = key
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();
        if segments
            .iter()
            .any(|segment| *segment == "." || *segment == "..")
        {
            bail!("registration key '{key}' must not contain relative components");
        }

        let out_of_scope = || {
            anyhow!(
                "registration key '{key}' is outside the scope of '{}'",
                self.package_id
            )
        };
        let (root, rest) = segments.split_first().ok_or_else(out_of_scope)?;

        let normalized = if root.eq_ignore_ascii_case(INSTALLED_PRODUCTS_KEY) {
            let (id, rest) = rest.split_first().ok_or_else(out_of_scope)?;
            if !id.eq_ignore_ascii_case(&self.package_id) {
                return Err(out_of_scope());
            }
            if rest
                .first()
                .is_some_and(|subkey| subkey.eq_ignore_ascii_case(DEPENDENCIES_KEY))
            {
                bail!("the dependency list of '{}' is managed by the installer", self.package_id);
            }
            let mut normalized = vec![INSTALLED_PRODUCTS_KEY, self.package_id.as_str()];
            normalized.extend_from_slice(rest);
            normalized
        } else if root.eq_ignore_ascii_case(PACKAGES_KEY) && !rest.is_empty() {
            let mut normalized = vec![PACKAGES_KEY];
            normalized.extend_from_slice(rest);
            normalized
        } else {
            return Err(out_of_scope());
        };

        Ok(normalized.join("/"))
    }

    fn check_value_name(&self, key: &str, name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\', '\0']) {
            bail!("invalid registration value name '{name}'");
        }
        if key == self.record_key() && RecordField::from_name(name).is_some() {
            bail!("'{name}' of '{}' is managed by the installer", self.package_id);
        }
        Ok(())
    }
}
