use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nipkg_core::{Context, PackageError, PackageManifest, Result};
use nipkg_registry::{installed_version, PackageRegistry, StateStore};
use nipkg_resolver::{check_dependencies, install_order};
use tracing::{info, warn};

use crate::archive::read_archive_manifest;
use crate::isolation::{BoundaryEnvironment, IsolationBoundary, ModuleLoader};
use crate::operations::{
    EnableOperation, InstallOperation, InstallOutcome, PackageOperation, UninstallOperation,
    UninstallOutcome, UpdateOperation,
};

/// Result of one archive of an [`PackageManager::install_batch`] call.
#[derive(Debug)]
pub struct BatchEntry {
    pub archive: PathBuf,
    pub result: Result<InstallOutcome>,
}

/// Result of one package of a [`PackageManager::process_pending_uninstalls`]
/// sweep.
#[derive(Debug)]
pub struct PendingUninstall {
    pub package_id: String,
    pub result: Result<UninstallOutcome>,
}

/// Runs package operations against one context.
///
/// The manager does no locking. Callers must not run two mutating
/// operations against the same context at the same time.
#[derive(Clone)]
pub struct PackageManager {
    context: Context,
    registry: PackageRegistry,
    loader: Arc<dyn ModuleLoader>,
}

impl PackageManager {
    pub fn new(context: Context, registry: PackageRegistry, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            context,
            registry,
            loader,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn store(&self) -> &StateStore {
        self.registry.store()
    }

    pub fn run<O: PackageOperation>(&self, operation: &O) -> Result<O::Output> {
        operation.execute(self)
    }

    pub fn install(&self, archive: &Path, expected_sha256: Option<&str>) -> Result<InstallOutcome> {
        self.run(&InstallOperation::new(archive, expected_sha256))
    }

    pub fn update(
        &self,
        package_id: &str,
        archive: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<InstallOutcome> {
        self.run(&UpdateOperation::new(package_id, archive, expected_sha256))
    }

    pub fn uninstall(&self, package_id: &str) -> Result<UninstallOutcome> {
        self.run(&UninstallOperation::new(package_id))
    }

    pub fn set_enabled(&self, package_id: &str, enabled: bool) -> Result<()> {
        self.run(&EnableOperation::new(package_id, enabled))
    }

    pub fn installed_version(&self, package_id: &str) -> Result<Option<String>> {
        installed_version(self.store(), &self.context, package_id)
    }

    /// Installs several archives, dependencies first.
    ///
    /// A package whose dependencies are not installed yet is deferred and
    /// retried after every successful install; it fails with
    /// `DependencyUnsatisfied` only if the batch runs out of progress.
    /// Every other error fails only the archive it came from.
    pub fn install_batch(&self, archives: &[PathBuf]) -> Vec<BatchEntry> {
        let mut finished: Vec<(usize, Result<InstallOutcome>)> = Vec::new();
        let mut batch = BTreeMap::new();
        let mut index_of = BTreeMap::new();

        for (index, archive) in archives.iter().enumerate() {
            match read_archive_manifest(archive) {
                Ok(manifest) if index_of.contains_key(&manifest.id) => {
                    finished.push((
                        index,
                        Err(PackageError::invalid_manifest(format!(
                            "'{}' appears more than once in the batch",
                            manifest.id
                        ))),
                    ));
                }
                Ok(manifest) => {
                    index_of.insert(manifest.id.clone(), index);
                    batch.insert(manifest.id.clone(), manifest);
                }
                Err(err) => finished.push((index, Err(err))),
            }
        }

        let order = install_order(&batch).unwrap_or_else(|err| {
            warn!(error = %err, "batch has a dependency cycle; installing in the given order");
            let mut ids = index_of
                .iter()
                .map(|(id, index)| (*index, id.clone()))
                .collect::<Vec<_>>();
            ids.sort();
            ids.into_iter().map(|(_, id)| id).collect()
        });

        let mut deferred = Vec::new();
        for id in order {
            let (Some(&index), Some(manifest)) = (index_of.get(&id), batch.get(&id)) else {
                continue;
            };
            match self.try_batch_install(&archives[index], manifest) {
                Ok(outcome) => {
                    finished.push((index, Ok(outcome)));
                    self.retry_deferred(archives, &batch, &mut deferred, &mut finished);
                }
                Err(err) if !err.is_fatal() => deferred.push((index, id, err)),
                Err(err) => finished.push((index, Err(err))),
            }
        }
        finished.extend(
            deferred
                .into_iter()
                .map(|(index, _, err)| (index, Err(err))),
        );

        finished.sort_by_key(|(index, _)| *index);
        finished
            .into_iter()
            .map(|(index, result)| BatchEntry {
                archive: archives[index].clone(),
                result,
            })
            .collect()
    }

    /// Completes every uninstall left pending in the context, such as one
    /// interrupted by a crash. Each package gets its own result; a failure
    /// does not stop the packages after it.
    pub fn process_pending_uninstalls(&self) -> Result<Vec<PendingUninstall>> {
        let mut processed = Vec::new();
        for package_id in self.store().list_package_ids(&self.context)? {
            let pending = match self.store().read_record(&self.context, &package_id) {
                Ok(record) => record.is_some_and(|record| record.uninstall_pending),
                Err(err) => {
                    processed.push(PendingUninstall {
                        package_id,
                        result: Err(err),
                    });
                    continue;
                }
            };
            if !pending {
                continue;
            }

            let result = self.uninstall(&package_id);
            if let Err(err) = &result {
                warn!(
                    context = %self.context,
                    package = %package_id,
                    error = %err,
                    "pending uninstall failed"
                );
            }
            processed.push(PendingUninstall { package_id, result });
        }

        let completed = processed.iter().filter(|entry| entry.result.is_ok()).count();
        if !processed.is_empty() {
            info!(
                context = %self.context,
                completed,
                failed = processed.len() - completed,
                "processed pending uninstalls"
            );
        }
        Ok(processed)
    }

    pub(crate) fn create_boundary(
        &self,
        package_id: &str,
        search_root: &Path,
        manifest: &PackageManifest,
    ) -> Result<IsolationBoundary> {
        let environment =
            BoundaryEnvironment::new(package_id, search_root, manifest.entry_point_spec()?);
        IsolationBoundary::create(environment, Arc::clone(&self.loader))
    }

    pub(crate) fn check_dependencies(&self, manifest: &PackageManifest) -> Result<()> {
        check_dependencies(&self.context, manifest, |package_id| {
            self.installed_version(package_id)
        })?;
        Ok(())
    }

    /// Checks dependencies from the manifest read up front, so deferred
    /// packages are not extracted again on every retry.
    fn try_batch_install(&self, archive: &Path, manifest: &PackageManifest) -> Result<InstallOutcome> {
        self.check_dependencies(manifest)?;
        self.install(archive, None)
    }

    fn retry_deferred(
        &self,
        archives: &[PathBuf],
        batch: &BTreeMap<String, PackageManifest>,
        deferred: &mut Vec<(usize, String, PackageError)>,
        finished: &mut Vec<(usize, Result<InstallOutcome>)>,
    ) {
        loop {
            let mut progressed = false;
            for (index, id, err) in std::mem::take(deferred) {
                let Some(manifest) = batch.get(&id) else {
                    finished.push((index, Err(err)));
                    continue;
                };
                match self.try_batch_install(&archives[index], manifest) {
                    Ok(outcome) => {
                        progressed = true;
                        finished.push((index, Ok(outcome)));
                    }
                    Err(err) if !err.is_fatal() => deferred.push((index, id, err)),
                    Err(err) => finished.push((index, Err(err))),
                }
            }
            if !progressed || deferred.is_empty() {
                return;
            }
        }
    }
}
