use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context as _};
use nipkg_core::{EntryPointSpec, PackageError, Result};
use tracing::{debug, info, warn};

use crate::registration::RegistrationContext;

/// The contract a package exposes to the manager. An entry point is created
/// inside its isolation boundary and never leaves it.
pub trait PackageEntryPoint {
    fn initialize(&mut self) -> anyhow::Result<()>;

    fn register(&mut self, registration: &mut RegistrationContext) -> anyhow::Result<()>;

    fn unregister(&mut self, registration: &mut RegistrationContext) -> anyhow::Result<()>;

    /// Returns `false` when the package refuses to be unloaded.
    fn query_close(&mut self) -> anyhow::Result<bool>;
}

/// Constructs an entry point. The environment may be kept by the entry point
/// for as long as it lives.
pub type EntryPointFactory = Arc<
    dyn Fn(Arc<BoundaryEnvironment>) -> anyhow::Result<Box<dyn PackageEntryPoint>> + Send + Sync,
>;

/// Resolves the entry point type a manifest names to its constructor.
pub trait ModuleLoader: Send + Sync {
    fn resolve(&self, environment: &BoundaryEnvironment) -> anyhow::Result<EntryPointFactory>;
}

/// What a boundary is rooted at: one package, its installation directory as
/// the module search root, and the entry point to construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryEnvironment {
    package_id: String,
    search_root: PathBuf,
    entry_point: EntryPointSpec,
}

impl BoundaryEnvironment {
    pub fn new(
        package_id: impl Into<String>,
        search_root: impl Into<PathBuf>,
        entry_point: EntryPointSpec,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            search_root: search_root.into(),
            entry_point,
        }
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn search_root(&self) -> &Path {
        &self.search_root
    }

    pub fn entry_point(&self) -> &EntryPointSpec {
        &self.entry_point
    }
}

/// A module of entry point types that is linked into the host.
#[derive(Clone, Default)]
pub struct PackageModule {
    name: String,
    types: HashMap<String, EntryPointFactory>,
}

impl PackageModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_entry_point<F>(mut self, type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Arc<BoundaryEnvironment>) -> anyhow::Result<Box<dyn PackageEntryPoint>>
            + Send
            + Sync
            + 'static,
    {
        self.types.insert(type_name.into(), Arc::new(factory));
        self
    }
}

impl fmt::Debug for PackageModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types = self.types.keys().collect::<Vec<_>>();
        types.sort();
        f.debug_struct("PackageModule")
            .field("name", &self.name)
            .field("types", &types)
            .finish()
    }
}

/// A [`ModuleLoader`] over a fixed catalog of modules registered up front.
#[derive(Debug, Clone, Default)]
pub struct StaticModuleLoader {
    modules: HashMap<String, PackageModule>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: PackageModule) -> &mut Self {
        self.modules.insert(module.name.clone(), module);
        self
    }

    pub fn with_module(mut self, module: PackageModule) -> Self {
        self.register(module);
        self
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn resolve(&self, environment: &BoundaryEnvironment) -> anyhow::Result<EntryPointFactory> {
        let spec = environment.entry_point();
        let module = self
            .modules
            .get(&spec.module_name)
            .ok_or_else(|| anyhow!("module '{}' is not available", spec.module_name))?;
        module.types.get(&spec.type_name).cloned().ok_or_else(|| {
            anyhow!(
                "module '{}' has no entry point type '{}'",
                spec.module_name,
                spec.type_name
            )
        })
    }
}

enum BoundaryCommand {
    Register {
        registration: RegistrationContext,
        reply: Sender<HookReply>,
    },
    Unregister {
        registration: RegistrationContext,
        reply: Sender<HookReply>,
    },
    QueryClose {
        reply: Sender<anyhow::Result<bool>>,
    },
}

type HookReply = (RegistrationContext, anyhow::Result<()>);

/// An isolated execution context hosting exactly one package entry point.
///
/// The boundary runs on its own thread, which owns the environment and the
/// entry point; the handle only talks to it over a channel. Dropping the
/// handle or calling [`unload`] tears the boundary down, and teardown
/// happens exactly once.
///
/// [`unload`]: IsolationBoundary::unload
#[derive(Debug)]
pub struct IsolationBoundary {
    package_id: String,
    commands: Option<Sender<BoundaryCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl IsolationBoundary {
    /// Starts a boundary and constructs and initializes the entry point in
    /// it. When any of that fails the boundary is torn down before the error
    /// is returned.
    pub fn create(environment: BoundaryEnvironment, loader: Arc<dyn ModuleLoader>) -> Result<Self> {
        let package_id = environment.package_id().to_string();
        let entry_point = environment.entry_point().to_string();
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name(format!("boundary:{package_id}"))
            .spawn(move || run_boundary(environment, loader, ready_tx, command_rx))
            .map_err(|err| {
                creation_failed(
                    &package_id,
                    anyhow::Error::new(err).context("failed to start boundary thread"),
                )
            })?;

        let mut boundary = Self {
            package_id,
            commands: Some(command_tx),
            worker: Some(worker),
        };

        let startup = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("boundary exited during startup")));
        match startup {
            Ok(()) => {
                info!(package = %boundary.package_id, %entry_point, "isolation boundary created");
                Ok(boundary)
            }
            Err(err) => {
                boundary.teardown();
                Err(creation_failed(&boundary.package_id, err))
            }
        }
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// Runs the entry point's `register` hook and hands back the
    /// registration context with the changes it asked for.
    pub fn register(&self, registration: RegistrationContext) -> Result<RegistrationContext> {
        let (registration, result) = self.call(|reply| BoundaryCommand::Register {
            registration,
            reply,
        })?;
        result.map_err(|err| self.hook_failed("register", err))?;
        Ok(registration)
    }

    pub fn unregister(&self, registration: RegistrationContext) -> Result<RegistrationContext> {
        let (registration, result) = self.call(|reply| BoundaryCommand::Unregister {
            registration,
            reply,
        })?;
        result.map_err(|err| self.hook_failed("unregister", err))?;
        Ok(registration)
    }

    pub fn query_close(&self) -> Result<bool> {
        self.call(|reply| BoundaryCommand::QueryClose { reply })?
            .map_err(|err| self.hook_failed("query_close", err))
    }

    pub fn unload(mut self) {
        self.teardown();
    }

    fn call<R>(&self, command: impl FnOnce(Sender<R>) -> BoundaryCommand) -> Result<R> {
        let gone = || PackageError::RegistrationFailed {
            package_id: self.package_id.clone(),
            reason: "isolation boundary is no longer running".to_string(),
        };
        let commands = self.commands.as_ref().ok_or_else(gone)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        commands.send(command(reply_tx)).map_err(|_| gone())?;
        reply_rx.recv().map_err(|_| gone())
    }

    fn hook_failed(&self, hook: &str, err: anyhow::Error) -> PackageError {
        PackageError::RegistrationFailed {
            package_id: self.package_id.clone(),
            reason: format!("{hook}: {err:#}"),
        }
    }

    fn teardown(&mut self) {
        drop(self.commands.take());
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.join().is_err() {
            warn!(package = %self.package_id, "isolation boundary thread panicked during teardown");
        }
        info!(package = %self.package_id, "isolation boundary unloaded");
    }
}

impl Drop for IsolationBoundary {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn run_boundary(
    environment: BoundaryEnvironment,
    loader: Arc<dyn ModuleLoader>,
    ready: Sender<anyhow::Result<()>>,
    commands: Receiver<BoundaryCommand>,
) {
    let environment = Arc::new(environment);
    let started = contain_panic("entry point construction", || {
        let factory = loader.resolve(&environment)?;
        let mut entry_point = factory(Arc::clone(&environment))
            .with_context(|| format!("failed to construct '{}'", environment.entry_point()))?;
        entry_point
            .initialize()
            .context("entry point failed to initialize")?;
        Ok(entry_point)
    });

    let mut entry_point = match started {
        Ok(entry_point) => entry_point,
        Err(err) => {
            drop(environment);
            let _ = ready.send(Err(err));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    drop(ready);

    for command in commands {
        match command {
            BoundaryCommand::Register {
                mut registration,
                reply,
            } => {
                let result = contain_panic("register", || entry_point.register(&mut registration));
                let _ = reply.send((registration, result));
            }
            BoundaryCommand::Unregister {
                mut registration,
                reply,
            } => {
                let result =
                    contain_panic("unregister", || entry_point.unregister(&mut registration));
                let _ = reply.send((registration, result));
            }
            BoundaryCommand::QueryClose { reply } => {
                let _ = reply.send(contain_panic("query_close", || entry_point.query_close()));
            }
        }
    }

    debug!(package = %environment.package_id(), "isolation boundary shutting down");
}

fn contain_panic<T>(stage: &str, f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("{stage} panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn creation_failed(package_id: &str, err: anyhow::Error) -> PackageError {
    PackageError::IsolationBoundaryCreationFailed {
        package_id: package_id.to_string(),
        reason: format!("{err:#}"),
    }
}
