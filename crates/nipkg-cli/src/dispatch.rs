use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use nipkg_core::Context;
use nipkg_installer::{PackageManager, StaticModuleLoader};
use nipkg_registry::{PackageRegistry, QueuedUpdate, StateStore};
use tracing::debug;

use crate::completion::write_completions_script;
use crate::config::{resolve_context, resolve_root, CliConfig};
use crate::render::{
    format_install_outcome, format_package_lines, format_uninstall_outcome, TerminalRenderer,
};
use crate::{Cli, Commands, ContextCommands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::current();

    if let Commands::Completions { shell } = cli.command {
        return write_completions_script(shell, &mut io::stdout().lock());
    }

    let root = resolve_root(cli.root)?;
    let store = StateStore::open(&root);
    let config = CliConfig::load(&store.layout().config_path())?;
    debug!(root = %root.display(), "opened state store");

    let open_manager = |store: StateStore| -> Result<PackageManager> {
        let context = resolve_context(cli.context.as_deref(), cli.experimental, &config)?;
        debug!(context = %context, "resolved context");
        Ok(PackageManager::new(
            context,
            PackageRegistry::new(store),
            Arc::new(StaticModuleLoader::new()),
        ))
    };

    match cli.command {
        Commands::Context(ContextCommands::Init {
            name,
            installation_path,
        }) => {
            let context = Context::new(name, cli.experimental || config.experimental)?;
            let installation_path = absolute_path(&installation_path)?;
            store.create_context(&context, &installation_path)?;
            renderer.print_status(
                "ok",
                &format!(
                    "initialized context {context} at {}",
                    installation_path.display()
                ),
            );
        }
        Commands::Install { archive, sha256 } => {
            let manager = open_manager(store)?;
            let outcome = manager.install(&archive, sha256.as_deref())?;
            renderer.print_status("ok", &format_install_outcome(&outcome));
        }
        Commands::InstallBatch { archives } => {
            let manager = open_manager(store)?;
            let entries = manager.install_batch(&archives);
            let mut failed = 0usize;
            for entry in &entries {
                match &entry.result {
                    Ok(outcome) => renderer.print_status("ok", &format_install_outcome(outcome)),
                    Err(err) => {
                        failed += 1;
                        renderer.print_status(
                            "error",
                            &format!(
                                "{}: error[{}]: {err}",
                                entry.archive.display(),
                                err.code()
                            ),
                        );
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} archives failed to install", entries.len());
            }
        }
        Commands::Update {
            package_id,
            archive,
            sha256,
        } => {
            let manager = open_manager(store)?;
            let outcome = manager.update(&package_id, &archive, sha256.as_deref())?;
            renderer.print_status("ok", &format_install_outcome(&outcome));
        }
        Commands::QueueUpdate {
            package_id,
            version,
            gallery_url,
            site,
        } => {
            let manager = open_manager(store)?;
            manager.registry().queue_update(
                manager.context(),
                &QueuedUpdate {
                    package_id: package_id.clone(),
                    version: version.clone(),
                    gallery_details_url: gallery_url,
                    nuget_site: site,
                },
            )?;
            renderer.print_status("ok", &format!("queued {package_id} {version}"));
        }
        Commands::Uninstall { package_id } => {
            let manager = open_manager(store)?;
            let outcome = manager.uninstall(&package_id)?;
            renderer.print_status("ok", &format_uninstall_outcome(&outcome));
        }
        Commands::QueueUninstall { package_id } => {
            let manager = open_manager(store)?;
            manager
                .registry()
                .queue_uninstall(manager.context(), &package_id)?;
            renderer.print_status("ok", &format!("queued uninstall of {package_id}"));
        }
        Commands::Enable { package_id } => {
            let manager = open_manager(store)?;
            manager.set_enabled(&package_id, true)?;
            renderer.print_status("ok", &format!("enabled {package_id}"));
        }
        Commands::Disable { package_id } => {
            let manager = open_manager(store)?;
            manager.set_enabled(&package_id, false)?;
            renderer.print_status("ok", &format!("disabled {package_id}"));
        }
        Commands::List { json } => {
            let manager = open_manager(store)?;
            let packages = manager.registry().list_installed(manager.context())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&packages)?);
            } else {
                renderer.print_section(&format!("Packages in {}", manager.context()));
                renderer.print_lines(&format_package_lines(&packages));
            }
        }
        Commands::State { package_id } => {
            let manager = open_manager(store)?;
            let state = manager
                .registry()
                .package_state(manager.context(), &package_id)?;
            println!("{package_id}: {state}");
        }
        Commands::ProcessPending => {
            let manager = open_manager(store)?;
            let entries = manager.process_pending_uninstalls()?;
            if entries.is_empty() {
                renderer.print_status("ok", "no pending uninstalls");
            }
            let mut failed = 0usize;
            for entry in &entries {
                match &entry.result {
                    Ok(outcome) => renderer.print_status("ok", &format_uninstall_outcome(outcome)),
                    Err(err) => {
                        failed += 1;
                        renderer.print_status(
                            "error",
                            &format!("{}: error[{}]: {err}", entry.package_id, err.code()),
                        );
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} pending uninstalls failed", entries.len());
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("failed to resolve the current directory")?;
    Ok(cwd.join(path))
}
