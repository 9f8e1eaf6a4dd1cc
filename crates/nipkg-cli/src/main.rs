use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use nipkg_core::PackageError;
use tracing_subscriber::EnvFilter;

mod completion;
mod config;
mod dispatch;
mod render;

use completion::CliCompletionShell;
use dispatch::run_cli;
use render::{current_error_style, render_package_error};

const LOG_ENV: &str = "NIPKG_LOG";

#[derive(Parser, Debug)]
#[command(name = "nipkg", version)]
#[command(about = "Installs, updates and removes extension packages per context", long_about = None)]
struct Cli {
    /// State store root. Defaults to NIPKG_HOME, then a per-user directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Context to operate on. Defaults to `default_context` from nipkg.toml.
    #[arg(long, global = true)]
    context: Option<String>,
    #[arg(long, global = true)]
    experimental: bool,
    /// Raise log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(subcommand)]
    Context(ContextCommands),
    Install {
        archive: PathBuf,
        #[arg(long)]
        sha256: Option<String>,
    },
    InstallBatch {
        #[arg(required = true)]
        archives: Vec<PathBuf>,
    },
    Update {
        package_id: String,
        archive: PathBuf,
        #[arg(long)]
        sha256: Option<String>,
    },
    QueueUpdate {
        package_id: String,
        version: String,
        #[arg(long)]
        gallery_url: Option<String>,
        #[arg(long)]
        site: Option<String>,
    },
    Uninstall {
        package_id: String,
    },
    QueueUninstall {
        package_id: String,
    },
    Enable {
        package_id: String,
    },
    Disable {
        package_id: String,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    State {
        package_id: String,
    },
    /// Complete uninstalls left pending by an interrupted run.
    ProcessPending,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ContextCommands {
    Init {
        name: String,
        #[arg(long)]
        installation_path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run_cli(cli) {
        if let Some(package_error) = err.downcast_ref::<PackageError>() {
            eprintln!(
                "{}",
                render_package_error(current_error_style(), package_error)
            );
            process::exit(package_error.code() as i32);
        }
        return Err(err);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
