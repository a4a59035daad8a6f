use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod services;
mod tools;
mod ui;

use cli::{AddCommands, Cli, Commands};
use commands::{add, deploy, env, freeze, status, sync, Workspace};
use domain::DependencySource;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false) // Disable ANSI escape codes for cleaner output
        .init();

    // Env with an explicit name runs outside any project, so the
    // workspace is only opened by the commands that need it
    let open_workspace = || Workspace::open(cli.cwd.as_deref(), cli.local);

    match cli.command {
        Commands::Sync { stage } => {
            let workspace = open_workspace()?;
            sync::execute(&workspace, stage, workspace.local).await?;
        }
        Commands::Freeze => {
            freeze::execute(&open_workspace()?).await?;
        }
        Commands::Deploy {
            cluster,
            attempts_limit,
            backoff,
            lock_timeout,
            force_frozen,
        } => {
            let args = deploy::DeployArgs {
                attempts_limit,
                backoff,
                lock_timeout,
                force_frozen,
            };
            deploy::execute(&open_workspace()?, cluster.into(), args).await?;
        }
        Commands::Status { cluster, major } => {
            status::execute(&open_workspace()?, cluster.into(), major).await?;
        }
        Commands::Add(AddCommands::Remote { url, version }) => {
            add::execute(&open_workspace()?, DependencySource::Remote(url), version).await?;
        }
        Commands::Add(AddCommands::Local { path, version }) => {
            add::execute(&open_workspace()?, DependencySource::Local(path), version).await?;
        }
        Commands::Env { name } => {
            env::execute(cli.cwd.as_deref(), cli.local, name)?;
        }
    }

    Ok(())
}
