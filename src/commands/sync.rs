//! Sync command
//!
//! Pins dependencies, validates the dependency graph, decides the next
//! version and writes the lock file.

use anyhow::Result;
use colored::Colorize;
use tracing::info;

use super::{spinner, Workspace};
use crate::domain::{ReleaseDecision, Stage};
use crate::infrastructure::{BufChecker, GitClient};
use crate::services::SyncService;
use crate::ui;

/// Run a sync pass; `offline` uses cached dependency copies as they are
pub async fn execute(
    workspace: &Workspace,
    stage: Option<Stage>,
    offline: bool,
) -> Result<ReleaseDecision> {
    let mut config = workspace.files.load_merged()?;
    if let Some(stage) = stage {
        info!(stage = %stage, "Stage overridden from the command line");
        config.stage = stage;
    }

    let repository = GitClient::open(workspace.root()).await?;
    let mut service = SyncService::new(
        workspace.source_cache(),
        repository,
        BufChecker::new(workspace.root()),
        offline,
    );

    let progress = spinner("Resolving dependencies...");
    let resolved = async {
        service.resolve_dependencies(&mut config).await?;
        progress.set_message("Validating dependency graph...");
        service.validate_graph(&config).await
    }
    .await;
    progress.finish_and_clear();
    let graph = resolved?;
    info!(services = graph.service_count(), "Dependencies synchronized");

    let decision = service.release(&mut config).await?;
    workspace.files.save_lock(&config)?;

    if decision.escalated {
        ui::print_warning("Breaking changes found in the API, stage switched to major");
    }
    if decision.concurrent_major {
        ui::print_warning(&format!(
            "Another major version was published in the meantime; {} is not a direct successor of the base version",
            decision.version
        ));
    }
    ui::print_success(&format!(
        "{} synchronized at {} ({})",
        config.name.bold(),
        decision.version,
        decision.stage
    ));
    Ok(decision)
}
