//! Freeze command - tags HEAD with the synchronized version

use anyhow::{Context, Result};

use super::{sync, Workspace};
use crate::infrastructure::{GitClient, SourceOfTruth};
use crate::ui;

/// Sync with cached dependencies, then tag the committed tree
///
/// Only a clean tree can be frozen; the lock file written by the sync
/// pass must therefore already be committed unchanged.
pub async fn execute(workspace: &Workspace) -> Result<()> {
    sync::execute(workspace, None, true).await?;

    let config = workspace.files.require_lock()?;
    let version = config
        .current_version()
        .context("No current version set. Use 'cadence sync' to initialize the first version")?;

    let repository = GitClient::open(workspace.root()).await?;
    repository.freeze(&version).await?;

    ui::print_success(&format!("Version {} frozen successfully", version));
    Ok(())
}
