//! Deploy command - canary rollout of the frozen version
//!
//! Reads the lock file written by sync, checks the working tree matches a
//! frozen version and hands over to the deploy service.

use anyhow::Result;
use colored::Colorize;
use tracing::info;

use super::{ClusterArgs, Workspace};
use crate::config::{parse_duration, DeployDefaults};
use crate::domain::naming::lock_resource_name;
use crate::error::DeployError;
use crate::infrastructure::{
    create_client, ConfigMapLocker, GitClient, KnativeRouting, SourceOfTruth,
};
use crate::services::{DeployOptions, DeployOutcome, DeployService};
use crate::ui;

/// Deploy flags; unset values fall back to the global config
#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    pub attempts_limit: Option<u32>,
    pub backoff: Option<String>,
    pub lock_timeout: Option<String>,
    /// Skip the frozen check
    pub force_frozen: bool,
}

pub async fn execute(workspace: &Workspace, cluster: ClusterArgs, args: DeployArgs) -> Result<()> {
    let config = workspace.files.require_lock()?;
    let current = config.current_version()?;

    let repository = GitClient::open(workspace.root()).await?;
    check_working_tree(&repository, args.force_frozen).await?;

    let namespace = workspace.namespace(cluster.namespace);
    let options = deploy_options(
        &workspace.global.deploy,
        &args,
        namespace.clone(),
        workspace.local,
    )?;
    let stale_after = workspace.global.deploy.stale_after()?;

    let client = create_client(cluster.kubeconfig.as_deref()).await?;
    let locker = ConfigMapLocker::new(
        client.clone(),
        &namespace,
        lock_resource_name(&config.name, &current),
        stale_after,
    );
    let routing = KnativeRouting::new(client, &namespace);

    info!(
        service = %config.name,
        version = %current,
        namespace = %namespace,
        attempts_limit = options.attempts_limit,
        "Deploying"
    );
    let outcome = DeployService::new(routing, locker, options)
        .deploy(&config)
        .await?;
    print_outcome(&outcome);
    Ok(())
}

/// Refuse to deploy anything that is not exactly a frozen commit
pub async fn check_working_tree<S: SourceOfTruth>(repository: &S, force_frozen: bool) -> Result<()> {
    let paths = repository.dirty_paths().await?;
    if !paths.is_empty() {
        return Err(DeployError::DirtyWorkingTree { paths }.into());
    }
    if !force_frozen && !repository.is_frozen().await? {
        return Err(DeployError::NotFrozen.into());
    }
    Ok(())
}

/// Merge command line flags over the configured defaults
pub fn deploy_options(
    defaults: &DeployDefaults,
    args: &DeployArgs,
    namespace: String,
    force_local: bool,
) -> Result<DeployOptions> {
    let backoff = match &args.backoff {
        Some(value) => parse_duration("--backoff", value)?,
        None => defaults.backoff()?,
    };
    let lock_timeout = match &args.lock_timeout {
        Some(value) => parse_duration("--lock-timeout", value)?,
        None => defaults.lock_timeout()?,
    };
    let attempts_limit = args.attempts_limit.unwrap_or(defaults.attempts_limit);
    if attempts_limit == 0 {
        anyhow::bail!("--attempts-limit must be at least 1");
    }

    Ok(DeployOptions {
        namespace,
        attempts_limit,
        backoff,
        lock_timeout,
        force_local,
    })
}

fn print_outcome(outcome: &DeployOutcome) {
    let action = if outcome.created { "Created" } else { "Updated" };
    ui::print_success(&format!(
        "{} {} with {} (attempt {})",
        action,
        outcome.service.bold(),
        outcome.version,
        outcome.attempts
    ));
    ui::print_info(&format!("Image: {}", outcome.image));
    for entry in &outcome.traffic {
        let percent = entry.percent.unwrap_or(0);
        println!(
            "   {:<10} {:>4}% {}",
            entry.tag.as_deref().unwrap_or("-"),
            percent,
            ui::traffic_bar(percent)
        );
    }
}
