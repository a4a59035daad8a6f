//! Add command - declare another service as a dependency
//!
//! The dependency's name comes from its own lock file; the constraint
//! defaults to the newest major series it has published.

use anyhow::{bail, Context, Result};

use super::Workspace;
use crate::config::ProjectFiles;
use crate::domain::{Constraint, Dependency, DependencySource, ProjectConfig};
use crate::error::ResolutionError;
use crate::infrastructure::SourceCache;
use crate::ui;

pub async fn execute(workspace: &Workspace, source: DependencySource, version: Option<String>) -> Result<()> {
    let mut config = workspace.files.load_project()?;
    let mut cache = workspace.source_cache();

    let dependency = add_dependency(
        &mut config,
        &mut cache,
        source,
        version.as_deref(),
        workspace.local,
    )
    .await?;
    workspace.files.save_project(&config)?;

    ui::print_success(&format!(
        "Added dependency {} ({})",
        dependency.name, dependency.constraint
    ));
    ui::print_info("Run 'cadence sync' to pin it");
    Ok(())
}

/// Insert a dependency on `source` into `config`
///
/// An explicit constraint must match at least one published version.
pub async fn add_dependency<C: SourceCache>(
    config: &mut ProjectConfig,
    cache: &mut C,
    source: DependencySource,
    version: Option<&str>,
    offline: bool,
) -> Result<Dependency> {
    if !offline {
        cache
            .update(&source)
            .await
            .context("Unable to fetch the dependency")?;
    }

    let dependency_config = ProjectFiles::new(cache.path(&source))
        .require_lock()
        .context("Unable to parse the lock file of the dependency")?;
    let name = dependency_config.name;
    if config.dependencies.contains_key(&name) {
        bail!("Dependency {} is already present", name);
    }

    let versions = cache
        .versions(&source)
        .await
        .context("Unable to list the versions of the dependency")?;

    let constraint = match version {
        Some(text) => {
            let constraint = Constraint::parse(text)?;
            if versions.latest(&constraint).is_none() {
                return Err(ResolutionError::NoMatchingVersion {
                    dependency: name,
                    constraint: constraint.detailed(),
                }
                .into());
            }
            constraint
        }
        None => {
            if versions.is_empty() {
                bail!("Dependency {} has not published any version", name);
            }
            Constraint::parse(&format!("v{}", versions.latest_major()))?
        }
    };

    let dependency = Dependency::new(name.clone(), constraint, source);
    config.dependencies.insert(name, dependency.clone());
    Ok(dependency)
}
