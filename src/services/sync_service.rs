//! Sync service - resolves dependencies and decides the next version
//!
//! A sync pass runs in three steps:
//! 1. Pin every direct dependency to the newest version matching its
//!    constraint and check out that version in the source cache.
//! 2. Validate the transitive dependency graph.
//! 3. Run the release stage machine, checking the API for breaking
//!    changes against the base version when one exists.

use anyhow::Result;
use tracing::{info, warn};

use crate::domain::{
    BreakingChanges, DependencyGraph, ProjectConfig, ReleaseDecision, ReleaseStageMachine,
    SyncStep,
};
use crate::error::{ConsistencyError, ResolutionError};
use crate::infrastructure::{BreakingChangeChecker, SourceCache, SourceOfTruth};

use super::graph_validator::{validate_graph, CacheResolver};

/// Service running sync passes for one project
pub struct SyncService<C, S, B> {
    cache: C,
    repository: S,
    checker: B,
    /// Work with cached dependency copies only
    offline: bool,
}

impl<C, S, B> SyncService<C, S, B>
where
    C: SourceCache,
    S: SourceOfTruth,
    B: BreakingChangeChecker,
{
    pub fn new(cache: C, repository: S, checker: B, offline: bool) -> Self {
        Self {
            cache,
            repository,
            checker,
            offline,
        }
    }

    /// Full sync pass; the caller persists the updated config
    pub async fn sync(&mut self, config: &mut ProjectConfig) -> Result<ReleaseDecision> {
        self.resolve_dependencies(config).await?;
        self.validate_graph(config).await?;
        self.release(config).await
    }

    /// Pin each dependency to the latest version matching its constraint
    pub async fn resolve_dependencies(&mut self, config: &mut ProjectConfig) -> Result<()> {
        for dependency in config.dependencies.values_mut() {
            info!(dependency = %dependency.name, constraint = %dependency.constraint, "Resolving");
            if !self.offline {
                self.cache.update(&dependency.source).await?;
            }

            let mut versions = self.cache.versions(&dependency.source).await?;
            versions.validate()?;

            let version = versions.latest(&dependency.constraint).ok_or_else(|| {
                ResolutionError::NoMatchingVersion {
                    dependency: dependency.name.clone(),
                    constraint: dependency.constraint.detailed(),
                }
            })?;

            self.cache
                .switch_to_version(&dependency.source, &version)
                .await?;
            dependency.resolved = Some(version);
            info!(dependency = %dependency.name, version = %version, "Resolved");
        }
        Ok(())
    }

    pub async fn validate_graph(&mut self, config: &ProjectConfig) -> Result<DependencyGraph> {
        let mut resolver = CacheResolver::new(&mut self.cache, self.offline);
        validate_graph(config, &mut resolver).await
    }

    /// Decide the version this pass produces and record it in `config`
    pub async fn release(&self, config: &mut ProjectConfig) -> Result<ReleaseDecision> {
        let published = self.repository.versions().await?;
        let lock_lost = config.base_version.is_none() && config.current_version.is_none();
        let machine = ReleaseStageMachine::new(&published);

        let base = match machine.begin(config)? {
            SyncStep::Bootstrapped => {
                info!(service = %config.name, "No published versions, starting at v1.0.0");
                return Ok(ReleaseDecision {
                    version: config.current_version()?,
                    stage: config.stage,
                    escalated: false,
                    concurrent_major: false,
                });
            }
            SyncStep::CheckAgainst(base) => base,
        };

        if lock_lost {
            warn!(
                base = %base,
                "No base or current version recorded, adopting the latest published version"
            );
        }

        info!(base = %base, "Looking up tag for base version");
        if !self.repository.has_version(&base).await? {
            return Err(ConsistencyError::MissingTag { version: base }.into());
        }

        let breaking = self.checker.check(&base).await?;
        let decision = machine.finish(config, breaking)?;

        if decision.escalated {
            warn!("Breaking changes found in API, switching to the major stage");
        } else if breaking == BreakingChanges::Detected {
            info!("Breaking changes found in API");
        }
        if decision.concurrent_major {
            warn!(
                base = %base,
                version = %decision.version,
                "Another major version was published since the base version"
            );
        }
        info!(version = %decision.version, stage = %decision.stage, "Release decided");
        Ok(decision)
    }
}
