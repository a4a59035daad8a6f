//! Transitive dependency graph validation
//!
//! Walks the dependency closure of a project, reading each dependency's
//! persisted config through a resolver, and rejects cyclic graphs.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::config::ProjectFiles;
use crate::domain::{Dependency, DependencyGraph, ProjectConfig};
use crate::error::ConsistencyError;
use crate::infrastructure::SourceCache;

/// Access to the persisted config of a dependency
#[allow(async_fn_in_trait)]
pub trait DependencyResolver {
    async fn fetch_dependency_config(&mut self, dependency: &Dependency) -> Result<ProjectConfig>;
}

/// Resolves dependency configs from the lock files in the source cache
pub struct CacheResolver<'a, C> {
    cache: &'a mut C,
    /// Use cached copies as they are
    offline: bool,
}

impl<'a, C: SourceCache> CacheResolver<'a, C> {
    pub fn new(cache: &'a mut C, offline: bool) -> Self {
        Self { cache, offline }
    }
}

impl<C: SourceCache> DependencyResolver for CacheResolver<'_, C> {
    async fn fetch_dependency_config(&mut self, dependency: &Dependency) -> Result<ProjectConfig> {
        if !self.offline {
            self.cache.update(&dependency.source).await?;
        }
        let dir = self.cache.path(&dependency.source);
        ProjectFiles::new(&dir)
            .load_lock()
            .with_context(|| format!("Unable to parse the lock file of dependency {}", dependency.name))?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Dependency {} has no lock file in {}",
                    dependency.name,
                    dir.display()
                )
            })
    }
}

/// Build the dependency graph reachable from `root` and reject cycles
///
/// Every dependency config is fetched once, however many services
/// depend on it.
pub async fn validate_graph<R: DependencyResolver>(
    root: &ProjectConfig,
    resolver: &mut R,
) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    graph.add_service(&root.name);

    let mut fetched: HashMap<String, ProjectConfig> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<ProjectConfig> = vec![root.clone()];

    while let Some(current) = stack.pop() {
        if !visited.insert(current.name.clone()) {
            continue;
        }
        debug!(service = %current.name, "Visiting");

        for dependency in current.dependencies.values() {
            let config = match fetched.get(&dependency.name) {
                Some(config) => config.clone(),
                None => {
                    let config = resolver.fetch_dependency_config(dependency).await?;
                    if config.name != dependency.name {
                        return Err(ConsistencyError::NameMismatch {
                            declared: dependency.name.clone(),
                            found: config.name,
                        }
                        .into());
                    }
                    fetched.insert(dependency.name.clone(), config.clone());
                    config
                }
            };

            graph.add_dependency(&current.name, &config.name);
            if !visited.contains(&config.name) {
                stack.push(config);
            }
        }
    }

    graph.ensure_acyclic()?;
    info!(services = graph.service_count(), "Dependency graph is acyclic");
    Ok(graph)
}
