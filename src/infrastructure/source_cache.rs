//! Dependency source cache
//!
//! Every dependency gets its own directory under the cache root, named by
//! the SHA-256 of its source. Remote sources are cloned once and fetched
//! afterwards; local sources are copied wholesale (including `.git`) so
//! the working copy of the dependency is never touched.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::git::{GitClient, SourceOfTruth};
use crate::domain::{DependencySource, Version, VersionSet};

/// Local checkouts of dependency sources
#[allow(async_fn_in_trait)]
pub trait SourceCache {
    /// Bring the cached copy up to date; repeated calls within one run are no-ops
    async fn update(&mut self, source: &DependencySource) -> Result<()>;

    /// Versions published by the source
    async fn versions(&self, source: &DependencySource) -> Result<VersionSet>;

    /// Check out the snapshot of `version`
    async fn switch_to_version(&self, source: &DependencySource, version: &Version) -> Result<()>;

    /// Directory holding the cached copy
    fn path(&self, source: &DependencySource) -> PathBuf;
}

/// Git-backed cache rooted at a directory on disk
pub struct GitSourceCache {
    root: PathBuf,
    /// Base for relative local sources
    project_dir: PathBuf,
    /// Cache directories already updated during this run
    marks: HashSet<PathBuf>,
}

impl GitSourceCache {
    pub fn new(root: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            project_dir: project_dir.into(),
            marks: HashSet::new(),
        }
    }

    fn resolve_local(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    fn cache_key(&self, source: &DependencySource) -> String {
        let identity = match source {
            DependencySource::Remote(url) => format!("remote:{}", url),
            DependencySource::Local(path) => {
                format!("local:{}", self.resolve_local(path).display())
            }
        };
        format!("{:x}", Sha256::digest(identity.as_bytes()))
    }

    async fn update_remote(&self, url: &str, target: &Path) -> Result<()> {
        if target.join(".git").is_dir() {
            info!(remote = %url, "Fetching dependency sources");
            GitClient::in_dir(target)
                .fetch()
                .await
                .with_context(|| format!("Failed to fetch {}", url))?;
        } else {
            info!(remote = %url, "Cloning dependency sources");
            fs::create_dir_all(&self.root).with_context(|| {
                format!("Failed to create cache directory {}", self.root.display())
            })?;
            GitClient::clone_from(url, target)
                .await
                .with_context(|| format!("Failed to clone {}", url))?;
        }
        Ok(())
    }

    fn update_local(&self, path: &Path, target: &Path) -> Result<()> {
        let source = self.resolve_local(path);
        info!(path = %source.display(), "Copying local dependency sources");

        if target.exists() {
            fs::remove_dir_all(target)
                .with_context(|| format!("Failed to clear {}", target.display()))?;
        }

        // A half-copied tree must not survive as a valid cache entry
        let guard = scopeguard::guard(target.to_path_buf(), |target| {
            let _ = fs::remove_dir_all(&target);
        });
        copy_tree(&source, &guard)?;
        scopeguard::ScopeGuard::into_inner(guard);
        Ok(())
    }
}

/// Recursively copy `source` into `target`
fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        anyhow::bail!("Local dependency not found: {}", source.display());
    }

    for entry in WalkDir::new(source) {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry.path().strip_prefix(source)?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)
                .with_context(|| format!("Failed to create {}", destination.display()))?;
        } else if entry.path().is_file() {
            fs::copy(entry.path(), &destination).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    destination.display()
                )
            })?;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }
    Ok(())
}

impl SourceCache for GitSourceCache {
    async fn update(&mut self, source: &DependencySource) -> Result<()> {
        let target = self.path(source);
        if !self.marks.insert(target.clone()) {
            debug!(path = %target.display(), "Already updated during this run");
            return Ok(());
        }

        match source {
            DependencySource::Remote(url) => self.update_remote(url, &target).await,
            DependencySource::Local(path) => self.update_local(path, &target),
        }
    }

    async fn versions(&self, source: &DependencySource) -> Result<VersionSet> {
        let target = self.path(source);
        let versions = GitClient::in_dir(&target)
            .versions()
            .await
            .with_context(|| format!("Failed to list versions in {}", target.display()))?;
        Ok(versions)
    }

    async fn switch_to_version(&self, source: &DependencySource, version: &Version) -> Result<()> {
        let target = self.path(source);
        GitClient::in_dir(&target)
            .checkout_version(version)
            .await
            .with_context(|| format!("Unable to switch to version {}", version))?;
        Ok(())
    }

    fn path(&self, source: &DependencySource) -> PathBuf {
        self.root.join(self.cache_key(source))
    }
}
