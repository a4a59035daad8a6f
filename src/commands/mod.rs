//! Command implementations
//!
//! Each command wires the real infrastructure adapters into a service
//! and reports the outcome to the terminal.

pub mod add;
pub mod deploy;
pub mod env;
pub mod freeze;
pub mod status;
pub mod sync;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::{find_project_root, GlobalConfig, ProjectFiles};
use crate::infrastructure::GitSourceCache;

/// Everything a command needs to know about where it runs
pub struct Workspace {
    pub files: ProjectFiles,
    pub global: GlobalConfig,
    /// Local mode: no dependency fetches, local registry for images
    pub local: bool,
}

impl Workspace {
    /// Locate the project and load the global config
    pub fn open(cwd: Option<&Path>, local: bool) -> Result<Self> {
        let root = find_project_root(cwd)?;
        let global = GlobalConfig::load()?;
        debug!(root = %root.display(), cache = %global.cache_dir.display(), "Opened workspace");
        Ok(Self {
            files: ProjectFiles::new(root),
            global,
            local,
        })
    }

    pub fn root(&self) -> &Path {
        self.files.root()
    }

    pub fn source_cache(&self) -> GitSourceCache {
        GitSourceCache::new(self.global.cache_dir.clone(), self.root().to_path_buf())
    }

    /// Namespace from the command line, falling back to the global config
    pub fn namespace(&self, flag: Option<String>) -> String {
        flag.unwrap_or_else(|| self.global.namespace.clone())
    }
}

/// Cluster connection settings shared by the cluster-facing commands
#[derive(Debug, Clone, Default)]
pub struct ClusterArgs {
    pub kubeconfig: Option<PathBuf>,
    pub namespace: Option<String>,
}

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
