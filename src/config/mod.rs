//! # Configuration
//!
//! Two layers:
//!
//! 1. **Global** (`~/.cadence/config.yaml`, or `$CADENCE_CONFIG`)
//!    - Cache directory, default namespace, deploy loop timings
//!
//! 2. **Project** (`cadence.yaml` + `.cadence-lock.yaml` in the project root)
//!    - Service name, stage, dependencies, traffic targets, secrets
//!    - The lock file additionally records base/current versions
//!
//! CLI flags override both.

mod global;
mod project_file;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use global::{parse_duration, DeployDefaults, GlobalConfig};
pub use project_file::{ProjectFiles, PROJECT_FILE};

use crate::error::ConfigError;

/// Locate the project root
///
/// An explicit `--cwd` is used as-is; otherwise walk up from the current
/// directory to the nearest directory holding a `cadence.yaml`.
pub fn find_project_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return dir
            .canonicalize()
            .with_context(|| format!("Project directory does not exist: {}", dir.display()));
    }

    let start = std::env::current_dir().context("Failed to get current directory")?;
    discover_from(&start)
}

fn discover_from(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(PROJECT_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(ConfigError::ProjectNotFound {
                file: PROJECT_FILE.to_string(),
                start: start.display().to_string(),
            }
            .into());
        }
    }
}
