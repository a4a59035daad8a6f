//! User-level configuration (`~/.cadence/config.yaml`).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an alternative global config file
pub const CONFIG_ENV: &str = "CADENCE_CONFIG";

/// Global configuration shared by every project on this machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Where dependency sources are cloned or copied
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Kubernetes namespace services are deployed to
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deploy loop timings
    #[serde(default)]
    pub deploy: DeployDefaults,
}

/// Defaults for the deploy retry loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDefaults {
    /// Maximum number of lock acquisition attempts
    #[serde(default = "default_attempts_limit")]
    pub attempts_limit: u32,

    /// Pause between attempts (e.g., "10s", "1m")
    #[serde(default = "default_backoff")]
    pub backoff: String,

    /// How long one acquisition may wait for the lock
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: String,

    /// Lock holders older than this are considered crashed and evicted
    #[serde(default = "default_stale_after")]
    pub stale_after: String,
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn default_cache_dir() -> PathBuf {
    home_dir().join(".cadence").join("cache")
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_attempts_limit() -> u32 {
    5
}

fn default_backoff() -> String {
    "10s".to_string()
}

fn default_lock_timeout() -> String {
    "30s".to_string()
}

fn default_stale_after() -> String {
    "10m".to_string()
}

impl Default for DeployDefaults {
    fn default() -> Self {
        Self {
            attempts_limit: default_attempts_limit(),
            backoff: default_backoff(),
            lock_timeout: default_lock_timeout(),
            stale_after: default_stale_after(),
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            namespace: default_namespace(),
            deploy: DeployDefaults::default(),
        }
    }
}

/// Parse a human readable duration like "10s" or "2m 30s"
pub fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .with_context(|| format!("Invalid duration for {}: '{}'", field, value))
}

impl DeployDefaults {
    pub fn backoff(&self) -> Result<Duration> {
        parse_duration("deploy.backoff", &self.backoff)
    }

    pub fn lock_timeout(&self) -> Result<Duration> {
        parse_duration("deploy.lockTimeout", &self.lock_timeout)
    }

    pub fn stale_after(&self) -> Result<Duration> {
        parse_duration("deploy.staleAfter", &self.stale_after)
    }

    /// Validate deploy timings
    pub fn validate(&self) -> Result<()> {
        if self.attempts_limit == 0 {
            bail!("deploy.attemptsLimit must be at least 1");
        }
        self.backoff()?;
        self.lock_timeout()?;
        self.stale_after()?;
        Ok(())
    }
}

impl GlobalConfig {
    /// Default location of the global config file
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join(".cadence").join("config.yaml"))
    }

    /// Load the global config, falling back to defaults when the file is absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read global config file: {}\n  Ensure the file is readable.",
                path.display()
            )
        })?;

        let config: Self = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse global config: {}\n  Check YAML syntax and field names",
                path.display()
            )
        })?;

        config.deploy.validate().with_context(|| {
            format!(
                "Invalid deploy settings in global config: {}",
                path.display()
            )
        })?;

        Ok(config)
    }
}
