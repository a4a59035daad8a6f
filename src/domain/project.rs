//! Project aggregate: one service, its dependencies and release state

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::constraint::Constraint;
use super::version::Version;
use crate::error::{ConsistencyError, DeployError, ParseError};

/// Declared intent for the version about to be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Patch releases on top of the current production point
    #[default]
    Development,
    /// Next minor production release
    Production,
    /// Next major release (breaking changes)
    Major,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Major => "major",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "major" => Ok(Self::Major),
            other => Err(ParseError::UnknownStage {
                stage: other.to_string(),
            }),
        }
    }
}

/// Where the sources of a dependency live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// Git remote URL
    Remote(String),
    /// Local checkout of a git repository
    Local(PathBuf),
}

/// A service this project calls into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub constraint: Constraint,
    /// Version picked by the last sync pass
    pub resolved: Option<Version>,
    pub source: DependencySource,
}

impl Dependency {
    pub fn new(name: impl Into<String>, constraint: Constraint, source: DependencySource) -> Self {
        Self {
            name: name.into(),
            constraint,
            resolved: None,
            source,
        }
    }
}

/// The aggregate root for one service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    pub name: String,
    pub registry: Option<String>,
    pub stage: Stage,
    /// Version the current cycle started from
    pub base_version: Option<Version>,
    /// Version being produced
    pub current_version: Option<Version>,
    /// Keyed by dependency name
    pub dependencies: BTreeMap<String, Dependency>,
    pub traffic_targets: Option<BTreeMap<Version, i64>>,
    pub secrets: Vec<String>,
    /// Generated-client targets (service name to language)
    pub clients: BTreeMap<String, String>,
}

/// Every share must lie in `0..=100` and the shares must sum to 100
pub fn validate_traffic_targets(targets: &BTreeMap<Version, i64>) -> Result<(), DeployError> {
    if let Some((version, percent)) = targets
        .iter()
        .find(|(_, percent)| !(0..=100).contains(*percent))
    {
        return Err(DeployError::TrafficPercent {
            version: *version,
            percent: *percent,
        });
    }
    // Bounded by the range check above
    let sum: i64 = targets.values().sum();
    if sum != 100 {
        return Err(DeployError::TrafficSum { sum });
    }
    Ok(())
}

/// Registry used when none is configured (or local mode is forced)
pub const LOCAL_REGISTRY: &str = "dev.local";

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn current_version(&self) -> Result<Version, ConsistencyError> {
        self.current_version
            .ok_or_else(|| ConsistencyError::NoCurrentVersion {
                service: self.name.clone(),
            })
    }

    /// Traffic split for a production deploy, defaulting to all traffic on the current version
    pub fn traffic_targets(&self) -> Result<BTreeMap<Version, i64>, DeployError> {
        let current = self.current_version()?;
        if !current.is_production() {
            return Err(DeployError::TrafficOnNonProduction { version: current });
        }

        match &self.traffic_targets {
            None => Ok(BTreeMap::from([(current, 100)])),
            Some(targets) => {
                validate_traffic_targets(targets)?;
                Ok(targets.clone())
            }
        }
    }

    /// Carry release state over from the previous lock file
    ///
    /// Versions always come from the lock; traffic targets only when the
    /// project config does not declare its own.
    pub fn apply_lock(&mut self, lock: &ProjectConfig) -> Result<(), ConsistencyError> {
        if !lock.name.is_empty() && lock.name != self.name {
            return Err(ConsistencyError::Renamed {
                locked: lock.name.clone(),
                declared: self.name.clone(),
            });
        }
        self.base_version = lock.base_version;
        self.current_version = lock.current_version;
        if self.traffic_targets.is_none() {
            self.traffic_targets = lock.traffic_targets.clone();
        }
        Ok(())
    }

    /// Image reference for the current version
    ///
    /// Returns the tag and whether it points at the local registry.
    pub fn build_tag(&self, force_local: bool) -> Result<(String, bool), ConsistencyError> {
        let current = self.current_version()?;
        let registry = match (&self.registry, force_local) {
            (Some(registry), false) if !registry.is_empty() => registry.as_str(),
            _ => LOCAL_REGISTRY,
        };
        let is_local = registry == LOCAL_REGISTRY;
        Ok((format!("{}/{}:{}", registry, self.name, current), is_local))
    }
}
