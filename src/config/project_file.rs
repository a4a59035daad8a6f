//! Project config (`cadence.yaml`) and lock file (`.cadence-lock.yaml`).
//!
//! Both files share one layout: a top-level `service:` map. The project
//! config is written by hand and never carries versions; the lock file is
//! generated by `sync` and records the release state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::naming::validate_name;
use crate::domain::{
    validate_traffic_targets, Constraint, Dependency, DependencySource, ProjectConfig, Stage,
    Version,
};
use crate::error::{CadenceError, ConfigError};

pub const PROJECT_FILE: &str = "cadence.yaml";
pub const LOCK_FILE: &str = ".cadence-lock.yaml";

const LOCK_BANNER: &str = "# THIS IS AN AUTO-GENERATED FILE; DO NOT MODIFY!
# DO NOT EXCLUDE THIS FILE FROM THE VERSION CONTROL

";

/// Which of the two files is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Project,
    Lock,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SerializedFile {
    service: SerializedService,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerializedService {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    registry: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    clients: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_version: Option<Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_version: Option<Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    stage: Option<String>,

    #[serde(default)]
    dependencies: BTreeMap<String, SerializedDependency>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    traffic_targets: Option<BTreeMap<Version, i64>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    secrets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerializedDependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    local: Option<PathBuf>,

    version: Constraint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    specific_version: Option<Version>,
}

impl SerializedDependency {
    fn into_dependency(self, name: String) -> Result<Dependency, CadenceError> {
        validate_name(&name)?;
        let source = match (self.remote, self.local) {
            (Some(remote), None) => DependencySource::Remote(remote),
            (None, Some(local)) => DependencySource::Local(local),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: format!("dependencies.{}", name),
                    value: "exactly one of 'remote' or 'local' must be set".to_string(),
                }
                .into())
            }
        };

        Ok(Dependency {
            name,
            constraint: self.version,
            resolved: self.specific_version,
            source,
        })
    }

    fn from_dependency(dependency: &Dependency) -> Self {
        let (remote, local) = match &dependency.source {
            DependencySource::Remote(url) => (Some(url.clone()), None),
            DependencySource::Local(path) => (None, Some(path.clone())),
        };
        Self {
            remote,
            local,
            version: dependency.constraint.clone(),
            specific_version: dependency.resolved,
        }
    }
}

impl SerializedService {
    fn into_config(self, kind: FileKind) -> Result<ProjectConfig, CadenceError> {
        if kind == FileKind::Project && self.base_version.is_some() {
            return Err(ConfigError::VersionInProjectConfig {
                field: "baseVersion".to_string(),
            }
            .into());
        }

        let stage = match (self.stage.as_deref(), kind) {
            (Some(stage), _) => stage.parse::<Stage>()?,
            (None, FileKind::Project) => Stage::default(),
            (None, FileKind::Lock) => {
                return Err(ConfigError::MissingField {
                    field: "service.stage".to_string(),
                }
                .into())
            }
        };

        if !self.name.is_empty() {
            validate_name(&self.name)?;
        }
        for secret in &self.secrets {
            validate_name(secret)?;
        }

        if let Some(targets) = &self.traffic_targets {
            validate_traffic_targets(targets).map_err(|err| ConfigError::InvalidValue {
                field: "trafficTargets".to_string(),
                value: err.to_string(),
            })?;
        }

        let mut dependencies = BTreeMap::new();
        for (name, dependency) in self.dependencies {
            let dependency = dependency.into_dependency(name.clone())?;
            dependencies.insert(name, dependency);
        }

        Ok(ProjectConfig {
            name: self.name,
            registry: self.registry.filter(|registry| !registry.is_empty()),
            stage,
            base_version: self.base_version,
            current_version: self.current_version,
            dependencies,
            traffic_targets: self.traffic_targets,
            secrets: self.secrets,
            clients: self.clients,
        })
    }

    fn from_config(config: &ProjectConfig, kind: FileKind) -> Self {
        let versioned = kind == FileKind::Lock;
        Self {
            name: config.name.clone(),
            registry: config.registry.clone(),
            clients: config.clients.clone(),
            base_version: config.base_version.filter(|_| versioned),
            current_version: config.current_version.filter(|_| versioned),
            stage: Some(config.stage.to_string()),
            dependencies: config
                .dependencies
                .iter()
                .map(|(name, dependency)| {
                    (name.clone(), SerializedDependency::from_dependency(dependency))
                })
                .collect(),
            traffic_targets: config.traffic_targets.clone(),
            secrets: config.secrets.clone(),
        }
    }
}

/// Parse file contents into a project config
pub fn parse(content: &str, kind: FileKind) -> Result<ProjectConfig, CadenceError> {
    let file: SerializedFile =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: match kind {
                FileKind::Project => PROJECT_FILE.to_string(),
                FileKind::Lock => LOCK_FILE.to_string(),
            },
            message: e.to_string(),
        })?;
    file.service.into_config(kind)
}

/// Render a project config; lock files get the do-not-edit banner
pub fn render(config: &ProjectConfig, kind: FileKind) -> Result<String> {
    let file = SerializedFile {
        service: SerializedService::from_config(config, kind),
    };
    let body = serde_yaml::to_string(&file).context("Failed to serialize project config")?;
    Ok(match kind {
        FileKind::Project => body,
        FileKind::Lock => format!("{}{}", LOCK_BANNER, body),
    })
}

/// Read a config file; a missing file yields `None`
pub fn load(path: &Path, kind: FileKind) -> Result<Option<ProjectConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config =
        parse(&content, kind).with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(Some(config))
}

pub fn save(path: &Path, config: &ProjectConfig, kind: FileKind) -> Result<()> {
    let content = render(config, kind)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// The pair of config files of one project directory
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    root: PathBuf,
}

impl ProjectFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_path(&self) -> PathBuf {
        self.root.join(PROJECT_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// The hand-written project config; it must exist
    pub fn load_project(&self) -> Result<ProjectConfig> {
        let path = self.project_path();
        load(&path, FileKind::Project)?.ok_or_else(|| {
            ConfigError::ProjectNotFound {
                file: PROJECT_FILE.to_string(),
                start: self.root.display().to_string(),
            }
            .into()
        })
    }

    /// The lock file written by the last sync, if any
    pub fn load_lock(&self) -> Result<Option<ProjectConfig>> {
        load(&self.lock_path(), FileKind::Lock)
    }

    /// The lock file, required for commands that act on a synced project
    pub fn require_lock(&self) -> Result<ProjectConfig> {
        self.load_lock()?.ok_or_else(|| {
            anyhow::anyhow!(
                "No lock file found at {}\n  Run 'cadence sync' first.",
                self.lock_path().display()
            )
        })
    }

    /// Project config with release state carried over from the lock file
    pub fn load_merged(&self) -> Result<ProjectConfig> {
        let mut config = self.load_project()?;
        if let Some(lock) = self.load_lock()? {
            config.apply_lock(&lock)?;
        }
        Ok(config)
    }

    pub fn save_project(&self, config: &ProjectConfig) -> Result<()> {
        save(&self.project_path(), config, FileKind::Project)
    }

    pub fn save_lock(&self, config: &ProjectConfig) -> Result<()> {
        save(&self.lock_path(), config, FileKind::Lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"
service:
  name: billing
  registry: ghcr.io/acme
  stage: production
  dependencies:
    users:
      remote: https://github.com/acme/users
      version: v2
    ledger:
      local: ../ledger
      version: v1.4
  secrets:
    - db-password
"#;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_parse_project_config() {
        let config = parse(PROJECT, FileKind::Project).unwrap();
        assert_eq!(config.name, "billing");
        assert_eq!(config.stage, Stage::Production);
        assert_eq!(config.registry.as_deref(), Some("ghcr.io/acme"));
        assert_eq!(config.secrets, vec!["db-password"]);

        let users = &config.dependencies["users"];
        assert_eq!(
            users.source,
            DependencySource::Remote("https://github.com/acme/users".to_string())
        );
        assert_eq!(users.constraint.to_string(), "v2");
        assert!(users.resolved.is_none());

        let ledger = &config.dependencies["ledger"];
        assert_eq!(ledger.source, DependencySource::Local(PathBuf::from("../ledger")));
    }

    #[test]
    fn test_project_config_defaults_to_development() {
        let config = parse("service:\n  name: billing\n", FileKind::Project).unwrap();
        assert_eq!(config.stage, Stage::Development);
        assert!(config.dependencies.is_empty());
    }

    #[test]
    fn test_project_config_rejects_base_version() {
        let content = "service:\n  name: billing\n  baseVersion: v1.0.0\n";
        let err = parse(content, FileKind::Project).unwrap_err();
        assert!(matches!(
            err,
            CadenceError::Config(ConfigError::VersionInProjectConfig { .. })
        ));
    }

    #[test]
    fn test_lock_requires_stage() {
        let err = parse("service:\n  name: billing\n", FileKind::Lock).unwrap_err();
        assert!(matches!(
            err,
            CadenceError::Config(ConfigError::MissingField { .. })
        ));

        let err = parse("service:\n  name: billing\n  stage: minor\n", FileKind::Lock).unwrap_err();
        assert!(matches!(err, CadenceError::Parse(_)));
    }

    #[test]
    fn test_traffic_targets_must_sum_to_100() {
        let content = r#"
service:
  name: billing
  trafficTargets:
    v1.2.0: 50
    v1.3.0: 40
"#;
        assert!(parse(content, FileKind::Project).is_err());
    }

    #[test]
    fn test_traffic_targets_reject_negative_shares() {
        let content = r#"
service:
  name: billing
  trafficTargets:
    v1.2.0: -50
    v1.3.0: 150
"#;
        let err = parse(content, FileKind::Project).unwrap_err();
        assert!(err.to_string().contains("between 0 and 100"));
    }

    #[test]
    fn test_dependency_needs_exactly_one_source() {
        let content = r#"
service:
  name: billing
  dependencies:
    users:
      version: v1
"#;
        assert!(parse(content, FileKind::Project).is_err());
    }

    #[test]
    fn test_lock_file_round_trip() {
        let mut config = parse(PROJECT, FileKind::Project).unwrap();
        config.base_version = Some(v("v1.2.0"));
        config.current_version = Some(v("v1.3.0"));
        config.traffic_targets = Some(BTreeMap::from([(v("v1.3.0"), 25), (v("v1.2.0"), 75)]));
        if let Some(users) = config.dependencies.get_mut("users") {
            users.resolved = Some(v("v2.1.4"));
        }

        let rendered = render(&config, FileKind::Lock).unwrap();
        assert!(rendered.starts_with("# THIS IS AN AUTO-GENERATED FILE"));
        assert!(rendered.contains("specificVersion: v2.1.4"));
        assert!(rendered.contains("currentVersion: v1.3.0"));

        let parsed = parse(&rendered, FileKind::Lock).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_project_render_drops_versions() {
        let mut config = parse(PROJECT, FileKind::Project).unwrap();
        config.base_version = Some(v("v1.2.0"));
        config.current_version = Some(v("v1.3.0"));

        let rendered = render(&config, FileKind::Project).unwrap();
        assert!(!rendered.contains("baseVersion"));
        assert!(!rendered.contains("currentVersion"));
        assert!(parse(&rendered, FileKind::Project).is_ok());
    }

    #[test]
    fn test_load_merged_applies_lock() {
        let dir = tempfile::tempdir().unwrap();
        let files = ProjectFiles::new(dir.path());
        std::fs::write(files.project_path(), PROJECT).unwrap();
        assert!(files.load_lock().unwrap().is_none());

        let mut lock = files.load_project().unwrap();
        lock.base_version = Some(v("v1.1.0"));
        lock.current_version = Some(v("v1.2.0"));
        files.save_lock(&lock).unwrap();

        let merged = files.load_merged().unwrap();
        assert_eq!(merged.base_version, Some(v("v1.1.0")));
        assert_eq!(merged.current_version, Some(v("v1.2.0")));
    }

    #[test]
    fn test_missing_project_config() {
        let dir = tempfile::tempdir().unwrap();
        let files = ProjectFiles::new(dir.path());
        assert!(files.load_project().is_err());
        assert!(files.require_lock().is_err());
    }
}
