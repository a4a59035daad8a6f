//! Centralized error types for cadence
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use thiserror::Error;

use crate::domain::version::Version;

/// Top-level error type for cadence operations
#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Kubernetes error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Schema check error: {0}")]
    SchemaCheck(#[from] SchemaCheckError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Malformed version, constraint, tag or identifier text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty version string")]
    Empty,

    #[error("Invalid version component '{component}' in '{text}'")]
    InvalidComponent { text: String, component: String },

    #[error("Version component must not be negative in '{text}'")]
    Negative { text: String },

    #[error("Too many parts in '{text}'")]
    TooManyParts { text: String },

    #[error("Version component out of range in '{text}'")]
    Overflow { text: String },

    #[error("Constraint '{text}' has no textual form and cannot be written to a file")]
    Unrepresentable { text: String },

    #[error("Malformed traffic tag '{tag}'. Expected: v{{minor}}-{{patch}}")]
    MalformedTag { tag: String },

    #[error("Routed revision {revision} has no traffic tag")]
    UntaggedRevision { revision: String },

    #[error("Malformed revision identifier '{revision}': {reason}")]
    MalformedRevision { revision: String, reason: String },

    #[error("Invalid service name '{name}'. Expected lowercase words separated by single hyphens")]
    InvalidName { name: String },

    #[error("Unknown stage '{stage}'. Expected one of: development, production, major")]
    UnknownStage { stage: String },
}

/// No published version satisfies a constraint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No version of {dependency} matching constraint {constraint}")]
    NoMatchingVersion {
        dependency: String,
        constraint: String,
    },

    #[error("No production version of major series v{major} has been published")]
    NoProductionVersion { major: u64 },
}

/// Broken invariants in published state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Broken service versioning: {from} cannot be followed by {to}")]
    BrokenSuccession { from: Version, to: Version },

    #[error(
        "Cyclic dependency found; these services form a strongly connected component:\n{}",
        path.join(" -> ")
    )]
    CyclicDependency { path: Vec<String> },

    #[error("Dependency '{declared}' resolves to a config named '{found}'")]
    NameMismatch { declared: String, found: String },

    #[error("Tried to find the tag of version {version} but could not find it")]
    MissingTag { version: Version },

    #[error("Renaming a service is not supported (lock file has '{locked}', config has '{declared}')")]
    Renamed { locked: String, declared: String },

    #[error("No current version recorded for {service}; run sync first")]
    NoCurrentVersion { service: String },

    #[error("Specific version must be resolved for dependency {dependency}; run sync first")]
    UnresolvedDependency { dependency: String },
}

/// Deploy phase outcomes that are not plain collaborator failures
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Wrong deploying order: {promoting} is not a legal successor of routed {}", routed.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "(none)".to_string()))]
    OrderingViolation {
        routed: Option<Version>,
        promoting: Version,
    },

    #[error("Could not take lock {lock} after {attempts} attempts")]
    LockUnavailable { lock: String, attempts: u32 },

    #[error("Traffic targets can only be set for production versions, {version} is not one")]
    TrafficOnNonProduction { version: Version },

    #[error("Sum of traffic percents must be 100, got {sum}")]
    TrafficSum { sum: i64 },

    #[error("Traffic percent for {version} must be between 0 and 100, got {percent}")]
    TrafficPercent { version: Version, percent: i64 },

    #[error("Uncommitted or untracked changes detected; commit or stash them:\n{}", paths.join("\n"))]
    DirtyWorkingTree { paths: Vec<String> },

    #[error("Version must be frozen before deploying")]
    NotFrozen,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository: {path}")]
    NotARepository { path: String },

    #[error("Git command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Some changes have not been committed, only committed versions can be frozen;\nproblematic files:\n\n{}", paths.join("\n"))]
    NotCommitted { paths: Vec<String> },

    #[error("Tag {tag} already exists")]
    TagExists { tag: String },
}

/// Kubernetes errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("{kind} {name} not found in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("Failed to build Kubernetes client: {message}")]
    Client { message: String },

    #[error("Lock record on {resource} is corrupt: {message}")]
    CorruptLock { resource: String, message: String },
}

/// Breaking-change checker failures
#[derive(Error, Debug)]
pub enum SchemaCheckError {
    #[error("Failed to run {tool}: {message}")]
    Spawn { tool: String, message: String },

    #[error("{tool} failed with exit code {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No project config found (looked for {file} from {start} upwards)")]
    ProjectNotFound { file: String, start: String },

    #[error("Required configuration missing: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Version should not be set in a config file ({field})")]
    VersionInProjectConfig { field: String },

    #[error("Failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },
}
