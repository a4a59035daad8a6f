//! Domain layer - pure business logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod constraint;
pub mod graph;
pub mod naming;
pub mod project;
pub mod release;
pub mod traffic;
pub mod version;
pub mod version_set;

// Re-export commonly used types
pub use constraint::Constraint;
pub use graph::DependencyGraph;
pub use project::{validate_traffic_targets, Dependency, DependencySource, ProjectConfig, Stage};
pub use release::{BreakingChanges, ReleaseDecision, ReleaseStageMachine, SyncStep};
pub use traffic::{plan_traffic, TrafficEntry};
pub use version::Version;
pub use version_set::VersionSet;
