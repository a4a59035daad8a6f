//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Git operations (working repository and dependency checkouts)
//! - Dependency source cache
//! - API breaking-change checks (buf)
//! - Kubernetes API (Knative services, ConfigMap locks)
//!
//! Each adapter implements a small trait so services can be tested
//! against in-memory fakes.

pub mod cluster;
pub mod git;
pub mod lock;
pub mod schema_check;
pub mod source_cache;

// Re-export commonly used types
pub use cluster::{create_client, KnativeRouting, KnativeService, RoutingApi};
pub use git::{GitClient, SourceOfTruth};
pub use lock::{AcquireOptions, ConfigMapLocker, DistributedLocker, LockHandle, LockMode};
pub use schema_check::{BreakingChangeChecker, BufChecker};
pub use source_cache::{GitSourceCache, SourceCache};
