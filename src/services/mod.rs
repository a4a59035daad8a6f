//! Services layer - orchestration logic
//!
//! This module coordinates between domain logic and infrastructure.
//! Services are generic over the infrastructure traits so they can run
//! against in-memory fakes in tests.

pub mod deploy_service;
pub mod graph_validator;
pub mod sync_service;

// Re-export commonly used types
pub use deploy_service::{DeployOptions, DeployOutcome, DeployService};
pub use sync_service::SyncService;
