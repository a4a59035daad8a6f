//! CLI definitions for cadence
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::ClusterArgs;
use crate::domain::Stage;

#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "Release orchestrator for versioned backend services",
    long_about = "Assigns semantic versions to services, validates their dependency graph\nand rolls new revisions out to the cluster with canary traffic control."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory (defaults to the nearest directory with a cadence.yaml)
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Local mode: skip dependency fetches and use the local image registry
    #[arg(short, long, global = true)]
    pub local: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Cluster connection flags
#[derive(Args, Debug, Clone)]
pub struct ClusterFlags {
    /// Path to the kubeconfig file (otherwise $KUBECONFIG, ~/.kube/config or in-cluster)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubernetes namespace (defaults to the global config, then "default")
    #[arg(long, env = "CADENCE_NAMESPACE")]
    pub namespace: Option<String>,
}

impl From<ClusterFlags> for ClusterArgs {
    fn from(flags: ClusterFlags) -> Self {
        Self {
            kubeconfig: flags.kubeconfig,
            namespace: flags.namespace,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize dependencies and compute the next version
    Sync {
        /// Override the release stage for this pass (development, production, major)
        #[arg(long)]
        stage: Option<Stage>,
    },

    /// Tag the committed tree with the synchronized version
    ///
    /// The project must be synced and the working tree must be clean.
    Freeze,

    /// Roll the frozen version out to the cluster
    Deploy {
        #[command(flatten)]
        cluster: ClusterFlags,

        /// Number of tries to take the deploy lock
        #[arg(long)]
        attempts_limit: Option<u32>,

        /// Pause between tries (e.g., "10s", "1m")
        #[arg(long)]
        backoff: Option<String>,

        /// How long a single try waits for the lock (e.g., "30s")
        #[arg(long)]
        lock_timeout: Option<String>,

        /// Deploy even if HEAD is not tagged with a version
        #[arg(short, long)]
        force_frozen: bool,
    },

    /// Show the routed revisions of the current major series
    Status {
        #[command(flatten)]
        cluster: ClusterFlags,

        /// Major series to show instead of the one in the lock file
        #[arg(short, long)]
        major: Option<u64>,
    },

    /// Add another service as a dependency
    #[command(subcommand)]
    Add(AddCommands),

    /// Print the environment variable holding a dependency's address
    ///
    /// Defaults to this project's own service, as recorded in the lock file.
    Env {
        /// Service name (e.g., "order-history")
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AddCommands {
    /// Add a dependency fetched from a git remote
    Remote {
        /// Git URL of the dependency
        url: String,

        /// Version constraint (defaults to the latest major series, e.g. "v2")
        version: Option<String>,
    },

    /// Add a dependency from a local git checkout
    Local {
        /// Path to the checkout, relative to the project directory
        path: PathBuf,

        /// Version constraint (defaults to the latest major series, e.g. "v2")
        version: Option<String>,
    },
}
