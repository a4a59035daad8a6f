//! Distributed lock stored on a Kubernetes ConfigMap
//!
//! Holders of lock `{name}` are recorded as a JSON list in the annotation
//! `cadence.io/lock.{name}` of a per-service ConfigMap. Every write carries
//! the resource version it was computed from, so two processes racing for
//! the lock cannot both win: the loser gets a conflict and re-reads.
//!
//! Holders never renew their record; a record older than the stale-after
//! period belongs to a crashed process and is evicted on the next attempt.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cluster::is_conflict;
use crate::error::ClusterError;

const ANNOTATION_PREFIX: &str = "cadence.io/lock.";

/// Interval between polls while waiting for a lock
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Coexists with other shared holders
    Shared,
    /// Excludes every other holder
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions {
    pub mode: LockMode,
    /// How long to wait for the lock before giving up
    pub timeout: Duration,
}

/// Proof of a held lock, handed back on release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub id: Uuid,
    pub name: String,
}

/// Mutual exclusion across processes and machines
#[allow(async_fn_in_trait)]
pub trait DistributedLocker {
    /// Try to take `name` within the options' timeout; `None` when it stayed busy
    async fn acquire(
        &self,
        name: &str,
        options: AcquireOptions,
    ) -> Result<Option<LockHandle>, ClusterError>;

    async fn release(&self, handle: LockHandle) -> Result<(), ClusterError>;
}

/// One holder record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockHolder {
    id: Uuid,
    mode: LockMode,
    acquired_at: DateTime<Utc>,
}

impl LockHolder {
    fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        let age = now.signed_duration_since(self.acquired_at);
        age.to_std().map(|age| age > stale_after).unwrap_or(false)
    }
}

/// Evict stale holders and add `candidate` if compatible with the rest
///
/// Returns whether the candidate now holds the lock.
fn try_claim(
    holders: &mut Vec<LockHolder>,
    candidate: LockHolder,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> bool {
    holders.retain(|holder| {
        let stale = holder.is_stale(now, stale_after);
        if stale {
            warn!(holder = %holder.id, acquired_at = %holder.acquired_at, "Evicting stale lock holder");
        }
        !stale
    });

    let compatible = match candidate.mode {
        LockMode::Exclusive => holders.is_empty(),
        LockMode::Shared => holders.iter().all(|holder| holder.mode == LockMode::Shared),
    };
    if compatible {
        holders.push(candidate);
    }
    compatible
}

fn annotation_key(name: &str) -> String {
    format!("{}{}", ANNOTATION_PREFIX, name)
}

/// Locks kept on one ConfigMap
pub struct ConfigMapLocker {
    api: Api<ConfigMap>,
    resource: String,
    stale_after: Duration,
}

impl ConfigMapLocker {
    pub fn new(
        client: Client,
        namespace: &str,
        resource: impl Into<String>,
        stale_after: Duration,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            resource: resource.into(),
            stale_after,
        }
    }

    /// Fetch the coordination ConfigMap, creating it on first use
    async fn get_or_create(&self) -> Result<ConfigMap, ClusterError> {
        if let Some(config_map) = self.api.get_opt(&self.resource).await? {
            return Ok(config_map);
        }

        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.resource.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        match self.api.create(&PostParams::default(), &config_map).await {
            Ok(created) => {
                info!(resource = %self.resource, "Created lock resource");
                Ok(created)
            }
            // Someone else created it in the meantime
            Err(e) if is_conflict(&e) => Ok(self.api.get(&self.resource).await?),
            Err(e) => Err(e.into()),
        }
    }

    fn holders(&self, config_map: &ConfigMap, name: &str) -> Result<Vec<LockHolder>, ClusterError> {
        let raw = config_map
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(&annotation_key(name)));
        match raw {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| ClusterError::CorruptLock {
                resource: self.resource.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Write holders back; `false` when the ConfigMap changed since it was read
    async fn store(
        &self,
        mut config_map: ConfigMap,
        name: &str,
        holders: &[LockHolder],
    ) -> Result<bool, ClusterError> {
        let annotations = config_map.metadata.annotations.get_or_insert_with(Default::default);
        let key = annotation_key(name);
        if holders.is_empty() {
            annotations.remove(&key);
        } else {
            let value = serde_json::to_string(holders).map_err(|e| ClusterError::CorruptLock {
                resource: self.resource.clone(),
                message: e.to_string(),
            })?;
            annotations.insert(key, value);
        }

        match self
            .api
            .replace(&self.resource, &PostParams::default(), &config_map)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_conflict(&e) => {
                debug!(resource = %self.resource, "Lock resource changed concurrently, retrying");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl DistributedLocker for ConfigMapLocker {
    async fn acquire(
        &self,
        name: &str,
        options: AcquireOptions,
    ) -> Result<Option<LockHandle>, ClusterError> {
        let deadline = tokio::time::Instant::now() + options.timeout;

        loop {
            let config_map = self.get_or_create().await?;
            let mut holders = self.holders(&config_map, name)?;
            let candidate = LockHolder {
                id: Uuid::new_v4(),
                mode: options.mode,
                acquired_at: Utc::now(),
            };
            let id = candidate.id;

            if try_claim(&mut holders, candidate, Utc::now(), self.stale_after) {
                if self.store(config_map, name, &holders).await? {
                    debug!(resource = %self.resource, lock = %name, holder = %id, "Lock acquired");
                    return Ok(Some(LockHandle {
                        id,
                        name: name.to_string(),
                    }));
                }
                continue;
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<(), ClusterError> {
        loop {
            let Some(config_map) = self.api.get_opt(&self.resource).await? else {
                return Ok(());
            };
            let mut holders = self.holders(&config_map, &handle.name)?;
            let before = holders.len();
            holders.retain(|holder| holder.id != handle.id);
            if holders.len() == before {
                warn!(resource = %self.resource, holder = %handle.id, "Lock was no longer held");
                return Ok(());
            }
            if self.store(config_map, &handle.name, &holders).await? {
                debug!(resource = %self.resource, lock = %handle.name, "Lock released");
                return Ok(());
            }
        }
    }
}
