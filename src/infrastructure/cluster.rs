//! Kubernetes cluster access
//!
//! Services run as Knative `serving.knative.dev/v1` Services, one per major
//! series. Only the fields cadence reads or writes are modelled; the
//! revision template reuses the core `PodSpec`.

use k8s_openapi::api::core::v1::PodSpec;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, CustomResource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::domain::TrafficEntry;
use crate::error::ClusterError;

/// Desired state of a Knative Service
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "serving.knative.dev",
    version = "v1",
    kind = "Service",
    root = "KnativeService",
    status = "KnativeServiceStatus",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct KnativeServiceSpec {
    pub template: RevisionTemplate,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traffic: Vec<TrafficTarget>,
}

/// Template every new revision is created from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionTemplate {
    pub spec: PodSpec,
}

/// Observed routing state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnativeServiceStatus {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
}

/// One entry of a route's traffic block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&TrafficTarget> for TrafficEntry {
    fn from(target: &TrafficTarget) -> Self {
        Self {
            tag: target.tag.clone(),
            revision_name: target.revision_name.clone(),
            configuration_name: target.configuration_name.clone(),
            latest_revision: target.latest_revision,
            percent: target.percent,
            url: target.url.clone(),
        }
    }
}

impl From<TrafficEntry> for TrafficTarget {
    fn from(entry: TrafficEntry) -> Self {
        Self {
            tag: entry.tag,
            revision_name: entry.revision_name,
            configuration_name: entry.configuration_name,
            latest_revision: entry.latest_revision,
            percent: entry.percent,
            url: entry.url,
        }
    }
}

impl KnativeService {
    /// Traffic currently routed, as reported by the status block
    pub fn routed_traffic(&self) -> Vec<TrafficEntry> {
        self.status
            .as_ref()
            .map(|status| status.traffic.iter().map(TrafficEntry::from).collect())
            .unwrap_or_default()
    }
}

/// Read and write access to routed services
#[allow(async_fn_in_trait)]
pub trait RoutingApi {
    /// Fetch a service; `None` when it does not exist yet
    async fn get(&self, name: &str) -> Result<Option<KnativeService>, ClusterError>;

    async fn create(&self, service: &KnativeService) -> Result<(), ClusterError>;

    /// Replace an existing service; `service` must carry the observed resource version
    async fn replace(&self, service: &KnativeService) -> Result<(), ClusterError>;
}

/// Knative services of one namespace
pub struct KnativeRouting {
    api: Api<KnativeService>,
}

impl KnativeRouting {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

impl RoutingApi for KnativeRouting {
    async fn get(&self, name: &str) -> Result<Option<KnativeService>, ClusterError> {
        let service = self.api.get_opt(name).await?;
        debug!(
            name = %name,
            resource_version = ?service.as_ref().and_then(|s| s.metadata.resource_version.clone()),
            "Fetched routing state"
        );
        Ok(service)
    }

    async fn create(&self, service: &KnativeService) -> Result<(), ClusterError> {
        self.api.create(&PostParams::default(), service).await?;
        Ok(())
    }

    async fn replace(&self, service: &KnativeService) -> Result<(), ClusterError> {
        let name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ClusterError::Client {
                message: "service to replace has no name".to_string(),
            })?;
        self.api
            .replace(name, &PostParams::default(), service)
            .await?;
        Ok(())
    }
}

/// Create a Kubernetes client
///
/// Uses the given kubeconfig file when set, otherwise infers the
/// configuration (`$KUBECONFIG`, `~/.kube/config`, in-cluster).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, ClusterError> {
    let client_error = |message: String| ClusterError::Client { message };

    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                client_error(format!("failed to read {}: {}", path.display(), e))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| client_error(e.to_string()))?
        }
        None => Config::infer()
            .await
            .map_err(|e| client_error(format!("failed to infer kubeconfig: {}", e)))?,
    };

    Client::try_from(config).map_err(|e| client_error(e.to_string()))
}

/// Whether a kube error is an optimistic-concurrency conflict
pub fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Version;

    #[test]
    fn test_deserialize_status() {
        let json = serde_json::json!({
            "apiVersion": "serving.knative.dev/v1",
            "kind": "Service",
            "metadata": { "name": "billing-v1", "resourceVersion": "42" },
            "spec": {
                "template": { "spec": { "containers": [{ "name": "user-container", "image": "dev.local/billing:v1.3.0" }] } },
                "traffic": [{ "tag": "v3-0", "latestRevision": true, "percent": 100 }]
            },
            "status": {
                "url": "http://billing-v1.default.example.com",
                "traffic": [{
                    "tag": "v3-0",
                    "revisionName": "billing-v1-00003",
                    "latestRevision": true,
                    "percent": 100,
                    "url": "http://v3-0-billing-v1.default.example.com"
                }]
            }
        });

        let service: KnativeService = serde_json::from_value(json).unwrap();
        assert_eq!(service.metadata.resource_version.as_deref(), Some("42"));
        let routed = service.routed_traffic();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].tag.as_deref(), Some("v3-0"));
        assert_eq!(routed[0].revision_name.as_deref(), Some("billing-v1-00003"));
        assert_eq!(routed[0].percent, Some(100));
    }

    #[test]
    fn test_serialize_omits_empty_fields() {
        let mut service = KnativeService::new("billing-v1", KnativeServiceSpec::default());
        let entry = TrafficEntry::new_revision(&Version::new(1, 0, 0), 100);
        service.spec.traffic = vec![entry.into()];

        let value = serde_json::to_value(&service).unwrap();
        assert_eq!(value["apiVersion"], "serving.knative.dev/v1");
        assert_eq!(value["kind"], "Service");
        let traffic = &value["spec"]["traffic"][0];
        assert_eq!(traffic["tag"], "v0-0");
        assert_eq!(traffic["latestRevision"], true);
        assert!(traffic.get("revisionName").is_none());
    }

    #[test]
    fn test_missing_status_means_nothing_routed() {
        let service = KnativeService::new("billing-v1", KnativeServiceSpec::default());
        assert!(service.routed_traffic().is_empty());
    }
}
