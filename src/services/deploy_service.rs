//! Deploy service - canary rollout of the current version
//!
//! Every attempt runs under the exclusive lock of the service's major
//! series, so the routed state read at the start of an attempt is still
//! current when the new traffic split is written.

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, LocalObjectReference, PodSpec,
    SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::naming::{
    internal_host, lock_resource_name, registry_secret_name, secret_env, secret_mount_path,
    secret_volume_name, service_env, service_identifier, SECRET_KEY,
};
use crate::domain::{plan_traffic, ProjectConfig, TrafficEntry, Version};
use crate::error::{ConsistencyError, DeployError};
use crate::infrastructure::cluster::{KnativeServiceSpec, RevisionTemplate};
use crate::infrastructure::{
    AcquireOptions, DistributedLocker, KnativeService, LockMode, RoutingApi,
};

/// Name of the lock guarding deploys of one major series
pub const DEPLOY_LOCK: &str = "lock";

/// Port the service container listens on
const CONTAINER_PORT: i32 = 80;

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub namespace: String,
    pub attempts_limit: u32,
    /// Pause between attempts
    pub backoff: Duration,
    /// How long one attempt waits for the lock
    pub lock_timeout: Duration,
    /// Use the local registry whatever the config says
    pub force_local: bool,
}

/// What a successful deploy did
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub service: String,
    pub version: Version,
    pub image: String,
    /// The routed service did not exist before
    pub created: bool,
    pub traffic: Vec<TrafficEntry>,
    pub attempts: u32,
}

/// Rolls out the current version of a project
pub struct DeployService<R, L> {
    routing: R,
    locker: L,
    options: DeployOptions,
}

impl<R: RoutingApi, L: DistributedLocker> DeployService<R, L> {
    pub fn new(routing: R, locker: L, options: DeployOptions) -> Self {
        Self {
            routing,
            locker,
            options,
        }
    }

    /// Deploy, retrying while the lock is busy or the routed state is ahead of us
    ///
    /// Sleeps `backoff` between attempts but not after the last one.
    pub async fn deploy(&self, config: &ProjectConfig) -> Result<DeployOutcome, DeployError> {
        let current = config.current_version()?;
        let resource = lock_resource_name(&config.name, &current);
        let attempts = self.options.attempts_limit.max(1);
        let lock_options = AcquireOptions {
            mode: LockMode::Exclusive,
            timeout: self.options.lock_timeout,
        };

        let mut last_violation = None;
        for attempt in 1..=attempts {
            match self.locker.acquire(DEPLOY_LOCK, lock_options).await? {
                None => {
                    info!(attempt, lock = %resource, "Lock is busy");
                    last_violation = None;
                }
                Some(handle) => {
                    debug!(attempt, lock = %resource, "Lock taken");
                    let result = self.attempt(config, &current).await;
                    let released = self.locker.release(handle).await;

                    match result {
                        Ok(mut outcome) => {
                            released?;
                            outcome.attempts = attempt;
                            return Ok(outcome);
                        }
                        Err(DeployError::OrderingViolation { routed, promoting }) => {
                            warn!(
                                attempt,
                                routed = ?routed.map(|v| v.to_string()),
                                promoting = %promoting,
                                "Routed versions are ahead of this deploy, waiting"
                            );
                            released?;
                            last_violation =
                                Some(DeployError::OrderingViolation { routed, promoting });
                        }
                        Err(e) => {
                            if let Err(release_error) = released {
                                warn!(error = %release_error, "Failed to release lock");
                            }
                            return Err(e);
                        }
                    }
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.options.backoff).await;
            }
        }

        Err(last_violation.unwrap_or(DeployError::LockUnavailable {
            lock: resource,
            attempts,
        }))
    }

    /// One read-plan-write pass; must run under the lock
    async fn attempt(
        &self,
        config: &ProjectConfig,
        current: &Version,
    ) -> Result<DeployOutcome, DeployError> {
        let name = service_identifier(&config.name, current);
        let existing = self.routing.get(&name).await?;
        let routed = existing
            .as_ref()
            .map(KnativeService::routed_traffic)
            .unwrap_or_default();

        let traffic = plan_traffic(config, &routed)?;
        let (image, template) = revision_template(config, &self.options)?;
        let spec = KnativeServiceSpec {
            template,
            traffic: traffic.iter().cloned().map(Into::into).collect(),
        };

        let created = match existing {
            Some(mut service) => {
                service.spec = spec;
                service.status = None;
                self.routing.replace(&service).await?;
                info!(service = %name, version = %current, "Updated service");
                false
            }
            None => {
                self.routing
                    .create(&KnativeService::new(&name, spec))
                    .await?;
                info!(service = %name, version = %current, "Created service");
                true
            }
        };

        Ok(DeployOutcome {
            service: name,
            version: *current,
            image,
            created,
            traffic,
            attempts: 0,
        })
    }
}

/// Pod template of the revision serving the current version
///
/// Returns the image reference alongside the template.
pub fn revision_template(
    config: &ProjectConfig,
    options: &DeployOptions,
) -> Result<(String, RevisionTemplate), DeployError> {
    let current = config.current_version()?;
    let (image, is_local) = config.build_tag(options.force_local)?;
    if is_local {
        info!(image = %image, "Using locally built image");
    }

    let mut env = vec![
        plain_env("CADENCE_SELF_NAME", config.name.clone()),
        plain_env("CADENCE_SELF_VERSION", current.to_string()),
    ];
    for dependency in config.dependencies.values() {
        let resolved =
            dependency
                .resolved
                .ok_or_else(|| ConsistencyError::UnresolvedDependency {
                    dependency: dependency.name.clone(),
                })?;
        let host = internal_host(
            &dependency.name,
            &resolved,
            &dependency.constraint,
            &options.namespace,
        );
        env.push(plain_env(&service_env(&dependency.name), host));
    }

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    for secret in &config.secrets {
        env.push(EnvVar {
            name: secret_env(secret),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    key: SECRET_KEY.to_string(),
                    name: secret.clone().into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        volumes.push(Volume {
            name: secret_volume_name(secret),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: secret_volume_name(secret),
            mount_path: secret_mount_path(secret),
            read_only: Some(true),
            ..Default::default()
        });
    }

    let container = Container {
        name: config.name.clone(),
        image: Some(image.clone()),
        image_pull_policy: Some("Always".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some("h2c".to_string()),
            container_port: CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env),
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        ..Default::default()
    };

    let spec = PodSpec {
        containers: vec![container],
        volumes: (!volumes.is_empty()).then_some(volumes),
        image_pull_secrets: Some(vec![LocalObjectReference {
            name: registry_secret_name(&config.name).into(),
        }]),
        ..Default::default()
    };

    Ok((image, RevisionTemplate { spec }))
}

fn plain_env(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Constraint, Dependency, DependencySource};
    use crate::error::ClusterError;
    use crate::infrastructure::cluster::{KnativeServiceStatus, TrafficTarget};
    use crate::infrastructure::LockHandle;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    /// Routing state served in sequence, the last state repeating
    #[derive(Default)]
    struct FakeRouting {
        states: Mutex<VecDeque<Option<KnativeService>>>,
        created: Mutex<Vec<KnativeService>>,
        replaced: Mutex<Vec<KnativeService>>,
    }

    impl FakeRouting {
        fn serving(states: Vec<Option<KnativeService>>) -> Self {
            Self {
                states: Mutex::new(states.into()),
                ..Default::default()
            }
        }

        fn writes(&self) -> usize {
            self.created.lock().unwrap().len() + self.replaced.lock().unwrap().len()
        }
    }

    impl RoutingApi for FakeRouting {
        async fn get(&self, _name: &str) -> Result<Option<KnativeService>, ClusterError> {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.pop_front().flatten())
            } else {
                Ok(states.front().cloned().flatten())
            }
        }

        async fn create(&self, service: &KnativeService) -> Result<(), ClusterError> {
            self.created.lock().unwrap().push(service.clone());
            Ok(())
        }

        async fn replace(&self, service: &KnativeService) -> Result<(), ClusterError> {
            self.replaced.lock().unwrap().push(service.clone());
            Ok(())
        }
    }

    /// Refuses the first `refusals` acquisitions
    struct FakeLocker {
        refusals: u32,
        acquired: Mutex<u32>,
        released: Mutex<Vec<LockHandle>>,
    }

    impl FakeLocker {
        fn refusing(refusals: u32) -> Self {
            Self {
                refusals,
                acquired: Mutex::new(0),
                released: Mutex::new(Vec::new()),
            }
        }

        fn acquisitions(&self) -> u32 {
            *self.acquired.lock().unwrap()
        }

        fn releases(&self) -> usize {
            self.released.lock().unwrap().len()
        }
    }

    impl DistributedLocker for FakeLocker {
        async fn acquire(
            &self,
            name: &str,
            options: AcquireOptions,
        ) -> Result<Option<LockHandle>, ClusterError> {
            assert_eq!(options.mode, LockMode::Exclusive);
            let mut acquired = self.acquired.lock().unwrap();
            *acquired += 1;
            if *acquired <= self.refusals {
                return Ok(None);
            }
            Ok(Some(LockHandle {
                id: Uuid::new_v4(),
                name: name.to_string(),
            }))
        }

        async fn release(&self, handle: LockHandle) -> Result<(), ClusterError> {
            self.released.lock().unwrap().push(handle);
            Ok(())
        }
    }

    fn options(attempts_limit: u32) -> DeployOptions {
        DeployOptions {
            namespace: "default".to_string(),
            attempts_limit,
            backoff: Duration::from_millis(1),
            lock_timeout: Duration::from_millis(1),
            force_local: false,
        }
    }

    fn config(current: &str) -> ProjectConfig {
        let mut config = ProjectConfig::new("billing");
        config.current_version = Some(v(current));
        config.registry = Some("registry.example.com".to_string());
        config
    }

    /// Service `billing-v1` routing all traffic to `routed`
    fn routed_service(routed: &str) -> KnativeService {
        let version = v(routed);
        let tag = format!("v{}-{}", version.minor, version.patch);
        let mut service = KnativeService::new("billing-v1", KnativeServiceSpec::default());
        service.metadata.resource_version = Some("7".to_string());
        service.status = Some(KnativeServiceStatus {
            url: Some("http://billing-v1.default.example.com".to_string()),
            traffic: vec![TrafficTarget {
                tag: Some(tag.clone()),
                revision_name: Some("billing-v1-00003".to_string()),
                latest_revision: Some(false),
                percent: Some(100),
                url: Some(format!("http://{}-billing-v1.default.example.com", tag)),
                ..Default::default()
            }],
        });
        service
    }

    #[tokio::test]
    async fn test_first_deploy_creates_service() {
        let deploy = DeployService::new(
            FakeRouting::serving(vec![None]),
            FakeLocker::refusing(0),
            options(3),
        );

        let outcome = deploy.deploy(&config("v1.0.0")).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.service, "billing-v1");
        assert_eq!(outcome.image, "registry.example.com/billing:v1.0.0");
        assert_eq!(outcome.attempts, 1);

        let created = deploy.routing.created.lock().unwrap();
        assert_eq!(created[0].metadata.name.as_deref(), Some("billing-v1"));
        assert_eq!(created[0].spec.traffic[0].tag.as_deref(), Some("v0-0"));
        assert_eq!(created[0].spec.traffic[0].percent, Some(100));
        assert_eq!(deploy.locker.releases(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_resource_version() {
        let deploy = DeployService::new(
            FakeRouting::serving(vec![Some(routed_service("v1.3.0"))]),
            FakeLocker::refusing(0),
            options(3),
        );

        let outcome = deploy.deploy(&config("v1.4.0")).await.unwrap();
        assert!(!outcome.created);

        let replaced = deploy.routing.replaced.lock().unwrap();
        let service = &replaced[0];
        assert_eq!(service.metadata.resource_version.as_deref(), Some("7"));
        assert!(service.status.is_none());
        let percents: Vec<_> = service
            .spec
            .traffic
            .iter()
            .map(|t| (t.tag.clone().unwrap(), t.percent))
            .collect();
        assert_eq!(
            percents,
            vec![("v4-0".to_string(), Some(100)), ("v3-0".to_string(), Some(0))]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts_limit() {
        let deploy = DeployService::new(
            FakeRouting::serving(vec![None]),
            FakeLocker::refusing(u32::MAX),
            options(3),
        );

        let err = deploy.deploy(&config("v1.0.0")).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::LockUnavailable { ref lock, attempts: 3 } if lock == "cadence-lock-billing-v1"
        ));
        assert_eq!(deploy.locker.acquisitions(), 3);
        assert_eq!(deploy.routing.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_separated_by_backoff() {
        let options = DeployOptions {
            backoff: Duration::from_secs(10),
            ..options(3)
        };
        let deploy = DeployService::new(
            FakeRouting::serving(vec![None]),
            FakeLocker::refusing(u32::MAX),
            options,
        );

        let started = tokio::time::Instant::now();
        let err = deploy.deploy(&config("v1.0.0")).await.unwrap_err();
        assert!(matches!(err, DeployError::LockUnavailable { attempts: 3, .. }));
        // Two pauses between three attempts, none after the last
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_backing_off() {
        let options = DeployOptions {
            backoff: Duration::from_secs(10),
            ..options(5)
        };
        let deploy = DeployService::new(
            FakeRouting::serving(vec![None]),
            FakeLocker::refusing(1),
            options,
        );

        let started = tokio::time::Instant::now();
        let outcome = deploy.deploy(&config("v1.0.0")).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_busy_lock_is_retried() {
        let deploy = DeployService::new(
            FakeRouting::serving(vec![None]),
            FakeLocker::refusing(1),
            options(3),
        );

        let outcome = deploy.deploy(&config("v1.0.0")).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(deploy.locker.acquisitions(), 2);
        assert_eq!(deploy.locker.releases(), 1);
    }

    #[tokio::test]
    async fn test_ordering_violation_waits_for_predecessor() {
        let deploy = DeployService::new(
            FakeRouting::serving(vec![
                Some(routed_service("v1.3.0")),
                Some(routed_service("v1.4.0")),
            ]),
            FakeLocker::refusing(0),
            options(3),
        );

        let outcome = deploy.deploy(&config("v1.5.0")).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(deploy.locker.releases(), 2);
        assert_eq!(deploy.routing.writes(), 1);
    }

    #[tokio::test]
    async fn test_persistent_ordering_violation() {
        let deploy = DeployService::new(
            FakeRouting::serving(vec![Some(routed_service("v1.3.0"))]),
            FakeLocker::refusing(0),
            options(2),
        );

        let err = deploy.deploy(&config("v1.5.0")).await.unwrap_err();
        assert!(matches!(err, DeployError::OrderingViolation { .. }));
        assert_eq!(deploy.locker.releases(), 2);
        assert_eq!(deploy.routing.writes(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_dependency_releases_lock() {
        let mut config = config("v1.0.0");
        config.dependencies.insert(
            "users".to_string(),
            Dependency::new(
                "users",
                Constraint::Any,
                DependencySource::Remote("https://git.example.com/users".to_string()),
            ),
        );
        let deploy = DeployService::new(
            FakeRouting::serving(vec![None]),
            FakeLocker::refusing(0),
            options(3),
        );

        let err = deploy.deploy(&config).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Consistency(ConsistencyError::UnresolvedDependency { .. })
        ));
        assert_eq!(deploy.locker.acquisitions(), 1);
        assert_eq!(deploy.locker.releases(), 1);
    }

    #[test]
    fn test_revision_template() {
        let mut config = config("v1.2.0");
        let mut users = Dependency::new(
            "users",
            Constraint::parse("v2").unwrap(),
            DependencySource::Remote("https://git.example.com/users".to_string()),
        );
        users.resolved = Some(v("v2.1.4"));
        config.dependencies.insert("users".to_string(), users);
        config.secrets = vec!["stripe".to_string()];

        let (image, template) = revision_template(&config, &options(1)).unwrap();
        assert_eq!(image, "registry.example.com/billing:v1.2.0");

        let container = &template.spec.containers[0];
        assert_eq!(container.name, "billing");
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));
        let port = &container.ports.as_ref().unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("h2c"));
        assert_eq!(port.container_port, 80);

        let env = container.env.as_ref().unwrap();
        let value = |name: &str| {
            env.iter()
                .find(|var| var.name == name)
                .and_then(|var| var.value.clone())
        };
        assert_eq!(value("CADENCE_SELF_NAME").as_deref(), Some("billing"));
        assert_eq!(value("CADENCE_SELF_VERSION").as_deref(), Some("v1.2.0"));
        assert_eq!(
            value("CADENCE_SERVICE_USERS").as_deref(),
            Some("users-v2.default.svc.cluster.local")
        );
        let secret = env
            .iter()
            .find(|var| var.name == "CADENCE_SECRET_STRIPE")
            .unwrap();
        let selector = secret
            .value_from
            .as_ref()
            .and_then(|source| source.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(selector.key, "cadence-secret");

        let mounts = container.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, "/etc/cadence/secret/stripe");
        let volumes = template.spec.volumes.as_ref().unwrap();
        assert_eq!(volumes[0].name, "cadence-secret-mount-stripe");
        assert_eq!(template.spec.image_pull_secrets.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_force_local_registry() {
        let mut options = options(1);
        options.force_local = true;
        let (image, _) = revision_template(&config("v1.2.0"), &options).unwrap();
        assert_eq!(image, "dev.local/billing:v1.2.0");
    }
}
