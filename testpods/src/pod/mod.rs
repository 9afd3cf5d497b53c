//! The test pod lifecycle orchestrator.
//!
//! A [`TestPod`] owns the full provisioning sequence for one ephemeral dependency: namespace,
//! storage, workload, exposures, the readiness wait and the external access coordinate, and the
//! symmetric teardown. It is one concrete type; the differences between a stateless dependency
//! and a stable-identity one (which workload resource, which default exposures, which default
//! wait strategy) are variant data, not subclasses.

mod error;

pub use error::{Error, Result};

use crate::cluster::{ExternalAccessStrategy, HostAndPort, TestNamespace};
use crate::constants::LABEL_APP;
use crate::defaults::{self, ImagePullPolicy};
use crate::error::MissingFieldSnafu;
use crate::service::{
    ClusterIpServiceManager, CompositeServiceManager, HeadlessServiceManager,
    NodePortServiceManager, ServiceConfig, ServiceKind, ServiceManager,
};
use crate::storage::{CompositeStorageManager, StorageManager};
use crate::wait::{
    PortWaitStrategy, ReadinessWaitStrategy, WaitStrategy, WaitTarget, WorkloadRef,
};
use crate::workload::{
    DeploymentManager, StatefulSetManager, WorkloadConfig, WorkloadKind, WorkloadManager,
};
use error::{
    ClusterResolutionSnafu, ExposureSnafu, ExternalAccessSnafu, InvalidConfigSnafu,
    InvalidTransitionSnafu, LogsSnafu, NamespaceSnafu, NoExternalAccessSnafu, NoPodFoundSnafu,
    NotStartedSnafu, ReadinessSnafu, StorageSnafu, WorkloadSnafu,
};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, Pod as K8sPod, PodSpec};
use kube::api::{ListParams, LogParams};
use kube::Api;
use log::{debug, info, warn};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Where a pod is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Provisioning,
    Ready,
    Stopping,
    Stopped,
    /// Provisioning failed; whatever had been created has been cleaned up best-effort. `stop`
    /// may still be called to retry the teardown.
    Failed,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unstarted => "unstarted",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The workload variant backing a pod. Everything variant-specific (workload resource, default
/// exposures, default wait strategy) branches on this.
#[derive(Debug, Clone, Copy)]
enum Variant {
    Deployment,
    StatefulSet,
}

/// An exposure to create for the pod, turned into a concrete service manager once the cluster
/// connection is resolved at start time.
#[derive(Debug, Clone)]
pub enum ExposurePlan {
    /// An internal-only virtual address.
    ClusterIp,
    /// Stable per-replica DNS with no virtual address.
    Headless,
    /// A port reserved on every cluster node; `node_port` pins it, otherwise the cluster
    /// chooses.
    NodePort { node_port: Option<u16> },
}

impl ExposurePlan {
    fn kind(&self) -> ServiceKind {
        match self {
            Self::ClusterIp => ServiceKind::ClusterIp,
            Self::Headless => ServiceKind::Headless,
            Self::NodePort { .. } => ServiceKind::NodePort,
        }
    }

    fn build(&self, client: &kube::Client) -> Box<dyn ServiceManager> {
        match self {
            Self::ClusterIp => Box::new(ClusterIpServiceManager::new(client.clone())),
            Self::Headless => Box::new(HeadlessServiceManager::new(client.clone())),
            Self::NodePort { node_port } => {
                let mut manager = NodePortServiceManager::new(client.clone());
                if let Some(port) = node_port {
                    manager = manager.with_node_port(*port);
                }
                Box::new(manager)
            }
        }
    }
}

/// Name suffixes for a set of exposures: headless members are suffixed `-headless`, the first
/// of the remaining members gets the bare name, any further members are indexed.
fn exposure_suffixes(kinds: &[ServiceKind]) -> Vec<String> {
    let mut suffixes = Vec::with_capacity(kinds.len());
    let mut bare_taken = false;
    for (i, kind) in kinds.iter().enumerate() {
        let suffix = match kind {
            ServiceKind::Headless => "-headless".to_string(),
            _ if !bare_taken => {
                bare_taken = true;
                String::new()
            }
            _ => format!("-{}", i),
        };
        suffixes.push(suffix);
    }
    suffixes
}

/// Derive a DNS-safe resource name from an image reference:
/// `my.registry.io/team/postgres:15-alpine` becomes `postgres`.
fn derive_name_from_image(image: &str) -> String {
    let without_tag = image.rsplit_once(':').map(|(l, _)| l).unwrap_or(image);
    let name = without_tag
        .rsplit_once('/')
        .map(|(_, r)| r)
        .unwrap_or(without_tag);
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// An ephemeral dependency provisioned into the cluster for the duration of a test.
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use testpods::TestPod;
///
/// let mut redis = TestPod::deployment("redis:7-alpine").with_port(6379);
/// redis.start().await?;
/// let (host, port) = (redis.external_host()?, redis.external_port()?);
/// // ... run the test against host:port ...
/// redis.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct TestPod {
    variant: Variant,
    image: String,
    name: Option<String>,
    ports: Vec<u16>,
    env: Vec<(String, String)>,
    command: Option<Vec<String>>,
    args: Option<Vec<String>>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    replicas: i32,
    image_pull_policy: Option<ImagePullPolicy>,

    explicit_cluster: Option<crate::cluster::ClusterConnection>,
    explicit_namespace_name: Option<String>,
    namespace: Option<TestNamespace>,
    access: Option<ExternalAccessStrategy>,
    wait: Option<Box<dyn WaitStrategy>>,
    exposure_plans: Vec<ExposurePlan>,

    state: LifecycleState,
    storage: CompositeStorageManager,
    workload: Option<Box<dyn WorkloadManager>>,
    exposure: CompositeServiceManager,
    external: Option<HostAndPort>,
}

impl TestPod {
    /// A pod backed by a single-replica deployment: interchangeable replicas, no stable
    /// identity. The default exposure is an internal-only service and the default wait strategy
    /// is port reachability on the primary port.
    pub fn deployment<S: Into<String>>(image: S) -> Self {
        Self::new(Variant::Deployment, image)
    }

    /// A pod backed by a stateful set: ordered, named replicas with stable DNS and per-replica
    /// storage claims. The default exposures are a headless service (for replica DNS) plus an
    /// internal-only service, and the default wait strategy is the workload readiness condition
    /// with a two minute budget.
    pub fn stateful_set<S: Into<String>>(image: S) -> Self {
        Self::new(Variant::StatefulSet, image)
    }

    fn new<S: Into<String>>(variant: Variant, image: S) -> Self {
        Self {
            variant,
            image: image.into(),
            name: None,
            ports: Vec::new(),
            env: Vec::new(),
            command: None,
            args: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            replicas: 1,
            image_pull_policy: None,
            explicit_cluster: None,
            explicit_namespace_name: None,
            namespace: None,
            access: None,
            wait: None,
            exposure_plans: Vec::new(),
            state: LifecycleState::Unstarted,
            storage: CompositeStorageManager::default(),
            workload: None,
            exposure: CompositeServiceManager::default(),
            external: None,
        }
    }

    // =========================================================================
    // Fluent configuration
    // =========================================================================

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Expose a container port. The first port added is the primary port: the one services
    /// route to and the default wait strategy probes.
    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_env<S1: Into<String>, S2: Into<String>>(mut self, key: S1, value: S2) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_label<S1: Into<String>, S2: Into<String>>(mut self, key: S1, value: S2) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation<S1: Into<String>, S2: Into<String>>(
        mut self,
        key: S1,
        value: S2,
    ) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Replica count for stateful pods. Deployment-backed pods always run one replica.
    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_image_pull_policy(mut self, policy: ImagePullPolicy) -> Self {
        self.image_pull_policy = Some(policy);
        self
    }

    /// Attach a storage manager. May be called multiple times; managers are created in the
    /// order added and deleted in reverse.
    pub fn with_storage(mut self, storage: Box<dyn StorageManager>) -> Self {
        self.storage.push(storage);
        self
    }

    /// Add an exposure, replacing the variant's defaults. May be called multiple times;
    /// exposures are created in the order added and deleted in reverse.
    pub fn with_exposure(mut self, plan: ExposurePlan) -> Self {
        self.exposure_plans.push(plan);
        self
    }

    /// Replace the variant's default wait strategy.
    pub fn waiting_for(mut self, strategy: Box<dyn WaitStrategy>) -> Self {
        self.wait = Some(strategy);
        self
    }

    /// Place the pod in an existing namespace instead of resolving one from the defaults.
    pub fn in_namespace(mut self, namespace: TestNamespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Use this namespace name (created on demand) instead of a generated one.
    pub fn in_namespace_named<S: Into<String>>(mut self, name: S) -> Self {
        self.explicit_namespace_name = Some(name.into());
        self
    }

    /// Use this cluster connection instead of the configured or discovered default.
    pub fn in_cluster(mut self, connection: crate::cluster::ClusterConnection) -> Self {
        self.explicit_cluster = Some(connection);
        self
    }

    /// Override the cluster's external access strategy for this pod.
    pub fn with_access_strategy(mut self, access: ExternalAccessStrategy) -> Self {
        self.access = Some(access);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The pod's resource name: the explicit name if one was set, otherwise derived from the
    /// image reference.
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| derive_name_from_image(&self.image))
    }

    /// The namespace this pod runs in, once resolved during `start`.
    pub fn namespace(&self) -> Option<&TestNamespace> {
        self.namespace.as_ref()
    }

    /// The in-cluster DNS name of the pod's primary service.
    pub fn internal_host(&self) -> Option<String> {
        self.namespace
            .as_ref()
            .map(|ns| format!("{}.{}.svc.cluster.local", self.name(), ns.name()))
    }

    /// The workload manager, for advanced assertions. Present once provisioning has begun.
    pub fn workload_manager(&self) -> Option<&dyn WorkloadManager> {
        self.workload.as_deref()
    }

    /// The exposure managers, for advanced assertions.
    pub fn exposure(&self) -> &CompositeServiceManager {
        &self.exposure
    }

    /// The storage managers, for advanced assertions.
    pub fn storage(&self) -> &CompositeStorageManager {
        &self.storage
    }

    /// The node port reserved for this pod, once started with an external-static-port exposure.
    pub fn node_port(&self) -> Option<u16> {
        self.exposure.node_port()
    }

    /// The host a test connects to from outside the cluster. Fails before the pod is ready;
    /// afterwards this returns the coordinate cached during `start` and never re-probes the
    /// cluster.
    pub fn external_host(&self) -> Result<String> {
        Ok(self.external_endpoint()?.host().to_string())
    }

    /// The port a test connects to from outside the cluster. Same contract as
    /// [`external_host`](Self::external_host).
    pub fn external_port(&self) -> Result<u16> {
        Ok(self.external_endpoint()?.port())
    }

    pub fn external_endpoint(&self) -> Result<&HostAndPort> {
        ensure!(
            self.state == LifecycleState::Ready,
            NotStartedSnafu { pod: self.name() }
        );
        self.external
            .as_ref()
            .context(NoExternalAccessSnafu { pod: self.name() })
    }

    /// The logs of the pod's first replica. Available once provisioning has begun (including
    /// after a failed start, which is when logs matter most).
    pub async fn logs(&self) -> Result<String> {
        let namespace = self
            .namespace
            .as_ref()
            .context(NotStartedSnafu { pod: self.name() })?;
        let selector = format!("{}={}", LABEL_APP, self.name());
        let api: Api<K8sPod> = Api::namespaced(namespace.connection().client(), namespace.name());
        let pods = api
            .list(&ListParams {
                label_selector: Some(selector.clone()),
                ..Default::default()
            })
            .await
            .context(LogsSnafu { pod: self.name() })?;
        let pod_name = pods
            .items
            .into_iter()
            .next()
            .and_then(|pod| pod.metadata.name)
            .context(NoPodFoundSnafu {
                selector,
                namespace: namespace.name().to_string(),
            })?;
        api.logs(&pod_name, &LogParams::default())
            .await
            .context(LogsSnafu { pod: self.name() })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Provision the pod: resolve effective configuration, ensure the namespace, create
    /// storage, workload and exposures in order, wait for readiness, then resolve and cache the
    /// external access coordinate. On failure every already-created resource is deleted
    /// best-effort, in reverse creation order, before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        ensure!(
            self.state == LifecycleState::Unstarted,
            InvalidTransitionSnafu {
                operation: "start",
                pod: self.name(),
                state: self.state,
            }
        );
        self.state = LifecycleState::Provisioning;
        info!("starting pod '{}'", self.name());

        match self.provision().await {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                info!("pod '{}' is ready", self.name());
                Ok(())
            }
            Err(e) => {
                warn!(
                    "start failed for pod '{}', cleaning up already-created resources",
                    self.name()
                );
                self.cleanup_partial().await;
                self.state = LifecycleState::Failed;
                Err(e)
            }
        }
    }

    async fn provision(&mut self) -> Result<()> {
        let name = self.name();

        // Effective configuration: explicit settings win, then the thread-scoped defaults, then
        // the global defaults, then discovery/generation.
        let namespace = match &self.namespace {
            Some(namespace) => namespace.clone(),
            None => match defaults::shared_namespace() {
                Some(shared) => shared,
                None => {
                    let connection = match &self.explicit_cluster {
                        Some(connection) => connection.clone(),
                        None => defaults::resolve_cluster()
                            .await
                            .context(ClusterResolutionSnafu { pod: name.clone() })?,
                    };
                    let namespace_name = self
                        .explicit_namespace_name
                        .clone()
                        .unwrap_or_else(defaults::resolve_namespace_name);
                    TestNamespace::new(connection, namespace_name)
                }
            },
        };
        self.namespace = Some(namespace.clone());
        let client = namespace.connection().client();
        let access = self
            .access
            .get_or_insert_with(|| namespace.connection().access().clone())
            .clone();

        let primary_port = *self.ports.first().context(MissingFieldSnafu {
            field: "port",
            what: "test pod",
        })
        .context(InvalidConfigSnafu { pod: name.clone() })?;

        namespace
            .ensure()
            .await
            .context(NamespaceSnafu { pod: name.clone() })?;

        // Storage. Stateful pods get their persistent claims as per-replica templates on the
        // workload instead of standalone claims.
        let workload_kind = match self.variant {
            Variant::Deployment => WorkloadKind::Deployment,
            Variant::StatefulSet => WorkloadKind::StatefulSet,
        };
        if workload_kind == WorkloadKind::Deployment && !self.storage.is_empty() {
            self.storage
                .create(namespace.name(), &client)
                .await
                .context(StorageSnafu { pod: name.clone() })?;
        }

        // Exposure plans resolve now so the stateful workload can reference its headless
        // service by name, but the services themselves are created after the workload.
        let plans = if self.exposure_plans.is_empty() {
            match self.variant {
                Variant::Deployment => vec![ExposurePlan::ClusterIp],
                Variant::StatefulSet => {
                    vec![ExposurePlan::Headless, ExposurePlan::ClusterIp]
                }
            }
        } else {
            self.exposure_plans.clone()
        };
        let kinds: Vec<ServiceKind> = plans.iter().map(|p| p.kind()).collect();
        let suffixes = exposure_suffixes(&kinds);
        self.exposure = CompositeServiceManager::new(
            plans.iter().map(|plan| plan.build(&client)).collect(),
        )
        .with_suffixes(suffixes.clone());

        // Workload.
        let workload_config = WorkloadConfig::builder()
            .name(name.clone())
            .namespace(namespace.name())
            .labels(self.labels.clone())
            .annotations(self.annotations.clone())
            .pod_spec(self.build_pod_spec(&name, workload_kind))
            .build()
            .context(InvalidConfigSnafu { pod: name.clone() })?;

        let mut workload: Box<dyn WorkloadManager> = match self.variant {
            Variant::Deployment => Box::new(DeploymentManager::new(client.clone())),
            Variant::StatefulSet => {
                let headless = kinds
                    .iter()
                    .position(|kind| *kind == ServiceKind::Headless)
                    .map(|i| format!("{}{}", name, suffixes[i]))
                    .unwrap_or_else(|| name.clone());
                Box::new(
                    StatefulSetManager::new(client.clone())
                        .with_replicas(self.replicas)
                        .with_service_name(headless)
                        .with_claim_templates(self.storage.claim_templates()),
                )
            }
        };
        workload
            .create(&workload_config)
            .await
            .context(WorkloadSnafu { pod: name.clone() })?;
        self.workload = Some(workload);

        // Exposures.
        let service_config = ServiceConfig::builder()
            .name(name.clone())
            .namespace(namespace.name())
            .port(primary_port)
            .labels(workload_config.labels())
            .selector(workload_config.selector())
            .build()
            .context(InvalidConfigSnafu { pod: name.clone() })?;
        self.exposure
            .create(&service_config)
            .await
            .context(ExposureSnafu { pod: name.clone() })?;

        // The service whose endpoint reaches the pod from outside: an external-static-port
        // member if there is one, else the primary member.
        let endpoint_service = self
            .exposure
            .find_index(ServiceKind::NodePort)
            .or(Some(0))
            .and_then(|i| self.exposure.member_name(i));

        // Readiness.
        let mut target = WaitTarget::new(name.clone(), namespace.name())
            .with_client(client.clone())
            .with_pod_selector(format!("{}={}", LABEL_APP, name))
            .with_workload(WorkloadRef {
                kind: workload_kind,
                name: name.clone(),
            })
            .with_access(access.clone());
        if let Some(service) = &endpoint_service {
            target = target.with_service(service.clone());
        }
        // Default strategies: stateful pods wait on the workload readiness condition; generic
        // pods wait on port reachability when an externally reachable exposure exists, and fall
        // back to the readiness condition when everything is internal-only.
        let strategy: Box<dyn WaitStrategy> = match self.wait.take() {
            Some(strategy) => strategy,
            None => match self.variant {
                Variant::Deployment
                    if self.exposure.find_index(ServiceKind::NodePort).is_some() =>
                {
                    Box::new(PortWaitStrategy::new(primary_port))
                }
                Variant::Deployment | Variant::StatefulSet => {
                    Box::new(ReadinessWaitStrategy::new())
                }
            },
        };
        debug!(
            "waiting for pod '{}' with strategy {}",
            name,
            strategy.describe()
        );
        let waited = strategy.wait_until_ready(&target).await;
        self.wait = Some(strategy);
        waited.context(ReadinessSnafu { pod: name.clone() })?;

        // External access, resolved once and cached. A pod with only internal exposures has no
        // coordinate; reading it later is a usage error naming the pod.
        if let Some(service) = &endpoint_service {
            self.external = access
                .resolve(&client, namespace.name(), service)
                .await
                .context(ExternalAccessSnafu { pod: name.clone() })?;
        }

        Ok(())
    }

    fn build_pod_spec(&self, name: &str, workload_kind: WorkloadKind) -> PodSpec {
        let mounts = self.storage.mounts();
        let volumes = self.storage.volumes(workload_kind);
        let container = Container {
            name: name.to_string(),
            image: Some(self.image.clone()),
            image_pull_policy: self
                .image_pull_policy
                .or_else(defaults::resolve_image_pull_policy)
                .map(|policy| policy.as_str().to_string()),
            command: self.command.clone(),
            args: self.args.clone(),
            ports: if self.ports.is_empty() {
                None
            } else {
                Some(
                    self.ports
                        .iter()
                        .map(|port| ContainerPort {
                            container_port: i32::from(*port),
                            ..Default::default()
                        })
                        .collect(),
                )
            },
            env: if self.env.is_empty() {
                None
            } else {
                Some(
                    self.env
                        .iter()
                        .map(|(name, value)| EnvVar {
                            name: name.clone(),
                            value: Some(value.clone()),
                            ..Default::default()
                        })
                        .collect(),
                )
            },
            volume_mounts: if mounts.is_empty() { None } else { Some(mounts) },
            ..Default::default()
        };
        PodSpec {
            containers: vec![container],
            volumes: if volumes.is_empty() {
                None
            } else {
                Some(volumes)
            },
            ..Default::default()
        }
    }

    /// Best-effort reverse-order cleanup after a failed start. Errors are logged, not
    /// surfaced; the start error is the one the caller needs to see.
    async fn cleanup_partial(&mut self) {
        if let Err(e) = self.exposure.delete().await {
            warn!("cleanup of exposures for pod '{}' failed: {}", self.name(), e);
        }
        if let Some(workload) = self.workload.as_mut() {
            if let Err(e) = workload.delete().await {
                warn!("cleanup of workload for pod '{}' failed: {}", self.name(), e);
            }
        }
        if let Err(e) = self.storage.delete().await {
            warn!("cleanup of storage for pod '{}' failed: {}", self.name(), e);
        }
        self.external = None;
    }

    /// Tear the pod down: exposures, then the workload, then storage, the exact reverse of the
    /// creation order. Every deletion is attempted even when an earlier one fails; failures are
    /// collected and reported together after the last attempt.
    pub async fn stop(&mut self) -> Result<()> {
        ensure!(
            matches!(self.state, LifecycleState::Ready | LifecycleState::Failed),
            InvalidTransitionSnafu {
                operation: "stop",
                pod: self.name(),
                state: self.state,
            }
        );
        self.state = LifecycleState::Stopping;
        info!("stopping pod '{}'", self.name());

        let mut failures = Vec::new();
        if let Err(e) = self.exposure.delete().await {
            failures.push(e);
        }
        if let Some(workload) = self.workload.as_mut() {
            if let Err(e) = workload.delete().await {
                failures.push(e);
            }
        }
        if let Err(e) = self.storage.delete().await {
            failures.push(e);
        }

        self.state = LifecycleState::Stopped;
        self.external = None;
        if failures.is_empty() {
            Ok(())
        } else {
            error::TeardownSnafu {
                pod: self.name(),
                failures,
            }
            .fail()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn name_is_derived_from_the_image_reference() {
        assert_eq!(derive_name_from_image("nginx:latest"), "nginx");
        assert_eq!(derive_name_from_image("redis:7-alpine"), "redis");
        assert_eq!(
            derive_name_from_image("my.registry.io/team/app:v1"),
            "app"
        );
        assert_eq!(derive_name_from_image("Weird_Image"), "weird-image");
    }

    #[test]
    fn explicit_name_wins_over_derivation() {
        let pod = TestPod::deployment("redis:7-alpine").with_name("cache");
        assert_eq!(pod.name(), "cache");
    }

    #[test]
    fn external_access_before_start_is_a_usage_error_naming_the_pod() {
        let pod = TestPod::deployment("redis:7-alpine").with_port(6379);
        let err = pod.external_host().unwrap_err();
        assert!(matches!(err, Error::NotStarted { .. }));
        assert!(err.to_string().contains("redis"));
        assert!(pod.external_port().is_err());
    }

    #[tokio::test]
    async fn stop_before_start_is_an_invalid_transition() {
        let mut pod = TestPod::deployment("redis:7-alpine").with_port(6379);
        let err = pod.stop().await.unwrap_err();
        match err {
            Error::InvalidTransition { state, .. } => {
                assert_eq!(state, LifecycleState::Unstarted)
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(pod.state(), LifecycleState::Unstarted);
    }

    #[test]
    fn new_pod_is_unstarted_with_no_managers() {
        let pod = TestPod::stateful_set("postgres:15");
        assert_eq!(pod.state(), LifecycleState::Unstarted);
        assert!(pod.workload_manager().is_none());
        assert_eq!(pod.exposure().size(), 0);
        assert!(pod.node_port().is_none());
    }

    #[test]
    fn exposure_suffixes_give_headless_its_own_name() {
        let suffixes = exposure_suffixes(&[ServiceKind::Headless, ServiceKind::ClusterIp]);
        assert_eq!(suffixes, vec!["-headless".to_string(), String::new()]);

        let suffixes = exposure_suffixes(&[ServiceKind::Headless, ServiceKind::NodePort]);
        assert_eq!(suffixes, vec!["-headless".to_string(), String::new()]);

        let suffixes = exposure_suffixes(&[
            ServiceKind::ClusterIp,
            ServiceKind::NodePort,
            ServiceKind::Headless,
        ]);
        assert_eq!(
            suffixes,
            vec![String::new(), "-1".to_string(), "-headless".to_string()]
        );
    }

    #[test]
    fn build_pod_spec_carries_ports_env_and_policy() {
        let pod = TestPod::deployment("redis:7-alpine")
            .with_port(6379)
            .with_env("MAXMEMORY", "64mb")
            .with_image_pull_policy(ImagePullPolicy::IfNotPresent);
        let spec = pod.build_pod_spec("redis", WorkloadKind::Deployment);
        assert_eq!(spec.containers.len(), 1);
        let container = &spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("redis:7-alpine"));
        assert_eq!(container.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert_eq!(
            container.ports.as_ref().unwrap()[0].container_port,
            6379
        );
        assert_eq!(container.env.as_ref().unwrap()[0].name, "MAXMEMORY");
    }
}
