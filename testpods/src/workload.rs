//! Workload managers own the resource that runs a pod's replicas: a single-replica `Deployment`
//! for stateless dependencies, or a `StatefulSet` when replicas need stable identity and
//! per-replica storage.

use crate::constants::{APP_MANAGED_BY, LABEL_APP, MANAGED_BY};
use crate::error::{self, EmptySnafu, MissingFieldSnafu};
use crate::manager::{self, AlreadyCreatedSnafu, KubeApiCallSnafu, ManagerState};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{ObjectMeta, PostParams};
use kube::Api;
use log::debug;
use maplit::btreemap;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// A stable discriminator for workload variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Interchangeable replicas behind a virtual address.
    Deployment,
    /// Ordered, named replicas with stable network identity and per-replica storage claims.
    StatefulSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "stateful-set",
        }
    }
}

impl Display for WorkloadKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration passed from a pod to its workload manager. Validated when built: name and
/// namespace must be non-empty and the pod spec must have at least one container.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    pod_spec: PodSpec,
}

impl WorkloadConfig {
    pub fn builder() -> WorkloadConfigBuilder {
        WorkloadConfigBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The selector labels matching this workload's pods.
    pub fn selector(&self) -> BTreeMap<String, String> {
        btreemap! { LABEL_APP.to_string() => self.name.clone() }
    }

    /// All labels applied to the workload and its pod template: the `app` selector label, the
    /// managed-by marker, then any user labels.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = btreemap! {
            LABEL_APP.to_string() => self.name.clone(),
            APP_MANAGED_BY.to_string() => MANAGED_BY.to_string(),
        };
        labels.extend(self.labels.clone());
        labels
    }

    fn template(&self) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(self.labels()),
                annotations: if self.annotations.is_empty() {
                    None
                } else {
                    Some(self.annotations.clone())
                },
                ..Default::default()
            }),
            spec: Some(self.pod_spec.clone()),
        }
    }

    fn metadata(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkloadConfigBuilder {
    name: Option<String>,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    pod_spec: Option<PodSpec>,
}

impl WorkloadConfigBuilder {
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn pod_spec(mut self, pod_spec: PodSpec) -> Self {
        self.pod_spec = Some(pod_spec);
        self
    }

    pub fn build(self) -> error::Result<WorkloadConfig> {
        let name = self.name.filter(|n| !n.is_empty()).context(
            MissingFieldSnafu {
                field: "name",
                what: "workload config",
            },
        )?;
        let namespace = self.namespace.filter(|n| !n.is_empty()).context(
            MissingFieldSnafu {
                field: "namespace",
                what: "workload config",
            },
        )?;
        let pod_spec = self.pod_spec.context(MissingFieldSnafu {
            field: "pod_spec",
            what: "workload config",
        })?;
        ensure!(
            !pod_spec.containers.is_empty(),
            EmptySnafu {
                item: "container",
                what: "workload config",
            }
        );
        Ok(WorkloadConfig {
            name,
            namespace,
            labels: self.labels,
            annotations: self.annotations,
            pod_spec,
        })
    }
}

/// Manages the Kubernetes resource that runs a pod's replicas.
#[async_trait]
pub trait WorkloadManager: Send + Sync {
    /// Create the workload. Fails if this manager has already created one; managers are never
    /// reused.
    async fn create(&mut self, config: &WorkloadConfig) -> manager::Result<()>;

    /// Delete the workload. Deleting before `create`, or a workload that is already gone, is a
    /// no-op.
    async fn delete(&mut self) -> manager::Result<()>;

    /// Whether the workload exists with at least one running replica.
    async fn is_running(&self) -> manager::Result<bool>;

    /// Whether all desired replicas are ready.
    async fn is_ready(&self) -> manager::Result<bool>;

    /// The name of the workload resource, or `None` before creation.
    fn name(&self) -> Option<&str>;

    fn state(&self) -> ManagerState;

    fn kind(&self) -> WorkloadKind;
}

/// A single-replica `Deployment` for stateless dependencies.
pub struct DeploymentManager {
    client: kube::Client,
    state: ManagerState,
    created: Option<(String, String)>,
}

impl DeploymentManager {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            state: ManagerState::Uncreated,
            created: None,
        }
    }

    fn api(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get(&self) -> manager::Result<Option<Deployment>> {
        let (name, namespace) = match &self.created {
            Some(created) => created,
            None => return Ok(None),
        };
        match self.api(namespace).get(name).await {
            Ok(found) => Ok(Some(found)),
            Err(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })) => Ok(None),
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "get",
                what: "deployment",
                name: name.clone(),
            }),
        }
    }
}

#[async_trait]
impl WorkloadManager for DeploymentManager {
    async fn create(&mut self, config: &WorkloadConfig) -> manager::Result<()> {
        ensure!(
            self.state != ManagerState::Created,
            AlreadyCreatedSnafu {
                what: "deployment",
                name: config.name().to_string(),
            }
        );
        let deployment = Deployment {
            metadata: config.metadata(),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(config.selector()),
                    ..Default::default()
                },
                template: config.template(),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.api(config.namespace())
            .create(&PostParams::default(), &deployment)
            .await
            .context(KubeApiCallSnafu {
                method: "create",
                what: "deployment",
                name: config.name().to_string(),
            })?;
        self.state = ManagerState::Created;
        self.created = Some((config.name().to_string(), config.namespace().to_string()));
        debug!("created deployment '{}/{}'", config.namespace(), config.name());
        Ok(())
    }

    async fn delete(&mut self) -> manager::Result<()> {
        let (name, namespace) = match &self.created {
            Some(created) => created.clone(),
            None => return Ok(()),
        };
        match self.api(&namespace).delete(&name, &Default::default()).await {
            Ok(_) | Err(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })) => {
                debug!("deleted deployment '{}/{}'", namespace, name);
                self.state = ManagerState::Deleted;
                Ok(())
            }
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "delete",
                what: "deployment",
                name,
            }),
        }
    }

    async fn is_running(&self) -> manager::Result<bool> {
        Ok(self
            .get()
            .await?
            .and_then(|d| d.status)
            .and_then(|status| status.replicas)
            .map(|replicas| replicas > 0)
            .unwrap_or(false))
    }

    async fn is_ready(&self) -> manager::Result<bool> {
        let deployment = match self.get().await? {
            Some(deployment) => deployment,
            None => return Ok(false),
        };
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let ready = deployment
            .status
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);
        Ok(ready == desired)
    }

    fn name(&self) -> Option<&str> {
        self.created.as_ref().map(|(name, _)| name.as_str())
    }

    fn state(&self) -> ManagerState {
        self.state
    }

    fn kind(&self) -> WorkloadKind {
        WorkloadKind::Deployment
    }
}

/// A `StatefulSet` for dependencies that need stable network identity or persistent per-replica
/// storage: databases, brokers, clustered caches.
pub struct StatefulSetManager {
    client: kube::Client,
    replicas: i32,
    service_name: Option<String>,
    claim_templates: Vec<PersistentVolumeClaim>,
    state: ManagerState,
    created: Option<(String, String)>,
}

impl StatefulSetManager {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            replicas: 1,
            service_name: None,
            claim_templates: Vec::new(),
            state: ManagerState::Uncreated,
            created: None,
        }
    }

    /// The name of the headless service providing stable per-replica DNS. Defaults to the
    /// workload name.
    pub fn with_service_name<S: Into<String>>(mut self, service_name: S) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Claim templates cloned by the cluster for each replica.
    pub fn with_claim_templates(mut self, templates: Vec<PersistentVolumeClaim>) -> Self {
        self.claim_templates = templates;
        self
    }

    /// The headless service name replicas are addressable under
    /// (`<name>-<ordinal>.<service-name>.<namespace>`), once configured.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    fn api(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get(&self) -> manager::Result<Option<StatefulSet>> {
        let (name, namespace) = match &self.created {
            Some(created) => created,
            None => return Ok(None),
        };
        match self.api(namespace).get(name).await {
            Ok(found) => Ok(Some(found)),
            Err(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })) => Ok(None),
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "get",
                what: "statefulset",
                name: name.clone(),
            }),
        }
    }
}

#[async_trait]
impl WorkloadManager for StatefulSetManager {
    async fn create(&mut self, config: &WorkloadConfig) -> manager::Result<()> {
        ensure!(
            self.state != ManagerState::Created,
            AlreadyCreatedSnafu {
                what: "statefulset",
                name: config.name().to_string(),
            }
        );
        let stateful_set = StatefulSet {
            metadata: config.metadata(),
            spec: Some(StatefulSetSpec {
                replicas: Some(self.replicas),
                service_name: self
                    .service_name
                    .clone()
                    .unwrap_or_else(|| config.name().to_string()),
                selector: LabelSelector {
                    match_labels: Some(config.selector()),
                    ..Default::default()
                },
                template: config.template(),
                volume_claim_templates: if self.claim_templates.is_empty() {
                    None
                } else {
                    Some(self.claim_templates.clone())
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        self.api(config.namespace())
            .create(&PostParams::default(), &stateful_set)
            .await
            .context(KubeApiCallSnafu {
                method: "create",
                what: "statefulset",
                name: config.name().to_string(),
            })?;
        self.state = ManagerState::Created;
        self.created = Some((config.name().to_string(), config.namespace().to_string()));
        debug!(
            "created statefulset '{}/{}' with {} replica(s)",
            config.namespace(),
            config.name(),
            self.replicas
        );
        Ok(())
    }

    async fn delete(&mut self) -> manager::Result<()> {
        let (name, namespace) = match &self.created {
            Some(created) => created.clone(),
            None => return Ok(()),
        };
        match self.api(&namespace).delete(&name, &Default::default()).await {
            Ok(_) | Err(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })) => {
                debug!("deleted statefulset '{}/{}'", namespace, name);
                self.state = ManagerState::Deleted;
                Ok(())
            }
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "delete",
                what: "statefulset",
                name,
            }),
        }
    }

    async fn is_running(&self) -> manager::Result<bool> {
        Ok(self
            .get()
            .await?
            .and_then(|s| s.status)
            .map(|status| status.replicas > 0)
            .unwrap_or(false))
    }

    async fn is_ready(&self) -> manager::Result<bool> {
        let stateful_set = match self.get().await? {
            Some(stateful_set) => stateful_set,
            None => return Ok(false),
        };
        let desired = stateful_set
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let ready = stateful_set
            .status
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);
        Ok(ready == desired)
    }

    fn name(&self) -> Option<&str> {
        self.created.as_ref().map(|(name, _)| name.as_str())
    }

    fn state(&self) -> ManagerState {
        self.state
    }

    fn kind(&self) -> WorkloadKind {
        WorkloadKind::StatefulSet
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use k8s_openapi::api::core::v1::Container;

    fn pod_spec() -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                image: Some("redis:7-alpine".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn builder_rejects_missing_namespace() {
        let result = WorkloadConfig::builder()
            .name("redis")
            .pod_spec(pod_spec())
            .build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Missing required field 'namespace'"));
    }

    #[test]
    fn builder_rejects_empty_containers() {
        let result = WorkloadConfig::builder()
            .name("redis")
            .namespace("ns")
            .pod_spec(PodSpec::default())
            .build();
        assert!(result.unwrap_err().to_string().contains("container"));
    }

    #[test]
    fn labels_include_selector_and_managed_by() {
        let config = WorkloadConfig::builder()
            .name("redis")
            .namespace("ns")
            .labels(btreemap! { "team".to_string() => "storage".to_string() })
            .pod_spec(pod_spec())
            .build()
            .unwrap();
        let labels = config.labels();
        assert_eq!(labels.get(LABEL_APP).map(String::as_str), Some("redis"));
        assert_eq!(
            labels.get(APP_MANAGED_BY).map(String::as_str),
            Some(MANAGED_BY)
        );
        assert_eq!(labels.get("team").map(String::as_str), Some("storage"));
        assert_eq!(
            config.selector().get(LABEL_APP).map(String::as_str),
            Some("redis")
        );
    }
}
