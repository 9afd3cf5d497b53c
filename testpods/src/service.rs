//! Service managers make a workload's network endpoint reachable. Each variant owns exactly one
//! Kubernetes `Service`; pods needing several exposures compose them with
//! [`CompositeServiceManager`].

use crate::constants::PORT_NAME_PRIMARY;
use crate::error::{self, InvalidPortSnafu, MissingFieldSnafu};
use crate::manager::{self, AlreadyCreatedSnafu, KubeApiCallSnafu, ManagerState};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ObjectMeta, PostParams};
use kube::Api;
use log::debug;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;

/// A stable discriminator for exposure variants, used in diagnostics and in tests asserting
/// variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// A single internal virtual address with selector-based routing to the workload replicas.
    ClusterIp,
    /// No virtual address; DNS resolves directly to the backing replica addresses. Required when
    /// replicas need stable per-replica network identity.
    Headless,
    /// Reserves a port on every cluster node, mapping to the backing service.
    NodePort,
    Composite,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterIp => "internal-only",
            Self::Headless => "headless",
            Self::NodePort => "external-static-port",
            Self::Composite => "composite",
        }
    }
}

/// Configuration passed from a pod to its service manager. Validated when built: an empty name
/// or namespace and a zero port are rejected before anything reaches the cluster.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    name: String,
    namespace: String,
    port: u16,
    labels: BTreeMap<String, String>,
    selector: BTreeMap<String, String>,
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn named<S: Into<String>>(&self, name: S) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    fn service_port(&self) -> ServicePort {
        ServicePort {
            name: Some(PORT_NAME_PRIMARY.to_string()),
            port: i32::from(self.port),
            target_port: Some(IntOrString::Int(i32::from(self.port))),
            ..Default::default()
        }
    }

    fn metadata(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels.clone()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    name: Option<String>,
    namespace: Option<String>,
    port: Option<u16>,
    labels: BTreeMap<String, String>,
    selector: BTreeMap<String, String>,
}

impl ServiceConfigBuilder {
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn selector(mut self, selector: BTreeMap<String, String>) -> Self {
        self.selector = selector;
        self
    }

    pub fn build(self) -> error::Result<ServiceConfig> {
        let name = self.name.filter(|n| !n.is_empty()).context(
            MissingFieldSnafu {
                field: "name",
                what: "service config",
            },
        )?;
        let namespace = self.namespace.filter(|n| !n.is_empty()).context(
            MissingFieldSnafu {
                field: "namespace",
                what: "service config",
            },
        )?;
        let port = self.port.context(MissingFieldSnafu {
            field: "port",
            what: "service config",
        })?;
        ensure!(
            port != 0,
            InvalidPortSnafu {
                what: "service config"
            }
        );
        Ok(ServiceConfig {
            name,
            namespace,
            port,
            labels: self.labels,
            selector: self.selector,
        })
    }
}

/// Manages one Kubernetes `Service` resource for a test pod.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Create the service. Fails if this manager has already created one; managers are never
    /// reused.
    async fn create(&mut self, config: &ServiceConfig) -> manager::Result<()>;

    /// Delete the service. Deleting before `create`, or a service that is already gone, is a
    /// no-op.
    async fn delete(&mut self) -> manager::Result<()>;

    /// The created service, or `None` before creation.
    fn service(&self) -> Option<&Service>;

    /// The name of the service resource, or `None` before creation.
    fn name(&self) -> Option<&str>;

    fn state(&self) -> ManagerState;

    fn kind(&self) -> ServiceKind;

    /// The node port reserved by this exposure, once created. Only the external-static-port
    /// variant has one.
    fn node_port(&self) -> Option<u16> {
        None
    }
}

/// State common to the single-service managers: the created object plus the identifiers needed
/// to re-locate it for deletion.
#[derive(Default)]
struct CreatedService {
    service: Option<Service>,
    name: Option<String>,
    namespace: Option<String>,
    client: Option<kube::Client>,
    state: Option<ManagerState>,
}

impl CreatedService {
    fn state(&self) -> ManagerState {
        self.state.unwrap_or(ManagerState::Uncreated)
    }

    async fn create(
        &mut self,
        config: &ServiceConfig,
        client: &kube::Client,
        what: &'static str,
        service: Service,
    ) -> manager::Result<()> {
        ensure!(
            self.state() != ManagerState::Created,
            AlreadyCreatedSnafu {
                what,
                name: config.name().to_string(),
            }
        );
        let api: Api<Service> = Api::namespaced(client.clone(), config.namespace());
        let created = api
            .create(&PostParams::default(), &service)
            .await
            .context(KubeApiCallSnafu {
                method: "create",
                what,
                name: config.name().to_string(),
            })?;
        debug!("created {} service '{}/{}'", what, config.namespace(), config.name());
        self.service = Some(created);
        self.name = Some(config.name().to_string());
        self.namespace = Some(config.namespace().to_string());
        self.client = Some(client.clone());
        self.state = Some(ManagerState::Created);
        Ok(())
    }

    async fn delete(&mut self, what: &'static str) -> manager::Result<()> {
        let (name, namespace, client) = match (&self.name, &self.namespace, &self.client) {
            (Some(name), Some(namespace), Some(client)) => {
                (name.clone(), namespace.clone(), client.clone())
            }
            _ => return Ok(()),
        };
        let api: Api<Service> = Api::namespaced(client, &namespace);
        match api.delete(&name, &Default::default()).await {
            Ok(_) | Err(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })) => {
                debug!("deleted {} service '{}/{}'", what, namespace, name);
                self.service = None;
                self.state = Some(ManagerState::Deleted);
                Ok(())
            }
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "delete",
                what,
                name,
            }),
        }
    }
}

/// The default exposure for deployment-backed pods: an internal virtual address routed to the
/// workload's replicas by selector.
pub struct ClusterIpServiceManager {
    client: kube::Client,
    created: CreatedService,
}

impl ClusterIpServiceManager {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            created: CreatedService::default(),
        }
    }
}

#[async_trait]
impl ServiceManager for ClusterIpServiceManager {
    async fn create(&mut self, config: &ServiceConfig) -> manager::Result<()> {
        let service = Service {
            metadata: config.metadata(),
            spec: Some(ServiceSpec {
                selector: Some(config.selector.clone()),
                ports: Some(vec![config.service_port()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let client = self.client.clone();
        self.created
            .create(config, &client, "internal-only", service)
            .await
    }

    async fn delete(&mut self) -> manager::Result<()> {
        self.created.delete("internal-only").await
    }

    fn service(&self) -> Option<&Service> {
        self.created.service.as_ref()
    }

    fn name(&self) -> Option<&str> {
        self.created.name.as_deref()
    }

    fn state(&self) -> ManagerState {
        self.created.state()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::ClusterIp
    }
}

/// A headless service: `clusterIP: None`, so DNS resolves to the backing replica addresses
/// directly. Stateful workloads need one for stable per-replica identity.
pub struct HeadlessServiceManager {
    client: kube::Client,
    created: CreatedService,
}

impl HeadlessServiceManager {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            created: CreatedService::default(),
        }
    }
}

#[async_trait]
impl ServiceManager for HeadlessServiceManager {
    async fn create(&mut self, config: &ServiceConfig) -> manager::Result<()> {
        let service = Service {
            metadata: config.metadata(),
            spec: Some(ServiceSpec {
                selector: Some(config.selector.clone()),
                cluster_ip: Some("None".to_string()),
                ports: Some(vec![config.service_port()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let client = self.client.clone();
        self.created
            .create(config, &client, "headless", service)
            .await
    }

    async fn delete(&mut self) -> manager::Result<()> {
        self.created.delete("headless").await
    }

    fn service(&self) -> Option<&Service> {
        self.created.service.as_ref()
    }

    fn name(&self) -> Option<&str> {
        self.created.name.as_deref()
    }

    fn state(&self) -> ManagerState {
        self.created.state()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Headless
    }
}

/// Reserves a static port on every cluster node, mapping to the backing service. This is what
/// makes a pod reachable from test code running outside a local cluster.
pub struct NodePortServiceManager {
    client: kube::Client,
    requested_node_port: Option<u16>,
    created: CreatedService,
}

impl NodePortServiceManager {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            requested_node_port: None,
            created: CreatedService::default(),
        }
    }

    /// Request a specific node port instead of letting the cluster choose one. Must be within
    /// the cluster's node port range (30000-32767 by default).
    pub fn with_node_port(mut self, node_port: u16) -> Self {
        self.requested_node_port = Some(node_port);
        self
    }

    /// The node port reserved for this service. Available once the service has been created;
    /// when a port was requested with [`with_node_port`](Self::with_node_port) this is that
    /// port, otherwise it is the cluster's dynamic choice.
    pub fn node_port(&self) -> Option<u16> {
        self.created
            .service
            .as_ref()
            .and_then(|service| service.spec.as_ref())
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| ports.first())
            .and_then(|port| port.node_port)
            .and_then(|port| u16::try_from(port).ok())
    }
}

#[async_trait]
impl ServiceManager for NodePortServiceManager {
    async fn create(&mut self, config: &ServiceConfig) -> manager::Result<()> {
        let mut port = config.service_port();
        port.node_port = self.requested_node_port.map(i32::from);
        let service = Service {
            metadata: config.metadata(),
            spec: Some(ServiceSpec {
                selector: Some(config.selector.clone()),
                type_: Some("NodePort".to_string()),
                ports: Some(vec![port]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let client = self.client.clone();
        self.created
            .create(config, &client, "external-static-port", service)
            .await
    }

    async fn delete(&mut self) -> manager::Result<()> {
        self.created.delete("external-static-port").await
    }

    fn service(&self) -> Option<&Service> {
        self.created.service.as_ref()
    }

    fn name(&self) -> Option<&str> {
        self.created.name.as_deref()
    }

    fn state(&self) -> ManagerState {
        self.created.state()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::NodePort
    }

    fn node_port(&self) -> Option<u16> {
        NodePortServiceManager::node_port(self)
    }
}

/// An ordered collection of service managers for pods needing more than one exposure, e.g. a
/// stateful pod with both a headless service for replica DNS and an internal service for
/// clients.
///
/// Each member's service name is the pod's name plus that member's suffix. Creation fans out in
/// declaration order and stops at the first failure, leaving cleanup to [`delete`], which runs
/// in reverse order and attempts every member even when one fails. An empty composite is valid
/// and every operation on it is a no-op.
///
/// [`delete`]: CompositeServiceManager::delete
#[derive(Default)]
pub struct CompositeServiceManager {
    managers: Vec<Box<dyn ServiceManager>>,
    suffixes: Vec<String>,
    base_name: Option<String>,
}

impl CompositeServiceManager {
    /// Create a composite. The first member is the primary: its service is the one returned by
    /// [`ServiceManager::service`]. Default suffixes are `""` for the first member and `-1`,
    /// `-2`, ... for the rest.
    pub fn new(managers: Vec<Box<dyn ServiceManager>>) -> Self {
        let suffixes = (0..managers.len())
            .map(|i| if i == 0 { String::new() } else { format!("-{}", i) })
            .collect();
        Self {
            managers,
            suffixes,
            base_name: None,
        }
    }

    /// Replace the per-member name suffixes, e.g. `["-headless", ""]`.
    pub fn with_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn size(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// The manager at `index`, or `None` when the index is out of range.
    pub fn manager(&self, index: usize) -> Option<&dyn ServiceManager> {
        self.managers.get(index).map(|m| m.as_ref())
    }

    /// The service created by the manager at `index`, or `None` when the index is out of range
    /// or that manager has not created one.
    pub fn service_at(&self, index: usize) -> Option<&Service> {
        self.managers.get(index).and_then(|m| m.service())
    }

    /// The name the member at `index` will use (or used) for its service.
    pub fn member_name(&self, index: usize) -> Option<String> {
        let base = self.base_name.as_ref()?;
        if index >= self.managers.len() {
            return None;
        }
        let suffix = self.suffixes.get(index).map(String::as_str).unwrap_or("");
        Some(format!("{}{}", base, suffix))
    }

    /// The name suffix of the member at `index`, or `None` when the index is out of range.
    pub fn suffix(&self, index: usize) -> Option<&str> {
        if index >= self.managers.len() {
            return None;
        }
        Some(self.suffixes.get(index).map(String::as_str).unwrap_or(""))
    }

    /// The first member of the given kind, if any.
    pub fn find(&self, kind: ServiceKind) -> Option<&dyn ServiceManager> {
        self.managers
            .iter()
            .map(|m| m.as_ref())
            .find(|m| m.kind() == kind)
    }

    /// The index of the first member of the given kind, if any.
    pub fn find_index(&self, kind: ServiceKind) -> Option<usize> {
        self.managers.iter().position(|m| m.kind() == kind)
    }
}

#[async_trait]
impl ServiceManager for CompositeServiceManager {
    async fn create(&mut self, config: &ServiceConfig) -> manager::Result<()> {
        self.base_name = Some(config.name().to_string());
        for (i, manager) in self.managers.iter_mut().enumerate() {
            let suffix = self.suffixes.get(i).map(String::as_str).unwrap_or("");
            let member_config = config.named(format!("{}{}", config.name(), suffix));
            manager.create(&member_config).await?;
        }
        debug!(
            "created {} service(s) for composite '{}'",
            self.managers.len(),
            config.name()
        );
        Ok(())
    }

    async fn delete(&mut self) -> manager::Result<()> {
        let mut failures = Vec::new();
        for manager in self.managers.iter_mut().rev() {
            if let Err(e) = manager.delete().await {
                failures.push(e);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(manager::Error::CompositeDelete {
                what: "services",
                failures,
            })
        }
    }

    fn service(&self) -> Option<&Service> {
        self.managers.first().and_then(|m| m.service())
    }

    fn name(&self) -> Option<&str> {
        self.base_name.as_deref()
    }

    fn state(&self) -> ManagerState {
        if self
            .managers
            .iter()
            .any(|m| m.state() == ManagerState::Created)
        {
            ManagerState::Created
        } else {
            ManagerState::Uncreated
        }
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Composite
    }

    fn node_port(&self) -> Option<u16> {
        self.managers.iter().find_map(|m| m.node_port())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::manager::AlreadyCreatedSnafu;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A stand-in service manager recording the calls made to it, in the style of the mock
    /// clients used to test agents without a cluster.
    struct MockServiceManager {
        kind: ServiceKind,
        state: ManagerState,
        created_name: Option<String>,
        fail_create: bool,
        fail_delete: bool,
        create_order: Option<(Arc<AtomicUsize>, Arc<AtomicUsize>)>,
        delete_order: Option<(Arc<AtomicUsize>, Arc<AtomicUsize>)>,
    }

    impl MockServiceManager {
        fn new(kind: ServiceKind) -> Self {
            Self {
                kind,
                state: ManagerState::Uncreated,
                created_name: None,
                fail_create: false,
                fail_delete: false,
                create_order: None,
                delete_order: None,
            }
        }
    }

    #[async_trait]
    impl ServiceManager for MockServiceManager {
        async fn create(&mut self, config: &ServiceConfig) -> manager::Result<()> {
            snafu::ensure!(
                self.state != ManagerState::Created,
                AlreadyCreatedSnafu {
                    what: "mock",
                    name: config.name().to_string(),
                }
            );
            if self.fail_create {
                return Err(manager::Error::AlreadyCreated {
                    what: "mock-create-failure",
                    name: config.name().to_string(),
                });
            }
            if let Some((counter, mine)) = &self.create_order {
                mine.store(counter.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            }
            self.state = ManagerState::Created;
            self.created_name = Some(config.name().to_string());
            Ok(())
        }

        async fn delete(&mut self) -> manager::Result<()> {
            if self.state == ManagerState::Uncreated {
                return Ok(());
            }
            if let Some((counter, mine)) = &self.delete_order {
                mine.store(counter.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            }
            if self.fail_delete {
                return Err(manager::Error::AlreadyCreated {
                    what: "mock-delete-failure",
                    name: self.created_name.clone().unwrap_or_default(),
                });
            }
            self.state = ManagerState::Deleted;
            Ok(())
        }

        fn service(&self) -> Option<&Service> {
            None
        }

        fn name(&self) -> Option<&str> {
            self.created_name.as_deref()
        }

        fn state(&self) -> ManagerState {
            self.state
        }

        fn kind(&self) -> ServiceKind {
            self.kind
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig::builder()
            .name("db")
            .namespace("testpods-abcde")
            .port(5432)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_missing_name() {
        let result = ServiceConfig::builder().namespace("ns").port(80).build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Missing required field 'name'"));
    }

    #[test]
    fn builder_rejects_zero_port() {
        let result = ServiceConfig::builder().name("x").namespace("ns").port(0).build();
        assert!(result.unwrap_err().to_string().contains("port"));
    }

    #[test]
    fn composite_size_and_index_sentinels() {
        let composite = CompositeServiceManager::new(vec![
            Box::new(MockServiceManager::new(ServiceKind::Headless)),
            Box::new(MockServiceManager::new(ServiceKind::NodePort)),
        ]);
        assert_eq!(composite.size(), 2);
        assert!(composite.manager(2).is_none());
        assert!(composite.service_at(2).is_none());
        assert_eq!(
            composite.manager(0).map(|m| m.kind()),
            Some(ServiceKind::Headless)
        );
        assert_eq!(
            composite.manager(1).map(|m| m.kind()),
            Some(ServiceKind::NodePort)
        );
    }

    #[tokio::test]
    async fn composite_delete_before_create_is_a_no_op() {
        let mut composite = CompositeServiceManager::new(vec![
            Box::new(MockServiceManager::new(ServiceKind::Headless)),
            Box::new(MockServiceManager::new(ServiceKind::NodePort)),
        ]);
        composite.delete().await.unwrap();
        assert_eq!(composite.state(), ManagerState::Uncreated);
    }

    #[tokio::test]
    async fn composite_applies_member_suffixes() {
        let mut composite = CompositeServiceManager::new(vec![
            Box::new(MockServiceManager::new(ServiceKind::Headless)),
            Box::new(MockServiceManager::new(ServiceKind::ClusterIp)),
        ])
        .with_suffixes(["-headless", ""]);
        composite.create(&config()).await.unwrap();
        assert_eq!(composite.manager(0).unwrap().name(), Some("db-headless"));
        assert_eq!(composite.manager(1).unwrap().name(), Some("db"));
        assert_eq!(composite.member_name(0).as_deref(), Some("db-headless"));
        assert!(composite.member_name(2).is_none());
    }

    #[tokio::test]
    async fn composite_create_is_fail_fast() {
        let mut failing = MockServiceManager::new(ServiceKind::Headless);
        failing.fail_create = true;
        let mut composite = CompositeServiceManager::new(vec![
            Box::new(MockServiceManager::new(ServiceKind::ClusterIp)),
            Box::new(failing),
            Box::new(MockServiceManager::new(ServiceKind::NodePort)),
        ]);
        composite.create(&config()).await.unwrap_err();
        // The first member was created, the third was never attempted.
        assert_eq!(composite.manager(0).unwrap().state(), ManagerState::Created);
        assert_eq!(
            composite.manager(2).unwrap().state(),
            ManagerState::Uncreated
        );
        // Deleting the partially-created composite cleans up what exists.
        composite.delete().await.unwrap();
        assert_eq!(composite.manager(0).unwrap().state(), ManagerState::Deleted);
    }

    #[tokio::test]
    async fn composite_delete_runs_in_reverse_and_aggregates_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first_delete = Arc::new(AtomicUsize::new(usize::MAX));
        let second_delete = Arc::new(AtomicUsize::new(usize::MAX));

        let mut first = MockServiceManager::new(ServiceKind::Headless);
        first.delete_order = Some((Arc::clone(&counter), Arc::clone(&first_delete)));
        let mut second = MockServiceManager::new(ServiceKind::NodePort);
        second.delete_order = Some((Arc::clone(&counter), Arc::clone(&second_delete)));
        second.fail_delete = true;

        let mut composite = CompositeServiceManager::new(vec![Box::new(first), Box::new(second)]);
        composite.create(&config()).await.unwrap();

        let err = composite.delete().await.unwrap_err();
        match err {
            manager::Error::CompositeDelete { failures, .. } => assert_eq!(failures.len(), 1),
            other => panic!("unexpected error: {}", other),
        }
        // Reverse order: the second member was deleted first, and the first member was still
        // attempted despite the failure.
        assert!(second_delete.load(Ordering::SeqCst) < first_delete.load(Ordering::SeqCst));
        assert_eq!(composite.manager(0).unwrap().state(), ManagerState::Deleted);
    }

    #[tokio::test]
    async fn create_twice_is_rejected() {
        let mut manager = MockServiceManager::new(ServiceKind::ClusterIp);
        manager.create(&config()).await.unwrap();
        let err = manager.create(&config()).await.unwrap_err();
        assert!(err.to_string().contains("already been created"));
    }

    #[tokio::test]
    async fn empty_composite_is_valid() {
        let mut composite = CompositeServiceManager::default();
        assert_eq!(composite.size(), 0);
        composite.create(&config()).await.unwrap();
        composite.delete().await.unwrap();
        assert!(composite.service().is_none());
    }

    #[test]
    fn find_returns_first_member_of_kind() {
        let composite = CompositeServiceManager::new(vec![
            Box::new(MockServiceManager::new(ServiceKind::Headless)),
            Box::new(MockServiceManager::new(ServiceKind::NodePort)),
        ]);
        assert_eq!(
            composite.find(ServiceKind::NodePort).map(|m| m.kind()),
            Some(ServiceKind::NodePort)
        );
        assert!(composite.find(ServiceKind::ClusterIp).is_none());
    }
}
