//! The connection to the cluster that pods are provisioned into, and the strategy for reaching
//! them from outside of it.

mod access;
mod namespace;

pub use access::ExternalAccessStrategy;
pub use namespace::{generate_name, generate_name_with_context, TestNamespace};

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Config;
use snafu::{ResultExt, Snafu};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// The `Result` type returned by cluster connection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when a cluster connection cannot be established or an external access
/// coordinate cannot be resolved.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to discover a cluster from the environment: {}", source))]
    Discovery { source: kube::Error },

    #[snafu(display("Unable to read kubeconfig: {}", source))]
    ConfigRead {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to create a client from kubeconfig: {}", source))]
    ClientCreate { source: kube::Error },

    #[snafu(display("Unable to {} {} '{}': {}", method, what, name, source))]
    KubeApiCall {
        method: &'static str,
        what: &'static str,
        name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "No load balancer ingress was assigned for service '{}' within {}s",
        service,
        waited.as_secs()
    ))]
    LoadBalancerTimeout {
        service: String,
        waited: std::time::Duration,
    },
}

/// A handle to the cluster that test pods are provisioned into. This pairs the Kubernetes client
/// with the [`ExternalAccessStrategy`] appropriate for the cluster (how test code, running
/// outside the cluster, reaches services inside it). Cloning is cheap; clones share the
/// underlying client.
#[derive(Clone)]
pub struct ClusterConnection {
    client: kube::Client,
    access: ExternalAccessStrategy,
}

impl ClusterConnection {
    /// Create a connection from an existing client and access strategy.
    pub fn new(client: kube::Client, access: ExternalAccessStrategy) -> Self {
        Self { client, access }
    }

    /// Create a connection using the default Kubernetes client configuration (in-cluster
    /// environment or the active kubeconfig context). The access strategy defaults to
    /// [`ExternalAccessStrategy::node_port`].
    pub async fn try_default() -> Result<Self> {
        let client = kube::Client::try_default().await.context(DiscoverySnafu)?;
        Ok(Self::new(client, ExternalAccessStrategy::node_port()))
    }

    /// Create a connection from the path to a kubeconfig file.
    pub async fn from_kubeconfig_path(path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path).context(ConfigReadSnafu)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context(ConfigReadSnafu)?;
        let client = kube::Client::try_from(config).context(ClientCreateSnafu)?;
        Ok(Self::new(client, ExternalAccessStrategy::node_port()))
    }

    /// Replace the external access strategy.
    pub fn with_access(mut self, access: ExternalAccessStrategy) -> Self {
        self.access = access;
        self
    }

    /// The Kubernetes client for this cluster.
    pub fn client(&self) -> kube::Client {
        self.client.clone()
    }

    /// The strategy used to reach services in this cluster from the outside.
    pub fn access(&self) -> &ExternalAccessStrategy {
        &self.access
    }
}

/// The (host, port) pair a test uses to reach a resource from outside the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAndPort {
    host: String,
    port: u16,
}

impl HostAndPort {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for HostAndPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
