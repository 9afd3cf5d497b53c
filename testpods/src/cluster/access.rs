use super::{HostAndPort, KubeApiCallSnafu, LoadBalancerTimeoutSnafu, Result};
use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::ListParams;
use kube::Api;
use snafu::ResultExt;
use std::time::{Duration, Instant};

const LOAD_BALANCER_BUDGET: Duration = Duration::from_secs(120);
const LOAD_BALANCER_POLL: Duration = Duration::from_secs(2);

/// How test code, running outside the cluster, reaches a service inside it. Different cluster
/// types need different mechanisms: a local kind/minikube cluster exposes node ports on a
/// reachable address, a cloud cluster assigns load balancer ingresses, and a tunneled setup has a
/// fixed entry host.
#[derive(Debug, Clone)]
pub enum ExternalAccessStrategy {
    /// Resolve the node port reserved by an external-static-port exposure, addressed at a
    /// cluster node's internal IP (or an explicitly supplied address).
    NodePort { node_address: Option<String> },

    /// Resolve the ingress IP or hostname assigned to a load balancer service.
    LoadBalancer,

    /// A fixed host (e.g. a local tunnel); the port comes from the service's node port when one
    /// is reserved, otherwise from the service port itself.
    Fixed { host: String },
}

impl ExternalAccessStrategy {
    pub fn node_port() -> Self {
        Self::NodePort { node_address: None }
    }

    pub fn node_port_at<S: Into<String>>(node_address: S) -> Self {
        Self::NodePort {
            node_address: Some(node_address.into()),
        }
    }

    pub fn load_balancer() -> Self {
        Self::LoadBalancer
    }

    pub fn fixed_host<S: Into<String>>(host: S) -> Self {
        Self::Fixed { host: host.into() }
    }

    /// Resolve the external coordinate for `service`, blocking where the strategy has something
    /// to wait for (a load balancer ingress assignment). Returns `Ok(None)` when the service
    /// simply has nothing externally reachable, which is not an error: a pod with only internal
    /// exposures has no external coordinate.
    pub async fn resolve(
        &self,
        client: &kube::Client,
        namespace: &str,
        service: &str,
    ) -> Result<Option<HostAndPort>> {
        match self {
            Self::NodePort { .. } | Self::Fixed { .. } => {
                self.try_resolve(client, namespace, service).await
            }
            Self::LoadBalancer => {
                let start = Instant::now();
                loop {
                    if let Some(endpoint) = self.try_resolve(client, namespace, service).await? {
                        return Ok(Some(endpoint));
                    }
                    if start.elapsed() >= LOAD_BALANCER_BUDGET {
                        return LoadBalancerTimeoutSnafu {
                            service,
                            waited: start.elapsed(),
                        }
                        .fail();
                    }
                    tokio::time::sleep(LOAD_BALANCER_POLL).await;
                }
            }
        }
    }

    /// A single, non-blocking resolution attempt. Used by wait strategies that probe an external
    /// endpoint before the authoritative resolution has run.
    pub async fn try_resolve(
        &self,
        client: &kube::Client,
        namespace: &str,
        service: &str,
    ) -> Result<Option<HostAndPort>> {
        let api: Api<Service> = Api::namespaced(client.clone(), namespace);
        let found = api.get(service).await.context(KubeApiCallSnafu {
            method: "get",
            what: "service",
            name: service.to_string(),
        })?;

        match self {
            Self::NodePort { node_address } => {
                let node_port = match first_node_port(&found) {
                    Some(port) => port,
                    None => return Ok(None),
                };
                let host = match node_address {
                    Some(address) => address.clone(),
                    None => match detect_node_address(client).await? {
                        Some(address) => address,
                        None => return Ok(None),
                    },
                };
                Ok(Some(HostAndPort::new(host, node_port)))
            }
            Self::LoadBalancer => {
                let ingress = found
                    .status
                    .as_ref()
                    .and_then(|status| status.load_balancer.as_ref())
                    .and_then(|lb| lb.ingress.as_ref())
                    .and_then(|ingress| ingress.first());
                let host = match ingress.and_then(|i| i.ip.clone().or_else(|| i.hostname.clone()))
                {
                    Some(host) => host,
                    None => return Ok(None),
                };
                match first_service_port(&found) {
                    Some(port) => Ok(Some(HostAndPort::new(host, port))),
                    None => Ok(None),
                }
            }
            Self::Fixed { host } => {
                let port = first_node_port(&found).or_else(|| first_service_port(&found));
                Ok(port.map(|port| HostAndPort::new(host.clone(), port)))
            }
        }
    }
}

fn first_node_port(service: &Service) -> Option<u16> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .and_then(|port| port.node_port)
        .and_then(|port| u16::try_from(port).ok())
}

fn first_service_port(service: &Service) -> Option<u16> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .and_then(|port| u16::try_from(port.port).ok())
}

/// The internal IP of the first cluster node, the address node ports are reachable at for local
/// clusters.
async fn detect_node_address(client: &kube::Client) -> Result<Option<String>> {
    let api: Api<Node> = Api::all(client.clone());
    let nodes = api
        .list(&ListParams::default())
        .await
        .context(KubeApiCallSnafu {
            method: "list",
            what: "nodes",
            name: String::new(),
        })?;
    for node in nodes {
        if let Some(addresses) = node.status.and_then(|status| status.addresses) {
            for address in addresses {
                if address.type_ == "InternalIP" {
                    return Ok(Some(address.address));
                }
            }
        }
    }
    Ok(None)
}
