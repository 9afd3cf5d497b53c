//! The readiness wait engine: strategies that decide when a provisioned resource is usable.
//!
//! A [`WaitStrategy`] makes one probe attempt at a time; the engine polls it until it reports
//! ready or the strategy's timeout budget is exhausted. Transient conditions (connection
//! refused, 5xx, pod not scheduled yet, a failed API call) are [`Probe::Pending`] and retried
//! within the budget; they never escape the engine. Fatal conditions (strategy
//! misconfiguration) are errors and end the wait immediately, without consuming the rest of the
//! timeout.

mod command;
mod composite;
mod http;
mod log_message;
mod port;
mod readiness;

pub use command::CommandWaitStrategy;
pub use composite::{Combinator, CompositeWaitStrategy};
pub use http::HttpWaitStrategy;
pub use log_message::LogMessageWaitStrategy;
pub use port::PortWaitStrategy;
pub use readiness::ReadinessWaitStrategy;

use crate::cluster::{ExternalAccessStrategy, HostAndPort};
use crate::workload::WorkloadKind;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::Api;
use snafu::Snafu;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// The `Result` type returned by wait operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by wait operations. `Timeout` is the expected failure mode and is
/// never retried by this layer; retry policy belongs to the caller.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "Timed out after {:.1}s (budget {:.1}s) waiting for '{}' with {}{}",
        elapsed.as_secs_f64(),
        timeout.as_secs_f64(),
        what,
        strategy,
        last.as_ref().map(|l| format!("; last probe: {}", l)).unwrap_or_default()
    ))]
    Timeout {
        what: String,
        strategy: String,
        elapsed: Duration,
        timeout: Duration,
        last: Option<String>,
    },

    #[snafu(display(
        "Invalid wait budget for {}: timeout and poll interval must be positive",
        strategy
    ))]
    InvalidBudget { strategy: String },

    #[snafu(display("Wait strategy {} cannot run: {}", strategy, reason))]
    Fatal { strategy: String, reason: String },
}

/// The result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The resource is usable.
    Ready,
    /// Not usable yet; carries the reason for the timeout report. Transport errors land here.
    Pending(String),
}

/// Reference to the workload resource a readiness strategy queries.
#[derive(Debug, Clone)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub name: String,
}

/// Everything a strategy may need to perform one probe attempt against a provisioned resource.
/// All fields beyond the name and namespace are optional so that targets can be assembled for
/// exactly the strategies in play; a strategy that is missing what it needs reports `Pending`
/// (the resource may simply not provide it yet) and the timeout report says so.
#[derive(Clone, Default)]
pub struct WaitTarget {
    name: String,
    namespace: String,
    client: Option<kube::Client>,
    pod_selector: Option<String>,
    workload: Option<WorkloadRef>,
    service: Option<String>,
    access: Option<ExternalAccessStrategy>,
    fixed_endpoint: Option<HostAndPort>,
}

impl WaitTarget {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, namespace: S2) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_client(mut self, client: kube::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// The label selector locating this resource's pods, e.g. `app=redis`.
    pub fn with_pod_selector<S: Into<String>>(mut self, selector: S) -> Self {
        self.pod_selector = Some(selector.into());
        self
    }

    pub fn with_workload(mut self, workload: WorkloadRef) -> Self {
        self.workload = Some(workload);
        self
    }

    /// The service whose external endpoint port/http probes connect to, resolved through
    /// `access` on each attempt until it becomes available.
    pub fn with_service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_access(mut self, access: ExternalAccessStrategy) -> Self {
        self.access = Some(access);
        self
    }

    /// A fixed endpoint to probe, bypassing service resolution.
    pub fn with_endpoint(mut self, endpoint: HostAndPort) -> Self {
        self.fixed_endpoint = Some(endpoint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn client(&self) -> Option<&kube::Client> {
        self.client.as_ref()
    }

    pub fn workload(&self) -> Option<&WorkloadRef> {
        self.workload.as_ref()
    }

    /// The endpoint to probe, if one can be determined right now. Resolution happens per
    /// attempt so that a strategy starts connecting as soon as the exposure can provide an
    /// address.
    pub async fn endpoint(&self) -> Option<HostAndPort> {
        if let Some(endpoint) = &self.fixed_endpoint {
            return Some(endpoint.clone());
        }
        let (client, service, access) = match (&self.client, &self.service, &self.access) {
            (Some(client), Some(service), Some(access)) => (client, service, access),
            _ => return None,
        };
        access
            .try_resolve(client, &self.namespace, service)
            .await
            .ok()
            .flatten()
    }

    /// The name of the first pod matching the pod selector. `Ok(None)` when no pod exists yet;
    /// `Err` carries the API failure (callers treat it as not-ready).
    pub(crate) async fn first_pod_name(&self) -> std::result::Result<Option<String>, kube::Error> {
        let (client, selector) = match (&self.client, &self.pod_selector) {
            (Some(client), Some(selector)) => (client, selector),
            _ => return Ok(None),
        };
        let api: Api<Pod> = Api::namespaced(client.clone(), &self.namespace);
        let pods = api
            .list(&ListParams {
                label_selector: Some(selector.clone()),
                ..Default::default()
            })
            .await?;
        Ok(pods
            .items
            .into_iter()
            .next()
            .and_then(|pod| pod.metadata.name))
    }
}

/// A strategy for deciding when a resource is ready. Implementations provide a single probe
/// attempt; the provided [`wait_until_ready`](WaitStrategy::wait_until_ready) runs the poll
/// loop. Composite strategies override the loop to coordinate their children.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// One probe attempt. `Ok(Probe::Pending)` means not ready yet and will be retried within
    /// the timeout budget; `Err` is fatal and ends the wait immediately.
    async fn probe(&self, target: &WaitTarget) -> Result<Probe>;

    /// The total budget for this strategy.
    fn timeout(&self) -> Duration;

    /// Time between probe attempts. A timeout smaller than the poll interval results in exactly
    /// one attempt.
    fn poll_interval(&self) -> Duration;

    /// A short human-readable description used in timeout reports.
    fn describe(&self) -> String;

    /// Poll until ready or the budget is exhausted. The timeout error carries the elapsed time
    /// and the last pending reason.
    async fn wait_until_ready(&self, target: &WaitTarget) -> Result<()> {
        let timeout = self.timeout();
        let poll_interval = self.poll_interval();
        if timeout.is_zero() || poll_interval.is_zero() {
            return InvalidBudgetSnafu {
                strategy: self.describe(),
            }
            .fail();
        }

        let start = Instant::now();
        let mut last = None;
        loop {
            match self.probe(target).await? {
                Probe::Ready => return Ok(()),
                Probe::Pending(reason) => last = Some(reason),
            }
            if start.elapsed() >= timeout {
                break;
            }
            sleep(poll_interval).await;
            if start.elapsed() >= timeout {
                break;
            }
        }
        TimeoutSnafu {
            what: target.name().to_string(),
            strategy: self.describe(),
            elapsed: start.elapsed(),
            timeout,
            last,
        }
        .fail()
    }
}
