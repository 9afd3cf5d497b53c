use super::{Probe, Result, WaitStrategy, WaitTarget};
use crate::workload::WorkloadKind;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::Api;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Trusts the orchestrator's own readiness condition: the workload reports as many ready
/// replicas as it desires. This is the default strategy for stateful pods, whose containers
/// normally carry readiness probes of their own.
#[derive(Debug, Clone)]
pub struct ReadinessWaitStrategy {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for ReadinessWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessWaitStrategy {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl WaitStrategy for ReadinessWaitStrategy {
    async fn probe(&self, target: &WaitTarget) -> Result<Probe> {
        let client = match target.client() {
            Some(client) => client.clone(),
            None => return Ok(Probe::Pending("no cluster client available".to_string())),
        };
        let workload = match target.workload() {
            Some(workload) => workload,
            None => {
                return Ok(Probe::Pending(
                    "target has no workload to query for readiness".to_string(),
                ))
            }
        };

        let (desired, ready) = match workload.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(client, target.namespace());
                match api.get(&workload.name).await {
                    Ok(found) => (
                        found.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
                        found
                            .status
                            .and_then(|s| s.ready_replicas)
                            .unwrap_or_default(),
                    ),
                    Err(e) => {
                        return Ok(Probe::Pending(format!(
                            "unable to get deployment '{}': {}",
                            workload.name, e
                        )))
                    }
                }
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(client, target.namespace());
                match api.get(&workload.name).await {
                    Ok(found) => (
                        found.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
                        found
                            .status
                            .and_then(|s| s.ready_replicas)
                            .unwrap_or_default(),
                    ),
                    Err(e) => {
                        return Ok(Probe::Pending(format!(
                            "unable to get statefulset '{}': {}",
                            workload.name, e
                        )))
                    }
                }
            }
        };

        if ready >= desired {
            Ok(Probe::Ready)
        } else {
            Ok(Probe::Pending(format!(
                "{} of {} replica(s) ready",
                ready, desired
            )))
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn describe(&self) -> String {
        "workload-readiness".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[tokio::test]
    async fn target_without_workload_is_pending_not_fatal() {
        let strategy = ReadinessWaitStrategy::new();
        let target = WaitTarget::new("db", "unit");
        let probe = strategy.probe(&target).await.unwrap();
        assert!(matches!(probe, Probe::Pending(_)));
    }

    #[test]
    fn default_budget_is_two_minutes() {
        let strategy = ReadinessWaitStrategy::new();
        assert_eq!(strategy.timeout(), Duration::from_secs(120));
    }
}
