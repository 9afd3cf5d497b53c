use super::{Probe, Result, WaitStrategy, WaitTarget};
use crate::error::{self, EmptySnafu};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use kube::Api;
use snafu::ensure;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Waits until a command executed inside the pod's container exits successfully, e.g.
/// `pg_isready -U postgres` or `redis-cli ping`.
#[derive(Debug, Clone)]
pub struct CommandWaitStrategy {
    command: Vec<String>,
    timeout: Duration,
    poll_interval: Duration,
}

impl CommandWaitStrategy {
    /// Create a strategy running `command`. An empty command is rejected here, before any
    /// waiting starts.
    pub fn new<I, S>(command: I) -> error::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        ensure!(
            !command.is_empty(),
            EmptySnafu {
                item: "command argument",
                what: "command wait strategy",
            }
        );
        Ok(Self {
            command,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
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
impl WaitStrategy for CommandWaitStrategy {
    async fn probe(&self, target: &WaitTarget) -> Result<Probe> {
        let client = match target.client() {
            Some(client) => client.clone(),
            None => return Ok(Probe::Pending("no cluster client available".to_string())),
        };
        let pod_name = match target.first_pod_name().await {
            Ok(Some(name)) => name,
            Ok(None) => return Ok(Probe::Pending("pod is not scheduled yet".to_string())),
            Err(e) => return Ok(Probe::Pending(format!("unable to list pods: {}", e))),
        };

        let api: Api<Pod> = Api::namespaced(client, target.namespace());
        let params = AttachParams::default().stdout(true).stderr(true);
        let mut process = match api.exec(&pod_name, self.command.clone(), &params).await {
            Ok(process) => process,
            Err(e) => {
                return Ok(Probe::Pending(format!(
                    "unable to exec in pod '{}': {}",
                    pod_name, e
                )))
            }
        };

        let status = match process.take_status() {
            Some(status) => status.await,
            None => None,
        };
        match status.and_then(|s| s.status) {
            Some(outcome) if outcome == "Success" => Ok(Probe::Ready),
            Some(outcome) => Ok(Probe::Pending(format!(
                "command exited unsuccessfully: {}",
                outcome
            ))),
            None => Ok(Probe::Pending(
                "command completed without reporting a status".to_string(),
            )),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn describe(&self) -> String {
        format!("command({})", self.command.join(" "))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn empty_command_is_rejected_at_build_time() {
        let err = CommandWaitStrategy::new(Vec::<String>::new()).unwrap_err();
        assert!(err.to_string().contains("command argument"));
    }

    #[test]
    fn describe_names_the_command() {
        let strategy = CommandWaitStrategy::new(["pg_isready", "-U", "postgres"]).unwrap();
        assert_eq!(strategy.describe(), "command(pg_isready -U postgres)");
    }
}
