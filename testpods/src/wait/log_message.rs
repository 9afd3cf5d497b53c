use super::{Probe, Result, WaitStrategy, WaitTarget};
use crate::error::{self, InvalidRegexSnafu};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::LogParams;
use kube::Api;
use regex::Regex;
use snafu::ResultExt;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Waits until a regex matches the pod's log output a given number of times, e.g.
/// `.*waiting for connections.*` for a database that logs its readiness.
#[derive(Debug, Clone)]
pub struct LogMessageWaitStrategy {
    pattern: Regex,
    times: usize,
    timeout: Duration,
    poll_interval: Duration,
}

impl LogMessageWaitStrategy {
    /// Create a strategy waiting for one occurrence of `pattern`. The pattern is compiled here
    /// so an invalid expression fails before any waiting starts.
    pub fn new<S: AsRef<str>>(pattern: S) -> error::Result<Self> {
        Self::times(pattern, 1)
    }

    /// Create a strategy waiting for `times` occurrences of `pattern`. Useful when a message
    /// repeats during startup and only a later occurrence means ready.
    pub fn times<S: AsRef<str>>(pattern: S, times: usize) -> error::Result<Self> {
        let pattern = Regex::new(pattern.as_ref()).context(InvalidRegexSnafu {
            pattern: pattern.as_ref().to_string(),
        })?;
        Ok(Self {
            pattern,
            times: times.max(1),
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
impl WaitStrategy for LogMessageWaitStrategy {
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
        let logs = match api.logs(&pod_name, &LogParams::default()).await {
            Ok(logs) => logs,
            Err(e) => {
                return Ok(Probe::Pending(format!(
                    "unable to read logs of pod '{}': {}",
                    pod_name, e
                )))
            }
        };

        let matches = self.pattern.find_iter(&logs).count();
        if matches >= self.times {
            Ok(Probe::Ready)
        } else {
            Ok(Probe::Pending(format!(
                "pattern matched {} of {} time(s)",
                matches, self.times
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
        format!("log-message({})", self.pattern.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn invalid_pattern_is_rejected_at_build_time() {
        let err = LogMessageWaitStrategy::new("*no").unwrap_err();
        assert!(err.to_string().contains("Invalid regular expression"));
    }

    #[test]
    fn times_is_clamped_to_at_least_one() {
        let strategy = LogMessageWaitStrategy::times("ready", 0).unwrap();
        assert_eq!(strategy.times, 1);
    }

    #[tokio::test]
    async fn missing_client_is_pending_not_fatal() {
        let strategy = LogMessageWaitStrategy::new("ready").unwrap();
        let target = WaitTarget::new("db", "unit");
        let probe = strategy.probe(&target).await.unwrap();
        assert!(matches!(probe, Probe::Pending(_)));
    }
}
