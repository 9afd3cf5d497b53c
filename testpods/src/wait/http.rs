use super::{FatalSnafu, Probe, Result, WaitStrategy, WaitTarget};
use crate::error::{self, InvalidHttpPathSnafu, InvalidPortSnafu};
use async_trait::async_trait;
use snafu::ensure;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Waits until an HTTP GET against the target's external endpoint returns the expected status
/// (any 2xx unless a specific code is configured). Non-2xx responses and transport errors are
/// both "not ready yet".
#[derive(Debug, Clone)]
pub struct HttpWaitStrategy {
    path: String,
    port: u16,
    expected_status: Option<u16>,
    timeout: Duration,
    poll_interval: Duration,
}

impl HttpWaitStrategy {
    /// Create a strategy probing `path` on `port`. The path must begin with `/` and the port
    /// must be nonzero; both are checked here so a typo fails before any waiting starts.
    pub fn new<S: Into<String>>(path: S, port: u16) -> error::Result<Self> {
        let path = path.into();
        ensure!(path.starts_with('/'), InvalidHttpPathSnafu { path });
        ensure!(
            port != 0,
            InvalidPortSnafu {
                what: "http wait strategy"
            }
        );
        Ok(Self {
            path,
            port,
            expected_status: None,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Require a specific status code instead of any 2xx.
    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = Some(status);
        self
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
impl WaitStrategy for HttpWaitStrategy {
    async fn probe(&self, target: &WaitTarget) -> Result<Probe> {
        let endpoint = match target.endpoint().await {
            Some(endpoint) => endpoint,
            None => {
                return Ok(Probe::Pending(
                    "external endpoint is not resolvable yet".to_string(),
                ))
            }
        };
        // The endpoint carries the externally reachable mapping of the service's primary port.
        let url = format!("http://{}{}", endpoint, self.path);

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                FatalSnafu {
                    strategy: self.describe(),
                    reason: format!("unable to construct http client: {}", e),
                }
                .build()
            })?;

        match client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                let ok = match self.expected_status {
                    Some(expected) => status.as_u16() == expected,
                    None => status.is_success(),
                };
                if ok {
                    Ok(Probe::Ready)
                } else {
                    Ok(Probe::Pending(format!("GET {} returned {}", url, status)))
                }
            }
            Err(e) => Ok(Probe::Pending(format!("GET {} failed: {}", url, e))),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn describe(&self) -> String {
        format!("http({}:{})", self.path, self.port)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn path_without_leading_slash_is_rejected_at_build_time() {
        let err = HttpWaitStrategy::new("health", 8080).unwrap_err();
        assert!(err.to_string().contains("must begin with '/'"));
    }

    #[test]
    fn zero_port_is_rejected_at_build_time() {
        let err = HttpWaitStrategy::new("/health", 0).unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[tokio::test]
    async fn unresolvable_endpoint_is_pending() {
        let strategy = HttpWaitStrategy::new("/health", 8080).unwrap();
        let target = WaitTarget::new("app", "unit");
        let probe = strategy.probe(&target).await.unwrap();
        assert!(matches!(probe, Probe::Pending(_)));
    }
}
