use super::{Probe, Result, WaitStrategy, WaitTarget};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Waits until a TCP connection to the target's external endpoint is accepted. This is the
/// default strategy for deployment-backed pods: once the port accepts connections the
/// dependency is reachable from test code.
#[derive(Debug, Clone)]
pub struct PortWaitStrategy {
    port: u16,
    timeout: Duration,
    poll_interval: Duration,
    connect_timeout: Duration,
}

impl PortWaitStrategy {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
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

    /// The budget for each individual connection attempt.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl WaitStrategy for PortWaitStrategy {
    async fn probe(&self, target: &WaitTarget) -> Result<Probe> {
        let endpoint = match target.endpoint().await {
            Some(endpoint) => endpoint,
            None => {
                return Ok(Probe::Pending(
                    "external endpoint is not resolvable yet".to_string(),
                ))
            }
        };
        let address = endpoint.to_string();
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_)) => Ok(Probe::Ready),
            Ok(Err(e)) => Ok(Probe::Pending(format!(
                "connect to {} failed: {}",
                address, e
            ))),
            Err(_) => Ok(Probe::Pending(format!(
                "connect to {} timed out after {:.1}s",
                address,
                self.connect_timeout.as_secs_f64()
            ))),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn describe(&self) -> String {
        format!("port-reachability({})", self.port)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::cluster::HostAndPort;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_reports_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target =
            WaitTarget::new("listener", "unit").with_endpoint(HostAndPort::localhost(port));

        let strategy = PortWaitStrategy::new(port).with_timeout(Duration::from_secs(2));
        strategy.wait_until_ready(&target).await.unwrap();
    }

    #[tokio::test]
    async fn closed_port_times_out_with_connection_error() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let target =
            WaitTarget::new("closed", "unit").with_endpoint(HostAndPort::localhost(port));

        let strategy = PortWaitStrategy::new(port)
            .with_timeout(Duration::from_millis(150))
            .with_poll_interval(Duration::from_millis(50));
        let err = strategy.wait_until_ready(&target).await.unwrap_err();
        assert!(err.to_string().contains("port-reachability"));
    }

    #[tokio::test]
    async fn unresolvable_endpoint_is_pending_not_fatal() {
        let target = WaitTarget::new("no-endpoint", "unit");
        let strategy = PortWaitStrategy::new(8080);
        let probe = strategy.probe(&target).await.unwrap();
        assert!(matches!(probe, Probe::Pending(_)));
    }
}
