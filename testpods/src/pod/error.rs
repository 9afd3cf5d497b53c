use super::LifecycleState;
use crate::{cluster, manager, wait};
use snafu::Snafu;

/// The `Result` type returned by pod lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by pod lifecycle operations. Start failures name the pod and the
/// step that failed; by the time one is returned, best-effort cleanup of whatever was created
/// has already run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to start pod '{}', its configuration is invalid: {}", pod, source))]
    InvalidConfig {
        pod: String,
        source: crate::error::Error,
    },

    #[snafu(display("Unable to start pod '{}', no cluster connection: {}", pod, source))]
    ClusterResolution {
        pod: String,
        source: cluster::Error,
    },

    #[snafu(display("Unable to start pod '{}', namespace setup failed: {}", pod, source))]
    Namespace {
        pod: String,
        source: manager::Error,
    },

    #[snafu(display("Unable to start pod '{}', storage creation failed: {}", pod, source))]
    Storage {
        pod: String,
        source: manager::Error,
    },

    #[snafu(display("Unable to start pod '{}', workload creation failed: {}", pod, source))]
    Workload {
        pod: String,
        source: manager::Error,
    },

    #[snafu(display("Unable to start pod '{}', exposure creation failed: {}", pod, source))]
    Exposure {
        pod: String,
        source: manager::Error,
    },

    #[snafu(display("Pod '{}' did not become ready: {}", pod, source))]
    Readiness { pod: String, source: wait::Error },

    #[snafu(display(
        "Unable to resolve the external access coordinate for pod '{}': {}",
        pod,
        source
    ))]
    ExternalAccess {
        pod: String,
        source: cluster::Error,
    },

    #[snafu(display(
        "Pod '{}' is not started; call start() before reading its external endpoint",
        pod
    ))]
    NotStarted { pod: String },

    #[snafu(display("Unable to read logs of pod '{}': {}", pod, source))]
    Logs { pod: String, source: kube::Error },

    #[snafu(display("No pod matching '{}' exists in namespace '{}'", selector, namespace))]
    NoPodFound { selector: String, namespace: String },

    #[snafu(display(
        "Pod '{}' has no externally reachable exposure, so no external endpoint was resolved",
        pod
    ))]
    NoExternalAccess { pod: String },

    #[snafu(display("Cannot {} pod '{}' in state {}", operation, pod, state))]
    InvalidTransition {
        operation: &'static str,
        pod: String,
        state: LifecycleState,
    },

    #[snafu(display(
        "Teardown of pod '{}' finished with {} failure(s): {}",
        pod,
        failures.len(),
        failures.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
    ))]
    Teardown {
        pod: String,
        failures: Vec<manager::Error>,
    },
}
