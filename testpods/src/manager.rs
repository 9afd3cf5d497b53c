//! Types shared by the workload, service and storage manager capabilities.

use snafu::Snafu;

/// The `Result` type returned by manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Where a manager instance is in its lifecycle. A manager is a thin wrapper around one cluster
/// resource and moves through these states exactly once; it is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// `create` has not been called. `delete` in this state is a no-op.
    Uncreated,
    /// The resource exists (or existed) in the cluster.
    Created,
    /// The resource has been deleted.
    Deleted,
}

/// The error type returned by manager operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "{} '{}' has already been created, create may only be called once per manager",
        what,
        name
    ))]
    AlreadyCreated { what: &'static str, name: String },

    #[snafu(display("Unable to {} {} '{}': {}", method, what, name, source))]
    KubeApiCall {
        method: &'static str,
        what: &'static str,
        name: String,
        source: kube::Error,
    },

    #[snafu(display(
        "{} failure(s) while deleting {}: {}",
        failures.len(),
        what,
        failures.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
    ))]
    CompositeDelete {
        what: &'static str,
        failures: Vec<Error>,
    },
}
