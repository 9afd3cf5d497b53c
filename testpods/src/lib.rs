/*!

testpods provisions ephemeral dependency pods (databases, brokers, generic services) into a real
Kubernetes cluster for the duration of a test run, waits until they are usable, hands the test
their connection coordinates, and tears everything down again.

The pieces:

- [`TestPod`] orchestrates the lifecycle of one dependency: namespace, storage, workload,
  exposures, readiness, external access, and the symmetric teardown.
- [`wait`] holds the readiness strategies: port reachability, HTTP, log messages, in-container
  commands, the workload's own readiness condition, and composites of all of these.
- [`workload`], [`service`] and [`storage`] hold the manager capabilities `TestPod` delegates
  resource creation and deletion to.
- [`defaults`] is the two-tier (process-wide and thread-scoped) configuration store that lets
  parallel test classes configure clusters and namespaces without interfering with each other.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub mod cluster;
pub mod constants;
pub mod defaults;
mod error;
pub mod manager;
pub mod pod;
pub mod service;
pub mod storage;
pub mod wait;
pub mod workload;

pub use cluster::{ClusterConnection, ExternalAccessStrategy, HostAndPort, TestNamespace};
pub use defaults::{DefaultsGuard, ImagePullPolicy};
pub use error::{Error, Result};
pub use manager::ManagerState;
pub use pod::{ExposurePlan, LifecycleState, TestPod};
