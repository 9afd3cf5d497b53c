// These tests provision real pods into a `kind` cluster and require docker and kind on the
// machine. Run them with `cargo test --features integ`.
#![cfg(feature = "integ")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use selftest::Cluster;
use std::time::Duration;
use testpods::service::ServiceManager;
use testpods::storage::{PersistentStorageManager, StorageManager};
use testpods::wait::{CommandWaitStrategy, CompositeWaitStrategy, ReadinessWaitStrategy};
use testpods::{ExposurePlan, LifecycleState, ManagerState, TestNamespace, TestPod};

/// A stable-identity pod with one storage claim template and no explicit exposure: start must
/// create the namespace, the claim templates, the workload and the default headless+internal
/// exposures, wait on the workload readiness condition, and stop must delete everything in
/// reverse order.
#[tokio::test]
async fn stateful_pod_provisions_with_defaults_and_tears_down() {
    let _ = env_logger::try_init();
    let cluster = Cluster::new("testpods-integ-stateful").unwrap();
    let connection = cluster.connection().await.unwrap();
    let namespace = TestNamespace::new(connection.clone(), "testpods-integ");

    let mut redis = TestPod::stateful_set("redis:7-alpine")
        .with_name("redis")
        .with_port(6379)
        .with_storage(Box::new(PersistentStorageManager::new("100Mi")))
        .in_namespace(namespace.clone());

    redis.start().await.unwrap();
    assert_eq!(redis.state(), LifecycleState::Ready);

    // Default exposures: headless for replica DNS plus an internal service.
    let exposure = redis.exposure();
    assert_eq!(exposure.size(), 2);
    assert_eq!(
        exposure.manager(0).unwrap().name(),
        Some("redis-headless")
    );
    assert_eq!(exposure.manager(1).unwrap().name(), Some("redis"));

    // The claim template rides on the workload rather than existing standalone.
    assert_eq!(redis.storage().state(), ManagerState::Uncreated);
    assert_eq!(redis.storage().claim_templates().len(), 1);

    redis.stop().await.unwrap();
    assert_eq!(redis.state(), LifecycleState::Stopped);
    namespace.delete().await.unwrap();
}

/// An external-static-port exposure with an explicit port must reserve exactly that port, and
/// the resolved external coordinate must use it.
#[tokio::test]
async fn node_port_exposure_reserves_the_requested_port() {
    let cluster = Cluster::new("testpods-integ-nodeport").unwrap();
    let connection = cluster.connection().await.unwrap();
    let namespace = TestNamespace::new(connection.clone(), "testpods-integ-np");

    let mut nginx = TestPod::deployment("nginx:1.25-alpine")
        .with_name("nginx")
        .with_port(80)
        .with_exposure(ExposurePlan::NodePort {
            node_port: Some(30080),
        })
        .in_namespace(namespace.clone());

    nginx.start().await.unwrap();
    assert_eq!(nginx.node_port(), Some(30080));
    assert_eq!(nginx.external_port().unwrap(), 30080);

    // The cached coordinate is returned as-is on repeated reads.
    let first = nginx.external_host().unwrap();
    assert_eq!(nginx.external_host().unwrap(), first);

    nginx.stop().await.unwrap();
    namespace.delete().await.unwrap();
}

/// Composite readiness: the workload condition and an in-container command must both pass.
#[tokio::test]
async fn composite_wait_combines_readiness_and_command() {
    let cluster = Cluster::new("testpods-integ-composite").unwrap();
    let connection = cluster.connection().await.unwrap();
    let namespace = TestNamespace::new(connection.clone(), "testpods-integ-wait");

    let wait = CompositeWaitStrategy::all_of(vec![
        Box::new(ReadinessWaitStrategy::new()),
        Box::new(
            CommandWaitStrategy::new(["redis-cli", "ping"])
                .unwrap()
                .with_timeout(Duration::from_secs(120)),
        ),
    ])
    .unwrap();

    let mut redis = TestPod::stateful_set("redis:7-alpine")
        .with_name("redis-wait")
        .with_port(6379)
        .waiting_for(Box::new(wait))
        .in_namespace(namespace.clone());

    redis.start().await.unwrap();
    redis.stop().await.unwrap();
    namespace.delete().await.unwrap();
}
