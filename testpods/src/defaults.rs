//! Process-wide and thread-scoped default configuration for test pods.
//!
//! Settings are resolved in this order: the calling thread's scoped value if present, else the
//! process-wide global value, else a documented fallback (auto-discovery for the cluster
//! connection, a generated `testpods-xxxxx` name for the namespace).
//!
//! The thread-scoped tier exists so that parallel test classes can configure different clusters
//! or namespaces without seeing each other's settings. It is exclusively owned by its thread;
//! a thread spawned through [`spawn_inheriting`] receives an independent copy of the parent's
//! settings taken at spawn time, and later mutation on either side is invisible to the other.
//! Test harnesses that reuse worker threads must clear the thread tier when a test scope ends,
//! either by calling [`clear`] or by holding a [`DefaultsGuard`].

use crate::cluster::{self, ClusterConnection, TestNamespace};
use lazy_static::lazy_static;
use std::cell::RefCell;
use std::sync::{Arc, RwLock};
use std::thread;

/// A function that produces namespace names, e.g. one derived from the current test class.
pub type NamespaceSupplier = Arc<dyn Fn() -> String + Send + Sync>;

/// The pull policy applied to containers created by test pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl ImagePullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

/// One tier of settings. Cloning produces an independent copy: every field is either a value
/// type or an immutable shared handle, and mutation replaces fields rather than writing through
/// them, so a clone never observes later changes to its source.
#[derive(Clone, Default)]
struct Tier {
    cluster: Option<ClusterConnection>,
    namespace_supplier: Option<NamespaceSupplier>,
    shared_namespace: Option<TestNamespace>,
    image_pull_policy: Option<ImagePullPolicy>,
}

lazy_static! {
    static ref GLOBAL: RwLock<Tier> = RwLock::new(Tier::default());
}

thread_local! {
    static THREAD: RefCell<Option<Tier>> = RefCell::new(None);
}

fn with_thread_tier<T>(f: impl FnOnce(&mut Tier) -> T) -> T {
    THREAD.with(|cell| f(cell.borrow_mut().get_or_insert_with(Tier::default)))
}

fn read_thread_tier<T>(f: impl FnOnce(Option<&Tier>) -> T) -> T {
    THREAD.with(|cell| f(cell.borrow().as_ref()))
}

fn read_global<T>(f: impl FnOnce(&Tier) -> T) -> T {
    let guard = GLOBAL.read().unwrap_or_else(|e| e.into_inner());
    f(&guard)
}

fn write_global(f: impl FnOnce(&mut Tier)) {
    let mut guard = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
    f(&mut guard)
}

/// Set the cluster connection for the calling thread.
pub fn set_cluster(connection: ClusterConnection) {
    with_thread_tier(|tier| tier.cluster = Some(connection));
}

/// Set the namespace name supplier for the calling thread.
pub fn set_namespace_supplier<F>(supplier: F)
where
    F: Fn() -> String + Send + Sync + 'static,
{
    with_thread_tier(|tier| tier.namespace_supplier = Some(Arc::new(supplier)));
}

/// Set a shared namespace for the calling thread. Pods started by this thread will be placed in
/// it instead of creating namespaces of their own.
pub fn set_shared_namespace(namespace: TestNamespace) {
    with_thread_tier(|tier| tier.shared_namespace = Some(namespace));
}

/// Set the image pull policy for the calling thread.
pub fn set_image_pull_policy(policy: ImagePullPolicy) {
    with_thread_tier(|tier| tier.image_pull_policy = Some(policy));
}

/// Set the process-wide cluster connection, used when the calling thread has none.
pub fn set_global_cluster(connection: ClusterConnection) {
    write_global(|tier| tier.cluster = Some(connection));
}

/// Set the process-wide namespace name supplier.
pub fn set_global_namespace_supplier<F>(supplier: F)
where
    F: Fn() -> String + Send + Sync + 'static,
{
    write_global(|tier| tier.namespace_supplier = Some(Arc::new(supplier)));
}

/// Set the process-wide shared namespace.
pub fn set_global_shared_namespace(namespace: TestNamespace) {
    write_global(|tier| tier.shared_namespace = Some(namespace));
}

/// Set the process-wide image pull policy.
pub fn set_global_image_pull_policy(policy: ImagePullPolicy) {
    write_global(|tier| tier.image_pull_policy = Some(policy));
}

/// Remove the calling thread's scoped settings. The global tier is untouched, as are copies
/// already inherited by child threads.
pub fn clear() {
    THREAD.with(|cell| *cell.borrow_mut() = None);
}

/// Remove all process-wide settings.
pub fn clear_global() {
    write_global(|tier| *tier = Tier::default());
}

/// Whether either tier currently supplies a cluster connection. This never triggers
/// auto-discovery.
pub fn has_cluster_configured() -> bool {
    if read_thread_tier(|tier| tier.map(|t| t.cluster.is_some()).unwrap_or(false)) {
        return true;
    }
    read_global(|tier| tier.cluster.is_some())
}

/// The shared namespace, if either tier configures one.
pub fn shared_namespace() -> Option<TestNamespace> {
    if let Some(namespace) =
        read_thread_tier(|tier| tier.and_then(|t| t.shared_namespace.clone()))
    {
        return Some(namespace);
    }
    read_global(|tier| tier.shared_namespace.clone())
}

/// Resolve the cluster connection: thread tier, else global tier, else auto-discovery from the
/// environment.
pub async fn resolve_cluster() -> cluster::Result<ClusterConnection> {
    if let Some(connection) = read_thread_tier(|tier| tier.and_then(|t| t.cluster.clone())) {
        return Ok(connection);
    }
    if let Some(connection) = read_global(|tier| tier.cluster.clone()) {
        return Ok(connection);
    }
    ClusterConnection::try_default().await
}

/// Resolve a namespace name: thread tier supplier, else global supplier, else a generated
/// `testpods-xxxxx` name.
pub fn resolve_namespace_name() -> String {
    if let Some(supplier) =
        read_thread_tier(|tier| tier.and_then(|t| t.namespace_supplier.clone()))
    {
        return supplier();
    }
    if let Some(supplier) = read_global(|tier| tier.namespace_supplier.clone()) {
        return supplier();
    }
    cluster::generate_name()
}

/// Resolve the image pull policy, if either tier configures one.
pub fn resolve_image_pull_policy() -> Option<ImagePullPolicy> {
    if let Some(policy) = read_thread_tier(|tier| tier.and_then(|t| t.image_pull_policy)) {
        return Some(policy);
    }
    read_global(|tier| tier.image_pull_policy)
}

/// An independent copy of the calling thread's scoped settings, taken for handoff to another
/// thread.
pub struct Snapshot(Option<Tier>);

/// Capture the calling thread's scoped settings.
pub fn snapshot() -> Snapshot {
    Snapshot(read_thread_tier(|tier| tier.cloned()))
}

/// Adopt a snapshot as the calling thread's scoped settings, replacing whatever was there.
pub fn install(snapshot: Snapshot) {
    THREAD.with(|cell| *cell.borrow_mut() = snapshot.0);
}

/// Spawn a thread that inherits the calling thread's scoped settings. The copy happens here, at
/// the spawn boundary; mutation on either side afterwards is invisible to the other.
pub fn spawn_inheriting<F, T>(f: F) -> thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let inherited = snapshot();
    thread::spawn(move || {
        install(inherited);
        f()
    })
}

/// Held by test-framework glue for the duration of a test scope; dropping it clears the thread
/// tier so that reused worker threads do not leak settings into the next test.
#[derive(Default)]
pub struct DefaultsGuard;

impl DefaultsGuard {
    pub fn new() -> Self {
        Self
    }
}

impl Drop for DefaultsGuard {
    fn drop(&mut self) {
        clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::mpsc;

    // The global tier is process state shared by every test in this binary, so these tests only
    // exercise the thread tier and inheritance, which are isolated by construction.

    #[test]
    fn thread_scoped_value_is_not_visible_from_another_thread() {
        set_namespace_supplier(|| "from-thread-a".to_string());

        let handle = thread::spawn(|| {
            read_thread_tier(|tier| tier.and_then(|t| t.namespace_supplier.clone())).is_none()
        });
        assert!(handle.join().unwrap());

        assert_eq!(resolve_namespace_name(), "from-thread-a");
        clear();
    }

    #[test]
    fn child_inherits_snapshot_and_later_mutations_are_isolated() {
        set_namespace_supplier(|| "parent-initial".to_string());

        let (tx, rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = spawn_inheriting(move || {
            // Inherited at spawn time.
            tx.send(resolve_namespace_name()).unwrap();
            // Wait until the parent has mutated its own tier, then check we still see the copy.
            release_rx.recv().unwrap();
            tx.send(resolve_namespace_name()).unwrap();
            // Mutate the child's copy; the parent must not see this.
            set_namespace_supplier(|| "child-mutated".to_string());
            tx.send(resolve_namespace_name()).unwrap();
        });

        assert_eq!(rx.recv().unwrap(), "parent-initial");
        set_namespace_supplier(|| "parent-mutated".to_string());
        release_tx.send(()).unwrap();
        assert_eq!(rx.recv().unwrap(), "parent-initial");
        assert_eq!(rx.recv().unwrap(), "child-mutated");
        handle.join().unwrap();

        assert_eq!(resolve_namespace_name(), "parent-mutated");
        clear();
    }

    #[test]
    fn clear_removes_only_the_calling_threads_tier() {
        set_image_pull_policy(ImagePullPolicy::Never);
        let handle = spawn_inheriting(|| {
            clear();
            resolve_image_pull_policy()
        });
        assert_eq!(handle.join().unwrap(), None);
        assert_eq!(resolve_image_pull_policy(), Some(ImagePullPolicy::Never));
        clear();
    }

    #[test]
    fn guard_clears_on_drop() {
        {
            let _guard = DefaultsGuard::new();
            set_image_pull_policy(ImagePullPolicy::Always);
            assert_eq!(resolve_image_pull_policy(), Some(ImagePullPolicy::Always));
        }
        assert_eq!(resolve_image_pull_policy(), None);
    }

    #[test]
    fn unconfigured_thread_reports_no_cluster() {
        // No thread tier and (in this test binary) no thread-local cluster; the check must not
        // attempt discovery.
        clear();
        assert!(!read_thread_tier(|tier| tier
            .map(|t| t.cluster.is_some())
            .unwrap_or(false)));
    }

    #[test]
    fn namespace_name_falls_back_to_generated() {
        clear();
        let name = resolve_namespace_name();
        assert!(name.starts_with("testpods-"));
    }
}
