//! Storage managers provide volumes, volume mounts and claim templates for a pod's workload, and
//! own the lifecycle of any standalone claims they create.
//!
//! A deployment-backed pod gets its persistent claims created up front ([`StorageManager::create`])
//! and referenced as volumes; a stateful workload instead receives
//! [`claim templates`](StorageManager::claim_templates) that the cluster clones per replica.

use crate::manager::{self, AlreadyCreatedSnafu, KubeApiCallSnafu, ManagerState};
use crate::workload::WorkloadKind;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{ObjectMeta, PostParams};
use kube::Api;
use log::debug;
use maplit::btreemap;
use snafu::{ensure, ResultExt};

/// A stable discriminator for storage manager variants, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Persistent,
    EmptyDir,
    ConfigMap,
    Secret,
    Composite,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::EmptyDir => "empty-dir",
            Self::ConfigMap => "config-map",
            Self::Secret => "secret",
            Self::Composite => "composite",
        }
    }
}

/// Manages volume configuration for a test pod.
#[async_trait]
pub trait StorageManager: Send + Sync {
    /// Volumes to add to the pod spec for the given workload kind. Persistent storage
    /// contributes a claim-reference volume for deployments only; stateful workloads get their
    /// volumes from claim templates instead.
    fn volumes(&self, workload: WorkloadKind) -> Vec<Volume>;

    /// Volume mounts for the main container.
    fn mounts(&self) -> Vec<VolumeMount>;

    /// Claim templates for stateful workloads, cloned by the cluster for each replica.
    fn claim_templates(&self) -> Vec<PersistentVolumeClaim>;

    /// Create any standalone claims this manager owns. Most variants reference existing objects
    /// and create nothing.
    async fn create(&mut self, namespace: &str, client: &kube::Client) -> manager::Result<()> {
        let _ = (namespace, client);
        Ok(())
    }

    /// Delete whatever `create` made. Deleting before `create`, or after a failed `create`, is a
    /// no-op.
    async fn delete(&mut self) -> manager::Result<()> {
        Ok(())
    }

    fn state(&self) -> ManagerState {
        ManagerState::Uncreated
    }

    fn kind(&self) -> StorageKind;
}

/// PVC-backed storage. For deployments a standalone claim is created and referenced; for
/// stateful workloads the claim becomes a per-replica template.
pub struct PersistentStorageManager {
    size: String,
    storage_class: Option<String>,
    volume_name: String,
    mount_path: String,
    state: ManagerState,
    created: Option<(String, kube::Client)>,
}

impl PersistentStorageManager {
    pub fn new<S: Into<String>>(size: S) -> Self {
        Self {
            size: size.into(),
            storage_class: None,
            volume_name: "data".to_string(),
            mount_path: "/data".to_string(),
            state: ManagerState::Uncreated,
            created: None,
        }
    }

    pub fn with_storage_class<S: Into<String>>(mut self, class: S) -> Self {
        self.storage_class = Some(class.into());
        self
    }

    pub fn with_volume_name<S: Into<String>>(mut self, name: S) -> Self {
        self.volume_name = name.into();
        self
    }

    pub fn with_mount_path<S: Into<String>>(mut self, path: S) -> Self {
        self.mount_path = path.into();
        self
    }

    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    fn claim(&self) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(self.volume_name.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: self.storage_class.clone(),
                resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                    requests: Some(btreemap! {
                        "storage".to_string() => Quantity(self.size.clone())
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl StorageManager for PersistentStorageManager {
    fn volumes(&self, workload: WorkloadKind) -> Vec<Volume> {
        match workload {
            WorkloadKind::Deployment => vec![Volume {
                name: self.volume_name.clone(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: self.volume_name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            // Claim templates create and mount the volume per replica.
            WorkloadKind::StatefulSet => Vec::new(),
        }
    }

    fn mounts(&self) -> Vec<VolumeMount> {
        vec![VolumeMount {
            name: self.volume_name.clone(),
            mount_path: self.mount_path.clone(),
            ..Default::default()
        }]
    }

    fn claim_templates(&self) -> Vec<PersistentVolumeClaim> {
        vec![self.claim()]
    }

    async fn create(&mut self, namespace: &str, client: &kube::Client) -> manager::Result<()> {
        ensure!(
            self.state != ManagerState::Created,
            AlreadyCreatedSnafu {
                what: "persistent volume claim",
                name: self.volume_name.clone(),
            }
        );
        let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
        api.create(&PostParams::default(), &self.claim())
            .await
            .context(KubeApiCallSnafu {
                method: "create",
                what: "persistent volume claim",
                name: self.volume_name.clone(),
            })?;
        self.state = ManagerState::Created;
        self.created = Some((namespace.to_string(), client.clone()));
        debug!("created pvc '{}/{}'", namespace, self.volume_name);
        Ok(())
    }

    async fn delete(&mut self) -> manager::Result<()> {
        let (namespace, client) = match &self.created {
            Some(created) => created.clone(),
            None => return Ok(()),
        };
        let api: Api<PersistentVolumeClaim> = Api::namespaced(client, &namespace);
        match api.delete(&self.volume_name, &Default::default()).await {
            Ok(_) | Err(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })) => {
                debug!("deleted pvc '{}/{}'", namespace, self.volume_name);
                self.state = ManagerState::Deleted;
                self.created = None;
                Ok(())
            }
            Err(source) => Err(source).context(KubeApiCallSnafu {
                method: "delete",
                what: "persistent volume claim",
                name: self.volume_name.clone(),
            }),
        }
    }

    fn state(&self) -> ManagerState {
        self.state
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Persistent
    }
}

/// Ephemeral scratch space that lives and dies with the pod.
pub struct EmptyDirStorageManager {
    volume_name: String,
    mount_path: String,
}

impl EmptyDirStorageManager {
    pub fn new<S: Into<String>>(mount_path: S) -> Self {
        Self {
            volume_name: "scratch".to_string(),
            mount_path: mount_path.into(),
        }
    }

    pub fn with_volume_name<S: Into<String>>(mut self, name: S) -> Self {
        self.volume_name = name.into();
        self
    }
}

#[async_trait]
impl StorageManager for EmptyDirStorageManager {
    fn volumes(&self, _workload: WorkloadKind) -> Vec<Volume> {
        vec![Volume {
            name: self.volume_name.clone(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]
    }

    fn mounts(&self) -> Vec<VolumeMount> {
        vec![VolumeMount {
            name: self.volume_name.clone(),
            mount_path: self.mount_path.clone(),
            ..Default::default()
        }]
    }

    fn claim_templates(&self) -> Vec<PersistentVolumeClaim> {
        Vec::new()
    }

    fn kind(&self) -> StorageKind {
        StorageKind::EmptyDir
    }
}

/// Mounts an existing config map, e.g. init scripts for a database pod. The config map itself is
/// not owned by this manager and is never created or deleted here.
pub struct ConfigMapStorageManager {
    config_map: String,
    mount_path: String,
}

impl ConfigMapStorageManager {
    pub fn new<S1: Into<String>, S2: Into<String>>(config_map: S1, mount_path: S2) -> Self {
        Self {
            config_map: config_map.into(),
            mount_path: mount_path.into(),
        }
    }

    fn volume_name(&self) -> String {
        format!("{}-volume", self.config_map)
    }
}

#[async_trait]
impl StorageManager for ConfigMapStorageManager {
    fn volumes(&self, _workload: WorkloadKind) -> Vec<Volume> {
        vec![Volume {
            name: self.volume_name(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(self.config_map.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }]
    }

    fn mounts(&self) -> Vec<VolumeMount> {
        vec![VolumeMount {
            name: self.volume_name(),
            mount_path: self.mount_path.clone(),
            ..Default::default()
        }]
    }

    fn claim_templates(&self) -> Vec<PersistentVolumeClaim> {
        Vec::new()
    }

    fn kind(&self) -> StorageKind {
        StorageKind::ConfigMap
    }
}

/// Mounts an existing secret, e.g. database credentials. The secret is not owned by this
/// manager.
pub struct SecretStorageManager {
    secret: String,
    mount_path: String,
}

impl SecretStorageManager {
    pub fn new<S1: Into<String>, S2: Into<String>>(secret: S1, mount_path: S2) -> Self {
        Self {
            secret: secret.into(),
            mount_path: mount_path.into(),
        }
    }

    fn volume_name(&self) -> String {
        format!("{}-volume", self.secret)
    }
}

#[async_trait]
impl StorageManager for SecretStorageManager {
    fn volumes(&self, _workload: WorkloadKind) -> Vec<Volume> {
        vec![Volume {
            name: self.volume_name(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(self.secret.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }]
    }

    fn mounts(&self) -> Vec<VolumeMount> {
        vec![VolumeMount {
            name: self.volume_name(),
            mount_path: self.mount_path.clone(),
            ..Default::default()
        }]
    }

    fn claim_templates(&self) -> Vec<PersistentVolumeClaim> {
        Vec::new()
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Secret
    }
}

/// An ordered collection of storage managers for pods needing more than one volume type, e.g. a
/// database with persistent data, init scripts from a config map and credentials from a secret.
/// Creation fans out in declaration order and stops at the first failure; deletion runs in
/// reverse order and attempts every member even when one fails.
#[derive(Default)]
pub struct CompositeStorageManager {
    managers: Vec<Box<dyn StorageManager>>,
}

impl CompositeStorageManager {
    pub fn new(managers: Vec<Box<dyn StorageManager>>) -> Self {
        Self { managers }
    }

    pub fn push(&mut self, manager: Box<dyn StorageManager>) {
        self.managers.push(manager);
    }

    pub fn size(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// The manager at `index`, or `None` when the index is out of range.
    pub fn manager(&self, index: usize) -> Option<&dyn StorageManager> {
        self.managers.get(index).map(|m| m.as_ref())
    }
}

#[async_trait]
impl StorageManager for CompositeStorageManager {
    fn volumes(&self, workload: WorkloadKind) -> Vec<Volume> {
        self.managers
            .iter()
            .flat_map(|m| m.volumes(workload))
            .collect()
    }

    fn mounts(&self) -> Vec<VolumeMount> {
        self.managers.iter().flat_map(|m| m.mounts()).collect()
    }

    fn claim_templates(&self) -> Vec<PersistentVolumeClaim> {
        self.managers
            .iter()
            .flat_map(|m| m.claim_templates())
            .collect()
    }

    async fn create(&mut self, namespace: &str, client: &kube::Client) -> manager::Result<()> {
        for manager in self.managers.iter_mut() {
            manager.create(namespace, client).await?;
        }
        Ok(())
    }

    async fn delete(&mut self) -> manager::Result<()> {
        let mut failures = Vec::new();
        for manager in self.managers.iter_mut().rev() {
            if let Err(e) = manager.delete().await {
                failures.push(e);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(manager::Error::CompositeDelete {
                what: "storage",
                failures,
            })
        }
    }

    fn state(&self) -> ManagerState {
        if self
            .managers
            .iter()
            .any(|m| m.state() == ManagerState::Created)
        {
            ManagerState::Created
        } else {
            ManagerState::Uncreated
        }
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Composite
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn persistent_claim_template_carries_size_and_class() {
        let manager = PersistentStorageManager::new("10Gi").with_storage_class("fast-ssd");
        let templates = manager.claim_templates();
        assert_eq!(templates.len(), 1);
        let spec = templates[0].spec.as_ref().unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("fast-ssd"));
        let requests = spec
            .resources
            .as_ref()
            .unwrap()
            .requests
            .as_ref()
            .unwrap();
        assert_eq!(requests["storage"].0, "10Gi");
    }

    #[test]
    fn persistent_volumes_are_workload_dependent() {
        let manager = PersistentStorageManager::new("1Gi");
        assert_eq!(manager.volumes(WorkloadKind::Deployment).len(), 1);
        assert!(manager.volumes(WorkloadKind::StatefulSet).is_empty());
    }

    #[test]
    fn composite_aggregates_volumes_and_mounts_in_order() {
        let composite = CompositeStorageManager::new(vec![
            Box::new(PersistentStorageManager::new("1Gi")),
            Box::new(ConfigMapStorageManager::new("init-scripts", "/docker-entrypoint-initdb.d")),
            Box::new(SecretStorageManager::new("db-credentials", "/etc/secrets")),
        ]);
        assert_eq!(composite.size(), 3);
        let mounts = composite.mounts();
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].mount_path, "/data");
        assert_eq!(mounts[1].mount_path, "/docker-entrypoint-initdb.d");
        assert_eq!(mounts[2].mount_path, "/etc/secrets");
        // Only the persistent member contributes a claim template.
        assert_eq!(composite.claim_templates().len(), 1);
    }

    #[test]
    fn composite_index_accessors_return_none_out_of_range() {
        let composite =
            CompositeStorageManager::new(vec![Box::new(EmptyDirStorageManager::new("/tmp/x"))]);
        assert!(composite.manager(0).is_some());
        assert!(composite.manager(1).is_none());
    }

    #[tokio::test]
    async fn delete_before_create_is_a_no_op() {
        let mut composite = CompositeStorageManager::new(vec![
            Box::new(PersistentStorageManager::new("1Gi")),
            Box::new(EmptyDirStorageManager::new("/scratch")),
        ]);
        composite.delete().await.unwrap();
        assert_eq!(composite.state(), ManagerState::Uncreated);
    }

    #[tokio::test]
    async fn empty_composite_is_valid_and_all_operations_are_no_ops() {
        let mut composite = CompositeStorageManager::default();
        assert_eq!(composite.size(), 0);
        assert!(composite.volumes(WorkloadKind::Deployment).is_empty());
        assert!(composite.mounts().is_empty());
        composite.delete().await.unwrap();
    }
}
