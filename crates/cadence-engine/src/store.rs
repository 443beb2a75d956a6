// Cadence Engine - Instance persistence
//
// Instances are stored behind a trait so deployments can bring their own
// database. Updates use optimistic concurrency: every successful update
// bumps the instance version, and a stale writer gets a Conflict error
// instead of silently clobbering newer history.

use async_trait::async_trait;
use cadence_core::{CadenceError, CadenceResult, EntityRef, WorkflowInstance};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Workflow instance store
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Fetch one instance by id
    async fn get(&self, id: Uuid) -> CadenceResult<Option<WorkflowInstance>>;

    /// All instances attached to an entity
    async fn find_for_entity(&self, entity: &EntityRef) -> CadenceResult<Vec<WorkflowInstance>>;

    /// All non-terminal instances, the working set of a timed run
    async fn find_active(&self) -> CadenceResult<Vec<WorkflowInstance>>;

    /// All instances
    async fn find_all(&self) -> CadenceResult<Vec<WorkflowInstance>>;

    /// Insert a new instance; fails if the id already exists
    async fn insert(&self, instance: WorkflowInstance) -> CadenceResult<()>;

    /// Persist an updated instance.
    ///
    /// `instance.version` must equal the stored version; on success the
    /// version is bumped (both stored and on the passed instance). A
    /// mismatch yields `CadenceError::Conflict`.
    async fn update(&self, instance: &mut WorkflowInstance) -> CadenceResult<()>;
}

/// In-memory store for tests, dry runs, and embedded use
#[derive(Default)]
pub struct MemoryInstanceStore {
    instances: DashMap<Uuid, WorkflowInstance>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a set of instances, e.g. a dry-run copy of another store
    pub fn preloaded(instances: Vec<WorkflowInstance>) -> Self {
        let store = Self::new();
        for instance in instances {
            store.instances.insert(instance.id, instance);
        }
        store
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn get(&self, id: Uuid) -> CadenceResult<Option<WorkflowInstance>> {
        Ok(self.instances.get(&id).map(|i| i.clone()))
    }

    async fn find_for_entity(&self, entity: &EntityRef) -> CadenceResult<Vec<WorkflowInstance>> {
        Ok(self
            .instances
            .iter()
            .filter(|i| &i.entity == entity)
            .map(|i| i.clone())
            .collect())
    }

    async fn find_active(&self) -> CadenceResult<Vec<WorkflowInstance>> {
        Ok(self
            .instances
            .iter()
            .filter(|i| !i.is_terminal())
            .map(|i| i.clone())
            .collect())
    }

    async fn find_all(&self) -> CadenceResult<Vec<WorkflowInstance>> {
        Ok(self.instances.iter().map(|i| i.clone()).collect())
    }

    async fn insert(&self, instance: WorkflowInstance) -> CadenceResult<()> {
        if self.instances.contains_key(&instance.id) {
            return Err(CadenceError::store(format!(
                "instance {} already exists",
                instance.id
            )));
        }
        self.instances.insert(instance.id, instance);
        Ok(())
    }

    async fn update(&self, instance: &mut WorkflowInstance) -> CadenceResult<()> {
        let mut stored = self
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| CadenceError::store(format!("instance {} not found", instance.id)))?;

        if stored.version != instance.version {
            return Err(CadenceError::Conflict(instance.id));
        }

        instance.version += 1;
        *stored = instance.clone();
        Ok(())
    }
}

/// File-backed store: one JSON file holding all instances
///
/// Changes are written through immediately so state survives across CLI
/// invocations. Suited to single-operator deployments; concurrent writers
/// should use a shared database behind their own `InstanceStore`.
#[derive(Clone)]
pub struct FileInstanceStore {
    path: PathBuf,
    cache: Arc<RwLock<HashMap<Uuid, WorkflowInstance>>>,
}

impl FileInstanceStore {
    /// Open (or create) a store at the given path
    pub async fn open(path: impl Into<PathBuf>) -> CadenceResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CadenceError::store(format!(
                        "failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let cache: HashMap<Uuid, WorkflowInstance> = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                CadenceError::store(format!("failed to read {}: {}", path.display(), e))
            })?;

            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    CadenceError::store(format!("failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            cache: Arc::new(RwLock::new(cache)),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn persist(&self) -> CadenceResult<()> {
        let cache = self.cache.read().await;
        let content = serde_json::to_string_pretty(&*cache)
            .map_err(|e| CadenceError::store(format!("failed to serialize instances: {}", e)))?;
        drop(cache);

        tokio::fs::write(&self.path, content).await.map_err(|e| {
            CadenceError::store(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }
}

#[async_trait]
impl InstanceStore for FileInstanceStore {
    async fn get(&self, id: Uuid) -> CadenceResult<Option<WorkflowInstance>> {
        Ok(self.cache.read().await.get(&id).cloned())
    }

    async fn find_for_entity(&self, entity: &EntityRef) -> CadenceResult<Vec<WorkflowInstance>> {
        Ok(self
            .cache
            .read()
            .await
            .values()
            .filter(|i| &i.entity == entity)
            .cloned()
            .collect())
    }

    async fn find_active(&self) -> CadenceResult<Vec<WorkflowInstance>> {
        Ok(self
            .cache
            .read()
            .await
            .values()
            .filter(|i| !i.is_terminal())
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> CadenceResult<Vec<WorkflowInstance>> {
        Ok(self.cache.read().await.values().cloned().collect())
    }

    async fn insert(&self, instance: WorkflowInstance) -> CadenceResult<()> {
        {
            let mut cache = self.cache.write().await;
            if cache.contains_key(&instance.id) {
                return Err(CadenceError::store(format!(
                    "instance {} already exists",
                    instance.id
                )));
            }
            cache.insert(instance.id, instance);
        }
        self.persist().await
    }

    async fn update(&self, instance: &mut WorkflowInstance) -> CadenceResult<()> {
        {
            let mut cache = self.cache.write().await;
            let stored = cache.get_mut(&instance.id).ok_or_else(|| {
                CadenceError::store(format!("instance {} not found", instance.id))
            })?;

            if stored.version != instance.version {
                return Err(CadenceError::Conflict(instance.id));
            }

            instance.version += 1;
            *stored = instance.clone();
        }
        self.persist().await
    }
}
