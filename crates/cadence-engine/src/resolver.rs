// Cadence Engine - Entity, role, and risk-appetite resolution
//
// The engine never owns governed records. Resolvers are the seam to the
// systems that do: each entity type registers a resolver able to produce
// read-only field snapshots. A missing resolver or a missing entity fails
// closed at the point of use.

use async_trait::async_trait;
use cadence_core::{CadenceError, CadenceResult, EntityRef, EntitySnapshot};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Produces read-only snapshots of governed business records
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Resolve an entity to its current field snapshot.
    ///
    /// `Ok(None)` means the entity does not exist; `Err` means the backing
    /// system could not be consulted at all.
    async fn resolve(&self, entity: &EntityRef) -> CadenceResult<Option<EntitySnapshot>>;
}

/// Dispatch table mapping entity types to their resolvers
#[derive(Default)]
pub struct EntityResolverRegistry {
    resolvers: HashMap<String, Arc<dyn EntityResolver>>,
}

impl EntityResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver for an entity type
    pub fn register(&mut self, entity_type: impl Into<String>, resolver: Arc<dyn EntityResolver>) {
        self.resolvers.insert(entity_type.into(), resolver);
    }

    pub fn supports(&self, entity_type: &str) -> bool {
        self.resolvers.contains_key(entity_type)
    }

    /// Entity types with a registered resolver
    pub fn entity_types(&self) -> Vec<&str> {
        self.resolvers.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve a snapshot, failing when no resolver covers the entity type
    /// or the entity itself is gone.
    pub async fn snapshot(&self, entity: &EntityRef) -> CadenceResult<EntitySnapshot> {
        let resolver = self.resolvers.get(&entity.entity_type).ok_or_else(|| {
            CadenceError::entity(format!(
                "no resolver registered for entity type '{}'",
                entity.entity_type
            ))
        })?;

        resolver
            .resolve(entity)
            .await?
            .ok_or_else(|| CadenceError::entity(format!("entity {} not found", entity)))
    }
}

/// Resolver backed by JSON files on disk: `<root>/<EntityType>/<id>.json`
///
/// Useful for file-based deployments and integration tests; production
/// deployments register resolvers against their systems of record.
pub struct FileEntityResolver {
    root: PathBuf,
}

impl FileEntityResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Enumerate the entities of one type present on disk
    pub fn list(&self, entity_type: &str) -> CadenceResult<Vec<EntityRef>> {
        let dir = self.root.join(entity_type);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut refs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    refs.push(EntityRef::new(entity_type, stem));
                }
            }
        }
        Ok(refs)
    }
}

#[async_trait]
impl EntityResolver for FileEntityResolver {
    async fn resolve(&self, entity: &EntityRef) -> CadenceResult<Option<EntitySnapshot>> {
        let path = self
            .root
            .join(&entity.entity_type)
            .join(format!("{}.json", entity.entity_id));

        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CadenceError::entity(format!("failed to read {}: {}", path.display(), e))
        })?;
        let snapshot: EntitySnapshot = serde_json::from_str(&content)
            .map_err(|e| CadenceError::entity(format!("bad entity file {}: {}", path.display(), e)))?;

        Ok(Some(snapshot))
    }
}

/// In-memory resolver for tests and embedding
#[derive(Default)]
pub struct MemoryEntityResolver {
    entities: dashmap::DashMap<String, EntitySnapshot>,
}

impl MemoryEntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity_id: impl Into<String>, snapshot: EntitySnapshot) {
        self.entities.insert(entity_id.into(), snapshot);
    }

    pub fn remove(&self, entity_id: &str) {
        self.entities.remove(entity_id);
    }
}

#[async_trait]
impl EntityResolver for MemoryEntityResolver {
    async fn resolve(&self, entity: &EntityRef) -> CadenceResult<Option<EntitySnapshot>> {
        Ok(self.entities.get(&entity.entity_id).map(|e| e.clone()))
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Maps approver/escalation roles to notifiable principals
#[async_trait]
pub trait RoleResolver: Send + Sync {
    /// Members of a role; an unknown role resolves to no members
    async fn members_of(&self, role: &str) -> CadenceResult<Vec<String>>;
}

/// Static role table, typically loaded from configuration
#[derive(Debug, Default)]
pub struct StaticRoleResolver {
    members: HashMap<String, Vec<String>>,
}

impl StaticRoleResolver {
    pub fn new(members: HashMap<String, Vec<String>>) -> Self {
        Self { members }
    }

    pub fn add_member(&mut self, role: impl Into<String>, member: impl Into<String>) {
        self.members.entry(role.into()).or_default().push(member.into());
    }
}

#[async_trait]
impl RoleResolver for StaticRoleResolver {
    async fn members_of(&self, role: &str) -> CadenceResult<Vec<String>> {
        Ok(self.members.get(role).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Risk appetite
// ============================================================================

/// Supplies the organization's maximum acceptable residual risk
#[async_trait]
pub trait RiskAppetiteProvider: Send + Sync {
    /// The appetite bound, optionally per risk category.
    ///
    /// `None` means no appetite is configured; risk conditions then fail
    /// closed and keep the step pending.
    async fn max_acceptable_risk(&self, category: Option<&str>) -> CadenceResult<Option<f64>>;
}

/// Fixed appetite bounds, with optional per-category overrides
#[derive(Debug, Default)]
pub struct StaticRiskAppetite {
    default: Option<f64>,
    per_category: HashMap<String, f64>,
}

impl StaticRiskAppetite {
    pub fn new(default: Option<f64>) -> Self {
        Self {
            default,
            per_category: HashMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>, bound: f64) -> Self {
        self.per_category.insert(category.into(), bound);
        self
    }
}

#[async_trait]
impl RiskAppetiteProvider for StaticRiskAppetite {
    async fn max_acceptable_risk(&self, category: Option<&str>) -> CadenceResult<Option<f64>> {
        if let Some(cat) = category {
            if let Some(bound) = self.per_category.get(cat) {
                return Ok(Some(*bound));
            }
        }
        Ok(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> EntitySnapshot {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_entity_type() {
        let breaches = MemoryEntityResolver::new();
        breaches.insert("42", snapshot(json!({"severity": "high"})));

        let mut registry = EntityResolverRegistry::new();
        registry.register("DataBreach", Arc::new(breaches));

        let snap = registry
            .snapshot(&EntityRef::new("DataBreach", "42"))
            .await
            .unwrap();
        assert_eq!(snap.get_str("severity"), Some("high"));

        // No resolver for this type
        let err = registry
            .snapshot(&EntityRef::new("Risk", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::Entity(_)));

        // Resolver exists, entity does not
        let err = registry
            .snapshot(&EntityRef::new("DataBreach", "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::Entity(_)));
    }

    #[tokio::test]
    async fn test_file_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let breach_dir = dir.path().join("DataBreach");
        std::fs::create_dir_all(&breach_dir).unwrap();
        std::fs::write(
            breach_dir.join("7.json"),
            r#"{"severity": "critical", "affectedCount": 900}"#,
        )
        .unwrap();

        let resolver = FileEntityResolver::new(dir.path());
        let snap = resolver
            .resolve(&EntityRef::new("DataBreach", "7"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snap.get_number("affectedCount"), Some(900.0));

        let missing = resolver
            .resolve(&EntityRef::new("DataBreach", "8"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_static_roles_and_appetite() {
        let mut roles = StaticRoleResolver::default();
        roles.add_member("ROLE_DPO", "dpo@example.org");
        roles.add_member("ROLE_DPO", "deputy-dpo@example.org");

        assert_eq!(roles.members_of("ROLE_DPO").await.unwrap().len(), 2);
        assert!(roles.members_of("ROLE_UNKNOWN").await.unwrap().is_empty());

        let appetite = StaticRiskAppetite::new(Some(12.0)).with_category("operational", 8.0);
        assert_eq!(
            appetite.max_acceptable_risk(None).await.unwrap(),
            Some(12.0)
        );
        assert_eq!(
            appetite
                .max_acceptable_risk(Some("operational"))
                .await
                .unwrap(),
            Some(8.0)
        );
        assert_eq!(
            appetite.max_acceptable_risk(Some("strategic")).await.unwrap(),
            Some(12.0)
        );
    }
}
