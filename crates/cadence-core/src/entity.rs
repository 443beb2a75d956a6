// Cadence Core - Governed business entities
//
// The engine never owns the business records it governs. It holds an
// (entity_type, entity_id) reference pair and works against read-only
// field snapshots supplied by an external resolver.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Reference to a governed business record, owned externally
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind, e.g. "DataBreach", "Incident", "Risk"
    #[serde(rename = "entityType")]
    pub entity_type: String,

    /// Identifier within that kind
    #[serde(rename = "entityId")]
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Read-only snapshot of a governed entity's fields at evaluation time
///
/// Condition evaluation only ever reads from a snapshot; the engine never
/// mutates the governed record itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySnapshot {
    #[serde(flatten)]
    fields: HashMap<String, Value>,
}

impl EntitySnapshot {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self { fields }
    }

    /// Get a raw field value, if the field exists
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether the field exists on the snapshot (even if null)
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Whether a field is filled: present and not null, "" or []
    pub fn is_filled(&self, field: &str) -> bool {
        match self.fields.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        }
    }

    /// Numeric view of a field, accepting JSON numbers and numeric strings
    pub fn get_number(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// String view of a field
    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Timestamp view of a field (RFC 3339 string)
    pub fn get_datetime(&self, field: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.get_str(field)?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for EntitySnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> EntitySnapshot {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_is_filled() {
        let snap = snapshot(json!({
            "severity": "high",
            "rootCause": "",
            "dataCategories": [],
            "affectedSystems": ["crm"],
            "resolvedAt": null,
            "affectedCount": 0
        }));

        assert!(snap.is_filled("severity"));
        assert!(snap.is_filled("affectedSystems"));
        // Zero is a value; it counts as filled
        assert!(snap.is_filled("affectedCount"));

        assert!(!snap.is_filled("rootCause"));
        assert!(!snap.is_filled("dataCategories"));
        assert!(!snap.is_filled("resolvedAt"));
        assert!(!snap.is_filled("missing"));
    }

    #[test]
    fn test_numeric_view_accepts_strings() {
        let snap = snapshot(json!({"residualRisk": "12.5", "score": 7}));
        assert_eq!(snap.get_number("residualRisk"), Some(12.5));
        assert_eq!(snap.get_number("score"), Some(7.0));
        assert_eq!(snap.get_number("missing"), None);
    }

    #[test]
    fn test_datetime_view() {
        let snap = snapshot(json!({"detectedAt": "2025-03-01T10:00:00Z", "bad": "yesterday"}));
        assert!(snap.get_datetime("detectedAt").is_some());
        assert!(snap.get_datetime("bad").is_none());
    }
}
