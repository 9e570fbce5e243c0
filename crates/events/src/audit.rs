//! "What changed" facts emitted for every mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use canteen_core::UserId;

/// One changed field. `old_value` is `None` for freshly created records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old: impl ToString, new: impl ToString) -> Self {
        Self {
            field: field.into(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
        }
    }

    pub fn created(field: impl Into<String>, new: impl ToString) -> Self {
        Self {
            field: field.into(),
            old_value: None,
            new_value: Some(new.to_string()),
        }
    }

    /// Returns `None` when the value did not change.
    pub fn diff<T: PartialEq + ToString>(field: &str, old: &T, new: &T) -> Option<Self> {
        (old != new).then(|| Self::new(field, old.to_string(), new.to_string()))
    }
}

/// Audit record for one mutation of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entity_type: String,
    pub entity_id: String,
    /// Short verb, e.g. "movement_applied", "status_changed".
    pub action: String,
    pub actor: Option<UserId>,
    pub changes: Vec<FieldChange>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl ToString,
        action: impl Into<String>,
        actor: Option<UserId>,
        changes: Vec<FieldChange>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            action: action.into(),
            actor,
            changes,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_skips_unchanged_values() {
        assert!(FieldChange::diff("status", &"DRAFT", &"DRAFT").is_none());

        let change = FieldChange::diff("status", &"DRAFT", &"SUBMITTED").unwrap();
        assert_eq!(change.old_value.as_deref(), Some("DRAFT"));
        assert_eq!(change.new_value.as_deref(), Some("SUBMITTED"));
    }
}
