use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use canteen_core::UserId;

use crate::{AuditRecord, Event, Notification};

/// Envelope for a message leaving the engine.
///
/// `sequence_number` is the version of the document the message was derived
/// from, so consumers can discard duplicates of the same write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    entity_type: String,
    entity_id: String,
    sequence_number: u64,
    actor: Option<UserId>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
        sequence_number: u64,
        actor: Option<UserId>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            sequence_number,
            actor,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

/// Everything the engine hands to its sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    Audit(AuditRecord),
    Notification(Notification),
}

impl Event for EngineEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::Audit(_) => "audit.record",
            EngineEvent::Notification(n) => n.event_type(),
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::Audit(a) => a.recorded_at,
            EngineEvent::Notification(n) => n.occurred_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canteen_core::ItemId;
    use rust_decimal::Decimal;

    #[test]
    fn wire_shape_carries_both_tags() {
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            "inventory_item",
            "item-1",
            3,
            None,
            EngineEvent::Notification(Notification::LowStock {
                item_id: ItemId::new(),
                item_code: "RICE".to_string(),
                current_stock: Decimal::from(4),
                reorder_level: Decimal::from(5),
                occurred_at: Utc::now(),
            }),
        );

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["sequence_number"], 3);
        assert_eq!(json["payload"]["kind"], "notification");
        assert_eq!(json["payload"]["type"], "low_stock");
        assert_eq!(json["payload"]["item_code"], "RICE");

        let back: EventEnvelope<EngineEvent> = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.payload().event_type(), "inventory.item.low_stock");
    }
}
