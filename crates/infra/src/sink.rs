//! Fan-out of audit records and notifications after a committed write.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use canteen_core::UserId;
use canteen_events::{AuditRecord, EngineEvent, EventBus, EventEnvelope, FieldChange, Notification};

use crate::error::EngineError;

pub type EngineEnvelope = EventEnvelope<EngineEvent>;

/// Entity type names used on envelopes and audit records.
pub mod entity {
    pub const INVENTORY_ITEM: &str = "inventory_item";
    pub const STOCK_MOVEMENT: &str = "stock_movement";
    pub const RECONCILIATION: &str = "reconciliation";
    pub const NUMBER_SEQUENCE: &str = "number_sequence";
}

/// Messages produced by one committed write, all tagged with the document
/// version that write produced.
#[derive(Debug)]
pub(crate) struct Outbox {
    entity_type: &'static str,
    entity_id: String,
    version: u64,
    actor: Option<UserId>,
    messages: Vec<EngineEnvelope>,
}

impl Outbox {
    pub(crate) fn new(
        entity_type: &'static str,
        entity_id: impl ToString,
        version: u64,
        actor: Option<UserId>,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.to_string(),
            version,
            actor,
            messages: Vec::new(),
        }
    }

    /// Skipped when nothing changed.
    pub(crate) fn audit(
        mut self,
        action: &str,
        changes: Vec<FieldChange>,
        at: DateTime<Utc>,
    ) -> Self {
        if changes.is_empty() {
            return self;
        }
        let record = AuditRecord::new(
            self.entity_type,
            &self.entity_id,
            action,
            self.actor,
            changes,
            at,
        );
        self.push(EngineEvent::Audit(record));
        self
    }

    pub(crate) fn notify(mut self, notification: Notification) -> Self {
        self.push(EngineEvent::Notification(notification));
        self
    }

    fn push(&mut self, payload: EngineEvent) {
        self.messages.push(EventEnvelope::new(
            Uuid::now_v7(),
            self.entity_type,
            &self.entity_id,
            self.version,
            self.actor,
            payload,
        ));
    }

    /// Publish in order; stops at the first bus failure.
    pub(crate) fn publish<B>(self, bus: &B) -> Result<(), EngineError>
    where
        B: EventBus<EngineEnvelope> + ?Sized,
    {
        for message in self.messages {
            bus.publish(message)
                .map_err(|e| EngineError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}
