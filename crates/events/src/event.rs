use chrono::{DateTime, Utc};

/// Something the engine did, named so audit and notification consumers can
/// route on it without knowing the aggregate that produced it.
///
/// Aggregate events and outbound notifications both implement this. Once
/// emitted a value is never edited; a payload change bumps `version`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted routing key, e.g. `inventory.item.low_stock`.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Time of the write that produced the event, not of delivery.
    fn occurred_at(&self) -> DateTime<Utc>;
}
