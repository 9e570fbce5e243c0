//! Domain events, audit facts and notifications, plus the bus that carries
//! them to out-of-engine collaborators.

pub mod audit;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use audit::{AuditRecord, FieldChange};
pub use bus::{EventBus, Subscription};
pub use envelope::{EngineEvent, EventEnvelope};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::Notification;
