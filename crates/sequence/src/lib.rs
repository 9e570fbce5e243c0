//! Per-entity-type document numbering (bill numbers, PO numbers, ...).

pub mod sequence;

pub use sequence::{DEFAULT_FORMAT, EntityType, NumberSequence, SequenceSettings};
