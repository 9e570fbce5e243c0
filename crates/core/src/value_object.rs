//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. Snapshots embedded in
/// records at creation time (for example the item code/name copied onto a
/// stock movement) are value objects: they are never re-synced with the
/// entity they were taken from.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
