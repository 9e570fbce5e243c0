//! Inventory domain: stock arithmetic, the movement audit trail and
//! physical-count reconciliation.
//!
//! Pure, deterministic domain logic (no IO, no storage). The infra crate
//! loads these aggregates, runs commands against them and writes them back
//! with a compare-and-swap.

pub mod decimal;
pub mod item;
pub mod movement;
pub mod reconciliation;

pub use decimal::{DEFAULT_COST_SCALE, round_money};
pub use item::{
    ApplyMovement, ChangeReorderLevel, CreateItem, InventoryCommand, InventoryEvent,
    InventoryItem, ItemCreated, ItemDeleted, MovementApplied, ReorderLevelChanged, SoftDeleteItem,
    StockSnapshot,
};
pub use movement::{Direction, ItemSnapshot, MovementStatus, MovementType, StockMovement};
pub use reconciliation::{
    AdjustmentRef, Reconciliation, ReconciliationCommand, ReconciliationEvent,
    ReconciliationStatus, StatusChange, discrepancy_of,
};
