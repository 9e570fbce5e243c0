//! `canteen-core`: domain foundation building blocks.
//!
//! Pure domain primitives shared by the inventory, eligibility and sequence
//! crates (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{
    DepartmentId, EmployeeId, ItemId, MealSessionId, MovementId, ReconciliationId, RuleId,
    ShiftId, UserId,
};
pub use value_object::ValueObject;
