//! Store and service error types.

use rust_decimal::Decimal;
use thiserror::Error;

use canteen_core::DomainError;

/// Failure at the document store boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("duplicate document: {0}")]
    Duplicate(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Error returned by every engine service call.
///
/// Nothing is retried inside the engine; a failed call leaves every owned
/// document as it was, except where a variant says otherwise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
    },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("duplicate adjustment: {0}")]
    DuplicateAdjustment(String),

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("store failure: {0}")]
    Store(StoreError),

    /// The write is committed; only the audit/notification fan-out failed.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => EngineError::InsufficientStock {
                available,
                requested,
            },
            DomainError::InvalidTransition { from, to } => EngineError::InvalidTransition { from, to },
            DomainError::DuplicateAdjustment(msg) => EngineError::DuplicateAdjustment(msg),
            DomainError::Conflict(msg) => EngineError::ConcurrencyConflict(msg),
            DomainError::NotFound(msg) => EngineError::NotFound(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => EngineError::ConcurrencyConflict(msg),
            StoreError::NotFound(msg) => EngineError::NotFound(msg),
            other => EngineError::Store(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn domain_errors_keep_their_category() {
        let err: EngineError = DomainError::insufficient_stock(dec!(150), dec!(200)).into();
        assert_eq!(
            err,
            EngineError::InsufficientStock {
                available: dec!(150),
                requested: dec!(200)
            }
        );

        let err: EngineError = DomainError::conflict("stale").into();
        assert!(matches!(err, EngineError::ConcurrencyConflict(_)));
    }

    #[test]
    fn store_errors_map_onto_engine_errors() {
        assert!(matches!(
            EngineError::from(StoreError::Concurrency("v3".into())),
            EngineError::ConcurrencyConflict(_)
        ));
        assert!(matches!(
            EngineError::from(StoreError::NotFound("item".into())),
            EngineError::NotFound(_)
        ));
        assert_eq!(
            EngineError::from(StoreError::Poisoned),
            EngineError::Store(StoreError::Poisoned)
        );
    }
}
