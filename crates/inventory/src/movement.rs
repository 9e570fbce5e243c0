use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use canteen_core::{DomainError, DomainResult, ItemId, MovementId, ReconciliationId, UserId, ValueObject};

/// Kind of stock movement. The quantity is always stored as a positive
/// magnitude; the type (and for adjustments, an explicit direction) decides
/// the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
    Transfer,
    Return,
}

impl MovementType {
    /// Direction implied by the type, `None` for adjustments.
    ///
    /// Transfers are modelled as transfer-out of the source item; the
    /// receiving side books its own IN.
    pub fn fixed_direction(self) -> Option<Direction> {
        match self {
            MovementType::In | MovementType::Return => Some(Direction::Increase),
            MovementType::Out | MovementType::Transfer => Some(Direction::Decrease),
            MovementType::Adjustment => None,
        }
    }

    /// Combine the type's own direction with an optional caller-supplied one.
    pub fn resolve_direction(self, requested: Option<Direction>) -> DomainResult<Direction> {
        match (self.fixed_direction(), requested) {
            (Some(fixed), None) => Ok(fixed),
            (Some(fixed), Some(req)) if fixed == req => Ok(fixed),
            (Some(fixed), Some(req)) => Err(DomainError::validation(format!(
                "{self} movements always {fixed}, cannot {req}"
            ))),
            (None, Some(req)) => Ok(req),
            (None, None) => Err(DomainError::validation(
                "adjustment movements require an explicit direction",
            )),
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Transfer => "TRANSFER",
            MovementType::Return => "RETURN",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    /// Signed delta for a positive magnitude.
    pub fn signed(self, quantity: Decimal) -> Decimal {
        match self {
            Direction::Increase => quantity,
            Direction::Decrease => -quantity,
        }
    }

    /// Direction that moves stock by `delta`; `None` for zero.
    pub fn of_delta(delta: Decimal) -> Option<Self> {
        if delta > Decimal::ZERO {
            Some(Direction::Increase)
        } else if delta < Decimal::ZERO {
            Some(Direction::Decrease)
        } else {
            None
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementStatus {
    Pending,
    Completed,
    Rejected,
}

impl core::fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            MovementStatus::Pending => "PENDING",
            MovementStatus::Completed => "COMPLETED",
            MovementStatus::Rejected => "REJECTED",
        })
    }
}

/// Item identity copied onto records at creation time and never re-synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    pub code: String,
    pub name: String,
    pub unit: String,
}

impl ValueObject for ItemSnapshot {}

/// One recorded change to an item's stock.
///
/// Once COMPLETED the quantities, the item and the stock snapshots are
/// frozen; only `notes` can still be edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    id: MovementId,
    reference: String,
    item: ItemSnapshot,
    movement_type: MovementType,
    direction: Direction,
    quantity: Decimal,
    cost_per_unit: Option<Decimal>,
    stock_before: Option<Decimal>,
    stock_after: Option<Decimal>,
    total_cost: Option<Decimal>,
    status: MovementStatus,
    rejection_reason: Option<String>,
    notes: Option<String>,
    reconciliation_id: Option<ReconciliationId>,
    created_by: Option<UserId>,
    transaction_date: DateTime<Utc>,
}

impl StockMovement {
    /// Build a PENDING movement after validating the request.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: MovementId,
        reference: impl Into<String>,
        item: ItemSnapshot,
        movement_type: MovementType,
        direction: Option<Direction>,
        quantity: Decimal,
        cost_per_unit: Option<Decimal>,
        notes: Option<String>,
        created_by: Option<UserId>,
        transaction_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let direction = Self::validate_request(movement_type, direction, quantity, cost_per_unit)?;
        Ok(Self {
            id,
            reference: reference.into(),
            item,
            movement_type,
            direction,
            quantity,
            cost_per_unit,
            stock_before: None,
            stock_after: None,
            total_cost: None,
            status: MovementStatus::Pending,
            rejection_reason: None,
            notes,
            reconciliation_id: None,
            created_by,
            transaction_date,
        })
    }

    /// Input checks shared by every movement entry point. Returns the
    /// effective direction.
    pub fn validate_request(
        movement_type: MovementType,
        direction: Option<Direction>,
        quantity: Decimal,
        cost_per_unit: Option<Decimal>,
    ) -> DomainResult<Direction> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cost_per_unit.is_some_and(|c| c < Decimal::ZERO) {
            return Err(DomainError::validation("cost per unit cannot be negative"));
        }
        movement_type.resolve_direction(direction)
    }

    /// Link the movement to the reconciliation that caused it.
    pub fn for_reconciliation(mut self, reconciliation_id: ReconciliationId) -> Self {
        self.reconciliation_id = Some(reconciliation_id);
        self
    }

    pub fn id(&self) -> MovementId {
        self.id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn item(&self) -> &ItemSnapshot {
        &self.item
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn cost_per_unit(&self) -> Option<Decimal> {
        self.cost_per_unit
    }

    pub fn stock_before(&self) -> Option<Decimal> {
        self.stock_before
    }

    pub fn stock_after(&self) -> Option<Decimal> {
        self.stock_after
    }

    pub fn total_cost(&self) -> Option<Decimal> {
        self.total_cost
    }

    pub fn status(&self) -> MovementStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn reconciliation_id(&self) -> Option<ReconciliationId> {
        self.reconciliation_id
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn transaction_date(&self) -> DateTime<Utc> {
        self.transaction_date
    }

    /// Signed effect on the item's stock.
    pub fn signed_quantity(&self) -> Decimal {
        self.direction.signed(self.quantity)
    }

    fn ensure_pending(&self, target: MovementStatus) -> DomainResult<()> {
        if self.status != MovementStatus::Pending {
            return Err(DomainError::invalid_transition(self.status, target));
        }
        Ok(())
    }

    /// PENDING -> COMPLETED, capturing the ledger's before/after snapshot.
    pub fn complete(
        &mut self,
        stock_before: Decimal,
        stock_after: Decimal,
        total_cost: Decimal,
    ) -> DomainResult<()> {
        self.ensure_pending(MovementStatus::Completed)?;
        if stock_after - stock_before != self.signed_quantity() {
            return Err(DomainError::invariant(format!(
                "movement {} expects delta {}, ledger moved {} -> {}",
                self.reference,
                self.signed_quantity(),
                stock_before,
                stock_after
            )));
        }
        self.stock_before = Some(stock_before);
        self.stock_after = Some(stock_after);
        self.total_cost = Some(total_cost);
        self.status = MovementStatus::Completed;
        Ok(())
    }

    /// PENDING -> REJECTED.
    pub fn reject(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.ensure_pending(MovementStatus::Rejected)?;
        self.status = MovementStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    /// Notes stay editable in every status.
    pub fn edit_notes(&mut self, notes: Option<String>) {
        self.notes = notes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> ItemSnapshot {
        ItemSnapshot {
            item_id: ItemId::new(),
            code: "RICE-01".to_string(),
            name: "Basmati rice".to_string(),
            unit: "kg".to_string(),
        }
    }

    fn pending(movement_type: MovementType, direction: Option<Direction>) -> DomainResult<StockMovement> {
        StockMovement::pending(
            MovementId::new(),
            "SM-000001",
            snapshot(),
            movement_type,
            direction,
            dec!(5),
            None,
            None,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn type_decides_direction() {
        assert_eq!(pending(MovementType::In, None).unwrap().direction(), Direction::Increase);
        assert_eq!(pending(MovementType::Return, None).unwrap().direction(), Direction::Increase);
        assert_eq!(pending(MovementType::Out, None).unwrap().direction(), Direction::Decrease);
        assert_eq!(
            pending(MovementType::Transfer, None).unwrap().direction(),
            Direction::Decrease
        );
    }

    #[test]
    fn adjustment_needs_explicit_direction() {
        assert!(matches!(
            pending(MovementType::Adjustment, None),
            Err(DomainError::Validation(_))
        ));
        let m = pending(MovementType::Adjustment, Some(Direction::Decrease)).unwrap();
        assert_eq!(m.signed_quantity(), dec!(-5));
    }

    #[test]
    fn conflicting_direction_is_rejected() {
        assert!(matches!(
            pending(MovementType::Out, Some(Direction::Increase)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let err = StockMovement::validate_request(MovementType::In, None, dec!(0), None).unwrap_err();
        assert_eq!(err, DomainError::validation("quantity must be positive"));
    }

    #[test]
    fn completed_movement_is_frozen_except_notes() {
        let mut m = pending(MovementType::In, None).unwrap();
        m.complete(dec!(10), dec!(15), dec!(50)).unwrap();
        assert_eq!(m.status(), MovementStatus::Completed);

        assert!(matches!(m.reject("late"), Err(DomainError::InvalidTransition { .. })));
        assert!(matches!(
            m.complete(dec!(15), dec!(20), dec!(50)),
            Err(DomainError::InvalidTransition { .. })
        ));

        m.edit_notes(Some("delivered by vendor".to_string()));
        assert_eq!(m.notes(), Some("delivered by vendor"));
        assert_eq!(m.stock_after(), Some(dec!(15)));
    }

    #[test]
    fn completion_must_match_signed_quantity() {
        let mut m = pending(MovementType::Out, None).unwrap();
        assert!(matches!(
            m.complete(dec!(10), dec!(15), dec!(0)),
            Err(DomainError::InvariantViolation(_))
        ));
        assert_eq!(m.status(), MovementStatus::Pending);
    }
}
