//! Physical-count reconciliation.
//!
//! Lifecycle: `DRAFT → SUBMITTED → VERIFIED → {APPROVED | REJECTED}` and
//! `APPROVED → COMPLETED` once the corrective movement is booked. Counts and
//! the derived discrepancy are frozen as soon as the record leaves DRAFT.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use canteen_core::{Aggregate, AggregateRoot, DomainError, MovementId, ReconciliationId, UserId};
use canteen_events::Event;

use crate::decimal::round_money;
use crate::movement::ItemSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Draft,
    Submitted,
    Verified,
    Approved,
    Rejected,
    Completed,
}

impl ReconciliationStatus {
    pub const ALL: [ReconciliationStatus; 6] = [
        ReconciliationStatus::Draft,
        ReconciliationStatus::Submitted,
        ReconciliationStatus::Verified,
        ReconciliationStatus::Approved,
        ReconciliationStatus::Rejected,
        ReconciliationStatus::Completed,
    ];

    /// The only legal edges of the state machine.
    pub fn can_transition_to(self, target: ReconciliationStatus) -> bool {
        use ReconciliationStatus::*;
        matches!(
            (self, target),
            (Draft, Submitted)
                | (Submitted, Verified)
                | (Verified, Approved)
                | (Verified, Rejected)
                | (Approved, Completed)
        )
    }

    pub fn is_deletable(self) -> bool {
        matches!(self, ReconciliationStatus::Draft | ReconciliationStatus::Rejected)
    }
}

impl core::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ReconciliationStatus::Draft => "DRAFT",
            ReconciliationStatus::Submitted => "SUBMITTED",
            ReconciliationStatus::Verified => "VERIFIED",
            ReconciliationStatus::Approved => "APPROVED",
            ReconciliationStatus::Rejected => "REJECTED",
            ReconciliationStatus::Completed => "COMPLETED",
        })
    }
}

/// `(physical - system, percentage of system)`.
///
/// The percentage is 0 when both counts are zero and 100 when stock appears
/// from nothing; otherwise it is rounded to two places.
pub fn discrepancy_of(system_stock: Decimal, physical_stock: Decimal) -> (Decimal, Decimal) {
    let discrepancy = physical_stock - system_stock;
    let percentage = if system_stock.is_zero() {
        if physical_stock.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE_HUNDRED
        }
    } else {
        round_money(discrepancy / system_stock * Decimal::ONE_HUNDRED, 2)
    };
    (discrepancy, percentage)
}

/// Pointer to the corrective movement booked for a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRef {
    pub movement_id: MovementId,
    pub reference: String,
    /// Live system stock the adjustment was computed against.
    pub system_stock_at_adjustment: Decimal,
    /// Signed correction that was booked.
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ReconciliationStatus,
    pub to: ReconciliationStatus,
    pub actor: Option<UserId>,
    pub at: DateTime<Utc>,
}

/// Aggregate root: Reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    id: ReconciliationId,
    item: Option<ItemSnapshot>,
    system_stock: Decimal,
    physical_stock: Decimal,
    discrepancy: Decimal,
    discrepancy_percentage: Decimal,
    status: ReconciliationStatus,
    auto_adjust: bool,
    adjustment: Option<AdjustmentRef>,
    adjustment_completed: bool,
    notes: Option<String>,
    created_by: Option<UserId>,
    history: Vec<StatusChange>,
    is_deleted: bool,
    version: u64,
    created: bool,
}

impl Reconciliation {
    pub fn empty(id: ReconciliationId) -> Self {
        Self {
            id,
            item: None,
            system_stock: Decimal::ZERO,
            physical_stock: Decimal::ZERO,
            discrepancy: Decimal::ZERO,
            discrepancy_percentage: Decimal::ZERO,
            status: ReconciliationStatus::Draft,
            auto_adjust: false,
            adjustment: None,
            adjustment_completed: false,
            notes: None,
            created_by: None,
            history: Vec::new(),
            is_deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReconciliationId {
        self.id
    }

    pub fn item(&self) -> Option<&ItemSnapshot> {
        self.item.as_ref()
    }

    pub fn system_stock(&self) -> Decimal {
        self.system_stock
    }

    pub fn physical_stock(&self) -> Decimal {
        self.physical_stock
    }

    pub fn discrepancy(&self) -> Decimal {
        self.discrepancy
    }

    pub fn discrepancy_percentage(&self) -> Decimal {
        self.discrepancy_percentage
    }

    pub fn status(&self) -> ReconciliationStatus {
        self.status
    }

    pub fn auto_adjust(&self) -> bool {
        self.auto_adjust
    }

    pub fn adjustment(&self) -> Option<&AdjustmentRef> {
        self.adjustment.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// `|discrepancy%| > threshold`. Used for the non-blocking warning.
    pub fn is_high_discrepancy(&self, threshold_pct: Decimal) -> bool {
        self.discrepancy_percentage.abs() > threshold_pct
    }
}

impl AggregateRoot for Reconciliation {
    type Id = ReconciliationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationCommand {
    Create {
        reconciliation_id: ReconciliationId,
        item: ItemSnapshot,
        system_stock: Decimal,
        physical_stock: Decimal,
        notes: Option<String>,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    UpdatePhysicalStock {
        physical_stock: Decimal,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    Transition {
        target: ReconciliationStatus,
        /// Only meaningful together with `target = SUBMITTED`.
        auto_adjust: bool,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    /// Reserve the single adjustment slot before stock is touched.
    ClaimAdjustment {
        adjustment: AdjustmentRef,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    /// The claimed movement was booked; collapse APPROVED → COMPLETED.
    CompleteAdjustment {
        movement_id: MovementId,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    /// Close an approved record whose count already matches live stock
    /// (other movements closed the gap since the count was taken).
    CloseBalanced {
        live_system_stock: Decimal,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    /// The claimed movement failed; free the slot again.
    ReleaseAdjustment {
        movement_id: MovementId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Delete {
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationEvent {
    Created {
        reconciliation_id: ReconciliationId,
        item: ItemSnapshot,
        system_stock: Decimal,
        physical_stock: Decimal,
        discrepancy: Decimal,
        discrepancy_percentage: Decimal,
        notes: Option<String>,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    PhysicalStockUpdated {
        physical_stock: Decimal,
        discrepancy: Decimal,
        discrepancy_percentage: Decimal,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        change: StatusChange,
        auto_adjust: bool,
    },
    AdjustmentClaimed {
        adjustment: AdjustmentRef,
        occurred_at: DateTime<Utc>,
    },
    AdjustmentReleased {
        movement_id: MovementId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ReconciliationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReconciliationEvent::Created { .. } => "inventory.reconciliation.created",
            ReconciliationEvent::PhysicalStockUpdated { .. } => {
                "inventory.reconciliation.physical_stock_updated"
            }
            ReconciliationEvent::StatusChanged { .. } => "inventory.reconciliation.status_changed",
            ReconciliationEvent::AdjustmentClaimed { .. } => {
                "inventory.reconciliation.adjustment_claimed"
            }
            ReconciliationEvent::AdjustmentReleased { .. } => {
                "inventory.reconciliation.adjustment_released"
            }
            ReconciliationEvent::Deleted { .. } => "inventory.reconciliation.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReconciliationEvent::Created { occurred_at, .. }
            | ReconciliationEvent::PhysicalStockUpdated { occurred_at, .. }
            | ReconciliationEvent::AdjustmentClaimed { occurred_at, .. }
            | ReconciliationEvent::AdjustmentReleased { occurred_at, .. }
            | ReconciliationEvent::Deleted { occurred_at } => *occurred_at,
            ReconciliationEvent::StatusChanged { change, .. } => change.at,
        }
    }
}

impl Aggregate for Reconciliation {
    type Command = ReconciliationCommand;
    type Event = ReconciliationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReconciliationEvent::Created {
                reconciliation_id,
                item,
                system_stock,
                physical_stock,
                discrepancy,
                discrepancy_percentage,
                notes,
                actor,
                ..
            } => {
                self.id = *reconciliation_id;
                self.item = Some(item.clone());
                self.system_stock = *system_stock;
                self.physical_stock = *physical_stock;
                self.discrepancy = *discrepancy;
                self.discrepancy_percentage = *discrepancy_percentage;
                self.notes = notes.clone();
                self.created_by = *actor;
                self.status = ReconciliationStatus::Draft;
                self.created = true;
            }
            ReconciliationEvent::PhysicalStockUpdated {
                physical_stock,
                discrepancy,
                discrepancy_percentage,
                ..
            } => {
                self.physical_stock = *physical_stock;
                self.discrepancy = *discrepancy;
                self.discrepancy_percentage = *discrepancy_percentage;
            }
            ReconciliationEvent::StatusChanged {
                change,
                auto_adjust,
            } => {
                self.status = change.to;
                if change.to == ReconciliationStatus::Submitted {
                    self.auto_adjust = *auto_adjust;
                }
                if change.to == ReconciliationStatus::Completed && self.adjustment.is_some() {
                    self.adjustment_completed = true;
                }
                self.history.push(change.clone());
            }
            ReconciliationEvent::AdjustmentClaimed { adjustment, .. } => {
                self.adjustment = Some(adjustment.clone());
            }
            ReconciliationEvent::AdjustmentReleased { .. } => {
                self.adjustment = None;
            }
            ReconciliationEvent::Deleted { .. } => {
                self.is_deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReconciliationCommand::Create {
                reconciliation_id,
                item,
                system_stock,
                physical_stock,
                notes,
                actor,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("reconciliation already exists"));
                }
                if *system_stock < Decimal::ZERO {
                    return Err(DomainError::invariant("system stock cannot be negative"));
                }
                if *physical_stock < Decimal::ZERO {
                    return Err(DomainError::validation("physical stock cannot be negative"));
                }
                let (discrepancy, discrepancy_percentage) =
                    discrepancy_of(*system_stock, *physical_stock);
                Ok(vec![ReconciliationEvent::Created {
                    reconciliation_id: *reconciliation_id,
                    item: item.clone(),
                    system_stock: *system_stock,
                    physical_stock: *physical_stock,
                    discrepancy,
                    discrepancy_percentage,
                    notes: notes.clone(),
                    actor: *actor,
                    occurred_at: *occurred_at,
                }])
            }
            ReconciliationCommand::UpdatePhysicalStock {
                physical_stock,
                occurred_at,
                ..
            } => {
                self.ensure_live()?;
                if self.status != ReconciliationStatus::Draft {
                    return Err(DomainError::invariant(
                        "counts are frozen once a reconciliation leaves DRAFT",
                    ));
                }
                if *physical_stock < Decimal::ZERO {
                    return Err(DomainError::validation("physical stock cannot be negative"));
                }
                let (discrepancy, discrepancy_percentage) =
                    discrepancy_of(self.system_stock, *physical_stock);
                Ok(vec![ReconciliationEvent::PhysicalStockUpdated {
                    physical_stock: *physical_stock,
                    discrepancy,
                    discrepancy_percentage,
                    occurred_at: *occurred_at,
                }])
            }
            ReconciliationCommand::Transition {
                target,
                auto_adjust,
                actor,
                occurred_at,
            } => self.handle_transition(*target, *auto_adjust, *actor, *occurred_at),
            ReconciliationCommand::ClaimAdjustment {
                adjustment,
                occurred_at,
                ..
            } => {
                self.ensure_adjustable()?;
                if adjustment.quantity.is_zero() {
                    return Err(DomainError::validation("no discrepancy left to adjust"));
                }
                Ok(vec![ReconciliationEvent::AdjustmentClaimed {
                    adjustment: adjustment.clone(),
                    occurred_at: *occurred_at,
                }])
            }
            ReconciliationCommand::CompleteAdjustment {
                movement_id,
                actor,
                occurred_at,
            } => {
                self.ensure_claimed_by(*movement_id)?;
                Ok(vec![ReconciliationEvent::StatusChanged {
                    change: StatusChange {
                        from: self.status,
                        to: ReconciliationStatus::Completed,
                        actor: *actor,
                        at: *occurred_at,
                    },
                    auto_adjust: self.auto_adjust,
                }])
            }
            ReconciliationCommand::CloseBalanced {
                live_system_stock,
                actor,
                occurred_at,
            } => {
                self.ensure_live()?;
                if self.status != ReconciliationStatus::Approved {
                    return Err(DomainError::invalid_transition(
                        self.status,
                        ReconciliationStatus::Completed,
                    ));
                }
                if self.adjustment.is_some() {
                    return Err(DomainError::conflict(
                        "an adjustment is in flight for this reconciliation",
                    ));
                }
                if self.physical_stock != *live_system_stock {
                    return Err(DomainError::validation(format!(
                        "live stock {} still differs from the counted {}",
                        live_system_stock, self.physical_stock
                    )));
                }
                Ok(vec![ReconciliationEvent::StatusChanged {
                    change: StatusChange {
                        from: self.status,
                        to: ReconciliationStatus::Completed,
                        actor: *actor,
                        at: *occurred_at,
                    },
                    auto_adjust: self.auto_adjust,
                }])
            }
            ReconciliationCommand::ReleaseAdjustment {
                movement_id,
                reason,
                occurred_at,
            } => {
                self.ensure_claimed_by(*movement_id)?;
                Ok(vec![ReconciliationEvent::AdjustmentReleased {
                    movement_id: *movement_id,
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                }])
            }
            ReconciliationCommand::Delete { occurred_at, .. } => {
                self.ensure_live()?;
                if !self.status.is_deletable() {
                    return Err(DomainError::invalid_transition(self.status, "DELETED"));
                }
                Ok(vec![ReconciliationEvent::Deleted {
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

impl Reconciliation {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.is_deleted {
            return Err(DomainError::not_found(format!("reconciliation {}", self.id)));
        }
        Ok(())
    }

    /// Guard for booking a corrective movement. The duplicate check comes
    /// first so a second call after completion reports the duplicate rather
    /// than the status.
    pub fn ensure_adjustable(&self) -> Result<(), DomainError> {
        self.ensure_live()?;
        if let Some(adj) = &self.adjustment {
            return Err(DomainError::duplicate_adjustment(format!(
                "reconciliation {} already adjusted by {}",
                self.id, adj.reference
            )));
        }
        if self.status != ReconciliationStatus::Approved {
            return Err(DomainError::invalid_transition(
                self.status,
                ReconciliationStatus::Completed,
            ));
        }
        Ok(())
    }

    fn ensure_claimed_by(&self, movement_id: MovementId) -> Result<(), DomainError> {
        self.ensure_live()?;
        match &self.adjustment {
            Some(adj) if adj.movement_id == movement_id && !self.adjustment_completed => Ok(()),
            Some(_) => Err(DomainError::conflict(format!(
                "adjustment slot of reconciliation {} is held by another movement",
                self.id
            ))),
            None => Err(DomainError::invariant(format!(
                "reconciliation {} has no claimed adjustment",
                self.id
            ))),
        }
    }

    fn handle_transition(
        &self,
        target: ReconciliationStatus,
        auto_adjust: bool,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<ReconciliationEvent>, DomainError> {
        self.ensure_live()?;

        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.status, target));
        }
        if auto_adjust && target != ReconciliationStatus::Submitted {
            return Err(DomainError::validation(
                "auto-adjust can only be requested at submission",
            ));
        }
        // Closing by hand is only possible when there is nothing to book.
        if target == ReconciliationStatus::Completed {
            if self.adjustment.is_some() {
                return Err(DomainError::conflict(
                    "an adjustment is in flight for this reconciliation",
                ));
            }
            if !self.discrepancy.is_zero() {
                return Err(DomainError::validation(
                    "a non-zero discrepancy is completed by applying its adjustment",
                ));
            }
        }

        Ok(vec![ReconciliationEvent::StatusChanged {
            change: StatusChange {
                from: self.status,
                to: target,
                actor,
                at: occurred_at,
            },
            auto_adjust,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canteen_core::ItemId;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> ItemSnapshot {
        ItemSnapshot {
            item_id: ItemId::new(),
            code: "OIL-05".to_string(),
            name: "Sunflower oil".to_string(),
            unit: "l".to_string(),
        }
    }

    fn draft(system: Decimal, physical: Decimal) -> Reconciliation {
        let id = ReconciliationId::new();
        let mut rec = Reconciliation::empty(id);
        rec.execute(&ReconciliationCommand::Create {
            reconciliation_id: id,
            item: snapshot(),
            system_stock: system,
            physical_stock: physical,
            notes: None,
            actor: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
        rec
    }

    fn transition(rec: &mut Reconciliation, target: ReconciliationStatus) -> Result<(), DomainError> {
        rec.execute(&ReconciliationCommand::Transition {
            target,
            auto_adjust: false,
            actor: Some(UserId::new()),
            occurred_at: Utc::now(),
        })
        .map(|_| ())
    }

    fn approved(system: Decimal, physical: Decimal) -> Reconciliation {
        let mut rec = draft(system, physical);
        transition(&mut rec, ReconciliationStatus::Submitted).unwrap();
        transition(&mut rec, ReconciliationStatus::Verified).unwrap();
        transition(&mut rec, ReconciliationStatus::Approved).unwrap();
        rec
    }

    fn claim(rec: &mut Reconciliation, movement_id: MovementId) -> Result<(), DomainError> {
        rec.execute(&ReconciliationCommand::ClaimAdjustment {
            adjustment: AdjustmentRef {
                movement_id,
                reference: "SM-000009".to_string(),
                system_stock_at_adjustment: rec.system_stock(),
                quantity: rec.discrepancy(),
            },
            actor: None,
            occurred_at: Utc::now(),
        })
        .map(|_| ())
    }

    #[test]
    fn create_computes_discrepancy() {
        let rec = draft(dec!(100), dec!(75));
        assert_eq!(rec.status(), ReconciliationStatus::Draft);
        assert_eq!(rec.discrepancy(), dec!(-25));
        assert_eq!(rec.discrepancy_percentage(), dec!(-25));
        assert!(rec.is_high_discrepancy(dec!(10)));
    }

    #[test]
    fn percentage_edge_cases() {
        assert_eq!(discrepancy_of(dec!(0), dec!(0)), (dec!(0), dec!(0)));
        assert_eq!(discrepancy_of(dec!(0), dec!(4)), (dec!(4), dec!(100)));
        assert_eq!(discrepancy_of(dec!(3), dec!(4)).1, dec!(33.33));
    }

    #[test]
    fn happy_path_reaches_approved() {
        let rec = approved(dec!(100), dec!(75));
        assert_eq!(rec.status(), ReconciliationStatus::Approved);
        assert_eq!(rec.history().len(), 3);
    }

    #[test]
    fn approve_requires_verification() {
        let mut rec = draft(dec!(10), dec!(9));
        transition(&mut rec, ReconciliationStatus::Submitted).unwrap();
        let err = transition(&mut rec, ReconciliationStatus::Approved).unwrap_err();
        assert_eq!(err, DomainError::invalid_transition("SUBMITTED", "APPROVED"));
        assert_eq!(rec.status(), ReconciliationStatus::Submitted);
    }

    #[test]
    fn counts_freeze_after_draft() {
        let mut rec = draft(dec!(10), dec!(9));
        rec.execute(&ReconciliationCommand::UpdatePhysicalStock {
            physical_stock: dec!(12),
            actor: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(rec.discrepancy(), dec!(2));
        assert_eq!(rec.discrepancy_percentage(), dec!(20));

        transition(&mut rec, ReconciliationStatus::Submitted).unwrap();
        let err = rec
            .handle(&ReconciliationCommand::UpdatePhysicalStock {
                physical_stock: dec!(10),
                actor: None,
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn second_claim_is_a_duplicate() {
        let mut rec = approved(dec!(100), dec!(75));
        let movement_id = MovementId::new();
        claim(&mut rec, movement_id).unwrap();
        rec.execute(&ReconciliationCommand::CompleteAdjustment {
            movement_id,
            actor: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(rec.status(), ReconciliationStatus::Completed);

        let err = claim(&mut rec, MovementId::new()).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateAdjustment(_)));
    }

    #[test]
    fn released_claim_can_be_retried() {
        let mut rec = approved(dec!(100), dec!(75));
        let first = MovementId::new();
        claim(&mut rec, first).unwrap();
        rec.execute(&ReconciliationCommand::ReleaseAdjustment {
            movement_id: first,
            reason: "ledger conflict".to_string(),
            occurred_at: Utc::now(),
        })
        .unwrap();

        assert!(rec.adjustment().is_none());
        assert_eq!(rec.status(), ReconciliationStatus::Approved);
        claim(&mut rec, MovementId::new()).unwrap();
    }

    #[test]
    fn non_zero_discrepancy_cannot_be_closed_by_hand() {
        let mut rec = approved(dec!(100), dec!(75));
        assert!(matches!(
            transition(&mut rec, ReconciliationStatus::Completed),
            Err(DomainError::Validation(_))
        ));

        let mut balanced = approved(dec!(50), dec!(50));
        transition(&mut balanced, ReconciliationStatus::Completed).unwrap();
        assert_eq!(balanced.status(), ReconciliationStatus::Completed);
    }

    #[test]
    fn stale_discrepancy_closes_when_live_stock_matches_count() {
        let mut rec = approved(dec!(100), dec!(75));
        let close = |live| ReconciliationCommand::CloseBalanced {
            live_system_stock: live,
            actor: None,
            occurred_at: Utc::now(),
        };
        assert!(matches!(rec.handle(&close(dec!(90))), Err(DomainError::Validation(_))));
        rec.execute(&close(dec!(75))).unwrap();
        assert_eq!(rec.status(), ReconciliationStatus::Completed);
        assert!(rec.adjustment().is_none());
    }

    #[test]
    fn only_draft_and_rejected_are_deletable() {
        let mut rec = draft(dec!(1), dec!(1));
        transition(&mut rec, ReconciliationStatus::Submitted).unwrap();
        let delete = ReconciliationCommand::Delete {
            actor: None,
            occurred_at: Utc::now(),
        };
        assert!(matches!(
            rec.handle(&delete),
            Err(DomainError::InvalidTransition { .. })
        ));

        transition(&mut rec, ReconciliationStatus::Verified).unwrap();
        transition(&mut rec, ReconciliationStatus::Rejected).unwrap();
        rec.execute(&delete).unwrap();
        assert!(rec.is_deleted());
    }

    fn status() -> impl Strategy<Value = ReconciliationStatus> {
        (0usize..6).prop_map(|i| ReconciliationStatus::ALL[i])
    }

    /// Walk a fresh record (zero discrepancy) to `status` along legal edges.
    fn reach(status: ReconciliationStatus) -> Reconciliation {
        use ReconciliationStatus::*;
        let path: &[ReconciliationStatus] = match status {
            Draft => &[],
            Submitted => &[Submitted],
            Verified => &[Submitted, Verified],
            Approved => &[Submitted, Verified, Approved],
            Rejected => &[Submitted, Verified, Rejected],
            Completed => &[Submitted, Verified, Approved, Completed],
        };
        let mut rec = draft(dec!(10), dec!(10));
        for step in path {
            transition(&mut rec, *step).unwrap();
        }
        rec
    }

    proptest! {
        /// Every edge outside the state machine fails and leaves the status
        /// untouched; every edge inside it succeeds.
        #[test]
        fn only_adjacent_transitions_are_legal(from in status(), to in status()) {
            let mut rec = reach(from);
            let result = transition(&mut rec, to);
            if from.can_transition_to(to) {
                prop_assert!(result.is_ok());
                prop_assert_eq!(rec.status(), to);
            } else {
                let is_invalid_transition = matches!(result, Err(DomainError::InvalidTransition { .. }));
                prop_assert!(is_invalid_transition);
                prop_assert_eq!(rec.status(), from);
            }
        }

        #[test]
        fn discrepancy_law(system in 0i64..100_000, physical in 0i64..100_000) {
            let system = Decimal::new(system, 2);
            let physical = Decimal::new(physical, 2);
            let (d, pct) = discrepancy_of(system, physical);
            prop_assert_eq!(d, physical - system);
            if system.is_zero() && physical.is_zero() {
                prop_assert_eq!(pct, Decimal::ZERO);
            } else if system.is_zero() {
                prop_assert_eq!(pct, Decimal::ONE_HUNDRED);
            } else {
                let exact = d / system * Decimal::ONE_HUNDRED;
                prop_assert!((pct - exact).abs() <= dec!(0.005));
            }
        }
    }
}
