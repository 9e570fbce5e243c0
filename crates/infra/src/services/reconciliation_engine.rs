//! ReconciliationEngine: physical counts against the ledger.
//!
//! The record itself is updated with compare-and-swap on its store version.
//! Booking the corrective movement is a three-write protocol:
//!
//! 1. claim the single adjustment slot on the reconciliation (CAS)
//! 2. record and complete the ADJUSTMENT movement through the ledger
//! 3. mark the reconciliation COMPLETED, or release the slot if step 2 failed
//!
//! The claim is what makes a second `apply_adjustment` fail with
//! `DuplicateAdjustment` instead of booking another movement.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use canteen_core::{Aggregate, ExpectedVersion, ItemId, MovementId, ReconciliationId, UserId};
use canteen_events::{EventBus, FieldChange, Notification};
use canteen_inventory::{
    AdjustmentRef, Direction, ItemSnapshot, MovementStatus, MovementType, Reconciliation,
    ReconciliationCommand, ReconciliationStatus, StockMovement,
};
use canteen_sequence::EntityType;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::services::{SequenceGenerator, StockLedger};
use crate::sink::{EngineEnvelope, Outbox, entity};
use crate::store::{DocumentStore, ReadOptions, Storage, Versioned};

/// Non-blocking warning: the count deviates strongly from system stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscrepancyWarning {
    pub discrepancy_percentage: Decimal,
    pub threshold_pct: Decimal,
}

impl core::fmt::Display for DiscrepancyWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "discrepancy of {}% exceeds {}%",
            self.discrepancy_percentage, self.threshold_pct
        )
    }
}

/// Result of a reconciliation mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub reconciliation: Reconciliation,
    pub warning: Option<DiscrepancyWarning>,
    /// The corrective movement, when this call booked one.
    pub adjustment: Option<StockMovement>,
}

pub struct ReconciliationEngine<S, B> {
    storage: Arc<S>,
    bus: Arc<B>,
    ledger: StockLedger<S, B>,
    sequences: SequenceGenerator<S, B>,
    config: Arc<EngineConfig>,
}

impl<S, B> Clone for ReconciliationEngine<S, B> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            bus: Arc::clone(&self.bus),
            ledger: self.ledger.clone(),
            sequences: self.sequences.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, B> ReconciliationEngine<S, B>
where
    S: Storage,
    B: EventBus<EngineEnvelope>,
{
    pub fn new(
        storage: Arc<S>,
        bus: Arc<B>,
        ledger: StockLedger<S, B>,
        sequences: SequenceGenerator<S, B>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            storage,
            bus,
            ledger,
            sequences,
            config,
        }
    }

    /// Open a DRAFT against the item's current balance.
    pub fn create(
        &self,
        item_id: ItemId,
        physical_stock: Decimal,
        notes: Option<String>,
        actor: Option<UserId>,
    ) -> EngineResult<ReconciliationReport> {
        let now = Utc::now();
        let item = self.ledger.get(item_id)?;
        let id = ReconciliationId::new();

        let mut rec = Reconciliation::empty(id);
        rec.execute(&ReconciliationCommand::Create {
            reconciliation_id: id,
            item: item.item_snapshot(),
            system_stock: item.current_stock(),
            physical_stock,
            notes,
            actor,
            occurred_at: now,
        })?;
        let version = self.storage.reconciliations().insert(id, rec.clone())?;

        info!(
            reconciliation_id = %id,
            item_id = %item_id,
            system_stock = %rec.system_stock(),
            physical_stock = %rec.physical_stock(),
            discrepancy = %rec.discrepancy(),
            created_by = ?rec.created_by(),
            "reconciliation created"
        );

        let outbox = Outbox::new(entity::RECONCILIATION, id, version, actor).audit(
            "created",
            vec![
                FieldChange::created("system_stock", rec.system_stock()),
                FieldChange::created("physical_stock", rec.physical_stock()),
                FieldChange::created("discrepancy", rec.discrepancy()),
                FieldChange::created("discrepancy_percentage", rec.discrepancy_percentage()),
                FieldChange::created("status", rec.status()),
            ],
            now,
        );
        self.flag_discrepancy(outbox, &rec, now)
            .publish(self.bus.as_ref())?;

        Ok(self.report(rec, None))
    }

    /// Re-count while still in DRAFT; the discrepancy is recomputed.
    pub fn update_physical_stock(
        &self,
        id: ReconciliationId,
        physical_stock: Decimal,
        actor: Option<UserId>,
    ) -> EngineResult<ReconciliationReport> {
        let now = Utc::now();
        let (before, rec, version) = self.execute(
            id,
            ReconciliationCommand::UpdatePhysicalStock {
                physical_stock,
                actor,
                occurred_at: now,
            },
        )?;

        let changes = [
            FieldChange::diff("physical_stock", &before.physical_stock(), &rec.physical_stock()),
            FieldChange::diff("discrepancy", &before.discrepancy(), &rec.discrepancy()),
            FieldChange::diff(
                "discrepancy_percentage",
                &before.discrepancy_percentage(),
                &rec.discrepancy_percentage(),
            ),
        ]
        .into_iter()
        .flatten()
        .collect();

        let outbox = Outbox::new(entity::RECONCILIATION, id, version, actor).audit(
            "physical_stock_updated",
            changes,
            now,
        );
        self.flag_discrepancy(outbox, &rec, now)
            .publish(self.bus.as_ref())?;

        Ok(self.report(rec, None))
    }

    /// Move along the state machine. Approving a record submitted with
    /// auto-adjust settles it in the same call, and asking for COMPLETED
    /// always goes through [`Self::settle`] so the count is checked against
    /// live stock.
    pub fn transition(
        &self,
        id: ReconciliationId,
        target: ReconciliationStatus,
        actor: Option<UserId>,
    ) -> EngineResult<ReconciliationReport> {
        self.transition_with(id, target, false, actor)
    }

    /// DRAFT -> SUBMITTED, asking for the adjustment to be booked as soon
    /// as the record is approved.
    pub fn submit_with_auto_adjust(
        &self,
        id: ReconciliationId,
        actor: Option<UserId>,
    ) -> EngineResult<ReconciliationReport> {
        self.transition_with(id, ReconciliationStatus::Submitted, true, actor)
    }

    fn transition_with(
        &self,
        id: ReconciliationId,
        target: ReconciliationStatus,
        auto_adjust: bool,
        actor: Option<UserId>,
    ) -> EngineResult<ReconciliationReport> {
        if target == ReconciliationStatus::Completed {
            return self.settle(id, actor);
        }

        let now = Utc::now();
        let (before, rec, version) = self.execute(
            id,
            ReconciliationCommand::Transition {
                target,
                auto_adjust,
                actor,
                occurred_at: now,
            },
        )?;

        info!(
            reconciliation_id = %id,
            from = %before.status(),
            to = %rec.status(),
            steps = rec.history().len(),
            "reconciliation status changed"
        );

        let mut changes = vec![FieldChange::new("status", before.status(), rec.status())];
        changes.extend(FieldChange::diff("auto_adjust", &before.auto_adjust(), &rec.auto_adjust()));
        let mut outbox =
            Outbox::new(entity::RECONCILIATION, id, version, actor).audit("status_changed", changes, now);
        if rec.status() == ReconciliationStatus::Verified {
            outbox = outbox.notify(Notification::ReconciliationPendingApproval {
                reconciliation_id: id,
                item_id: item_of(&rec)?.item_id,
                occurred_at: now,
            });
        }
        outbox.publish(self.bus.as_ref())?;

        if rec.status() == ReconciliationStatus::Approved && rec.auto_adjust() {
            return self.settle(id, actor);
        }
        Ok(self.report(rec, None))
    }

    /// Finish an APPROVED reconciliation: book the adjustment when live
    /// stock still differs from the count, otherwise just close it.
    pub fn settle(
        &self,
        id: ReconciliationId,
        actor: Option<UserId>,
    ) -> EngineResult<ReconciliationReport> {
        let current = self.get(id)?;
        current.ensure_adjustable()?;
        let live = self.ledger.snapshot(item_of(&current)?.item_id)?.current_stock;

        if live != current.physical_stock() {
            let movement = self.apply_adjustment(id, actor)?;
            return Ok(self.report(self.get(id)?, Some(movement)));
        }

        let now = Utc::now();
        let (before, rec, version) = self.execute(
            id,
            ReconciliationCommand::CloseBalanced {
                live_system_stock: live,
                actor,
                occurred_at: now,
            },
        )?;
        info!(reconciliation_id = %id, "reconciliation closed without adjustment");

        Outbox::new(entity::RECONCILIATION, id, version, actor)
            .audit(
                "status_changed",
                vec![FieldChange::new("status", before.status(), rec.status())],
                now,
            )
            .publish(self.bus.as_ref())?;
        Ok(self.report(rec, None))
    }

    /// Book the corrective ADJUSTMENT movement of an APPROVED record and
    /// complete it.
    ///
    /// The correction is recomputed against live stock, not the stock
    /// snapshot taken at creation. At most one adjustment is ever booked per
    /// reconciliation; later calls fail with `DuplicateAdjustment`.
    pub fn apply_adjustment(
        &self,
        id: ReconciliationId,
        actor: Option<UserId>,
    ) -> EngineResult<StockMovement> {
        let now = Utc::now();
        let current = self.load(id)?;
        current.value.ensure_adjustable()?;

        let item = item_of(&current.value)?.clone();
        let live = self.ledger.snapshot(item.item_id)?.current_stock;
        let delta = current.value.physical_stock() - live;
        let Some(direction) = Direction::of_delta(delta) else {
            return Err(EngineError::Validation(format!(
                "reconciliation {id}: live stock already matches the count of {}",
                current.value.physical_stock()
            )));
        };
        if live != current.value.system_stock() {
            info!(
                reconciliation_id = %id,
                counted_against = %current.value.system_stock(),
                live_stock = %live,
                "stock moved since the count; adjusting against live stock"
            );
        }

        let movement = StockMovement::pending(
            MovementId::new(),
            self.sequences.next(EntityType::StockMovement)?,
            item,
            MovementType::Adjustment,
            Some(direction),
            delta.abs(),
            None,
            Some(format!("reconciliation {id}")),
            actor,
            now,
        )?
        .for_reconciliation(id);

        self.claim(current, &movement, live, delta, actor)?;

        let booked = self
            .ledger
            .insert_movement(movement.clone(), actor)
            .and_then(|_| self.ledger.complete_movement(movement.id(), actor));

        match booked {
            Ok(done) => {
                self.finish(id, &done, actor)?;
                Ok(done)
            }
            Err(err) => {
                match self.ledger.movement(movement.id()) {
                    // Stock moved; only the fan-out failed.
                    Ok(done) if done.status() == MovementStatus::Completed => {
                        self.finish(id, &done, actor)?;
                    }
                    _ => self.abandon(id, &movement, &err, actor),
                }
                Err(err)
            }
        }
    }

    /// Soft delete; only DRAFT and REJECTED records can go.
    pub fn delete(&self, id: ReconciliationId, actor: Option<UserId>) -> EngineResult<()> {
        let now = Utc::now();
        let (_, _, version) = self.execute(
            id,
            ReconciliationCommand::Delete {
                actor,
                occurred_at: now,
            },
        )?;
        info!(reconciliation_id = %id, "reconciliation deleted");

        Outbox::new(entity::RECONCILIATION, id, version, actor)
            .audit("deleted", vec![FieldChange::new("is_deleted", false, true)], now)
            .publish(self.bus.as_ref())
    }

    pub fn find(
        &self,
        id: ReconciliationId,
        opts: ReadOptions,
    ) -> EngineResult<Option<Reconciliation>> {
        Ok(self.storage.reconciliations().get(&id, opts)?.map(|v| v.value))
    }

    pub fn get(&self, id: ReconciliationId) -> EngineResult<Reconciliation> {
        Ok(self.load(id)?.value)
    }

    pub fn list(&self, opts: ReadOptions) -> EngineResult<Vec<Reconciliation>> {
        Ok(self
            .storage
            .reconciliations()
            .list(opts)?
            .into_iter()
            .map(|v| v.value)
            .collect())
    }

    fn load(&self, id: ReconciliationId) -> EngineResult<Versioned<Reconciliation>> {
        self.storage
            .reconciliations()
            .get(&id, ReadOptions::live())?
            .ok_or_else(|| EngineError::NotFound(format!("reconciliation {id}")))
    }

    /// Load, run one command, write back with CAS. Returns the record before
    /// and after, and the new version.
    fn execute(
        &self,
        id: ReconciliationId,
        command: ReconciliationCommand,
    ) -> EngineResult<(Reconciliation, Reconciliation, u64)> {
        let current = self.load(id)?;
        let mut next = current.value.clone();
        next.execute(&command)?;
        let version = self.storage.reconciliations().compare_and_swap(
            &id,
            ExpectedVersion::Exact(current.version),
            next.clone(),
        )?;
        Ok((current.value, next, version))
    }

    fn claim(
        &self,
        current: Versioned<Reconciliation>,
        movement: &StockMovement,
        live: Decimal,
        delta: Decimal,
        actor: Option<UserId>,
    ) -> EngineResult<()> {
        let id = current.value.id_typed();
        let now = Utc::now();
        let mut claimed = current.value.clone();
        claimed.execute(&ReconciliationCommand::ClaimAdjustment {
            adjustment: AdjustmentRef {
                movement_id: movement.id(),
                reference: movement.reference().to_string(),
                system_stock_at_adjustment: live,
                quantity: delta,
            },
            actor,
            occurred_at: now,
        })?;

        let version = match self.storage.reconciliations().compare_and_swap(
            &id,
            ExpectedVersion::Exact(current.version),
            claimed,
        ) {
            Ok(version) => version,
            // Lost the race: report what the winner did, if it was an adjustment.
            Err(StoreError::Concurrency(msg)) => {
                self.get(id)?.ensure_adjustable()?;
                return Err(EngineError::ConcurrencyConflict(msg));
            }
            Err(other) => return Err(other.into()),
        };

        Outbox::new(entity::RECONCILIATION, id, version, actor)
            .audit(
                "adjustment_claimed",
                vec![FieldChange::created("adjustment_reference", movement.reference())],
                now,
            )
            .publish(self.bus.as_ref())
    }

    fn finish(
        &self,
        id: ReconciliationId,
        movement: &StockMovement,
        actor: Option<UserId>,
    ) -> EngineResult<()> {
        let now = Utc::now();
        let (before, rec, version) = self.execute(
            id,
            ReconciliationCommand::CompleteAdjustment {
                movement_id: movement.id(),
                actor,
                occurred_at: now,
            },
        )?;

        info!(
            reconciliation_id = %id,
            movement = movement.reference(),
            quantity = %movement.signed_quantity(),
            "reconciliation adjusted and completed"
        );

        Outbox::new(entity::RECONCILIATION, id, version, actor)
            .audit(
                "adjustment_completed",
                vec![FieldChange::new("status", before.status(), rec.status())],
                now,
            )
            .publish(self.bus.as_ref())
    }

    /// Undo a claim whose movement never completed. Failures here are
    /// logged; the caller returns the original error.
    fn abandon(
        &self,
        id: ReconciliationId,
        movement: &StockMovement,
        cause: &EngineError,
        actor: Option<UserId>,
    ) {
        if let Ok(pending) = self.ledger.movement(movement.id()) {
            if pending.status() == MovementStatus::Pending {
                if let Err(e) = self.ledger.reject_movement(movement.id(), cause.to_string(), actor) {
                    warn!(movement = movement.reference(), error = %e, "could not reject abandoned adjustment");
                }
            }
        }

        let now = Utc::now();
        let released = self
            .execute(
                id,
                ReconciliationCommand::ReleaseAdjustment {
                    movement_id: movement.id(),
                    reason: cause.to_string(),
                    occurred_at: now,
                },
            )
            .and_then(|(_, _, version)| {
                Outbox::new(entity::RECONCILIATION, id, version, actor)
                    .audit(
                        "adjustment_released",
                        vec![FieldChange {
                            field: "adjustment_reference".to_string(),
                            old_value: Some(movement.reference().to_string()),
                            new_value: None,
                        }],
                        now,
                    )
                    .publish(self.bus.as_ref())
            });

        match released {
            Ok(()) => warn!(reconciliation_id = %id, error = %cause, "adjustment failed; slot released"),
            Err(e) => warn!(reconciliation_id = %id, error = %e, "could not release adjustment slot"),
        }
    }

    fn flag_discrepancy(
        &self,
        outbox: Outbox,
        rec: &Reconciliation,
        now: chrono::DateTime<Utc>,
    ) -> Outbox {
        let Some(warning) = self.warning_for(rec) else {
            return outbox;
        };
        let item_id = rec.item().map(|i| i.item_id);
        warn!(
            reconciliation_id = %rec.id_typed(),
            item_id = ?item_id,
            discrepancy_percentage = %warning.discrepancy_percentage,
            "high discrepancy"
        );
        match item_id {
            Some(item_id) => outbox.notify(Notification::HighDiscrepancy {
                reconciliation_id: rec.id_typed(),
                item_id,
                discrepancy_percentage: warning.discrepancy_percentage,
                occurred_at: now,
            }),
            None => outbox,
        }
    }

    fn warning_for(&self, rec: &Reconciliation) -> Option<DiscrepancyWarning> {
        let threshold_pct = self.config.high_discrepancy_threshold_pct;
        rec.is_high_discrepancy(threshold_pct)
            .then(|| DiscrepancyWarning {
                discrepancy_percentage: rec.discrepancy_percentage(),
                threshold_pct,
            })
    }

    fn report(&self, rec: Reconciliation, adjustment: Option<StockMovement>) -> ReconciliationReport {
        ReconciliationReport {
            warning: self.warning_for(&rec),
            reconciliation: rec,
            adjustment,
        }
    }
}

fn item_of(rec: &Reconciliation) -> EngineResult<&ItemSnapshot> {
    rec.item().ok_or_else(|| {
        EngineError::InvariantViolation(format!("reconciliation {} has no item", rec.id_typed()))
    })
}
