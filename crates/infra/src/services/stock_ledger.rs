//! StockLedger: the only writer of `InventoryItem.current_stock`.
//!
//! Every balance change is the completion of a PENDING movement. The item
//! aggregate runs inside the store's find-and-modify so two movements on the
//! same item can never start from the same `stock_before`. Movements are
//! recorded PENDING first and completed while their own document is held,
//! which stops a movement from being applied twice. Lock order is always
//! movement, then item.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use canteen_core::{Aggregate, ItemId, MovementId, UserId};
use canteen_events::{EventBus, FieldChange, Notification};
use canteen_inventory::{
    ApplyMovement, ChangeReorderLevel, CreateItem, Direction, InventoryCommand, InventoryEvent,
    InventoryItem, MovementApplied, MovementStatus, MovementType, SoftDeleteItem, StockMovement,
    StockSnapshot,
};
use canteen_sequence::EntityType;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::services::SequenceGenerator;
use crate::sink::{EngineEnvelope, Outbox, entity};
use crate::store::{DocumentStore, ReadOptions, Storage};

/// Input of [`StockLedger::create_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub reorder_level: Decimal,
    pub opening_stock: Decimal,
    /// Opening average cost per unit.
    pub opening_cost: Decimal,
}

/// Input of [`StockLedger::record_movement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub item_id: ItemId,
    pub movement_type: MovementType,
    /// Required for ADJUSTMENT, must agree with the type otherwise.
    pub direction: Option<Direction>,
    pub quantity: Decimal,
    pub cost_per_unit: Option<Decimal>,
    pub notes: Option<String>,
}

impl MovementRequest {
    pub fn new(item_id: ItemId, movement_type: MovementType, quantity: Decimal) -> Self {
        Self {
            item_id,
            movement_type,
            direction: None,
            quantity,
            cost_per_unit: None,
            notes: None,
        }
    }

    pub fn with_cost(mut self, cost_per_unit: Decimal) -> Self {
        self.cost_per_unit = Some(cost_per_unit);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Outcome of one applied movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyResult {
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub total_cost: Decimal,
}

pub struct StockLedger<S, B> {
    storage: Arc<S>,
    bus: Arc<B>,
    sequences: SequenceGenerator<S, B>,
    config: Arc<EngineConfig>,
}

impl<S, B> Clone for StockLedger<S, B> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            bus: Arc::clone(&self.bus),
            sequences: self.sequences.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, B> StockLedger<S, B>
where
    S: Storage,
    B: EventBus<EngineEnvelope>,
{
    pub fn new(
        storage: Arc<S>,
        bus: Arc<B>,
        sequences: SequenceGenerator<S, B>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            storage,
            bus,
            sequences,
            config,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Items
    // ─────────────────────────────────────────────────────────────────────

    /// Register a new item. Codes are unique for the lifetime of the store,
    /// deleted items included.
    pub fn create_item(&self, new: NewItem, actor: Option<UserId>) -> EngineResult<InventoryItem> {
        let now = Utc::now();
        let item_id = ItemId::new();

        let mut item = InventoryItem::empty(item_id);
        item.execute(&InventoryCommand::CreateItem(CreateItem {
            item_id,
            code: new.code,
            name: new.name,
            unit: new.unit,
            reorder_level: new.reorder_level,
            opening_stock: new.opening_stock,
            opening_cost: new.opening_cost,
            cost_scale: self.config.cost_scale,
            occurred_at: now,
        }))?;

        self.storage
            .item_codes()
            .insert(item.code().to_string(), item_id)
            .map_err(|e| match e {
                StoreError::Duplicate(_) => {
                    EngineError::Validation(format!("item code '{}' already exists", item.code()))
                }
                other => other.into(),
            })?;
        let version = self.storage.items().insert(item_id, item.clone())?;

        info!(item_id = %item_id, code = item.code(), opening_stock = %item.current_stock(), "inventory item created");

        Outbox::new(entity::INVENTORY_ITEM, item_id, version, actor)
            .audit(
                "created",
                vec![
                    FieldChange::created("code", item.code()),
                    FieldChange::created("name", item.name()),
                    FieldChange::created("current_stock", item.current_stock()),
                    FieldChange::created("reorder_level", item.reorder_level()),
                    FieldChange::created("avg_cost_per_unit", item.avg_cost_per_unit()),
                    FieldChange::created("total_value", item.total_value()),
                ],
                now,
            )
            .publish(self.bus.as_ref())?;
        Ok(item)
    }

    pub fn find(&self, item_id: ItemId, opts: ReadOptions) -> EngineResult<Option<InventoryItem>> {
        Ok(self.storage.items().get(&item_id, opts)?.map(|v| v.value))
    }

    pub fn get(&self, item_id: ItemId) -> EngineResult<InventoryItem> {
        self.find(item_id, ReadOptions::live())?
            .ok_or_else(|| EngineError::NotFound(format!("inventory item {item_id}")))
    }

    pub fn list(&self, opts: ReadOptions) -> EngineResult<Vec<InventoryItem>> {
        Ok(self
            .storage
            .items()
            .list(opts)?
            .into_iter()
            .map(|v| v.value)
            .collect())
    }

    /// Current balance and valuation. Read-only.
    pub fn snapshot(&self, item_id: ItemId) -> EngineResult<StockSnapshot> {
        Ok(self.get(item_id)?.snapshot())
    }

    /// Items at or below their reorder level.
    pub fn low_stock_items(&self) -> EngineResult<Vec<InventoryItem>> {
        Ok(self
            .list(ReadOptions::live())?
            .into_iter()
            .filter(InventoryItem::is_low_stock)
            .collect())
    }

    pub fn change_reorder_level(
        &self,
        item_id: ItemId,
        reorder_level: Decimal,
        actor: Option<UserId>,
    ) -> EngineResult<InventoryItem> {
        let now = Utc::now();
        let updated = self
            .storage
            .items()
            .find_and_modify(&item_id, |item: &mut InventoryItem| {
                let before = item.reorder_level();
                item.execute(&InventoryCommand::ChangeReorderLevel(ChangeReorderLevel {
                    item_id,
                    reorder_level,
                    occurred_at: now,
                }))?;
                Ok::<_, EngineError>((before, item.clone()))
            })?;
        let (before, item) = updated.value;

        Outbox::new(entity::INVENTORY_ITEM, item_id, updated.version, actor)
            .audit(
                "reorder_level_changed",
                FieldChange::diff("reorder_level", &before, &item.reorder_level())
                    .into_iter()
                    .collect(),
                now,
            )
            .publish(self.bus.as_ref())?;
        Ok(item)
    }

    /// Hide the item from default reads. Its movements and code stay.
    pub fn soft_delete_item(&self, item_id: ItemId, actor: Option<UserId>) -> EngineResult<()> {
        let now = Utc::now();
        let updated = self
            .storage
            .items()
            .find_and_modify(&item_id, |item: &mut InventoryItem| {
                item.execute(&InventoryCommand::SoftDeleteItem(SoftDeleteItem {
                    item_id,
                    occurred_at: now,
                }))
                .map_err(EngineError::from)
            })?;

        info!(item_id = %item_id, "inventory item deleted");

        Outbox::new(entity::INVENTORY_ITEM, item_id, updated.version, actor)
            .audit("deleted", vec![FieldChange::new("is_deleted", false, true)], now)
            .publish(self.bus.as_ref())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stock arithmetic
    // ─────────────────────────────────────────────────────────────────────

    /// Apply a movement to the item's balance in one call.
    ///
    /// The movement is recorded and completed through
    /// [`StockLedger::record_movement`], so every balance change has a
    /// COMPLETED movement behind it. On failure the item is unchanged.
    pub fn apply(&self, request: MovementRequest, actor: Option<UserId>) -> EngineResult<ApplyResult> {
        let movement = self.record_movement(request, actor)?;
        match (movement.stock_before(), movement.stock_after(), movement.total_cost()) {
            (Some(stock_before), Some(stock_after), Some(total_cost)) => Ok(ApplyResult {
                stock_before,
                stock_after,
                total_cost,
            }),
            _ => Err(EngineError::InvariantViolation(format!(
                "completed movement {} carries no balance snapshot",
                movement.reference()
            ))),
        }
    }

    /// The item write behind a completion. Only PENDING movements are
    /// applied; publishing is left to the caller so it can happen after the
    /// caller's own write.
    fn apply_to_item(
        &self,
        movement: &StockMovement,
        actor: Option<UserId>,
    ) -> EngineResult<(ApplyResult, Outbox)> {
        if movement.status() != MovementStatus::Pending {
            return Err(EngineError::InvalidTransition {
                from: movement.status().to_string(),
                to: MovementStatus::Completed.to_string(),
            });
        }

        let now = Utc::now();
        let item_id = movement.item().item_id;
        let command = InventoryCommand::ApplyMovement(ApplyMovement {
            item_id,
            movement_id: movement.id(),
            movement_type: movement.movement_type(),
            direction: movement.direction(),
            quantity: movement.quantity(),
            cost_per_unit: movement.cost_per_unit(),
            cost_scale: self.config.cost_scale,
            occurred_at: now,
        });

        let updated = self
            .storage
            .items()
            .find_and_modify(&item_id, |item: &mut InventoryItem| {
                let events = item.execute(&command)?;
                let applied = events
                    .into_iter()
                    .find_map(|e| match e {
                        InventoryEvent::MovementApplied(applied) => Some(applied),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        EngineError::InvariantViolation("movement produced no balance change".into())
                    })?;
                Ok::<_, EngineError>((applied, item.clone()))
            })
            .inspect_err(|e| {
                debug!(item_id = %item_id, movement = movement.reference(), error = %e, "movement not applied");
            })?;
        let (applied, item) = updated.value;

        info!(
            item_id = %item_id,
            movement = movement.reference(),
            movement_type = %applied.movement_type,
            quantity = %applied.quantity,
            stock_before = %applied.stock_before,
            stock_after = %applied.stock_after,
            "movement applied"
        );

        let mut outbox = Outbox::new(entity::INVENTORY_ITEM, item_id, updated.version, actor)
            .audit("movement_applied", balance_changes(&applied), now);
        if self.config.notify_low_stock && item.is_low_stock() {
            warn!(item_id = %item_id, current_stock = %item.current_stock(), reorder_level = %item.reorder_level(), "item at or below reorder level");
            outbox = outbox.notify(Notification::LowStock {
                item_id,
                item_code: item.code().to_string(),
                current_stock: item.current_stock(),
                reorder_level: item.reorder_level(),
                occurred_at: now,
            });
        }

        let result = ApplyResult {
            stock_before: applied.stock_before,
            stock_after: applied.stock_after,
            total_cost: applied.total_cost,
        };
        Ok((result, outbox))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Movements
    // ─────────────────────────────────────────────────────────────────────

    /// One-step flow: issue a reference, apply, and keep the movement as
    /// COMPLETED. A movement the ledger refuses is kept as REJECTED with the
    /// error as reason, and the error is returned.
    pub fn record_movement(
        &self,
        request: MovementRequest,
        actor: Option<UserId>,
    ) -> EngineResult<StockMovement> {
        let pending = self.record_pending_movement(request, actor)?;
        match self.complete_movement(pending.id(), actor) {
            Ok(movement) => Ok(movement),
            // Either committed already or the store itself is failing.
            Err(err @ (EngineError::Store(_) | EngineError::Publish(_))) => Err(err),
            Err(err) => {
                self.reject_movement(pending.id(), err.to_string(), actor)?;
                Err(err)
            }
        }
    }

    /// First half of the two-step flow; stock is not touched yet.
    pub fn record_pending_movement(
        &self,
        request: MovementRequest,
        actor: Option<UserId>,
    ) -> EngineResult<StockMovement> {
        StockMovement::validate_request(
            request.movement_type,
            request.direction,
            request.quantity,
            request.cost_per_unit,
        )?;
        let item = self.get(request.item_id)?;
        let reference = self.sequences.next(EntityType::StockMovement)?;

        let movement = StockMovement::pending(
            MovementId::new(),
            reference,
            item.item_snapshot(),
            request.movement_type,
            request.direction,
            request.quantity,
            request.cost_per_unit,
            request.notes,
            actor,
            Utc::now(),
        )?;
        self.insert_movement(movement, actor)
    }

    /// Insert an already-built PENDING movement (adjustments build their own).
    pub(crate) fn insert_movement(
        &self,
        movement: StockMovement,
        actor: Option<UserId>,
    ) -> EngineResult<StockMovement> {
        let version = self.storage.movements().insert(movement.id(), movement.clone())?;

        debug!(movement = movement.reference(), item_id = %movement.item().item_id, "movement recorded as pending");

        Outbox::new(entity::STOCK_MOVEMENT, movement.id(), version, actor)
            .audit(
                "created",
                vec![
                    FieldChange::created("reference", movement.reference()),
                    FieldChange::created("movement_type", movement.movement_type()),
                    FieldChange::created("quantity", movement.quantity()),
                    FieldChange::created("status", movement.status()),
                ],
                movement.transaction_date(),
            )
            .publish(self.bus.as_ref())?;
        Ok(movement)
    }

    /// PENDING -> COMPLETED. On failure the movement stays PENDING and the
    /// item is unchanged.
    pub fn complete_movement(
        &self,
        movement_id: MovementId,
        actor: Option<UserId>,
    ) -> EngineResult<StockMovement> {
        let updated = self
            .storage
            .movements()
            .find_and_modify(&movement_id, |movement: &mut StockMovement| {
                let (result, item_outbox) = self.apply_to_item(movement, actor)?;
                movement.complete(result.stock_before, result.stock_after, result.total_cost)?;
                Ok::<_, EngineError>((movement.clone(), item_outbox))
            })?;
        let (movement, item_outbox) = updated.value;
        item_outbox.publish(self.bus.as_ref())?;

        Outbox::new(entity::STOCK_MOVEMENT, movement_id, updated.version, actor)
            .audit(
                "completed",
                vec![
                    FieldChange::new("status", MovementStatus::Pending, MovementStatus::Completed),
                    FieldChange::created("stock_before", display_opt(movement.stock_before())),
                    FieldChange::created("stock_after", display_opt(movement.stock_after())),
                ],
                Utc::now(),
            )
            .publish(self.bus.as_ref())?;
        Ok(movement)
    }

    /// PENDING -> REJECTED. Stock is never touched.
    pub fn reject_movement(
        &self,
        movement_id: MovementId,
        reason: impl Into<String>,
        actor: Option<UserId>,
    ) -> EngineResult<StockMovement> {
        let reason = reason.into();
        let updated = self
            .storage
            .movements()
            .find_and_modify(&movement_id, |movement: &mut StockMovement| {
                movement.reject(reason.clone())?;
                Ok::<_, EngineError>(movement.clone())
            })?;

        info!(movement_id = %movement_id, reason = %reason, "movement rejected");

        Outbox::new(entity::STOCK_MOVEMENT, movement_id, updated.version, actor)
            .audit(
                "rejected",
                vec![
                    FieldChange::new("status", MovementStatus::Pending, MovementStatus::Rejected),
                    FieldChange::created("rejection_reason", &reason),
                ],
                Utc::now(),
            )
            .publish(self.bus.as_ref())?;
        Ok(updated.value)
    }

    /// Notes are the only field editable after completion.
    pub fn edit_movement_notes(
        &self,
        movement_id: MovementId,
        notes: Option<String>,
        actor: Option<UserId>,
    ) -> EngineResult<StockMovement> {
        let updated = self
            .storage
            .movements()
            .find_and_modify(&movement_id, |movement: &mut StockMovement| {
                let before = movement.notes().map(str::to_string);
                movement.edit_notes(notes.clone());
                Ok::<_, EngineError>((before, movement.clone()))
            })?;
        let (before, movement) = updated.value;

        Outbox::new(entity::STOCK_MOVEMENT, movement_id, updated.version, actor)
            .audit(
                "notes_edited",
                FieldChange::diff(
                    "notes",
                    &before.unwrap_or_default(),
                    &notes.unwrap_or_default(),
                )
                .into_iter()
                .collect(),
                Utc::now(),
            )
            .publish(self.bus.as_ref())?;
        Ok(movement)
    }

    pub fn movement(&self, movement_id: MovementId) -> EngineResult<StockMovement> {
        self.storage
            .movements()
            .get(&movement_id, ReadOptions::live())?
            .map(|v| v.value)
            .ok_or_else(|| EngineError::NotFound(format!("stock movement {movement_id}")))
    }

    /// Audit trail of one item, oldest first.
    pub fn movements(&self, item_id: ItemId) -> EngineResult<Vec<StockMovement>> {
        let mut movements: Vec<StockMovement> = self
            .storage
            .movements()
            .list(ReadOptions::live())?
            .into_iter()
            .map(|v| v.value)
            .filter(|m| m.item().item_id == item_id)
            .collect();
        movements.sort_by_key(StockMovement::transaction_date);
        Ok(movements)
    }

    /// Check that opening stock plus every COMPLETED movement folds to the
    /// materialized balance. Returns that balance.
    pub fn verify_ledger(&self, item_id: ItemId) -> EngineResult<Decimal> {
        let item = self
            .find(item_id, ReadOptions::with_deleted())?
            .ok_or_else(|| EngineError::NotFound(format!("inventory item {item_id}")))?;

        let folded = self
            .movements(item_id)?
            .iter()
            .filter(|m| m.status() == MovementStatus::Completed)
            .fold(item.opening_stock(), |acc, m| acc + m.signed_quantity());

        if folded != item.current_stock() {
            warn!(item_id = %item_id, folded = %folded, current_stock = %item.current_stock(), "ledger does not fold to the materialized balance");
            return Err(EngineError::InvariantViolation(format!(
                "item {item_id}: movements fold to {folded}, balance is {}",
                item.current_stock()
            )));
        }
        Ok(folded)
    }
}

fn balance_changes(applied: &MovementApplied) -> Vec<FieldChange> {
    [
        FieldChange::diff("current_stock", &applied.stock_before, &applied.stock_after),
        FieldChange::diff(
            "avg_cost_per_unit",
            &applied.avg_cost_before,
            &applied.avg_cost_after,
        ),
    ]
    .into_iter()
    .flatten()
    .chain(std::iter::once(FieldChange::created(
        "total_value",
        applied.total_value_after,
    )))
    .collect()
}

fn display_opt(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
