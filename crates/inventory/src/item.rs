use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use canteen_core::{Aggregate, AggregateRoot, DomainError, ItemId, MovementId};
use canteen_events::Event;

use crate::decimal::round_money;
use crate::movement::{Direction, ItemSnapshot, MovementType};

/// Aggregate root: InventoryItem.
///
/// `current_stock` is the materialized running balance; the movement log is
/// the audit trail and must fold to the same number. `total_value` is
/// derived and only ever recomputed inside `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: ItemId,
    code: String,
    name: String,
    unit: String,
    opening_stock: Decimal,
    current_stock: Decimal,
    reorder_level: Decimal,
    avg_cost_per_unit: Decimal,
    total_value: Decimal,
    is_deleted: bool,
    version: u64,
    created: bool,
}

/// Read-only view of an item's balance and valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub current_stock: Decimal,
    pub avg_cost_per_unit: Decimal,
    pub total_value: Decimal,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            code: String::new(),
            name: String::new(),
            unit: String::new(),
            opening_stock: Decimal::ZERO,
            current_stock: Decimal::ZERO,
            reorder_level: Decimal::ZERO,
            avg_cost_per_unit: Decimal::ZERO,
            total_value: Decimal::ZERO,
            is_deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn opening_stock(&self) -> Decimal {
        self.opening_stock
    }

    pub fn current_stock(&self) -> Decimal {
        self.current_stock
    }

    pub fn reorder_level(&self) -> Decimal {
        self.reorder_level
    }

    pub fn avg_cost_per_unit(&self) -> Decimal {
        self.avg_cost_per_unit
    }

    pub fn total_value(&self) -> Decimal {
        self.total_value
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_level
    }

    pub fn snapshot(&self) -> StockSnapshot {
        StockSnapshot {
            current_stock: self.current_stock,
            avg_cost_per_unit: self.avg_cost_per_unit,
            total_value: self.total_value,
        }
    }

    /// Identity copy embedded into movements and reconciliations.
    pub fn item_snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            item_id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            unit: self.unit.clone(),
        }
    }
}

impl AggregateRoot for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub item_id: ItemId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub reorder_level: Decimal,
    pub opening_stock: Decimal,
    pub opening_cost: Decimal,
    pub cost_scale: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyMovement.
///
/// `direction` must already be resolved from the movement type (see
/// [`MovementType::resolve_direction`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyMovement {
    pub item_id: ItemId,
    pub movement_id: MovementId,
    pub movement_type: MovementType,
    pub direction: Direction,
    pub quantity: Decimal,
    pub cost_per_unit: Option<Decimal>,
    pub cost_scale: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeReorderLevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReorderLevel {
    pub item_id: ItemId,
    pub reorder_level: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteItem {
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    ApplyMovement(ApplyMovement),
    ChangeReorderLevel(ChangeReorderLevel),
    SoftDeleteItem(SoftDeleteItem),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: ItemId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub reorder_level: Decimal,
    pub opening_stock: Decimal,
    pub avg_cost_per_unit: Decimal,
    pub total_value: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementApplied.
///
/// Carries both sides of the balance so the movement record can freeze
/// them as its audit snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementApplied {
    pub item_id: ItemId,
    pub movement_id: MovementId,
    pub movement_type: MovementType,
    pub direction: Direction,
    pub quantity: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub avg_cost_before: Decimal,
    pub avg_cost_after: Decimal,
    pub total_value_after: Decimal,
    pub total_cost: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReorderLevelChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderLevelChanged {
    pub item_id: ItemId,
    pub old_level: Decimal,
    pub new_level: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeleted {
    pub item_id: ItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    MovementApplied(MovementApplied),
    ReorderLevelChanged(ReorderLevelChanged),
    ItemDeleted(ItemDeleted),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::MovementApplied(_) => "inventory.item.movement_applied",
            InventoryEvent::ReorderLevelChanged(_) => "inventory.item.reorder_level_changed",
            InventoryEvent::ItemDeleted(_) => "inventory.item.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::MovementApplied(e) => e.occurred_at,
            InventoryEvent::ReorderLevelChanged(e) => e.occurred_at,
            InventoryEvent::ItemDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.reorder_level = e.reorder_level;
                self.opening_stock = e.opening_stock;
                self.current_stock = e.opening_stock;
                self.avg_cost_per_unit = e.avg_cost_per_unit;
                self.total_value = e.total_value;
                self.created = true;
            }
            InventoryEvent::MovementApplied(e) => {
                self.current_stock = e.stock_after;
                self.avg_cost_per_unit = e.avg_cost_after;
                self.total_value = e.total_value_after;
            }
            InventoryEvent::ReorderLevelChanged(e) => {
                self.reorder_level = e.new_level;
            }
            InventoryEvent::ItemDeleted(_) => {
                self.is_deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::ApplyMovement(cmd) => self.handle_apply(cmd),
            InventoryCommand::ChangeReorderLevel(cmd) => self.handle_reorder_level(cmd),
            InventoryCommand::SoftDeleteItem(cmd) => self.handle_delete(cmd),
        }
    }
}

/// `(old_stock × old_avg + qty × cost) / (old_stock + qty)`, rounded.
///
/// A zero denominator keeps the previous average.
fn weighted_average(
    old_stock: Decimal,
    old_avg: Decimal,
    quantity: Decimal,
    cost: Decimal,
    scale: u32,
) -> Decimal {
    let denominator = old_stock + quantity;
    if denominator.is_zero() {
        return old_avg;
    }
    round_money((old_stock * old_avg + quantity * cost) / denominator, scale)
}

impl InventoryItem {
    fn ensure_live(&self, item_id: ItemId) -> Result<(), DomainError> {
        if !self.created || self.is_deleted {
            return Err(DomainError::not_found(format!("inventory item {item_id}")));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("item code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.opening_stock < Decimal::ZERO {
            return Err(DomainError::validation("opening stock cannot be negative"));
        }
        if cmd.opening_cost < Decimal::ZERO {
            return Err(DomainError::validation("opening cost cannot be negative"));
        }
        if cmd.reorder_level < Decimal::ZERO {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }

        let avg = round_money(cmd.opening_cost, cmd.cost_scale);
        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            item_id: cmd.item_id,
            code: cmd.code.trim().to_string(),
            name: cmd.name.trim().to_string(),
            unit: cmd.unit.clone(),
            reorder_level: cmd.reorder_level,
            opening_stock: cmd.opening_stock,
            avg_cost_per_unit: avg,
            total_value: round_money(cmd.opening_stock * avg, cmd.cost_scale),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply(&self, cmd: &ApplyMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live(cmd.item_id)?;

        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.cost_per_unit.is_some_and(|c| c < Decimal::ZERO) {
            return Err(DomainError::validation("cost per unit cannot be negative"));
        }
        // Re-check against the type so a forged direction cannot slip through.
        let direction = cmd.movement_type.resolve_direction(Some(cmd.direction))?;

        let stock_before = self.current_stock;
        let stock_after = stock_before + direction.signed(cmd.quantity);
        if stock_after < Decimal::ZERO {
            return Err(DomainError::insufficient_stock(stock_before, cmd.quantity));
        }

        let avg_cost_after = match (cmd.movement_type, cmd.cost_per_unit) {
            (MovementType::In, Some(cost)) => weighted_average(
                stock_before,
                self.avg_cost_per_unit,
                cmd.quantity,
                cost,
                cmd.cost_scale,
            ),
            _ => self.avg_cost_per_unit,
        };
        let unit_cost = cmd.cost_per_unit.unwrap_or(avg_cost_after);

        Ok(vec![InventoryEvent::MovementApplied(MovementApplied {
            item_id: cmd.item_id,
            movement_id: cmd.movement_id,
            movement_type: cmd.movement_type,
            direction,
            quantity: cmd.quantity,
            stock_before,
            stock_after,
            avg_cost_before: self.avg_cost_per_unit,
            avg_cost_after,
            total_value_after: round_money(stock_after * avg_cost_after, cmd.cost_scale),
            total_cost: round_money(cmd.quantity * unit_cost, cmd.cost_scale),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reorder_level(
        &self,
        cmd: &ChangeReorderLevel,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live(cmd.item_id)?;
        if cmd.reorder_level < Decimal::ZERO {
            return Err(DomainError::validation("reorder level cannot be negative"));
        }
        if cmd.reorder_level == self.reorder_level {
            return Ok(vec![]);
        }
        Ok(vec![InventoryEvent::ReorderLevelChanged(ReorderLevelChanged {
            item_id: cmd.item_id,
            old_level: self.reorder_level,
            new_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &SoftDeleteItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live(cmd.item_id)?;
        Ok(vec![InventoryEvent::ItemDeleted(ItemDeleted {
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::DEFAULT_COST_SCALE;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn created_item(opening_stock: Decimal, opening_cost: Decimal) -> InventoryItem {
        let id = ItemId::new();
        let mut item = InventoryItem::empty(id);
        item.execute(&InventoryCommand::CreateItem(CreateItem {
            item_id: id,
            code: "DAL-01".to_string(),
            name: "Toor dal".to_string(),
            unit: "kg".to_string(),
            reorder_level: dec!(20),
            opening_stock,
            opening_cost,
            cost_scale: DEFAULT_COST_SCALE,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        item
    }

    fn movement(
        item: &InventoryItem,
        movement_type: MovementType,
        direction: Direction,
        quantity: Decimal,
        cost_per_unit: Option<Decimal>,
    ) -> InventoryCommand {
        InventoryCommand::ApplyMovement(ApplyMovement {
            item_id: item.id_typed(),
            movement_id: MovementId::new(),
            movement_type,
            direction,
            quantity,
            cost_per_unit,
            cost_scale: DEFAULT_COST_SCALE,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn in_movement_recomputes_weighted_average_and_value() {
        let mut item = created_item(dec!(100), dec!(8));
        let cmd = movement(&item, MovementType::In, Direction::Increase, dec!(50), Some(dec!(10)));

        let events = item.execute(&cmd).unwrap();

        match &events[0] {
            InventoryEvent::MovementApplied(e) => {
                assert_eq!(e.stock_before, dec!(100));
                assert_eq!(e.stock_after, dec!(150));
                assert_eq!(e.total_cost, dec!(500));
            }
            other => panic!("expected MovementApplied, got {other:?}"),
        }
        assert_eq!(item.current_stock(), dec!(150));
        assert_eq!(item.avg_cost_per_unit(), dec!(8.67));
        assert_eq!(item.total_value(), dec!(1300.5));
    }

    #[test]
    fn out_beyond_stock_is_rejected_without_state_change() {
        let mut item = created_item(dec!(150), dec!(8));
        let before = item.clone();
        let cmd = movement(&item, MovementType::Out, Direction::Decrease, dec!(200), None);

        let err = item.execute(&cmd).unwrap_err();

        assert_eq!(err, DomainError::insufficient_stock(dec!(150), dec!(200)));
        assert_eq!(item, before);
    }

    #[test]
    fn out_keeps_average_cost() {
        let mut item = created_item(dec!(40), dec!(12.5));
        let cmd = movement(&item, MovementType::Out, Direction::Decrease, dec!(10), None);
        item.execute(&cmd).unwrap();

        assert_eq!(item.current_stock(), dec!(30));
        assert_eq!(item.avg_cost_per_unit(), dec!(12.5));
        assert_eq!(item.total_value(), dec!(375));
    }

    #[test]
    fn first_receipt_into_empty_item_takes_its_cost() {
        let mut item = created_item(dec!(0), dec!(0));
        let cmd = movement(&item, MovementType::In, Direction::Increase, dec!(3), Some(dec!(7.25)));
        item.execute(&cmd).unwrap();

        assert_eq!(item.avg_cost_per_unit(), dec!(7.25));
        assert_eq!(item.total_value(), dec!(21.75));
    }

    #[test]
    fn forged_direction_is_rejected() {
        let item = created_item(dec!(10), dec!(1));
        let cmd = movement(&item, MovementType::Out, Direction::Increase, dec!(1), None);
        assert!(matches!(item.handle(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn deleted_item_rejects_movements() {
        let mut item = created_item(dec!(10), dec!(1));
        item.execute(&InventoryCommand::SoftDeleteItem(SoftDeleteItem {
            item_id: item.id_typed(),
            occurred_at: Utc::now(),
        }))
        .unwrap();

        let cmd = movement(&item, MovementType::In, Direction::Increase, dec!(1), None);
        assert!(matches!(item.handle(&cmd), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn low_stock_is_inclusive_of_reorder_level() {
        let mut item = created_item(dec!(25), dec!(1));
        assert!(!item.is_low_stock());
        let cmd = movement(&item, MovementType::Out, Direction::Decrease, dec!(5), None);
        item.execute(&cmd).unwrap();
        assert!(item.is_low_stock());
    }

    #[derive(Debug, Clone)]
    struct Step {
        movement_type: MovementType,
        direction: Direction,
        quantity: Decimal,
        cost: Option<Decimal>,
    }

    fn step() -> impl Strategy<Value = Step> {
        (0usize..5, any::<bool>(), 1i64..500, proptest::option::of(0i64..5_000)).prop_map(
            |(kind, up, qty, cost)| {
                let movement_type = [
                    MovementType::In,
                    MovementType::Out,
                    MovementType::Adjustment,
                    MovementType::Transfer,
                    MovementType::Return,
                ][kind];
                let direction = movement_type.fixed_direction().unwrap_or(if up {
                    Direction::Increase
                } else {
                    Direction::Decrease
                });
                Step {
                    movement_type,
                    direction,
                    quantity: Decimal::from(qty),
                    cost: cost.map(|c| Decimal::new(c, 2)),
                }
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Stock equals the opening balance plus every accepted delta, and
        /// never goes negative.
        #[test]
        fn stock_is_conserved(
            opening in 0i64..1_000,
            steps in prop::collection::vec(step(), 1..40)
        ) {
            let mut item = created_item(Decimal::from(opening), dec!(5));
            let mut expected = Decimal::from(opening);

            for s in steps {
                let before = item.clone();
                let cmd = movement(&item, s.movement_type, s.direction, s.quantity, s.cost);
                match item.execute(&cmd) {
                    Ok(_) => expected += s.direction.signed(s.quantity),
                    Err(DomainError::InsufficientStock { .. }) => prop_assert_eq!(&item, &before),
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
                prop_assert!(item.current_stock() >= Decimal::ZERO);
                prop_assert_eq!(item.current_stock(), expected);
                prop_assert_eq!(
                    item.total_value(),
                    round_money(item.current_stock() * item.avg_cost_per_unit(), DEFAULT_COST_SCALE)
                );
            }
        }
    }
}
