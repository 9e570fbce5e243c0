//! Document store boundary.
//!
//! The engine needs exactly three primitives from its backing store:
//! versioned reads, insert-if-absent and a conditional write (compare the
//! stored version, then replace). [`DocumentStore::find_and_modify`] is the
//! atomic read-modify-write used for counters and single-document updates.
//!
//! Soft-deleted documents are hidden from reads unless
//! [`ReadOptions::include_deleted`] is set.

mod in_memory;

use std::sync::Arc;

use chrono::NaiveDate;

use canteen_core::{EmployeeId, ExpectedVersion, ItemId, MealSessionId, MovementId, ReconciliationId, RuleId};
use canteen_eligibility::{EligibilityRule, EmployeeProfile, MealSession, OvertimeApproval};
use canteen_inventory::{InventoryItem, Reconciliation, StockMovement};
use canteen_sequence::{EntityType, NumberSequence};

use crate::error::StoreError;

pub use in_memory::{InMemoryDocumentStore, InMemoryStorage};

/// Anything kept in a [`DocumentStore`].
pub trait Document: Clone + Send + Sync + 'static {
    fn is_deleted(&self) -> bool {
        false
    }
}

/// A document together with the store version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<V> {
    pub version: u64,
    pub value: V,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub include_deleted: bool,
}

impl ReadOptions {
    /// Default filter: live documents only.
    pub fn live() -> Self {
        Self::default()
    }

    pub fn with_deleted() -> Self {
        Self {
            include_deleted: true,
        }
    }

    pub(crate) fn admits<V: Document>(self, value: &V) -> bool {
        self.include_deleted || !value.is_deleted()
    }
}

/// Keyed collection with optimistic concurrency.
///
/// Versions start at 1 on insert and grow by one on every successful write.
pub trait DocumentStore<K, V>: Send + Sync {
    fn get(&self, key: &K, opts: ReadOptions) -> Result<Option<Versioned<V>>, StoreError>;

    /// Insert a new document; `Duplicate` if the key is taken.
    fn insert(&self, key: K, value: V) -> Result<u64, StoreError>;

    /// Replace the document only if its version still matches `expected`
    /// (`Absent` = must not exist yet). Returns the new version.
    fn compare_and_swap(
        &self,
        key: &K,
        expected: ExpectedVersion,
        value: V,
    ) -> Result<u64, StoreError>;

    /// All documents admitted by `opts`, in insertion order.
    fn list(&self, opts: ReadOptions) -> Result<Vec<Versioned<V>>, StoreError>;

    /// Atomically run `f` on a copy of a live document and store the copy
    /// only if `f` succeeds. No other writer can interleave.
    fn find_and_modify<R, E, F>(&self, key: &K, f: F) -> Result<Versioned<R>, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut V) -> Result<R, E>;
}

impl<K, V, S> DocumentStore<K, V> for Arc<S>
where
    S: DocumentStore<K, V> + ?Sized,
{
    fn get(&self, key: &K, opts: ReadOptions) -> Result<Option<Versioned<V>>, StoreError> {
        (**self).get(key, opts)
    }

    fn insert(&self, key: K, value: V) -> Result<u64, StoreError> {
        (**self).insert(key, value)
    }

    fn compare_and_swap(
        &self,
        key: &K,
        expected: ExpectedVersion,
        value: V,
    ) -> Result<u64, StoreError> {
        (**self).compare_and_swap(key, expected, value)
    }

    fn list(&self, opts: ReadOptions) -> Result<Vec<Versioned<V>>, StoreError> {
        (**self).list(opts)
    }

    fn find_and_modify<R, E, F>(&self, key: &K, f: F) -> Result<Versioned<R>, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut V) -> Result<R, E>,
    {
        (**self).find_and_modify(key, f)
    }
}

impl Document for InventoryItem {
    fn is_deleted(&self) -> bool {
        InventoryItem::is_deleted(self)
    }
}

impl Document for Reconciliation {
    fn is_deleted(&self) -> bool {
        Reconciliation::is_deleted(self)
    }
}

impl Document for StockMovement {}
impl Document for EligibilityRule {}
impl Document for EmployeeProfile {}
impl Document for MealSession {}
impl Document for OvertimeApproval {}
impl Document for NumberSequence {}
impl Document for ItemId {}

/// The collections the engine works on.
pub trait Storage: Send + Sync + 'static {
    type Items: DocumentStore<ItemId, InventoryItem>;
    /// Unique index over item codes.
    type ItemCodes: DocumentStore<String, ItemId>;
    type Movements: DocumentStore<MovementId, StockMovement>;
    type Reconciliations: DocumentStore<ReconciliationId, Reconciliation>;
    type Rules: DocumentStore<RuleId, EligibilityRule>;
    type Employees: DocumentStore<EmployeeId, EmployeeProfile>;
    type MealSessions: DocumentStore<MealSessionId, MealSession>;
    type Overtime: DocumentStore<(EmployeeId, NaiveDate), OvertimeApproval>;
    type Sequences: DocumentStore<EntityType, NumberSequence>;

    fn items(&self) -> &Self::Items;
    fn item_codes(&self) -> &Self::ItemCodes;
    fn movements(&self) -> &Self::Movements;
    fn reconciliations(&self) -> &Self::Reconciliations;
    fn rules(&self) -> &Self::Rules;
    fn employees(&self) -> &Self::Employees;
    fn meal_sessions(&self) -> &Self::MealSessions;
    fn overtime(&self) -> &Self::Overtime;
    fn sequences(&self) -> &Self::Sequences;
}
