use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use chrono::NaiveDate;

use canteen_core::{EmployeeId, ExpectedVersion, ItemId, MealSessionId, MovementId, ReconciliationId, RuleId};
use canteen_eligibility::{EligibilityRule, EmployeeProfile, MealSession, OvertimeApproval};
use canteen_inventory::{InventoryItem, Reconciliation, StockMovement};
use canteen_sequence::{EntityType, NumberSequence};

use super::{Document, DocumentStore, ReadOptions, Storage, Versioned};
use crate::error::StoreError;

#[derive(Debug)]
struct Slot<V> {
    /// Insertion order, for stable listing.
    position: u64,
    version: u64,
    value: V,
}

#[derive(Debug)]
struct Collection<K, V> {
    next_position: u64,
    docs: HashMap<K, Slot<V>>,
}

impl<K, V> Default for Collection<K, V> {
    fn default() -> Self {
        Self {
            next_position: 0,
            docs: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Collection<K, V> {
    fn put_new(&mut self, key: K, value: V) -> u64 {
        let position = self.next_position;
        self.next_position += 1;
        self.docs.insert(
            key,
            Slot {
                position,
                version: 1,
                value,
            },
        );
        1
    }
}

/// In-memory document collection.
///
/// Intended for tests/dev. One lock per collection; a write holds it for
/// the whole read-compare-write.
#[derive(Debug)]
pub struct InMemoryDocumentStore<K, V> {
    inner: RwLock<Collection<K, V>>,
}

impl<K, V> InMemoryDocumentStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Collection::default()),
        }
    }
}

impl<K, V> Default for InMemoryDocumentStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> DocumentStore<K, V> for InMemoryDocumentStore<K, V>
where
    K: Clone + Eq + Hash + core::fmt::Debug + Send + Sync + 'static,
    V: Document,
{
    fn get(&self, key: &K, opts: ReadOptions) -> Result<Option<Versioned<V>>, StoreError> {
        let coll = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(coll
            .docs
            .get(key)
            .filter(|slot| opts.admits(&slot.value))
            .map(|slot| Versioned {
                version: slot.version,
                value: slot.value.clone(),
            }))
    }

    fn insert(&self, key: K, value: V) -> Result<u64, StoreError> {
        let mut coll = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if coll.docs.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("{key:?}")));
        }
        Ok(coll.put_new(key, value))
    }

    fn compare_and_swap(
        &self,
        key: &K,
        expected: ExpectedVersion,
        value: V,
    ) -> Result<u64, StoreError> {
        let mut coll = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let current = coll.docs.get(key).map(|slot| slot.version);

        expected
            .check(current)
            .map_err(|e| StoreError::Concurrency(format!("{key:?}: {e}")))?;

        match coll.docs.get_mut(key) {
            Some(slot) => {
                slot.version += 1;
                slot.value = value;
                Ok(slot.version)
            }
            None => Ok(coll.put_new(key.clone(), value)),
        }
    }

    fn list(&self, opts: ReadOptions) -> Result<Vec<Versioned<V>>, StoreError> {
        let coll = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut slots: Vec<&Slot<V>> = coll
            .docs
            .values()
            .filter(|slot| opts.admits(&slot.value))
            .collect();
        slots.sort_by_key(|slot| slot.position);

        Ok(slots
            .into_iter()
            .map(|slot| Versioned {
                version: slot.version,
                value: slot.value.clone(),
            })
            .collect())
    }

    fn find_and_modify<R, E, F>(&self, key: &K, f: F) -> Result<Versioned<R>, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut V) -> Result<R, E>,
    {
        let mut coll = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let slot = coll
            .docs
            .get_mut(key)
            .filter(|slot| !slot.value.is_deleted())
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;

        let mut draft = slot.value.clone();
        let out = f(&mut draft)?;
        slot.value = draft;
        slot.version += 1;

        Ok(Versioned {
            version: slot.version,
            value: out,
        })
    }
}

/// Every collection in memory.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: InMemoryDocumentStore<ItemId, InventoryItem>,
    item_codes: InMemoryDocumentStore<String, ItemId>,
    movements: InMemoryDocumentStore<MovementId, StockMovement>,
    reconciliations: InMemoryDocumentStore<ReconciliationId, Reconciliation>,
    rules: InMemoryDocumentStore<RuleId, EligibilityRule>,
    employees: InMemoryDocumentStore<EmployeeId, EmployeeProfile>,
    meal_sessions: InMemoryDocumentStore<MealSessionId, MealSession>,
    overtime: InMemoryDocumentStore<(EmployeeId, NaiveDate), OvertimeApproval>,
    sequences: InMemoryDocumentStore<EntityType, NumberSequence>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    type Items = InMemoryDocumentStore<ItemId, InventoryItem>;
    type ItemCodes = InMemoryDocumentStore<String, ItemId>;
    type Movements = InMemoryDocumentStore<MovementId, StockMovement>;
    type Reconciliations = InMemoryDocumentStore<ReconciliationId, Reconciliation>;
    type Rules = InMemoryDocumentStore<RuleId, EligibilityRule>;
    type Employees = InMemoryDocumentStore<EmployeeId, EmployeeProfile>;
    type MealSessions = InMemoryDocumentStore<MealSessionId, MealSession>;
    type Overtime = InMemoryDocumentStore<(EmployeeId, NaiveDate), OvertimeApproval>;
    type Sequences = InMemoryDocumentStore<EntityType, NumberSequence>;

    fn items(&self) -> &Self::Items {
        &self.items
    }

    fn item_codes(&self) -> &Self::ItemCodes {
        &self.item_codes
    }

    fn movements(&self) -> &Self::Movements {
        &self.movements
    }

    fn reconciliations(&self) -> &Self::Reconciliations {
        &self.reconciliations
    }

    fn rules(&self) -> &Self::Rules {
        &self.rules
    }

    fn employees(&self) -> &Self::Employees {
        &self.employees
    }

    fn meal_sessions(&self) -> &Self::MealSessions {
        &self.meal_sessions
    }

    fn overtime(&self) -> &Self::Overtime {
        &self.overtime
    }

    fn sequences(&self) -> &Self::Sequences {
        &self.sequences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        n: i32,
        deleted: bool,
    }

    impl Document for Doc {
        fn is_deleted(&self) -> bool {
            self.deleted
        }
    }

    fn doc(n: i32) -> Doc {
        Doc { n, deleted: false }
    }

    #[test]
    fn insert_rejects_duplicates() {
        let store = InMemoryDocumentStore::<u32, Doc>::new();
        assert_eq!(store.insert(1, doc(1)).unwrap(), 1);
        assert!(matches!(store.insert(1, doc(2)), Err(StoreError::Duplicate(_))));
        assert_eq!(store.get(&1, ReadOptions::live()).unwrap().unwrap().value, doc(1));
    }

    #[test]
    fn compare_and_swap_detects_stale_versions() {
        let store = InMemoryDocumentStore::<u32, Doc>::new();
        store.compare_and_swap(&7, ExpectedVersion::Absent, doc(1)).unwrap();
        assert_eq!(
            store.compare_and_swap(&7, ExpectedVersion::Exact(1), doc(2)).unwrap(),
            2
        );

        let err = store
            .compare_and_swap(&7, ExpectedVersion::Exact(1), doc(3))
            .unwrap_err();
        match err {
            StoreError::Concurrency(msg) => {
                assert!(msg.contains("Exact(1)"), "{msg}");
                assert!(msg.contains("Some(2)"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get(&7, ReadOptions::live()).unwrap().unwrap().value, doc(2));

        let err = store
            .compare_and_swap(&8, ExpectedVersion::Exact(1), doc(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn deleted_documents_are_hidden_by_default() {
        let store = InMemoryDocumentStore::<u32, Doc>::new();
        store.insert(1, doc(1)).unwrap();
        store
            .insert(
                2,
                Doc {
                    n: 2,
                    deleted: true,
                },
            )
            .unwrap();

        assert!(store.get(&2, ReadOptions::live()).unwrap().is_none());
        assert!(store.get(&2, ReadOptions::with_deleted()).unwrap().is_some());
        assert_eq!(store.list(ReadOptions::live()).unwrap().len(), 1);
        assert_eq!(store.list(ReadOptions::with_deleted()).unwrap().len(), 2);
    }

    #[test]
    fn list_keeps_insertion_order() {
        let store = InMemoryDocumentStore::<u32, Doc>::new();
        for k in [30, 10, 20] {
            store.insert(k, doc(k as i32)).unwrap();
        }
        let ns: Vec<i32> = store
            .list(ReadOptions::live())
            .unwrap()
            .into_iter()
            .map(|v| v.value.n)
            .collect();
        assert_eq!(ns, vec![30, 10, 20]);
    }

    #[test]
    fn find_and_modify_discards_failed_drafts() {
        let store = InMemoryDocumentStore::<u32, Doc>::new();
        store.insert(1, doc(1)).unwrap();

        let res: Result<Versioned<()>, StoreError> = store.find_and_modify(&1, |d| {
            d.n = 99;
            Err(StoreError::Concurrency("nope".to_string()))
        });
        assert!(res.is_err());
        let current = store.get(&1, ReadOptions::live()).unwrap().unwrap();
        assert_eq!((current.version, current.value.n), (1, 1));

        let res: Result<Versioned<i32>, StoreError> = store.find_and_modify(&1, |d| {
            d.n += 1;
            Ok(d.n)
        });
        assert_eq!(res.unwrap(), Versioned { version: 2, value: 2 });
    }

    #[test]
    fn find_and_modify_serializes_writers() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryDocumentStore::<u32, Doc>::new());
        store.insert(1, doc(0)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _: Versioned<()> = store
                            .find_and_modify(&1, |d| {
                                d.n += 1;
                                Ok::<_, StoreError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let current = store.get(&1, ReadOptions::live()).unwrap().unwrap();
        assert_eq!(current.value.n, 800);
        assert_eq!(current.version, 801);
    }
}
