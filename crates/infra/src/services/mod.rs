//! Engine services. Each one owns a slice of the write path and talks to
//! storage only through the [`Storage`](crate::store::Storage) boundary.

mod eligibility_resolver;
mod reconciliation_engine;
mod sequence_generator;
mod stock_ledger;

pub use eligibility_resolver::EligibilityResolver;
pub use reconciliation_engine::{DiscrepancyWarning, ReconciliationEngine, ReconciliationReport};
pub use sequence_generator::SequenceGenerator;
pub use stock_ledger::{ApplyResult, MovementRequest, NewItem, StockLedger};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use canteen_core::ItemId;
    use canteen_events::{EngineEvent, InMemoryEventBus, Notification, Subscription};

    use super::*;
    use crate::config::EngineConfig;
    use crate::sink::EngineEnvelope;
    use crate::store::InMemoryStorage;

    pub(crate) type TestBus = InMemoryEventBus<EngineEnvelope>;

    pub(crate) struct Fixture {
        pub bus: Arc<TestBus>,
        pub sequences: SequenceGenerator<InMemoryStorage, TestBus>,
        pub ledger: StockLedger<InMemoryStorage, TestBus>,
        pub reconciliations: ReconciliationEngine<InMemoryStorage, TestBus>,
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(EngineConfig::default())
    }

    pub(crate) fn fixture_with(config: EngineConfig) -> Fixture {
        let storage = Arc::new(InMemoryStorage::new());
        let bus = Arc::new(TestBus::new());
        let config = Arc::new(config);
        let sequences = SequenceGenerator::new(Arc::clone(&storage), Arc::clone(&bus));
        sequences.ensure_defaults(&config.sequences).unwrap();
        let ledger = StockLedger::new(
            Arc::clone(&storage),
            Arc::clone(&bus),
            sequences.clone(),
            Arc::clone(&config),
        );
        let reconciliations = ReconciliationEngine::new(
            Arc::clone(&storage),
            Arc::clone(&bus),
            ledger.clone(),
            sequences.clone(),
            config,
        );
        Fixture {
            bus,
            sequences,
            ledger,
            reconciliations,
        }
    }

    impl Fixture {
        /// Rice, 100 kg at 8 per kg, reorder at 20.
        pub fn rice(&self) -> ItemId {
            self.item("RICE", Decimal::from(100), Decimal::from(8), Decimal::from(20))
        }

        pub fn item(&self, code: &str, opening: Decimal, cost: Decimal, reorder: Decimal) -> ItemId {
            self.ledger
                .create_item(
                    NewItem {
                        code: code.to_string(),
                        name: code.to_lowercase(),
                        unit: "kg".to_string(),
                        reorder_level: reorder,
                        opening_stock: opening,
                        opening_cost: cost,
                    },
                    None,
                )
                .unwrap()
                .id_typed()
        }

        pub fn stock(&self, item_id: ItemId) -> Decimal {
            self.ledger.snapshot(item_id).unwrap().current_stock
        }
    }

    pub(crate) fn notifications(sub: &Subscription<EngineEnvelope>) -> Vec<Notification> {
        sub.drain()
            .into_iter()
            .filter_map(|m| match m.into_payload() {
                EngineEvent::Notification(n) => Some(n),
                _ => None,
            })
            .collect()
    }
}
