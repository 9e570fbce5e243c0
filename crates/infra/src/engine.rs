//! Wiring: one handle that owns every service over a shared store and bus.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use canteen_events::{EventBus, InMemoryEventBus};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::services::{EligibilityResolver, ReconciliationEngine, SequenceGenerator, StockLedger};
use crate::sink::EngineEnvelope;
use crate::store::{InMemoryStorage, Storage};

pub struct Engine<S, B> {
    storage: Arc<S>,
    bus: Arc<B>,
    config: Arc<EngineConfig>,
    pub ledger: StockLedger<S, B>,
    pub reconciliations: ReconciliationEngine<S, B>,
    pub eligibility: EligibilityResolver<S>,
    pub sequences: SequenceGenerator<S, B>,
}

impl<S, B> Clone for Engine<S, B> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            bus: Arc::clone(&self.bus),
            config: Arc::clone(&self.config),
            ledger: self.ledger.clone(),
            reconciliations: self.reconciliations.clone(),
            eligibility: self.eligibility.clone(),
            sequences: self.sequences.clone(),
        }
    }
}

impl<S, B> Engine<S, B>
where
    S: Storage,
    B: EventBus<EngineEnvelope>,
{
    /// Build the services and seed the configured default sequences.
    pub fn new(storage: Arc<S>, bus: Arc<B>, config: EngineConfig) -> EngineResult<Self> {
        let config = Arc::new(config);
        let sequences = SequenceGenerator::new(Arc::clone(&storage), Arc::clone(&bus));
        let seeded = sequences.ensure_defaults(&config.sequences)?;

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
            Arc::clone(&config),
        );
        let eligibility = EligibilityResolver::new(Arc::clone(&storage));

        info!(
            seeded_sequences = seeded,
            cost_scale = config.cost_scale,
            high_discrepancy_threshold_pct = %config.high_discrepancy_threshold_pct,
            "engine ready"
        );

        Ok(Self {
            storage,
            bus,
            config,
            ledger,
            reconciliations,
            eligibility,
            sequences,
        })
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

pub type InMemoryEngine = Engine<InMemoryStorage, InMemoryEventBus<EngineEnvelope>>;

/// Load configuration, install logging and start an in-memory engine.
pub fn bootstrap() -> anyhow::Result<InMemoryEngine> {
    let config = EngineConfig::load().context("loading engine configuration")?;
    canteen_observability::tracing::init(&config.log);

    Engine::new(
        Arc::new(InMemoryStorage::new()),
        Arc::new(InMemoryEventBus::new()),
        config,
    )
    .context("starting engine")
}
