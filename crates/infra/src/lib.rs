//! Engine runtime: the document store boundary, the services that own the
//! write path, configuration and the audit/notification fan-out.

pub mod config;
pub mod engine;
pub mod error;
pub mod services;
pub mod sink;
pub mod store;


pub use config::{EngineConfig, SequenceDefault};
pub use engine::{Engine, InMemoryEngine, bootstrap};
pub use error::{EngineError, EngineResult, StoreError};
pub use services::{
    ApplyResult, DiscrepancyWarning, EligibilityResolver, MovementRequest, NewItem,
    ReconciliationEngine, ReconciliationReport, SequenceGenerator, StockLedger,
};
pub use sink::{EngineEnvelope, entity};
pub use store::{DocumentStore, InMemoryStorage, ReadOptions, Storage, Versioned};
