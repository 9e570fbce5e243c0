//! Engine configuration.
//!
//! Sources, later ones winning: built-in defaults, `config/default.*`,
//! `config/{RUN_ENV}.*`, then `CANTEEN__*` environment variables
//! (`CANTEEN__COST_SCALE=3`, `CANTEEN__LOG__FORMAT=pretty`).

use std::env;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use canteen_observability::LogSettings;
use canteen_sequence::{EntityType, SequenceSettings};

pub const ENV_PREFIX: &str = "CANTEEN";
const CONFIG_DIR: &str = "config";
const DEFAULT_RUN_ENV: &str = "development";
const MAX_COST_SCALE: u32 = 12;

/// A sequence created at start-up when it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SequenceDefault {
    pub entity_type: EntityType,
    pub prefix: String,
    pub length: u8,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SequenceDefault {
    fn new(entity_type: EntityType, prefix: &str, length: u8, description: &str) -> Self {
        Self {
            entity_type,
            prefix: prefix.to_string(),
            length,
            format: None,
            description: Some(description.to_string()),
        }
    }

    pub fn settings(&self) -> SequenceSettings {
        SequenceSettings {
            prefix: self.prefix.clone(),
            length: self.length,
            format: self.format.clone(),
            description: self.description.clone(),
        }
    }
}

fn default_sequences() -> Vec<SequenceDefault> {
    vec![
        SequenceDefault::new(EntityType::Bill, "BILL", 6, "Canteen bills"),
        SequenceDefault::new(EntityType::PurchaseOrder, "PO", 6, "Purchase orders"),
        SequenceDefault::new(EntityType::Demand, "DEM", 5, "Store demands"),
        SequenceDefault::new(EntityType::Vendor, "VEN", 4, "Vendor codes"),
        SequenceDefault::new(EntityType::StockMovement, "MOV", 6, "Stock movements"),
        SequenceDefault::new(EntityType::Reconciliation, "REC", 5, "Stock reconciliations"),
        SequenceDefault::new(EntityType::Employee, "EMP", 5, "Employee codes"),
    ]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// `|discrepancy %|` above which a reconciliation is flagged.
    pub high_discrepancy_threshold_pct: Decimal,
    /// Decimal places kept for average cost and total value.
    pub cost_scale: u32,
    pub notify_low_stock: bool,
    #[serde(default = "default_sequences")]
    pub sequences: Vec<SequenceDefault>,
    #[serde(default)]
    pub log: LogSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_discrepancy_threshold_pct: Decimal::TEN,
            cost_scale: canteen_inventory::DEFAULT_COST_SCALE,
            notify_low_stock: true,
            sequences: default_sequences(),
            log: LogSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load from files and the environment (`RUN_ENV` picks the overlay file).
    pub fn load() -> Result<Self, ConfigError> {
        let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_RUN_ENV.to_string());

        let builder = Self::defaults()?
            .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
            .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        Self::from_builder(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("high_discrepancy_threshold_pct", "10")?
            .set_default("cost_scale", i64::from(canteen_inventory::DEFAULT_COST_SCALE))?
            .set_default("notify_low_stock", true)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.high_discrepancy_threshold_pct < Decimal::ZERO {
            return Err(ConfigError::Message(
                "high_discrepancy_threshold_pct cannot be negative".to_string(),
            ));
        }
        if self.cost_scale > MAX_COST_SCALE {
            return Err(ConfigError::Message(format!(
                "cost_scale must be at most {MAX_COST_SCALE}, got {}",
                self.cost_scale
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::from_builder(EngineConfig::defaults().unwrap()).unwrap();
        assert_eq!(cfg.high_discrepancy_threshold_pct, dec!(10));
        assert_eq!(cfg.cost_scale, 2);
        assert!(cfg.notify_low_stock);
        assert_eq!(cfg.sequences, default_sequences());
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn overrides_win_over_defaults() {
        let builder = EngineConfig::defaults()
            .unwrap()
            .set_override("cost_scale", 4)
            .unwrap()
            .set_override("high_discrepancy_threshold_pct", "12.5")
            .unwrap();
        let cfg = EngineConfig::from_builder(builder).unwrap();
        assert_eq!(cfg.cost_scale, 4);
        assert_eq!(cfg.high_discrepancy_threshold_pct, dec!(12.5));
    }

    #[test]
    fn absurd_cost_scale_is_rejected() {
        let builder = EngineConfig::defaults()
            .unwrap()
            .set_override("cost_scale", 30)
            .unwrap();
        assert!(EngineConfig::from_builder(builder).is_err());
    }
}
