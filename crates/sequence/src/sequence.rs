use core::str::FromStr;

use serde::{Deserialize, Serialize};

use canteen_core::{DomainError, DomainResult};

/// Template used when none is configured.
pub const DEFAULT_FORMAT: &str = "{prefix}-{number}";

const MIN_LENGTH: u8 = 3;
const MAX_LENGTH: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Bill,
    PurchaseOrder,
    Demand,
    Vendor,
    StockMovement,
    Reconciliation,
    Employee,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Bill => "BILL",
            EntityType::PurchaseOrder => "PURCHASE_ORDER",
            EntityType::Demand => "DEMAND",
            EntityType::Vendor => "VENDOR",
            EntityType::StockMovement => "STOCK_MOVEMENT",
            EntityType::Reconciliation => "RECONCILIATION",
            EntityType::Employee => "EMPLOYEE",
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "BILL" => EntityType::Bill,
            "PURCHASE_ORDER" => EntityType::PurchaseOrder,
            "DEMAND" => EntityType::Demand,
            "VENDOR" => EntityType::Vendor,
            "STOCK_MOVEMENT" => EntityType::StockMovement,
            "RECONCILIATION" => EntityType::Reconciliation,
            "EMPLOYEE" => EntityType::Employee,
            other => return Err(DomainError::validation(format!("unknown entity type '{other}'"))),
        })
    }
}

/// Formatting knobs; changing them only affects numbers issued afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSettings {
    pub prefix: String,
    pub length: u8,
    pub format: Option<String>,
    pub description: Option<String>,
}

/// Counter for one entity type.
///
/// `current_number` is the last number handed out; it only grows, except
/// through [`NumberSequence::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberSequence {
    entity_type: EntityType,
    prefix: String,
    length: u8,
    current_number: u64,
    format: String,
    description: Option<String>,
}

impl NumberSequence {
    pub fn new(entity_type: EntityType, settings: SequenceSettings) -> DomainResult<Self> {
        let mut seq = Self {
            entity_type,
            prefix: String::new(),
            length: MIN_LENGTH,
            current_number: 0,
            format: DEFAULT_FORMAT.to_string(),
            description: None,
        };
        seq.configure(settings)?;
        Ok(seq)
    }

    /// Start from a given last-issued number (migrating an existing book).
    pub fn starting_at(mut self, current_number: u64) -> Self {
        self.current_number = current_number;
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn current_number(&self) -> u64 {
        self.current_number
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Render `number` with the current settings. Numbers wider than
    /// `length` are printed in full, never truncated.
    pub fn render(&self, number: u64) -> String {
        let padded = format!("{:0width$}", number, width = usize::from(self.length));
        self.format
            .replace("{prefix}", &self.prefix)
            .replace("{number}", &padded)
    }

    /// What the next call to [`NumberSequence::advance`] would return.
    pub fn peek(&self) -> DomainResult<String> {
        Ok(self.render(self.next_number()?))
    }

    /// Increment and render. Callers must run this inside the store's atomic
    /// find-and-modify so concurrent callers never see the same number.
    pub fn advance(&mut self) -> DomainResult<String> {
        self.current_number = self.next_number()?;
        Ok(self.render(self.current_number))
    }

    fn next_number(&self) -> DomainResult<u64> {
        self.current_number
            .checked_add(1)
            .ok_or_else(|| DomainError::invariant(format!("{} sequence exhausted", self.entity_type)))
    }

    pub fn configure(&mut self, settings: SequenceSettings) -> DomainResult<()> {
        let prefix = settings.prefix.trim();
        if prefix.is_empty() {
            return Err(DomainError::validation("prefix cannot be empty"));
        }
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&settings.length) {
            return Err(DomainError::validation(format!(
                "length must be between {MIN_LENGTH} and {MAX_LENGTH}, got {}",
                settings.length
            )));
        }
        let format = settings.format.unwrap_or_else(|| DEFAULT_FORMAT.to_string());
        if !format.contains("{number}") {
            return Err(DomainError::validation("format must contain {number}"));
        }

        self.prefix = prefix.to_string();
        self.length = settings.length;
        self.format = format;
        if settings.description.is_some() {
            self.description = settings.description;
        }
        Ok(())
    }

    /// Rewind (or fast-forward) the counter so the next number issued is
    /// `reset_to + 1`.
    ///
    /// Does not look at numbers already issued: rewinding below them
    /// re-issues duplicates.
    pub fn reset(&mut self, reset_to: u64) {
        self.current_number = reset_to;
    }
}
