//! Conditions reported to the notification collaborator.
//!
//! The engine only detects; fan-out to users (email, SMS, in-app) happens
//! outside.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use canteen_core::{ItemId, ReconciliationId};

use crate::Event;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An applied movement left the item at or below its reorder level.
    LowStock {
        item_id: ItemId,
        item_code: String,
        current_stock: Decimal,
        reorder_level: Decimal,
        occurred_at: DateTime<Utc>,
    },
    /// A reconciliation was verified and now waits for approval.
    ReconciliationPendingApproval {
        reconciliation_id: ReconciliationId,
        item_id: ItemId,
        occurred_at: DateTime<Utc>,
    },
    /// Non-blocking warning: the declared count deviates strongly from the
    /// system stock.
    HighDiscrepancy {
        reconciliation_id: ReconciliationId,
        item_id: ItemId,
        discrepancy_percentage: Decimal,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for Notification {
    fn event_type(&self) -> &'static str {
        match self {
            Notification::LowStock { .. } => "inventory.item.low_stock",
            Notification::ReconciliationPendingApproval { .. } => {
                "inventory.reconciliation.pending_approval"
            }
            Notification::HighDiscrepancy { .. } => "inventory.reconciliation.high_discrepancy",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Notification::LowStock { occurred_at, .. }
            | Notification::ReconciliationPendingApproval { occurred_at, .. }
            | Notification::HighDiscrepancy { occurred_at, .. } => *occurred_at,
        }
    }
}
