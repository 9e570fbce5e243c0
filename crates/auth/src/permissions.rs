use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// What an actor wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    /// Approve/reject workflows (reconciliations, pending movements).
    Approve,
    /// Administrative counter manipulation (sequence reset).
    Reset,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Reset => "reset",
        }
    }
}

/// What the action is performed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    InventoryItem,
    StockMovement,
    Reconciliation,
    EligibilityRule,
    MealSession,
    Employee,
    NumberSequence,
    AuditLog,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::InventoryItem => "inventory_item",
            Resource::StockMovement => "stock_movement",
            Resource::Reconciliation => "reconciliation",
            Resource::EligibilityRule => "eligibility_rule",
            Resource::MealSession => "meal_session",
            Resource::Employee => "employee",
            Resource::NumberSequence => "number_sequence",
            Resource::AuditLog => "audit_log",
        }
    }
}

/// Permission identifier of the form `"<resource>.<action>"`
/// (e.g. `"reconciliation.approve"`).
///
/// The wildcard permission `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn of(resource: Resource, action: Action) -> Self {
        Self(Cow::Owned(format!("{}.{}", resource.as_str(), action.as_str())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<(Resource, Action)> for Permission {
    fn from((resource, action): (Resource, Action)) -> Self {
        Self::of(resource, action)
    }
}
