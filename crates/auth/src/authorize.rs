use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::{Action, Actor, Permission, Resource, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Static role → permission mapping.
#[derive(Debug, Clone, Default)]
pub struct PermissionMatrix {
    roles: HashMap<Role, BTreeSet<Permission>>,
}

impl PermissionMatrix {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The canteen back-office matrix.
    pub fn standard() -> Self {
        use Action::*;
        use Resource::*;

        const ALL_RESOURCES: [Resource; 8] = [
            InventoryItem,
            StockMovement,
            Reconciliation,
            EligibilityRule,
            MealSession,
            Employee,
            NumberSequence,
            AuditLog,
        ];

        let mut matrix = Self::empty();
        matrix.grant(Role::ADMIN, [Permission::WILDCARD]);

        matrix.grant(
            Role::STORE_KEEPER,
            [
                (InventoryItem, Read),
                (InventoryItem, Create),
                (InventoryItem, Update),
                (StockMovement, Read),
                (StockMovement, Create),
                (Reconciliation, Read),
                (Reconciliation, Create),
                (Reconciliation, Update),
            ]
            .map(Permission::from),
        );

        matrix.grant(Role::CANTEEN_MANAGER, ALL_RESOURCES.map(|r| Permission::of(r, Read)));
        matrix.grant(
            Role::CANTEEN_MANAGER,
            [
                (InventoryItem, Update),
                (InventoryItem, Delete),
                (StockMovement, Approve),
                (Reconciliation, Approve),
                (Reconciliation, Delete),
                (EligibilityRule, Create),
                (EligibilityRule, Update),
                (EligibilityRule, Delete),
                (MealSession, Create),
                (MealSession, Update),
            ]
            .map(Permission::from),
        );

        matrix.grant(Role::AUDITOR, ALL_RESOURCES.map(|r| Permission::of(r, Read)));

        matrix.grant(
            Role::HR,
            [
                (Employee, Read),
                (Employee, Create),
                (Employee, Update),
                (EligibilityRule, Read),
                (MealSession, Read),
            ]
            .map(Permission::from),
        );

        matrix
    }

    pub fn grant(&mut self, role: Role, permissions: impl IntoIterator<Item = Permission>) {
        self.roles.entry(role).or_default().extend(permissions);
    }

    pub fn permissions_of(&self, role: &Role) -> impl Iterator<Item = &Permission> {
        self.roles.get(role).into_iter().flatten()
    }

    fn role_allows(&self, role: &Role, required: &Permission) -> bool {
        role.is_admin()
            || self
                .permissions_of(role)
                .any(|p| p.is_wildcard() || p == required)
    }
}

/// Decide whether `actor` may perform `action` on `resource`.
///
/// - ADMIN is a wildcard
/// - explicit per-actor grants are honoured (including `"*"`)
/// - unknown roles grant nothing
pub fn can_perform(
    matrix: &PermissionMatrix,
    actor: &Actor,
    action: Action,
    resource: Resource,
) -> bool {
    let required = Permission::of(resource, action);
    actor
        .grants
        .iter()
        .any(|p| p.is_wildcard() || *p == required)
        || actor.roles.iter().any(|r| matrix.role_allows(r, &required))
}

/// [`can_perform`] as a `Result`, for `?` at the boundary.
pub fn authorize(
    matrix: &PermissionMatrix,
    actor: &Actor,
    action: Action,
    resource: Resource,
) -> Result<(), AuthzError> {
    if can_perform(matrix, actor, action, resource) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(Permission::of(resource, action).to_string()))
    }
}
