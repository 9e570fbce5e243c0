use serde::{Deserialize, Serialize};

use canteen_core::UserId;

use crate::{Permission, Role};

/// An already-authenticated user as seen by the permission gate.
///
/// `grants` are per-actor permissions on top of whatever the roles give.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub grants: Vec<Permission>,
}

impl Actor {
    pub fn new(user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
            grants: Vec::new(),
        }
    }

    pub fn with_grant(mut self, permission: impl Into<Permission>) -> Self {
        self.grants.push(permission.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}
