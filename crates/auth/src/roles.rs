use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles are opaque strings; the well-known ones are provided as constants
/// and mapped to permissions by [`crate::PermissionMatrix`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("ADMIN"));
    pub const STORE_KEEPER: Role = Role(Cow::Borrowed("STORE_KEEPER"));
    pub const CANTEEN_MANAGER: Role = Role(Cow::Borrowed("CANTEEN_MANAGER"));
    pub const AUDITOR: Role = Role(Cow::Borrowed("AUDITOR"));
    pub const HR: Role = Role(Cow::Borrowed("HR"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.as_str().eq_ignore_ascii_case("ADMIN")
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
