//! `canteen-auth`: pure role/permission gate evaluated at the API boundary.
//!
//! No IO and no storage: callers resolve an [`Actor`] from whatever
//! transport they use and ask [`can_perform`] before invoking the engine.

pub mod actor;
pub mod authorize;
pub mod permissions;
pub mod roles;

pub use actor::Actor;
pub use authorize::{AuthzError, PermissionMatrix, authorize, can_perform};
pub use permissions::{Action, Permission, Resource};
pub use roles::Role;
