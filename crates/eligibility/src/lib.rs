//! Meal eligibility: prioritized, filterable rules resolved to a single
//! allow/deny decision.
//!
//! Everything here is a pure function of its inputs. Loading rules,
//! employees and overtime approvals is the infra crate's job.

pub mod employee;
pub mod resolver;
pub mod rule;

pub use employee::{AttendanceStatus, EmployeeProfile, EmployeeType, MealSession, OvertimeApproval};
pub use resolver::{Decision, EligibilityContext, Reason, resolve};
pub use rule::{ApplicableFor, EligibilityRule};
