use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use canteen_core::{DepartmentId, EmployeeId, MealSessionId, ShiftId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmployeeType {
    Permanent,
    Contract,
    Casual,
    Trainee,
}

/// The employee attributes eligibility rules filter on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub id: EmployeeId,
    pub code: String,
    pub name: String,
    pub shift_id: Option<ShiftId>,
    pub department_id: Option<DepartmentId>,
    pub employee_type: EmployeeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    HalfDay,
    OnLeave,
}

/// A meal session (breakfast, lunch, ...) with an optional serving window
/// in UTC. A window whose start is after its end wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealSession {
    pub id: MealSessionId,
    pub name: String,
    pub serving_window: Option<(NaiveTime, NaiveTime)>,
}

impl MealSession {
    pub fn serves_at(&self, at: DateTime<Utc>) -> bool {
        let Some((start, end)) = self.serving_window else {
            return true;
        };
        let t = at.time();
        if start <= end {
            start <= t && t <= end
        } else {
            t >= start || t <= end
        }
    }
}

/// Overtime approval of one employee for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeApproval {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub approved: bool,
}
