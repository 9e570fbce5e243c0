use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use canteen_core::{DepartmentId, EmployeeId, MealSessionId, RuleId, ShiftId};

use crate::employee::{EmployeeProfile, EmployeeType};

/// Inclusion filters of a rule. An empty set places no restriction on its
/// dimension.
///
/// `employees` is an override: a listed employee matches regardless of the
/// other dimensions. When it is the only populated set, the rule targets
/// exactly those employees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicableFor {
    #[serde(default)]
    pub shifts: BTreeSet<ShiftId>,
    #[serde(default)]
    pub departments: BTreeSet<DepartmentId>,
    #[serde(default)]
    pub employee_types: BTreeSet<EmployeeType>,
    #[serde(default)]
    pub employees: BTreeSet<EmployeeId>,
}

fn admits<T: Ord>(filter: &BTreeSet<T>, value: Option<&T>) -> bool {
    filter.is_empty() || value.is_some_and(|v| filter.contains(v))
}

impl ApplicableFor {
    pub fn everyone() -> Self {
        Self::default()
    }

    fn has_dimension_filters(&self) -> bool {
        !(self.shifts.is_empty() && self.departments.is_empty() && self.employee_types.is_empty())
    }

    pub fn matches(&self, employee: &EmployeeProfile) -> bool {
        if self.employees.contains(&employee.id) {
            return true;
        }
        if !self.employees.is_empty() && !self.has_dimension_filters() {
            return false;
        }
        admits(&self.shifts, employee.shift_id.as_ref())
            && admits(&self.departments, employee.department_id.as_ref())
            && admits(&self.employee_types, Some(&employee.employee_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityRule {
    pub id: RuleId,
    pub name: String,
    pub meal_session_id: MealSessionId,
    #[serde(default)]
    pub applicable_for: ApplicableFor,
    pub requires_attendance: bool,
    pub requires_ot: bool,
    /// Higher wins.
    pub priority: i32,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl EligibilityRule {
    /// Active, unrestricted rule for a session. Builder-style setters refine it.
    pub fn new(id: RuleId, name: impl Into<String>, meal_session_id: MealSessionId, priority: i32) -> Self {
        Self {
            id,
            name: name.into(),
            meal_session_id,
            applicable_for: ApplicableFor::everyone(),
            requires_attendance: false,
            requires_ot: false,
            priority,
            is_active: true,
            valid_from: None,
            valid_until: None,
        }
    }

    pub fn for_shifts(mut self, shifts: impl IntoIterator<Item = ShiftId>) -> Self {
        self.applicable_for.shifts.extend(shifts);
        self
    }

    pub fn for_departments(mut self, departments: impl IntoIterator<Item = DepartmentId>) -> Self {
        self.applicable_for.departments.extend(departments);
        self
    }

    pub fn for_employee_types(mut self, types: impl IntoIterator<Item = EmployeeType>) -> Self {
        self.applicable_for.employee_types.extend(types);
        self
    }

    pub fn for_employees(mut self, employees: impl IntoIterator<Item = EmployeeId>) -> Self {
        self.applicable_for.employees.extend(employees);
        self
    }

    pub fn requiring_attendance(mut self) -> Self {
        self.requires_attendance = true;
        self
    }

    pub fn requiring_ot(mut self) -> Self {
        self.requires_ot = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn valid_between(mut self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    pub fn in_effect_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.is_none_or(|from| from <= at) && self.valid_until.is_none_or(|until| at <= until)
    }

    /// Whether the rule is a candidate for this employee, session and instant.
    pub fn applies_to(&self, employee: &EmployeeProfile, meal_session_id: MealSessionId, at: DateTime<Utc>) -> bool {
        self.is_active
            && self.meal_session_id == meal_session_id
            && self.in_effect_at(at)
            && self.applicable_for.matches(employee)
    }
}
