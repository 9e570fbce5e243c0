//! Rule resolution.
//!
//! Candidates are the active rules of the session that are in effect and
//! whose filters admit the employee. The highest priority wins; equal
//! priorities fall back to the lowest rule id so the outcome never depends
//! on storage order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use canteen_core::{MealSessionId, RuleId};

use crate::employee::{AttendanceStatus, EmployeeProfile, MealSession};
use crate::rule::EligibilityRule;

/// Inputs of one eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityContext<'a> {
    pub employee: &'a EmployeeProfile,
    pub meal_session: &'a MealSession,
    pub at: DateTime<Utc>,
    pub attendance: AttendanceStatus,
    /// Overtime approved for the day containing `at`.
    pub overtime_approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Eligible,
    AttendanceNotPresent,
    OvertimeNotApproved,
    NoApplicableRule,
    OutsideServingWindow,
}

impl core::fmt::Display for Reason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Reason::Eligible => "eligible",
            Reason::AttendanceNotPresent => "attendance not present",
            Reason::OvertimeNotApproved => "overtime not approved",
            Reason::NoApplicableRule => "no applicable rule",
            Reason::OutsideServingWindow => "outside serving window",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub eligible: bool,
    pub rule: Option<RuleId>,
    pub reason: Reason,
}

impl Decision {
    fn deny(rule: Option<RuleId>, reason: Reason) -> Self {
        Self {
            eligible: false,
            rule,
            reason,
        }
    }
}

/// Pick the governing rule, if any.
pub fn select_rule<'r>(
    rules: impl IntoIterator<Item = &'r EligibilityRule>,
    employee: &EmployeeProfile,
    meal_session_id: MealSessionId,
    at: DateTime<Utc>,
) -> Option<&'r EligibilityRule> {
    rules
        .into_iter()
        .filter(|r| r.applies_to(employee, meal_session_id, at))
        .min_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)))
}

/// Decide whether the employee may be served. Reads only its arguments.
pub fn resolve<'r>(
    ctx: &EligibilityContext<'_>,
    rules: impl IntoIterator<Item = &'r EligibilityRule>,
) -> Decision {
    if !ctx.meal_session.serves_at(ctx.at) {
        return Decision::deny(None, Reason::OutsideServingWindow);
    }

    let Some(rule) = select_rule(rules, ctx.employee, ctx.meal_session.id, ctx.at) else {
        return Decision::deny(None, Reason::NoApplicableRule);
    };

    if rule.requires_attendance && ctx.attendance != AttendanceStatus::Present {
        return Decision::deny(Some(rule.id), Reason::AttendanceNotPresent);
    }
    if rule.requires_ot && !ctx.overtime_approved {
        return Decision::deny(Some(rule.id), Reason::OvertimeNotApproved);
    }

    Decision {
        eligible: true,
        rule: Some(rule.id),
        reason: Reason::Eligible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::EmployeeType;
    use canteen_core::{DepartmentId, EmployeeId, ShiftId};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    struct Fixture {
        morning: ShiftId,
        employee: EmployeeProfile,
        lunch: MealSession,
        at: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let morning = ShiftId::new();
        Fixture {
            morning,
            employee: EmployeeProfile {
                id: EmployeeId::new(),
                code: "E-001".to_string(),
                name: "A. Khan".to_string(),
                shift_id: Some(morning),
                department_id: Some(DepartmentId::new()),
                employee_type: EmployeeType::Permanent,
            },
            lunch: MealSession {
                id: MealSessionId::new(),
                name: "Lunch".to_string(),
                serving_window: None,
            },
            at: Utc.with_ymd_and_hms(2026, 5, 4, 12, 30, 0).unwrap(),
        }
    }

    fn ctx<'a>(f: &'a Fixture, attendance: AttendanceStatus, overtime_approved: bool) -> EligibilityContext<'a> {
        EligibilityContext {
            employee: &f.employee,
            meal_session: &f.lunch,
            at: f.at,
            attendance,
            overtime_approved,
        }
    }

    #[test]
    fn higher_priority_rule_governs() {
        let f = fixture();
        let a = EligibilityRule::new(RuleId::new(), "morning shift", f.lunch.id, 10).for_shifts([f.morning]);
        let b = EligibilityRule::new(RuleId::new(), "everyone", f.lunch.id, 20).requiring_attendance();

        let decision = resolve(&ctx(&f, AttendanceStatus::Present, false), [&a, &b]);

        assert_eq!(
            decision,
            Decision {
                eligible: true,
                rule: Some(b.id),
                reason: Reason::Eligible
            }
        );
    }

    #[test]
    fn attendance_gate() {
        let f = fixture();
        let rule = EligibilityRule::new(RuleId::new(), "present only", f.lunch.id, 1).requiring_attendance();
        let decision = resolve(&ctx(&f, AttendanceStatus::Late, false), [&rule]);
        assert!(!decision.eligible);
        assert_eq!(decision.reason.to_string(), "attendance not present");
        assert_eq!(decision.rule, Some(rule.id));
    }

    #[test]
    fn overtime_gate() {
        let f = fixture();
        let rule = EligibilityRule::new(RuleId::new(), "ot dinner", f.lunch.id, 1).requiring_ot();
        assert_eq!(
            resolve(&ctx(&f, AttendanceStatus::Present, false), [&rule]).reason,
            Reason::OvertimeNotApproved
        );
        assert!(resolve(&ctx(&f, AttendanceStatus::Present, true), [&rule]).eligible);
    }

    #[test]
    fn no_rule_means_no_meal() {
        let f = fixture();
        let other_session = EligibilityRule::new(RuleId::new(), "breakfast", MealSessionId::new(), 5);
        let inactive = EligibilityRule::new(RuleId::new(), "old lunch", f.lunch.id, 5).inactive();
        let expired = EligibilityRule::new(RuleId::new(), "festival", f.lunch.id, 5)
            .valid_between(None, Some(f.at - Duration::days(1)));

        let decision = resolve(&ctx(&f, AttendanceStatus::Present, true), [&other_session, &inactive, &expired]);

        assert_eq!(decision, Decision::deny(None, Reason::NoApplicableRule));
        assert_eq!(decision.reason.to_string(), "no applicable rule");
    }

    #[test]
    fn ties_go_to_lowest_rule_id() {
        let f = fixture();
        let mut ids = [RuleId::new(), RuleId::new()];
        ids.sort();
        let low = EligibilityRule::new(ids[0], "low id", f.lunch.id, 7).requiring_ot();
        let high = EligibilityRule::new(ids[1], "high id", f.lunch.id, 7);

        let forward = resolve(&ctx(&f, AttendanceStatus::Present, false), [&low, &high]);
        let backward = resolve(&ctx(&f, AttendanceStatus::Present, false), [&high, &low]);

        assert_eq!(forward, backward);
        assert_eq!(forward.rule, Some(low.id));
        assert_eq!(forward.reason, Reason::OvertimeNotApproved);
    }

    #[test]
    fn serving_window_is_checked_first() {
        let mut f = fixture();
        f.lunch.serving_window = Some((
            chrono::NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        ));
        let rule = EligibilityRule::new(RuleId::new(), "everyone", f.lunch.id, 1);
        assert_eq!(
            resolve(&ctx(&f, AttendanceStatus::Present, false), [&rule]).reason,
            Reason::OutsideServingWindow
        );
    }

    proptest! {
        /// Same inputs, same decision, whatever order the rules arrive in.
        #[test]
        fn resolution_is_deterministic(
            specs in prop::collection::vec((0i32..4, any::<bool>(), any::<bool>(), any::<bool>()), 0..12),
            present in any::<bool>(),
            ot in any::<bool>(),
        ) {
            let f = fixture();
            let rules: Vec<EligibilityRule> = specs
                .iter()
                .map(|(priority, attendance, requires_ot, morning_only)| {
                    let mut r = EligibilityRule::new(RuleId::new(), "generated", f.lunch.id, *priority);
                    r.requires_attendance = *attendance;
                    r.requires_ot = *requires_ot;
                    if *morning_only {
                        r = r.for_shifts([f.morning]);
                    }
                    r
                })
                .collect();
            let attendance = if present { AttendanceStatus::Present } else { AttendanceStatus::Absent };

            let first = resolve(&ctx(&f, attendance, ot), &rules);
            let again = resolve(&ctx(&f, attendance, ot), &rules);
            let reversed = resolve(&ctx(&f, attendance, ot), rules.iter().rev());

            prop_assert_eq!(first, again);
            prop_assert_eq!(first, reversed);
            prop_assert_eq!(first.rule.is_none(), rules.is_empty());
        }
    }
}
