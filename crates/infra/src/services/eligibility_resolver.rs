//! EligibilityResolver: loads what a decision depends on and hands it to
//! the pure resolver in `canteen-eligibility`.
//!
//! Resolution never writes. The upserts below maintain the reference data
//! (rules, employees, sessions, overtime approvals) that HR and the canteen
//! manager own.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use canteen_core::{EmployeeId, ExpectedVersion, MealSessionId, RuleId};
use canteen_eligibility::{
    AttendanceStatus, Decision, EligibilityContext, EligibilityRule, EmployeeProfile, MealSession,
    OvertimeApproval, resolve,
};

use crate::error::{EngineError, EngineResult, StoreError};
use crate::store::{DocumentStore, ReadOptions, Storage};

pub struct EligibilityResolver<S> {
    storage: Arc<S>,
}

impl<S> Clone for EligibilityResolver<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: Storage> EligibilityResolver<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Decide whether the employee may be served the session at `at`.
    ///
    /// Overtime is looked up for the UTC calendar day of `at`.
    pub fn resolve(
        &self,
        employee_id: EmployeeId,
        meal_session_id: MealSessionId,
        at: DateTime<Utc>,
        attendance: AttendanceStatus,
    ) -> EngineResult<Decision> {
        let employee = self.employee(employee_id)?;
        let session = self.meal_session(meal_session_id)?;
        let rules = self.rules_for(meal_session_id)?;
        self.decide(&employee, &session, &rules, at, attendance)
    }

    /// One decision per employee, in input order. Rules and the session are
    /// read once for the whole batch.
    pub fn check_many(
        &self,
        employee_ids: &[EmployeeId],
        meal_session_id: MealSessionId,
        at: DateTime<Utc>,
        attendance: AttendanceStatus,
    ) -> EngineResult<Vec<(EmployeeId, Decision)>> {
        let session = self.meal_session(meal_session_id)?;
        let rules = self.rules_for(meal_session_id)?;

        employee_ids
            .iter()
            .map(|&id| {
                let employee = self.employee(id)?;
                Ok((id, self.decide(&employee, &session, &rules, at, attendance)?))
            })
            .collect()
    }

    fn decide(
        &self,
        employee: &EmployeeProfile,
        session: &MealSession,
        rules: &[EligibilityRule],
        at: DateTime<Utc>,
        attendance: AttendanceStatus,
    ) -> EngineResult<Decision> {
        let overtime_approved = self.overtime_approved(employee.id, at.date_naive())?;
        let decision = resolve(
            &EligibilityContext {
                employee,
                meal_session: session,
                at,
                attendance,
                overtime_approved,
            },
            rules,
        );
        debug!(
            employee_id = %employee.id,
            meal_session_id = %session.id,
            eligible = decision.eligible,
            rule_id = ?decision.rule,
            reason = %decision.reason,
            "eligibility resolved"
        );
        Ok(decision)
    }

    fn overtime_approved(&self, employee_id: EmployeeId, date: NaiveDate) -> EngineResult<bool> {
        Ok(self
            .storage
            .overtime()
            .get(&(employee_id, date), ReadOptions::live())?
            .is_some_and(|v| v.value.approved))
    }

    pub fn employee(&self, id: EmployeeId) -> EngineResult<EmployeeProfile> {
        self.storage
            .employees()
            .get(&id, ReadOptions::live())?
            .map(|v| v.value)
            .ok_or_else(|| EngineError::NotFound(format!("employee {id}")))
    }

    pub fn meal_session(&self, id: MealSessionId) -> EngineResult<MealSession> {
        self.storage
            .meal_sessions()
            .get(&id, ReadOptions::live())?
            .map(|v| v.value)
            .ok_or_else(|| EngineError::NotFound(format!("meal session {id}")))
    }

    pub fn rule(&self, id: RuleId) -> EngineResult<EligibilityRule> {
        self.storage
            .rules()
            .get(&id, ReadOptions::live())?
            .map(|v| v.value)
            .ok_or_else(|| EngineError::NotFound(format!("eligibility rule {id}")))
    }

    /// Every stored rule of the session, active or not.
    pub fn rules_for(&self, meal_session_id: MealSessionId) -> EngineResult<Vec<EligibilityRule>> {
        Ok(self
            .storage
            .rules()
            .list(ReadOptions::live())?
            .into_iter()
            .map(|v| v.value)
            .filter(|r| r.meal_session_id == meal_session_id)
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reference data
    // ─────────────────────────────────────────────────────────────────────

    pub fn upsert_rule(&self, rule: EligibilityRule) -> EngineResult<u64> {
        if rule.name.trim().is_empty() {
            return Err(EngineError::Validation("rule name is required".into()));
        }
        let (id, priority) = (rule.id, rule.priority);
        let version = upsert(self.storage.rules(), rule.id, rule)?;
        info!(rule_id = %id, priority, version, "eligibility rule saved");
        Ok(version)
    }

    pub fn upsert_employee(&self, employee: EmployeeProfile) -> EngineResult<u64> {
        let id = employee.id;
        let version = upsert(self.storage.employees(), id, employee)?;
        info!(employee_id = %id, version, "employee profile saved");
        Ok(version)
    }

    pub fn upsert_meal_session(&self, session: MealSession) -> EngineResult<u64> {
        let id = session.id;
        let version = upsert(self.storage.meal_sessions(), id, session)?;
        info!(meal_session_id = %id, version, "meal session saved");
        Ok(version)
    }

    pub fn record_overtime(&self, approval: OvertimeApproval) -> EngineResult<u64> {
        let key = (approval.employee_id, approval.date);
        let approved = approval.approved;
        let version = upsert(self.storage.overtime(), key, approval)?;
        info!(employee_id = %key.0, date = %key.1, approved, "overtime approval recorded");
        Ok(version)
    }
}

/// Insert, or replace whatever version is current. A concurrent writer
/// surfaces as `ConcurrencyConflict`.
fn upsert<K, V, D>(store: &D, key: K, value: V) -> EngineResult<u64>
where
    D: DocumentStore<K, V>,
{
    let version = match store.get(&key, ReadOptions::with_deleted())? {
        None => store.insert(key, value).map_err(|e| match e {
            StoreError::Duplicate(msg) => StoreError::Concurrency(msg),
            other => other,
        })?,
        Some(current) => {
            store.compare_and_swap(&key, ExpectedVersion::Exact(current.version), value)?
        }
    };
    Ok(version)
}
