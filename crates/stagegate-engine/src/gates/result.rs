use std::collections::BTreeMap;

use serde::Serialize;

use stagegate_core::config::gates::{GateDefinition, TaskTemplate};
use stagegate_core::record::{EvaluationRecord, FailureReason, RequirementOutcome};
use stagegate_core::types::LockType;

const UNKNOWN_BLOCKER: &str = "Unknown blocker";

/// Outcome of one gate evaluation, wrapping the audit record it produced.
///
/// Immutable; every metric is computed from the stored record.
#[derive(Debug, Clone, Serialize)]
pub struct GateEvaluationResult {
    passed: bool,
    gate: GateDefinition,
    evaluation: EvaluationRecord,
}

impl GateEvaluationResult {
    pub fn new(gate: GateDefinition, evaluation: EvaluationRecord) -> Self {
        Self {
            passed: evaluation.passed,
            gate,
            evaluation,
        }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn gate(&self) -> &GateDefinition {
        &self.gate
    }

    pub fn evaluation(&self) -> &EvaluationRecord {
        &self.evaluation
    }

    pub fn requirement_results(&self) -> &BTreeMap<u64, RequirementOutcome> {
        &self.evaluation.requirement_results
    }

    pub fn failure_reasons(&self) -> &[FailureReason] {
        &self.evaluation.failure_reasons
    }

    pub fn failed_count(&self) -> usize {
        self.evaluation.failure_reasons.len()
    }

    pub fn passed_count(&self) -> usize {
        self.requirement_results()
            .values()
            .filter(|r| r.passed)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.requirement_results().len()
    }

    /// Share of passing requirements, rounded half-up to one decimal.
    pub fn progress_percentage(&self) -> f64 {
        let total = self.total_count() as u64;
        if total == 0 {
            return 100.0;
        }
        let passed = self.passed_count() as u64;
        let tenths = (passed * 2000 + total) / (2 * total);
        tenths as f64 / 10.0
    }

    /// One message per failure reason: error message, else check details.
    pub fn blocker_messages(&self) -> Vec<String> {
        self.failure_reasons()
            .iter()
            .map(|reason| {
                [&reason.error_message, &reason.details]
                    .into_iter()
                    .flatten()
                    .find(|s| !s.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_BLOCKER.to_string())
            })
            .collect()
    }

    /// Task templates to instantiate; empty unless the gate passed.
    pub fn tasks_to_create(&self) -> &[TaskTemplate] {
        if self.passed && self.gate.creates_tasks_on_pass {
            self.gate.task_templates.as_slice()
        } else {
            &[]
        }
    }

    /// Locks to apply; empty unless the gate passed.
    pub fn locks_to_apply(&self) -> Vec<LockType> {
        if self.passed {
            self.gate.lock_types()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(
        results: serde_json::Value,
        reasons: serde_json::Value,
        passed: bool,
    ) -> EvaluationRecord {
        serde_json::from_value(json!({
            "id": 1,
            "subject_id": 1,
            "gate_id": 1,
            "evaluation_type": "manual",
            "passed": passed,
            "context": {"subject_id": 1, "snapshot_at": "2024-01-01T00:00:00Z"},
            "requirement_results": results,
            "failure_reasons": reasons,
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    fn result(results: serde_json::Value, reasons: serde_json::Value) -> GateEvaluationResult {
        GateEvaluationResult::new(GateDefinition::new(1, "g", 1), record(results, reasons, false))
    }

    #[test]
    fn progress_half() {
        let r = result(
            json!({
                "1": {"passed": true, "message": ""},
                "2": {"passed": true, "message": ""},
                "3": {"passed": false, "message": ""},
                "4": {"passed": false, "message": ""}
            }),
            json!([]),
        );
        assert_eq!(r.total_count(), 4);
        assert_eq!(r.passed_count(), 2);
        assert_eq!(r.progress_percentage(), 50.0);
    }

    #[test]
    fn progress_rounds_to_one_decimal() {
        let r = result(
            json!({
                "1": {"passed": true, "message": ""},
                "2": {"passed": false, "message": ""},
                "3": {"passed": false, "message": ""}
            }),
            json!([]),
        );
        assert_eq!(r.progress_percentage(), 33.3);

        let r = result(
            json!({
                "1": {"passed": true, "message": ""},
                "2": {"passed": true, "message": ""},
                "3": {"passed": false, "message": ""}
            }),
            json!([]),
        );
        assert_eq!(r.progress_percentage(), 66.7);
    }

    #[test]
    fn progress_is_full_with_no_requirements() {
        let r = result(json!({}), json!([]));
        assert_eq!(r.total_count(), 0);
        assert_eq!(r.progress_percentage(), 100.0);
        assert!(r.blocker_messages().is_empty());
    }

    #[test]
    fn missing_passed_counts_as_not_passed() {
        let r = result(
            json!({
                "1": {"passed": true, "message": "ok"},
                "2": {"message": "No passed key"}
            }),
            json!([]),
        );
        assert_eq!(r.passed_count(), 1);
        assert_eq!(r.total_count(), 2);
    }

    #[test]
    fn counts_follow_stored_collections() {
        let r = result(
            json!({"1": {"passed": false, "message": "x"}}),
            json!([{"requirement_id": 1, "error_message": "Missing"}]),
        );
        assert_eq!(r.failed_count(), 1);
        assert_eq!(r.total_count(), r.requirement_results().len());
        assert_eq!(r.failed_count(), r.failure_reasons().len());
    }

    #[test]
    fn blocker_message_prefers_error_message() {
        let r = result(
            json!({}),
            json!([{"requirement_id": 1, "error_message": "Field is required"}]),
        );
        assert_eq!(r.blocker_messages(), vec!["Field is required"]);
    }

    #[test]
    fn blocker_message_falls_back_to_details() {
        let r = result(
            json!({}),
            json!([{"requirement_id": 1, "error_message": "", "details": "Detail message"}]),
        );
        assert_eq!(r.blocker_messages(), vec!["Detail message"]);
    }

    #[test]
    fn blocker_message_unknown() {
        let r = result(json!({}), json!([{"requirement_id": 1}]));
        assert_eq!(r.blocker_messages(), vec!["Unknown blocker"]);
    }

    #[test]
    fn tasks_and_locks_only_when_passed() {
        let mut gate = GateDefinition::new(1, "design_lock", 2);
        gate.locks = vec![LockType::Design];
        gate.creates_tasks_on_pass = true;
        gate.task_templates = vec![TaskTemplate {
            title: "Order materials".into(),
            description: None,
        }];

        let failed = GateEvaluationResult::new(gate.clone(), record(json!({}), json!([]), false));
        assert!(failed.tasks_to_create().is_empty());
        assert!(failed.locks_to_apply().is_empty());

        let passed = GateEvaluationResult::new(gate, record(json!({}), json!([]), true));
        assert_eq!(passed.tasks_to_create().len(), 1);
        assert_eq!(passed.locks_to_apply(), vec![LockType::Design]);
    }
}
