use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use stagegate_core::config::gates::GateDefinition;
use stagegate_core::errors::AuditError;
use stagegate_core::record::{ContextSnapshot, FailureReason, NewEvaluation, RequirementOutcome};
use stagegate_core::traits::{AuditSink, Clock, DefinitionProvider, Subject, SystemClock};
use stagegate_core::types::EvaluationType;

use super::result::GateEvaluationResult;
use super::status::{GateBlockers, GateStatus};
use crate::requirements::checker::RequirementChecker;

/// Runs gate requirements against a subject and records every evaluation.
///
/// Each call to [`evaluate`](Self::evaluate) appends exactly one audit row.
/// The stage-level queries are built from repeated `evaluate` calls; only an
/// audit write failure is returned as an error.
pub struct GateEvaluator {
    checker: RequirementChecker,
    definitions: Arc<dyn DefinitionProvider>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl GateEvaluator {
    pub fn new(
        checker: RequirementChecker,
        definitions: Arc<dyn DefinitionProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            checker,
            definitions,
            audit,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for context snapshot timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn checker(&self) -> &RequirementChecker {
        &self.checker
    }

    /// Evaluate one gate as a manual evaluation.
    pub fn evaluate(
        &self,
        subject: &dyn Subject,
        gate: &GateDefinition,
    ) -> Result<GateEvaluationResult, AuditError> {
        self.evaluate_as(subject, gate, EvaluationType::Manual)
    }

    pub fn evaluate_as(
        &self,
        subject: &dyn Subject,
        gate: &GateDefinition,
        evaluation_type: EvaluationType,
    ) -> Result<GateEvaluationResult, AuditError> {
        let mut requirement_results = BTreeMap::new();
        let mut failure_reasons = Vec::new();

        for requirement in self.definitions.active_requirements(gate) {
            let result = self.checker.check(subject, &requirement);
            if !result.passed {
                failure_reasons.push(FailureReason {
                    requirement_id: Some(requirement.id),
                    error_message: requirement.error_message.clone(),
                    help_text: requirement.help_text.clone(),
                    details: Some(result.message.clone()),
                    action_label: requirement.action_label.clone(),
                    action_route: requirement.action_route.clone(),
                    diagnostics: result.details,
                });
            }
            requirement_results.insert(
                requirement.id,
                RequirementOutcome {
                    passed: result.passed,
                    message: result.message,
                },
            );
        }

        let passed = failure_reasons.is_empty();
        let evaluation = self.audit.append(NewEvaluation {
            subject_id: subject.subject_id(),
            gate_id: gate.id,
            evaluation_type,
            passed,
            context: self.snapshot(subject),
            requirement_results,
            failure_reasons,
        })?;

        info!(
            subject_id = subject.subject_id(),
            gate_key = %gate.gate_key,
            evaluation_id = evaluation.id,
            %evaluation_type,
            passed,
            failed = evaluation.failure_reasons.len(),
            "gate evaluated"
        );

        Ok(GateEvaluationResult::new(gate.clone(), evaluation))
    }

    /// Evaluate every gate of the subject's current stage, keyed by gate key.
    pub fn evaluate_current_stage_gates(
        &self,
        subject: &dyn Subject,
    ) -> Result<BTreeMap<String, GateEvaluationResult>, AuditError> {
        self.current_stage_gates(subject)
            .iter()
            .map(|gate| Ok((gate.gate_key.clone(), self.evaluate(subject, gate)?)))
            .collect()
    }

    /// True when every blocking gate of the current stage passes.
    ///
    /// Every blocking gate is evaluated (and audited) even after one fails.
    pub fn can_advance(&self, subject: &dyn Subject) -> Result<bool, AuditError> {
        let results = self.evaluate_blocking(subject)?;
        Ok(results.iter().all(GateEvaluationResult::passed))
    }

    /// Failing blocking gates of the current stage, keyed by gate key.
    pub fn get_blockers(
        &self,
        subject: &dyn Subject,
    ) -> Result<BTreeMap<String, GateBlockers>, AuditError> {
        Ok(self
            .evaluate_blocking(subject)?
            .into_iter()
            .filter(|result| !result.passed())
            .map(|result| (result.gate().gate_key.clone(), GateBlockers::from(result)))
            .collect())
    }

    /// Status row per current-stage gate, in gate order.
    pub fn get_gate_status(&self, subject: &dyn Subject) -> Result<Vec<GateStatus>, AuditError> {
        self.current_stage_gates(subject)
            .iter()
            .map(|gate| Ok(GateStatus::from(&self.evaluate(subject, gate)?)))
            .collect()
    }

    fn current_stage_gates(&self, subject: &dyn Subject) -> Vec<GateDefinition> {
        subject
            .stage_id()
            .map(|stage_id| self.definitions.gates_for_stage(stage_id))
            .unwrap_or_default()
    }

    fn evaluate_blocking(
        &self,
        subject: &dyn Subject,
    ) -> Result<Vec<GateEvaluationResult>, AuditError> {
        self.current_stage_gates(subject)
            .iter()
            .filter(|gate| gate.is_blocking)
            .map(|gate| self.evaluate_as(subject, gate, EvaluationType::Automatic))
            .collect()
    }

    fn snapshot(&self, subject: &dyn Subject) -> ContextSnapshot {
        ContextSnapshot {
            subject_id: subject.subject_id(),
            business_id: subject.business_id(),
            stage_id: subject.stage_id(),
            counters: subject.snapshot_counters(),
            snapshot_at: self.clock.now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use stagegate_core::config::GateConfig;
    use stagegate_core::config::requirements::RequirementDefinition;
    use stagegate_core::traits::{FixedClock, RequirementCheckResult};
    use stagegate_core::types::RequirementType;

    use crate::audit::testing::FailingSink;
    use crate::audit::MemoryAuditSink;
    use crate::definitions::StaticDefinitions;
    use crate::requirements::registry::CustomCheckRegistry;
    use crate::subject::JsonSubject;

    fn config() -> GateConfig {
        serde_json::from_value(json!({
            "stages": [{"id": 1, "stage_key": "discovery", "name": "Discovery"}],
            "gates": [
                {
                    "id": 1, "gate_key": "discovery_complete", "name": "Discovery Complete",
                    "stage_id": 1, "sequence": 1,
                    "requirements": [
                        {"id": 11, "requirement_type": "field_not_null", "target_field": "name",
                         "error_message": "Project name is required", "sequence": 1},
                        {"id": 12, "requirement_type": "relation_count", "target_relation": "rooms",
                         "expected_value": 1, "operator": ">=", "error_message": "No rooms defined",
                         "sequence": 2},
                        {"id": 13, "requirement_type": "field_not_null", "target_field": "description",
                         "error_message": "never checked", "is_active": false}
                    ]
                },
                {
                    "id": 2, "gate_key": "kitchen_only", "name": "Kitchen Only",
                    "stage_id": 1, "sequence": 2,
                    "requirements": [
                        {"id": 21, "requirement_type": "all_children_pass", "target_relation": "rooms",
                         "target_field": "room_type", "expected_value": "kitchen",
                         "error_message": "All rooms must be kitchens", "help_text": "Check room types",
                         "action_label": "Edit rooms", "action_route": "projects.rooms"}
                    ]
                },
                {
                    "id": 3, "gate_key": "advisory", "name": "Advisory", "stage_id": 1,
                    "sequence": 3, "is_blocking": false,
                    "requirements": [
                        {"id": 31, "requirement_type": "field_not_null", "target_field": "description",
                         "error_message": "Description recommended"}
                    ]
                },
                {"id": 4, "gate_key": "empty", "name": "Empty", "stage_id": 2}
            ]
        }))
        .unwrap()
    }

    fn subject(rooms: serde_json::Value) -> JsonSubject {
        JsonSubject::from_value(
            json!({
                "id": 7,
                "business_id": "P007",
                "stage_id": 1,
                "fields": {"name": "Smith kitchen", "description": null},
                "relations": {"rooms": rooms}
            }),
            "Project",
        )
        .unwrap()
    }

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn evaluator_with(
        config: GateConfig,
        registry: CustomCheckRegistry,
    ) -> (GateEvaluator, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::with_clock(Arc::new(FixedClock(at()))));
        let defs = Arc::new(StaticDefinitions::new(config).unwrap());
        let evaluator = GateEvaluator::new(RequirementChecker::new(registry), defs, sink.clone())
            .with_clock(Arc::new(FixedClock(at())));
        (evaluator, sink)
    }

    fn evaluator() -> (GateEvaluator, Arc<MemoryAuditSink>) {
        evaluator_with(config(), CustomCheckRegistry::new())
    }

    fn gate(key: &str) -> GateDefinition {
        config()
            .gates
            .into_iter()
            .find(|g| g.gate_key == key)
            .unwrap()
    }

    #[test]
    fn gate_without_requirements_passes() {
        let (evaluator, sink) = evaluator();
        let result = evaluator.evaluate(&subject(json!([])), &gate("empty")).unwrap();
        assert!(result.passed());
        assert!(result.failure_reasons().is_empty());
        assert_eq!(result.total_count(), 0);
        assert_eq!(result.progress_percentage(), 100.0);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn inactive_requirements_are_not_evaluated() {
        let (evaluator, _) = evaluator();
        let result = evaluator
            .evaluate(&subject(json!([{"room_type": "kitchen"}])), &gate("discovery_complete"))
            .unwrap();
        assert!(result.passed());
        assert_eq!(result.total_count(), 2);
        assert!(!result.requirement_results().contains_key(&13));
        assert_eq!(result.passed_count(), 2);
    }

    #[test]
    fn failure_reasons_carry_requirement_config_and_check_message() {
        let (evaluator, _) = evaluator();
        let rooms = json!([
            {"room_type": "kitchen"}, {"room_type": "kitchen"}, {"room_type": "bathroom"}
        ]);
        let result = evaluator.evaluate(&subject(rooms), &gate("kitchen_only")).unwrap();

        assert!(!result.passed());
        assert_eq!(result.failed_count(), 1);
        let reason = &result.failure_reasons()[0];
        assert_eq!(reason.requirement_id, Some(21));
        assert_eq!(reason.error_message.as_deref(), Some("All rooms must be kitchens"));
        assert_eq!(reason.help_text.as_deref(), Some("Check room types"));
        assert_eq!(reason.action_route.as_deref(), Some("projects.rooms"));
        assert!(reason.details.as_deref().unwrap().contains("2/3"));
        assert_eq!(reason.diagnostics["total"], 3);
        assert_eq!(result.blocker_messages(), vec!["All rooms must be kitchens"]);
    }

    #[test]
    fn evaluation_is_audited_with_context_snapshot() {
        let (evaluator, sink) = evaluator();
        let result = evaluator
            .evaluate(&subject(json!([{}, {}])), &gate("discovery_complete"))
            .unwrap();

        let record = result.evaluation();
        assert_eq!(record.id, 1);
        assert_eq!(record.subject_id, 7);
        assert_eq!(record.gate_id, 1);
        assert_eq!(record.evaluation_type, EvaluationType::Manual);
        assert_eq!(record.context.business_id.as_deref(), Some("P007"));
        assert_eq!(record.context.stage_id, Some(1));
        assert_eq!(record.context.counters["rooms_count"], 2);
        assert_eq!(record.context.snapshot_at, at());
        assert_eq!(record.created_at, at());
        assert_eq!(sink.records()[0].requirement_results.len(), 2);
    }

    #[test]
    fn repeated_evaluations_create_distinct_records() {
        let (evaluator, sink) = evaluator();
        let s = subject(json!([]));
        let first = evaluator.evaluate(&s, &gate("discovery_complete")).unwrap();
        let second = evaluator.evaluate(&s, &gate("discovery_complete")).unwrap();

        assert_ne!(first.evaluation().id, second.evaluation().id);
        assert_eq!(sink.len(), 2);
        for result in [&first, &second] {
            assert!(!result.passed());
            assert_eq!(result.total_count(), 2);
            assert_eq!(result.failed_count(), 1);
        }
    }

    #[test]
    fn stage_evaluation_covers_every_gate() {
        let (evaluator, sink) = evaluator();
        let results = evaluator
            .evaluate_current_stage_gates(&subject(json!([{"room_type": "bathroom"}])))
            .unwrap();

        let keys: Vec<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["advisory", "discovery_complete", "kitchen_only"]);
        assert!(results["discovery_complete"].passed());
        assert!(!results["kitchen_only"].passed());
        assert!(!results["advisory"].passed());
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn can_advance_ignores_non_blocking_gates() {
        let (evaluator, sink) = evaluator();
        let s = subject(json!([{"room_type": "kitchen"}]));
        // The advisory gate fails (description is null) but is not blocking.
        assert!(evaluator.can_advance(&s).unwrap());

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.evaluation_type == EvaluationType::Automatic));
    }

    #[test]
    fn can_advance_false_when_blocking_gate_fails() {
        let (evaluator, sink) = evaluator();
        assert!(!evaluator.can_advance(&subject(json!([]))).unwrap());
        // No short-circuit: both blocking gates were evaluated.
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn blockers_are_exactly_failing_blocking_gates() {
        let (evaluator, _) = evaluator();
        let blockers = evaluator
            .get_blockers(&subject(json!([{"room_type": "bathroom"}])))
            .unwrap();
        let keys: Vec<&str> = blockers.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["kitchen_only"]);
        assert_eq!(blockers["kitchen_only"].gate.id, 2);
        assert_eq!(blockers["kitchen_only"].blockers.len(), 1);

        let none = evaluator
            .get_blockers(&subject(json!([{"room_type": "kitchen"}])))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn gate_status_projects_each_gate() {
        let (evaluator, sink) = evaluator();
        let status = evaluator
            .get_gate_status(&subject(json!([{"room_type": "kitchen"}])))
            .unwrap();

        assert_eq!(status.len(), 3);
        assert_eq!(status[0].gate_key, "discovery_complete");
        assert!(status[0].passed);
        assert!(status[0].blockers.is_empty());
        assert_eq!(status[0].requirements_total, 2);
        assert_eq!(status[0].requirements_passed, 2);

        assert_eq!(status[2].gate_key, "advisory");
        assert!(!status[2].passed);
        assert!(!status[2].is_blocking);
        assert_eq!(status[2].blockers.len(), 1);
        assert_eq!(status[2].blocker_messages, vec!["Description recommended"]);
        assert!(status[0].blocker_messages.is_empty());
        assert_eq!(status[2].progress_percentage, 0.0);

        assert!(sink
            .records()
            .iter()
            .all(|r| r.evaluation_type == EvaluationType::Manual));
    }

    #[test]
    fn subject_without_stage_has_no_gates() {
        let (evaluator, sink) = evaluator();
        let s = JsonSubject::from_value(json!({"id": 8}), "Project").unwrap();
        assert!(evaluator.evaluate_current_stage_gates(&s).unwrap().is_empty());
        assert!(evaluator.can_advance(&s).unwrap());
        assert!(evaluator.get_blockers(&s).unwrap().is_empty());
        assert!(evaluator.get_gate_status(&s).unwrap().is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn audit_failure_propagates() {
        let defs = Arc::new(StaticDefinitions::new(config()).unwrap());
        let evaluator =
            GateEvaluator::new(RequirementChecker::default(), defs, Arc::new(FailingSink));
        let err = evaluator
            .evaluate(&subject(json!([])), &gate("discovery_complete"))
            .unwrap_err();
        assert!(matches!(err, AuditError::WriteFailure(_)));
        assert!(evaluator.can_advance(&subject(json!([]))).is_err());
    }

    #[test]
    fn misconfigured_requirement_degrades_to_failure() {
        let mut config = config();
        let mut bad = RequirementDefinition::new(99, RequirementType::Other("unknown_type".into()));
        bad.error_message = Some("Misconfigured".into());
        config.gates[3].requirements.push(bad);
        let (evaluator, _) = evaluator_with(config.clone(), CustomCheckRegistry::new());

        let result = evaluator
            .evaluate(&subject(json!([])), &config.gates[3])
            .unwrap();
        assert!(!result.passed());
        assert!(result.requirement_results()[&99]
            .message
            .contains("Unknown requirement type"));
    }

    #[test]
    fn custom_checks_run_through_registry() {
        let mut config = config();
        let mut custom = RequirementDefinition::new(41, RequirementType::CustomCheck);
        custom.custom_check = Some("has_business_id".into());
        config.gates[3].requirements.push(custom);

        let mut registry = CustomCheckRegistry::new();
        registry
            .register(
                "has_business_id",
                |subject: &dyn Subject, _: &RequirementDefinition| {
                    RequirementCheckResult::new(subject.business_id().is_some(), "business id")
                },
            )
            .unwrap();
        let (evaluator, _) = evaluator_with(config.clone(), registry);

        let result = evaluator
            .evaluate(&subject(json!([])), &config.gates[3])
            .unwrap();
        assert!(result.passed());
        assert_eq!(result.passed_count(), 1);
    }
}
