use serde::Serialize;

use stagegate_core::config::gates::GateDefinition;
use stagegate_core::record::FailureReason;

use super::result::GateEvaluationResult;

/// Dashboard row for one current-stage gate.
#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    pub gate_key: String,
    pub name: String,
    pub passed: bool,
    pub is_blocking: bool,
    pub requirements_total: usize,
    pub requirements_passed: usize,
    pub progress_percentage: f64,
    /// Failure reasons; empty when the gate passed.
    pub blockers: Vec<FailureReason>,
    /// One display line per blocker.
    pub blocker_messages: Vec<String>,
}

impl From<&GateEvaluationResult> for GateStatus {
    fn from(result: &GateEvaluationResult) -> Self {
        let gate = result.gate();
        Self {
            gate_key: gate.gate_key.clone(),
            name: gate.name.clone(),
            passed: result.passed(),
            is_blocking: gate.is_blocking,
            requirements_total: result.total_count(),
            requirements_passed: result.passed_count(),
            progress_percentage: result.progress_percentage(),
            blockers: if result.passed() {
                Vec::new()
            } else {
                result.failure_reasons().to_vec()
            },
            blocker_messages: result.blocker_messages(),
        }
    }
}

/// A failing blocking gate and why it fails.
#[derive(Debug, Clone, Serialize)]
pub struct GateBlockers {
    pub gate: GateDefinition,
    pub blockers: Vec<FailureReason>,
}

impl From<GateEvaluationResult> for GateBlockers {
    fn from(result: GateEvaluationResult) -> Self {
        Self {
            blockers: result.failure_reasons().to_vec(),
            gate: result.gate().clone(),
        }
    }
}
