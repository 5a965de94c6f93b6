use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EvaluationType;

/// Outcome of one requirement as stored in an evaluation.
///
/// Both fields default when absent so stored rows with a missing `passed`
/// key read back as not passed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequirementOutcome {
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub message: String,
}

/// A failing requirement, in evaluation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FailureReason {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<u64>,

    /// The requirement's configured error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,

    /// The check's own message, e.g. "2/3 rooms have room_type = kitchen".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_route: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub diagnostics: BTreeMap<String, serde_json::Value>,
}

/// Point-in-time facts about the subject stored with an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub subject_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<u64>,
    /// Denormalized counters such as `rooms_count`.
    #[serde(flatten)]
    pub counters: BTreeMap<String, serde_json::Value>,
    pub snapshot_at: DateTime<Utc>,
}

/// Evaluation waiting for the audit sink to assign `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvaluation {
    pub subject_id: u64,
    pub gate_id: u64,
    pub evaluation_type: EvaluationType,
    pub passed: bool,
    pub context: ContextSnapshot,
    pub requirement_results: BTreeMap<u64, RequirementOutcome>,
    pub failure_reasons: Vec<FailureReason>,
}

impl NewEvaluation {
    pub fn into_record(self, id: u64, created_at: DateTime<Utc>) -> EvaluationRecord {
        EvaluationRecord {
            id,
            subject_id: self.subject_id,
            gate_id: self.gate_id,
            evaluation_type: self.evaluation_type,
            passed: self.passed,
            context: self.context,
            requirement_results: self.requirement_results,
            failure_reasons: self.failure_reasons,
            created_at,
        }
    }
}

/// Append-only audit row: one per gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: u64,
    pub subject_id: u64,
    pub gate_id: u64,
    pub evaluation_type: EvaluationType,
    pub passed: bool,
    pub context: ContextSnapshot,
    pub requirement_results: BTreeMap<u64, RequirementOutcome>,
    pub failure_reasons: Vec<FailureReason>,
    pub created_at: DateTime<Utc>,
}
