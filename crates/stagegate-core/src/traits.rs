use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::gates::GateDefinition;
use crate::config::requirements::RequirementDefinition;
use crate::errors::{AuditError, SubjectError};
use crate::record::{EvaluationRecord, NewEvaluation};

/// Reads scalar fields off an entity.
pub trait FieldAccess {
    /// Field value, or `Value::Null` when the field is unset or unknown.
    ///
    /// An error means the backing store could not answer.
    fn field(&self, name: &str) -> Result<serde_json::Value, SubjectError>;
}

/// The entity being gated, seen only through its capabilities.
///
/// Implementations answer every relation question explicitly: a name the
/// subject does not model yields `has_relation == false`, never a panic.
pub trait Subject: FieldAccess {
    fn subject_id(&self) -> u64;

    /// Human-facing identifier such as a project number.
    fn business_id(&self) -> Option<String>;

    fn stage_id(&self) -> Option<u64>;

    /// Model name a requirement's `target_model` is compared against.
    fn model_name(&self) -> &str;

    /// One relation hop to a related model (e.g. `Partner`, `SalesOrder`).
    ///
    /// `Ok(None)` when the subject has no such model attached.
    fn related(&self, model: &str) -> Result<Option<Box<dyn FieldAccess + '_>>, SubjectError>;

    fn has_relation(&self, name: &str) -> bool;

    fn relation_count(&self, name: &str) -> Result<usize, SubjectError>;

    fn children(&self, name: &str) -> Result<Vec<Box<dyn FieldAccess + '_>>, SubjectError>;

    /// Whether at least one document is stored in the named collection.
    fn has_document(&self, _collection: &str) -> bool {
        false
    }

    /// Denormalized counters captured in every evaluation's context snapshot.
    fn snapshot_counters(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }
}

/// Immutable outcome of one requirement check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementCheckResult {
    pub passed: bool,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl RequirementCheckResult {
    pub fn new(passed: bool, message: impl Into<String>) -> Self {
        Self {
            passed,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(true, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(false, message)
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// A named, registered requirement strategy for `custom_check` requirements.
pub trait CustomCheck: Send + Sync {
    fn check(
        &self,
        subject: &dyn Subject,
        requirement: &RequirementDefinition,
    ) -> RequirementCheckResult;
}

impl<F> CustomCheck for F
where
    F: Fn(&dyn Subject, &RequirementDefinition) -> RequirementCheckResult + Send + Sync,
{
    fn check(
        &self,
        subject: &dyn Subject,
        requirement: &RequirementDefinition,
    ) -> RequirementCheckResult {
        self(subject, requirement)
    }
}

/// Supplies gate and requirement configuration.
pub trait DefinitionProvider: Send + Sync {
    /// Gates attached to a stage, in evaluation order.
    fn gates_for_stage(&self, stage_id: u64) -> Vec<GateDefinition>;

    /// Active requirements of a gate, in evaluation order.
    fn active_requirements(&self, gate: &GateDefinition) -> Vec<RequirementDefinition> {
        gate.active_requirements().into_iter().cloned().collect()
    }
}

/// Source of "now" for snapshots and audit rows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Append-only persistence of evaluation records.
///
/// The sink assigns `id` and `created_at`; it never updates or deletes rows.
pub trait AuditSink: Send + Sync {
    fn append(&self, evaluation: NewEvaluation) -> Result<EvaluationRecord, AuditError>;
}
