use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requirement strategy discriminator.
///
/// Unrecognised names are kept verbatim in `Other` so a misconfigured
/// requirement still loads and fails at check time instead of at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequirementType {
    FieldNotNull,
    FieldEquals,
    FieldGreaterThan,
    RelationExists,
    RelationCount,
    AllChildrenPass,
    DocumentUploaded,
    PaymentReceived,
    TaskCompleted,
    CustomCheck,
    Other(String),
}

impl RequirementType {
    pub fn as_str(&self) -> &str {
        match self {
            RequirementType::FieldNotNull => "field_not_null",
            RequirementType::FieldEquals => "field_equals",
            RequirementType::FieldGreaterThan => "field_greater_than",
            RequirementType::RelationExists => "relation_exists",
            RequirementType::RelationCount => "relation_count",
            RequirementType::AllChildrenPass => "all_children_pass",
            RequirementType::DocumentUploaded => "document_uploaded",
            RequirementType::PaymentReceived => "payment_received",
            RequirementType::TaskCompleted => "task_completed",
            RequirementType::CustomCheck => "custom_check",
            RequirementType::Other(name) => name,
        }
    }
}

impl From<String> for RequirementType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "field_not_null" => RequirementType::FieldNotNull,
            "field_equals" => RequirementType::FieldEquals,
            "field_greater_than" => RequirementType::FieldGreaterThan,
            "relation_exists" => RequirementType::RelationExists,
            "relation_count" => RequirementType::RelationCount,
            "all_children_pass" => RequirementType::AllChildrenPass,
            "document_uploaded" => RequirementType::DocumentUploaded,
            "payment_received" => RequirementType::PaymentReceived,
            "task_completed" => RequirementType::TaskCompleted,
            "custom_check" => RequirementType::CustomCheck,
            _ => RequirementType::Other(value),
        }
    }
}

impl From<RequirementType> for String {
    fn from(value: RequirementType) -> Self {
        match value {
            RequirementType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count comparison operator for `relation_count` requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }

    pub fn compare<T: PartialOrd>(self, actual: T, expected: T) -> bool {
        match self {
            CompareOp::Eq => actual == expected,
            CompareOp::Neq => actual != expected,
            CompareOp::Lt => actual < expected,
            CompareOp::Lte => actual <= expected,
            CompareOp::Gt => actual > expected,
            CompareOp::Gte => actual >= expected,
        }
    }
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::Neq),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Lte),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Gte),
            other => Err(format!("unknown comparison operator '{other}'")),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How an evaluation was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationType {
    #[default]
    Manual,
    Automatic,
    Scheduled,
}

impl FromStr for EvaluationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(EvaluationType::Manual),
            "automatic" | "auto" => Ok(EvaluationType::Automatic),
            "scheduled" => Ok(EvaluationType::Scheduled),
            other => Err(format!(
                "unknown evaluation type '{other}' (use: manual, automatic, scheduled)"
            )),
        }
    }
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvaluationType::Manual => "manual",
            EvaluationType::Automatic => "automatic",
            EvaluationType::Scheduled => "scheduled",
        };
        f.write_str(s)
    }
}

/// Freeze applied to a project when a gate passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    Design,
    Procurement,
    Production,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockType::Design => "design",
            LockType::Procurement => "procurement",
            LockType::Production => "production",
        };
        f.write_str(s)
    }
}
