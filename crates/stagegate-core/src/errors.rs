#[derive(Debug, thiserror::Error)]
pub enum SubjectError {
    #[error("relation '{0}' does not exist")]
    UnknownRelation(String),
    #[error("field '{field}' is not {expected}")]
    TypeMismatch { field: String, expected: String },
    #[error("subject data unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("write failure: {0}")]
    WriteFailure(String),
    #[error("hash chain broken at entry {entry}: expected prev_hash '{expected}', got '{found}'")]
    ChainCorruption {
        entry: u64,
        expected: String,
        found: String,
    },
    #[error("checkpoint mismatch after {entries} entries: expected head '{expected}', got '{found}'")]
    CheckpointMismatch {
        entries: u64,
        expected: String,
        found: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate gate key '{gate_key}' in stage {stage_id}")]
    DuplicateGateKey { stage_id: u64, gate_key: String },
    #[error("duplicate custom check '{0}'")]
    DuplicateCustomCheck(String),
}

/// Structured check result for `sgate check --json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckReport {
    pub file: String,
    pub version: String,
    pub pass: bool,
    pub errors: Vec<CheckIssue>,
    pub warnings: Vec<CheckIssue>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckIssue {
    pub code: String,
    pub check: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
