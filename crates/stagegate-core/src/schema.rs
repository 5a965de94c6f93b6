use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result};
use jsonschema::Validator;
use serde_json::Value;

use crate::config::GateConfig;
use crate::errors::{CheckIssue, CheckReport};
use crate::types::{CompareOp, RequirementType};

const SCHEMA_V10: &str = include_str!("../schema/stagegate-v1.0.schema.json");

/// Detect the version of a gate config JSON value.
pub fn detect_version(data: &Value) -> &str {
    data.get("version").and_then(Value::as_str).unwrap_or("1.0")
}

/// Create a validator for the embedded gate config schema.
pub fn validator() -> Result<Validator> {
    let schema: Value =
        serde_json::from_str(SCHEMA_V10).context("embedded schema is invalid JSON")?;
    Validator::new(&schema).map_err(|e| anyhow::anyhow!("schema compilation failed: {e}"))
}

/// Full check producing a structured report (for `sgate check --json`).
pub fn check(data: &Value, file: &str, strict: bool) -> CheckReport {
    let version = detect_version(data).to_string();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match validator() {
        Ok(v) => {
            for error in v.iter_errors(data) {
                let path = error.instance_path.to_string();
                errors.push(issue(
                    "E001",
                    "schema",
                    error.to_string(),
                    if path.is_empty() {
                        "$(root)".to_string()
                    } else {
                        format!("${path}")
                    },
                ));
            }
        }
        Err(e) => errors.push(issue("E000", "schema", e.to_string(), "$".to_string())),
    }

    // Semantic checks need the typed document; schema errors already cover the rest.
    if let Ok(config) = serde_json::from_value::<GateConfig>(data.clone()) {
        check_identity(&config, &mut errors);
        lint_requirements(&config, &mut warnings);
        lint_gates(&config, &mut warnings);
    }

    let pass = errors.is_empty() && (!strict || warnings.is_empty());
    CheckReport {
        file: file.to_string(),
        version,
        pass,
        errors,
        warnings,
    }
}

fn issue(code: &str, check: &str, message: String, path: String) -> CheckIssue {
    CheckIssue {
        code: code.to_string(),
        check: check.to_string(),
        message,
        path: Some(path),
    }
}

/// Uniqueness and referential checks.
fn check_identity(config: &GateConfig, errors: &mut Vec<CheckIssue>) {
    let mut keys_by_stage: HashMap<u64, HashSet<&str>> = HashMap::new();
    let mut gate_ids = HashSet::new();
    let mut requirement_ids = HashSet::new();
    let stage_ids: BTreeSet<u64> = config.stages.iter().map(|s| s.id).collect();

    for (gi, gate) in config.gates.iter().enumerate() {
        // Only active gates are looked up by key.
        if gate.is_active
            && !keys_by_stage
                .entry(gate.stage_id)
                .or_default()
                .insert(gate.gate_key.as_str())
        {
            errors.push(issue(
                "E002",
                "identity",
                format!(
                    "duplicate gate_key '{}' in stage {}",
                    gate.gate_key, gate.stage_id
                ),
                format!("$.gates[{gi}].gate_key"),
            ));
        }

        if !gate_ids.insert(gate.id) {
            errors.push(issue(
                "E003",
                "identity",
                format!("duplicate gate id {}", gate.id),
                format!("$.gates[{gi}].id"),
            ));
        }

        if !stage_ids.is_empty() && !stage_ids.contains(&gate.stage_id) {
            errors.push(issue(
                "E004",
                "identity",
                format!(
                    "gate '{}' references unknown stage {}",
                    gate.gate_key, gate.stage_id
                ),
                format!("$.gates[{gi}].stage_id"),
            ));
        }

        for (ri, req) in gate.requirements.iter().enumerate() {
            if !requirement_ids.insert(req.id) {
                errors.push(issue(
                    "E005",
                    "identity",
                    format!("duplicate requirement id {}", req.id),
                    format!("$.gates[{gi}].requirements[{ri}].id"),
                ));
            }
        }
    }
}

fn lint_requirements(config: &GateConfig, warnings: &mut Vec<CheckIssue>) {
    for (gi, gate) in config.gates.iter().enumerate() {
        for (ri, req) in gate.requirements.iter().enumerate() {
            let path = format!("$.gates[{gi}].requirements[{ri}]");
            let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

            match &req.requirement_type {
                RequirementType::Other(name) => warnings.push(issue(
                    "W001",
                    "lint",
                    format!("unknown requirement type '{name}' (always fails)"),
                    format!("{path}.requirement_type"),
                )),
                RequirementType::RelationCount => match req.operator.as_deref() {
                    None => warnings.push(issue(
                        "W002",
                        "lint",
                        "relation_count without operator (always fails)".to_string(),
                        format!("{path}.operator"),
                    )),
                    Some(op) if op.parse::<CompareOp>().is_err() => warnings.push(issue(
                        "W002",
                        "lint",
                        format!("unknown comparison operator '{op}' (always fails)"),
                        format!("{path}.operator"),
                    )),
                    Some(_) => {}
                },
                RequirementType::CustomCheck if blank(&req.custom_check) => {
                    warnings.push(issue(
                        "W003",
                        "lint",
                        "custom_check without handler name".to_string(),
                        format!("{path}.custom_check"),
                    ))
                }
                _ => {}
            }

            let needs_field = matches!(
                req.requirement_type,
                RequirementType::FieldNotNull
                    | RequirementType::FieldEquals
                    | RequirementType::FieldGreaterThan
                    | RequirementType::AllChildrenPass
            );
            if needs_field && blank(&req.target_field) {
                warnings.push(issue(
                    "W004",
                    "lint",
                    format!("{} without target_field", req.requirement_type),
                    format!("{path}.target_field"),
                ));
            }

            let needs_relation = matches!(
                req.requirement_type,
                RequirementType::RelationExists
                    | RequirementType::RelationCount
                    | RequirementType::AllChildrenPass
            );
            if needs_relation && blank(&req.target_relation) {
                warnings.push(issue(
                    "W005",
                    "lint",
                    format!("{} without target_relation", req.requirement_type),
                    format!("{path}.target_relation"),
                ));
            }

            if req.is_active && blank(&req.error_message) {
                warnings.push(issue(
                    "W007",
                    "lint",
                    "active requirement without error_message".to_string(),
                    format!("{path}.error_message"),
                ));
            }
        }
    }
}

fn lint_gates(config: &GateConfig, warnings: &mut Vec<CheckIssue>) {
    for (gi, gate) in config.gates.iter().enumerate() {
        if gate.is_active && gate.active_requirements().is_empty() {
            warnings.push(issue(
                "W006",
                "lint",
                format!(
                    "gate '{}' has no active requirements (always passes)",
                    gate.gate_key
                ),
                format!("$.gates[{gi}].requirements"),
            ));
        }
        if !gate.creates_tasks_on_pass && !gate.task_templates.is_empty() {
            warnings.push(issue(
                "W008",
                "lint",
                format!(
                    "gate '{}' has task_templates but creates_tasks_on_pass is false",
                    gate.gate_key
                ),
                format!("$.gates[{gi}].task_templates"),
            ));
        }
    }
}
