use serde::{Deserialize, Serialize};

use super::requirements::RequirementDefinition;
use crate::types::LockType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDefinition {
    pub id: u64,

    /// Unique among the gates of one stage.
    pub gate_key: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub stage_id: u64,

    #[serde(default)]
    pub sequence: i32,

    #[serde(default = "default_true")]
    pub is_blocking: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locks: Vec<LockType>,

    #[serde(default)]
    pub creates_tasks_on_pass: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_templates: Vec<TaskTemplate>,

    #[serde(default)]
    pub requirements: Vec<RequirementDefinition>,
}

fn default_true() -> bool {
    true
}

/// Task the surrounding application creates once the gate passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GateDefinition {
    pub fn new(id: u64, gate_key: &str, stage_id: u64) -> Self {
        Self {
            id,
            gate_key: gate_key.to_string(),
            name: gate_key.to_string(),
            description: None,
            stage_id,
            sequence: 0,
            is_blocking: true,
            is_active: true,
            locks: Vec::new(),
            creates_tasks_on_pass: false,
            task_templates: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// Active requirements in evaluation order (sequence, then declaration order).
    pub fn active_requirements(&self) -> Vec<&RequirementDefinition> {
        let mut active: Vec<&RequirementDefinition> =
            self.requirements.iter().filter(|r| r.is_active).collect();
        active.sort_by_key(|r| r.sequence);
        active
    }

    /// Distinct lock types, in design → procurement → production order.
    pub fn lock_types(&self) -> Vec<LockType> {
        let mut locks = self.locks.clone();
        locks.sort();
        locks.dedup();
        locks
    }

    pub fn applies_any_lock(&self) -> bool {
        !self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequirementType;

    #[test]
    fn active_requirements_skip_inactive_and_sort() {
        let mut gate = GateDefinition::new(1, "g", 1);
        let mut a = RequirementDefinition::new(1, RequirementType::FieldNotNull);
        a.sequence = 2;
        let mut b = RequirementDefinition::new(2, RequirementType::FieldNotNull);
        b.sequence = 1;
        let mut c = RequirementDefinition::new(3, RequirementType::FieldNotNull);
        c.is_active = false;
        gate.requirements = vec![a, b, c];

        let ids: Vec<u64> = gate.active_requirements().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn lock_types_are_distinct() {
        let mut gate = GateDefinition::new(1, "design_lock", 1);
        assert!(!gate.applies_any_lock());
        gate.locks = vec![LockType::Procurement, LockType::Design, LockType::Design];
        assert!(gate.applies_any_lock());
        assert_eq!(
            gate.lock_types(),
            vec![LockType::Design, LockType::Procurement]
        );
        assert!(!gate.lock_types().contains(&LockType::Production));
    }

    #[test]
    fn gate_defaults_from_json() {
        let gate: GateDefinition = serde_json::from_value(serde_json::json!({
            "id": 3,
            "gate_key": "qc_passed",
            "name": "QC Passed",
            "stage_id": 5
        }))
        .unwrap();
        assert!(gate.is_blocking);
        assert!(gate.is_active);
        assert!(gate.requirements.is_empty());
        assert!(gate.task_templates.is_empty());
    }
}
