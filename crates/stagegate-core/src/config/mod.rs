pub mod gates;
pub mod requirements;
pub mod stages;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use self::gates::GateDefinition;
use self::stages::StageDefinition;

pub const CONFIG_VERSION: &str = "1.0";

/// Top-level gate definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema_uri: Option<String>,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub stages: Vec<StageDefinition>,

    #[serde(default)]
    pub gates: Vec<GateDefinition>,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

impl GateConfig {
    pub fn stage(&self, id: u64) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Active gates attached to a stage, ordered by sequence (declaration order on ties).
    pub fn gates_for_stage(&self, stage_id: u64) -> Vec<&GateDefinition> {
        let mut gates: Vec<&GateDefinition> = self
            .gates
            .iter()
            .filter(|g| g.stage_id == stage_id && g.is_active)
            .collect();
        gates.sort_by_key(|g| g.sequence);
        gates
    }
}

/// Load a gate definition document from disk.
pub fn load_config(path: &str) -> Result<GateConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("{path}: invalid gate config"))
}

/// Load a gate definition document as raw JSON (for schema checks).
pub fn load_value(path: &str) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("{path}: invalid JSON"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GateConfig {
        serde_json::from_value(serde_json::json!({
            "version": "1.0",
            "stages": [
                {"id": 1, "stage_key": "discovery", "name": "Discovery", "sequence": 1},
                {"id": 2, "stage_key": "design", "name": "Design", "sequence": 2}
            ],
            "gates": [
                {"id": 10, "gate_key": "late", "name": "Late", "stage_id": 1, "sequence": 5},
                {"id": 11, "gate_key": "early", "name": "Early", "stage_id": 1, "sequence": 1},
                {"id": 12, "gate_key": "off", "name": "Off", "stage_id": 1, "is_active": false},
                {"id": 13, "gate_key": "design", "name": "Design", "stage_id": 2}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn gates_for_stage_orders_and_filters() {
        let config = sample();
        let keys: Vec<&str> = config
            .gates_for_stage(1)
            .iter()
            .map(|g| g.gate_key.as_str())
            .collect();
        assert_eq!(keys, vec!["early", "late"]);
        assert_eq!(config.gates_for_stage(2).len(), 1);
        assert!(config.gates_for_stage(99).is_empty());
    }

    #[test]
    fn stage_lookup() {
        let config = sample();
        assert_eq!(config.stage(2).unwrap().stage_key, "design");
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gates.json");
        std::fs::write(&path, serde_json::to_string(&sample()).unwrap()).unwrap();
        let loaded = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.gates.len(), 4);
        assert_eq!(loaded.version, "1.0");
    }
}
