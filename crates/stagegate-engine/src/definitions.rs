use std::collections::HashSet;

use stagegate_core::config::gates::GateDefinition;
use stagegate_core::config::GateConfig;
use stagegate_core::errors::ConfigError;
use stagegate_core::traits::DefinitionProvider;

/// Definition provider over a loaded [`GateConfig`].
#[derive(Debug, Clone)]
pub struct StaticDefinitions {
    config: GateConfig,
}

impl StaticDefinitions {
    /// Wrap a config, rejecting duplicate active gate keys within a stage.
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for gate in config.gates.iter().filter(|g| g.is_active) {
            if !seen.insert((gate.stage_id, gate.gate_key.as_str())) {
                return Err(ConfigError::DuplicateGateKey {
                    stage_id: gate.stage_id,
                    gate_key: gate.gate_key.clone(),
                });
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Active gate by key within a stage.
    pub fn gate(&self, stage_id: u64, gate_key: &str) -> Option<&GateDefinition> {
        self.config
            .gates_for_stage(stage_id)
            .into_iter()
            .find(|g| g.gate_key == gate_key)
    }
}

impl DefinitionProvider for StaticDefinitions {
    fn gates_for_stage(&self, stage_id: u64) -> Vec<GateDefinition> {
        self.config
            .gates_for_stage(stage_id)
            .into_iter()
            .cloned()
            .collect()
    }
}
