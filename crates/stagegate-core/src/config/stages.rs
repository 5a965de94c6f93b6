use serde::{Deserialize, Serialize};

/// A workflow stage that gates attach to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: u64,
    pub stage_key: String,
    pub name: String,

    #[serde(default)]
    pub sequence: i32,
}
