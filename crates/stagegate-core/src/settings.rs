use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const WORKSPACE_SETTINGS: &str = ".stagegate/settings.json";

/// Workspace-level defaults for the CLI and JSON-backed subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Model name assumed for subject documents that do not declare one.
    #[serde(default = "default_subject_model")]
    pub subject_model: String,

    /// Log filter used when `SGATE_LOG` is unset.
    #[serde(default = "default_log")]
    pub log: String,
}

fn default_subject_model() -> String {
    "Project".to_string()
}

fn default_log() -> String {
    "warn".to_string()
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            subject_model: default_subject_model(),
            log: default_log(),
        }
    }
}

/// Load settings from an explicit file.
pub fn load_settings_from(path: &Path) -> Result<WorkspaceSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read settings {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{}: invalid settings JSON", path.display()))
}

/// Load `.stagegate/settings.json` from the working directory, if present.
pub fn load_workspace_settings() -> Result<Option<WorkspaceSettings>> {
    let path = Path::new(WORKSPACE_SETTINGS);
    if !path.exists() {
        return Ok(None);
    }
    load_settings_from(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"log": "debug"}"#).unwrap();
        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.log, "debug");
        assert_eq!(settings.subject_model, "Project");
    }

    #[test]
    fn malformed_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from(&path).is_err());
    }
}
