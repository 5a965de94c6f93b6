use serde::{Deserialize, Serialize};

use crate::types::RequirementType;
use crate::value;

/// One configured rule belonging to a gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementDefinition {
    pub id: u64,
    pub requirement_type: RequirementType,

    /// Model to read `target_field` from. `None` means the subject itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_relation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    /// Registered handler name for `custom_check` requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_check: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_route: Option<String>,

    #[serde(default)]
    pub sequence: i32,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Where a requirement reads its field from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Subject,
    Related(&'a str),
}

impl RequirementDefinition {
    /// Minimal active requirement of the given type; other fields unset.
    pub fn new(id: u64, requirement_type: RequirementType) -> Self {
        Self {
            id,
            requirement_type,
            target_model: None,
            target_field: None,
            target_relation: None,
            expected_value: None,
            operator: None,
            custom_check: None,
            error_message: None,
            help_text: None,
            action_label: None,
            action_route: None,
            sequence: 0,
            is_active: true,
        }
    }

    /// Resolve `target_model` against the subject's model name.
    ///
    /// An absent, blank, or self-referencing model targets the subject.
    pub fn target(&self, subject_model: &str) -> Target<'_> {
        match self.target_model.as_deref().map(str::trim) {
            None | Some("") => Target::Subject,
            Some(model) if model == subject_model => Target::Subject,
            Some(model) => Target::Related(model),
        }
    }

    /// Expected value in string form (booleans as `"true"` / `"false"`).
    pub fn expected_text(&self) -> Option<String> {
        self.expected_value.as_ref().and_then(value::as_text)
    }

    pub fn expected_number(&self) -> Option<f64> {
        self.expected_value.as_ref().and_then(value::as_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults_to_subject() {
        let mut req = RequirementDefinition::new(1, RequirementType::FieldNotNull);
        assert_eq!(req.target("Project"), Target::Subject);
        req.target_model = Some("Project".into());
        assert_eq!(req.target("Project"), Target::Subject);
        req.target_model = Some("Partner".into());
        assert_eq!(req.target("Project"), Target::Related("Partner"));
    }

    #[test]
    fn deserialize_defaults() {
        let req: RequirementDefinition = serde_json::from_value(serde_json::json!({
            "id": 7,
            "requirement_type": "field_equals",
            "target_field": "is_active",
            "expected_value": true
        }))
        .unwrap();
        assert!(req.is_active);
        assert_eq!(req.sequence, 0);
        assert_eq!(req.expected_text().as_deref(), Some("true"));
    }
}
