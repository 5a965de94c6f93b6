//! JSON-backed subject: a project snapshot exported from the host application.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stagegate_core::errors::SubjectError;
use stagegate_core::traits::{FieldAccess, Subject};

/// On-disk shape of a subject snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDocument {
    /// Model name; falls back to the workspace default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<u64>,

    #[serde(default)]
    pub fields: Map<String, Value>,

    /// One-hop related models keyed by model name (e.g. `Partner`).
    #[serde(default)]
    pub related: BTreeMap<String, Map<String, Value>>,

    /// To-many relations keyed by relation name (e.g. `rooms`).
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<Map<String, Value>>>,

    /// Document collection name → number of stored documents.
    #[serde(default)]
    pub documents: BTreeMap<String, u64>,
}

/// Field view over one JSON object.
struct Record<'a>(&'a Map<String, Value>);

impl Record<'_> {
    fn get(&self, name: &str) -> Value {
        self.0.get(name).cloned().unwrap_or(Value::Null)
    }
}

impl FieldAccess for Record<'_> {
    fn field(&self, name: &str) -> Result<Value, SubjectError> {
        Ok(self.get(name))
    }
}

#[derive(Debug, Clone)]
pub struct JsonSubject {
    doc: SubjectDocument,
    model: String,
}

impl JsonSubject {
    pub fn new(doc: SubjectDocument, default_model: &str) -> Self {
        let model = doc
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string());
        Self { doc, model }
    }

    pub fn from_value(value: Value, default_model: &str) -> Result<Self> {
        let doc: SubjectDocument =
            serde_json::from_value(value).context("invalid subject document")?;
        Ok(Self::new(doc, default_model))
    }

    /// Load a subject snapshot from disk.
    pub fn load(path: &Path, default_model: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read subject {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("{}: invalid JSON", path.display()))?;
        Self::from_value(value, default_model).with_context(|| path.display().to_string())
    }

    pub fn document(&self) -> &SubjectDocument {
        &self.doc
    }
}

impl FieldAccess for JsonSubject {
    fn field(&self, name: &str) -> Result<Value, SubjectError> {
        Ok(match name {
            "id" => Value::from(self.doc.id),
            _ => Record(&self.doc.fields).get(name),
        })
    }
}

impl Subject for JsonSubject {
    fn subject_id(&self) -> u64 {
        self.doc.id
    }

    fn business_id(&self) -> Option<String> {
        self.doc.business_id.clone()
    }

    fn stage_id(&self) -> Option<u64> {
        self.doc.stage_id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn related(&self, model: &str) -> Result<Option<Box<dyn FieldAccess + '_>>, SubjectError> {
        Ok(self
            .doc
            .related
            .get(model)
            .map(|fields| Box::new(Record(fields)) as Box<dyn FieldAccess + '_>))
    }

    fn has_relation(&self, name: &str) -> bool {
        self.doc.relations.contains_key(name)
    }

    fn relation_count(&self, name: &str) -> Result<usize, SubjectError> {
        self.doc
            .relations
            .get(name)
            .map(Vec::len)
            .ok_or_else(|| SubjectError::UnknownRelation(name.to_string()))
    }

    fn children(&self, name: &str) -> Result<Vec<Box<dyn FieldAccess + '_>>, SubjectError> {
        let rows = self
            .doc
            .relations
            .get(name)
            .ok_or_else(|| SubjectError::UnknownRelation(name.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| Box::new(Record(row)) as Box<dyn FieldAccess + '_>)
            .collect())
    }

    fn has_document(&self, collection: &str) -> bool {
        self.doc.documents.get(collection).is_some_and(|n| *n > 0)
    }

    fn snapshot_counters(&self) -> BTreeMap<String, Value> {
        self.doc
            .relations
            .iter()
            .map(|(name, rows)| (format!("{name}_count"), Value::from(rows.len())))
            .collect()
    }
}
