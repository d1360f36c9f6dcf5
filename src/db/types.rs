use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{HistoryError, Result};

/// Trait for typed values that can be stored as a document's fields.
pub trait Entity: Serialize + DeserializeOwned {}

// Blanket implementation for any type that meets the requirements
impl<T> Entity for T where T: Serialize + DeserializeOwned {}

/// The named fields of a document. Values are arbitrary JSON.
pub type Fields = Map<String, Value>;

/// The live, current state of an editable record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    pub fn with_fields(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builder style setter, mostly useful for constructing documents in
    /// application code and tests.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Converts a typed entity into a document. The entity must serialize
    /// to a JSON object; each of its top level keys becomes a field.
    pub fn from_entity<E: Entity>(id: impl Into<String>, entity: &E) -> Result<Self> {
        let id = id.into();
        match serde_json::to_value(entity)? {
            Value::Object(fields) => Ok(Self { id, fields }),
            other => Err(HistoryError::InvalidDocument(format!(
                "{} must serialize to an object, got {}",
                id, other
            ))),
        }
    }

    pub fn to_entity<E: Entity>(&self) -> Result<E> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// Who made a change. The display name is captured when the version is
/// written and never looked up again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The before and after value of a single field. `None` means the field
/// was absent, which is distinct from a present JSON `null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub after: Option<Value>,
}

// A key that is present always deserializes to Some, even when it holds
// null. Missing keys fall back to the serde default of None.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// A field level before/after diff between two document states. Only
/// fields that differ are present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, FieldChange>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, before: Option<Value>, after: Option<Value>) {
        self.0.insert(field.into(), FieldChange { before, after });
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.0.iter()
    }

    /// Sets every changed field to its `before` value, removing fields
    /// that did not exist before.
    pub fn revert_onto(&self, fields: &mut Fields) {
        for (name, change) in &self.0 {
            assign(fields, name, change.before.as_ref());
        }
    }

    /// Sets every changed field to its `after` value, removing fields
    /// that no longer exist after.
    pub fn apply_onto(&self, fields: &mut Fields) {
        for (name, change) in &self.0 {
            assign(fields, name, change.after.as_ref());
        }
    }
}

fn assign(fields: &mut Fields, name: &str, value: Option<&Value>) {
    match value {
        Some(value) => {
            fields.insert(name.to_string(), value.clone());
        }
        None => {
            fields.remove(name);
        }
    }
}

/// One immutable entry in a document's version log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub document_id: String,
    /// Position in the document's log, starting at 1. Replay order.
    pub seq: i64,
    pub author_id: String,
    pub author_name: String,
    /// Milliseconds since the epoch, strictly increasing per document.
    pub created_at: i64,
    pub changes: ChangeSet,
    /// Reserved for full-state snapshots. Always false.
    pub is_snapshot: bool,
    /// Set when this version was written by a restore.
    pub restore_version_id: Option<String>,
}

/// Row shape of ZV_VERSION as read by serde_rusqlite.
#[derive(Deserialize, Debug)]
pub(crate) struct VersionRecord {
    pub id: String,
    pub document_id: String,
    pub seq: i64,
    pub author_id: String,
    pub author_name: String,
    pub created_at: i64,
    pub changes: String,
    pub is_snapshot: i64,
    pub restore_version_id: Option<String>,
}

impl VersionRecord {
    pub(crate) fn into_version(self) -> Result<Version> {
        let changes = serde_json::from_str(&self.changes)
            .map_err(|e| HistoryError::Corrupted(format!("version {}: {}", self.id, e)))?;
        Ok(Version {
            id: self.id,
            document_id: self.document_id,
            seq: self.seq,
            author_id: self.author_id,
            author_name: self.author_name,
            created_at: self.created_at,
            changes,
            is_snapshot: self.is_snapshot != 0,
            restore_version_id: self.restore_version_id,
        })
    }
}

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Upper bound on the number of versions `list_versions` returns.
    /// Reconstruction always reads the full log.
    pub max_list_limit: usize,
    /// How long a writer waits on a locked database file.
    pub busy_timeout_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_list_limit: 50,
            busy_timeout_ms: 5000,
        }
    }
}

/// Sent to subscribers after a transaction commits. Each variant includes
/// the document id, and the version id where one was written.
#[derive(Clone, Debug, PartialEq)]
pub enum DbEvent {
    Saved(String, String),
    Restored(String, String),
    Deleted(String),
}
