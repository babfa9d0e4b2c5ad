//! The unit of persistence and the field accessors used to filter it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};

/// A persisted resource: identifier, user-facing name and kind-specific payload.
///
/// Records handed out by the store are snapshots. Mutating one does not
/// change what the store holds; use a full replace instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// Assigned once at construction, never reused.
    pub id: String,
    pub name: String,
    /// Directory for auxiliary artifacts owned by this record only.
    pub config_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub payload: T,
}

/// Result of looking up a named field on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// A string-typed field. `None` when an optional field is unset.
    Str(Option<&'a str>),
    /// The field exists but is not string-typed.
    NotString,
    /// No field by that name.
    Unknown,
}

/// Per-kind accessor the store uses for `list_filter`.
///
/// Must classify a field name the same way for every record of a kind.
pub type FieldExtractor<T> = for<'a> fn(&'a Record<T>, &str) -> FieldValue<'a>;

impl<T> Record<T> {
    /// Record-level string fields shared by every kind.
    pub fn base_field(&self, field: &str) -> FieldValue<'_> {
        match field {
            "id" => FieldValue::Str(Some(&self.id)),
            "name" => FieldValue::Str(Some(&self.name)),
            "config_path" => FieldValue::Str(self.config_path.to_str()),
            "created_at" => FieldValue::NotString,
            _ => FieldValue::Unknown,
        }
    }
}

/// A file rendered into a record's config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// Write artifacts into `config_path`, replacing files of the same name.
pub async fn write_artifacts(config_path: &Path, artifacts: &[Artifact]) -> Result<()> {
    for artifact in artifacts {
        let path = config_path.join(&artifact.file_name);
        fs::write(&path, artifact.contents.as_bytes())
            .await
            .map_err(|e| Error::io("write", &path, e))?;
    }
    Ok(())
}
