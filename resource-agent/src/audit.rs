//! Per-kind audit journal
//!
//! Appends one JSON line per lifecycle event to the kind's log file. Writing
//! is best-effort: a failure is reported through tracing and never fails the
//! operation that triggered it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::resources::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Created,
    Deleted,
    DriftPurged,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub event: AuditEvent,
    pub id: String,
    pub name: String,
}

pub struct AuditLog {
    kind: ResourceKind,
    path: Option<PathBuf>,
    writer: Mutex<()>,
}

impl AuditLog {
    pub fn new(kind: ResourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
            writer: Mutex::new(()),
        }
    }

    /// Journal that drops every event (for testing)
    pub fn new_noop(kind: ResourceKind) -> Self {
        Self {
            kind,
            path: None,
            writer: Mutex::new(()),
        }
    }

    pub async fn created(&self, id: &str, name: &str) {
        self.append(AuditEvent::Created, id, name).await;
    }

    pub async fn deleted(&self, id: &str, name: &str) {
        self.append(AuditEvent::Deleted, id, name).await;
    }

    pub async fn drift_purged(&self, id: &str, name: &str) {
        self.append(AuditEvent::DriftPurged, id, name).await;
    }

    async fn append(&self, event: AuditEvent, id: &str, name: &str) {
        let Some(path) = &self.path else {
            return;
        };

        let entry = AuditEntry {
            timestamp: Utc::now(),
            kind: self.kind.to_string(),
            event,
            id: id.to_string(),
            name: name.to_string(),
        };

        let _guard = self.writer.lock().await;
        if let Err(e) = write_line(path, &entry).await {
            warn!(
                path = %path.display(),
                event = ?event,
                id = %id,
                error = %e,
                "Failed to write audit entry"
            );
        }
    }
}

async fn write_line(path: &Path, entry: &AuditEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
