//! Audit entries handed to the activity-log collaborator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::model::LeadId;
use crate::store::AuditSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Assigned,
    Reassigned,
}

/// `{leadId, type, details, actor, at}` record for one ownership change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub lead_id: LeadId,
    #[serde(rename = "type")]
    pub kind: AuditKind,
    pub details: Value,
    /// Agent id for manual changes, `"system"` for automatic ones
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(lead_id: LeadId, kind: AuditKind, details: Value, actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            kind,
            details,
            actor: actor.into(),
            at,
        }
    }
}

/// Writes audit entries to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        info!(
            lead_id = %entry.lead_id,
            kind = ?entry.kind,
            actor = %entry.actor,
            details = %entry.details,
            "📝 Assignment audit"
        );
        Ok(())
    }
}

/// Keeps audit entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn entries_for(&self, lead_id: &LeadId) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| &e.lead_id == lead_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }
}
