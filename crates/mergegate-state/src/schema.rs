//! SurrealDB row types for Mergegate records.
//!
//! Rows carry the query-relevant columns flat (for indexing) and the full
//! domain value as a JSON body, converted back at the trait boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mergegate_core::{ResolutionCacheEntry, ResolutionMethod, Ticket, WorkflowInstance};

use crate::error::{StorageError, StorageResult};

/// Row in the `instances` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRow {
    pub workflow_id: String,
    pub repository: String,
    pub change_id: String,
    pub head_revision: String,
    pub status: String,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    /// Full serialized `WorkflowInstance`.
    pub body: serde_json::Value,
}

impl InstanceRow {
    pub fn from_instance(instance: &WorkflowInstance) -> StorageResult<Self> {
        Ok(Self {
            workflow_id: instance.id.0.clone(),
            repository: instance.change_ref.repository.clone(),
            change_id: instance.change_ref.change_id.clone(),
            head_revision: instance.change_ref.head_revision.clone(),
            status: status_label(instance),
            active: instance.status.is_active(),
            started_at: instance.started_at,
            body: serde_json::to_value(instance)?,
        })
    }

    pub fn into_instance(self) -> StorageResult<WorkflowInstance> {
        serde_json::from_value(self.body).map_err(StorageError::from)
    }
}

fn status_label(instance: &WorkflowInstance) -> String {
    // Matches the serde snake_case rename on WorkflowStatus.
    serde_json::to_value(instance.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Row in the `tickets` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRow {
    pub external_key: String,
    pub idempotency_key: String,
    pub workflow_id: String,
    pub repository: String,
    pub change_id: String,
    pub head_revision: String,
    pub created_at: DateTime<Utc>,
    /// Full serialized `Ticket`.
    pub body: serde_json::Value,
}

impl TicketRow {
    pub fn from_ticket(ticket: &Ticket) -> StorageResult<Self> {
        Ok(Self {
            external_key: ticket.external_key.clone(),
            idempotency_key: ticket.idempotency_key(),
            workflow_id: ticket.workflow_id.0.clone(),
            repository: ticket.change_ref.repository.clone(),
            change_id: ticket.change_ref.change_id.clone(),
            head_revision: ticket.change_ref.head_revision.clone(),
            created_at: ticket.created_at,
            body: serde_json::to_value(ticket)?,
        })
    }

    pub fn into_ticket(self) -> StorageResult<Ticket> {
        serde_json::from_value(self.body).map_err(StorageError::from)
    }
}

/// Row in the `resolution_cache` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRow {
    pub lookup_key: String,
    pub account_id: String,
    pub resolution_method: ResolutionMethod,
    pub expires_at: DateTime<Utc>,
}

impl ResolutionRow {
    pub fn from_entry(entry: &ResolutionCacheEntry) -> Self {
        Self {
            lookup_key: entry.lookup_key.clone(),
            account_id: entry.account_id.clone(),
            resolution_method: entry.resolution_method,
            expires_at: entry.expires_at,
        }
    }

    pub fn into_entry(self) -> ResolutionCacheEntry {
        ResolutionCacheEntry {
            lookup_key: self.lookup_key,
            account_id: self.account_id,
            resolution_method: self.resolution_method,
            expires_at: self.expires_at,
        }
    }
}
