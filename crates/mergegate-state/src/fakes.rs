//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryInstanceStore`, `MemoryTicketStore`, and
//! `MemoryResolutionCache` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mergegate_core::{
    ResolutionCacheEntry, Ticket, WorkflowId, WorkflowInstance, WorkflowStatus,
};

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryInstanceStore
// ---------------------------------------------------------------------------

/// In-memory instance store backed by a `HashMap<workflow_id, instance>`.
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    instances: Mutex<HashMap<String, WorkflowInstance>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn put_instance(&self, instance: &WorkflowInstance) -> StorageResult<()> {
        let mut instances = self.instances.lock().unwrap();
        instances.insert(instance.id.0.clone(), instance.clone());
        Ok(())
    }

    async fn get_instance(&self, id: &WorkflowId) -> StorageResult<WorkflowInstance> {
        let instances = self.instances.lock().unwrap();
        instances
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::InstanceNotFound {
                workflow_id: id.0.clone(),
            })
    }

    async fn find_active(
        &self,
        repository: &str,
        change_id: &str,
    ) -> StorageResult<Option<WorkflowInstance>> {
        let instances = self.instances.lock().unwrap();
        Ok(instances
            .values()
            .find(|i| {
                i.status.is_active()
                    && i.change_ref.repository == repository
                    && i.change_ref.change_id == change_id
            })
            .cloned())
    }

    async fn list_by_status(
        &self,
        status: WorkflowStatus,
    ) -> StorageResult<Vec<WorkflowInstance>> {
        let instances = self.instances.lock().unwrap();
        let mut out: Vec<WorkflowInstance> = instances
            .values()
            .filter(|i| i.status == status)
            .cloned()
            .collect();
        out.sort_by_key(|i| i.started_at);
        Ok(out)
    }

    async fn list_instances(
        &self,
        repository: Option<&str>,
    ) -> StorageResult<Vec<WorkflowInstance>> {
        let instances = self.instances.lock().unwrap();
        let mut out: Vec<WorkflowInstance> = instances
            .values()
            .filter(|i| repository.map_or(true, |r| i.change_ref.repository == r))
            .cloned()
            .collect();
        out.sort_by_key(|i| i.started_at);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryTicketStore
// ---------------------------------------------------------------------------

/// In-memory ticket store; append-only, keyed by idempotency key.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: Mutex<Vec<Ticket>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn record_ticket(&self, ticket: &Ticket) -> StorageResult<()> {
        let mut tickets = self.tickets.lock().unwrap();
        tickets.push(ticket.clone());
        Ok(())
    }

    async fn find_by_key(&self, idempotency_key: &str) -> StorageResult<Vec<Ticket>> {
        let tickets = self.tickets.lock().unwrap();
        let mut out: Vec<Ticket> = tickets
            .iter()
            .filter(|t| t.idempotency_key() == idempotency_key)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }

    async fn list_tickets(&self) -> StorageResult<Vec<Ticket>> {
        let tickets = self.tickets.lock().unwrap();
        let mut out = tickets.clone();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemoryResolutionCache
// ---------------------------------------------------------------------------

/// In-memory resolution cache with TTL eviction on read.
#[derive(Debug, Default)]
pub struct MemoryResolutionCache {
    entries: Mutex<HashMap<String, ResolutionCacheEntry>>,
}

impl MemoryResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired) entries. Test helper.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResolutionCache for MemoryResolutionCache {
    async fn get(
        &self,
        lookup_key: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ResolutionCacheEntry>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(lookup_key) {
            Some(entry) if entry.is_expired_at(now) => {
                entries.remove(lookup_key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, entry: ResolutionCacheEntry) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(entry.lookup_key.clone(), entry);
        Ok(())
    }
}
