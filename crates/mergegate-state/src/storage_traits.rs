//! Storage trait definitions for Mergegate
//!
//! These traits define the persistence abstractions:
//! - `InstanceStore`: workflow instance persistence keyed by the change triple
//! - `TicketStore`: filed-ticket records keyed by idempotency key
//! - `ResolutionCache`: TTL-bounded identity resolution cache
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mergegate_core::{
    ResolutionCacheEntry, Ticket, WorkflowId, WorkflowInstance, WorkflowStatus,
};

use crate::error::StorageResult;

/// Workflow instance persistence.
///
/// Guarantees:
/// - `put_instance` upserts by workflow id; the latest write wins.
/// - At most one *active* instance exists per `(repository, change_id)` —
///   enforced by the engine's supersession logic, surfaced via `find_active`.
/// - Terminal instances are retained for audit and never deleted.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert or replace an instance record.
    async fn put_instance(&self, instance: &WorkflowInstance) -> StorageResult<()>;

    /// Fetch an instance by id. Returns `InstanceNotFound` if absent.
    async fn get_instance(&self, id: &WorkflowId) -> StorageResult<WorkflowInstance>;

    /// Find the active (Pending/InProgress/WaitingReview) instance for a
    /// change, if one exists.
    async fn find_active(
        &self,
        repository: &str,
        change_id: &str,
    ) -> StorageResult<Option<WorkflowInstance>>;

    /// List instances currently in the given status.
    async fn list_by_status(
        &self,
        status: WorkflowStatus,
    ) -> StorageResult<Vec<WorkflowInstance>>;

    /// List all instances, optionally filtered by repository.
    async fn list_instances(
        &self,
        repository: Option<&str>,
    ) -> StorageResult<Vec<WorkflowInstance>>;
}

/// Filed-ticket records.
///
/// Guarantees:
/// - Records are append-only; tickets are never deleted or rewritten.
/// - `find_by_key` returns every ticket recorded under an idempotency key,
///   oldest first — the caller treats the oldest as canonical if more than
///   one exists (internal inconsistency, logged and alarmed upstream).
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Record a filed ticket.
    async fn record_ticket(&self, ticket: &Ticket) -> StorageResult<()>;

    /// All tickets recorded under the given idempotency key, oldest first.
    async fn find_by_key(&self, idempotency_key: &str) -> StorageResult<Vec<Ticket>>;

    /// All recorded tickets, oldest first.
    async fn list_tickets(&self) -> StorageResult<Vec<Ticket>>;
}

/// TTL-bounded identity resolution cache.
///
/// Guarantees:
/// - `get` never returns an entry whose `expires_at` is at or before `now`.
/// - `put` replaces any existing entry for the same lookup key (atomic
///   get-or-set from the caller's perspective; no cross-entry locking).
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    /// Fetch a live cache entry, or `None` on miss/expiry.
    async fn get(
        &self,
        lookup_key: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ResolutionCacheEntry>>;

    /// Insert or replace the entry for its lookup key.
    async fn put(&self, entry: ResolutionCacheEntry) -> StorageResult<()>;
}
