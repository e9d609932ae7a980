//! Trait contract tests for InstanceStore, TicketStore, and ResolutionCache.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using in-memory fakes. Any conforming implementation must pass these.

use chrono::Utc;
use mergegate_core::{
    AuthorIdentity, ChangeEvent, ChangeRef, ResolutionCacheEntry, ResolutionMethod, Ticket,
    WorkflowId, WorkflowInstance, WorkflowStatus,
};
use mergegate_state::fakes::{MemoryInstanceStore, MemoryResolutionCache, MemoryTicketStore};
use mergegate_state::storage_traits::*;
use mergegate_state::StorageError;

fn sample_instance(repository: &str, change_id: &str, revision: &str) -> WorkflowInstance {
    let event = ChangeEvent {
        change_ref: ChangeRef::new(repository, change_id, revision),
        author: AuthorIdentity::new("dev@example.com", "dev"),
        changed_paths: vec!["src/lib.rs".into()],
        is_draft: false,
        received_at: Utc::now(),
    };
    WorkflowInstance::from_event(event, Utc::now() + chrono::Duration::hours(4))
}

fn sample_ticket(instance: &WorkflowInstance, external_key: &str) -> Ticket {
    Ticket {
        external_key: external_key.to_string(),
        workflow_id: instance.id.clone(),
        change_ref: instance.change_ref.clone(),
        assignee_account: Some("acct-1".into()),
        assignment_method: Some(ResolutionMethod::DirectLookup),
        links: Vec::new(),
        created_at: Utc::now(),
    }
}

// ===========================================================================
// InstanceStore contract tests
// ===========================================================================

#[tokio::test]
async fn instance_put_get_round_trip() {
    let store = MemoryInstanceStore::new();
    let instance = sample_instance("org/svc", "42", "abc");
    store.put_instance(&instance).await.unwrap();

    let back = store.get_instance(&instance.id).await.unwrap();
    assert_eq!(back, instance);
}

#[tokio::test]
async fn instance_get_not_found() {
    let store = MemoryInstanceStore::new();
    let err = store.get_instance(&WorkflowId::new()).await.unwrap_err();
    assert!(matches!(err, StorageError::InstanceNotFound { .. }));
}

#[tokio::test]
async fn instance_put_is_upsert() {
    let store = MemoryInstanceStore::new();
    let mut instance = sample_instance("org/svc", "42", "abc");
    store.put_instance(&instance).await.unwrap();

    instance.status = WorkflowStatus::InProgress;
    store.put_instance(&instance).await.unwrap();

    let back = store.get_instance(&instance.id).await.unwrap();
    assert_eq!(back.status, WorkflowStatus::InProgress);
    assert_eq!(store.list_instances(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn instance_find_active_by_change() {
    let store = MemoryInstanceStore::new();
    let instance = sample_instance("org/svc", "42", "abc");
    store.put_instance(&instance).await.unwrap();

    let found = store.find_active("org/svc", "42").await.unwrap();
    assert_eq!(found.as_ref().map(|i| &i.id), Some(&instance.id));

    assert!(store.find_active("org/svc", "43").await.unwrap().is_none());
    assert!(store.find_active("org/other", "42").await.unwrap().is_none());
}

#[tokio::test]
async fn instance_find_active_ignores_terminal() {
    let store = MemoryInstanceStore::new();
    let mut instance = sample_instance("org/svc", "42", "abc");
    instance.status = WorkflowStatus::Blocked;
    store.put_instance(&instance).await.unwrap();

    assert!(store.find_active("org/svc", "42").await.unwrap().is_none());
}

#[tokio::test]
async fn instance_list_by_status() {
    let store = MemoryInstanceStore::new();
    let pending = sample_instance("org/svc", "1", "a");
    let mut blocked = sample_instance("org/svc", "2", "b");
    blocked.status = WorkflowStatus::Blocked;
    store.put_instance(&pending).await.unwrap();
    store.put_instance(&blocked).await.unwrap();

    let pendings = store.list_by_status(WorkflowStatus::Pending).await.unwrap();
    assert_eq!(pendings.len(), 1);
    assert_eq!(pendings[0].id, pending.id);

    let blockeds = store.list_by_status(WorkflowStatus::Blocked).await.unwrap();
    assert_eq!(blockeds.len(), 1);
}

#[tokio::test]
async fn instance_list_filters_by_repository() {
    let store = MemoryInstanceStore::new();
    store
        .put_instance(&sample_instance("org/a", "1", "x"))
        .await
        .unwrap();
    store
        .put_instance(&sample_instance("org/b", "2", "y"))
        .await
        .unwrap();

    assert_eq!(store.list_instances(Some("org/a")).await.unwrap().len(), 1);
    assert_eq!(store.list_instances(None).await.unwrap().len(), 2);
}

// ===========================================================================
// TicketStore contract tests
// ===========================================================================

#[tokio::test]
async fn ticket_record_and_find_by_key() {
    let store = MemoryTicketStore::new();
    let instance = sample_instance("org/svc", "42", "abc");
    let ticket = sample_ticket(&instance, "QA-1");
    store.record_ticket(&ticket).await.unwrap();

    let found = store.find_by_key(&ticket.idempotency_key()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].external_key, "QA-1");
}

#[tokio::test]
async fn ticket_find_by_key_empty_for_unknown() {
    let store = MemoryTicketStore::new();
    assert!(store.find_by_key("deadbeef").await.unwrap().is_empty());
}

#[tokio::test]
async fn ticket_duplicates_returned_oldest_first() {
    let store = MemoryTicketStore::new();
    let instance = sample_instance("org/svc", "42", "abc");

    let mut older = sample_ticket(&instance, "QA-1");
    older.created_at = Utc::now() - chrono::Duration::minutes(10);
    let newer = sample_ticket(&instance, "QA-2");

    // Insertion order reversed on purpose.
    store.record_ticket(&newer).await.unwrap();
    store.record_ticket(&older).await.unwrap();

    let found = store.find_by_key(&older.idempotency_key()).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].external_key, "QA-1");
    assert_eq!(found[1].external_key, "QA-2");
}

#[tokio::test]
async fn ticket_keys_differ_per_revision() {
    let store = MemoryTicketStore::new();
    let first = sample_instance("org/svc", "42", "abc");
    let second = sample_instance("org/svc", "42", "def");
    store.record_ticket(&sample_ticket(&first, "QA-1")).await.unwrap();
    store
        .record_ticket(&sample_ticket(&second, "QA-2"))
        .await
        .unwrap();

    let found = store
        .find_by_key(&first.change_ref.idempotency_key())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].external_key, "QA-1");
}

// ===========================================================================
// ResolutionCache contract tests
// ===========================================================================

#[tokio::test]
async fn cache_put_get_round_trip() {
    let cache = MemoryResolutionCache::new();
    let now = Utc::now();
    let entry = ResolutionCacheEntry::new(
        "dev@example.com",
        "acct-1",
        ResolutionMethod::DirectLookup,
        now + chrono::Duration::hours(1),
    );
    cache.put(entry.clone()).await.unwrap();

    let got = cache.get("dev@example.com", now).await.unwrap();
    assert_eq!(got, Some(entry));
}

#[tokio::test]
async fn cache_miss_for_unknown_key() {
    let cache = MemoryResolutionCache::new();
    assert!(cache.get("nobody@example.com", Utc::now()).await.unwrap().is_none());
}

#[tokio::test]
async fn cache_expired_entry_is_evicted() {
    let cache = MemoryResolutionCache::new();
    let now = Utc::now();
    let entry = ResolutionCacheEntry::new(
        "dev@example.com",
        "acct-1",
        ResolutionMethod::DirectLookup,
        now + chrono::Duration::seconds(30),
    );
    cache.put(entry).await.unwrap();

    let later = now + chrono::Duration::minutes(5);
    assert!(cache.get("dev@example.com", later).await.unwrap().is_none());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn cache_put_replaces_existing_entry() {
    let cache = MemoryResolutionCache::new();
    let now = Utc::now();
    cache
        .put(ResolutionCacheEntry::new(
            "dev@example.com",
            "acct-old",
            ResolutionMethod::DirectLookup,
            now + chrono::Duration::hours(1),
        ))
        .await
        .unwrap();
    cache
        .put(ResolutionCacheEntry::new(
            "dev@example.com",
            "acct-new",
            ResolutionMethod::StaticMapping,
            now + chrono::Duration::hours(1),
        ))
        .await
        .unwrap();

    let got = cache.get("dev@example.com", now).await.unwrap().unwrap();
    assert_eq!(got.account_id, "acct-new");
    assert_eq!(got.resolution_method, ResolutionMethod::StaticMapping);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn cache_entries_stable_within_ttl() {
    let cache = MemoryResolutionCache::new();
    let now = Utc::now();
    let entry = ResolutionCacheEntry::new(
        "dev@example.com",
        "acct-1",
        ResolutionMethod::ComponentOwnership,
        now + chrono::Duration::hours(1),
    );
    cache.put(entry.clone()).await.unwrap();

    // Observably stable for the TTL window.
    for minutes in [0i64, 10, 30, 59] {
        let at = now + chrono::Duration::minutes(minutes);
        assert_eq!(cache.get("dev@example.com", at).await.unwrap(), Some(entry.clone()));
    }
}

// ===========================================================================
// SurrealStore contract tests (mirrors the memory-fake tests above)
// ===========================================================================

mod surreal_store_tests {
    use super::*;
    use mergegate_state::SurrealStore;

    async fn store() -> SurrealStore {
        SurrealStore::in_memory().await.expect("in_memory() failed")
    }

    #[tokio::test]
    async fn instance_put_get_round_trip() {
        let store = store().await;
        let instance = sample_instance("org/svc", "42", "abc");
        store.put_instance(&instance).await.unwrap();

        let back = store.get_instance(&instance.id).await.unwrap();
        assert_eq!(back, instance);
    }

    #[tokio::test]
    async fn instance_get_not_found() {
        let store = store().await;
        let err = store.get_instance(&WorkflowId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::InstanceNotFound { .. }));
    }

    #[tokio::test]
    async fn instance_put_is_upsert() {
        let store = store().await;
        let mut instance = sample_instance("org/svc", "42", "abc");
        store.put_instance(&instance).await.unwrap();

        instance.status = WorkflowStatus::InProgress;
        store.put_instance(&instance).await.unwrap();

        let back = store.get_instance(&instance.id).await.unwrap();
        assert_eq!(back.status, WorkflowStatus::InProgress);
        assert_eq!(store.list_instances(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn instance_find_active_respects_supersession_key() {
        let store = store().await;
        let instance = sample_instance("org/svc", "42", "abc");
        store.put_instance(&instance).await.unwrap();

        let found = store.find_active("org/svc", "42").await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(instance.id.clone()));

        let mut terminal = store.get_instance(&instance.id).await.unwrap();
        terminal.status = WorkflowStatus::Blocked;
        store.put_instance(&terminal).await.unwrap();
        assert!(store.find_active("org/svc", "42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ticket_record_and_find_by_key() {
        let store = store().await;
        let instance = sample_instance("org/svc", "42", "abc");
        let ticket = sample_ticket(&instance, "QA-1");
        store.record_ticket(&ticket).await.unwrap();

        let found = store.find_by_key(&ticket.idempotency_key()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_key, "QA-1");
        assert!(store.find_by_key("deadbeef").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_round_trip_and_expiry() {
        let store = store().await;
        let now = Utc::now();
        let entry = ResolutionCacheEntry::new(
            "dev@example.com",
            "acct-1",
            ResolutionMethod::DirectLookup,
            now + chrono::Duration::hours(1),
        );
        store.put(entry.clone()).await.unwrap();

        assert_eq!(store.get("dev@example.com", now).await.unwrap(), Some(entry));
        assert!(store
            .get("dev@example.com", now + chrono::Duration::hours(2))
            .await
            .unwrap()
            .is_none());
    }
}
