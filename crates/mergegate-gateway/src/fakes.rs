//! In-memory fakes for the dependency clients (testing only)
//!
//! Scripted checkers, a recording code host, and a fake ticketing system
//! with injectable failures. These let the engine and ticket subsystem be
//! tested without any transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mergegate_core::{ChangeRef, CheckerVerdict};

use crate::clients::{
    CheckRequest, CheckerClient, CodeHostClient, StatusCheck, TicketClient, TicketCreate,
};
use crate::error::{GatewayError, GatewayResult};

fn transient(dependency: &str, detail: &str) -> GatewayError {
    GatewayError::Transient {
        dependency: dependency.to_string(),
        detail: detail.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Checkers
// ---------------------------------------------------------------------------

/// Checker that always returns the same verdict.
pub struct StaticCheckerClient {
    verdict: CheckerVerdict,
    calls: AtomicU32,
}

impl StaticCheckerClient {
    pub fn new(verdict: CheckerVerdict) -> Self {
        Self {
            verdict,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckerClient for StaticCheckerClient {
    async fn run_check(&self, _request: &CheckRequest) -> GatewayResult<CheckerVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict.clone())
    }
}

/// Checker that fails transiently N times before returning its verdict.
pub struct FlakyCheckerClient {
    failures_remaining: AtomicU32,
    verdict: CheckerVerdict,
    calls: AtomicU32,
}

impl FlakyCheckerClient {
    pub fn new(failures: u32, verdict: CheckerVerdict) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            verdict,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckerClient for FlakyCheckerClient {
    async fn run_check(&self, _request: &CheckRequest) -> GatewayResult<CheckerVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(transient("checker", "injected transient failure"));
        }
        Ok(self.verdict.clone())
    }
}

/// Checker that never answers usefully: every call is a transient failure.
#[derive(Default)]
pub struct DownCheckerClient {
    calls: AtomicU32,
}

impl DownCheckerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckerClient for DownCheckerClient {
    async fn run_check(&self, _request: &CheckRequest) -> GatewayResult<CheckerVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(transient("checker", "dependency down"))
    }
}

// ---------------------------------------------------------------------------
// Code host
// ---------------------------------------------------------------------------

/// Code host that records everything posted to it.
#[derive(Default)]
pub struct RecordingCodeHostClient {
    pub statuses: Mutex<Vec<(ChangeRef, StatusCheck)>>,
    pub comments: Mutex<Vec<(ChangeRef, String)>>,
    pub merges: Mutex<Vec<ChangeRef>>,
}

impl RecordingCodeHostClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.lock().unwrap().len()
    }

    pub fn merge_count(&self) -> usize {
        self.merges.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeHostClient for RecordingCodeHostClient {
    async fn post_status(&self, change: &ChangeRef, status: &StatusCheck) -> GatewayResult<()> {
        self.statuses
            .lock()
            .unwrap()
            .push((change.clone(), status.clone()));
        Ok(())
    }

    async fn post_comment(&self, change: &ChangeRef, body: &str) -> GatewayResult<()> {
        self.comments
            .lock()
            .unwrap()
            .push((change.clone(), body.to_string()));
        Ok(())
    }

    async fn request_merge(&self, change: &ChangeRef) -> GatewayResult<()> {
        self.merges.lock().unwrap().push(change.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ticketing
// ---------------------------------------------------------------------------

/// Fake ticketing system with injectable failures.
///
/// Accounts are looked up from a static map; created tickets get sequential
/// keys ("QA-1", "QA-2", ...). `fail_creates` and `fail_links` inject
/// transient failures for degradation tests.
pub struct FakeTicketClient {
    accounts: Mutex<HashMap<String, String>>,
    created: Mutex<Vec<(String, TicketCreate)>>,
    links: Mutex<Vec<(String, String)>>,
    comments: Mutex<Vec<(String, String)>>,
    next_key: AtomicU32,
    fail_creates_remaining: AtomicU32,
    fail_links: AtomicU32,
    search_calls: AtomicU32,
}

impl Default for FakeTicketClient {
    fn default() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            next_key: AtomicU32::new(1),
            fail_creates_remaining: AtomicU32::new(0),
            fail_links: AtomicU32::new(0),
            search_calls: AtomicU32::new(0),
        }
    }
}

impl FakeTicketClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account for `search_account` lookups.
    pub fn with_account(self, identifier: &str, account_id: &str) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(identifier.to_string(), account_id.to_string());
        self
    }

    /// Make the next `n` create calls fail transiently.
    pub fn fail_next_creates(&self, n: u32) {
        self.fail_creates_remaining.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` link calls fail transiently.
    pub fn fail_next_links(&self, n: u32) {
        self.fail_links.store(n, Ordering::SeqCst);
    }

    pub fn created_tickets(&self) -> Vec<(String, TicketCreate)> {
        self.created.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn links(&self) -> Vec<(String, String)> {
        self.links.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    /// How many times `search_account` was called.
    pub fn search_call_count(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketClient for FakeTicketClient {
    async fn create(&self, request: &TicketCreate) -> GatewayResult<String> {
        let failures = self.fail_creates_remaining.load(Ordering::SeqCst);
        if failures > 0 {
            self.fail_creates_remaining.store(failures - 1, Ordering::SeqCst);
            return Err(transient("ticketing", "injected create failure"));
        }

        let key = format!("QA-{}", self.next_key.fetch_add(1, Ordering::SeqCst));
        self.created
            .lock()
            .unwrap()
            .push((key.clone(), request.clone()));
        Ok(key)
    }

    async fn link(&self, ticket_key: &str, external_ref: &str) -> GatewayResult<()> {
        let failures = self.fail_links.load(Ordering::SeqCst);
        if failures > 0 {
            self.fail_links.store(failures - 1, Ordering::SeqCst);
            return Err(transient("ticketing", "injected link failure"));
        }
        self.links
            .lock()
            .unwrap()
            .push((ticket_key.to_string(), external_ref.to_string()));
        Ok(())
    }

    async fn comment(&self, ticket_key: &str, body: &str) -> GatewayResult<()> {
        self.comments
            .lock()
            .unwrap()
            .push((ticket_key.to_string(), body.to_string()));
        Ok(())
    }

    async fn search_account(&self, identifier: &str) -> GatewayResult<Option<String>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().unwrap().get(identifier).cloned())
    }
}
