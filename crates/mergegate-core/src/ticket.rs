//! Tickets and identity-resolution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::ChangeRef;
use crate::instance::WorkflowId;

/// How an assignee account was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Served from the resolution cache.
    Cache,

    /// Direct account search by the primary contact identifier.
    DirectLookup,

    /// Lookup by an identifier derived from the username pattern.
    DerivedIdentifier,

    /// Static mapping table from configuration.
    StaticMapping,

    /// Component-ownership lookup keyed by changed paths.
    ComponentOwnership,

    /// Configured default assignee.
    DefaultAssignee,
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionMethod::Cache => "cache",
            ResolutionMethod::DirectLookup => "direct_lookup",
            ResolutionMethod::DerivedIdentifier => "derived_identifier",
            ResolutionMethod::StaticMapping => "static_mapping",
            ResolutionMethod::ComponentOwnership => "component_ownership",
            ResolutionMethod::DefaultAssignee => "default_assignee",
        };
        write!(f, "{s}")
    }
}

/// A link attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalLink {
    /// What the link points at.
    pub kind: LinkKind,

    /// Opaque reference understood by the target system.
    pub reference: String,
}

/// Kind of external link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// The originating change on the code host.
    Change,

    /// The workflow run that produced the ticket.
    WorkflowRun,
}

/// A filed ticket. Exactly one may exist per blocked workflow instance;
/// creation is idempotent on the change's idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Key assigned by the ticketing system (e.g. "QA-1042").
    pub external_key: String,

    /// The workflow instance that produced this ticket.
    pub workflow_id: WorkflowId,

    /// The change revision the ticket tracks.
    pub change_ref: ChangeRef,

    /// Resolved assignee account, if any.
    pub assignee_account: Option<String>,

    /// How the assignee was determined; `None` when unresolved.
    pub assignment_method: Option<ResolutionMethod>,

    /// Links recorded against the ticket.
    pub links: Vec<ExternalLink>,

    /// When the ticket was created.
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// The idempotency key this ticket is stored under.
    pub fn idempotency_key(&self) -> String {
        self.change_ref.idempotency_key()
    }
}

/// A cached identity resolution. Owned by the cache store, evicted by TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionCacheEntry {
    /// The identifier that was looked up.
    pub lookup_key: String,

    /// The resolved ticketing-system account.
    pub account_id: String,

    /// The method that originally produced this resolution.
    pub resolution_method: ResolutionMethod,

    /// When this entry stops being served.
    pub expires_at: DateTime<Utc>,
}

impl ResolutionCacheEntry {
    pub fn new(
        lookup_key: impl Into<String>,
        account_id: impl Into<String>,
        resolution_method: ResolutionMethod,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lookup_key: lookup_key.into(),
            account_id: account_id.into(),
            resolution_method,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
