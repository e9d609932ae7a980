//! Change identity and inbound change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a single reviewed change revision.
///
/// The triple `(repository, change_id, head_revision)` keys workflow
/// instances and tickets. Two events with the same repository and change_id
/// but different head revisions belong to the same change, and the newer
/// one supersedes the older workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRef {
    /// Repository the change targets (e.g. "org/service").
    pub repository: String,

    /// Stable change identifier assigned by the code host.
    pub change_id: String,

    /// Head revision (commit SHA) of the change at event time.
    pub head_revision: String,
}

impl ChangeRef {
    pub fn new(
        repository: impl Into<String>,
        change_id: impl Into<String>,
        head_revision: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            change_id: change_id.into(),
            head_revision: head_revision.into(),
        }
    }

    /// Deterministic idempotency key for this revision.
    ///
    /// SHA-256 over the NUL-separated identity triple. Ticket creation is
    /// keyed on this value, so a retried creation for the same revision
    /// always lands on the same key.
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.repository.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.change_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.head_revision.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Key identifying the change independent of revision.
    ///
    /// Used for the supersession rule: at most one active instance per
    /// `(repository, change_id)`.
    pub fn change_key(&self) -> (String, String) {
        (self.repository.clone(), self.change_id.clone())
    }
}

impl std::fmt::Display for ChangeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.repository,
            self.change_id,
            &self.head_revision[..12.min(self.head_revision.len())]
        )
    }
}

/// Identity of the change author as reported by the code host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorIdentity {
    /// Primary contact identifier (usually the commit email).
    pub primary_contact: String,

    /// Code-host username.
    pub username: String,

    /// Optional display name.
    pub display_name: Option<String>,
}

impl AuthorIdentity {
    pub fn new(primary_contact: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            primary_contact: primary_contact.into(),
            username: username.into(),
            display_name: None,
        }
    }
}

/// Inbound change event consumed from the code host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Identity of the change revision this event announces.
    pub change_ref: ChangeRef,

    /// Author of the change.
    pub author: AuthorIdentity,

    /// Paths touched by the change.
    pub changed_paths: Vec<String>,

    /// Draft changes are reviewed but never auto-merged.
    pub is_draft: bool,

    /// When the event was received.
    pub received_at: DateTime<Utc>,
}
