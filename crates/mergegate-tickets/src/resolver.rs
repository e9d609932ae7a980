//! Identity resolution: change author to ticketing-system account.
//!
//! Ordered lookup chain, first success wins:
//! 1. cache by primary contact identifier
//! 2. direct account search by that identifier
//! 3. search by an identifier derived from the username pattern
//! 4. static mapping table
//! 5. component-ownership lookup keyed by changed paths
//! 6. configured default assignee
//!
//! Steps 2–5 write back to the cache with a TTL. A full miss is not an
//! error: it returns `ResolveOutcome::Unresolved`, which callers handle as
//! fallback assignment plus an operational alarm.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mergegate_core::{AuthorIdentity, ResolutionCacheEntry, ResolutionMethod};
use mergegate_gateway::{Gateway, TicketClient};
use mergegate_state::storage_traits::ResolutionCache;

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub account_id: String,
    pub method: ResolutionMethod,
}

/// Terminal outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveOutcome {
    Resolved(Resolution),
    /// Every step missed. A valid outcome, not an error.
    Unresolved,
}

impl ResolveOutcome {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            ResolveOutcome::Resolved(r) => Some(&r.account_id),
            ResolveOutcome::Unresolved => None,
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Pattern for the derived identifier; `{username}` is substituted.
    /// Empty disables the derived-identifier step.
    pub derived_identifier_pattern: String,

    /// Static identifier-to-account mappings.
    pub static_mappings: BTreeMap<String, String>,

    /// Path-prefix-to-account component ownership table.
    pub component_owners: BTreeMap<String, String>,

    /// Assignee of last resort. `None` means a full miss is possible.
    pub default_assignee: Option<String>,

    /// Cache TTL for successful resolutions.
    pub cache_ttl_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            derived_identifier_pattern: String::new(),
            static_mappings: BTreeMap::new(),
            component_owners: BTreeMap::new(),
            default_assignee: None,
            cache_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Maps a change-author identity to a ticketing account.
pub struct IdentityResolver {
    cache: Arc<dyn ResolutionCache>,
    tickets: Arc<dyn TicketClient>,
    gateway: Arc<Gateway>,
    config: ResolverConfig,
}

impl IdentityResolver {
    pub fn new(
        cache: Arc<dyn ResolutionCache>,
        tickets: Arc<dyn TicketClient>,
        gateway: Arc<Gateway>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            tickets,
            gateway,
            config,
        }
    }

    /// Resolve an author to an account.
    ///
    /// Infallible by design: every lookup failure is absorbed as a miss
    /// with a recorded warning, and the chain falls through to the next
    /// step. A cache hit never triggers an external call.
    pub async fn resolve(
        &self,
        author: &AuthorIdentity,
        changed_paths: &[String],
        now: DateTime<Utc>,
    ) -> ResolveOutcome {
        let key = author.primary_contact.as_str();

        // (1) Cache.
        match self.cache.get(key, now).await {
            Ok(Some(entry)) => {
                debug!(lookup_key = key, account = %entry.account_id, "resolution cache hit");
                return ResolveOutcome::Resolved(Resolution {
                    account_id: entry.account_id,
                    method: ResolutionMethod::Cache,
                });
            }
            Ok(None) => {}
            Err(err) => {
                warn!(lookup_key = key, error = %err, "resolution cache read failed; treating as miss");
            }
        }

        // (2) Direct lookup by primary contact.
        if let Some(account) = self.search_account(key).await {
            return self
                .resolved_and_cached(key, account, ResolutionMethod::DirectLookup, now)
                .await;
        }

        // (3) Derived identifier from the username pattern.
        if !self.config.derived_identifier_pattern.is_empty() {
            let derived = self
                .config
                .derived_identifier_pattern
                .replace("{username}", &author.username);
            if let Some(account) = self.search_account(&derived).await {
                return self
                    .resolved_and_cached(key, account, ResolutionMethod::DerivedIdentifier, now)
                    .await;
            }
        }

        // (4) Static mapping table, by primary contact then username.
        let mapped = self
            .config
            .static_mappings
            .get(key)
            .or_else(|| self.config.static_mappings.get(&author.username));
        if let Some(account) = mapped {
            return self
                .resolved_and_cached(key, account.clone(), ResolutionMethod::StaticMapping, now)
                .await;
        }

        // (5) Component ownership by changed paths: longest matching prefix
        // across paths, in path order, for a deterministic pick.
        if let Some(account) = self.component_owner(changed_paths) {
            return self
                .resolved_and_cached(key, account, ResolutionMethod::ComponentOwnership, now)
                .await;
        }

        // (6) Default assignee. Not cached: it reflects config, not identity.
        if let Some(account) = &self.config.default_assignee {
            debug!(lookup_key = key, account = %account, "falling back to default assignee");
            return ResolveOutcome::Resolved(Resolution {
                account_id: account.clone(),
                method: ResolutionMethod::DefaultAssignee,
            });
        }

        warn!(alarm = true, lookup_key = key, "identity unresolved after full chain");
        ResolveOutcome::Unresolved
    }

    async fn search_account(&self, identifier: &str) -> Option<String> {
        let tickets = self.tickets.clone();
        let identifier_owned = identifier.to_string();
        let result = self
            .gateway
            .call("ticketing", || {
                let tickets = tickets.clone();
                let identifier = identifier_owned.clone();
                async move { tickets.search_account(&identifier).await }
            })
            .await;

        match result {
            Ok(hit) => hit,
            Err(err) => {
                warn!(identifier, error = %err, "account search failed; treating as miss");
                None
            }
        }
    }

    fn component_owner(&self, changed_paths: &[String]) -> Option<String> {
        for path in changed_paths {
            let owner = self
                .config
                .component_owners
                .iter()
                .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, account)| account.clone());
            if owner.is_some() {
                return owner;
            }
        }
        None
    }

    async fn resolved_and_cached(
        &self,
        lookup_key: &str,
        account_id: String,
        method: ResolutionMethod,
        now: DateTime<Utc>,
    ) -> ResolveOutcome {
        let entry = ResolutionCacheEntry::new(
            lookup_key,
            account_id.clone(),
            method,
            now + Duration::seconds(self.config.cache_ttl_secs as i64),
        );
        if let Err(err) = self.cache.put(entry).await {
            warn!(lookup_key, error = %err, "resolution cache write failed");
        }
        debug!(lookup_key, account = %account_id, method = %method, "identity resolved");
        ResolveOutcome::Resolved(Resolution { account_id, method })
    }
}
