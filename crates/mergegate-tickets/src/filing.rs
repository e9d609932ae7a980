//! Idempotent ticket filing.
//!
//! Before creating, the filer checks for an existing ticket under the
//! change's idempotency key; a retried filing returns the existing ticket
//! unchanged. Link/comment enrichment is best-effort: failures degrade the
//! result to `PartialSuccess` and queue an async retry instead of failing
//! the filing.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use mergegate_core::{
    AggregatedReport, ExternalLink, LinkKind, Ticket, WorkflowInstance,
};
use mergegate_gateway::{Gateway, TicketClient, TicketCreate};
use mergegate_state::storage_traits::TicketStore;

use crate::compose::{ticket_body, ticket_reference_comment, ticket_summary};
use crate::error::{TicketError, TicketResult};
use crate::resolver::{IdentityResolver, ResolveOutcome};

/// Ticket subsystem configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketConfig {
    /// Target project in the ticketing system.
    pub project: String,

    /// Issue type used for filed tickets.
    pub issue_type: String,

    /// Labels attached to every filed ticket.
    pub labels: Vec<String>,

    /// Base URL for workflow-run links embedded in ticket bodies.
    pub run_link_base: String,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            project: "QA".into(),
            issue_type: "Bug".into(),
            labels: vec!["mergegate".into()],
            run_link_base: "https://mergegate.local/runs".into(),
        }
    }
}

/// Overall outcome of a filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingOutcome {
    /// Ticket exists and every enrichment step succeeded.
    Success,

    /// Ticket exists but linking or assignment degraded.
    PartialSuccess,
}

/// Result of a successful (possibly degraded) filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketFiling {
    pub ticket: Ticket,
    pub outcome: FilingOutcome,

    /// Degradations recorded along the way.
    pub warnings: Vec<String>,

    /// True when an existing ticket was found and reused.
    pub reused_existing: bool,
}

/// A deferred enrichment action queued for async retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferredAction {
    Link {
        ticket_key: String,
        external_ref: String,
    },
    Comment {
        ticket_key: String,
        body: String,
    },
}

/// Files tickets for blocked workflow instances.
pub struct TicketFiler {
    store: Arc<dyn TicketStore>,
    client: Arc<dyn TicketClient>,
    gateway: Arc<Gateway>,
    resolver: IdentityResolver,
    config: TicketConfig,
    deferred: Mutex<Vec<DeferredAction>>,
}

impl TicketFiler {
    pub fn new(
        store: Arc<dyn TicketStore>,
        client: Arc<dyn TicketClient>,
        gateway: Arc<Gateway>,
        resolver: IdentityResolver,
        config: TicketConfig,
    ) -> Self {
        Self {
            store,
            client,
            gateway,
            resolver,
            config,
            deferred: Mutex::new(Vec::new()),
        }
    }

    /// File a ticket for a blocked instance.
    ///
    /// Idempotent on `(repository, change_id, head_revision)`: a retried
    /// call finds the existing ticket and returns it unchanged — no
    /// duplicate creation, no reassignment. An `Err` means the ticket
    /// itself could not be created; the caller must still block the merge
    /// and raise an operational alert.
    pub async fn file_ticket(
        &self,
        instance: &WorkflowInstance,
        report: &AggregatedReport,
        now: DateTime<Utc>,
    ) -> TicketResult<TicketFiling> {
        let key = instance.change_ref.idempotency_key();

        // Idempotency check first: never create twice for the same revision.
        let existing = self.store.find_by_key(&key).await?;
        if let Some(canonical) = existing.first() {
            if existing.len() > 1 {
                error!(
                    alarm = true,
                    idempotency_key = %key,
                    count = existing.len(),
                    canonical = %canonical.external_key,
                    "multiple tickets found for one key; treating oldest as canonical"
                );
            }
            info!(
                ticket = %canonical.external_key,
                change = %instance.change_ref,
                "reusing existing ticket"
            );
            return Ok(TicketFiling {
                ticket: canonical.clone(),
                outcome: FilingOutcome::Success,
                warnings: Vec::new(),
                reused_existing: true,
            });
        }

        let mut warnings = Vec::new();

        // Resolve the assignee. An unresolved identity degrades the filing
        // but never fails it.
        let outcome = self
            .resolver
            .resolve(&instance.author, &instance.changed_paths, now)
            .await;
        let (assignee, method) = match outcome {
            ResolveOutcome::Resolved(resolution) => {
                (Some(resolution.account_id), Some(resolution.method))
            }
            ResolveOutcome::Unresolved => {
                warnings.push(format!(
                    "assignee unresolved for {}",
                    instance.author.primary_contact
                ));
                (None, None)
            }
        };

        // Compose and create.
        let run_link = format!("{}/{}", self.config.run_link_base, instance.id);
        let request = TicketCreate {
            project: self.config.project.clone(),
            issue_type: self.config.issue_type.clone(),
            summary: ticket_summary(instance, report),
            body: ticket_body(instance, report, &run_link),
            assignee: assignee.clone(),
            labels: self.config.labels.clone(),
        };

        let client = self.client.clone();
        let external_key = self
            .gateway
            .call("ticketing", || {
                let client = client.clone();
                let request = request.clone();
                async move { client.create(&request).await }
            })
            .await
            .map_err(|err| {
                error!(alarm = true, change = %instance.change_ref, error = %err, "ticket creation failed");
                TicketError::CreationFailed {
                    detail: err.to_string(),
                }
            })?;

        info!(
            ticket = %external_key,
            change = %instance.change_ref,
            assignee = assignee.as_deref().unwrap_or("<unassigned>"),
            "ticket created"
        );

        let mut links = vec![ExternalLink {
            kind: LinkKind::WorkflowRun,
            reference: run_link,
        }];

        // Best-effort enrichment: link to the change, then a reference
        // comment. Failures degrade, never fail the filing.
        let change_ref_str = instance.change_ref.to_string();
        if self
            .try_enrich(DeferredAction::Link {
                ticket_key: external_key.clone(),
                external_ref: change_ref_str.clone(),
            })
            .await
        {
            links.push(ExternalLink {
                kind: LinkKind::Change,
                reference: change_ref_str,
            });
        } else {
            warnings.push(format!("link to change failed for {}", external_key));
        }

        if !self
            .try_enrich(DeferredAction::Comment {
                ticket_key: external_key.clone(),
                body: ticket_reference_comment(instance),
            })
            .await
        {
            warnings.push(format!("reference comment failed for {}", external_key));
        }

        let ticket = Ticket {
            external_key,
            workflow_id: instance.id.clone(),
            change_ref: instance.change_ref.clone(),
            assignee_account: assignee,
            assignment_method: method,
            links,
            created_at: now,
        };

        // Recording failures degrade too: the ticket exists in the external
        // system, and losing it would be worse than a degraded record.
        if let Err(err) = self.store.record_ticket(&ticket).await {
            error!(
                alarm = true,
                ticket = %ticket.external_key,
                error = %err,
                "failed to record ticket; idempotency on retry is degraded"
            );
            warnings.push(format!("ticket record failed: {err}"));
        }

        let outcome = if warnings.is_empty() {
            FilingOutcome::Success
        } else {
            FilingOutcome::PartialSuccess
        };

        Ok(TicketFiling {
            ticket,
            outcome,
            warnings,
            reused_existing: false,
        })
    }

    /// Attempt an enrichment action; on failure, record it for async retry.
    async fn try_enrich(&self, action: DeferredAction) -> bool {
        let result = self.run_action(&action).await;
        if let Err(err) = result {
            warn!(error = %err, "enrichment failed; queueing for retry");
            self.deferred.lock().unwrap().push(action);
            return false;
        }
        true
    }

    async fn run_action(&self, action: &DeferredAction) -> mergegate_gateway::GatewayResult<()> {
        let client = self.client.clone();
        match action {
            DeferredAction::Link {
                ticket_key,
                external_ref,
            } => {
                let (key, external_ref) = (ticket_key.clone(), external_ref.clone());
                self.gateway
                    .call("ticketing", || {
                        let client = client.clone();
                        let (key, external_ref) = (key.clone(), external_ref.clone());
                        async move { client.link(&key, &external_ref).await }
                    })
                    .await
            }
            DeferredAction::Comment { ticket_key, body } => {
                let (key, body) = (ticket_key.clone(), body.clone());
                self.gateway
                    .call("ticketing", || {
                        let client = client.clone();
                        let (key, body) = (key.clone(), body.clone());
                        async move { client.comment(&key, &body).await }
                    })
                    .await
            }
        }
    }

    /// Deferred enrichment actions currently queued.
    pub fn deferred_actions(&self) -> Vec<DeferredAction> {
        self.deferred.lock().unwrap().clone()
    }

    /// Retry every queued enrichment once; still-failing actions re-queue.
    pub async fn flush_deferred(&self) {
        let pending: Vec<DeferredAction> = std::mem::take(&mut *self.deferred.lock().unwrap());
        for action in pending {
            if let Err(err) = self.run_action(&action).await {
                warn!(error = %err, "deferred enrichment still failing; re-queueing");
                self.deferred.lock().unwrap().push(action);
            }
        }
    }
}
