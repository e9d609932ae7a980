//! The workflow orchestration engine.
//!
//! One state machine per change event: `Pending -> InProgress ->
//! {Completed | Blocked | WaitingReview | Failed}`, with `WaitingReview`
//! resolving to `Completed` or `Blocked`. A newer event for the same change
//! supersedes any active instance, which is marked `Failed` and must not
//! produce a ticket or merge action.
//!
//! Steps run strictly sequentially. The first `Fail` or `TimedOut` halts
//! execution and routes through the error aggregator and ticket subsystem.
//! Human review never executes inline: the instance suspends without
//! holding a task and resumes on a vote or an SLA breach.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use mergegate_core::{
    aggregate, decide, ChangeEvent, FailureReason, Finding, MergeDecision, ReviewDecision,
    ReviewGate, ReviewStatus, ReviewVote, Severity, StepName, StepResult, StepStatus,
    WorkflowId, WorkflowInstance, WorkflowPath, WorkflowStatus,
};
use mergegate_gateway::{CheckRequest, CheckerClient, CodeHostClient, Gateway};
use mergegate_state::storage_traits::InstanceStore;
use mergegate_tickets::TicketFiler;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::limiter::RepoLimiter;
use crate::render;
use crate::sla::{SlaEvent, SlaMonitor, REVIEW_THRESHOLDS};

/// Outcome of one `advance` call.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAdvance {
    /// One more step result was recorded.
    Step(StepResult),

    /// The instance suspended awaiting human review.
    Suspended,

    /// The instance reached a terminal status.
    Terminal(WorkflowStatus),
}

/// The orchestration engine.
pub struct WorkflowEngine {
    config: EngineConfig,
    store: Arc<dyn InstanceStore>,
    checkers: HashMap<StepName, Arc<dyn CheckerClient>>,
    code_host: Arc<dyn CodeHostClient>,
    gateway: Arc<Gateway>,
    filer: Arc<TicketFiler>,
    sla: SlaMonitor,
    limiter: RepoLimiter,
    cancellations: Mutex<HashMap<String, Arc<AtomicBool>>>,
    review_gates: Mutex<HashMap<String, ReviewGate>>,
    review_votes: Mutex<HashMap<String, Vec<ReviewVote>>>,
}

impl WorkflowEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn InstanceStore>,
        checkers: HashMap<StepName, Arc<dyn CheckerClient>>,
        code_host: Arc<dyn CodeHostClient>,
        gateway: Arc<Gateway>,
        filer: Arc<TicketFiler>,
    ) -> Self {
        let limiter = RepoLimiter::new(config.max_concurrent_per_repo);
        Self {
            config,
            store,
            checkers,
            code_host,
            gateway,
            filer,
            sla: SlaMonitor::new(),
            limiter,
            cancellations: Mutex::new(HashMap::new()),
            review_gates: Mutex::new(HashMap::new()),
            review_votes: Mutex::new(HashMap::new()),
        }
    }

    /// Accept an inbound change event and create a fresh instance.
    ///
    /// Any active instance for the same `(repository, change_id)` is
    /// superseded first: marked `Failed`, its timers cancelled, its
    /// in-flight work flagged for cooperative cancellation.
    pub async fn handle_event(&self, event: ChangeEvent) -> EngineResult<WorkflowId> {
        let repo = event.change_ref.repository.clone();
        let change_id = event.change_ref.change_id.clone();

        if let Some(mut active) = self.store.find_active(&repo, &change_id).await? {
            info!(
                superseded = %active.id,
                change = %active.change_ref,
                "newer event supersedes active instance"
            );
            active.mark_superseded();
            self.store.put_instance(&active).await?;
            self.sla.cancel_all(&active.id);
            self.close_review(&active.id);
            if let Some(flag) = self.cancellations.lock().unwrap().get(&active.id.0) {
                flag.store(true, Ordering::SeqCst);
            }
        }

        let deadline = event.received_at + Duration::seconds(self.config.workflow_deadline_secs as i64);
        let instance = WorkflowInstance::from_event(event, deadline);
        let id = instance.id.clone();
        self.store.put_instance(&instance).await?;
        self.cancellations
            .lock()
            .unwrap()
            .insert(id.0.clone(), Arc::new(AtomicBool::new(false)));

        info!(workflow_id = %id, change = %instance.change_ref, "workflow instance created");
        Ok(id)
    }

    /// Drive an instance until it suspends or terminates.
    ///
    /// Holds one per-repository permit while executing; a suspended
    /// instance releases its permit (waiting holds no compute resource).
    pub async fn run(&self, id: &WorkflowId) -> EngineResult<WorkflowInstance> {
        let instance = self.store.get_instance(id).await?;
        let _permit = self.limiter.acquire(&instance.change_ref.repository).await?;

        loop {
            match self.advance(id).await? {
                StepAdvance::Step(result) => {
                    debug!(workflow_id = %id, step = %result.step, status = ?result.status, "step recorded");
                }
                StepAdvance::Suspended | StepAdvance::Terminal(_) => {
                    return Ok(self.store.get_instance(id).await?);
                }
            }
        }
    }

    /// Advance an instance by one step.
    pub async fn advance(&self, id: &WorkflowId) -> EngineResult<StepAdvance> {
        let mut instance = self.store.get_instance(id).await?;

        if instance.status.is_terminal() {
            return Ok(StepAdvance::Terminal(instance.status));
        }
        if self.is_cancelled(id) {
            // Supersession raced us; the stored record is authoritative.
            let fresh = self.store.get_instance(id).await?;
            if fresh.status.is_terminal() {
                return Ok(StepAdvance::Terminal(fresh.status));
            }
        }

        match instance.status {
            WorkflowStatus::Pending => {
                instance.status = WorkflowStatus::InProgress;
                self.store.put_instance(&instance).await?;
            }
            WorkflowStatus::WaitingReview => {
                // Only a vote or an SLA breach resolves a suspended
                // instance; nothing to do inline.
                return Ok(StepAdvance::Suspended);
            }
            _ => {}
        }

        // Fail-fast: once any step halts, no further step executes.
        let halted = instance.steps.iter().any(|s| s.status.halts_pipeline());
        let next = self
            .config
            .plan
            .iter()
            .find(|spec| !instance.steps.iter().any(|s| s.step == spec.name))
            .cloned();

        let spec = match (halted, next) {
            (true, _) | (false, None) => return self.finalize(instance).await,
            (false, Some(spec)) => spec,
        };

        if spec.name == StepName::HumanReview {
            return self.suspend_for_review(instance).await;
        }

        if !spec.predicate.is_met(&instance.steps) {
            debug!(workflow_id = %id, step = %spec.name, "predicate unmet; skipping");
            if spec.predicate.is_conditional() {
                instance.path = WorkflowPath::Fast;
            }
            let result = StepResult::skipped(spec.name);
            instance.record_step(result.clone())?;
            self.store.put_instance(&instance).await?;
            return Ok(StepAdvance::Step(result));
        }

        let result = self.execute_checker(&instance, spec.name, spec.timeout_secs).await;
        instance.record_step(result.clone())?;
        self.store.put_instance(&instance).await?;
        Ok(StepAdvance::Step(result))
    }

    /// Submit a review vote. Returns the gate resolution, if the vote
    /// resolved it; a resolved gate immediately finalizes the instance.
    pub async fn submit_review(
        &self,
        id: &WorkflowId,
        reviewer: &str,
        decision: ReviewDecision,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<ReviewStatus>> {
        let (resolution, duration_ms) = {
            let mut gates = self.review_gates.lock().unwrap();
            let gate = gates.get_mut(&id.0).ok_or_else(|| EngineError::NoReviewGate {
                workflow_id: id.to_string(),
            })?;
            let mut votes_map = self.review_votes.lock().unwrap();
            let votes = votes_map.entry(id.0.clone()).or_default();

            let vote = ReviewVote::new(reviewer, id.clone(), decision, comment, now);
            mergegate_core::submit_vote(gate, &vote, votes, now)?;
            votes.push(vote);

            let resolution = mergegate_core::evaluate_gate(gate, votes, now);
            if let Some(status) = &resolution {
                gate.status = status.clone();
            }
            let duration_ms = (now - gate.opened_at).num_milliseconds().max(0) as u64;
            (resolution, duration_ms)
        };

        if let Some(status) = &resolution {
            info!(workflow_id = %id, status = ?status, "review gate resolved");
            let mut instance = self.store.get_instance(id).await?;
            self.apply_review_resolution(&mut instance, status.clone(), duration_ms)
                .await?;
            self.finalize(instance).await?;
        }
        Ok(resolution)
    }

    /// Evaluate SLA deadlines at `now`, escalating and timing out steps.
    pub async fn poll_sla(&self, now: DateTime<Utc>) -> EngineResult<Vec<SlaEvent>> {
        let events = self.sla.poll(now);

        for event in &events {
            match event {
                SlaEvent::DeadlineApproaching {
                    workflow_id,
                    step,
                    pct,
                } => {
                    warn!(workflow_id = %workflow_id, step = %step, pct, "deadline approaching");
                    if *step == StepName::HumanReview {
                        if let Ok(instance) = self.store.get_instance(workflow_id).await {
                            self.post_comment_best_effort(
                                &instance,
                                &render::review_escalation_comment(*pct),
                            )
                            .await;
                        }
                    }
                }
                SlaEvent::DeadlineBreached { workflow_id, step } => {
                    warn!(workflow_id = %workflow_id, step = %step, "deadline breached");
                    self.handle_breach(workflow_id, *step).await?;
                }
            }
        }

        // Whole-workflow deadline, independent of any per-step window: an
        // active instance past it times out at its current step.
        for status in [
            WorkflowStatus::Pending,
            WorkflowStatus::InProgress,
            WorkflowStatus::WaitingReview,
        ] {
            for instance in self.store.list_by_status(status).await? {
                if now >= instance.deadline {
                    warn!(
                        workflow_id = %instance.id,
                        change = %instance.change_ref,
                        "whole-workflow deadline breached"
                    );
                    let step = self
                        .config
                        .plan
                        .iter()
                        .find(|spec| !instance.steps.iter().any(|s| s.step == spec.name))
                        .map(|spec| spec.name);
                    if let Some(step) = step {
                        self.handle_breach(&instance.id, step).await?;
                    } else {
                        self.finalize(instance).await?;
                    }
                }
            }
        }
        Ok(events)
    }

    /// Re-register state for instances found mid-flight after a restart.
    ///
    /// Suspended instances get a fresh review window; pending and
    /// in-progress instances are returned for the caller to re-run.
    pub async fn resume(&self, now: DateTime<Utc>) -> EngineResult<Vec<WorkflowId>> {
        let mut to_run = Vec::new();
        for status in [WorkflowStatus::Pending, WorkflowStatus::InProgress] {
            for instance in self.store.list_by_status(status).await? {
                self.cancellations
                    .lock()
                    .unwrap()
                    .insert(instance.id.0.clone(), Arc::new(AtomicBool::new(false)));
                to_run.push(instance.id);
            }
        }

        for instance in self.store.list_by_status(WorkflowStatus::WaitingReview).await? {
            info!(workflow_id = %instance.id, "re-opening review gate after restart");
            self.open_review_gate(&instance.id, now);
        }
        Ok(to_run)
    }

    /// Breaker snapshots from the underlying gateway, for diagnostics.
    pub fn breaker_snapshots(&self) -> Vec<mergegate_gateway::CircuitBreakerState> {
        self.gateway.breaker_snapshots()
    }

    // -- internals -----------------------------------------------------------

    fn is_cancelled(&self, id: &WorkflowId) -> bool {
        self.cancellations
            .lock()
            .unwrap()
            .get(&id.0)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn close_review(&self, id: &WorkflowId) {
        self.review_gates.lock().unwrap().remove(&id.0);
        self.review_votes.lock().unwrap().remove(&id.0);
    }

    fn open_review_gate(&self, id: &WorkflowId, now: DateTime<Utc>) {
        let deadline = now + Duration::seconds(self.config.review.deadline_secs as i64);
        let gate = ReviewGate::new(id.clone(), self.config.review.min_approvals, now, deadline);
        self.review_gates.lock().unwrap().insert(id.0.clone(), gate);
        self.review_votes.lock().unwrap().entry(id.0.clone()).or_default();
        self.sla
            .schedule(id, StepName::HumanReview, now, deadline, &REVIEW_THRESHOLDS);
    }

    async fn suspend_for_review(
        &self,
        mut instance: WorkflowInstance,
    ) -> EngineResult<StepAdvance> {
        let now = Utc::now();
        self.open_review_gate(&instance.id, now);
        instance.status = WorkflowStatus::WaitingReview;
        self.store.put_instance(&instance).await?;

        let check = render::status_check(&instance, MergeDecision::WaitingReview);
        self.post_status_best_effort(&instance, &check).await;

        info!(workflow_id = %instance.id, "suspended awaiting human review");
        Ok(StepAdvance::Suspended)
    }

    async fn execute_checker(
        &self,
        instance: &WorkflowInstance,
        step: StepName,
        timeout_secs: u64,
    ) -> StepResult {
        let Some(client) = self.checkers.get(&step) else {
            warn!(workflow_id = %instance.id, step = %step, "no checker registered; skipping");
            return StepResult::skipped(step);
        };

        let started = Utc::now();
        self.sla.schedule(
            &instance.id,
            step,
            started,
            started + Duration::seconds(timeout_secs as i64),
            &[],
        );

        let request = CheckRequest::for_change(&instance.change_ref, &instance.changed_paths);
        let dependency = format!("checker:{step}");
        let client = client.clone();
        let outcome = self
            .gateway
            .call(&dependency, || {
                let client = client.clone();
                let request = request.clone();
                async move { client.run_check(&request).await }
            })
            .await;

        self.sla.cancel(&instance.id, step);
        let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

        match outcome {
            Ok(verdict) => verdict.into_step_result(step, duration_ms),
            Err(err) => {
                // Transient exhaustion and open circuits surface as a
                // timed-out step, never as a crash of the instance.
                warn!(
                    workflow_id = %instance.id,
                    step = %step,
                    error = %err,
                    "checker unavailable; recording step as timed out"
                );
                StepResult::timed_out(step, duration_ms)
            }
        }
    }

    async fn apply_review_resolution(
        &self,
        instance: &mut WorkflowInstance,
        status: ReviewStatus,
        duration_ms: u64,
    ) -> EngineResult<()> {
        let result = match status {
            ReviewStatus::Approved => StepResult {
                step: StepName::HumanReview,
                status: StepStatus::Pass,
                duration_ms,
                findings: Vec::new(),
                hint: None,
            },
            ReviewStatus::Rejected { reason } => StepResult {
                step: StepName::HumanReview,
                status: StepStatus::Fail,
                duration_ms,
                findings: vec![Finding::new(
                    StepName::HumanReview,
                    Severity::Major,
                    "review",
                    format!("change rejected: {reason}"),
                )],
                hint: None,
            },
            ReviewStatus::Expired => StepResult::timed_out(StepName::HumanReview, duration_ms),
            ReviewStatus::Pending => {
                return Err(EngineError::Internal(
                    "attempted to apply an unresolved review gate".into(),
                ))
            }
        };

        self.sla.cancel(&instance.id, StepName::HumanReview);
        self.close_review(&instance.id);
        instance.status = WorkflowStatus::InProgress;
        instance.record_step(result)?;
        self.store.put_instance(instance).await?;
        Ok(())
    }

    async fn handle_breach(&self, id: &WorkflowId, step: StepName) -> EngineResult<()> {
        let mut instance = match self.store.get_instance(id).await {
            Ok(instance) => instance,
            Err(_) => return Ok(()),
        };
        if instance.status.is_terminal() {
            return Ok(());
        }
        if instance.steps.iter().any(|s| s.step == step) {
            // The step completed while the breach was in flight; the
            // completion already cancelled what it could. Ignore the race.
            return Ok(());
        }

        if step == StepName::HumanReview {
            self.close_review(id);
        }
        instance.status = WorkflowStatus::InProgress;
        instance.record_step(StepResult::timed_out(step, 0))?;
        self.store.put_instance(&instance).await?;
        self.finalize(instance).await?;
        Ok(())
    }

    /// Compute the terminal decision and perform its side effects.
    async fn finalize(&self, mut instance: WorkflowInstance) -> EngineResult<StepAdvance> {
        if self.is_cancelled(&instance.id) {
            let fresh = self.store.get_instance(&instance.id).await?;
            if fresh.is_superseded() {
                // Superseded instances produce no ticket and no merge action.
                return Ok(StepAdvance::Terminal(fresh.status));
            }
        }

        let decision = decide(&self.config.plan, &instance.steps);
        match decision {
            MergeDecision::WaitingReview => Ok(StepAdvance::Suspended),
            MergeDecision::Approved => {
                instance.status = WorkflowStatus::Completed;
                instance.result = Some(MergeDecision::Approved);
                self.store.put_instance(&instance).await?;
                self.sla.cancel_all(&instance.id);

                let check = render::status_check(&instance, MergeDecision::Approved);
                self.post_status_best_effort(&instance, &check).await;
                self.post_comment_best_effort(&instance, &render::approved_comment(&instance))
                    .await;
                if !instance.is_draft {
                    self.request_merge_best_effort(&instance).await;
                }

                info!(workflow_id = %instance.id, change = %instance.change_ref, "approved");
                Ok(StepAdvance::Terminal(WorkflowStatus::Completed))
            }
            MergeDecision::Blocked => {
                let report = aggregate(&instance.steps);
                let filing = self
                    .filer
                    .file_ticket(&instance, &report, Utc::now())
                    .await;

                let ticket_key = match filing {
                    Ok(filing) => Some(filing.ticket.external_key),
                    Err(err) => {
                        // The one hard failure: the block stands, untracked.
                        error!(
                            alarm = true,
                            workflow_id = %instance.id,
                            error = %err,
                            "blocked instance has no ticket"
                        );
                        instance.failure_reason = Some(FailureReason::TicketCreationFailed {
                            detail: err.to_string(),
                        });
                        None
                    }
                };

                instance.status = WorkflowStatus::Blocked;
                instance.result = Some(MergeDecision::Blocked);
                self.store.put_instance(&instance).await?;
                self.sla.cancel_all(&instance.id);

                let check = render::status_check(&instance, MergeDecision::Blocked);
                self.post_status_best_effort(&instance, &check).await;
                self.post_comment_best_effort(
                    &instance,
                    &render::blocked_comment(&report, ticket_key.as_deref()),
                )
                .await;

                info!(
                    workflow_id = %instance.id,
                    change = %instance.change_ref,
                    ticket = ticket_key.as_deref().unwrap_or("<none>"),
                    "blocked"
                );
                Ok(StepAdvance::Terminal(WorkflowStatus::Blocked))
            }
        }
    }

    async fn post_status_best_effort(
        &self,
        instance: &WorkflowInstance,
        check: &mergegate_gateway::StatusCheck,
    ) {
        let code_host = self.code_host.clone();
        let change = instance.change_ref.clone();
        let check = check.clone();
        let result = self
            .gateway
            .call("code_host", || {
                let code_host = code_host.clone();
                let (change, check) = (change.clone(), check.clone());
                async move { code_host.post_status(&change, &check).await }
            })
            .await;
        if let Err(err) = result {
            warn!(change = %instance.change_ref, error = %err, "status check post failed");
        }
    }

    async fn post_comment_best_effort(&self, instance: &WorkflowInstance, body: &str) {
        let code_host = self.code_host.clone();
        let change = instance.change_ref.clone();
        let body = body.to_string();
        let result = self
            .gateway
            .call("code_host", || {
                let code_host = code_host.clone();
                let (change, body) = (change.clone(), body.clone());
                async move { code_host.post_comment(&change, &body).await }
            })
            .await;
        if let Err(err) = result {
            warn!(change = %instance.change_ref, error = %err, "author comment post failed");
        }
    }

    async fn request_merge_best_effort(&self, instance: &WorkflowInstance) {
        let code_host = self.code_host.clone();
        let change = instance.change_ref.clone();
        let result = self
            .gateway
            .call("code_host", || {
                let code_host = code_host.clone();
                let change = change.clone();
                async move { code_host.request_merge(&change).await }
            })
            .await;
        if let Err(err) = result {
            error!(alarm = true, change = %instance.change_ref, error = %err, "merge request failed");
        }
    }
}
