//! End-to-end engine tests over in-memory stores and fake dependency
//! clients: fast path, fail-fast blocking, review escalation, supersession,
//! and degraded-dependency behavior.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use mergegate_core::{
    decide, AuthorIdentity, ChangeEvent, ChangeRef, CheckerStatus, CheckerVerdict, Finding,
    MergeDecision, ReviewDecision, Severity, StepHint, StepName, StepStatus, WorkflowPath,
    WorkflowStatus,
};
use mergegate_engine::{EngineConfig, SlaEvent, StepAdvance, WorkflowEngine};
use mergegate_gateway::fakes::{
    DownCheckerClient, FakeTicketClient, FlakyCheckerClient, RecordingCodeHostClient,
    StaticCheckerClient,
};
use mergegate_gateway::{
    BreakerConfig, CheckerClient, Gateway, GatewayConfig, RetryPolicy, StatusState,
};
use mergegate_state::fakes::{MemoryInstanceStore, MemoryResolutionCache, MemoryTicketStore};
use mergegate_state::storage_traits::{InstanceStore, TicketStore};
use mergegate_tickets::{
    IdentityResolver, ResolverConfig, TicketConfig, TicketFiler,
};

fn pass_verdict() -> CheckerVerdict {
    CheckerVerdict {
        status: CheckerStatus::Pass,
        findings: Vec::new(),
        next_step_hint: None,
    }
}

fn pass_with_novel_pattern() -> CheckerVerdict {
    CheckerVerdict {
        status: CheckerStatus::Pass,
        findings: Vec::new(),
        next_step_hint: Some(StepHint::NovelPattern {
            name: "event-sourcing".into(),
            confidence: 0.9,
        }),
    }
}

fn fail_verdict() -> CheckerVerdict {
    CheckerVerdict {
        status: CheckerStatus::Fail,
        findings: vec![
            Finding::new(
                StepName::StandardsCheck,
                Severity::Critical,
                "src/auth.rs:10",
                "hardcoded credential",
            ),
            Finding::new(
                StepName::StandardsCheck,
                Severity::Major,
                "src/auth.rs:40",
                "missing error propagation",
            ),
            Finding::new(
                StepName::StandardsCheck,
                Severity::Minor,
                "src/lib.rs:2",
                "unused import",
            ),
        ],
        next_step_hint: None,
    }
}

fn sample_event(change_id: &str, revision: &str) -> ChangeEvent {
    ChangeEvent {
        change_ref: ChangeRef::new("org/svc", change_id, revision),
        author: AuthorIdentity::new("dev@example.com", "dev"),
        changed_paths: vec!["src/auth.rs".into()],
        is_draft: false,
        received_at: Utc::now(),
    }
}

struct Harness {
    engine: WorkflowEngine,
    instances: Arc<MemoryInstanceStore>,
    tickets: Arc<MemoryTicketStore>,
    ticket_client: Arc<FakeTicketClient>,
    code_host: Arc<RecordingCodeHostClient>,
}

fn harness(checkers: HashMap<StepName, Arc<dyn CheckerClient>>) -> Harness {
    let config = EngineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        },
        breaker: BreakerConfig {
            failure_threshold: 100,
            cooldown_secs: 60,
        },
        ..Default::default()
    };
    harness_with_config(config, checkers)
}

fn harness_with_config(
    config: EngineConfig,
    checkers: HashMap<StepName, Arc<dyn CheckerClient>>,
) -> Harness {
    let gateway = Arc::new(Gateway::new(GatewayConfig {
        retry: config.retry.clone(),
        breaker: config.breaker.clone(),
        attempt_timeout_ms: 5_000,
    }));

    let instances = Arc::new(MemoryInstanceStore::new());
    let tickets = Arc::new(MemoryTicketStore::new());
    let ticket_client =
        Arc::new(FakeTicketClient::new().with_account("dev@example.com", "acct-dev"));
    let code_host = Arc::new(RecordingCodeHostClient::new());

    let resolver = IdentityResolver::new(
        Arc::new(MemoryResolutionCache::new()),
        ticket_client.clone(),
        gateway.clone(),
        ResolverConfig::default(),
    );
    let filer = Arc::new(TicketFiler::new(
        tickets.clone(),
        ticket_client.clone(),
        gateway.clone(),
        resolver,
        TicketConfig::default(),
    ));

    let engine = WorkflowEngine::new(
        config,
        instances.clone(),
        checkers,
        code_host.clone(),
        gateway,
        filer,
    );

    Harness {
        engine,
        instances,
        tickets,
        ticket_client,
        code_host,
    }
}

fn all_passing_checkers() -> HashMap<StepName, Arc<dyn CheckerClient>> {
    let mut checkers: HashMap<StepName, Arc<dyn CheckerClient>> = HashMap::new();
    checkers.insert(
        StepName::StandardsCheck,
        Arc::new(StaticCheckerClient::new(pass_verdict())),
    );
    checkers.insert(
        StepName::ArchitectureCheck,
        Arc::new(StaticCheckerClient::new(pass_verdict())),
    );
    checkers.insert(
        StepName::DesignAlignmentCheck,
        Arc::new(StaticCheckerClient::new(pass_verdict())),
    );
    checkers.insert(
        StepName::CatalogCheck,
        Arc::new(StaticCheckerClient::new(pass_verdict())),
    );
    checkers
}

// ===========================================================================
// Scenario A: fast path
// ===========================================================================

#[tokio::test]
async fn scenario_a_fast_path_approval() {
    let design = Arc::new(StaticCheckerClient::new(pass_verdict()));
    let catalog = Arc::new(StaticCheckerClient::new(pass_verdict()));
    let mut checkers = all_passing_checkers();
    checkers.insert(StepName::DesignAlignmentCheck, design.clone());
    checkers.insert(StepName::CatalogCheck, catalog.clone());

    let h = harness(checkers);
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();

    // No novel pattern: conditional steps skipped, instance on the fast path.
    assert_eq!(instance.status, WorkflowStatus::WaitingReview);
    assert_eq!(instance.path, WorkflowPath::Fast);
    let statuses: Vec<(StepName, StepStatus)> =
        instance.steps.iter().map(|s| (s.step, s.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (StepName::StandardsCheck, StepStatus::Pass),
            (StepName::ArchitectureCheck, StepStatus::Pass),
            (StepName::DesignAlignmentCheck, StepStatus::Skipped),
            (StepName::CatalogCheck, StepStatus::Skipped),
        ]
    );
    // Skipped means never invoked.
    assert_eq!(design.call_count(), 0);
    assert_eq!(catalog.call_count(), 0);

    // Approval resolves the review gate and the instance completes.
    h.engine
        .submit_review(&id, "alice", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap();

    let instance = h.instances.get_instance(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::Completed);
    assert_eq!(instance.result, Some(MergeDecision::Approved));
    assert_eq!(h.code_host.merge_count(), 1);
    assert!(h.tickets.list_tickets().await.unwrap().is_empty());

    // The last posted status check reports success.
    let statuses = h.code_host.statuses.lock().unwrap();
    assert_eq!(statuses.last().unwrap().1.state, StatusState::Success);
}

#[tokio::test]
async fn full_path_runs_conditional_steps_on_novel_pattern() {
    let design = Arc::new(StaticCheckerClient::new(pass_verdict()));
    let mut checkers = all_passing_checkers();
    checkers.insert(
        StepName::ArchitectureCheck,
        Arc::new(StaticCheckerClient::new(pass_with_novel_pattern())),
    );
    checkers.insert(StepName::DesignAlignmentCheck, design.clone());

    let h = harness(checkers);
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();

    assert_eq!(instance.path, WorkflowPath::Full);
    assert_eq!(design.call_count(), 1);
    let design_step = instance
        .steps
        .iter()
        .find(|s| s.step == StepName::DesignAlignmentCheck)
        .unwrap();
    assert_eq!(design_step.status, StepStatus::Pass);
}

// ===========================================================================
// Scenario B: fail-fast blocking with one ticket
// ===========================================================================

#[tokio::test]
async fn scenario_b_failure_blocks_and_files_one_ticket() {
    let architecture = Arc::new(StaticCheckerClient::new(pass_verdict()));
    let mut checkers = all_passing_checkers();
    checkers.insert(
        StepName::StandardsCheck,
        Arc::new(StaticCheckerClient::new(fail_verdict())),
    );
    checkers.insert(StepName::ArchitectureCheck, architecture.clone());

    let h = harness(checkers);
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();

    assert_eq!(instance.status, WorkflowStatus::Blocked);
    assert_eq!(instance.result, Some(MergeDecision::Blocked));

    // Fail-fast: the later checker never executed.
    assert_eq!(architecture.call_count(), 0);
    assert_eq!(instance.steps.len(), 1);

    // Exactly one ticket, tracking a critical report.
    let tickets = h.tickets.list_tickets().await.unwrap();
    assert_eq!(tickets.len(), 1);
    let created = h.ticket_client.created_tickets();
    assert_eq!(created.len(), 1);
    assert!(created[0].1.summary.contains("critical"));

    // One authoritative author comment carrying the ticket reference.
    let comments = h.code_host.comments.lock().unwrap();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains(&tickets[0].external_key));
    assert_eq!(h.code_host.merge_count(), 0);
}

#[tokio::test]
async fn blocked_decision_is_recomputable_from_stored_steps() {
    let mut checkers = all_passing_checkers();
    checkers.insert(
        StepName::StandardsCheck,
        Arc::new(StaticCheckerClient::new(fail_verdict())),
    );

    let h = harness(checkers);
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    h.engine.run(&id).await.unwrap();

    let stored = h.instances.get_instance(&id).await.unwrap();
    let plan = EngineConfig::default().plan;
    for _ in 0..5 {
        assert_eq!(decide(&plan, &stored.steps), MergeDecision::Blocked);
    }
}

// ===========================================================================
// Scenario C: review SLA escalation fires once
// ===========================================================================

#[tokio::test]
async fn scenario_c_escalation_threshold_fires_once() {
    let h = harness(all_passing_checkers());
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::WaitingReview);

    // Half the 4h review window elapses with zero submitted reviews.
    let at_half = Utc::now() + Duration::hours(2) + Duration::minutes(1);
    let events = h.engine.poll_sla(at_half).await.unwrap();
    assert_eq!(
        events,
        vec![SlaEvent::DeadlineApproaching {
            workflow_id: id.clone(),
            step: StepName::HumanReview,
            pct: 50,
        }]
    );

    // Re-evaluating the same elapsed time does not re-fire.
    let events = h.engine.poll_sla(at_half).await.unwrap();
    assert!(events.is_empty());

    // The escalation produced a reviewer nag on the change.
    let comments = h.code_host.comments.lock().unwrap();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains("awaiting review"));
}

#[tokio::test]
async fn review_deadline_breach_blocks_instance() {
    let h = harness(all_passing_checkers());
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    h.engine.run(&id).await.unwrap();

    let events = h.engine.poll_sla(Utc::now() + Duration::hours(5)).await.unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, SlaEvent::DeadlineBreached { step: StepName::HumanReview, .. })));

    let instance = h.instances.get_instance(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::Blocked);
    let review = instance
        .steps
        .iter()
        .find(|s| s.step == StepName::HumanReview)
        .unwrap();
    assert_eq!(review.status, StepStatus::TimedOut);

    // A timed-out review still files a ticket.
    assert_eq!(h.tickets.list_tickets().await.unwrap().len(), 1);
}

// ===========================================================================
// Scenario D: supersession
// ===========================================================================

#[tokio::test]
async fn scenario_d_newer_event_supersedes_active_instance() {
    let h = harness(all_passing_checkers());

    let first = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&first).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::WaitingReview);

    let second = h.engine.handle_event(sample_event("42", "def")).await.unwrap();

    let old = h.instances.get_instance(&first).await.unwrap();
    assert_eq!(old.status, WorkflowStatus::Failed);
    assert!(old.is_superseded());
    assert!(old.result.is_none());

    let fresh = h.instances.get_instance(&second).await.unwrap();
    assert_eq!(fresh.status, WorkflowStatus::Pending);

    // The superseded instance produced no ticket and no merge.
    assert!(h.tickets.list_tickets().await.unwrap().is_empty());
    assert_eq!(h.code_host.merge_count(), 0);

    // Its review gate is gone: votes for it are rejected.
    let err = h
        .engine
        .submit_review(&first, "alice", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no review gate"));
}

// ===========================================================================
// Review rejection and degraded dependencies
// ===========================================================================

#[tokio::test]
async fn review_rejection_is_terminal_blocked() {
    let h = harness(all_passing_checkers());
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    h.engine.run(&id).await.unwrap();

    let resolution = h
        .engine
        .submit_review(
            &id,
            "bob",
            ReviewDecision::Reject,
            Some("needs a design doc".into()),
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(resolution.is_some());

    let instance = h.instances.get_instance(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::Blocked);

    // The rejection reason surfaces in the filed ticket.
    let created = h.ticket_client.created_tickets();
    assert_eq!(created.len(), 1);
    assert!(created[0].1.body.contains("needs a design doc"));
}

#[tokio::test]
async fn transient_checker_failures_are_retried() {
    let flaky = Arc::new(FlakyCheckerClient::new(2, pass_verdict()));
    let mut checkers = all_passing_checkers();
    checkers.insert(StepName::StandardsCheck, flaky.clone());

    let h = harness(checkers);
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();

    // Two transient failures, then the verdict: the gateway absorbed them.
    assert_eq!(flaky.call_count(), 3);
    let standards = instance
        .steps
        .iter()
        .find(|s| s.step == StepName::StandardsCheck)
        .unwrap();
    assert_eq!(standards.status, StepStatus::Pass);
}

#[tokio::test]
async fn unavailable_checker_times_out_and_blocks() {
    let down = Arc::new(DownCheckerClient::new());
    let mut checkers = all_passing_checkers();
    checkers.insert(StepName::StandardsCheck, down.clone());

    let h = harness(checkers);
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();

    assert_eq!(instance.status, WorkflowStatus::Blocked);
    let standards = &instance.steps[0];
    assert_eq!(standards.status, StepStatus::TimedOut);
    // Retried to the policy bound before giving up.
    assert_eq!(down.call_count(), 3);

    // Timed-out steps still produce a tracked ticket.
    assert_eq!(h.tickets.list_tickets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ticket_creation_failure_still_blocks_with_decline_comment() {
    let mut checkers = all_passing_checkers();
    checkers.insert(
        StepName::StandardsCheck,
        Arc::new(StaticCheckerClient::new(fail_verdict())),
    );

    let h = harness(checkers);
    h.ticket_client.fail_next_creates(10);

    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();

    // The block stands even though no ticket could be filed.
    assert_eq!(instance.status, WorkflowStatus::Blocked);
    assert_eq!(instance.result, Some(MergeDecision::Blocked));
    assert!(matches!(
        instance.failure_reason,
        Some(mergegate_core::FailureReason::TicketCreationFailed { .. })
    ));

    // The author sees the standard decline message, not internals.
    let comments = h.code_host.comments.lock().unwrap();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains("could not be filed"));
    assert_eq!(h.code_host.merge_count(), 0);
}

#[tokio::test]
async fn draft_changes_are_reviewed_but_not_merged() {
    let h = harness(all_passing_checkers());
    let mut event = sample_event("42", "abc");
    event.is_draft = true;

    let id = h.engine.handle_event(event).await.unwrap();
    h.engine.run(&id).await.unwrap();
    h.engine
        .submit_review(&id, "alice", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap();

    let instance = h.instances.get_instance(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::Completed);
    assert_eq!(h.code_host.merge_count(), 0);

    let statuses = h.code_host.statuses.lock().unwrap();
    assert_eq!(statuses.last().unwrap().1.state, StatusState::Pending);
}

#[tokio::test]
async fn duplicate_reviewer_vote_is_rejected() {
    // A harness variant with a two-approval gate.
    let mut config_two = EngineConfig::default();
    config_two.review.min_approvals = 2;
    let gateway = Arc::new(Gateway::new(GatewayConfig::default()));
    let instances = Arc::new(MemoryInstanceStore::new());
    let ticket_client = Arc::new(FakeTicketClient::new());
    let resolver = IdentityResolver::new(
        Arc::new(MemoryResolutionCache::new()),
        ticket_client.clone(),
        gateway.clone(),
        ResolverConfig::default(),
    );
    let filer = Arc::new(TicketFiler::new(
        Arc::new(MemoryTicketStore::new()),
        ticket_client,
        gateway.clone(),
        resolver,
        TicketConfig::default(),
    ));
    let engine = WorkflowEngine::new(
        config_two,
        instances.clone(),
        all_passing_checkers(),
        Arc::new(RecordingCodeHostClient::new()),
        gateway,
        filer,
    );

    let id = engine.handle_event(sample_event("42", "abc")).await.unwrap();
    engine.run(&id).await.unwrap();

    let first = engine
        .submit_review(&id, "alice", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap();
    assert!(first.is_none());

    let err = engine
        .submit_review(&id, "alice", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already voted"));

    // A second distinct approval resolves the gate.
    let second = engine
        .submit_review(&id, "bob", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap();
    assert!(second.is_some());
    let instance = instances.get_instance(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn whole_workflow_deadline_blocks_suspended_instance() {
    let config = EngineConfig {
        // Whole-workflow window shorter than the 4h review window.
        workflow_deadline_secs: 3600,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
        },
        ..Default::default()
    };
    let h = harness_with_config(config, all_passing_checkers());

    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    let instance = h.engine.run(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::WaitingReview);

    h.engine.poll_sla(Utc::now() + Duration::hours(2)).await.unwrap();

    let instance = h.instances.get_instance(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::Blocked);
    let review = instance
        .steps
        .iter()
        .find(|s| s.step == StepName::HumanReview)
        .unwrap();
    assert_eq!(review.status, StepStatus::TimedOut);
}

#[tokio::test]
async fn resume_requeues_in_flight_instances() {
    let h = harness(all_passing_checkers());
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();

    // Simulate a restart before the instance ran: resume returns it.
    let to_run = h.engine.resume(Utc::now()).await.unwrap();
    assert!(to_run.contains(&id));

    let instance = h.engine.run(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::WaitingReview);

    // A second resume re-opens the review gate for the suspended instance.
    let to_run = h.engine.resume(Utc::now()).await.unwrap();
    assert!(to_run.is_empty());
    h.engine
        .submit_review(&id, "alice", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap();
    let instance = h.instances.get_instance(&id).await.unwrap();
    assert_eq!(instance.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn advance_reports_terminal_for_finished_instances() {
    let h = harness(all_passing_checkers());
    let id = h.engine.handle_event(sample_event("42", "abc")).await.unwrap();
    h.engine.run(&id).await.unwrap();
    h.engine
        .submit_review(&id, "alice", ReviewDecision::Approve, None, Utc::now())
        .await
        .unwrap();

    let advance = h.engine.advance(&id).await.unwrap();
    assert_eq!(advance, StepAdvance::Terminal(WorkflowStatus::Completed));
}
