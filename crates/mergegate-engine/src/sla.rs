//! SLA deadline tracking for workflow steps.
//!
//! Each step gets an independent deadline. Long review deadlines carry
//! intermediate escalation thresholds; every threshold and the terminal
//! breach fire exactly once. Evaluation is driven by an injected `now`, so
//! the daemon ticks it from a timer and tests replay time directly.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mergegate_core::{StepName, WorkflowId};

/// An escalation or breach emitted by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlaEvent {
    /// A configured fraction of the deadline has elapsed.
    DeadlineApproaching {
        workflow_id: WorkflowId,
        step: StepName,
        pct: u8,
    },

    /// The deadline has passed. The engine treats the step as timed out.
    DeadlineBreached {
        workflow_id: WorkflowId,
        step: StepName,
    },
}

#[derive(Debug)]
struct DeadlineEntry {
    workflow_id: WorkflowId,
    step: StepName,
    scheduled_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    /// Escalation thresholds as percentages of the window.
    thresholds: Vec<u8>,
    fired: BTreeSet<u8>,
}

/// Tracks per-step deadlines and emits once-only escalation events.
#[derive(Debug, Default)]
pub struct SlaMonitor {
    entries: Mutex<HashMap<(String, StepName), DeadlineEntry>>,
}

/// Escalation thresholds for human review: 50% and 87.5% of the window.
pub const REVIEW_THRESHOLDS: [u8; 2] = [50, 87];

impl SlaMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deadline for a step. Replaces any existing registration
    /// for the same `(workflow, step)`, resetting fired thresholds.
    pub fn schedule(
        &self,
        workflow_id: &WorkflowId,
        step: StepName,
        scheduled_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
        thresholds: &[u8],
    ) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            (workflow_id.0.clone(), step),
            DeadlineEntry {
                workflow_id: workflow_id.clone(),
                step,
                scheduled_at,
                deadline,
                thresholds: thresholds.to_vec(),
                fired: BTreeSet::new(),
            },
        );
        debug!(workflow_id = %workflow_id, step = %step, %deadline, "deadline scheduled");
    }

    /// Cancel a step's deadline. Cancelling after a fire, or a deadline that
    /// was never scheduled, is a no-op — races with completion are expected.
    pub fn cancel(&self, workflow_id: &WorkflowId, step: StepName) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&(workflow_id.0.clone(), step));
    }

    /// Cancel every deadline for a workflow (supersession, terminal state).
    pub fn cancel_all(&self, workflow_id: &WorkflowId) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(wid, _), _| wid != &workflow_id.0);
    }

    /// Evaluate all deadlines at `now`.
    ///
    /// Idempotent per threshold: re-evaluating the same elapsed time never
    /// re-fires an already-fired threshold. A breach fires once and removes
    /// the entry, so later cancels are ignored rather than errors.
    pub fn poll(&self, now: DateTime<Utc>) -> Vec<SlaEvent> {
        let mut entries = self.entries.lock().unwrap();
        let mut events = Vec::new();
        let mut breached_keys = Vec::new();

        for (key, entry) in entries.iter_mut() {
            if now >= entry.deadline {
                events.push(SlaEvent::DeadlineBreached {
                    workflow_id: entry.workflow_id.clone(),
                    step: entry.step,
                });
                breached_keys.push(key.clone());
                continue;
            }

            let window = (entry.deadline - entry.scheduled_at).num_milliseconds();
            if window <= 0 {
                continue;
            }
            let elapsed = (now - entry.scheduled_at).num_milliseconds().max(0);
            let elapsed_pct = (elapsed * 100 / window) as u8;

            for &threshold in &entry.thresholds {
                if elapsed_pct >= threshold && entry.fired.insert(threshold) {
                    events.push(SlaEvent::DeadlineApproaching {
                        workflow_id: entry.workflow_id.clone(),
                        step: entry.step,
                        pct: threshold,
                    });
                }
            }
        }

        for key in breached_keys {
            entries.remove(&key);
        }

        // Deterministic event order regardless of map iteration.
        events.sort_by(|a, b| {
            let key = |e: &SlaEvent| match e {
                SlaEvent::DeadlineApproaching {
                    workflow_id,
                    step,
                    pct,
                } => (workflow_id.0.clone(), *step, *pct),
                SlaEvent::DeadlineBreached { workflow_id, step } => {
                    (workflow_id.0.clone(), *step, u8::MAX)
                }
            };
            key(a).cmp(&key(b))
        });
        events
    }

    /// Number of tracked deadlines. Test helper.
    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
