//! Pipeline steps: names, outcomes, and checker verdicts.

use serde::{Deserialize, Serialize};

use crate::finding::Finding;

/// The fixed set of pipeline steps.
///
/// The order in which steps actually run is declared per deployment
/// (see the engine configuration); this enum only names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Coding-standards verdict from the standards checker.
    StandardsCheck,

    /// Architecture-pattern detection.
    ArchitectureCheck,

    /// Design-alignment review against the documented design.
    DesignAlignmentCheck,

    /// Pattern-catalog conformance check.
    CatalogCheck,

    /// Human review gate. Does not execute inline; suspends the workflow.
    HumanReview,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::StandardsCheck => "standards_check",
            StepName::ArchitectureCheck => "architecture_check",
            StepName::DesignAlignmentCheck => "design_alignment_check",
            StepName::CatalogCheck => "catalog_check",
            StepName::HumanReview => "human_review",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final status of a recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail,
    Skipped,
    TimedOut,
}

impl StepStatus {
    /// Whether this status halts further step execution.
    pub fn halts_pipeline(self) -> bool {
        matches!(self, StepStatus::Fail | StepStatus::TimedOut)
    }

    /// Whether this status counts toward approval.
    pub fn is_passing(self) -> bool {
        matches!(self, StepStatus::Pass | StepStatus::Skipped)
    }
}

/// Structured hint a checker may attach to its verdict.
///
/// Branching predicates consume these; they are tagged variants rather than
/// free-form strings so predicate evaluation stays a pure match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepHint {
    /// The architecture checker detected a pattern not in the approved set.
    NovelPattern { name: String, confidence: f64 },

    /// The catalog checker found a pattern missing from the catalog.
    CatalogGap { pattern: String },
}

/// Result of one executed (or skipped) step. Append-only within an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Which step this result belongs to.
    pub step: StepName,

    /// Final status.
    pub status: StepStatus,

    /// Wall-clock duration in milliseconds, including gateway retries.
    pub duration_ms: u64,

    /// Findings reported by the checker, in checker order.
    pub findings: Vec<Finding>,

    /// Optional structured hint for downstream branching predicates.
    pub hint: Option<StepHint>,
}

impl StepResult {
    /// A skipped step: zero duration, no findings.
    pub fn skipped(step: StepName) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            duration_ms: 0,
            findings: Vec::new(),
            hint: None,
        }
    }

    /// A timed-out step with no usable checker output.
    pub fn timed_out(step: StepName, duration_ms: u64) -> Self {
        Self {
            step,
            status: StepStatus::TimedOut,
            duration_ms,
            findings: Vec::new(),
            hint: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == StepStatus::Pass
    }
}

/// Pass/fail status in a checker's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckerStatus {
    Pass,
    Fail,
}

/// Verdict returned by an external checker.
///
/// This is the checker contract: a definitive verdict is recorded as-is and
/// never retried. Transport failures never surface as a `CheckerVerdict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerVerdict {
    /// The checker's definitive verdict.
    pub status: CheckerStatus,

    /// Findings backing the verdict.
    pub findings: Vec<Finding>,

    /// Optional hint consumed by branching predicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_hint: Option<StepHint>,
}

impl CheckerVerdict {
    /// Convert a verdict into the step result the engine records.
    pub fn into_step_result(self, step: StepName, duration_ms: u64) -> StepResult {
        let status = match self.status {
            CheckerStatus::Pass => StepStatus::Pass,
            CheckerStatus::Fail => StepStatus::Fail,
        };
        StepResult {
            step,
            status,
            duration_ms,
            findings: self.findings,
            hint: self.next_step_hint,
        }
    }
}
