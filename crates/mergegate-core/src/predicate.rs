//! Branching predicates evaluated by the engine between steps.
//!
//! A step may declare itself conditional on a predicate over the results
//! accumulated so far. Predicates are pure functions over structured
//! `StepHint`s; unmet predicates mark the step `Skipped`, not `Fail`.

use serde::{Deserialize, Serialize};

use crate::step::{StepHint, StepResult};

/// Predicate attached to a step declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPredicate {
    /// Run unconditionally.
    Always,

    /// Run only if an earlier step reported a novel architecture pattern.
    IfNovelPattern,

    /// Run only if an earlier step reported a catalog gap.
    IfCatalogGap,
}

impl StepPredicate {
    /// Evaluate the predicate over the steps recorded so far.
    pub fn is_met(self, prior: &[StepResult]) -> bool {
        match self {
            StepPredicate::Always => true,
            StepPredicate::IfNovelPattern => prior
                .iter()
                .any(|r| matches!(r.hint, Some(StepHint::NovelPattern { .. }))),
            StepPredicate::IfCatalogGap => prior
                .iter()
                .any(|r| matches!(r.hint, Some(StepHint::CatalogGap { .. }))),
        }
    }

    /// Whether this predicate gates a conditional (fast-path eligible) step.
    pub fn is_conditional(self) -> bool {
        !matches!(self, StepPredicate::Always)
    }
}
