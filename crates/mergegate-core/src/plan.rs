//! Step plans: the declared order and conditions of pipeline steps.

use serde::{Deserialize, Serialize};

use crate::predicate::StepPredicate;
use crate::step::StepName;

/// Declaration of one step in the deployment's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Which step.
    pub name: StepName,

    /// Required steps must resolve before the merge decision; a missing
    /// optional step does not hold up approval.
    pub required: bool,

    /// Predicate gating execution. Unmet predicates record `Skipped`.
    pub predicate: StepPredicate,

    /// Step-level SLA deadline in seconds (cumulative wall clock,
    /// including gateway retries).
    pub timeout_secs: u64,
}

impl StepSpec {
    pub fn new(name: StepName, timeout_secs: u64) -> Self {
        Self {
            name,
            required: true,
            predicate: StepPredicate::Always,
            timeout_secs,
        }
    }

    pub fn conditional(mut self, predicate: StepPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// The default deployment plan.
///
/// Design-alignment and catalog checks only run when the architecture
/// checker reports a novel pattern; otherwise the instance takes the fast
/// path. Human review holds a long deadline with escalation thresholds.
pub fn default_plan() -> Vec<StepSpec> {
    vec![
        StepSpec::new(StepName::StandardsCheck, 300),
        StepSpec::new(StepName::ArchitectureCheck, 300),
        StepSpec::new(StepName::DesignAlignmentCheck, 600)
            .conditional(StepPredicate::IfNovelPattern),
        StepSpec::new(StepName::CatalogCheck, 300).conditional(StepPredicate::IfNovelPattern),
        StepSpec::new(StepName::HumanReview, 4 * 60 * 60),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_order() {
        let plan = default_plan();
        let names: Vec<StepName> = plan.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                StepName::StandardsCheck,
                StepName::ArchitectureCheck,
                StepName::DesignAlignmentCheck,
                StepName::CatalogCheck,
                StepName::HumanReview,
            ]
        );
    }

    #[test]
    fn test_default_plan_conditionals() {
        let plan = default_plan();
        let design = plan
            .iter()
            .find(|s| s.name == StepName::DesignAlignmentCheck)
            .unwrap();
        assert_eq!(design.predicate, StepPredicate::IfNovelPattern);

        let standards = plan
            .iter()
            .find(|s| s.name == StepName::StandardsCheck)
            .unwrap();
        assert_eq!(standards.predicate, StepPredicate::Always);
    }

    #[test]
    fn test_all_default_steps_required() {
        assert!(default_plan().iter().all(|s| s.required));
    }
}
