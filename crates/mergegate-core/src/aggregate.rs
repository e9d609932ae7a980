//! Error aggregation: one normalized, severity-ranked report per failure.
//!
//! Pure function, no side effects, no I/O. The output ordering is
//! load-bearing for ticket summaries and must be stable and reproducible.

use serde::{Deserialize, Serialize};

use crate::finding::{Finding, Severity};
use crate::step::{StepResult, StepStatus};

/// Overall severity of an aggregated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for OverallSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallSeverity::Critical => write!(f, "critical"),
            OverallSeverity::High => write!(f, "high"),
            OverallSeverity::Medium => write!(f, "medium"),
            OverallSeverity::Low => write!(f, "low"),
        }
    }
}

/// Aggregated view over all failed and timed-out steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    /// Overall severity classification.
    pub severity: OverallSeverity,

    /// All findings, ordered by severity, then step order, then location.
    pub findings: Vec<Finding>,

    /// Steps that failed or timed out, in step order.
    pub failed_steps: Vec<StepResult>,

    /// One-line human-readable summary.
    pub summary: String,
}

/// Merge findings from failed/timed-out steps into one ordered report.
///
/// Ordering: severity (`Critical` > `Major` > `Minor`), then original step
/// order, then location. The sort is stable, so repeated calls on the same
/// input produce identical output.
pub fn aggregate(steps: &[StepResult]) -> AggregatedReport {
    let failed_steps: Vec<StepResult> = steps
        .iter()
        .filter(|s| s.status.halts_pipeline())
        .cloned()
        .collect();

    let mut findings: Vec<(usize, Finding)> = Vec::new();
    for (step_idx, step) in failed_steps.iter().enumerate() {
        for finding in &step.findings {
            findings.push((step_idx, finding.clone()));
        }
    }
    findings.sort_by(|(ai, a), (bi, b)| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then(ai.cmp(bi))
            .then(a.location.cmp(&b.location))
    });
    let findings: Vec<Finding> = findings.into_iter().map(|(_, f)| f).collect();

    let severity = overall_severity(&findings);
    let summary = render_summary(&failed_steps, &findings, severity);

    AggregatedReport {
        severity,
        findings,
        failed_steps,
        summary,
    }
}

/// Overall severity: Critical if any Critical finding; else High if more
/// than three Major findings; else Medium if any Major; else Low.
fn overall_severity(findings: &[Finding]) -> OverallSeverity {
    if findings.iter().any(|f| f.severity == Severity::Critical) {
        return OverallSeverity::Critical;
    }
    let major_count = findings
        .iter()
        .filter(|f| f.severity == Severity::Major)
        .count();
    if major_count > 3 {
        OverallSeverity::High
    } else if major_count > 0 {
        OverallSeverity::Medium
    } else {
        OverallSeverity::Low
    }
}

fn render_summary(
    failed_steps: &[StepResult],
    findings: &[Finding],
    severity: OverallSeverity,
) -> String {
    let step_names: Vec<&str> = failed_steps.iter().map(|s| s.step.as_str()).collect();
    let timed_out = failed_steps
        .iter()
        .filter(|s| s.status == StepStatus::TimedOut)
        .count();

    let mut summary = format!(
        "{} failing step(s) [{}]: {} finding(s), overall severity {}",
        failed_steps.len(),
        step_names.join(", "),
        findings.len(),
        severity
    );
    if timed_out > 0 {
        summary.push_str(&format!(", {} step(s) timed out", timed_out));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepName;

    fn failed_step(step: StepName, findings: Vec<Finding>) -> StepResult {
        StepResult {
            step,
            status: StepStatus::Fail,
            duration_ms: 50,
            findings,
            hint: None,
        }
    }

    fn finding(step: StepName, severity: Severity, location: &str) -> Finding {
        Finding::new(step, severity, location, "issue")
    }

    #[test]
    fn test_empty_input_is_low() {
        let report = aggregate(&[]);
        assert_eq!(report.severity, OverallSeverity::Low);
        assert!(report.findings.is_empty());
        assert!(report.failed_steps.is_empty());
    }

    #[test]
    fn test_passing_steps_are_ignored() {
        let steps = vec![StepResult {
            step: StepName::StandardsCheck,
            status: StepStatus::Pass,
            duration_ms: 10,
            findings: vec![finding(StepName::StandardsCheck, Severity::Critical, "a.rs")],
            hint: None,
        }];
        let report = aggregate(&steps);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_ordering_severity_then_step_then_location() {
        let steps = vec![
            failed_step(
                StepName::StandardsCheck,
                vec![
                    finding(StepName::StandardsCheck, Severity::Minor, "z.rs"),
                    finding(StepName::StandardsCheck, Severity::Major, "b.rs"),
                ],
            ),
            failed_step(
                StepName::ArchitectureCheck,
                vec![
                    finding(StepName::ArchitectureCheck, Severity::Critical, "c.rs"),
                    finding(StepName::ArchitectureCheck, Severity::Major, "a.rs"),
                ],
            ),
        ];

        let report = aggregate(&steps);
        let keys: Vec<(Severity, &str)> = report
            .findings
            .iter()
            .map(|f| (f.severity, f.location.as_str()))
            .collect();

        // Critical first; Majors by step order (standards before architecture),
        // then Minor last.
        assert_eq!(
            keys,
            vec![
                (Severity::Critical, "c.rs"),
                (Severity::Major, "b.rs"),
                (Severity::Major, "a.rs"),
                (Severity::Minor, "z.rs"),
            ]
        );
    }

    #[test]
    fn test_location_breaks_ties_within_step() {
        let steps = vec![failed_step(
            StepName::StandardsCheck,
            vec![
                finding(StepName::StandardsCheck, Severity::Major, "b.rs"),
                finding(StepName::StandardsCheck, Severity::Major, "a.rs"),
            ],
        )];
        let report = aggregate(&steps);
        assert_eq!(report.findings[0].location, "a.rs");
        assert_eq!(report.findings[1].location, "b.rs");
    }

    #[test]
    fn test_overall_severity_rules() {
        // Any critical wins.
        let steps = vec![failed_step(
            StepName::StandardsCheck,
            vec![
                finding(StepName::StandardsCheck, Severity::Critical, "a.rs"),
                finding(StepName::StandardsCheck, Severity::Minor, "b.rs"),
            ],
        )];
        assert_eq!(aggregate(&steps).severity, OverallSeverity::Critical);

        // More than three majors is high.
        let majors: Vec<Finding> = (0..4)
            .map(|i| finding(StepName::StandardsCheck, Severity::Major, &format!("f{i}.rs")))
            .collect();
        let steps = vec![failed_step(StepName::StandardsCheck, majors)];
        assert_eq!(aggregate(&steps).severity, OverallSeverity::High);

        // Any major (up to three) is medium.
        let steps = vec![failed_step(
            StepName::StandardsCheck,
            vec![finding(StepName::StandardsCheck, Severity::Major, "a.rs")],
        )];
        assert_eq!(aggregate(&steps).severity, OverallSeverity::Medium);

        // Only minors is low.
        let steps = vec![failed_step(
            StepName::StandardsCheck,
            vec![finding(StepName::StandardsCheck, Severity::Minor, "a.rs")],
        )];
        assert_eq!(aggregate(&steps).severity, OverallSeverity::Low);
    }

    #[test]
    fn test_stable_across_repeated_calls() {
        let steps = vec![
            failed_step(
                StepName::StandardsCheck,
                vec![
                    finding(StepName::StandardsCheck, Severity::Major, "m.rs"),
                    finding(StepName::StandardsCheck, Severity::Critical, "c.rs"),
                ],
            ),
            StepResult::timed_out(StepName::ArchitectureCheck, 300_000),
        ];

        let first = aggregate(&steps);
        for _ in 0..5 {
            assert_eq!(aggregate(&steps), first);
        }
    }

    #[test]
    fn test_summary_mentions_timeouts() {
        let steps = vec![StepResult::timed_out(StepName::ArchitectureCheck, 300_000)];
        let report = aggregate(&steps);
        assert!(report.summary.contains("timed out"));
        assert!(report.summary.contains("architecture_check"));
    }
}
