//! Ticket content composition from an aggregated report.
//!
//! Output is deterministic plain text: the same instance and report always
//! render the same summary and body, so retried filings are byte-identical.

use mergegate_core::{AggregatedReport, WorkflowInstance};

/// One-line ticket summary.
pub fn ticket_summary(instance: &WorkflowInstance, report: &AggregatedReport) -> String {
    format!(
        "[{}] review blocked ({}): {}",
        instance.change_ref, report.severity, report.summary
    )
}

/// Full ticket body: overview, per-finding detail with remediation hints,
/// and a link back to the workflow run.
pub fn ticket_body(
    instance: &WorkflowInstance,
    report: &AggregatedReport,
    run_link: &str,
) -> String {
    let mut body = String::new();

    body.push_str(&format!(
        "Change {} by {} was blocked by the review pipeline.\n\n",
        instance.change_ref, instance.author.username
    ));
    body.push_str(&format!("Overall severity: {}\n", report.severity));
    body.push_str(&format!("Summary: {}\n\n", report.summary));

    if report.findings.is_empty() {
        body.push_str("No checker findings were recorded (step timed out).\n");
    } else {
        body.push_str("Findings:\n");
        for (idx, finding) in report.findings.iter().enumerate() {
            body.push_str(&format!(
                "{}. [{}] {} at {}: {}\n",
                idx + 1,
                finding.severity,
                finding.source_step,
                finding.location,
                finding.message
            ));
            if let Some(fix) = &finding.suggested_fix {
                body.push_str(&format!("   remediation: {}\n", fix));
            }
        }
    }

    body.push_str(&format!("\nWorkflow run: {}\n", run_link));
    body
}

/// Reference comment added to the ticket pointing back at the change.
pub fn ticket_reference_comment(instance: &WorkflowInstance) -> String {
    format!(
        "Filed automatically for change {} (revision {}).",
        instance.change_ref, instance.change_ref.head_revision
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mergegate_core::{
        aggregate, AuthorIdentity, ChangeEvent, ChangeRef, Finding, Severity, StepName,
        StepResult, StepStatus,
    };

    fn blocked_instance() -> WorkflowInstance {
        let event = ChangeEvent {
            change_ref: ChangeRef::new("org/svc", "42", "abcdef0123456789"),
            author: AuthorIdentity::new("dev@example.com", "dev"),
            changed_paths: vec!["src/lib.rs".into()],
            is_draft: false,
            received_at: Utc::now(),
        };
        WorkflowInstance::from_event(event, Utc::now() + chrono::Duration::hours(4))
    }

    fn failing_report() -> AggregatedReport {
        let steps = vec![StepResult {
            step: StepName::StandardsCheck,
            status: StepStatus::Fail,
            duration_ms: 900,
            findings: vec![
                Finding::new(
                    StepName::StandardsCheck,
                    Severity::Critical,
                    "src/auth.rs:10",
                    "hardcoded credential",
                )
                .with_fix("read the credential from the secret store"),
                Finding::new(
                    StepName::StandardsCheck,
                    Severity::Minor,
                    "src/lib.rs:3",
                    "unused import",
                ),
            ],
            hint: None,
        }];
        aggregate(&steps)
    }

    #[test]
    fn test_summary_contains_change_and_severity() {
        let summary = ticket_summary(&blocked_instance(), &failing_report());
        assert!(summary.contains("org/svc#42"));
        assert!(summary.contains("critical"));
    }

    #[test]
    fn test_body_lists_findings_in_report_order() {
        let body = ticket_body(&blocked_instance(), &failing_report(), "https://mg/runs/1");
        let critical_pos = body.find("hardcoded credential").unwrap();
        let minor_pos = body.find("unused import").unwrap();
        assert!(critical_pos < minor_pos);
        assert!(body.contains("remediation: read the credential"));
        assert!(body.contains("https://mg/runs/1"));
    }

    #[test]
    fn test_body_deterministic() {
        let instance = blocked_instance();
        let report = failing_report();
        let a = ticket_body(&instance, &report, "https://mg/runs/1");
        let b = ticket_body(&instance, &report, "https://mg/runs/1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_body_without_findings_mentions_timeout() {
        let instance = blocked_instance();
        let steps = vec![StepResult::timed_out(StepName::ArchitectureCheck, 300_000)];
        let report = aggregate(&steps);
        let body = ticket_body(&instance, &report, "https://mg/runs/1");
        assert!(body.contains("timed out"));
    }
}
