//! Normalized checker findings.

use serde::{Deserialize, Serialize};

use crate::step::StepName;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    /// Sort rank, most severe first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Major => 1,
            Severity::Minor => 2,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Major => write!(f, "major"),
            Severity::Minor => write!(f, "minor"),
        }
    }
}

/// A normalized unit of checker output. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// The step that produced this finding.
    pub source_step: StepName,

    /// Severity classification.
    pub severity: Severity,

    /// Where the issue was found (file path, optionally `path:line`).
    pub location: String,

    /// What the issue is.
    pub message: String,

    /// How to fix it, when the checker knows.
    pub suggested_fix: Option<String>,
}

impl Finding {
    pub fn new(
        source_step: StepName,
        severity: Severity,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_step,
            severity,
            location: location.into(),
            message: message.into(),
            suggested_fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_ordering() {
        assert!(Severity::Critical.rank() < Severity::Major.rank());
        assert!(Severity::Major.rank() < Severity::Minor.rank());
    }

    #[test]
    fn test_serde_roundtrip() {
        let finding = Finding::new(
            StepName::StandardsCheck,
            Severity::Major,
            "src/auth.rs:42",
            "unchecked credential fallthrough",
        )
        .with_fix("validate the token before the fallback branch");

        let json = serde_json::to_string(&finding).unwrap();
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(finding, back);
    }

    #[test]
    fn test_severity_snake_case_serde() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
    }
}
