//! Test verdicts reported by the Testing stage.

use serde::{Deserialize, Serialize};

/// Pass/fail verdict for one generated test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVerdict {
    /// Test name as reported by the agent.
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Failure details or notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TestVerdict {
    /// Creates a passing verdict.
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            details: None,
        }
    }

    /// Creates a failing verdict.
    #[must_use]
    pub fn fail(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            details: Some(details.into()),
        }
    }
}

/// All verdicts of one Testing iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    /// One verdict per generated test.
    pub verdicts: Vec<TestVerdict>,
}

impl TestReport {
    /// Creates a report from verdicts.
    #[must_use]
    pub fn new(verdicts: Vec<TestVerdict>) -> Self {
        Self { verdicts }
    }

    /// Verdicts of failing tests.
    pub fn failing(&self) -> impl Iterator<Item = &TestVerdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }

    /// Number of passing tests.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed).count()
    }

    /// Returns true if there is at least one verdict and none failed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        !self.verdicts.is_empty() && self.verdicts.iter().all(|v| v.passed)
    }

    /// One line per failing test, used as revision diagnostics.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        self.failing()
            .map(|v| match &v.details {
                Some(details) => format!("FAILED {}: {}", v.name, details),
                None => format!("FAILED {}", v.name),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
