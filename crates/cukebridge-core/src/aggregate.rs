//! Result aggregation: step outcomes, per-test-case error tallies and the
//! scenario verdict.
//!
//! A scenario fails iff at least one of its content steps or hooks produced a
//! counted outcome. Counted outcomes are FAILED and UNDEFINED, plus PENDING
//! and AMBIGUOUS, which are classified as failures. A status outside the
//! known set is a protocol violation and aborts processing.

use std::collections::HashMap;

use cukebridge_error::{BridgeError, Result};
use cukebridge_messages::TestStepResultStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Skipped,
    Undefined,
    Failed,
    Pending,
    Ambiguous,
}

impl StepOutcome {
    /// Classify a wire status. Unknown statuses are fatal.
    pub fn classify(status: &TestStepResultStatus, test_step_id: &str) -> Result<Self> {
        match status {
            TestStepResultStatus::Passed => Ok(Self::Passed),
            TestStepResultStatus::Skipped => Ok(Self::Skipped),
            TestStepResultStatus::Undefined => Ok(Self::Undefined),
            TestStepResultStatus::Failed => Ok(Self::Failed),
            TestStepResultStatus::Pending => Ok(Self::Pending),
            TestStepResultStatus::Ambiguous => Ok(Self::Ambiguous),
            TestStepResultStatus::Unrecognized(raw) => Err(BridgeError::UnknownStepStatus {
                status: raw.clone(),
                test_step_id: test_step_id.to_owned(),
            }),
        }
    }

    /// Whether this outcome increments the test case's error tally.
    #[must_use]
    pub const fn counts_as_error(self) -> bool {
        !matches!(self, Self::Passed | Self::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    #[must_use]
    pub const fn from_error_count(errors: u32) -> Self {
        if errors > 0 { Self::Failed } else { Self::Passed }
    }
}

/// Per-test-case count of counted outcomes in the current attempt.
#[derive(Debug, Clone, Default)]
pub struct ErrorTally {
    counts: HashMap<String, u32>,
}

impl ErrorTally {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, test_case_id: &str) {
        self.counts.insert(test_case_id.to_owned(), 0);
    }

    /// Count one error and return the new total.
    pub fn record(&mut self, test_case_id: &str) -> u32 {
        let count = self.counts.entry(test_case_id.to_owned()).or_default();
        *count = count.saturating_add(1);
        *count
    }

    #[must_use]
    pub fn count(&self, test_case_id: &str) -> u32 {
        self.counts.get(test_case_id).copied().unwrap_or(0)
    }

    /// Remove the tally for a finished attempt and return its final count.
    pub fn take(&mut self, test_case_id: &str) -> u32 {
        self.counts.remove(test_case_id).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_passed_and_skipped_are_not_errors() {
        let cases = [
            (TestStepResultStatus::Passed, false),
            (TestStepResultStatus::Skipped, false),
            (TestStepResultStatus::Undefined, true),
            (TestStepResultStatus::Failed, true),
            (TestStepResultStatus::Pending, true),
            (TestStepResultStatus::Ambiguous, true),
        ];
        for (status, counted) in cases {
            let outcome = StepOutcome::classify(&status, "ts").unwrap();
            assert_eq!(outcome.counts_as_error(), counted, "case=classify status={status}");
        }
    }

    #[test]
    fn unrecognized_status_is_fatal() {
        let err = StepOutcome::classify(
            &TestStepResultStatus::Unrecognized("UNKNOWN".to_owned()),
            "ts9",
        )
        .unwrap_err();
        assert!(err.is_fatal_protocol_violation());
        assert!(err.to_string().contains("ts9"));
    }

    #[test]
    fn tally_drives_verdict() {
        let mut tally = ErrorTally::new();
        tally.reset("tc");
        assert_eq!(Verdict::from_error_count(tally.count("tc")), Verdict::Passed);
        tally.record("tc");
        assert_eq!(tally.record("tc"), 2);
        assert_eq!(Verdict::from_error_count(tally.take("tc")), Verdict::Failed);
        assert_eq!(tally.count("tc"), 0);
        assert!(tally.is_empty());
    }
}
