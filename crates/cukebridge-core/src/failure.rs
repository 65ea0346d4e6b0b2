//! Failure messages reported to the host.
//!
//! A failed result is turned into a [`FailureMessage`] by the first
//! [`FailureClassifier`] in the chain that accepts it. Classifiers only
//! extract data (message, expected, actual); rendering diffs is left to the
//! host.

use cukebridge_messages::TestStepResult;
use serde::{Deserialize, Serialize};

/// Source range attached to a failure. Lines and columns are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub uri: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    /// `None` means the range runs to the end of `end_line`.
    pub end_column: Option<u32>,
}

impl SourceSpan {
    /// Whole-line span starting at `column`.
    #[must_use]
    pub fn line(uri: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            uri: uri.into(),
            start_line: line,
            start_column: column,
            end_line: line,
            end_column: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceSpan>,
}

impl FailureMessage {
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
            location: None,
        }
    }

    #[must_use]
    pub fn at(mut self, location: Option<SourceSpan>) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn has_diff(&self) -> bool {
        self.expected.is_some() || self.actual.is_some()
    }
}

pub trait FailureClassifier: Send + Sync {
    fn can_classify(&self, result: &TestStepResult) -> bool;

    fn classify(&self, result: &TestStepResult) -> FailureMessage;
}

/// Splits Node `assert` messages into expected/actual blocks.
///
/// ```text
/// AssertionError [ERR_ASSERTION]: Expected values to be strictly equal:
///     + expected - actual
///
///     -1
///     +2
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionDiffClassifier;

const ASSERTION_PREFIX: &str = "AssertionError [ERR_ASSERTION]";
const DIFF_LEGEND: &str = "    + expected - actual";

impl FailureClassifier for AssertionDiffClassifier {
    fn can_classify(&self, result: &TestStepResult) -> bool {
        result
            .message
            .as_deref()
            .is_some_and(|message| message.starts_with(ASSERTION_PREFIX))
    }

    fn classify(&self, result: &TestStepResult) -> FailureMessage {
        let text = result.message.as_deref().unwrap_or_default();
        let lines: Vec<&str> = text.split('\n').collect();
        let headline = lines.first().copied().unwrap_or_default();

        if lines.get(1).copied() != Some(DIFF_LEGEND) {
            return FailureMessage::plain(headline);
        }

        let mut expected = Vec::new();
        let mut actual = Vec::new();
        for line in lines.iter().skip(3) {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix('+') {
                expected.push(rest);
            } else if let Some(rest) = line.strip_prefix('-') {
                actual.push(rest);
            }
        }

        FailureMessage {
            message: headline.to_owned(),
            expected: Some(expected.join("\n")),
            actual: Some(actual.join("\n")),
            location: None,
        }
    }
}

/// Ordered classifier chain with a plain-message fallback.
pub struct FailureClassifiers {
    chain: Vec<Box<dyn FailureClassifier>>,
}

impl Default for FailureClassifiers {
    fn default() -> Self {
        Self {
            chain: vec![Box::new(AssertionDiffClassifier)],
        }
    }
}

impl std::fmt::Debug for FailureClassifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureClassifiers")
            .field("len", &self.chain.len())
            .finish()
    }
}

impl FailureClassifiers {
    #[must_use]
    pub fn empty() -> Self {
        Self { chain: Vec::new() }
    }

    pub fn register(&mut self, classifier: impl FailureClassifier + 'static) {
        self.chain.push(Box::new(classifier));
    }

    #[must_use]
    pub fn classify(&self, result: &TestStepResult) -> FailureMessage {
        self.chain
            .iter()
            .find(|classifier| classifier.can_classify(result))
            .map_or_else(|| fallback_message(result), |classifier| classifier.classify(result))
    }
}

fn fallback_message(result: &TestStepResult) -> FailureMessage {
    let message = result
        .message
        .clone()
        .or_else(|| {
            result
                .exception
                .as_ref()
                .and_then(|exception| exception.message.clone())
        })
        .unwrap_or_else(|| format!("Step failed with status {}", result.status));
    FailureMessage::plain(message)
}

#[cfg(test)]
mod tests {
    use cukebridge_messages::{Duration, Exception, TestStepResultStatus};

    use super::*;

    fn failed(message: Option<&str>) -> TestStepResult {
        TestStepResult {
            status: TestStepResultStatus::Failed,
            message: message.map(str::to_owned),
            exception: None,
            duration: Duration::default(),
        }
    }

    #[test]
    fn assertion_diff_is_split_into_expected_and_actual() {
        let result = failed(Some(
            "AssertionError [ERR_ASSERTION]: Expected values to be strictly equal:\n    + expected - actual\n\n    -1\n    +2\n",
        ));
        let message = FailureClassifiers::default().classify(&result);
        assert_eq!(
            message.message,
            "AssertionError [ERR_ASSERTION]: Expected values to be strictly equal:"
        );
        assert_eq!(message.expected.as_deref(), Some("2"));
        assert_eq!(message.actual.as_deref(), Some("1"));
        assert!(message.has_diff());
    }

    #[test]
    fn assertion_without_legend_keeps_headline_only() {
        let result = failed(Some("AssertionError [ERR_ASSERTION]: boom\n    at step.js:3"));
        let message = FailureClassifiers::default().classify(&result);
        assert_eq!(message.message, "AssertionError [ERR_ASSERTION]: boom");
        assert!(!message.has_diff());
    }

    #[test]
    fn other_messages_pass_through_verbatim() {
        let result = failed(Some("expected 1 to equal 2"));
        let message = FailureClassifiers::default().classify(&result);
        assert_eq!(message, FailureMessage::plain("expected 1 to equal 2"));
    }

    #[test]
    fn fallback_uses_exception_then_status() {
        let mut result = failed(None);
        result.exception = Some(Exception {
            kind: "Error".to_owned(),
            message: Some("socket hang up".to_owned()),
        });
        assert_eq!(
            FailureClassifiers::empty().classify(&result).message,
            "socket hang up"
        );

        result.exception = None;
        assert_eq!(
            FailureClassifiers::empty().classify(&result).message,
            "Step failed with status FAILED"
        );
    }
}
