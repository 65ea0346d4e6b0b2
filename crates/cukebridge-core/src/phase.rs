//! Given/When/Then phase tracking per test case.
//!
//! `And`/`But` steps take the meaning of whatever phase is current, so the
//! tracker remembers the last explicit keyword seen in each test case. It
//! mirrors the feature text and does not enforce canonical order. The phase
//! is only consulted to synthesize the stub snippet for undefined steps.

use std::collections::HashMap;

use cukebridge_messages::StepKeywordType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Before,
    Context,
    Action,
    Outcome,
}

impl Phase {
    /// Phase after a step with `keyword_type`. Conjunctions and unknown
    /// keywords leave the phase unchanged.
    #[must_use]
    pub const fn after(self, keyword_type: StepKeywordType) -> Self {
        match keyword_type {
            StepKeywordType::Context => Self::Context,
            StepKeywordType::Action => Self::Action,
            StepKeywordType::Outcome => Self::Outcome,
            StepKeywordType::Conjunction | StepKeywordType::Unknown => self,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    phases: HashMap<String, Phase>,
}

impl PhaseTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a test case over at [`Phase::Before`].
    pub fn reset(&mut self, test_case_id: &str) {
        self.phases.insert(test_case_id.to_owned(), Phase::Before);
    }

    /// Apply one step and return the phase it is interpreted in.
    pub fn advance(&mut self, test_case_id: &str, keyword_type: StepKeywordType) -> Phase {
        let phase = self.phases.entry(test_case_id.to_owned()).or_default();
        *phase = phase.after(keyword_type);
        *phase
    }

    #[must_use]
    pub fn current(&self, test_case_id: &str) -> Phase {
        self.phases.get(test_case_id).copied().unwrap_or_default()
    }

    pub fn discard(&mut self, test_case_id: &str) {
        self.phases.remove(test_case_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnippetKeyword {
    Given,
    When,
    Then,
}

impl SnippetKeyword {
    /// Template keyword for a step, or `None` for a conjunction that appears
    /// before any explicit keyword.
    #[must_use]
    pub const fn for_step(keyword_type: StepKeywordType, phase: Phase) -> Option<Self> {
        match (keyword_type, phase) {
            (StepKeywordType::Context, _) | (StepKeywordType::Conjunction, Phase::Context) => {
                Some(Self::Given)
            }
            (StepKeywordType::Action, _) | (StepKeywordType::Conjunction, Phase::Action) => {
                Some(Self::When)
            }
            (StepKeywordType::Outcome, _) | (StepKeywordType::Conjunction, Phase::Outcome) => {
                Some(Self::Then)
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Given => "Given",
            Self::When => "When",
            Self::Then => "Then",
        }
    }
}

const SNIPPET_HEADER: &str = "Undefined. Implement with the following snippet:\n\n";

/// Message for an undefined step, with a step-definition stub when the
/// keyword can be determined.
#[must_use]
pub fn undefined_step_snippet(keyword_type: StepKeywordType, phase: Phase, text: &str) -> String {
    let mut message = String::from(SNIPPET_HEADER);
    if let Some(keyword) = SnippetKeyword::for_step(keyword_type, phase) {
        let escaped = text.replace('\\', "\\\\").replace('\'', "\\'");
        message.push_str(&format!(
            "{}('{escaped}', function () {{\n  return 'pending';\n}});",
            keyword.as_str()
        ));
    }
    message
}
