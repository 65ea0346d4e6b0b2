//! Envelope wire types.
//!
//! Only the fields the correlator reads are modelled; unknown fields are
//! ignored so newer producers remain readable. Ids are plain strings issued
//! by the producer and joined later by the correlator.

use serde::{Deserialize, Serialize};

use crate::status::{Duration, TestStepResultStatus};

// ---------------------------------------------------------------------------
// Shared fragments
// ---------------------------------------------------------------------------

/// One-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    #[serde(default)]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(default)]
    pub seconds: i64,
    #[serde(default)]
    pub nanos: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

// ---------------------------------------------------------------------------
// Static hierarchy (gherkin document)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GherkinDocument {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub feature: Option<Feature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub children: Vec<FeatureChild>,
}

/// One child of a feature; exactly one field is populated on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureChild {
    #[serde(default)]
    pub background: Option<Background>,
    #[serde(default)]
    pub scenario: Option<Scenario>,
    #[serde(default)]
    pub rule: Option<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub children: Vec<RuleChild>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChild {
    #[serde(default)]
    pub background: Option<Background>,
    #[serde(default)]
    pub scenario: Option<Scenario>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    pub id: String,
    pub location: Location,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub location: Location,
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub location: Location,
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub keyword_type: StepKeywordType,
    #[serde(default)]
    pub text: String,
}

/// Grammatical role of a step keyword. Older producers upper-case the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKeywordType {
    /// `Given`
    #[serde(alias = "CONTEXT")]
    Context,
    /// `When`
    #[serde(alias = "ACTION")]
    Action,
    /// `Then`
    #[serde(alias = "OUTCOME")]
    Outcome,
    /// `And` / `But`
    #[serde(alias = "CONJUNCTION")]
    Conjunction,
    #[default]
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Runtime artifacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pickle {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ast_node_ids: Vec<String>,
    #[serde(default)]
    pub steps: Vec<PickleStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickleStep {
    pub id: String,
    #[serde(default)]
    pub ast_node_ids: Vec<String>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: String,
    #[serde(default)]
    pub source_reference: SourceReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source_reference: SourceReference,
    #[serde(default)]
    pub tag_expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub pickle_id: String,
    #[serde(default)]
    pub test_steps: Vec<TestStep>,
}

impl TestCase {
    #[must_use]
    pub fn step(&self, test_step_id: &str) -> Option<&TestStep> {
        self.test_steps.iter().find(|step| step.id == test_step_id)
    }
}

/// A content step carries `pickle_step_id`, a hook step carries `hook_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub id: String,
    #[serde(default)]
    pub pickle_step_id: Option<String>,
    #[serde(default)]
    pub hook_id: Option<String>,
    #[serde(default)]
    pub step_definition_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Execution lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunStarted {
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseStarted {
    pub id: String,
    pub test_case_id: String,
    #[serde(default)]
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepStarted {
    pub test_case_started_id: String,
    pub test_step_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStepResult {
    pub status: TestStepResultStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exception: Option<Exception>,
    #[serde(default)]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepFinished {
    pub test_case_started_id: String,
    pub test_step_id: String,
    pub test_step_result: TestStepResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseFinished {
    pub test_case_started_id: String,
    #[serde(default)]
    pub will_be_retried: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunFinished {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentContentEncoding {
    #[default]
    Identity,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub content_encoding: AttachmentContentEncoding,
    #[serde(default)]
    pub test_case_started_id: Option<String>,
    #[serde(default)]
    pub test_step_id: Option<String>,
}

impl Attachment {
    /// Plain-text attachments are forwarded to the host as output.
    #[must_use]
    pub fn is_plain_text(&self) -> bool {
        self.media_type == "text/plain"
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One decoded protocol message, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Document(GherkinDocument),
    Pickle(Pickle),
    StepDefinition(StepDefinition),
    Hook(Hook),
    TestRunStarted(TestRunStarted),
    TestCase(TestCase),
    TestCaseStarted(TestCaseStarted),
    TestStepStarted(TestStepStarted),
    TestStepFinished(TestStepFinished),
    TestCaseFinished(TestCaseFinished),
    TestRunFinished(TestRunFinished),
    Attachment(Attachment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    Document,
    Pickle,
    StepDefinition,
    Hook,
    TestRunStarted,
    TestCase,
    TestCaseStarted,
    TestStepStarted,
    TestStepFinished,
    TestCaseFinished,
    TestRunFinished,
    Attachment,
}

impl EnvelopeKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Pickle => "pickle",
            Self::StepDefinition => "stepDefinition",
            Self::Hook => "hook",
            Self::TestRunStarted => "testRunStarted",
            Self::TestCase => "testCase",
            Self::TestCaseStarted => "testCaseStarted",
            Self::TestStepStarted => "testStepStarted",
            Self::TestStepFinished => "testStepFinished",
            Self::TestCaseFinished => "testCaseFinished",
            Self::TestRunFinished => "testRunFinished",
            Self::Attachment => "attachment",
        }
    }
}

impl Envelope {
    #[must_use]
    pub const fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Document(_) => EnvelopeKind::Document,
            Self::Pickle(_) => EnvelopeKind::Pickle,
            Self::StepDefinition(_) => EnvelopeKind::StepDefinition,
            Self::Hook(_) => EnvelopeKind::Hook,
            Self::TestRunStarted(_) => EnvelopeKind::TestRunStarted,
            Self::TestCase(_) => EnvelopeKind::TestCase,
            Self::TestCaseStarted(_) => EnvelopeKind::TestCaseStarted,
            Self::TestStepStarted(_) => EnvelopeKind::TestStepStarted,
            Self::TestStepFinished(_) => EnvelopeKind::TestStepFinished,
            Self::TestCaseFinished(_) => EnvelopeKind::TestCaseFinished,
            Self::TestRunFinished(_) => EnvelopeKind::TestRunFinished,
            Self::Attachment(_) => EnvelopeKind::Attachment,
        }
    }
}

/// Presence-of-key shape of an envelope line, before it is narrowed to one
/// [`Envelope`] variant.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawEnvelope {
    #[serde(default, alias = "gherkinDocument")]
    document: Option<GherkinDocument>,
    #[serde(default)]
    pickle: Option<Pickle>,
    #[serde(default)]
    step_definition: Option<StepDefinition>,
    #[serde(default)]
    hook: Option<Hook>,
    #[serde(default)]
    test_run_started: Option<TestRunStarted>,
    #[serde(default)]
    test_case: Option<TestCase>,
    #[serde(default)]
    test_case_started: Option<TestCaseStarted>,
    #[serde(default)]
    test_step_started: Option<TestStepStarted>,
    #[serde(default)]
    test_step_finished: Option<TestStepFinished>,
    #[serde(default)]
    test_case_finished: Option<TestCaseFinished>,
    #[serde(default)]
    test_run_finished: Option<TestRunFinished>,
    #[serde(default)]
    attachment: Option<Attachment>,
}

impl RawEnvelope {
    /// Narrow to the first populated kind. Envelopes for kinds the correlator
    /// does not consume (`meta`, `source`, `parameterType`, ...) yield `None`.
    pub(crate) fn into_envelope(self) -> Option<Envelope> {
        let Self {
            document,
            pickle,
            step_definition,
            hook,
            test_run_started,
            test_case,
            test_case_started,
            test_step_started,
            test_step_finished,
            test_case_finished,
            test_run_finished,
            attachment,
        } = self;

        attachment
            .map(Envelope::Attachment)
            .or_else(|| document.map(Envelope::Document))
            .or_else(|| pickle.map(Envelope::Pickle))
            .or_else(|| step_definition.map(Envelope::StepDefinition))
            .or_else(|| hook.map(Envelope::Hook))
            .or_else(|| test_run_started.map(Envelope::TestRunStarted))
            .or_else(|| test_case.map(Envelope::TestCase))
            .or_else(|| test_case_started.map(Envelope::TestCaseStarted))
            .or_else(|| test_step_started.map(Envelope::TestStepStarted))
            .or_else(|| test_step_finished.map(Envelope::TestStepFinished))
            .or_else(|| test_case_finished.map(Envelope::TestCaseFinished))
            .or_else(|| test_run_finished.map(Envelope::TestRunFinished))
    }
}
