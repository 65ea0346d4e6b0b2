//! Cucumber message protocol: envelope wire types and the line decoder.
//!
//! A test-runner started with `--format message` writes one JSON object per
//! line to stdout. Each object carries exactly one populated key naming the
//! message kind (`gherkinDocument`, `pickle`, `testCase`, ...). The types in
//! [`envelope`] mirror the subset of the schema the correlator consumes, and
//! [`decode`] classifies raw lines into envelopes, plain text, or noise.

pub mod decode;
pub mod envelope;
pub mod status;

pub use decode::{DecodedLine, decode_line};
pub use envelope::{
    Attachment, AttachmentContentEncoding, Background, Envelope, EnvelopeKind, Exception,
    Feature, FeatureChild, GherkinDocument, Hook, Location, Pickle, PickleStep, Rule, RuleChild,
    Scenario, SourceReference, Step, StepDefinition, StepKeywordType, TestCase, TestCaseFinished,
    TestCaseStarted, TestRunFinished, TestRunStarted, TestStep, TestStepFinished,
    TestStepResult, TestStepStarted, Timestamp,
};
pub use status::{Duration, TestStepResultStatus};
