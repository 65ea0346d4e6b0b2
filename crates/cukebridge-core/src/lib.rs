//! Protocol correlation engine.
//!
//! The runner reports execution as normalized facts that reference each
//! other by id: documents, pickles, test cases, test-case attempts and step
//! results. The [`Correlator`] joins those facts back onto the host's static
//! test hierarchy ([`TestTree`]) and reports lifecycle events to a
//! [`ResultSink`].
//!
//! ```text
//!  line ─► decode ─► Envelope
//!                      ├── document / pickle / hook / testCase ─► DocumentRegistry + IdentityIndex
//!                      └── lifecycle ─► Resolver ─► PhaseTracker ─► ErrorTally ─► ResultSink
//! ```
//!
//! All state is run-scoped and dropped by [`Correlator::begin_run`].

pub mod aggregate;
pub mod correlator;
pub mod failure;
pub mod index;
pub mod phase;
pub mod registry;
pub mod resolver;
pub mod sink;
pub mod tree;

pub use aggregate::{ErrorTally, StepOutcome, Verdict};
pub use correlator::{Correlator, RunContext, RunSignals};
pub use failure::{
    AssertionDiffClassifier, FailureClassifier, FailureClassifiers, FailureMessage, SourceSpan,
};
pub use index::IdentityIndex;
pub use phase::{Phase, PhaseTracker, SnippetKeyword, undefined_step_snippet};
pub use registry::{Document, DocumentRegistry, ScenarioNode, StaticStep, normalize_uri, run_prefix};
pub use resolver::{HookTarget, Resolution, ResolveMiss, Resolver, ScenarioTarget, StepTarget};
pub use sink::{RecordingSink, ResultSink, SinkEvent};
pub use tree::{TestNode, TestTree};
