//! The correlation engine.
//!
//! [`Correlator`] consumes decoded envelopes one at a time, updates the
//! run-scoped registry, index, phase and tally state, and reports lifecycle
//! events to a [`ResultSink`]. Processing an envelope never blocks; the
//! caller feeds lines as they arrive.
//!
//! Join misses drop the event and log it. The only error surfaced to the
//! caller is an unknown step status, which aborts the stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cukebridge_error::Result;
use cukebridge_messages::{
    Attachment, AttachmentContentEncoding, DecodedLine, Envelope, GherkinDocument, Hook, Pickle,
    StepDefinition, TestCase, TestCaseFinished, TestCaseStarted, TestRunFinished,
    TestStepFinished, TestStepStarted, decode_line,
};
use tracing::{debug, error, info, trace, warn};

use crate::aggregate::{ErrorTally, StepOutcome, Verdict};
use crate::failure::{FailureClassifiers, FailureMessage, SourceSpan};
use crate::index::IdentityIndex;
use crate::phase::{Phase, PhaseTracker, undefined_step_snippet};
use crate::registry::{DocumentRegistry, normalize_uri, run_prefix};
use crate::resolver::Resolver;
use crate::sink::ResultSink;
use crate::tree::{TestNode, TestTree};

const SCENARIO_FAILED_MESSAGE: &str = "One or more steps failed";
const PENDING_MESSAGE: &str = "Step is pending";

/// Where the runner runs relative to the host workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub workspace_root: PathBuf,
    /// Prepended to every document uri; see [`run_prefix`].
    pub uri_prefix: String,
}

impl RunContext {
    pub fn new(workspace_root: impl Into<PathBuf>, uri_prefix: impl Into<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            uri_prefix: uri_prefix.into(),
        }
    }

    /// Context for a runner started in `working_directory`.
    #[must_use]
    pub fn for_directories(workspace_root: &Path, working_directory: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            uri_prefix: run_prefix(workspace_root, working_directory),
        }
    }
}

/// Flags shared with the diagnostic-stream consumer.
///
/// The diagnostic stream is read concurrently with the protocol stream and
/// there is no ordering between the two, so a reader sampling this flag sees
/// whatever the correlator has processed so far.
#[derive(Debug, Default)]
pub struct RunSignals {
    any_test_case_started: AtomicBool,
}

impl RunSignals {
    pub fn mark_test_case_started(&self) {
        self.any_test_case_started.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn any_test_case_started(&self) -> bool {
        self.any_test_case_started.load(Ordering::Acquire)
    }
}

/// Everything that must not survive from one run into the next.
#[derive(Debug, Default)]
struct CorrelationState {
    registry: DocumentRegistry,
    index: IdentityIndex,
    phases: PhaseTracker,
    tallies: ErrorTally,
    run_ended: bool,
}

impl CorrelationState {
    fn new(uri_prefix: &str) -> Self {
        Self {
            registry: DocumentRegistry::new(uri_prefix),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct Correlator {
    tree: TestTree,
    context: RunContext,
    classifiers: FailureClassifiers,
    state: CorrelationState,
    signals: Arc<RunSignals>,
    runs: u64,
}

impl Correlator {
    #[must_use]
    pub fn new(tree: TestTree, context: RunContext) -> Self {
        let state = CorrelationState::new(&context.uri_prefix);
        Self {
            tree,
            context,
            classifiers: FailureClassifiers::default(),
            state,
            signals: Arc::new(RunSignals::default()),
            runs: 0,
        }
    }

    #[must_use]
    pub fn with_classifiers(mut self, classifiers: FailureClassifiers) -> Self {
        self.classifiers = classifiers;
        self
    }

    #[must_use]
    pub fn tree(&self) -> &TestTree {
        &self.tree
    }

    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    #[must_use]
    pub fn signals(&self) -> Arc<RunSignals> {
        Arc::clone(&self.signals)
    }

    #[must_use]
    pub fn registry(&self) -> &DocumentRegistry {
        &self.state.registry
    }

    #[must_use]
    pub fn index(&self) -> &IdentityIndex {
        &self.state.index
    }

    #[must_use]
    pub fn error_tally(&self, test_case_id: &str) -> u32 {
        self.state.tallies.count(test_case_id)
    }

    #[must_use]
    pub fn phase(&self, test_case_id: &str) -> Phase {
        self.state.phases.current(test_case_id)
    }

    #[must_use]
    pub fn run_ended(&self) -> bool {
        self.state.run_ended
    }

    /// Drop all state from the previous run and start a new one. Returns
    /// the signals for this run.
    pub fn begin_run(&mut self) -> Arc<RunSignals> {
        self.state = CorrelationState::new(&self.context.uri_prefix);
        self.signals = Arc::new(RunSignals::default());
        self.runs = self.runs.saturating_add(1);
        info!(
            run = self.runs,
            nodes = self.tree.len(),
            uri_prefix = %self.context.uri_prefix,
            "correlation state reset"
        );
        Arc::clone(&self.signals)
    }

    /// End the run on the sink unless `testRunFinished` already did.
    pub fn finish_run<S: ResultSink + ?Sized>(&mut self, sink: &mut S) {
        if self.state.run_ended {
            return;
        }
        self.state.run_ended = true;
        sink.end();
    }

    /// Classify and process one line of runner stdout.
    pub fn handle_line<S: ResultSink + ?Sized>(&mut self, line: &str, sink: &mut S) -> Result<()> {
        match decode_line(line) {
            DecodedLine::Blank => {}
            DecodedLine::Text(text) => {
                info!(pipe = "stdout", "{text}");
                sink.console_output(&text);
            }
            DecodedLine::Envelope(envelope) => {
                debug!(pipe = "stdout", kind = envelope.kind().label(), "envelope");
                self.handle_envelope(*envelope, sink)?;
            }
            DecodedLine::Ignored => trace!(pipe = "stdout", "unconsumed envelope kind"),
            DecodedLine::Noise => debug!(pipe = "stdout", line = line.trim(), "protocol noise"),
        }
        Ok(())
    }

    pub fn handle_envelope<S: ResultSink + ?Sized>(
        &mut self,
        envelope: Envelope,
        sink: &mut S,
    ) -> Result<()> {
        match envelope {
            Envelope::Document(document) => self.on_document(&document),
            Envelope::Pickle(pickle) => self.on_pickle(pickle),
            Envelope::StepDefinition(step_definition) => self.on_step_definition(&step_definition),
            Envelope::Hook(hook) => self.on_hook(hook),
            Envelope::TestRunStarted(_) => self.on_test_run_started(sink),
            Envelope::TestCase(test_case) => self.on_test_case(test_case),
            Envelope::TestCaseStarted(started) => self.on_test_case_started(&started, sink),
            Envelope::TestStepStarted(started) => self.on_test_step_started(&started, sink),
            Envelope::TestStepFinished(finished) => {
                return self.on_test_step_finished(&finished, sink);
            }
            Envelope::TestCaseFinished(finished) => self.on_test_case_finished(&finished, sink),
            Envelope::TestRunFinished(finished) => self.on_test_run_finished(&finished, sink),
            Envelope::Attachment(attachment) => self.on_attachment(&attachment, sink),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registry and index
    // -----------------------------------------------------------------------

    fn on_document(&mut self, document: &GherkinDocument) {
        let Some(uri) = document.uri.as_deref() else {
            warn!("document envelope without uri");
            return;
        };
        self.state.registry.register(uri, document.feature.as_ref());
    }

    fn on_pickle(&mut self, pickle: Pickle) {
        if self.state.registry.lookup_uri(&pickle.uri).is_none() {
            debug!(pickle = %pickle.id, uri = %pickle.uri, "pickle for unregistered document");
        }
        self.state.index.insert_pickle(pickle);
    }

    fn on_step_definition(&mut self, step_definition: &StepDefinition) {
        if let Some(uri) = step_definition.source_reference.uri.as_deref() {
            self.state
                .registry
                .record_step_definition(uri, &step_definition.id);
        }
    }

    fn on_hook(&mut self, hook: Hook) {
        self.state.index.insert_hook(hook);
    }

    fn on_test_case(&mut self, test_case: TestCase) {
        match self.state.index.pickle(&test_case.pickle_id) {
            Some(pickle) => {
                if !self
                    .state
                    .registry
                    .record_test_case(&pickle.uri, &test_case.id)
                {
                    debug!(test_case = %test_case.id, uri = %pickle.uri, "test case for unregistered document");
                }
            }
            None => warn!(
                test_case = %test_case.id,
                pickle = %test_case.pickle_id,
                "test case references unknown pickle"
            ),
        }
        self.state.phases.reset(&test_case.id);
        self.state.tallies.reset(&test_case.id);
        self.state.index.insert_test_case(test_case);
    }

    // -----------------------------------------------------------------------
    // Execution lifecycle
    // -----------------------------------------------------------------------

    fn on_test_run_started<S: ResultSink + ?Sized>(&self, sink: &mut S) {
        let mut enqueued = 0usize;
        for node in self.tree.iter() {
            sink.enqueued(node);
            enqueued += 1;
        }
        info!(
            enqueued,
            documents = self.state.registry.len(),
            pickles = self.state.index.pickle_count(),
            "test run started"
        );
    }

    fn on_test_case_started<S: ResultSink + ?Sized>(
        &mut self,
        started: &TestCaseStarted,
        sink: &mut S,
    ) {
        if self.state.index.test_case(&started.test_case_id).is_none() {
            warn!(
                test_case_started = %started.id,
                test_case = %started.test_case_id,
                "test case started for unknown test case"
            );
            return;
        }
        self.state
            .index
            .insert_started(&started.id, &started.test_case_id);
        if started.attempt > 0 {
            debug!(test_case = %started.test_case_id, attempt = started.attempt, "retrying test case");
            self.state.phases.reset(&started.test_case_id);
            self.state.tallies.reset(&started.test_case_id);
        }

        let resolver = Resolver::new(&self.state.index, &self.state.registry, &self.tree);
        match resolver.scenario(&started.id) {
            Ok(target) => {
                sink.started(target.scenario_node);
                self.signals.mark_test_case_started();
            }
            Err(miss) => warn!(
                test_case_started = %started.id,
                miss = %miss,
                "could not find scenario node for started test case"
            ),
        }
    }

    fn on_test_step_started<S: ResultSink + ?Sized>(&self, started: &TestStepStarted, sink: &mut S) {
        let resolver = Resolver::new(&self.state.index, &self.state.registry, &self.tree);
        match resolver.content_step(&started.test_step_id, &started.test_case_started_id) {
            Ok(target) => sink.started(target.step_node),
            // Background steps and hooks have no step node.
            Err(miss) => trace!(test_step = %started.test_step_id, miss = %miss, "step start not attributed"),
        }
    }

    fn on_test_step_finished<S: ResultSink + ?Sized>(
        &mut self,
        finished: &TestStepFinished,
        sink: &mut S,
    ) -> Result<()> {
        let result = &finished.test_step_result;
        let outcome = StepOutcome::classify(&result.status, &finished.test_step_id)
            .inspect_err(|err| error!(error = %err, "aborting result processing"))?;
        let duration = Some(result.duration.to_std());

        let resolver = Resolver::new(&self.state.index, &self.state.registry, &self.tree);
        let target = match resolver.content_step(&finished.test_step_id, &finished.test_case_started_id) {
            Ok(target) => target,
            Err(content_miss) => {
                match resolver.hook_step(&finished.test_step_id, &finished.test_case_started_id) {
                    Ok(hook) => {
                        if !outcome.counts_as_error() {
                            return Ok(());
                        }
                        warn!(
                            scenario = %hook.scenario_node.id,
                            hook = %hook.hook.id,
                            status = %result.status,
                            message = result.message.as_deref().unwrap_or_default(),
                            "hook failed"
                        );
                        let location = hook_location(
                            &self.context.workspace_root,
                            self.state.registry.prefix(),
                            hook.hook,
                        );
                        let failure = self.classifiers.classify(result).at(location);
                        sink.failed(hook.scenario_node, &failure, duration);
                        self.state.tallies.record(&hook.test_case.id);
                    }
                    Err(hook_miss) => debug!(
                        test_step = %finished.test_step_id,
                        content_miss = %content_miss,
                        hook_miss = %hook_miss,
                        "step result not attributed"
                    ),
                }
                return Ok(());
            }
        };

        let step = target.static_step;
        let phase = self
            .state
            .phases
            .advance(&target.test_case.id, step.keyword_type);
        let location = node_location(target.step_node);

        match outcome {
            StepOutcome::Passed => sink.passed(target.step_node, duration),
            StepOutcome::Skipped => sink.skipped(target.step_node),
            StepOutcome::Undefined => {
                let failure = FailureMessage::plain(undefined_step_snippet(
                    step.keyword_type,
                    phase,
                    &step.text,
                ))
                .at(location);
                sink.errored(target.step_node, &failure, duration);
            }
            StepOutcome::Pending => {
                let message = result.message.as_deref().unwrap_or(PENDING_MESSAGE);
                sink.failed(
                    target.step_node,
                    &FailureMessage::plain(message).at(location),
                    duration,
                );
            }
            StepOutcome::Failed | StepOutcome::Ambiguous => {
                let failure = self.classifiers.classify(result).at(location);
                sink.failed(target.step_node, &failure, duration);
            }
        }

        if outcome.counts_as_error() {
            let errors = self.state.tallies.record(&target.test_case.id);
            debug!(
                step = %target.step_node.id,
                status = %result.status,
                errors,
                "step counted as error"
            );
        }
        Ok(())
    }

    fn on_test_case_finished<S: ResultSink + ?Sized>(
        &mut self,
        finished: &TestCaseFinished,
        sink: &mut S,
    ) {
        let started_id = &finished.test_case_started_id;
        let resolver = Resolver::new(&self.state.index, &self.state.registry, &self.tree);
        let Some(test_case) = self.state.index.test_case_for_started(started_id) else {
            warn!(test_case_started = %started_id, "no test case for finished attempt");
            return;
        };
        let errors = self.state.tallies.take(&test_case.id);
        self.state.phases.discard(&test_case.id);

        let scenario = match resolver.scenario(started_id) {
            Ok(target) => target.scenario_node,
            Err(miss) => {
                warn!(test_case_started = %started_id, miss = %miss, "no scenario node for finished attempt");
                return;
            }
        };

        match Verdict::from_error_count(errors) {
            Verdict::Failed => {
                info!(scenario = %scenario.id, errors, "scenario failed");
                sink.failed(scenario, &FailureMessage::plain(SCENARIO_FAILED_MESSAGE), None);
            }
            Verdict::Passed => {
                info!(scenario = %scenario.id, "scenario succeeded");
                sink.passed(scenario, None);
            }
        }
        if finished.will_be_retried {
            info!(scenario = %scenario.id, "attempt will be retried");
        }
    }

    fn on_test_run_finished<S: ResultSink + ?Sized>(
        &mut self,
        finished: &TestRunFinished,
        sink: &mut S,
    ) {
        info!(
            success = ?finished.success,
            message = finished.message.as_deref().unwrap_or_default(),
            "test run finished"
        );
        self.finish_run(sink);
    }

    fn on_attachment<S: ResultSink + ?Sized>(&self, attachment: &Attachment, sink: &mut S) {
        if !attachment.is_plain_text() {
            trace!(media_type = %attachment.media_type, "attachment not forwarded");
            return;
        }
        if attachment.content_encoding == AttachmentContentEncoding::Base64 {
            debug!("base64 text attachment not forwarded");
            return;
        }

        let resolver = Resolver::new(&self.state.index, &self.state.registry, &self.tree);
        let node = match (
            attachment.test_step_id.as_deref(),
            attachment.test_case_started_id.as_deref(),
        ) {
            (Some(test_step_id), Some(started_id)) => resolver
                .content_step(test_step_id, started_id)
                .ok()
                .map(|target| target.step_node),
            _ => None,
        };
        sink.append_output(&format!("{}\r\n", attachment.body), node);
    }
}

/// Whole-line span at the node's own position.
fn node_location(node: &TestNode) -> Option<SourceSpan> {
    let uri = node.uri.as_ref()?;
    let line = node.line?;
    Some(SourceSpan::line(uri.to_string_lossy(), line, 0))
}

/// Hooks have no column-accurate span: report from the hook's position to the
/// end of its line.
fn hook_location(workspace_root: &Path, uri_prefix: &str, hook: &Hook) -> Option<SourceSpan> {
    let uri = hook.source_reference.uri.as_deref()?;
    let location = hook.source_reference.location?;
    let path = workspace_root.join(format!("{uri_prefix}{}", normalize_uri(uri)));
    Some(SourceSpan::line(
        path.to_string_lossy(),
        location.line.saturating_sub(1),
        location.column.map_or(0, |column| column.saturating_sub(1)),
    ))
}

#[cfg(test)]
mod tests {
    use cukebridge_messages::{Location, SourceReference};

    use super::*;

    #[test]
    fn hook_location_is_workspace_relative_and_zero_based() {
        let hook = Hook {
            id: "h1".to_owned(),
            name: None,
            source_reference: SourceReference {
                uri: Some("support\\hooks.js".to_owned()),
                location: Some(Location {
                    line: 10,
                    column: Some(3),
                }),
            },
            tag_expression: None,
        };
        let span = hook_location(Path::new("/work"), "app/", &hook).unwrap();
        assert_eq!(span.uri, "/work/app/support/hooks.js");
        assert_eq!((span.start_line, span.start_column), (9, 2));
        assert_eq!(span.end_line, 9);
        assert_eq!(span.end_column, None);
    }

    #[test]
    fn hook_without_source_has_no_location() {
        let hook = Hook {
            id: "h1".to_owned(),
            name: None,
            source_reference: SourceReference::default(),
            tag_expression: None,
        };
        assert!(hook_location(Path::new("/work"), "", &hook).is_none());
    }

    #[test]
    fn signals_start_clear() {
        let signals = RunSignals::default();
        assert!(!signals.any_test_case_started());
        signals.mark_test_case_started();
        assert!(signals.any_test_case_started());
    }

    #[test]
    fn context_for_directories_computes_prefix() {
        let context =
            RunContext::for_directories(Path::new("/work"), Path::new("/work/packages/web"));
        assert_eq!(context.uri_prefix, "packages/web/");
    }
}
