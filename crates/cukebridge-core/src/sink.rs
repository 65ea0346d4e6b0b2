//! Result sink: where normalized lifecycle events go.
//!
//! The host implements [`ResultSink`] on top of its test-run API. Sinks are
//! called synchronously from the correlator and must not call back into it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::failure::FailureMessage;
use crate::tree::TestNode;

pub trait ResultSink {
    fn enqueued(&mut self, node: &TestNode);

    fn started(&mut self, node: &TestNode);

    fn passed(&mut self, node: &TestNode, duration: Option<Duration>);

    fn failed(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>);

    /// The node could not be judged, e.g. an undefined step or a process
    /// error before any scenario started.
    fn errored(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>);

    fn skipped(&mut self, node: &TestNode);

    /// Output attributed to `node`, or to the run when `None`.
    fn append_output(&mut self, text: &str, node: Option<&TestNode>);

    /// Non-protocol text printed by the runner process.
    fn console_output(&mut self, _text: &str) {}

    /// The run is over. Called once per run.
    fn end(&mut self);
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn enqueued(&mut self, node: &TestNode) {
        (**self).enqueued(node);
    }

    fn started(&mut self, node: &TestNode) {
        (**self).started(node);
    }

    fn passed(&mut self, node: &TestNode, duration: Option<Duration>) {
        (**self).passed(node, duration);
    }

    fn failed(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) {
        (**self).failed(node, failure, duration);
    }

    fn errored(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) {
        (**self).errored(node, failure, duration);
    }

    fn skipped(&mut self, node: &TestNode) {
        (**self).skipped(node);
    }

    fn append_output(&mut self, text: &str, node: Option<&TestNode>) {
        (**self).append_output(text, node);
    }

    fn console_output(&mut self, text: &str) {
        (**self).console_output(text);
    }

    fn end(&mut self) {
        (**self).end();
    }
}

/// One recorded sink call, keyed by node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    Enqueued {
        node: String,
    },
    Started {
        node: String,
    },
    Passed {
        node: String,
        duration_ms: Option<f64>,
    },
    Failed {
        node: String,
        failure: FailureMessage,
        duration_ms: Option<f64>,
    },
    Errored {
        node: String,
        failure: FailureMessage,
        duration_ms: Option<f64>,
    },
    Skipped {
        node: String,
    },
    Output {
        text: String,
        node: Option<String>,
    },
    Console {
        text: String,
    },
    End,
}

impl SinkEvent {
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Enqueued { node }
            | Self::Started { node }
            | Self::Passed { node, .. }
            | Self::Failed { node, .. }
            | Self::Errored { node, .. }
            | Self::Skipped { node } => Some(node),
            Self::Output { node, .. } => node.as_deref(),
            Self::Console { .. } | Self::End => None,
        }
    }

    /// Terminal outcomes only: passed, failed, errored, skipped.
    #[must_use]
    pub const fn is_verdict(&self) -> bool {
        matches!(
            self,
            Self::Passed { .. } | Self::Failed { .. } | Self::Errored { .. } | Self::Skipped { .. }
        )
    }
}

/// Sink that keeps every call in order; used by tests and the CLI.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.events)
    }

    /// Verdict events in arrival order.
    #[must_use]
    pub fn verdicts(&self) -> Vec<&SinkEvent> {
        self.events.iter().filter(|event| event.is_verdict()).collect()
    }

    #[must_use]
    pub fn verdicts_for(&self, node: &str) -> Vec<&SinkEvent> {
        self.events
            .iter()
            .filter(|event| event.is_verdict() && event.node() == Some(node))
            .collect()
    }

    #[must_use]
    pub fn end_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SinkEvent::End))
            .count()
    }

    fn push(&mut self, event: SinkEvent) {
        self.events.push(event);
    }
}

fn millis(duration: Option<Duration>) -> Option<f64> {
    duration.map(|duration| duration.as_nanos() as f64 / 1_000_000.0)
}

/// One constructor per [`ResultSink`] call, shared by the recording and
/// streaming sinks.
impl SinkEvent {
    #[must_use]
    pub fn enqueued(node: &TestNode) -> Self {
        Self::Enqueued {
            node: node.id.clone(),
        }
    }

    #[must_use]
    pub fn started(node: &TestNode) -> Self {
        Self::Started {
            node: node.id.clone(),
        }
    }

    #[must_use]
    pub fn passed(node: &TestNode, duration: Option<Duration>) -> Self {
        Self::Passed {
            node: node.id.clone(),
            duration_ms: millis(duration),
        }
    }

    #[must_use]
    pub fn failed(node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) -> Self {
        Self::Failed {
            node: node.id.clone(),
            failure: failure.clone(),
            duration_ms: millis(duration),
        }
    }

    #[must_use]
    pub fn errored(node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) -> Self {
        Self::Errored {
            node: node.id.clone(),
            failure: failure.clone(),
            duration_ms: millis(duration),
        }
    }

    #[must_use]
    pub fn skipped(node: &TestNode) -> Self {
        Self::Skipped {
            node: node.id.clone(),
        }
    }

    #[must_use]
    pub fn output(text: &str, node: Option<&TestNode>) -> Self {
        Self::Output {
            text: text.to_owned(),
            node: node.map(|node| node.id.clone()),
        }
    }

    #[must_use]
    pub fn console(text: &str) -> Self {
        Self::Console {
            text: text.to_owned(),
        }
    }
}

impl ResultSink for RecordingSink {
    fn enqueued(&mut self, node: &TestNode) {
        self.push(SinkEvent::enqueued(node));
    }

    fn started(&mut self, node: &TestNode) {
        self.push(SinkEvent::started(node));
    }

    fn passed(&mut self, node: &TestNode, duration: Option<Duration>) {
        self.push(SinkEvent::passed(node, duration));
    }

    fn failed(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) {
        self.push(SinkEvent::failed(node, failure, duration));
    }

    fn errored(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) {
        self.push(SinkEvent::errored(node, failure, duration));
    }

    fn skipped(&mut self, node: &TestNode) {
        self.push(SinkEvent::skipped(node));
    }

    fn append_output(&mut self, text: &str, node: Option<&TestNode>) {
        self.push(SinkEvent::output(text, node));
    }

    fn console_output(&mut self, text: &str) {
        self.push(SinkEvent::console(text));
    }

    fn end(&mut self) {
        self.push(SinkEvent::End);
    }
}
