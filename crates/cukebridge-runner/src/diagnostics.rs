//! Runner stderr handling.
//!
//! Every stderr line is logged. Lines are also buffered for the run: if the
//! stream ends before any test case started, the buffered text is the only
//! explanation the host gets (a syntax error in a step file, a missing
//! module, a bad profile) and it is reported as an error on every top-level
//! selected node. Output after results began is logged only.
//!
//! The "before any test case started" check samples the correlator's
//! [`RunSignals`] when stderr reaches EOF. The two streams are not ordered
//! relative to each other, so output racing with the first `testCaseStarted`
//! may land on either side.

use std::io::{self, BufRead};
use std::sync::Arc;

use cukebridge_core::{FailureMessage, ResultSink, RunSignals, TestTree};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::debug::DebugHandshake;
use crate::lines::LineReader;

/// Stderr lines seen during one run.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl DiagnosticBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// All buffered lines joined with `\n`, or `None` when nothing was seen.
    #[must_use]
    pub fn combined(&self) -> Option<String> {
        let lines = self.lines.lock();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Drain `reader` to EOF. Returns whether a test case had started when the
/// stream ended.
///
/// The debugger listening banner is handed to `handshake` and not buffered.
/// Every other non-blank line is, including output before the banner and all
/// output when the banner never arrives.
pub fn consume_stderr<R: BufRead>(
    reader: R,
    buffer: &DiagnosticBuffer,
    signals: &RunSignals,
    mut handshake: Option<DebugHandshake<'_>>,
) -> io::Result<bool> {
    let mut lines = LineReader::new(reader);
    while let Some(line) = lines.next_line()? {
        let line = line.trim();
        info!(pipe = "stderr", "{line}");

        let banner = handshake
            .as_mut()
            .is_some_and(|handshake| handshake.observe(line));
        if banner || line.is_empty() {
            continue;
        }
        buffer.push(line);
    }
    let started = signals.any_test_case_started();
    debug!(lines = buffer.len(), any_test_case_started = started, "stderr closed");
    Ok(started)
}

/// Report buffered stderr as one error on every top-level node. Returns the
/// number of nodes reported.
pub fn report_pre_result_errors<S: ResultSink + ?Sized>(
    tree: &TestTree,
    buffer: &DiagnosticBuffer,
    sink: &mut S,
) -> usize {
    let Some(text) = buffer.combined() else {
        return 0;
    };
    let failure = FailureMessage::plain(text);
    for node in &tree.roots {
        sink.errored(node, &failure, None);
    }
    info!(
        nodes = tree.roots.len(),
        lines = buffer.len(),
        "runner reported errors before any test case started"
    );
    tree.roots.len()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use cukebridge_core::{RecordingSink, SinkEvent, TestNode};

    use crate::debug::AttachRequest;

    use super::*;

    #[test]
    fn lines_are_trimmed_and_blank_lines_dropped() {
        let buffer = DiagnosticBuffer::new();
        let signals = RunSignals::default();
        let input = Cursor::new("  Error: Cannot find module 'x'  \n\n\trequire stack\r\n");
        let started = consume_stderr(input, &buffer, &signals, None).unwrap();
        assert!(!started);
        assert_eq!(
            buffer.snapshot(),
            vec!["Error: Cannot find module 'x'", "require stack"]
        );
    }

    #[test]
    fn flag_is_sampled_at_eof() {
        let buffer = DiagnosticBuffer::new();
        let signals = RunSignals::default();
        signals.mark_test_case_started();
        assert!(consume_stderr(Cursor::new("warn\n"), &buffer, &signals, None).unwrap());
    }

    #[test]
    fn only_the_banner_is_kept_from_the_buffer() {
        let buffer = DiagnosticBuffer::new();
        let signals = RunSignals::default();
        let mut attached = 0;
        let mut attach = |_: &AttachRequest| attached += 1;
        let root = std::path::Path::new("/work");
        let handshake = DebugHandshake::new(&mut attach, root);
        let input = Cursor::new(
            "(node) warning: inspector flag is experimental\nDebugger listening on ws://127.0.0.1:9229/x\nDebugger attached.\n",
        );
        consume_stderr(input, &buffer, &signals, Some(handshake)).unwrap();
        assert_eq!(attached, 1);
        assert_eq!(
            buffer.snapshot(),
            vec!["(node) warning: inspector flag is experimental", "Debugger attached."]
        );
    }

    #[test]
    fn stderr_without_banner_is_still_reported() {
        let buffer = DiagnosticBuffer::new();
        let signals = RunSignals::default();
        let mut attached = 0;
        let mut attach = |_: &AttachRequest| attached += 1;
        let handshake = DebugHandshake::new(&mut attach, std::path::Path::new("/work"));
        let input = Cursor::new(
            "Starting inspector on 127.0.0.1:9229 failed: address already in use\nError: Cannot find module 'x'\n",
        );
        let started = consume_stderr(input, &buffer, &signals, Some(handshake)).unwrap();
        assert!(!started);
        assert_eq!(attached, 0, "case=no_banner_no_attach");

        let tree = TestTree::new(vec![TestNode::new("a.feature")]);
        let mut sink = RecordingSink::new();
        assert_eq!(report_pre_result_errors(&tree, &buffer, &mut sink), 1);
        let [SinkEvent::Errored { failure, .. }] = sink.events() else {
            panic!("case=no_banner got {:?}", sink.events());
        };
        assert_eq!(
            failure.message,
            "Starting inspector on 127.0.0.1:9229 failed: address already in use\nError: Cannot find module 'x'"
        );
    }

    #[test]
    fn pre_result_errors_go_to_every_top_level_node() {
        let tree = TestTree::new(vec![
            TestNode::new("a.feature").with_child(TestNode::new("a.feature/2")),
            TestNode::new("b.feature"),
        ]);
        let buffer = DiagnosticBuffer::new();
        buffer.push("SyntaxError: Unexpected token");
        buffer.push("    at steps.js:3");
        let mut sink = RecordingSink::new();
        assert_eq!(report_pre_result_errors(&tree, &buffer, &mut sink), 2);

        let expected = "SyntaxError: Unexpected token\n    at steps.js:3";
        for (event, node) in sink.events().iter().zip(["a.feature", "b.feature"]) {
            let SinkEvent::Errored { node: id, failure, .. } = event else {
                panic!("case=errored got {event:?}");
            };
            assert_eq!(id, node);
            assert_eq!(failure.message, expected);
        }
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn empty_buffer_reports_nothing() {
        let tree = TestTree::new(vec![TestNode::new("a.feature")]);
        let mut sink = RecordingSink::new();
        assert_eq!(
            report_pre_result_errors(&tree, &DiagnosticBuffer::new(), &mut sink),
            0
        );
        assert!(sink.events().is_empty());
    }
}
