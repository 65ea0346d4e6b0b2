//! Sink that streams events as JSON lines, one [`SinkEvent`] per line.

use std::io::{self, Write};
use std::time::Duration;

use cukebridge_core::{FailureMessage, ResultSink, SinkEvent, TestNode};

/// Writes every sink call as it happens. The first write error is kept and
/// later calls are dropped; call [`JsonLinesSink::finish`] to observe it.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    out: W,
    written: u64,
    error: Option<io::Error>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            written: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the writer, or the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write(&mut self, event: &SinkEvent) {
        if self.error.is_some() {
            return;
        }
        match write_event(&mut self.out, event) {
            Ok(()) => self.written += 1,
            Err(err) => self.error = Some(err),
        }
    }
}

fn write_event<W: Write>(out: &mut W, event: &SinkEvent) -> io::Result<()> {
    serde_json::to_writer(&mut *out, event)?;
    out.write_all(b"\n")
}

impl<W: Write> ResultSink for JsonLinesSink<W> {
    fn enqueued(&mut self, node: &TestNode) {
        self.write(&SinkEvent::enqueued(node));
    }

    fn started(&mut self, node: &TestNode) {
        self.write(&SinkEvent::started(node));
    }

    fn passed(&mut self, node: &TestNode, duration: Option<Duration>) {
        self.write(&SinkEvent::passed(node, duration));
    }

    fn failed(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) {
        self.write(&SinkEvent::failed(node, failure, duration));
    }

    fn errored(&mut self, node: &TestNode, failure: &FailureMessage, duration: Option<Duration>) {
        self.write(&SinkEvent::errored(node, failure, duration));
    }

    fn skipped(&mut self, node: &TestNode) {
        self.write(&SinkEvent::skipped(node));
    }

    fn append_output(&mut self, text: &str, node: Option<&TestNode>) {
        self.write(&SinkEvent::output(text, node));
    }

    fn console_output(&mut self, text: &str) {
        self.write(&SinkEvent::console(text));
    }

    fn end(&mut self) {
        self.write(&SinkEvent::End);
    }
}
