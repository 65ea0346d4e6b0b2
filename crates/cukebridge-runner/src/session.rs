//! One run of the runner process, end to end.
//!
//! ```text
//!            ┌── stdout ──► Correlator ──► sink            (calling thread)
//!  runner ───┤
//!            └── stderr ──► log + DiagnosticBuffer         (scoped thread)
//!                             │
//!                  EOF: sample RunSignals
//! ```
//!
//! Both streams are drained to EOF before the session returns. After that,
//! buffered stderr is reported if no test case had started, and the run is
//! ended on the sink if the protocol stream never did.

use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use cukebridge_core::{Correlator, ResultSink, TestTree};
use cukebridge_error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::RunnerSettings;
use crate::debug::{DebugHandshake, DebuggerAttach};
use crate::diagnostics::{DiagnosticBuffer, consume_stderr, report_pre_result_errors};
use crate::invocation::Invocation;
use crate::lines::LineReader;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub stdout_lines: u64,
    pub stderr_lines: Vec<String>,
    pub any_test_case_started: bool,
    /// Top-level nodes that received the buffered stderr as an error.
    pub pre_result_errors_reported: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// The process exited with status 0.
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Correlate one run from its two output streams.
///
/// A fatal protocol error stops correlation but stdout is still drained, so
/// the child never blocks on a full pipe. The error is returned after the run
/// has been ended on the sink.
pub fn run_session<O, E, S>(
    correlator: &mut Correlator,
    stdout: O,
    stderr: E,
    sink: &mut S,
    handshake: Option<DebugHandshake<'_>>,
) -> Result<SessionReport>
where
    O: Read,
    E: Read + Send,
    S: ResultSink + ?Sized,
{
    let signals = correlator.begin_run();
    let diagnostics = DiagnosticBuffer::new();

    let (stdout_result, stderr_result) = thread::scope(|scope| {
        let stderr_buffer = diagnostics.clone();
        let stderr_signals = Arc::clone(&signals);
        let stderr_task = scope.spawn(move || {
            consume_stderr(
                BufReader::new(stderr),
                &stderr_buffer,
                &stderr_signals,
                handshake,
            )
        });
        let stdout_result = consume_stdout(correlator, stdout, sink);
        let stderr_result = stderr_task
            .join()
            .map_err(|_| BridgeError::internal("stderr reader panicked"));
        (stdout_result, stderr_result)
    });

    let stdout_lines = stdout_result.as_ref().map_or(0, |lines| *lines);
    let any_test_case_started = match stderr_result {
        Ok(Ok(started)) => started,
        Ok(Err(err)) => {
            warn!(error = %err, "stderr read failed");
            signals.any_test_case_started()
        }
        Err(err) => {
            warn!(error = %err, "stderr reader did not finish");
            signals.any_test_case_started()
        }
    };

    let pre_result_errors_reported = if any_test_case_started {
        if !diagnostics.is_empty() {
            info!(lines = diagnostics.len(), "stderr output after results began; logged only");
        }
        0
    } else {
        report_pre_result_errors(correlator.tree(), &diagnostics, sink)
    };
    correlator.finish_run(sink);

    stdout_result?;
    Ok(SessionReport {
        stdout_lines,
        stderr_lines: diagnostics.snapshot(),
        any_test_case_started,
        pre_result_errors_reported,
    })
}

fn consume_stdout<O, S>(correlator: &mut Correlator, stdout: O, sink: &mut S) -> Result<u64>
where
    O: Read,
    S: ResultSink + ?Sized,
{
    let mut lines = LineReader::new(BufReader::new(stdout));
    let mut count = 0u64;
    let mut fatal: Option<BridgeError> = None;
    while let Some(line) = lines.next_line()? {
        count += 1;
        if fatal.is_some() {
            continue;
        }
        if let Err(err) = correlator.handle_line(&line, sink) {
            error!(error = %err, line = count, "result processing aborted; draining stdout");
            fatal = Some(err);
        }
    }
    match fatal {
        Some(err) => Err(err),
        None => Ok(count),
    }
}

/// Spawn the runner for `tree`, correlate its output into `sink` and wait for
/// it to exit. Passing `debugger` starts the runner under the inspector.
pub fn spawn_run<S>(
    settings: &RunnerSettings,
    workspace_root: &Path,
    tree: TestTree,
    sink: &mut S,
    debugger: Option<&mut dyn DebuggerAttach>,
) -> Result<RunOutcome>
where
    S: ResultSink + ?Sized,
{
    let invocation = Invocation::build(
        settings,
        workspace_root,
        &tree,
        debugger.is_some(),
        std::env::vars_os(),
    );
    info!(
        program = %invocation.program,
        args = ?invocation.args,
        working_directory = %invocation.working_directory.display(),
        "starting runner"
    );

    let mut child = invocation
        .command()
        .spawn()
        .map_err(|err| BridgeError::Spawn {
            program: invocation.program.clone(),
            detail: err.to_string(),
        })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::internal("runner stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BridgeError::internal("runner stderr was not piped"))?;

    let mut correlator = Correlator::new(tree, invocation.run_context(workspace_root));
    let handshake =
        debugger.map(|attach| DebugHandshake::new(attach, invocation.runner_root.as_path()));
    let session = run_session(&mut correlator, stdout, stderr, sink, handshake);

    let status = child.wait()?;
    info!(exit_code = ?status.code(), success = status.success(), "runner exited");
    let report = session?;
    info!(
        stdout_lines = report.stdout_lines,
        stderr_lines = report.stderr_lines.len(),
        "session complete"
    );
    Ok(RunOutcome {
        success: status.success(),
        exit_code: status.code(),
    })
}
