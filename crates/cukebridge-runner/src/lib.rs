//! Drives cucumber-js for a host test explorer.
//!
//! The runner is started with `--format message`; its stdout is correlated by
//! [`cukebridge_core::Correlator`] and its stderr is logged and, when nothing
//! ran, reported against the selected nodes. [`spawn_run`] does the whole
//! thing for one selection; [`run_session`] is the same pipeline over any
//! pair of readers, which is what replaying a recorded run uses.

pub mod config;
pub mod debug;
pub mod diagnostics;
pub mod invocation;
pub mod jsonl;
pub mod lines;
pub mod logging;
pub mod session;

pub use config::{DEFAULT_DEBUG_PORT, DEFAULT_NODE, DEFAULT_RUNNER_SCRIPT, RunnerSettings};
pub use debug::{AttachRequest, DEBUGGER_LISTENING_PREFIX, DebugHandshake, DebuggerAttach};
pub use diagnostics::{DiagnosticBuffer, consume_stderr, report_pre_result_errors};
pub use invocation::{Invocation, MESSAGE_FORMAT_ARGS, normalize_drive_letter, selection_arguments};
pub use jsonl::JsonLinesSink;
pub use lines::LineReader;
pub use logging::{LogFormat, init_logging};
pub use session::{RunOutcome, SessionReport, run_session, spawn_run};
