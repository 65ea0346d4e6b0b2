//! Error type shared by every cukebridge crate.
//!
//! Join misses while correlating the message stream are not errors: they are
//! logged and the envelope is dropped. The variants here cover the conditions
//! that must reach the caller, most importantly
//! [`BridgeError::UnknownStepStatus`], which aborts result processing.

use std::path::PathBuf;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A step result carried a status outside the known enumeration.
    ///
    /// Producer and consumer disagree on the protocol version; continuing
    /// would misreport results.
    #[error("unhandled step result status `{status}` for test step `{test_step_id}`")]
    UnknownStepStatus {
        status: String,
        test_step_id: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings in {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("failed to spawn `{program}`: {detail}")]
    Spawn { program: String, detail: String },

    /// The externally supplied test hierarchy could not be read.
    #[error("invalid test hierarchy: {detail}")]
    Tree { detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error means the message stream can no longer be trusted.
    #[must_use]
    pub const fn is_fatal_protocol_violation(&self) -> bool {
        matches!(self, Self::UnknownStepStatus { .. })
    }
}
