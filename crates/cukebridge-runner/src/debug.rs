//! Debugger attach handshake.
//!
//! With `--inspect-brk` the runner pauses before executing anything and
//! prints `Debugger listening on ws://<address>` on stderr. The first such
//! line fires one attach request; later lines are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEBUGGER_LISTENING_PREFIX: &str = "Debugger listening on ws://";

/// What the host needs to attach an inspector-protocol debugger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub name: String,
    /// The endpoint without the `ws://` scheme.
    pub address: String,
    pub protocol: String,
    pub skip_files: Vec<String>,
}

impl AttachRequest {
    pub fn new(address: impl Into<String>, runner_root: &Path) -> Self {
        Self {
            name: "Attach to Cucumber".to_owned(),
            address: address.into(),
            protocol: "inspector".to_owned(),
            skip_files: vec![
                "<node_internals>/**".to_owned(),
                runner_root
                    .join("node_modules/**")
                    .to_string_lossy()
                    .into_owned(),
            ],
        }
    }
}

pub trait DebuggerAttach: Send {
    fn attach(&mut self, request: &AttachRequest);
}

impl<F> DebuggerAttach for F
where
    F: FnMut(&AttachRequest) + Send,
{
    fn attach(&mut self, request: &AttachRequest) {
        self(request);
    }
}

/// Watches diagnostic lines for the listening banner.
pub struct DebugHandshake<'a> {
    attach: &'a mut dyn DebuggerAttach,
    runner_root: PathBuf,
    fired: bool,
}

impl<'a> DebugHandshake<'a> {
    pub fn new(attach: &'a mut dyn DebuggerAttach, runner_root: &Path) -> Self {
        Self {
            attach,
            runner_root: runner_root.to_path_buf(),
            fired: false,
        }
    }

    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Feed one line. Returns `true` for the banner line itself.
    pub fn observe(&mut self, line: &str) -> bool {
        if self.fired {
            return false;
        }
        let Some(address) = line.strip_prefix(DEBUGGER_LISTENING_PREFIX) else {
            return false;
        };
        self.fired = true;
        if address.is_empty() {
            return true;
        }
        let request = AttachRequest::new(address, &self.runner_root);
        info!(address, "debugger endpoint ready; attaching");
        self.attach.attach(&request);
        true
    }
}

impl std::fmt::Debug for DebugHandshake<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugHandshake")
            .field("runner_root", &self.runner_root)
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}
