//! How the runner process is started.
//!
//! ```text
//! node [--inspect-brk=<port>] <runner-script> <file>:<line>... --format message [--profile <name>]
//! ```
//!
//! One selection argument is passed per selected top-level node. The process
//! runs in the configured working directory with the merged environment.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};

use cukebridge_core::{RunContext, TestTree};
use tracing::warn;

use crate::config::RunnerSettings;

pub const MESSAGE_FORMAT_ARGS: [&str; 2] = ["--format", "message"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub runner_root: PathBuf,
    pub working_directory: PathBuf,
    pub env: BTreeMap<OsString, OsString>,
}

impl Invocation {
    pub fn build<I>(
        settings: &RunnerSettings,
        workspace_root: &Path,
        tree: &TestTree,
        debug: bool,
        inherited_env: I,
    ) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut args = Vec::new();
        if debug {
            args.push(format!("--inspect-brk={}", settings.debug_port()));
        }
        args.push(
            settings
                .runner_script_path(workspace_root)
                .to_string_lossy()
                .into_owned(),
        );
        args.extend(selection_arguments(tree));
        args.extend(MESSAGE_FORMAT_ARGS.iter().map(|arg| (*arg).to_owned()));
        args.extend(settings.profile_options());

        Self {
            program: settings.node_program().to_owned(),
            args,
            runner_root: settings.runner_root(workspace_root),
            working_directory: settings.working_directory(workspace_root),
            env: settings.merge_environment(inherited_env),
        }
    }

    /// Context the correlator needs to map runner uris onto tree ids.
    #[must_use]
    pub fn run_context(&self, workspace_root: &Path) -> RunContext {
        RunContext::for_directories(
            &normalize_drive_letter(workspace_root),
            &self.working_directory,
        )
    }

    /// The process command with both output streams piped.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_directory)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `<absolute-file-path>:<one-based-line>` for every top-level node.
#[must_use]
pub fn selection_arguments(tree: &TestTree) -> Vec<String> {
    tree.roots
        .iter()
        .filter_map(|node| {
            let argument = node.selection_argument();
            if argument.is_none() {
                warn!(node = %node.id, "selected node has no source position; not passed to runner");
            }
            argument
        })
        .map(|argument| capitalize_drive_letter_if_windows(&argument))
        .collect()
}

/// Upper-case a Windows drive letter so paths compare equal to the ones the
/// runner reports.
#[must_use]
pub fn normalize_drive_letter(path: &Path) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(capitalize_drive_letter(&path.to_string_lossy()))
    } else {
        path.to_path_buf()
    }
}

fn capitalize_drive_letter_if_windows(text: &str) -> String {
    if cfg!(windows) {
        capitalize_drive_letter(text)
    } else {
        text.to_owned()
    }
}

fn capitalize_drive_letter(text: &str) -> String {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_lowercase() && bytes[1] == b':' {
        let mut out = String::with_capacity(text.len());
        out.push(char::from(bytes[0].to_ascii_uppercase()));
        out.push_str(&text[1..]);
        out
    } else {
        text.to_owned()
    }
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use cukebridge_core::TestNode;

    use super::*;

    fn tree() -> TestTree {
        TestTree::new(vec![
            TestNode::new("features/a.feature").with_source("/work/features/a.feature", 0),
            TestNode::new("features/b.feature/4").with_source("/work/features/b.feature", 4),
            TestNode::new("virtual"),
        ])
    }

    #[test]
    fn arguments_follow_the_runner_contract() {
        let settings = RunnerSettings::from_json(r#"{"profile":"ci"}"#).unwrap();
        let invocation = Invocation::build(&settings, Path::new("/work"), &tree(), false, std::iter::empty());
        assert_eq!(invocation.program, "node");
        assert_eq!(
            invocation.args,
            vec![
                "/work/node_modules/@cucumber/cucumber/bin/cucumber.js",
                "/work/features/a.feature:1",
                "/work/features/b.feature:5",
                "--format",
                "message",
                "--profile",
                "ci",
            ]
        );
        assert_eq!(invocation.working_directory, PathBuf::from("/work"));
    }

    #[test]
    fn debug_puts_inspector_flag_first() {
        let settings = RunnerSettings::from_json(r#"{"debugPort":9400}"#).unwrap();
        let invocation = Invocation::build(&settings, Path::new("/work"), &tree(), true, std::iter::empty());
        assert_eq!(invocation.args[0], "--inspect-brk=9400");
        assert!(invocation.command_line().starts_with("node --inspect-brk=9400 "));
    }

    #[test]
    fn run_context_prefix_comes_from_working_directory() {
        let settings = RunnerSettings::from_json(
            r#"{"rootDirectory":"packages/web","workingDirectory":"e2e"}"#,
        )
        .unwrap();
        let invocation = Invocation::build(&settings, Path::new("/work"), &tree(), false, std::iter::empty());
        let context = invocation.run_context(Path::new("/work"));
        assert_eq!(context.uri_prefix, "packages/web/e2e/");
        assert_eq!(context.workspace_root, PathBuf::from("/work"));
        assert_eq!(invocation.runner_root, PathBuf::from("/work/packages/web"));
    }

    #[test]
    fn drive_letter_is_upper_cased() {
        assert_eq!(capitalize_drive_letter("c:\\src\\a.feature:3"), "C:\\src\\a.feature:3");
        assert_eq!(capitalize_drive_letter("C:/src"), "C:/src");
        assert_eq!(capitalize_drive_letter("/src/c:"), "/src/c:");
        assert_eq!(capitalize_drive_letter(""), "");
    }

    #[test]
    fn normalize_path_is_lexical() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
