//! Runner settings.
//!
//! Settings are read from a JSON file whose keys match the host's settings
//! namespace (`rootDirectory`, `workingDirectory`, `profile`, `env`, ...).
//! Every field is optional; an empty object is a valid configuration.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use cukebridge_error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::invocation::{normalize_drive_letter, normalize_path};

pub const DEFAULT_NODE: &str = "node";
pub const DEFAULT_RUNNER_SCRIPT: &str = "node_modules/@cucumber/cucumber/bin/cucumber.js";
pub const DEFAULT_DEBUG_PORT: u16 = 9229;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerSettings {
    /// Runner root, relative to the workspace root.
    pub root_directory: Option<PathBuf>,
    /// Process working directory, relative to the runner root.
    pub working_directory: Option<PathBuf>,
    pub profile: Option<String>,
    /// Overrides merged over the inherited environment. `null` removes the
    /// variable.
    pub env: BTreeMap<String, Value>,
    pub node: Option<String>,
    /// Runner entry point, relative to the runner root.
    pub runner_script: Option<PathBuf>,
    pub debug_port: Option<u16>,
}

impl RunnerSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| BridgeError::Config {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
        let settings = Self::from_json(&text).map_err(|err| BridgeError::Config {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
        debug!(path = %path.display(), overrides = settings.env.len(), "loaded runner settings");
        Ok(settings)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    #[must_use]
    pub fn runner_root(&self, workspace_root: &Path) -> PathBuf {
        let workspace_root = normalize_drive_letter(workspace_root);
        match non_empty(self.root_directory.as_deref()) {
            Some(root) => normalize_path(&workspace_root.join(root)),
            None => workspace_root,
        }
    }

    #[must_use]
    pub fn working_directory(&self, workspace_root: &Path) -> PathBuf {
        let root = self.runner_root(workspace_root);
        match non_empty(self.working_directory.as_deref()) {
            Some(dir) => normalize_path(&root.join(dir)),
            None => root,
        }
    }

    #[must_use]
    pub fn runner_script_path(&self, workspace_root: &Path) -> PathBuf {
        let script = non_empty(self.runner_script.as_deref())
            .unwrap_or_else(|| Path::new(DEFAULT_RUNNER_SCRIPT));
        normalize_path(&self.runner_root(workspace_root).join(script))
    }

    #[must_use]
    pub fn node_program(&self) -> &str {
        self.node
            .as_deref()
            .filter(|node| !node.is_empty())
            .unwrap_or(DEFAULT_NODE)
    }

    #[must_use]
    pub fn debug_port(&self) -> u16 {
        self.debug_port.unwrap_or(DEFAULT_DEBUG_PORT)
    }

    /// `--profile <name>` when a non-empty profile is configured.
    #[must_use]
    pub fn profile_options(&self) -> Vec<String> {
        match self.profile.as_deref() {
            Some(profile) if !profile.is_empty() => vec!["--profile".to_owned(), profile.to_owned()],
            _ => Vec::new(),
        }
    }

    /// Apply the `env` overrides to `inherited`.
    pub fn merge_environment<I>(&self, inherited: I) -> BTreeMap<OsString, OsString>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut env: BTreeMap<OsString, OsString> = inherited.into_iter().collect();
        for (name, value) in &self.env {
            match value {
                Value::Null => {
                    env.remove(&OsString::from(name));
                }
                Value::String(text) => {
                    env.insert(name.into(), text.into());
                }
                other => {
                    env.insert(name.into(), other.to_string().into());
                }
            }
        }
        env
    }
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|path| !path.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(json: &str) -> RunnerSettings {
        RunnerSettings::from_json(json).unwrap()
    }

    #[test]
    fn empty_object_uses_defaults() {
        let settings = settings("{}");
        let workspace = Path::new("/work");
        assert_eq!(settings.runner_root(workspace), PathBuf::from("/work"));
        assert_eq!(settings.working_directory(workspace), PathBuf::from("/work"));
        assert_eq!(
            settings.runner_script_path(workspace),
            PathBuf::from("/work/node_modules/@cucumber/cucumber/bin/cucumber.js")
        );
        assert_eq!(settings.node_program(), "node");
        assert_eq!(settings.debug_port(), 9229);
        assert!(settings.profile_options().is_empty());
    }

    #[test]
    fn directories_nest_and_normalize() {
        let settings = settings(
            r#"{"rootDirectory":"packages/web","workingDirectory":"../web/e2e/."}"#,
        );
        let workspace = Path::new("/work");
        assert_eq!(
            settings.runner_root(workspace),
            PathBuf::from("/work/packages/web")
        );
        assert_eq!(
            settings.working_directory(workspace),
            PathBuf::from("/work/packages/web/e2e")
        );
    }

    #[test]
    fn empty_profile_adds_no_flag() {
        assert!(settings(r#"{"profile":""}"#).profile_options().is_empty());
        assert_eq!(
            settings(r#"{"profile":"ci"}"#).profile_options(),
            vec!["--profile", "ci"]
        );
    }

    #[test]
    fn env_overrides_delete_replace_and_stringify() {
        let settings = settings(r#"{"env":{"DROP":null,"KEEP":"x","PORT":8080,"FLAG":true}}"#);
        let inherited = [
            (OsString::from("DROP"), OsString::from("gone")),
            (OsString::from("KEEP"), OsString::from("old")),
            (OsString::from("PATH"), OsString::from("/bin")),
        ];
        let env = settings.merge_environment(inherited);
        assert!(!env.contains_key(&OsString::from("DROP")));
        assert_eq!(env[&OsString::from("KEEP")], "x");
        assert_eq!(env[&OsString::from("PORT")], "8080");
        assert_eq!(env[&OsString::from("FLAG")], "true");
        assert_eq!(env[&OsString::from("PATH")], "/bin");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let settings = settings(r#"{"featureFiles":["a.feature"],"node":"nodejs"}"#);
        assert_eq!(settings.node_program(), "nodejs");
    }

    #[test]
    fn load_reports_path_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = RunnerSettings::load(&path).unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }), "case=bad_json got {err}");
        assert!(err.to_string().contains("settings.json"));

        let missing = RunnerSettings::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, BridgeError::Config { .. }));
    }

    #[test]
    fn load_reads_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"profile":"smoke","debugPort":9333}"#).unwrap();
        let settings = RunnerSettings::load(&path).unwrap();
        assert_eq!(settings.profile.as_deref(), Some("smoke"));
        assert_eq!(settings.debug_port(), 9333);
    }
}
