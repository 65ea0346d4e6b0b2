//! Document registry: the static hierarchy of every feature file in a run.
//!
//! Documents are keyed by the run prefix (the runner's working directory
//! relative to the workspace root) followed by the document uri with forward
//! slashes. That key is also the host's document node id, so scenario and
//! step node ids can be derived from it directly.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use cukebridge_messages::{Background, Feature, Scenario, Step, StepKeywordType};
use tracing::{debug, warn};

/// A step as written in the feature file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticStep {
    pub id: String,
    /// One-based.
    pub line: u32,
    pub column: u32,
    pub keyword: String,
    pub keyword_type: StepKeywordType,
    pub text: String,
}

impl StaticStep {
    fn from_message(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            line: step.location.line,
            column: step.location.column.unwrap_or(0),
            keyword: step.keyword.clone(),
            keyword_type: step.keyword_type,
            text: step.text.clone(),
        }
    }

    /// Host node id: `<scenario-node-id>/<zero-based line>`.
    #[must_use]
    pub fn node_id(&self, scenario_node_id: &str) -> String {
        format!("{scenario_node_id}/{}", self.line.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioNode {
    pub id: String,
    /// One-based.
    pub line: u32,
    pub name: String,
    pub steps: Vec<StaticStep>,
}

impl ScenarioNode {
    fn from_message(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id.clone(),
            line: scenario.location.line,
            name: scenario.name.clone(),
            steps: scenario.steps.iter().map(StaticStep::from_message).collect(),
        }
    }

    /// Host node id: `<document-id>/<zero-based line>`.
    #[must_use]
    pub fn node_id(&self, document_id: &str) -> String {
        format!("{document_id}/{}", self.line.saturating_sub(1))
    }

    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<&StaticStep> {
        self.steps.iter().find(|step| step.id == step_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Registry key, also the host's document node id.
    pub id: String,
    pub feature_name: String,
    /// Scenarios in file order; scenarios nested in rules are flattened in.
    pub scenarios: Vec<ScenarioNode>,
    /// Background step ids. They have no host node.
    pub background_step_ids: Vec<String>,
    pub test_case_ids: Vec<String>,
    pub step_definition_ids: Vec<String>,
}

impl Document {
    fn from_feature(id: String, feature: Option<&Feature>) -> Self {
        let mut document = Self {
            id,
            feature_name: String::new(),
            scenarios: Vec::new(),
            background_step_ids: Vec::new(),
            test_case_ids: Vec::new(),
            step_definition_ids: Vec::new(),
        };
        let Some(feature) = feature else {
            return document;
        };

        document.feature_name.clone_from(&feature.name);
        for child in &feature.children {
            document.absorb(child.scenario.as_ref(), child.background.as_ref());
            if let Some(rule) = &child.rule {
                for rule_child in &rule.children {
                    document.absorb(rule_child.scenario.as_ref(), rule_child.background.as_ref());
                }
            }
        }
        document
    }

    fn absorb(&mut self, scenario: Option<&Scenario>, background: Option<&Background>) {
        if let Some(scenario) = scenario {
            self.scenarios.push(ScenarioNode::from_message(scenario));
        }
        if let Some(background) = background {
            self.background_step_ids
                .extend(background.steps.iter().map(|step| step.id.clone()));
        }
    }

    #[must_use]
    pub fn scenario(&self, scenario_id: &str) -> Option<&ScenarioNode> {
        self.scenarios
            .iter()
            .find(|scenario| scenario.id == scenario_id)
    }

    /// The scenario owning `step_id`, and the step itself.
    #[must_use]
    pub fn scenario_containing_step(&self, step_id: &str) -> Option<(&ScenarioNode, &StaticStep)> {
        self.scenarios
            .iter()
            .find_map(|scenario| scenario.step(step_id).map(|step| (scenario, step)))
    }

    #[must_use]
    pub fn is_background_step(&self, step_id: &str) -> bool {
        self.background_step_ids.iter().any(|id| id == step_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentRegistry {
    prefix: String,
    documents: HashMap<String, Document>,
}

impl DocumentRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            documents: HashMap::new(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Registry key for a uri as the runner reports it.
    #[must_use]
    pub fn key_for(&self, uri: &str) -> String {
        format!("{}{}", self.prefix, normalize_uri(uri))
    }

    /// Record the static hierarchy for `uri`. A second document for the same
    /// key replaces the first.
    pub fn register(&mut self, uri: &str, feature: Option<&Feature>) -> &Document {
        let key = self.key_for(uri);
        let document = Document::from_feature(key.clone(), feature);
        debug!(
            document = %key,
            scenarios = document.scenarios.len(),
            "registered document"
        );
        if self.documents.contains_key(&key) {
            warn!(document = %key, "document registered twice in one run; replacing");
        }
        self.documents.insert(key.clone(), document);
        &self.documents[&key]
    }

    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&Document> {
        self.documents.get(key)
    }

    /// Look up by the uri as the runner reports it.
    #[must_use]
    pub fn lookup_uri(&self, uri: &str) -> Option<&Document> {
        self.documents.get(&self.key_for(uri))
    }

    pub fn record_test_case(&mut self, uri: &str, test_case_id: &str) -> bool {
        let key = self.key_for(uri);
        self.documents.get_mut(&key).is_some_and(|document| {
            document.test_case_ids.push(test_case_id.to_owned());
            true
        })
    }

    pub fn record_step_definition(&mut self, uri: &str, step_definition_id: &str) -> bool {
        let key = self.key_for(uri);
        self.documents.get_mut(&key).is_some_and(|document| {
            document
                .step_definition_ids
                .push(step_definition_id.to_owned());
            true
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Replace Windows separators with forward slashes.
#[must_use]
pub fn normalize_uri(uri: &str) -> String {
    uri.replace('\\', "/")
}

/// Prefix that turns runner-relative uris into workspace-relative ids:
/// the working directory relative to the workspace root, forward slashes,
/// with a trailing `/` unless empty.
#[must_use]
pub fn run_prefix(workspace_root: &Path, working_directory: &Path) -> String {
    let relative = relative_path(workspace_root, working_directory);
    let mut prefix = normalize_uri(&relative.to_string_lossy());
    if !prefix.is_empty() && !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    let to: Vec<Component<'_>> = to
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();

    let common = from
        .iter()
        .zip(&to)
        .take_while(|(left, right)| left == right)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    relative
}
