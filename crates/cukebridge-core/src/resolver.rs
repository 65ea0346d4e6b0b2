//! Hierarchy resolver: walks the id chain from a runtime reference back to
//! the host node it represents.
//!
//! Two walks exist because failures arrive in two shapes:
//!
//! ```text
//!  content step: started ─► test case ─► pickle ─► test step ─► pickle step
//!                ─► static step ─► scenario node + step node
//!  hook step:    started ─► test case ─► pickle ─► test step ─► hook
//!                ─► scenario node
//! ```
//!
//! Every hop can miss. A miss is reported as a [`ResolveMiss`] naming the hop,
//! so callers can log it and drop the event.

use std::fmt;

use cukebridge_messages::{Hook, Pickle, TestCase};

use crate::index::IdentityIndex;
use crate::registry::{Document, DocumentRegistry, ScenarioNode, StaticStep};
use crate::tree::{TestNode, TestTree};

/// The hop at which a resolution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMiss {
    UnknownTestCaseStarted,
    UnknownPickle,
    UnknownTestStep,
    /// The test step is a hook, or otherwise has no pickle step.
    NotAContentStep,
    UnknownPickleStep,
    PickleStepWithoutSource,
    UnknownDocument,
    /// The static step belongs to a background, which has no host node.
    BackgroundStep,
    /// No scenario or background of the document owns the static step.
    StepOutsideScenario,
    NotAHookStep,
    UnknownHook,
    PickleWithoutSource,
    UnknownScenario,
    /// The computed node is not in the host tree (filtered out of the run).
    ScenarioNodeNotSelected,
    StepNodeNotSelected,
}

impl ResolveMiss {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UnknownTestCaseStarted => "unknown_test_case_started",
            Self::UnknownPickle => "unknown_pickle",
            Self::UnknownTestStep => "unknown_test_step",
            Self::NotAContentStep => "not_a_content_step",
            Self::UnknownPickleStep => "unknown_pickle_step",
            Self::PickleStepWithoutSource => "pickle_step_without_source",
            Self::UnknownDocument => "unknown_document",
            Self::BackgroundStep => "background_step",
            Self::StepOutsideScenario => "step_outside_scenario",
            Self::NotAHookStep => "not_a_hook_step",
            Self::UnknownHook => "unknown_hook",
            Self::PickleWithoutSource => "pickle_without_source",
            Self::UnknownScenario => "unknown_scenario",
            Self::ScenarioNodeNotSelected => "scenario_node_not_selected",
            Self::StepNodeNotSelected => "step_node_not_selected",
        }
    }
}

impl fmt::Display for ResolveMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type Resolution<T> = std::result::Result<T, ResolveMiss>;

#[derive(Debug, Clone, Copy)]
pub struct StepTarget<'a> {
    pub step_node: &'a TestNode,
    pub scenario_node: &'a TestNode,
    pub test_case: &'a TestCase,
    pub pickle: &'a Pickle,
    pub static_step: &'a StaticStep,
}

#[derive(Debug, Clone, Copy)]
pub struct HookTarget<'a> {
    pub scenario_node: &'a TestNode,
    pub test_case: &'a TestCase,
    pub pickle: &'a Pickle,
    pub hook: &'a Hook,
}

#[derive(Debug, Clone, Copy)]
pub struct ScenarioTarget<'a> {
    pub scenario_node: &'a TestNode,
    pub test_case: &'a TestCase,
    pub pickle: &'a Pickle,
}

#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    index: &'a IdentityIndex,
    registry: &'a DocumentRegistry,
    tree: &'a TestTree,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub const fn new(
        index: &'a IdentityIndex,
        registry: &'a DocumentRegistry,
        tree: &'a TestTree,
    ) -> Self {
        Self {
            index,
            registry,
            tree,
        }
    }

    /// Resolve a content step to its host step node and scenario node.
    pub fn content_step(
        &self,
        test_step_id: &str,
        test_case_started_id: &str,
    ) -> Resolution<StepTarget<'a>> {
        let (test_case, pickle) = self.attempt(test_case_started_id)?;
        let test_step = test_case
            .step(test_step_id)
            .ok_or(ResolveMiss::UnknownTestStep)?;
        let pickle_step_id = test_step
            .pickle_step_id
            .as_deref()
            .ok_or(ResolveMiss::NotAContentStep)?;
        let pickle_step = pickle
            .steps
            .iter()
            .find(|step| step.id == pickle_step_id)
            .ok_or(ResolveMiss::UnknownPickleStep)?;
        let static_step_id = pickle_step
            .ast_node_ids
            .first()
            .ok_or(ResolveMiss::PickleStepWithoutSource)?;

        let document = self.document(pickle)?;
        let (scenario, static_step) = document
            .scenario_containing_step(static_step_id)
            .ok_or_else(|| {
                if document.is_background_step(static_step_id) {
                    ResolveMiss::BackgroundStep
                } else {
                    ResolveMiss::StepOutsideScenario
                }
            })?;

        let scenario_node_id = scenario.node_id(&document.id);
        let step_node_id = static_step.node_id(&scenario_node_id);
        let scenario_node = self
            .tree
            .find(&scenario_node_id)
            .ok_or(ResolveMiss::ScenarioNodeNotSelected)?;
        let step_node = scenario_node
            .child(&step_node_id)
            .ok_or(ResolveMiss::StepNodeNotSelected)?;

        Ok(StepTarget {
            step_node,
            scenario_node,
            test_case,
            pickle,
            static_step,
        })
    }

    /// Resolve a hook step to the scenario it ran for.
    pub fn hook_step(
        &self,
        test_step_id: &str,
        test_case_started_id: &str,
    ) -> Resolution<HookTarget<'a>> {
        let (test_case, pickle) = self.attempt(test_case_started_id)?;
        let test_step = test_case
            .step(test_step_id)
            .ok_or(ResolveMiss::UnknownTestStep)?;
        let hook_id = test_step
            .hook_id
            .as_deref()
            .ok_or(ResolveMiss::NotAHookStep)?;
        let hook = self.index.hook(hook_id).ok_or(ResolveMiss::UnknownHook)?;
        let (_, scenario_node) = self.scenario_of(pickle)?;

        Ok(HookTarget {
            scenario_node,
            test_case,
            pickle,
            hook,
        })
    }

    /// Resolve a test-case attempt to its scenario node.
    pub fn scenario(&self, test_case_started_id: &str) -> Resolution<ScenarioTarget<'a>> {
        let (test_case, pickle) = self.attempt(test_case_started_id)?;
        let (_, scenario_node) = self.scenario_of(pickle)?;
        Ok(ScenarioTarget {
            scenario_node,
            test_case,
            pickle,
        })
    }

    fn attempt(&self, test_case_started_id: &str) -> Resolution<(&'a TestCase, &'a Pickle)> {
        let test_case = self
            .index
            .test_case_for_started(test_case_started_id)
            .ok_or(ResolveMiss::UnknownTestCaseStarted)?;
        let pickle = self
            .index
            .pickle(&test_case.pickle_id)
            .ok_or(ResolveMiss::UnknownPickle)?;
        Ok((test_case, pickle))
    }

    fn document(&self, pickle: &Pickle) -> Resolution<&'a Document> {
        self.registry
            .lookup_uri(&pickle.uri)
            .ok_or(ResolveMiss::UnknownDocument)
    }

    /// The pickle's first source id names its scenario.
    fn scenario_of(&self, pickle: &Pickle) -> Resolution<(&'a ScenarioNode, &'a TestNode)> {
        let document = self.document(pickle)?;
        let scenario_id = pickle
            .ast_node_ids
            .first()
            .ok_or(ResolveMiss::PickleWithoutSource)?;
        let scenario = document
            .scenario(scenario_id)
            .ok_or(ResolveMiss::UnknownScenario)?;
        let scenario_node = self
            .tree
            .find(&scenario.node_id(&document.id))
            .ok_or(ResolveMiss::ScenarioNodeNotSelected)?;
        Ok((scenario, scenario_node))
    }
}
