//! Identity index: protocol ids to the runtime objects they name.
//!
//! Ids are unique per run by protocol contract. A repeated id replaces the
//! earlier value; that is accepted producer behavior, not an error.

use std::collections::HashMap;

use cukebridge_messages::{Hook, Pickle, TestCase};

#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    pickles: HashMap<String, Pickle>,
    hooks: HashMap<String, Hook>,
    test_cases: HashMap<String, TestCase>,
    /// test-case-started id to test-case id. Retries map several started ids
    /// onto one test case.
    started: HashMap<String, String>,
}

impl IdentityIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pickle(&mut self, pickle: Pickle) {
        self.pickles.insert(pickle.id.clone(), pickle);
    }

    pub fn insert_hook(&mut self, hook: Hook) {
        self.hooks.insert(hook.id.clone(), hook);
    }

    pub fn insert_test_case(&mut self, test_case: TestCase) {
        self.test_cases.insert(test_case.id.clone(), test_case);
    }

    pub fn insert_started(&mut self, started_id: &str, test_case_id: &str) {
        self.started
            .insert(started_id.to_owned(), test_case_id.to_owned());
    }

    #[must_use]
    pub fn pickle(&self, id: &str) -> Option<&Pickle> {
        self.pickles.get(id)
    }

    #[must_use]
    pub fn hook(&self, id: &str) -> Option<&Hook> {
        self.hooks.get(id)
    }

    #[must_use]
    pub fn test_case(&self, id: &str) -> Option<&TestCase> {
        self.test_cases.get(id)
    }

    #[must_use]
    pub fn test_case_for_started(&self, started_id: &str) -> Option<&TestCase> {
        self.started
            .get(started_id)
            .and_then(|test_case_id| self.test_cases.get(test_case_id))
    }

    #[must_use]
    pub fn pickle_count(&self) -> usize {
        self.pickles.len()
    }

    #[must_use]
    pub fn test_case_count(&self) -> usize {
        self.test_cases.len()
    }

    #[must_use]
    pub fn started_count(&self) -> usize {
        self.started.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pickles.is_empty()
            && self.hooks.is_empty()
            && self.test_cases.is_empty()
            && self.started.is_empty()
    }
}
