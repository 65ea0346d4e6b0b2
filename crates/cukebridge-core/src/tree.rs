//! Host test hierarchy.
//!
//! The host builds this tree from feature files before a run starts. Node ids
//! follow the convention `<document-id>/<zero-based line>` for scenarios and
//! `<scenario-id>/<zero-based line>` for steps, which is what the resolver
//! computes from the runner's messages. The tree passed to a run contains
//! only the selected nodes; anything filtered out simply fails to resolve.

use std::path::PathBuf;

use cukebridge_error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Absolute path of the file the node was built from.
    #[serde(default)]
    pub uri: Option<PathBuf>,
    /// Zero-based start line.
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub children: Vec<TestNode>,
}

impl TestNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            uri: None,
            line: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, uri: impl Into<PathBuf>, line: u32) -> Self {
        self.uri = Some(uri.into());
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Direct child with the given id.
    #[must_use]
    pub fn child(&self, id: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.id == id)
    }

    /// Runner selection argument: `<absolute-file-path>:<one-based-line>`.
    #[must_use]
    pub fn selection_argument(&self) -> Option<String> {
        let uri = self.uri.as_ref()?;
        let line = self.line?;
        Some(format!("{}:{}", uri.display(), line.saturating_add(1)))
    }
}

/// The nodes selected for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTree {
    pub roots: Vec<TestNode>,
}

impl TestTree {
    #[must_use]
    pub fn new(roots: Vec<TestNode>) -> Self {
        Self { roots }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| BridgeError::Tree {
            detail: err.to_string(),
        })
    }

    /// Depth-first search over the whole tree.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&TestNode> {
        self.iter().find(|node| node.id == id)
    }

    /// Pre-order traversal: each node, then its children.
    pub fn iter(&self) -> impl Iterator<Item = &TestNode> {
        let mut stack: Vec<&TestNode> = self.roots.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestTree {
        TestTree::new(vec![
            TestNode::new("features/a.feature")
                .with_child(
                    TestNode::new("features/a.feature/2")
                        .with_child(TestNode::new("features/a.feature/2/3"))
                        .with_child(TestNode::new("features/a.feature/2/4")),
                )
                .with_child(TestNode::new("features/a.feature/7")),
            TestNode::new("features/b.feature"),
        ])
    }

    #[test]
    fn iter_is_pre_order() {
        let tree = sample();
        let ids: Vec<&str> = tree.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "features/a.feature",
                "features/a.feature/2",
                "features/a.feature/2/3",
                "features/a.feature/2/4",
                "features/a.feature/7",
                "features/b.feature",
            ]
        );
    }

    #[test]
    fn find_searches_nested_nodes() {
        let tree = sample();
        assert!(tree.find("features/a.feature/2/4").is_some());
        assert!(tree.find("features/a.feature/9").is_none());
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn selection_argument_uses_one_based_line() {
        let node = TestNode::new("x").with_source("/work/features/a.feature", 2);
        assert_eq!(
            node.selection_argument().as_deref(),
            Some("/work/features/a.feature:3")
        );
        assert_eq!(TestNode::new("y").selection_argument(), None);
    }

    #[test]
    fn from_json_reports_tree_errors() {
        let tree = TestTree::from_json(r#"{"roots":[{"id":"a","children":[{"id":"a/1"}]}]}"#)
            .unwrap();
        assert_eq!(tree.find("a/1").map(|node| node.label.as_str()), Some(""));

        let err = TestTree::from_json("[]").unwrap_err();
        assert!(matches!(err, BridgeError::Tree { .. }));
    }
}
