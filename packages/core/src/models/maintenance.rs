//! Export and Repair Types
//!
//! - [`DumpedNode`] - nested, storage-free form of a subtree used by
//!   `dump_tree` / `load_tree` and by the destructive repair
//! - [`TreeProblems`] - what `find_problems` reports
//! - [`FixTreeOptions`] / [`FixTreeReport`] - input and outcome of `fix_tree`

use serde::{Deserialize, Serialize};

/// One node of an exported tree
///
/// `id` is only present when the dump was taken with `keep_ids`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpedNode<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DumpedNode<T>>,
}

impl<T> DumpedNode<T> {
    pub fn new(data: T) -> Self {
        Self {
            id: None,
            data,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_children(mut self, children: Vec<DumpedNode<T>>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes in this subtree, itself included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(DumpedNode::count).sum::<usize>()
    }
}

/// Node ids violating each consistency rule
///
/// A path with invalid characters or a length that is not a whole number of
/// steps is only listed under that category; the remaining checks need a
/// well-formed path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeProblems {
    /// Path contains characters outside the alphabet
    pub evil_chars: Vec<String>,
    /// Path length is not a multiple of `steplen`
    pub bad_steplen: Vec<String>,
    /// No row exists at the parent path
    pub orphans: Vec<String>,
    /// `depth` disagrees with the path length
    pub wrong_depth: Vec<String>,
    /// `numchild` disagrees with the number of child rows
    pub wrong_numchild: Vec<String>,
}

impl TreeProblems {
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> usize {
        self.evil_chars.len()
            + self.bad_steplen.len()
            + self.orphans.len()
            + self.wrong_depth.len()
            + self.wrong_numchild.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixTreeOptions {
    /// Rebuild every path from a dump (requires exclusive access)
    pub destructive: bool,
    /// Compact every sibling list to positions 1..n
    pub fix_paths: bool,
}

impl FixTreeOptions {
    pub fn destructive() -> Self {
        Self {
            destructive: true,
            fix_paths: false,
        }
    }

    pub fn with_fix_paths(mut self) -> Self {
        self.fix_paths = true;
        self
    }
}

/// Rows touched by each repair step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixTreeReport {
    pub depths_fixed: u64,
    pub numchild_fixed: u64,
    pub paths_rewritten: u64,
    /// Nodes reinserted by a destructive rebuild
    pub nodes_rebuilt: u64,
}

impl FixTreeReport {
    /// Nothing needed fixing
    pub fn is_clean(&self) -> bool {
        self.depths_fixed == 0
            && self.numchild_fixed == 0
            && self.paths_rewritten == 0
            && self.nodes_rebuilt == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dumped_node_omits_empty_fields() {
        let dump = DumpedNode::new(json!({"title": "Home"}))
            .with_children(vec![DumpedNode::new(json!({"title": "About"})).with_id("about")]);

        let value = serde_json::to_value(&dump).unwrap();
        assert_eq!(
            value,
            json!({
                "data": {"title": "Home"},
                "children": [{"id": "about", "data": {"title": "About"}}]
            })
        );
        assert_eq!(dump.count(), 2);
    }

    #[test]
    fn test_dumped_node_parses_minimal_json() {
        let dump: DumpedNode<serde_json::Value> =
            serde_json::from_str(r#"{"data": {"title": "Home"}}"#).unwrap();
        assert!(dump.id.is_none());
        assert!(dump.children.is_empty());
    }

    #[test]
    fn test_problem_totals() {
        let mut problems = TreeProblems::default();
        assert!(problems.is_empty());

        problems.orphans.push("a".to_string());
        problems.wrong_numchild.push("b".to_string());
        assert_eq!(problems.total(), 2);
    }
}
