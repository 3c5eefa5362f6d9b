//! Tree Node
//!
//! In-memory view of one row of the node table. Storage is the only durable
//! owner; a `TreeNode` is a snapshot that the service refreshes after every
//! mutation it performs on it.
//!
//! # Examples
//!
//! ```rust
//! use mptree_core::models::TreeNode;
//! use serde_json::json;
//!
//! let home = TreeNode::new("home", "001", 1, 2, json!({"title": "Home"}));
//! let about = TreeNode::new("about", "001002", 2, 0, json!({"title": "About"}));
//!
//! assert!(home.is_root());
//! assert!(about.is_leaf());
//! assert!(about.is_child_of(&home));
//! assert!(about.is_descendant_of(&home));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Payload stored in the JSON `data` column
///
/// Implemented for every serializable type; the service is generic over it.
pub trait NodeData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> NodeData for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A node together with its position in the tree
///
/// # Fields
///
/// - `id`: Stable identifier (UUID v4 unless supplied on load)
/// - `path`: Materialized path, `depth * steplen` characters
/// - `depth`: Number of steps in `path`; roots have depth 1
/// - `numchild`: Cached number of direct children
/// - `data`: Caller-defined payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode<T> {
    pub id: String,
    pub path: String,
    pub depth: usize,
    pub numchild: usize,
    pub data: T,

    /// Parent fetched by `get_parent`, reused until invalidated
    #[serde(skip)]
    cached_parent: Option<Box<TreeNode<T>>>,
}

impl<T> TreeNode<T> {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        depth: usize,
        numchild: usize,
        data: T,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            depth,
            numchild,
            data,
            cached_parent: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.depth == 1
    }

    pub fn is_leaf(&self) -> bool {
        self.numchild == 0
    }

    /// Path of the parent (empty for roots)
    pub fn parent_path(&self) -> &str {
        if self.depth <= 1 {
            return "";
        }
        let steplen = self.path.len() / self.depth;
        self.path
            .get(..self.path.len().saturating_sub(steplen))
            .unwrap_or("")
    }

    /// Same parent (all roots are siblings of each other)
    pub fn is_sibling_of(&self, other: &TreeNode<T>) -> bool {
        self.depth == other.depth && self.parent_path() == other.parent_path()
    }

    pub fn is_child_of(&self, parent: &TreeNode<T>) -> bool {
        self.depth == parent.depth + 1 && self.path.starts_with(&parent.path)
    }

    /// Strictly below `ancestor`
    pub fn is_descendant_of(&self, ancestor: &TreeNode<T>) -> bool {
        self.depth > ancestor.depth && self.path.starts_with(&ancestor.path)
    }

    pub fn cached_parent(&self) -> Option<&TreeNode<T>> {
        self.cached_parent.as_deref()
    }

    pub(crate) fn set_cached_parent(&mut self, parent: Option<TreeNode<T>>) {
        self.cached_parent = parent.map(Box::new);
    }

    /// Drop the cached parent so the next `get_parent` reads storage
    pub fn invalidate_parent(&mut self) {
        self.cached_parent = None;
    }
}

impl<T: PartialEq> PartialEq for TreeNode<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.path == other.path
            && self.depth == other.depth
            && self.numchild == other.numchild
            && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, path: &str, numchild: usize) -> TreeNode<&'static str> {
        TreeNode::new(id, path, path.len() / 3, numchild, "payload")
    }

    #[test]
    fn test_relationship_predicates() {
        let root = node("root", "001", 2);
        let a = node("a", "001001", 1);
        let a1 = node("a1", "001001001", 0);
        let b = node("b", "001002", 0);
        let other_root = node("other", "002", 0);

        assert!(root.is_root());
        assert!(!a.is_root());
        assert!(a1.is_leaf());

        assert!(a.is_sibling_of(&b));
        assert!(root.is_sibling_of(&other_root));
        assert!(!a.is_sibling_of(&a1));

        assert!(a.is_child_of(&root));
        assert!(!a1.is_child_of(&root));
        assert!(a1.is_descendant_of(&root));
        assert!(!root.is_descendant_of(&root));
        assert!(!b.is_descendant_of(&a));
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(node("a1", "001001001", 0).parent_path(), "001001");
        assert_eq!(node("root", "001", 0).parent_path(), "");
    }

    #[test]
    fn test_cached_parent_is_not_serialized_or_compared() {
        let mut child = node("a", "001001", 0);
        child.set_cached_parent(Some(node("root", "001", 1)));
        assert_eq!(child.cached_parent().map(|p| p.id.as_str()), Some("root"));

        let json = serde_json::to_value(&child).unwrap();
        assert!(json.get("cached_parent").is_none());
        assert_eq!(child, node("a", "001001", 0));

        child.invalidate_parent();
        assert!(child.cached_parent().is_none());
    }
}
