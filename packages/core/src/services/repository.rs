//! Tree Repository Abstraction
//!
//! The contract the application layer programs against. [`TreeService`] is
//! the libsql-backed implementation; tests and alternative backends can
//! provide their own.

use crate::models::{DumpedNode, FixTreeReport, NodeData, Position, TreeNode, TreeProblems};
use crate::operations::TreeError;
use crate::services::TreeService;
use async_trait::async_trait;

/// Insert, move, query and repair operations over a tree of `T` payloads
#[async_trait]
pub trait TreeRepository<T: NodeData>: Send + Sync {
    async fn add_root(&self, data: T) -> Result<TreeNode<T>, TreeError>;

    async fn add_child(&self, parent: &mut TreeNode<T>, data: T) -> Result<TreeNode<T>, TreeError>;

    async fn add_sibling(
        &self,
        reference: &TreeNode<T>,
        position: Option<Position>,
        data: T,
    ) -> Result<TreeNode<T>, TreeError>;

    async fn move_node(
        &self,
        node: &mut TreeNode<T>,
        target: &TreeNode<T>,
        position: Option<Position>,
    ) -> Result<(), TreeError>;

    async fn delete(&self, node: &TreeNode<T>) -> Result<u64, TreeError>;

    async fn get_children(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError>;

    /// DFS pre-order
    async fn get_descendants(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError>;

    /// Root first
    async fn get_ancestors(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError>;

    async fn dump_tree(
        &self,
        parent: Option<&TreeNode<T>>,
        keep_ids: bool,
    ) -> Result<Vec<DumpedNode<T>>, TreeError>;

    async fn load_tree(
        &self,
        nodes: Vec<DumpedNode<T>>,
        parent: Option<&TreeNode<T>>,
        keep_ids: bool,
    ) -> Result<Vec<String>, TreeError>;

    async fn find_problems(&self) -> Result<TreeProblems, TreeError>;

    async fn fix_tree(&self, destructive: bool) -> Result<FixTreeReport, TreeError>;
}

#[async_trait]
impl<T: NodeData> TreeRepository<T> for TreeService<T> {
    async fn add_root(&self, data: T) -> Result<TreeNode<T>, TreeError> {
        TreeService::add_root(self, data).await
    }

    async fn add_child(&self, parent: &mut TreeNode<T>, data: T) -> Result<TreeNode<T>, TreeError> {
        TreeService::add_child(self, parent, data).await
    }

    async fn add_sibling(
        &self,
        reference: &TreeNode<T>,
        position: Option<Position>,
        data: T,
    ) -> Result<TreeNode<T>, TreeError> {
        TreeService::add_sibling(self, reference, position, data).await
    }

    async fn move_node(
        &self,
        node: &mut TreeNode<T>,
        target: &TreeNode<T>,
        position: Option<Position>,
    ) -> Result<(), TreeError> {
        TreeService::move_node(self, node, target, position).await
    }

    async fn delete(&self, node: &TreeNode<T>) -> Result<u64, TreeError> {
        TreeService::delete(self, node).await
    }

    async fn get_children(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError> {
        TreeService::get_children(self, node).await
    }

    async fn get_descendants(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError> {
        TreeService::get_descendants(self, node).await
    }

    async fn get_ancestors(&self, node: &TreeNode<T>) -> Result<Vec<TreeNode<T>>, TreeError> {
        TreeService::get_ancestors(self, node).await
    }

    async fn dump_tree(
        &self,
        parent: Option<&TreeNode<T>>,
        keep_ids: bool,
    ) -> Result<Vec<DumpedNode<T>>, TreeError> {
        TreeService::dump_tree(self, parent, keep_ids).await
    }

    async fn load_tree(
        &self,
        nodes: Vec<DumpedNode<T>>,
        parent: Option<&TreeNode<T>>,
        keep_ids: bool,
    ) -> Result<Vec<String>, TreeError> {
        TreeService::load_tree(self, nodes, parent, keep_ids).await
    }

    async fn find_problems(&self) -> Result<TreeProblems, TreeError> {
        TreeService::find_problems(self).await
    }

    async fn fix_tree(&self, destructive: bool) -> Result<FixTreeReport, TreeError> {
        TreeService::fix_tree(self, destructive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn build_outline(repo: Arc<dyn TreeRepository<Value>>) -> Vec<String> {
        let mut root = repo.add_root(json!("root")).await.unwrap();
        let first = repo.add_child(&mut root, json!("first")).await.unwrap();
        repo.add_sibling(&first, None, json!("second"))
            .await
            .unwrap();

        repo.get_descendants(&root)
            .await
            .unwrap()
            .into_iter()
            .map(|node| node.path)
            .collect()
    }

    #[tokio::test]
    async fn test_service_behind_trait_object() {
        let temp_dir = TempDir::new().unwrap();
        let config = TreeConfig::default().with_layout(3, "0123456789");
        let service: TreeService<Value> =
            TreeService::open(temp_dir.path().join("test.db"), &config)
                .await
                .unwrap();

        let paths = build_outline(Arc::new(service)).await;
        assert_eq!(paths, vec!["001001", "001002"]);
    }
}
