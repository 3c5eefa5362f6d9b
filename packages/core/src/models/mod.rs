//! Data Models
//!
//! This module contains the data structures exchanged with the tree service:
//!
//! - `TreeNode` - one node with its path, depth and child count
//! - `Position` - placement for inserts and moves
//! - `DumpedNode` - nested export form
//! - `TreeProblems` / `FixTreeReport` - consistency check and repair results
//!
//! Payloads are stored as JSON in the `data` column of the node table.

mod maintenance;
mod position;
mod tree_node;

pub use maintenance::{DumpedNode, FixTreeOptions, FixTreeReport, TreeProblems};
pub use position::Position;
pub use tree_node::{NodeData, TreeNode};
