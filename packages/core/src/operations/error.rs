//! Error types for tree operations
//!
//! Every public tree operation returns [`TreeError`]. Storage failures are
//! wrapped, path arithmetic failures are lifted into the tree-level variants,
//! and a `path` uniqueness violation becomes [`TreeError::PathConflict`] so
//! callers can tell a concurrent writer apart from a hard failure.
//!
//! # Examples
//!
//! ```rust
//! use mptree_core::operations::TreeError;
//!
//! let err = TreeError::node_not_found("node-123");
//! assert!(!err.is_retryable());
//!
//! let err = TreeError::path_conflict("UNIQUE constraint failed: tree_nodes.path");
//! assert!(err.is_retryable());
//! ```

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::path::PathError;
use thiserror::Error;

/// Errors that can occur during tree operations
#[derive(Error, Debug)]
pub enum TreeError {
    /// Positional capacity exhausted
    ///
    /// Permanent until `steplen` or the alphabet is enlarged; retrying the
    /// same operation cannot succeed.
    #[error("Path overflow: no room for a node at or after '{path}'")]
    PathOverflow { path: String },

    /// The move target lies inside the subtree being moved
    #[error("Cannot move node '{node_id}' into its own subtree (target '{target_id}')")]
    InvalidMoveToDescendant { node_id: String, target_id: String },

    /// Referenced node does not exist
    ///
    /// Either the id never existed or a concurrent writer removed it.
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: String },

    /// Position name or position kind not valid for this operation
    #[error("Invalid position '{position}': {reason}")]
    InvalidPosition { position: String, reason: String },

    /// Sorted placement requested without a configured comparator
    #[error("Position '{position}' requires a node ordering to be configured")]
    MissingNodeOrderBy { position: String },

    /// A write collided with an existing path
    ///
    /// Raised when another writer changed the same sibling list between
    /// this operation's reads and writes. Re-running the whole mutation
    /// against fresh state is safe.
    #[error("Path conflict: {context}")]
    PathConflict { context: String },

    /// A stored path cannot be interpreted
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    /// Payload could not be encoded to or decoded from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TreeError {
    /// Create a PathOverflow error
    pub fn path_overflow(path: impl Into<String>) -> Self {
        Self::PathOverflow { path: path.into() }
    }

    /// Create an InvalidMoveToDescendant error
    pub fn invalid_move_to_descendant(
        node_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self::InvalidMoveToDescendant {
            node_id: node_id.into(),
            target_id: target_id.into(),
        }
    }

    /// Create a NodeNotFound error
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Create an InvalidPosition error
    pub fn invalid_position(position: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPosition {
            position: position.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingNodeOrderBy error
    pub fn missing_node_order_by(position: impl Into<String>) -> Self {
        Self::MissingNodeOrderBy {
            position: position.into(),
        }
    }

    /// Create a PathConflict error
    pub fn path_conflict(context: impl Into<String>) -> Self {
        Self::PathConflict {
            context: context.into(),
        }
    }

    /// Whether re-running the whole mutation against fresh state may succeed
    ///
    /// Only path conflicts qualify. Capacity and caller errors are
    /// permanent, and a missing node needs the caller to re-read first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PathConflict { .. })
    }
}

impl From<PathError> for TreeError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::PathOverflow { path } => Self::PathOverflow { path },
            PathError::InvalidDigit { .. } => Self::InvalidPath(err.to_string()),
            PathError::InvalidAlphabet { .. } | PathError::InvalidStepLength { .. } => {
                Self::InvalidConfig(ConfigError::InvalidLayout(err))
            }
        }
    }
}

impl From<DatabaseError> for TreeError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation { context } => Self::PathConflict { context },
            other => Self::Database(other),
        }
    }
}
