//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Row-level access to the node table
//! - Backend-specific spelling of the bulk tree statements
//!
//! # Architecture
//!
//! One table holds the whole forest. Each row carries its materialized
//! `path` (unique), the derived `depth`, a cached `numchild` and a JSON
//! payload. Subtrees are addressed by path prefix, so moving or deleting a
//! branch is a single set-based statement.

mod database;
pub mod dialect;
mod error;
mod tree_table;

pub use database::DatabaseService;
pub use dialect::{SqlDialect, SqlParam, SqlStatement};
pub use error::DatabaseError;
pub use tree_table::{CountedRow, NodeRow, TreeTable};
