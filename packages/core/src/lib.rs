//! MPTree Core - materialized path trees on libsql
//!
//! This crate stores ordered trees in a single SQL table using materialized
//! paths: every node row carries the concatenated, fixed-width positions of
//! its ancestors and itself, so subtree reads are range scans and whole
//! branches move with one set-based update.
//!
//! # Architecture
//!
//! - **Fixed-width base-N steps**: lexicographic path order equals DFS order
//! - **Cached counters**: `depth` and `numchild` live on each row and are
//!   maintained with in-place arithmetic
//! - **libsql/Turso**: Embedded SQLite-compatible database
//! - **Atomic mutations**: every insert, shift and move commits as a unit
//!
//! # Modules
//!
//! - [`path`] - base-N codec and pure path arithmetic
//! - [`models`] - nodes, positions, dump and repair types
//! - [`operations`] - errors, shift planning and conflict retry
//! - [`services`] - the tree service (mutations, reads, consistency)
//! - [`db`] - database layer with libsql integration
//! - [`config`] - table and path layout configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod path;
pub mod services;

// Re-export commonly used types
pub use config::{ConfigError, TreeConfig};
pub use models::*;
pub use operations::{ConflictRetry, RetryPolicy, TreeError};
pub use services::*;
