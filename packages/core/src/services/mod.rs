//! Tree Services
//!
//! This module contains the tree engine:
//!
//! - `TreeService` - inserts, moves, deletes and reads over the node table
//! - consistency checks and repair (`find_problems`, `fix_tree`) on the same
//!   service
//! - `TreeRepository` - the async trait the service implements
//!
//! Services coordinate between the database layer and path arithmetic,
//! enforcing the tree invariants on every committed mutation.

mod consistency;
pub mod repository;
pub mod tree_service;

pub use repository::TreeRepository;
pub use tree_service::{NodeOrderBy, TreeService};
