//! Tree Operation Support
//!
//! Types shared by the tree service and its callers:
//!
//! - [`TreeError`] - the error of every tree operation
//! - [`plan_shift`] - storage-agnostic planning of sibling shifts
//! - [`ConflictRetry`] - caller-side retry on path conflicts

pub mod error;
pub mod retry;
pub mod shift;

pub use error::TreeError;
pub use retry::{ConflictRetry, RetryPolicy};
pub use shift::{plan_shift, track_path, PathRewrite, ShiftPlan};
