//! Materialized Paths
//!
//! - [`NumConv`] - base-N codec for a single step position
//! - [`PathLayout`] - fixed-width step arithmetic (parent, basepath,
//!   increment, child interval)
//!
//! Both are pure and storage-agnostic; the tree service builds every path it
//! writes through them.

mod layout;
mod numconv;

pub use layout::PathLayout;
pub use numconv::NumConv;

use thiserror::Error;

/// Errors raised while encoding, decoding or building paths
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A character outside the configured alphabet
    #[error("Invalid digit '{digit}' in '{input}'")]
    InvalidDigit { digit: char, input: String },

    /// A step position needs more than `steplen` characters, or the full
    /// path is longer than the configured maximum
    #[error("Path overflow from '{path}'")]
    PathOverflow { path: String },

    #[error("Invalid alphabet '{alphabet}': {reason}")]
    InvalidAlphabet { alphabet: String, reason: String },

    #[error("Invalid step length {steplen} (max path length {max_path_length})")]
    InvalidStepLength {
        steplen: usize,
        max_path_length: usize,
    },
}

impl PathError {
    pub fn invalid_alphabet(alphabet: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAlphabet {
            alphabet: alphabet.to_string(),
            reason: reason.into(),
        }
    }
}
