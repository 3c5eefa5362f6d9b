//! Insertion Positions
//!
//! Where a new or moved node lands relative to a reference node. Child
//! positions are only accepted by `move_node`; they are converted to a
//! sibling position against the target's children before any path is built.

use crate::operations::TreeError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Placement relative to a reference node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    FirstChild,
    LastChild,
    SortedChild,
    FirstSibling,
    Left,
    Right,
    LastSibling,
    SortedSibling,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstChild => "first-child",
            Self::LastChild => "last-child",
            Self::SortedChild => "sorted-child",
            Self::FirstSibling => "first-sibling",
            Self::Left => "left",
            Self::Right => "right",
            Self::LastSibling => "last-sibling",
            Self::SortedSibling => "sorted-sibling",
        }
    }

    pub fn is_child(&self) -> bool {
        matches!(self, Self::FirstChild | Self::LastChild | Self::SortedChild)
    }

    pub fn is_sorted(&self) -> bool {
        matches!(self, Self::SortedChild | Self::SortedSibling)
    }

    /// The sibling position equivalent to a child position, applied to the
    /// target's children
    pub fn as_sibling(&self) -> Position {
        match self {
            Self::FirstChild => Self::FirstSibling,
            Self::LastChild => Self::LastSibling,
            Self::SortedChild => Self::SortedSibling,
            other => *other,
        }
    }
}

impl FromStr for Position {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-child" => Ok(Self::FirstChild),
            "last-child" => Ok(Self::LastChild),
            "sorted-child" => Ok(Self::SortedChild),
            "first-sibling" => Ok(Self::FirstSibling),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "last-sibling" => Ok(Self::LastSibling),
            "sorted-sibling" => Ok(Self::SortedSibling),
            _ => Err(TreeError::invalid_position(s, "unknown position")),
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
