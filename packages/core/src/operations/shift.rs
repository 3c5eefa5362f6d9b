//! Sibling Shift Planning
//!
//! Making room for a node in the middle of a sibling list means moving some
//! of the siblings one slot to the right. The planner decides which ones,
//! purely from paths, so the storage layer only has to apply the resulting
//! prefix rewrites.
//!
//! Only the contiguous run starting at the target slot moves: the first gap
//! absorbs the shift and everything after it stays put. Rewrites are
//! returned rightmost first, so no intermediate state ever holds two rows on
//! the same path.

use crate::path::{PathError, PathLayout};

/// Replace the subtree prefix `old` with `new`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRewrite {
    pub old: String,
    pub new: String,
}

/// Result of planning an insertion into a sibling list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftPlan {
    /// The slot that is free once `shifts` have been applied
    pub new_path: String,
    /// Rewrites in application order (rightmost first)
    pub shifts: Vec<PathRewrite>,
}

impl ShiftPlan {
    /// A plan that moves nothing
    pub fn direct(new_path: String) -> Self {
        Self {
            new_path,
            shifts: Vec::new(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.shifts.is_empty()
    }
}

/// Plan the shifts needed to free `new_path`
///
/// `candidates` are the paths of the siblings at or after `new_path`, in
/// path order.
///
/// # Errors
///
/// `PathOverflow` if a shifted sibling would need a position beyond the
/// capacity of one step.
pub fn plan_shift<S: AsRef<str>>(
    layout: &PathLayout,
    new_path: String,
    candidates: &[S],
) -> Result<ShiftPlan, PathError> {
    let mut shifts = Vec::new();
    let mut prior = new_path.clone();

    for candidate in candidates {
        let candidate = candidate.as_ref();
        if candidate > prior.as_str() {
            break;
        }
        let shifted = layout.increment_last_step(candidate)?;
        shifts.push(PathRewrite {
            old: candidate.to_string(),
            new: shifted.clone(),
        });
        prior = shifted;
    }

    shifts.reverse();
    Ok(ShiftPlan { new_path, shifts })
}

/// Follow `path` through a sequence of prefix rewrites
pub fn track_path(layout: &PathLayout, path: &str, shifts: &[PathRewrite]) -> String {
    shifts.iter().fold(path.to_string(), |current, shift| {
        layout
            .rebase(&current, &shift.old, &shift.new)
            .unwrap_or(current)
    })
}
