//! Path Arithmetic
//!
//! Pure functions over materialized paths. A path is a concatenation of
//! fixed-width steps, each one the zero-padded position of a node among its
//! siblings. Nothing here touches storage.

use super::{NumConv, PathError};

/// Fixed-width step layout of a materialized path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    steplen: usize,
    conv: NumConv,
    max_path_length: usize,
}

impl PathLayout {
    /// Create a layout with `steplen` characters per step over `alphabet`
    ///
    /// # Errors
    ///
    /// - `InvalidStepLength` if `steplen` is 0 or one step does not fit
    ///   in `max_path_length`
    /// - `InvalidAlphabet` if the alphabet cannot preserve ordering
    pub fn new(steplen: usize, alphabet: &str, max_path_length: usize) -> Result<Self, PathError> {
        if steplen == 0 || steplen > max_path_length {
            return Err(PathError::InvalidStepLength {
                steplen,
                max_path_length,
            });
        }

        Ok(Self {
            steplen,
            conv: NumConv::new(alphabet)?,
            max_path_length,
        })
    }

    pub fn steplen(&self) -> usize {
        self.steplen
    }

    pub fn max_path_length(&self) -> usize {
        self.max_path_length
    }

    pub fn conv(&self) -> &NumConv {
        &self.conv
    }

    /// Largest position a single step can hold
    pub fn max_position(&self) -> u64 {
        self.conv
            .radix()
            .checked_pow(self.steplen as u32)
            .map(|capacity| capacity - 1)
            .unwrap_or(u64::MAX)
    }

    /// Prefix of `path` covering its first `depth` steps
    pub fn basepath<'a>(&self, path: &'a str, depth: usize) -> &'a str {
        let end = depth.saturating_mul(self.steplen).min(path.len());
        path.get(..end).unwrap_or(path)
    }

    /// Depth implied by the length of `path`
    pub fn depth_of(&self, path: &str) -> usize {
        path.len() / self.steplen
    }

    /// Path of the parent node, empty for a root
    pub fn parent_path<'a>(&self, path: &'a str) -> &'a str {
        path.get(..path.len().saturating_sub(self.steplen))
            .unwrap_or("")
    }

    /// Position encoded in the final step of `path`
    pub fn last_position(&self, path: &str) -> Result<u64, PathError> {
        let start = path.len().saturating_sub(self.steplen);
        self.conv.str_to_int(path.get(start..).unwrap_or(path))
    }

    /// Encode `position` as one zero-padded step
    pub fn encode_step(&self, position: u64) -> Result<String, PathError> {
        let key = self.conv.int_to_str(position);
        if key.len() > self.steplen {
            return Err(PathError::PathOverflow { path: key });
        }

        let mut step = String::with_capacity(self.steplen);
        step.extend(std::iter::repeat(self.conv.min_digit()).take(self.steplen - key.len()));
        step.push_str(&key);
        Ok(step)
    }

    /// Path of a node at `depth` and `position`, under the ancestors of `parent_path`
    ///
    /// Only the first `depth - 1` steps of `parent_path` are used, so any
    /// path on the same ancestor line (the parent itself, a sibling of the
    /// new node, ...) produces the same result.
    pub fn build_path(
        &self,
        parent_path: &str,
        depth: usize,
        position: u64,
    ) -> Result<String, PathError> {
        let base = self.basepath(parent_path, depth.saturating_sub(1));
        let step = self.encode_step(position).map_err(|_| PathError::PathOverflow {
            path: format!("{}{}", base, self.conv.int_to_str(position)),
        })?;

        let path = format!("{}{}", base, step);
        self.check_length(&path)?;
        Ok(path)
    }

    /// The path of the next sibling slot after `path`
    pub fn increment_last_step(&self, path: &str) -> Result<String, PathError> {
        let position = self.last_position(path)?;
        let next = position
            .checked_add(1)
            .ok_or_else(|| PathError::PathOverflow {
                path: path.to_string(),
            })?;
        let step = self.encode_step(next).map_err(|_| PathError::PathOverflow {
            path: path.to_string(),
        })?;

        Ok(format!("{}{}", self.parent_path(path), step))
    }

    /// Inclusive bounds of every possible direct-child path of `path`
    pub fn children_path_interval(&self, path: &str) -> (String, String) {
        (
            format!("{}{}", path, self.min_step()),
            format!("{}{}", path, self.max_step()),
        )
    }

    /// One step made only of the zero digit
    pub fn min_step(&self) -> String {
        std::iter::repeat(self.conv.min_digit())
            .take(self.steplen)
            .collect()
    }

    /// One step made only of the largest digit
    pub fn max_step(&self) -> String {
        std::iter::repeat(self.conv.max_digit())
            .take(self.steplen)
            .collect()
    }

    /// Rewrite `path` so that its `old_prefix` becomes `new_prefix`
    ///
    /// Returns `None` if `path` does not live under `old_prefix`.
    pub fn rebase(&self, path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
        path.strip_prefix(old_prefix)
            .map(|rest| format!("{}{}", new_prefix, rest))
    }

    /// Whether every character of `path` is a digit of the alphabet
    pub fn has_valid_chars(&self, path: &str) -> bool {
        path.chars().all(|c| self.conv.contains(c))
    }

    /// Whether `path` is a whole number of steps and not empty
    pub fn has_valid_length(&self, path: &str) -> bool {
        !path.is_empty() && path.len() % self.steplen == 0
    }

    pub(crate) fn check_length(&self, path: &str) -> Result<(), PathError> {
        if path.len() > self.max_path_length {
            return Err(PathError::PathOverflow {
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decimal(steplen: usize) -> PathLayout {
        PathLayout::new(steplen, "0123456789", 255).unwrap()
    }

    #[test]
    fn test_basepath() {
        let layout = decimal(3);
        assert_eq!(layout.basepath("001002003", 0), "");
        assert_eq!(layout.basepath("001002003", 1), "001");
        assert_eq!(layout.basepath("001002003", 2), "001002");
        assert_eq!(layout.basepath("001002003", 5), "001002003");
    }

    #[test]
    fn test_build_path() {
        let layout = decimal(3);
        assert_eq!(layout.build_path("", 1, 1).unwrap(), "001");
        assert_eq!(layout.build_path("001", 2, 1).unwrap(), "001001");
        // A sibling's path yields the same ancestor line
        assert_eq!(layout.build_path("001005", 2, 12).unwrap(), "001012");
    }

    #[test]
    fn test_build_path_overflow() {
        let layout = decimal(2);
        assert_eq!(layout.build_path("", 1, 99).unwrap(), "99");
        assert!(matches!(
            layout.build_path("", 1, 100),
            Err(PathError::PathOverflow { .. })
        ));
    }

    #[test]
    fn test_increment_last_step() {
        let layout = decimal(3);
        assert_eq!(layout.increment_last_step("001009").unwrap(), "001010");
        assert_eq!(layout.increment_last_step("998").unwrap(), "999");
        assert!(matches!(
            layout.increment_last_step("001999"),
            Err(PathError::PathOverflow { .. })
        ));
    }

    #[test]
    fn test_children_path_interval() {
        let layout = PathLayout::new(2, "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ", 255).unwrap();
        assert_eq!(
            layout.children_path_interval("0A"),
            ("0A00".to_string(), "0AZZ".to_string())
        );
    }

    #[test]
    fn test_parent_path_and_depth() {
        let layout = decimal(3);
        assert_eq!(layout.parent_path("001002"), "001");
        assert_eq!(layout.parent_path("001"), "");
        assert_eq!(layout.depth_of("001002003"), 3);
        assert_eq!(layout.last_position("001012").unwrap(), 12);
    }

    #[test]
    fn test_max_path_length_is_enforced() {
        let layout = PathLayout::new(2, "0123456789", 4).unwrap();
        assert_eq!(layout.build_path("01", 2, 1).unwrap(), "0101");
        assert!(matches!(
            layout.build_path("0101", 3, 1),
            Err(PathError::PathOverflow { .. })
        ));
    }

    #[test]
    fn test_max_position() {
        assert_eq!(decimal(3).max_position(), 999);
        let binary = PathLayout::new(1, "01", 255).unwrap();
        assert_eq!(binary.max_position(), 1);
    }

    #[test]
    fn test_rebase() {
        let layout = decimal(3);
        assert_eq!(
            layout.rebase("001002005", "001002", "001003"),
            Some("001003005".to_string())
        );
        assert_eq!(layout.rebase("002001", "001", "003"), None);
    }

    #[test]
    fn test_validity_checks() {
        let layout = decimal(3);
        assert!(layout.has_valid_chars("001002"));
        assert!(!layout.has_valid_chars("00A"));
        assert!(layout.has_valid_length("001002"));
        assert!(!layout.has_valid_length("0010"));
        assert!(!layout.has_valid_length(""));
    }

    #[test]
    fn test_rejects_zero_steplen() {
        assert!(matches!(
            PathLayout::new(0, "01", 255),
            Err(PathError::InvalidStepLength { .. })
        ));
    }
}
