//! Tree Configuration
//!
//! Storage layout settings shared by the database layer and the tree service.
//! Changing `steplen` or `alphabet` on a populated table requires a
//! destructive `fix_tree` after re-exporting the data.

use crate::db::SqlDialect;
use crate::path::{PathError, PathLayout};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TABLE: &str = "tree_nodes";
pub const DEFAULT_STEPLEN: usize = 4;
pub const DEFAULT_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DEFAULT_MAX_PATH_LENGTH: usize = 255;

/// Invalid configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid table name '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidTableName(String),

    #[error("Invalid path layout: {0}")]
    InvalidLayout(#[from] PathError),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Layout of the node table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Name of the node table
    pub table: String,
    /// Characters per path step
    pub steplen: usize,
    /// Ordered digit alphabet; index 0 is the zero digit
    pub alphabet: String,
    /// Longest path the `path` column may hold
    pub max_path_length: usize,
    /// SQL flavour used for bulk statements
    pub dialect: SqlDialect,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            steplen: DEFAULT_STEPLEN,
            alphabet: DEFAULT_ALPHABET.to_string(),
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            dialect: SqlDialect::Sqlite,
        }
    }
}

impl TreeConfig {
    /// Defaults overlaid with `MPTREE_*` environment variables
    ///
    /// Reads `MPTREE_TABLE`, `MPTREE_STEPLEN`, `MPTREE_ALPHABET` and
    /// `MPTREE_MAX_PATH_LENGTH`. Unparseable numbers are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(table) = std::env::var("MPTREE_TABLE") {
            config.table = table;
        }
        if let Ok(alphabet) = std::env::var("MPTREE_ALPHABET") {
            config.alphabet = alphabet;
        }
        if let Some(steplen) = parse_env("MPTREE_STEPLEN")? {
            config.steplen = steplen;
        }
        if let Some(max) = parse_env("MPTREE_MAX_PATH_LENGTH")? {
            config.max_path_length = max;
        }

        config.validate()?;
        Ok(config)
    }

    /// Builder-style override of the step layout
    pub fn with_layout(mut self, steplen: usize, alphabet: impl Into<String>) -> Self {
        self.steplen = steplen;
        self.alphabet = alphabet.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Check that the configuration can produce well-ordered paths
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_table = !self.table.is_empty()
            && !self.table.starts_with(|c: char| c.is_ascii_digit())
            && self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_table {
            return Err(ConfigError::InvalidTableName(self.table.clone()));
        }

        self.layout()?;
        Ok(())
    }

    /// Path arithmetic for this configuration
    pub fn layout(&self) -> Result<PathLayout, ConfigError> {
        Ok(PathLayout::new(
            self.steplen,
            &self.alphabet,
            self.max_path_length,
        )?)
    }
}

fn parse_env(key: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
