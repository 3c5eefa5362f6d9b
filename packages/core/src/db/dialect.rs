//! SQL Dialects
//!
//! The tree algorithms decide *which* rows move and by how much; this module
//! only spells the resulting set-based statements for each backend. Every
//! statement is returned as data ([`SqlStatement`]) so it can be executed by
//! any driver and checked as text in tests.
//!
//! Prefixes are matched with `SUBSTR(path, 1, n) = prefix` rather than
//! `LIKE 'prefix%'`: `LIKE` is case-insensitive in SQLite and treats `%` and
//! `_` as wildcards, both of which are legal alphabet characters.

use crate::path::PathLayout;
use serde::{Deserialize, Serialize};

/// Supported SQL backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
}

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Integer(value)
    }
}

impl From<usize> for SqlParam {
    fn from(value: usize) -> Self {
        SqlParam::Integer(value as i64)
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Collects parameters in textual order and hands out placeholders
struct Binder {
    dialect: SqlDialect,
    params: Vec<SqlParam>,
}

impl Binder {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, param: impl Into<SqlParam>) -> String {
        self.params.push(param.into());
        match self.dialect {
            SqlDialect::Postgres => format!("${}", self.params.len()),
            SqlDialect::Sqlite | SqlDialect::MySql => "?".to_string(),
        }
    }

    fn finish(self, sql: String) -> SqlStatement {
        SqlStatement {
            sql,
            params: self.params,
        }
    }
}

impl SqlDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "sqlite",
            SqlDialect::Postgres => "postgres",
            SqlDialect::MySql => "mysql",
        }
    }

    fn concat(&self, left: &str, right: &str) -> String {
        match self {
            SqlDialect::MySql => format!("CONCAT({}, {})", left, right),
            SqlDialect::Sqlite | SqlDialect::Postgres => format!("{} || {}", left, right),
        }
    }

    fn length(&self, expr: &str) -> String {
        match self {
            SqlDialect::MySql => format!("CHAR_LENGTH({})", expr),
            SqlDialect::Sqlite | SqlDialect::Postgres => format!("LENGTH({})", expr),
        }
    }

    fn int_div(&self, left: &str, right: &str) -> String {
        match self {
            SqlDialect::MySql => format!("{} DIV {}", left, right),
            SqlDialect::Sqlite | SqlDialect::Postgres => format!("{} / {}", left, right),
        }
    }

    /// DDL for the node table and its supporting index
    pub fn create_table(&self, table: &str, max_path_length: usize) -> Vec<String> {
        match self {
            SqlDialect::Sqlite => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id TEXT PRIMARY KEY,
                        path TEXT NOT NULL UNIQUE,
                        depth INTEGER NOT NULL,
                        numchild INTEGER NOT NULL DEFAULT 0,
                        data TEXT NOT NULL DEFAULT '{{}}'
                    )"
                ),
                format!("CREATE INDEX IF NOT EXISTS idx_{table}_depth ON {table}(depth)"),
            ],
            SqlDialect::Postgres => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id VARCHAR(64) PRIMARY KEY,
                        path VARCHAR({max_path_length}) COLLATE \"C\" NOT NULL UNIQUE,
                        depth INTEGER NOT NULL,
                        numchild INTEGER NOT NULL DEFAULT 0,
                        data TEXT NOT NULL DEFAULT '{{}}'
                    )"
                ),
                format!("CREATE INDEX IF NOT EXISTS idx_{table}_depth ON {table}(depth)"),
            ],
            SqlDialect::MySql => vec![format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id VARCHAR(64) PRIMARY KEY,
                    path VARCHAR({max_path_length}) CHARACTER SET ascii COLLATE ascii_bin NOT NULL UNIQUE,
                    depth INTEGER NOT NULL,
                    numchild INTEGER NOT NULL DEFAULT 0,
                    data LONGTEXT NOT NULL,
                    INDEX idx_{table}_depth (depth)
                )"
            )],
        }
    }

    /// Move every row under `old_prefix` so that it lives under `new_prefix`
    ///
    /// The depth column is only rewritten when the prefix length changes.
    /// MySQL evaluates `SET` assignments left to right against the updated
    /// row, so it reads the new `path` back; the other backends see the old
    /// row and recompute the new path expression.
    pub fn rewrite_subtree(
        &self,
        table: &str,
        layout: &PathLayout,
        old_prefix: &str,
        new_prefix: &str,
    ) -> SqlStatement {
        let mut b = Binder::new(*self);
        let tail_from = old_prefix.len() + 1;

        let new_path = {
            let prefix = b.bind(new_prefix);
            let from = b.bind(tail_from);
            self.concat(&prefix, &format!("SUBSTR(path, {})", from))
        };
        let mut assignments = vec![format!("path = {}", new_path)];

        if old_prefix.len() != new_prefix.len() {
            let depth = match self {
                SqlDialect::MySql => {
                    let steplen = b.bind(layout.steplen());
                    self.int_div(&self.length("path"), &steplen)
                }
                SqlDialect::Sqlite | SqlDialect::Postgres => {
                    let prefix = b.bind(new_prefix);
                    let from = b.bind(tail_from);
                    let expr = self.concat(&prefix, &format!("SUBSTR(path, {})", from));
                    let steplen = b.bind(layout.steplen());
                    self.int_div(&self.length(&expr), &steplen)
                }
            };
            assignments.push(format!("depth = {}", depth));
        }

        let len = b.bind(old_prefix.len());
        let prefix = b.bind(old_prefix);
        let sql = format!(
            "UPDATE {} SET {} WHERE SUBSTR(path, 1, {}) = {}",
            table,
            assignments.join(", "),
            len,
            prefix
        );
        b.finish(sql)
    }

    /// In-place `numchild` arithmetic on the row at `path`
    ///
    /// Never lets the counter go negative.
    pub fn adjust_numchild(&self, table: &str, path: &str, delta: i64) -> SqlStatement {
        let mut b = Binder::new(*self);
        let amount = b.bind(delta);
        let target = b.bind(path);
        let guard = b.bind(delta);
        let sql = format!(
            "UPDATE {} SET numchild = numchild + {} WHERE path = {} AND numchild + {} >= 0",
            table, amount, target, guard
        );
        b.finish(sql)
    }

    /// Recompute `depth` from the path length wherever it disagrees
    pub fn fix_depths(&self, table: &str, layout: &PathLayout) -> SqlStatement {
        let mut b = Binder::new(*self);
        let set_steplen = b.bind(layout.steplen());
        let set_expr = self.int_div(&self.length("path"), &set_steplen);
        let where_steplen = b.bind(layout.steplen());
        let where_expr = self.int_div(&self.length("path"), &where_steplen);
        let sql = format!(
            "UPDATE {} SET depth = {} WHERE depth != {}",
            table, set_expr, where_expr
        );
        b.finish(sql)
    }

    /// Recompute `numchild` from an aggregate count over each row's child interval
    pub fn fix_numchild(&self, table: &str, layout: &PathLayout) -> SqlStatement {
        let mut b = Binder::new(*self);
        let (min_step, max_step) = (layout.min_step(), layout.max_step());

        let sql = match self {
            SqlDialect::Sqlite | SqlDialect::Postgres => {
                let count = |b: &mut Binder| {
                    let lo = b.bind(min_step.as_str());
                    let hi = b.bind(max_step.as_str());
                    let steplen = b.bind(layout.steplen());
                    format!(
                        "(SELECT COUNT(1) FROM {table} AS c WHERE c.path BETWEEN {lo_expr} AND {hi_expr} AND {c_len} = {p_len} + {steplen})",
                        lo_expr = self.concat(&format!("{}.path", table), &lo),
                        hi_expr = self.concat(&format!("{}.path", table), &hi),
                        c_len = self.length("c.path"),
                        p_len = self.length(&format!("{}.path", table)),
                    )
                };
                let set_count = count(&mut b);
                let where_count = count(&mut b);
                format!(
                    "UPDATE {} SET numchild = {} WHERE numchild != {}",
                    table, set_count, where_count
                )
            }
            SqlDialect::MySql => {
                let lo = b.bind(min_step.as_str());
                let hi = b.bind(max_step.as_str());
                let steplen = b.bind(layout.steplen());
                format!(
                    "UPDATE {table} AS n JOIN (SELECT p.id AS id, (SELECT COUNT(1) FROM {table} AS c WHERE c.path BETWEEN {lo_expr} AND {hi_expr} AND {c_len} = {p_len} + {steplen}) AS real_numchild FROM {table} AS p) AS counts ON counts.id = n.id SET n.numchild = counts.real_numchild WHERE n.numchild != counts.real_numchild",
                    lo_expr = self.concat("p.path", &lo),
                    hi_expr = self.concat("p.path", &hi),
                    c_len = self.length("c.path"),
                    p_len = self.length("p.path"),
                )
            }
        };
        b.finish(sql)
    }
}
