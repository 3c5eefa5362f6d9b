//! Tree Table Access
//!
//! Row-level reads and writes against the node table. Every method takes the
//! connection explicitly so callers decide whether it runs inside a write
//! transaction. Rows are returned raw ([`NodeRow`]); payload decoding belongs
//! to the service layer.
//!
//! Range reads use the child interval `path BETWEEN p||min AND p||max`
//! together with the indexed `depth` column, so they are served by the
//! unique index on `path` instead of a prefix scan.

use crate::config::TreeConfig;
use crate::db::database::DatabaseService;
use crate::db::dialect::SqlDialect;
use crate::db::error::DatabaseError;
use crate::path::PathLayout;
use libsql::{Connection, Row, Value};

const COLUMNS: &str = "id, path, depth, numchild, data";

/// One stored node, undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub id: String,
    pub path: String,
    pub depth: i64,
    pub numchild: i64,
    /// JSON payload
    pub data: String,
}

/// A stored node together with the number of rows one step below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedRow {
    pub id: String,
    pub path: String,
    pub depth: i64,
    pub numchild: i64,
    pub real_numchild: i64,
}

/// Statement builder and executor for one node table
#[derive(Debug, Clone)]
pub struct TreeTable {
    table: String,
    layout: PathLayout,
    dialect: SqlDialect,
}

impl TreeTable {
    pub fn new(config: &TreeConfig, layout: PathLayout) -> Self {
        Self {
            table: config.table.clone(),
            layout,
            dialect: config.dialect,
        }
    }

    pub fn name(&self) -> &str {
        &self.table
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    fn row_to_node(row: &Row) -> Result<NodeRow, DatabaseError> {
        let malformed = |field: &str, e: libsql::Error| {
            DatabaseError::MalformedRow(format!("Failed to get {}: {}", field, e))
        };
        Ok(NodeRow {
            id: row.get(0).map_err(|e| malformed("id", e))?,
            path: row.get(1).map_err(|e| malformed("path", e))?,
            depth: row.get(2).map_err(|e| malformed("depth", e))?,
            numchild: row.get(3).map_err(|e| malformed("numchild", e))?,
            data: row.get(4).map_err(|e| malformed("data", e))?,
        })
    }

    /// Run `SELECT <columns> FROM <table> <tail>`
    async fn select(
        &self,
        conn: &Connection,
        tail: &str,
        params: Vec<Value>,
    ) -> Result<Vec<NodeRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM {} {}", COLUMNS, self.table, tail);
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::from_statement("Failed to query nodes", e))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn select_one(
        &self,
        conn: &Connection,
        tail: &str,
        params: Vec<Value>,
    ) -> Result<Option<NodeRow>, DatabaseError> {
        Ok(self.select(conn, tail, params).await?.into_iter().next())
    }

    async fn scalar(
        &self,
        conn: &Connection,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Option<i64>, DatabaseError> {
        let mut rows = conn
            .query(sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::from_statement("Failed to run aggregate", e))?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => row
                .get::<Option<i64>>(0)
                .map_err(|e| DatabaseError::MalformedRow(e.to_string())),
            None => Ok(None),
        }
    }

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    fn int(value: usize) -> Value {
        Value::Integer(value as i64)
    }

    /// `WHERE` clause selecting the direct children of `parent_path`
    fn children_clause(&self, parent_path: &str) -> (String, Vec<Value>) {
        let (lo, hi) = self.layout.children_path_interval(parent_path);
        let depth = self.layout.depth_of(parent_path) + 1;
        (
            "WHERE depth = ? AND path BETWEEN ? AND ?".to_string(),
            vec![Self::int(depth), Value::Text(lo), Value::Text(hi)],
        )
    }

    //
    // READS
    //

    pub async fn get_by_id(
        &self,
        conn: &Connection,
        id: &str,
    ) -> Result<Option<NodeRow>, DatabaseError> {
        self.select_one(conn, "WHERE id = ?", vec![Self::text(id)])
            .await
    }

    pub async fn get_by_path(
        &self,
        conn: &Connection,
        path: &str,
    ) -> Result<Option<NodeRow>, DatabaseError> {
        self.select_one(conn, "WHERE path = ?", vec![Self::text(path)])
            .await
    }

    /// Direct children of `parent_path` in path order; `""` lists the roots
    pub async fn children(
        &self,
        conn: &Connection,
        parent_path: &str,
    ) -> Result<Vec<NodeRow>, DatabaseError> {
        let (clause, params) = self.children_clause(parent_path);
        self.select(conn, &format!("{} ORDER BY path", clause), params)
            .await
    }

    pub async fn first_child(
        &self,
        conn: &Connection,
        parent_path: &str,
    ) -> Result<Option<NodeRow>, DatabaseError> {
        let (clause, params) = self.children_clause(parent_path);
        self.select_one(conn, &format!("{} ORDER BY path LIMIT 1", clause), params)
            .await
    }

    pub async fn last_child(
        &self,
        conn: &Connection,
        parent_path: &str,
    ) -> Result<Option<NodeRow>, DatabaseError> {
        let (clause, params) = self.children_clause(parent_path);
        self.select_one(
            conn,
            &format!("{} ORDER BY path DESC LIMIT 1", clause),
            params,
        )
        .await
    }

    /// The sibling immediately after (or before) `path`
    pub async fn adjacent_sibling(
        &self,
        conn: &Connection,
        path: &str,
        after: bool,
    ) -> Result<Option<NodeRow>, DatabaseError> {
        let (clause, mut params) = self.children_clause(self.layout.parent_path(path));
        params.push(Self::text(path));
        let tail = if after {
            format!("{} AND path > ? ORDER BY path LIMIT 1", clause)
        } else {
            format!("{} AND path < ? ORDER BY path DESC LIMIT 1", clause)
        };
        self.select_one(conn, &tail, params).await
    }

    /// Rows at each proper prefix of `path`, root first
    pub async fn ancestors(
        &self,
        conn: &Connection,
        path: &str,
    ) -> Result<Vec<NodeRow>, DatabaseError> {
        let depth = self.layout.depth_of(path);
        if depth <= 1 {
            return Ok(Vec::new());
        }

        let prefixes: Vec<Value> = (1..depth)
            .map(|d| Self::text(self.layout.basepath(path, d)))
            .collect();
        let placeholders = vec!["?"; prefixes.len()].join(", ");
        self.select(
            conn,
            &format!("WHERE path IN ({}) ORDER BY path", placeholders),
            prefixes,
        )
        .await
    }

    /// Every row strictly below `path`, in DFS pre-order
    pub async fn descendants(
        &self,
        conn: &Connection,
        path: &str,
    ) -> Result<Vec<NodeRow>, DatabaseError> {
        self.select(
            conn,
            "WHERE path > ? AND SUBSTR(path, 1, ?) = ? ORDER BY path",
            vec![Self::text(path), Self::int(path.len()), Self::text(path)],
        )
        .await
    }

    /// `path` itself followed by its descendants
    pub async fn subtree(
        &self,
        conn: &Connection,
        path: &str,
    ) -> Result<Vec<NodeRow>, DatabaseError> {
        self.select(
            conn,
            "WHERE SUBSTR(path, 1, ?) = ? ORDER BY path",
            vec![Self::int(path.len()), Self::text(path)],
        )
        .await
    }

    /// The whole forest in path order
    pub async fn all(&self, conn: &Connection) -> Result<Vec<NodeRow>, DatabaseError> {
        self.select(conn, "ORDER BY path", Vec::new()).await
    }

    pub async fn rows_by_ids(
        &self,
        conn: &Connection,
        ids: &[String],
    ) -> Result<Vec<NodeRow>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        self.select(
            conn,
            &format!("WHERE id IN ({}) ORDER BY depth, path", placeholders),
            ids.iter().map(|id| Self::text(id)).collect(),
        )
        .await
    }

    pub async fn count_descendants(
        &self,
        conn: &Connection,
        path: &str,
    ) -> Result<u64, DatabaseError> {
        let sql = format!(
            "SELECT COUNT(1) FROM {} WHERE path > ? AND SUBSTR(path, 1, ?) = ?",
            self.table
        );
        let count = self
            .scalar(
                conn,
                &sql,
                vec![Self::text(path), Self::int(path.len()), Self::text(path)],
            )
            .await?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    /// Length of the longest path in the subtree rooted at `path`
    pub async fn longest_path_under(
        &self,
        conn: &Connection,
        path: &str,
    ) -> Result<usize, DatabaseError> {
        let sql = format!(
            "SELECT MAX(LENGTH(path)) FROM {} WHERE SUBSTR(path, 1, ?) = ?",
            self.table
        );
        let longest = self
            .scalar(conn, &sql, vec![Self::int(path.len()), Self::text(path)])
            .await?;
        Ok(longest.unwrap_or(0).max(0) as usize)
    }

    /// Every row with the number of rows exactly one step below it
    pub async fn scan_with_child_counts(
        &self,
        conn: &Connection,
    ) -> Result<Vec<CountedRow>, DatabaseError> {
        let sql = format!(
            "SELECT p.id, p.path, p.depth, p.numchild,
                    (SELECT COUNT(1) FROM {t} AS c
                      WHERE c.path BETWEEN p.path || ? AND p.path || ?
                        AND LENGTH(c.path) = LENGTH(p.path) + ?)
             FROM {t} AS p ORDER BY p.path",
            t = self.table
        );
        let params = vec![
            Value::Text(self.layout.min_step()),
            Value::Text(self.layout.max_step()),
            Self::int(self.layout.steplen()),
        ];
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::from_statement("Failed to scan tree", e))?;

        let mut scanned = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let field = |e: libsql::Error| DatabaseError::MalformedRow(e.to_string());
            scanned.push(CountedRow {
                id: row.get(0).map_err(field)?,
                path: row.get(1).map_err(field)?,
                depth: row.get(2).map_err(field)?,
                numchild: row.get(3).map_err(field)?,
                real_numchild: row.get(4).map_err(field)?,
            });
        }
        Ok(scanned)
    }

    //
    // WRITES
    //

    pub async fn insert(&self, conn: &Connection, row: &NodeRow) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?)",
            self.table, COLUMNS
        );
        conn.execute(
            &sql,
            libsql::params_from_iter(vec![
                Self::text(&row.id),
                Self::text(&row.path),
                Value::Integer(row.depth),
                Value::Integer(row.numchild),
                Self::text(&row.data),
            ]),
        )
        .await
        .map_err(|e| DatabaseError::from_statement(&format!("Failed to insert node {}", row.id), e))?;
        Ok(())
    }

    /// Replace the `old_prefix` of every row beneath it with `new_prefix`
    pub async fn rewrite_subtree(
        &self,
        conn: &Connection,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, DatabaseError> {
        let stmt = self
            .dialect
            .rewrite_subtree(&self.table, &self.layout, old_prefix, new_prefix);
        DatabaseService::execute_statement(conn, stmt).await
    }

    /// `numchild = numchild + delta` on the row at `path`
    pub async fn adjust_numchild(
        &self,
        conn: &Connection,
        path: &str,
        delta: i64,
    ) -> Result<u64, DatabaseError> {
        let stmt = self.dialect.adjust_numchild(&self.table, path, delta);
        DatabaseService::execute_statement(conn, stmt).await
    }

    pub async fn update_data(
        &self,
        conn: &Connection,
        id: &str,
        data: &str,
    ) -> Result<u64, DatabaseError> {
        let sql = format!("UPDATE {} SET data = ? WHERE id = ?", self.table);
        conn.execute(&sql, libsql::params_from_iter(vec![Self::text(data), Self::text(id)]))
            .await
            .map_err(|e| DatabaseError::from_statement("Failed to update node data", e))
    }

    /// Delete `path` and everything beneath it
    pub async fn delete_subtree(&self, conn: &Connection, path: &str) -> Result<u64, DatabaseError> {
        let sql = format!("DELETE FROM {} WHERE SUBSTR(path, 1, ?) = ?", self.table);
        conn.execute(
            &sql,
            libsql::params_from_iter(vec![Self::int(path.len()), Self::text(path)]),
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to delete subtree", e))
    }

    pub async fn delete_all(&self, conn: &Connection) -> Result<u64, DatabaseError> {
        conn.execute(&format!("DELETE FROM {}", self.table), ())
            .await
            .map_err(|e| DatabaseError::from_statement("Failed to clear tree", e))
    }

    pub async fn fix_depths(&self, conn: &Connection) -> Result<u64, DatabaseError> {
        let stmt = self.dialect.fix_depths(&self.table, &self.layout);
        DatabaseService::execute_statement(conn, stmt).await
    }

    pub async fn fix_numchild(&self, conn: &Connection) -> Result<u64, DatabaseError> {
        let stmt = self.dialect.fix_numchild(&self.table, &self.layout);
        DatabaseService::execute_statement(conn, stmt).await
    }
}
