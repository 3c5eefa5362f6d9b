//! Database Connection Management
//!
//! This module provides the database connection and initialization
//! functionality using libsql/Turso for the tree table.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **One table**: `path`, `depth`, `numchild` plus a JSON `data` payload
//! - **WAL mode**: Write-Ahead Logging so readers never block the writer
//! - **Immediate transactions**: every mutation takes the write lock up front
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions**. The 5-second
//! busy timeout lets a second writer wait for the first instead of failing
//! immediately with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use mptree_core::db::DatabaseService;
//! # use mptree_core::TreeConfig;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseService::new(PathBuf::from("./data/tree.db"), &TreeConfig::default()).await?;
//! let conn = db.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::db::dialect::{SqlDialect, SqlParam, SqlStatement};
use crate::db::error::DatabaseError;
use libsql::{Builder, Connection, Database, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Create the node table and its indexes if missing
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The configuration names a dialect libsql cannot run
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf, config: &TreeConfig) -> Result<Self, DatabaseError> {
        if config.dialect != SqlDialect::Sqlite {
            return Err(DatabaseError::UnsupportedDialect {
                dialect: config.dialect.name().to_string(),
            });
        }
        config
            .validate()
            .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };
        service.initialize_schema(config).await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create the node table and indexes (idempotent)
    async fn initialize_schema(&self, config: &TreeConfig) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        for ddl in config
            .dialect
            .create_table(&config.table, config.max_path_length)
        {
            conn.execute(&ddl, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create table '{}': {}",
                    config.table, e
                ))
            })?;
        }

        tracing::debug!(table = %config.table, path = %self.db_path.display(), "Tree schema ready");
        Ok(())
    }

    /// Get a raw connection (synchronous contexts only)
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    ///
    /// **✅ RECOMMENDED** for all async code paths. Concurrent writers wait up
    /// to 5 seconds for the write lock instead of failing immediately.
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        Ok(conn)
    }

    /// Start a write transaction holding the database write lock
    ///
    /// `BEGIN IMMEDIATE` makes a second writer queue behind the first (up to
    /// the busy timeout) instead of discovering the conflict at commit time.
    pub async fn begin_write(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    /// Commit on success, roll back on failure
    ///
    /// The error of the failed operation is returned unchanged; a failed
    /// commit is rolled back and reported as a `DatabaseError`.
    pub async fn finish<R, E>(&self, conn: &Connection, result: Result<R, E>) -> Result<R, E>
    where
        E: From<DatabaseError> + std::fmt::Display,
    {
        match result {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _rollback = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    ))
                    .into());
                }
                Ok(value)
            }
            Err(e) => {
                tracing::warn!("Rolling back tree transaction: {}", e);
                let _rollback = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    /// Execute a dialect statement, returning the number of affected rows
    pub async fn execute_statement(
        conn: &Connection,
        stmt: SqlStatement,
    ) -> Result<u64, DatabaseError> {
        tracing::debug!(sql = %stmt.sql, params = ?stmt.params, "Executing statement");
        conn.execute(&stmt.sql, libsql::params_from_iter(to_values(stmt.params)))
            .await
            .map_err(|e| DatabaseError::from_statement("Failed to execute statement", e))
    }
}

/// Convert dialect parameters into libsql values
pub(crate) fn to_values(params: Vec<SqlParam>) -> Vec<Value> {
    params
        .into_iter()
        .map(|param| match param {
            SqlParam::Text(text) => Value::Text(text),
            SqlParam::Integer(n) => Value::Integer(n),
        })
        .collect()
}
