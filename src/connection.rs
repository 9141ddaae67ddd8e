//! DuckDB connection wrapper shared by the deck store and the import broker.
//!
//! One database file (or one in-memory database) backs both. Each component
//! holds its own [`Connection`] cloned from the first, and each clone is
//! guarded by a mutex so a component never runs two statements at once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use duckdb::Connection as DuckDbConnection;

use crate::error::{DeckforgeError, Result};

/// A lock-guarded DuckDB connection.
pub struct Connection {
    conn: Mutex<DuckDbConnection>,
    path: Option<PathBuf>,
}

impl Connection {
    /// Open (or create) a database file, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    DeckforgeError::Persistence(format!(
                        "Cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = DuckDbConnection::open(path)?;
        tracing::debug!(path = %path.display(), "opened deck database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = DuckDbConnection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Open a second connection to the same database.
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.lock()?.try_clone()?;
        Ok(Self {
            conn: Mutex::new(cloned),
            path: self.path.clone(),
        })
    }

    /// Path of the backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, DuckDbConnection>> {
        self.conn
            .lock()
            .map_err(|_| DeckforgeError::Persistence("connection lock poisoned".into()))
    }

    /// Run `f` with exclusive access to the underlying connection.
    pub fn with<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DuckDbConnection) -> Result<T>,
    {
        let guard = self.lock()?;
        f(&guard)
    }

    /// Run `f` inside a transaction, committing on success and rolling back
    /// on any error.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DuckDbConnection) -> Result<T>,
    {
        let guard = self.lock()?;
        guard.execute_batch("BEGIN TRANSACTION")?;
        match f(&guard) {
            Ok(value) => {
                guard.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = guard.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Execute one or more statements with no parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with(|c| Ok(c.execute_batch(sql)?))
    }

    /// Execute SQL and return the first column of the first row as an integer.
    ///
    /// Returns `None` if the result set is empty.
    pub fn execute_scalar(&self, sql: &str, params: &[String]) -> Result<Option<i64>> {
        self.with(|c| {
            let mut stmt = c.prepare(sql)?;
            let param_values: Vec<&dyn duckdb::ToSql> =
                params.iter().map(|p| p as &dyn duckdb::ToSql).collect();
            let mut rows = stmt.query(param_values.as_slice())?;
            let value = match rows.next()? {
                Some(row) => Some(row.get::<_, i64>(0)?),
                None => None,
            };
            Ok(value)
        })
    }
}
