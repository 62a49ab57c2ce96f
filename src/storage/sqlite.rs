//! SQLite connection plumbing.
//!
//! Provides async-safe operations over a single pooled connection using
//! spawn_blocking. rusqlite's `Connection` is not Sync, so it lives behind
//! an `Arc<Mutex<_>>` and every operation runs as its own transaction.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use tokio::task::spawn_blocking;

use crate::error::Result;
use crate::error::SymdexErr;

/// Async-safe SQLite store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database and initialize the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let path_buf = path.to_path_buf();
        let conn = Connection::open(path).map_err(|e| SymdexErr::sqlite(&path_buf, e))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| SymdexErr::sqlite(&path_buf, e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| SymdexErr::sqlite(&path_buf, e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path_buf,
        })
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read or autocommit write on the blocking pool.
    pub async fn query<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let path = self.path.clone();

        spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|poisoned| {
                tracing::warn!(path = %path.display(), "sqlite mutex poisoned, recovering");
                recover(poisoned.into_inner(), &path)
            });
            f(&guard)
        })
        .await
        .map_err(|e| SymdexErr::Sqlite {
            path: self.path.clone(),
            cause: format!("spawn_blocking failed: {e}"),
        })?
    }

    /// Run a closure inside one transaction on the blocking pool.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let path = self.path.clone();

        spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| {
                tracing::warn!(path = %path.display(), "sqlite mutex poisoned in transaction, recovering");
                recover(poisoned.into_inner(), &path)
            });

            let tx = guard
                .transaction()
                .map_err(|e| SymdexErr::sqlite(&path, e))?;
            let result = f(&tx)?;
            tx.commit().map_err(|e| SymdexErr::sqlite(&path, e))?;
            Ok(result)
        })
        .await
        .map_err(|e| SymdexErr::Sqlite {
            path: self.path.clone(),
            cause: format!("spawn_blocking failed: {e}"),
        })?
    }
}

/// Roll back any transaction left open by a panicked holder.
fn recover<'a>(conn: MutexGuard<'a, Connection>, path: &Path) -> MutexGuard<'a, Connection> {
    if !conn.is_autocommit() {
        match conn.execute("ROLLBACK", []) {
            Ok(_) => {
                tracing::info!(path = %path.display(), "rolled back pending transaction");
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "rollback failed after poisoning");
            }
        }
    }
    conn
}

/// Schema of the symbol metadata store.
///
/// `file_checks` holds one fingerprint per indexed file; `fqn_symbols`
/// holds the symbol rows keyed by the `(fqn, descriptor, internal)` triple.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS file_checks (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL UNIQUE,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fqn_symbols (
    id INTEGER PRIMARY KEY,
    container TEXT NOT NULL,
    entry TEXT NOT NULL,
    fqn TEXT NOT NULL,
    descriptor TEXT,
    internal TEXT,
    source TEXT,
    line INTEGER,
    offset INTEGER,
    UNIQUE(fqn, descriptor, internal)
);

CREATE INDEX IF NOT EXISTS idx_fqn_symbols_fqn ON fqn_symbols(fqn);
CREATE INDEX IF NOT EXISTS idx_fqn_symbols_container ON fqn_symbols(container);
"#;

/// Extension trait mapping `QueryReturnedNoRows` to `None`.
pub trait OptionalExt<T> {
    fn optional_with_path(self, path: &Path) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional_with_path(self, path: &Path) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SymdexErr::sqlite(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_and_runs_queries() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("sql-1.0/db.sqlite3")).unwrap();

        let count: i64 = store
            .query(|conn| {
                let path = PathBuf::new();
                conn.query_row("SELECT COUNT(*) FROM file_checks", [], |row| row.get(0))
                    .map_err(|e| SymdexErr::sqlite(&path, e))
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn transactions_commit() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("db.sqlite3")).unwrap();
        let path = store.path().to_path_buf();

        store
            .transaction(move |conn| {
                conn.execute(
                    "INSERT INTO file_checks (filename, timestamp) VALUES (?1, ?2)",
                    rusqlite::params!["file:/a", 1_i64],
                )
                .map_err(|e| SymdexErr::sqlite(&path, e))?;
                Ok(())
            })
            .await
            .unwrap();

        let path = store.path().to_path_buf();
        let count: i64 = store
            .query(move |conn| {
                conn.query_row("SELECT COUNT(*) FROM file_checks", [], |row| row.get(0))
                    .map_err(|e| SymdexErr::sqlite(&path, e))
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
