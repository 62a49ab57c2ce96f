//! Domain operations over the relational store.
//!
//! Fingerprints and symbol rows live in the same database; every bulk
//! operation is one transaction so a crash leaves a consistent prefix and
//! no symbol row ever exists without its fingerprint.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::params_from_iter;
use rusqlite::Row;

use crate::error::Result;
use crate::error::SymdexErr;
use crate::storage::sqlite::OptionalExt;
use crate::storage::sqlite::SqliteStore;
use crate::types::FileCheck;
use crate::types::FqnSymbol;

/// Files per delete statement; keeps the IN-list bounded.
const DELETE_BATCH: usize = 100;

/// Store of file fingerprints and symbol records.
pub struct SymbolStore {
    db: Arc<SqliteStore>,
}

impl SymbolStore {
    pub fn new(db: Arc<SqliteStore>) -> Self {
        Self { db }
    }

    /// All known fingerprints, one full scan.
    pub async fn known_files(&self) -> Result<Vec<FileCheck>> {
        let path = self.db.path().to_path_buf();
        self.db
            .query(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT id, filename, timestamp FROM file_checks")
                    .map_err(|e| SymdexErr::sqlite(&path, e))?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(FileCheck {
                            id: row.get(0)?,
                            filename: row.get(1)?,
                            timestamp: row.get(2)?,
                        })
                    })
                    .map_err(|e| SymdexErr::sqlite(&path, e))?;

                let mut checks = Vec::new();
                for row in rows {
                    checks.push(row.map_err(|e| SymdexErr::sqlite(&path, e))?);
                }
                Ok(checks)
            })
            .await
    }

    /// Fingerprint for one file, if any.
    pub async fn check_for(&self, filename: &str) -> Result<Option<FileCheck>> {
        let path = self.db.path().to_path_buf();
        let filename = filename.to_string();
        self.db
            .query(move |conn| {
                conn.query_row(
                    "SELECT id, filename, timestamp FROM file_checks WHERE filename = ?1",
                    [&filename],
                    |row| {
                        Ok(FileCheck {
                            id: row.get(0)?,
                            filename: row.get(1)?,
                            timestamp: row.get(2)?,
                        })
                    },
                )
                .optional_with_path(&path)
            })
            .await
    }

    /// True iff no fingerprint exists or the stored stamp is strictly
    /// older than `current_millis`.
    pub async fn out_of_date(&self, filename: &str, current_millis: i64) -> Result<bool> {
        Ok(match self.check_for(filename).await? {
            None => true,
            Some(check) => check.changed_since(current_millis),
        })
    }

    /// Insert a fingerprint and its symbol rows in one transaction.
    ///
    /// A unique-constraint violation on a symbol row is logged and the row
    /// skipped; duplicate triples occasionally arise from malformed inputs
    /// and must not abort a refresh. Returns the number of rows inserted.
    pub async fn persist(&self, check: FileCheck, symbols: Vec<FqnSymbol>) -> Result<usize> {
        let path = self.db.path().to_path_buf();
        self.db
            .transaction(move |conn| {
                conn.execute(
                    "INSERT INTO file_checks (filename, timestamp) VALUES (?1, ?2) \
                     ON CONFLICT(filename) DO UPDATE SET timestamp = excluded.timestamp",
                    rusqlite::params![check.filename, check.timestamp],
                )
                .map_err(|e| SymdexErr::sqlite(&path, e))?;

                let mut inserted = 0;
                for symbol in &symbols {
                    let result = conn.execute(
                        "INSERT INTO fqn_symbols \
                         (container, entry, fqn, descriptor, internal, source, line, offset) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        rusqlite::params![
                            symbol.container_uri,
                            symbol.entry_uri,
                            symbol.fqn,
                            symbol.descriptor,
                            symbol.internal,
                            symbol.source_uri,
                            symbol.line,
                            symbol.offset.map(|o| o as i64),
                        ],
                    );
                    match result {
                        Ok(_) => inserted += 1,
                        Err(e) if is_constraint_violation(&e) => {
                            tracing::warn!(fqn = %symbol.fqn, "duplicate symbol triple, skipping");
                        }
                        Err(e) => return Err(SymdexErr::sqlite(&path, e)),
                    }
                }
                Ok(inserted)
            })
            .await
    }

    /// Delete all symbol rows and fingerprints for the given files.
    ///
    /// Each batch of at most 100 files is one transaction. Returns the
    /// number of fingerprints removed.
    pub async fn remove_files(&self, files: Vec<String>) -> Result<usize> {
        let mut removed = 0;
        for batch in files.chunks(DELETE_BATCH) {
            let batch: Vec<String> = batch.to_vec();
            let path = self.db.path().to_path_buf();
            removed += self
                .db
                .transaction(move |conn| {
                    let placeholders = placeholders(batch.len());
                    conn.execute(
                        &format!("DELETE FROM fqn_symbols WHERE container IN ({placeholders})"),
                        params_from_iter(batch.iter()),
                    )
                    .map_err(|e| SymdexErr::sqlite(&path, e))?;
                    let count = conn
                        .execute(
                            &format!("DELETE FROM file_checks WHERE filename IN ({placeholders})"),
                            params_from_iter(batch.iter()),
                        )
                        .map_err(|e| SymdexErr::sqlite(&path, e))?;
                    Ok(count)
                })
                .await?;
        }
        Ok(removed)
    }

    /// Exact-FQN lookup. With duplicate triples across kinds, the class row
    /// wins (smallest id).
    pub async fn find(&self, fqn: &str) -> Result<Option<FqnSymbol>> {
        let path = self.db.path().to_path_buf();
        let fqn = fqn.to_string();
        self.db
            .query(move |conn| {
                conn.query_row(
                    &format!("{SELECT_SYMBOL} WHERE fqn = ?1 ORDER BY id LIMIT 1"),
                    [&fqn],
                    symbol_from_row,
                )
                .optional_with_path(&path)
            })
            .await
    }

    /// Hydrate a ranked FQN list, at most one record per FQN, preserving
    /// input order. Duplicate inputs collapse to a single output.
    pub async fn find_many(&self, fqns: Vec<String>) -> Result<Vec<FqnSymbol>> {
        if fqns.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.db.path().to_path_buf();
        self.db
            .query(move |conn| {
                let mut by_fqn: HashMap<String, FqnSymbol> = HashMap::new();
                let unique: Vec<String> = {
                    let mut seen = HashSet::new();
                    fqns.iter()
                        .filter(|f| seen.insert(f.as_str()))
                        .cloned()
                        .collect()
                };

                for batch in unique.chunks(DELETE_BATCH) {
                    let placeholders = placeholders(batch.len());
                    let mut stmt = conn
                        .prepare(&format!(
                            "{SELECT_SYMBOL} WHERE fqn IN ({placeholders}) ORDER BY id"
                        ))
                        .map_err(|e| SymdexErr::sqlite(&path, e))?;
                    let rows = stmt
                        .query_map(params_from_iter(batch.iter()), symbol_from_row)
                        .map_err(|e| SymdexErr::sqlite(&path, e))?;
                    for row in rows {
                        let symbol = row.map_err(|e| SymdexErr::sqlite(&path, e))?;
                        by_fqn.entry(symbol.fqn.clone()).or_insert(symbol);
                    }
                }

                Ok(unique
                    .iter()
                    .filter_map(|fqn| by_fqn.remove(fqn))
                    .collect())
            })
            .await
    }

    /// Total number of symbol rows.
    pub async fn symbol_count(&self) -> Result<i64> {
        let path = self.db.path().to_path_buf();
        self.db
            .query(move |conn| {
                conn.query_row("SELECT COUNT(*) FROM fqn_symbols", [], |row| row.get(0))
                    .map_err(|e| SymdexErr::sqlite(&path, e))
            })
            .await
    }
}

const SELECT_SYMBOL: &str = "SELECT id, container, entry, fqn, descriptor, internal, \
                             source, line, offset FROM fqn_symbols";

fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<FqnSymbol> {
    Ok(FqnSymbol {
        id: row.get(0)?,
        container_uri: row.get(1)?,
        entry_uri: row.get(2)?,
        fqn: row.get(3)?,
        descriptor: row.get(4)?,
        internal: row.get(5)?,
        source_uri: row.get(6)?,
        line: row.get(7)?,
        offset: row.get::<_, Option<i64>>(8)?.map(|o| o as u64),
    })
}

fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 2);
    for i in 0..count {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
