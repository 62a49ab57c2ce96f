//! Error types for the symdex crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SymdexErr>;

/// Errors surfaced by the index subsystem.
///
/// Constraint violations during batch insert are deliberately *not* a
/// variant: they are caught inside the store, logged, and the offending
/// batch skipped so that a refresh always runs to completion.
#[derive(Debug, Error)]
pub enum SymdexErr {
    /// A compiled class unit could not be decoded.
    #[error("malformed class file: {cause}")]
    ClassParse { cause: String },

    /// Filesystem failure on an input file or the cache directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An archive could not be opened or walked.
    #[error("archive error at {path}: {cause}")]
    Zip { path: PathBuf, cause: String },

    /// Relational store failure (connection, transaction, statement).
    #[error("sqlite error at {path}: {cause}")]
    Sqlite { path: PathBuf, cause: String },

    /// Text index failure (writer, commit, query).
    #[error("text index error: {cause}")]
    Index { cause: String },

    /// Invalid configuration value.
    #[error("config error in '{field}': {cause}")]
    Config { field: String, cause: String },
}

impl SymdexErr {
    /// Attach a path to a raw sqlite error.
    pub fn sqlite(path: &std::path::Path, e: rusqlite::Error) -> Self {
        Self::Sqlite {
            path: path.to_path_buf(),
            cause: e.to_string(),
        }
    }

    pub(crate) fn index(e: tantivy::TantivyError) -> Self {
        Self::Index {
            cause: e.to_string(),
        }
    }
}
