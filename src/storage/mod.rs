//! Storage module.
//!
//! SQLite is the authoritative store for file fingerprints and symbol
//! metadata; the text index under `crate::search` only holds ranking data.

pub mod sqlite;
pub mod symbols;

pub use sqlite::SqliteStore;
pub use symbols::SymbolStore;
