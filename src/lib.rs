//! Compiled-classpath symbol indexer.
//!
//! Indexes directories of class files and dependency archives so a
//! developer-tooling server can answer fast free-form symbol searches by
//! fully qualified name or by fuzzy/abbreviated query.
//!
//! Two stores share the `(fqn, descriptor, internal)` key: SQLite is
//! authoritative for symbol metadata and file fingerprints, a tantivy
//! index is authoritative for ranking. The refresh coordinator keeps both
//! synchronized with the filesystem, always deleting before re-inserting.

// Core modules
pub mod config;
pub mod error;
pub mod service;
pub mod types;

// Subsystems
pub mod classfile;
pub mod extract;
pub mod refresh;
pub mod search;
pub mod storage;
pub mod vfs;

// Re-exports
pub use config::IndexingConfig;
pub use config::ModuleConfig;
pub use config::SymdexConfig;
pub use error::Result;
pub use error::SymdexErr;
pub use extract::NopResolver;
pub use extract::RootSourceResolver;
pub use extract::SourceResolver;
pub use extract::SymbolExtractor;
pub use refresh::RefreshCoordinator;
pub use search::TextIndex;
pub use service::SearchService;
pub use storage::SqliteStore;
pub use storage::SymbolStore;
pub use types::FileCheck;
pub use types::FqnKey;
pub use types::FqnSymbol;
pub use types::SymbolKind;
