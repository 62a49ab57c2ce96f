//! Full-text search module.
//!
//! Tokenization of identifiers and queries plus the tantivy-backed index.
//! The relational store hydrates whatever FQN keys the index returns.

pub mod index;
pub mod tokenize;

pub use index::TextIndex;
