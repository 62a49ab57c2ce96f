//! Full-text index over symbol names.
//!
//! One document per class and per public method, keyed by the same
//! `(fqn, descriptor, internal)` triple as the relational rows and tagged
//! with the container URI so a whole file can be removed with one delete
//! term. Ranking uses constant-score tiers: exact simple-name match above
//! simple-name prefix above package-segment prefix above abbreviation.

use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::BooleanQuery;
use tantivy::query::ConstScoreQuery;
use tantivy::query::FuzzyTermQuery;
use tantivy::query::Occur;
use tantivy::query::Query;
use tantivy::query::TermQuery;
use tantivy::schema::IndexRecordOption;
use tantivy::schema::Schema;
use tantivy::schema::SchemaBuilder;
use tantivy::schema::Value;
use tantivy::schema::STORED;
use tantivy::schema::STRING;
use tantivy::schema::TEXT;
use tantivy::Index;
use tantivy::IndexReader;
use tantivy::IndexWriter;
use tantivy::ReloadPolicy;
use tantivy::TantivyDocument;
use tantivy::Term;

use crate::error::Result;
use crate::error::SymdexErr;
use crate::search::tokenize::abbreviation;
use crate::search::tokenize::name_parts;
use crate::search::tokenize::package_of;
use crate::search::tokenize::query_tokens;
use crate::search::tokenize::simple_name;
use crate::types::FileCheck;
use crate::types::FqnKey;
use crate::types::FqnSymbol;
use crate::types::SymbolKind;

const DOC_CLASS: &str = "class";
const DOC_METHOD: &str = "method";

/// Ranking tiers, highest first.
const SCORE_EXACT_SIMPLE: f32 = 4.0;
const SCORE_NAME_PREFIX: f32 = 2.0;
const SCORE_PACKAGE_PREFIX: f32 = 1.0;
const SCORE_ABBREVIATION: f32 = 0.5;

struct Fields {
    doc_type: tantivy::schema::Field,
    fqn: tantivy::schema::Field,
    descriptor: tantivy::schema::Field,
    container: tantivy::schema::Field,
    name: tantivy::schema::Field,
    pkg: tantivy::schema::Field,
    abbrev: tantivy::schema::Field,
    simple: tantivy::schema::Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = SchemaBuilder::default();
    let doc_type = builder.add_text_field("doc_type", STRING);
    let fqn = builder.add_text_field("fqn", STRING | STORED);
    let descriptor = builder.add_text_field("descriptor", STRING | STORED);
    let container = builder.add_text_field("container", STRING | STORED);
    // Pre-tokenized, space-joined lowercase terms.
    let name = builder.add_text_field("name", TEXT);
    let pkg = builder.add_text_field("pkg", TEXT);
    let abbrev = builder.add_text_field("abbrev", STRING);
    let simple = builder.add_text_field("simple", STRING);
    let schema = builder.build();
    (
        schema,
        Fields {
            doc_type,
            fqn,
            descriptor,
            container,
            name,
            pkg,
            abbrev,
            simple,
        },
    )
}

/// Tantivy-backed text index.
///
/// The writer serializes updates behind a mutex; readers see whatever the
/// last `commit` published and never wait for in-flight refreshes.
pub struct TextIndex {
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    fields: Fields,
}

impl TextIndex {
    /// Open or create the index under `dir`.
    pub fn open(dir: &Path, writer_heap_mb: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();
        let mmap = MmapDirectory::open(dir).map_err(|e| SymdexErr::Index {
            cause: e.to_string(),
        })?;
        let index = Index::open_or_create(mmap, schema).map_err(SymdexErr::index)?;
        let writer = index
            .writer(writer_heap_mb.max(15) * 1_000_000)
            .map_err(SymdexErr::index)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(SymdexErr::index)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader,
            fields,
        })
    }

    /// Add documents for one file's symbols.
    ///
    /// Classes and public methods each get a document; fields are
    /// persisted relationally only and never become searchable.
    pub fn add(&self, check: &FileCheck, symbols: &[FqnSymbol]) -> Result<()> {
        let writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for symbol in symbols {
            let doc = match symbol.kind() {
                SymbolKind::Class => self.class_document(check, symbol),
                SymbolKind::Method => self.method_document(check, symbol),
                SymbolKind::Field => continue,
            };
            writer.add_document(doc).map_err(SymdexErr::index)?;
        }
        Ok(())
    }

    /// Delete every document whose container URI is in the set.
    pub fn remove(&self, files: &[String]) -> Result<()> {
        let writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for file in files {
            writer.delete_term(Term::from_field_text(self.fields.container, file));
        }
        Ok(())
    }

    /// Flush pending updates to disk and republish the reader.
    pub fn commit(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            writer.commit().map_err(SymdexErr::index)?;
        }
        self.reader.reload().map_err(SymdexErr::index)?;
        Ok(())
    }

    /// Ranked class search.
    pub fn search_classes(&self, query: &str, max: usize) -> Result<Vec<FqnKey>> {
        let tokens = query_tokens(query);
        if tokens.is_empty() || max == 0 {
            return Ok(Vec::new());
        }
        let mut clauses = self.type_clause(DOC_CLASS);
        for token in &tokens {
            clauses.push((Occur::Must, self.token_query(token)));
        }
        self.run(BooleanQuery::new(clauses), max)
    }

    /// Ranked member search; every query must match the document.
    pub fn search_classes_methods(&self, queries: &[String], max: usize) -> Result<Vec<FqnKey>> {
        let mut clauses = self.type_clause(DOC_METHOD);
        let mut any_token = false;
        for query in queries {
            for token in query_tokens(query) {
                any_token = true;
                clauses.push((Occur::Must, self.token_query(&token)));
            }
        }
        if !any_token || max == 0 {
            return Ok(Vec::new());
        }
        self.run(BooleanQuery::new(clauses), max)
    }

    fn class_document(&self, check: &FileCheck, symbol: &FqnSymbol) -> TantivyDocument {
        let simple = simple_name(&symbol.fqn);
        let mut doc = TantivyDocument::new();
        doc.add_text(self.fields.doc_type, DOC_CLASS);
        doc.add_text(self.fields.fqn, &symbol.fqn);
        doc.add_text(self.fields.container, &check.filename);
        doc.add_text(self.fields.name, name_parts(simple).join(" "));
        let pkg = package_of(&symbol.fqn).to_lowercase().replace('.', " ");
        if !pkg.is_empty() {
            doc.add_text(self.fields.pkg, pkg);
        }
        let abbrev = abbreviation(simple);
        if !abbrev.is_empty() {
            doc.add_text(self.fields.abbrev, abbrev);
        }
        doc.add_text(self.fields.simple, simple.to_lowercase());
        doc
    }

    fn method_document(&self, check: &FileCheck, symbol: &FqnSymbol) -> TantivyDocument {
        // The owning class is the second-to-last segment; its name parts
        // count as package context for member queries.
        let method = simple_name(&symbol.fqn);
        let owner_fqn = package_of(&symbol.fqn);
        let owner_simple = simple_name(owner_fqn);

        let mut pkg_terms: Vec<String> = package_of(owner_fqn)
            .to_lowercase()
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        pkg_terms.extend(name_parts(owner_simple));

        let mut doc = TantivyDocument::new();
        doc.add_text(self.fields.doc_type, DOC_METHOD);
        doc.add_text(self.fields.fqn, &symbol.fqn);
        if let Some(descriptor) = &symbol.descriptor {
            doc.add_text(self.fields.descriptor, descriptor);
        }
        doc.add_text(self.fields.container, &check.filename);
        doc.add_text(self.fields.name, name_parts(method).join(" "));
        if !pkg_terms.is_empty() {
            doc.add_text(self.fields.pkg, pkg_terms.join(" "));
        }
        let abbrev = abbreviation(method);
        if !abbrev.is_empty() {
            doc.add_text(self.fields.abbrev, abbrev);
        }
        doc.add_text(self.fields.simple, method.to_lowercase());
        doc
    }

    fn type_clause(&self, doc_type: &str) -> Vec<(Occur, Box<dyn Query>)> {
        vec![(
            Occur::Must,
            Box::new(TermQuery::new(
                Term::from_field_text(self.fields.doc_type, doc_type),
                IndexRecordOption::Basic,
            )),
        )]
    }

    /// One user token: exact simple name, name-part prefix, package-segment
    /// prefix, or abbreviation prefix, scored by tier.
    fn token_query(&self, token: &str) -> Box<dyn Query> {
        let tier = |query: Box<dyn Query>, score: f32| -> (Occur, Box<dyn Query>) {
            (Occur::Should, Box::new(ConstScoreQuery::new(query, score)))
        };
        let prefix = |field: tantivy::schema::Field| -> Box<dyn Query> {
            Box::new(FuzzyTermQuery::new_prefix(
                Term::from_field_text(field, token),
                0,
                true,
            ))
        };

        let alternatives: Vec<(Occur, Box<dyn Query>)> = vec![
            tier(
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.simple, token),
                    IndexRecordOption::Basic,
                )),
                SCORE_EXACT_SIMPLE,
            ),
            tier(prefix(self.fields.name), SCORE_NAME_PREFIX),
            tier(prefix(self.fields.pkg), SCORE_PACKAGE_PREFIX),
            tier(prefix(self.fields.abbrev), SCORE_ABBREVIATION),
        ];
        Box::new(BooleanQuery::new(alternatives))
    }

    fn run(&self, query: BooleanQuery, max: usize) -> Result<Vec<FqnKey>> {
        let searcher = self.reader.searcher();
        let top = searcher
            .search(&query, &TopDocs::with_limit(max))
            .map_err(SymdexErr::index)?;

        let mut keys = Vec::with_capacity(top.len());
        for (_score, address) in top {
            let doc: TantivyDocument = searcher.doc(address).map_err(SymdexErr::index)?;
            let fqn = doc
                .get_first(self.fields.fqn)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let descriptor = doc
                .get_first(self.fields.descriptor)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            keys.push(FqnKey {
                fqn,
                descriptor,
                internal: None,
            });
        }
        Ok(keys)
    }
}
