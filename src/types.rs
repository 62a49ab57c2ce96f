//! Core record types shared by the stores and the service.

/// Kind of a symbol record, derived from which optional columns are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Class,
    Method,
    Field,
}

impl SymbolKind {
    /// Short label for display and logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
            Self::Field => "field",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Fingerprint of one on-disk file (loose class file or archive).
///
/// At most one row exists per `filename`. The timestamp is the file's
/// last-modified time in milliseconds at the moment of indexing; staleness
/// is a strict-less-than comparison against the current on-disk value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    /// Database id, `None` before the row is persisted.
    pub id: Option<i64>,
    /// Absolute URI of the file.
    pub filename: String,
    /// Last-modified time in milliseconds since the epoch.
    pub timestamp: i64,
}

impl FileCheck {
    pub fn new(filename: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: None,
            filename: filename.into(),
            timestamp,
        }
    }

    /// True iff `current_millis` is strictly newer than the stored stamp.
    pub fn changed_since(&self, current_millis: i64) -> bool {
        self.timestamp < current_millis
    }
}

/// Key shared by relational rows and index documents.
///
/// `(fqn, descriptor, internal)` is unique across both stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FqnKey {
    pub fqn: String,
    /// Method type descriptor, present iff the record is a method.
    pub descriptor: Option<String>,
    /// Field owner's internal name, present iff the record is a field.
    pub internal: Option<String>,
}

impl FqnKey {
    pub fn class(fqn: impl Into<String>) -> Self {
        Self {
            fqn: fqn.into(),
            descriptor: None,
            internal: None,
        }
    }
}

/// One indexed symbol: a class, a public method, or a public field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FqnSymbol {
    /// Database id, `None` before the row is persisted.
    pub id: Option<i64>,
    /// URI of the enclosing file; equals the fingerprint key.
    pub container_uri: String,
    /// URI of the specific class unit, possibly inside an archive.
    pub entry_uri: String,
    /// Fully qualified name, dotted, nested types `$`-separated.
    pub fqn: String,
    /// Method type descriptor (bytecode grammar), methods only.
    pub descriptor: Option<String>,
    /// Owner internal name, fields only.
    pub internal: Option<String>,
    /// Best-effort source pointer.
    pub source_uri: Option<String>,
    /// 1-indexed source line.
    pub line: Option<u32>,
    /// Byte offset of the line start within the source artifact.
    pub offset: Option<u64>,
}

impl FqnSymbol {
    /// Kind derived from which optional columns are populated.
    pub fn kind(&self) -> SymbolKind {
        if self.descriptor.is_some() {
            SymbolKind::Method
        } else if self.internal.is_some() {
            SymbolKind::Field
        } else {
            SymbolKind::Class
        }
    }

    /// The dual-store key of this record.
    pub fn key(&self) -> FqnKey {
        FqnKey {
            fqn: self.fqn.clone(),
            descriptor: self.descriptor.clone(),
            internal: self.internal.clone(),
        }
    }
}
