//! Symbol extraction from class units.
//!
//! Applies the visibility and ignore filters, resolves source artifacts
//! through the external resolver, and emits one record per class plus one
//! per public method and public field.

use std::path::PathBuf;
use std::sync::Arc;

use crate::classfile::parse_class;
use crate::classfile::Access;
use crate::error::Result;
use crate::types::FqnSymbol;
use crate::vfs::file_uri;
use crate::vfs::is_blacklisted;
use crate::vfs::ClassLocation;

/// FQN fragments produced by compiler-generated members; never indexed.
const IGNORE_FRAGMENTS: &[&str] = &["$$anonfun$", "$worker$"];

/// Maps a package and source filename to an on-disk source artifact.
///
/// Implemented by an external collaborator; the extractor only consumes it.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, package: &str, source_name: &str) -> Option<PathBuf>;
}

/// Resolver that never finds anything. Used when no source metadata exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopResolver;

impl SourceResolver for NopResolver {
    fn resolve(&self, _package: &str, _source_name: &str) -> Option<PathBuf> {
        None
    }
}

/// Byte offsets of line starts within a source artifact.
///
/// Index 0 is byte 0; entry `n` is the byte index of the nth `\n`. Only
/// `\n` is counted, so `\r\n` sources yield offsets pointing at the `\r`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOffsets {
    offsets: Vec<u64>,
}

impl LineOffsets {
    /// Scan a source artifact once and record every line start.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut offsets = vec![0u64];
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'\n' {
                offsets.push(i as u64);
            }
        }
        Self { offsets }
    }

    /// Byte offset of a 1-indexed line, `None` past the end of file.
    pub fn offset(&self, line: u32) -> Option<u64> {
        if line == 0 {
            return None;
        }
        self.offsets.get((line - 1) as usize).copied()
    }
}

/// Extracts symbol records from class units.
pub struct SymbolExtractor {
    resolver: Arc<dyn SourceResolver>,
}

impl SymbolExtractor {
    pub fn new(resolver: Arc<dyn SourceResolver>) -> Self {
        Self { resolver }
    }

    /// Extract all symbol records from one class unit.
    ///
    /// Yields nothing for blacklisted archive entries and non-public
    /// classes. Malformed class bytes surface as an error; the caller logs
    /// and treats the unit as empty. Emission order is the class record
    /// first, then methods in declaration order, then fields in declaration
    /// order.
    pub fn extract(&self, location: &ClassLocation) -> Result<Vec<FqnSymbol>> {
        if let Some(entry) = location.path_within_archive() {
            if is_blacklisted(entry) {
                return Ok(Vec::new());
            }
        }

        let bytes = location.read_bytes()?;
        let parsed = parse_class(&bytes)?;
        if !parsed.is_public() {
            return Ok(Vec::new());
        }

        let container_uri = location.container_uri();
        let entry_uri = location.uri();
        let class_fqn = parsed.fqn();

        let source = self.resolve_source(&parsed.package(), parsed.source_name.as_deref());
        let (source_uri, offsets) = match source {
            Some((path, offsets)) => (Some(file_uri(&path)), offsets),
            None => (None, None),
        };
        let offset_for = |line: Option<u32>| -> Option<u64> {
            let line = line?;
            offsets.as_ref()?.offset(line)
        };

        let mut symbols = Vec::with_capacity(1 + parsed.methods.len() + parsed.fields.len());
        symbols.push(FqnSymbol {
            id: None,
            container_uri: container_uri.clone(),
            entry_uri: entry_uri.clone(),
            fqn: class_fqn.clone(),
            descriptor: None,
            internal: None,
            source_uri: source_uri.clone(),
            line: parsed.source_line,
            offset: offset_for(parsed.source_line),
        });

        for method in &parsed.methods {
            if method.access != Access::Public {
                continue;
            }
            symbols.push(FqnSymbol {
                id: None,
                container_uri: container_uri.clone(),
                entry_uri: entry_uri.clone(),
                fqn: format!("{class_fqn}.{}", method.name),
                descriptor: Some(method.descriptor.clone()),
                internal: None,
                source_uri: source_uri.clone(),
                line: method.line,
                offset: offset_for(method.line),
            });
        }

        for field in &parsed.fields {
            if field.access != Access::Public {
                continue;
            }
            symbols.push(FqnSymbol {
                id: None,
                container_uri: container_uri.clone(),
                entry_uri: entry_uri.clone(),
                fqn: format!("{class_fqn}.{}", field.name),
                descriptor: None,
                internal: Some(parsed.internal_name.clone()),
                source_uri: source_uri.clone(),
                line: None,
                offset: None,
            });
        }

        symbols.retain(|s| !has_ignored_fragment(&s.fqn));
        Ok(symbols)
    }

    /// Resolve the source artifact and build its offset table, once.
    fn resolve_source(
        &self,
        package: &str,
        source_name: Option<&str>,
    ) -> Option<(PathBuf, Option<LineOffsets>)> {
        let source_name = source_name?;
        let path = self.resolver.resolve(package, source_name)?;
        let offsets = match std::fs::read(&path) {
            Ok(bytes) => Some(LineOffsets::from_bytes(&bytes)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "source artifact unreadable");
                None
            }
        };
        Some((path, offsets))
    }
}

fn has_ignored_fragment(fqn: &str) -> bool {
    IGNORE_FRAGMENTS.iter().any(|frag| fqn.contains(frag))
}

/// Fixed resolver useful in tests and single-root servers.
pub struct RootSourceResolver {
    roots: Vec<PathBuf>,
}

impl RootSourceResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl SourceResolver for RootSourceResolver {
    fn resolve(&self, package: &str, source_name: &str) -> Option<PathBuf> {
        let rel: PathBuf = package
            .split('.')
            .filter(|s| !s.is_empty())
            .collect::<PathBuf>()
            .join(source_name);
        self.roots
            .iter()
            .map(|root| root.join(&rel))
            .find(|candidate| candidate.is_file())
    }
}
