//! Access to compiled class units on disk and inside archives.
//!
//! Containers come in two physical forms: a loose `.class` file under a
//! class-output directory, and an entry inside a `.jar` archive. Both are
//! identified by URI-style strings so fingerprints and symbol rows stay
//! stable across process restarts.

use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::error::Result;
use crate::error::SymdexErr;

/// Archive-internal prefixes that are never indexed.
const BLACKLIST: &[&str] = &["sun/", "sunw/", "com/sun/"];

/// True iff an archive-internal path lies under a blacklisted prefix.
pub fn is_blacklisted(entry: &str) -> bool {
    BLACKLIST.iter().any(|prefix| entry.starts_with(prefix))
}

/// URI of a loose file: `file:/abs/path`, forward slashes throughout.
pub fn file_uri(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    if normalized.starts_with('/') {
        format!("file:{normalized}")
    } else {
        format!("file:/{normalized}")
    }
}

/// URI of an archive entry: `jar:file:/abs/path.jar!/pkg/Name.class`.
pub fn jar_entry_uri(archive: &Path, entry: &str) -> String {
    format!("jar:{}!/{entry}", file_uri(archive))
}

/// Inverse of [`file_uri`], `None` for non-file URIs.
pub fn path_from_file_uri(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file:").map(PathBuf::from)
}

/// Last-modified time in milliseconds since the epoch.
pub fn last_modified_millis(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok(millis)
}

/// One class unit to read and extract from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLocation {
    /// A loose `.class` file; the container is the file itself.
    File { path: PathBuf },
    /// An entry inside an archive; the container is the archive.
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl ClassLocation {
    /// URI of this specific class unit.
    pub fn uri(&self) -> String {
        match self {
            Self::File { path } => file_uri(path),
            Self::ArchiveEntry { archive, entry } => jar_entry_uri(archive, entry),
        }
    }

    /// Path of the enclosing on-disk file.
    pub fn container_path(&self) -> &Path {
        match self {
            Self::File { path } => path,
            Self::ArchiveEntry { archive, .. } => archive,
        }
    }

    /// URI of the enclosing on-disk file (the fingerprint key).
    pub fn container_uri(&self) -> String {
        file_uri(self.container_path())
    }

    /// Archive-internal path, `None` for loose files.
    pub fn path_within_archive(&self) -> Option<&str> {
        match self {
            Self::File { .. } => None,
            Self::ArchiveEntry { entry, .. } => Some(entry),
        }
    }

    /// Extension of the underlying unit.
    pub fn extension(&self) -> Option<&str> {
        let name = match self {
            Self::File { path } => path.to_str()?,
            Self::ArchiveEntry { entry, .. } => entry,
        };
        name.rsplit_once('.').map(|(_, ext)| ext)
    }

    /// Read the raw bytes of the class unit.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::File { path } => Ok(std::fs::read(path)?),
            Self::ArchiveEntry { archive, entry } => {
                let file = std::fs::File::open(archive)?;
                let mut zip = zip::ZipArchive::new(file).map_err(|e| SymdexErr::Zip {
                    path: archive.clone(),
                    cause: e.to_string(),
                })?;
                let mut entry_file = zip.by_name(entry).map_err(|e| SymdexErr::Zip {
                    path: archive.clone(),
                    cause: format!("{entry}: {e}"),
                })?;
                let mut bytes = Vec::with_capacity(entry_file.size() as usize);
                entry_file.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

/// List the `.class` entries of an archive, blacklist excluded.
pub fn walk_archive_classes(archive: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| SymdexErr::Zip {
        path: archive.to_path_buf(),
        cause: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(|e| SymdexErr::Zip {
            path: archive.to_path_buf(),
            cause: e.to_string(),
        })?;
        let name = entry.name();
        if name.ends_with(".class") && !is_blacklisted(name) {
            entries.push(name.to_string());
        }
    }
    entries.sort();
    Ok(entries)
}

/// List the loose `.class` files under a class-output directory.
pub fn walk_class_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "class"))
        .collect()
}
