//! Configuration for the search-and-index subsystem.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::SymdexErr;

/// Version suffix of the persisted state directories.
///
/// A schema change in either store bumps this and abandons the old
/// directories.
pub const STATE_VERSION: &str = "1.0";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymdexConfig {
    /// Writable directory holding `index-{VERSION}/` and `sql-{VERSION}/`.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Modules whose compiled output and dependencies are indexed.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,

    /// Platform standard library archive, if any.
    #[serde(default)]
    pub java_lib: Option<PathBuf>,

    /// Indexing knobs.
    #[serde(default)]
    pub indexing: IndexingConfig,
}

impl Default for SymdexConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            modules: BTreeMap::new(),
            java_lib: None,
            indexing: IndexingConfig::default(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("symdex")
}

/// One module's compiled outputs and dependency archives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleConfig {
    /// Class-output directories, walked recursively.
    #[serde(default)]
    pub target_dirs: Vec<PathBuf>,
    /// Test class-output directories, walked recursively.
    #[serde(default)]
    pub test_target_dirs: Vec<PathBuf>,
    /// Compile-time dependency archives.
    #[serde(default)]
    pub compile_jars: Vec<PathBuf>,
    /// Test-time dependency archives.
    #[serde(default)]
    pub test_jars: Vec<PathBuf>,
}

/// Indexing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexingConfig {
    /// Files per delete batch during refresh.
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: i32,

    /// Heap handed to the text-index writer, in megabytes.
    #[serde(default = "default_writer_heap_mb")]
    pub writer_heap_mb: i32,

    /// Concurrent refresh jobs. Zero means the available parallelism count.
    #[serde(default)]
    pub max_parallel_jobs: i32,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            delete_batch_size: default_delete_batch_size(),
            writer_heap_mb: default_writer_heap_mb(),
            max_parallel_jobs: 0,
        }
    }
}

fn default_delete_batch_size() -> i32 {
    100
}
fn default_writer_heap_mb() -> i32 {
    50
}

impl IndexingConfig {
    /// Validate numeric knobs.
    pub fn validate(&self) -> Result<()> {
        if self.delete_batch_size <= 0 {
            return Err(SymdexErr::Config {
                field: "indexing.delete_batch_size".to_string(),
                cause: format!("must be positive, got {}", self.delete_batch_size),
            });
        }
        if self.writer_heap_mb <= 0 {
            return Err(SymdexErr::Config {
                field: "indexing.writer_heap_mb".to_string(),
                cause: format!("must be positive, got {}", self.writer_heap_mb),
            });
        }
        if self.max_parallel_jobs < 0 {
            return Err(SymdexErr::Config {
                field: "indexing.max_parallel_jobs".to_string(),
                cause: format!("must be >= 0, got {}", self.max_parallel_jobs),
            });
        }
        Ok(())
    }

    /// Effective worker count for refresh jobs.
    pub fn parallelism(&self) -> usize {
        if self.max_parallel_jobs > 0 {
            self.max_parallel_jobs as usize
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
        }
    }
}

impl SymdexConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| SymdexErr::Config {
            field: path.display().to_string(),
            cause: e.to_string(),
        })?;
        config.indexing.validate()?;
        Ok(config)
    }

    /// Directory of the text-index segment files.
    pub fn index_dir(&self) -> PathBuf {
        self.cache_dir.join(format!("index-{STATE_VERSION}"))
    }

    /// Directory of the relational database files.
    pub fn sql_dir(&self) -> PathBuf {
        self.cache_dir.join(format!("sql-{STATE_VERSION}"))
    }

    /// All archive dependencies across modules, plus the platform library.
    pub fn all_jars(&self) -> Vec<PathBuf> {
        let mut jars: Vec<PathBuf> = self
            .modules
            .values()
            .flat_map(|m| m.compile_jars.iter().chain(m.test_jars.iter()).cloned())
            .collect();
        if let Some(lib) = &self.java_lib {
            jars.push(lib.clone());
        }
        jars.sort();
        jars.dedup();
        jars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validates() {
        IndexingConfig::default().validate().unwrap();
        assert!(IndexingConfig::default().parallelism() >= 1);
    }

    #[test]
    fn rejects_bad_batch_size() {
        let config = IndexingConfig {
            delete_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn state_dirs_carry_version() {
        let config = SymdexConfig {
            cache_dir: PathBuf::from("/tmp/cache"),
            ..Default::default()
        };
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/cache/index-1.0"));
        assert_eq!(config.sql_dir(), PathBuf::from("/tmp/cache/sql-1.0"));
    }

    #[test]
    fn all_jars_are_deduped() {
        let shared = PathBuf::from("/deps/scalatest.jar");
        let mut modules = BTreeMap::new();
        modules.insert(
            "a".to_string(),
            ModuleConfig {
                compile_jars: vec![shared.clone()],
                test_jars: vec![shared.clone()],
                ..Default::default()
            },
        );
        let config = SymdexConfig {
            modules,
            java_lib: Some(PathBuf::from("/jdk/rt.jar")),
            ..Default::default()
        };
        assert_eq!(config.all_jars().len(), 2);
    }
}
