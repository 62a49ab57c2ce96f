//! Refresh coordination.
//!
//! Reconciles on-disk state with the stores: classifies every configured
//! base as fresh, stale, or unchanged, runs the delete jobs to completion,
//! then the index jobs, and commits the text index exactly once.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;

use crate::config::SymdexConfig;
use crate::error::Result;
use crate::error::SymdexErr;
use crate::extract::SymbolExtractor;
use crate::search::TextIndex;
use crate::storage::SymbolStore;
use crate::types::FileCheck;
use crate::types::FqnSymbol;
use crate::vfs;
use crate::vfs::ClassLocation;

/// One file to (re)index: a loose class file or a whole archive.
#[derive(Debug, Clone, PartialEq, Eq)]
enum IndexTarget {
    Loose(PathBuf),
    Archive(PathBuf),
}

impl IndexTarget {
    fn path(&self) -> &std::path::Path {
        match self {
            Self::Loose(path) | Self::Archive(path) => path,
        }
    }

    fn uri(&self) -> String {
        vfs::file_uri(self.path())
    }
}

/// Drives refresh cycles over the configured bases.
pub struct RefreshCoordinator {
    config: SymdexConfig,
    store: Arc<SymbolStore>,
    index: Arc<TextIndex>,
    extractor: Arc<SymbolExtractor>,
    /// Bounds concurrent jobs so queries never stall behind batch work.
    jobs: Arc<Semaphore>,
}

impl RefreshCoordinator {
    pub fn new(
        config: SymdexConfig,
        store: Arc<SymbolStore>,
        index: Arc<TextIndex>,
        extractor: Arc<SymbolExtractor>,
        jobs: Arc<Semaphore>,
    ) -> Self {
        Self {
            config,
            store,
            index,
            extractor,
            jobs,
        }
    }

    /// Reconcile stores with the filesystem.
    ///
    /// Returns `(deleted, indexed)`: the number of stale fingerprints
    /// removed and the number of bases (re)indexed. Per-job failures are
    /// logged and never abort the cycle.
    pub async fn refresh(&self) -> Result<(usize, usize)> {
        let started = Instant::now();

        // Phase 1: classify, single-threaded.
        let known = self.store.known_files().await?;
        let targets = self.scan_bases();
        let configured: HashSet<String> = targets.iter().map(|t| t.uri()).collect();

        let stale: Vec<String> = known
            .iter()
            .filter(|check| is_stale(check, &configured))
            .map(|check| check.filename.clone())
            .collect();

        let mut to_index = Vec::new();
        for target in targets {
            let uri = target.uri();
            let millis = match vfs::last_modified_millis(target.path()) {
                Ok(millis) => millis,
                Err(e) => {
                    tracing::warn!(path = %target.path().display(), error = %e, "unreadable base, skipping");
                    continue;
                }
            };
            if self.store.out_of_date(&uri, millis).await? {
                to_index.push((target, millis));
            }
        }

        let deleted = stale.len();
        let indexed = to_index.len();
        tracing::debug!(deleted, indexed, "refresh classification done");

        // Phase 2: all deletes complete before any insert may run, or a
        // simultaneously stale and re-indexed file would race the unique
        // constraint.
        self.run_deletes(stale).await;

        // Phase 3: index jobs.
        let mut handles = Vec::with_capacity(to_index.len());
        for (target, millis) in to_index {
            let permit = self.jobs.clone().acquire_owned().await.expect("pool closed");
            let store = self.store.clone();
            let index = self.index.clone();
            let extractor = self.extractor.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = index_one(&store, &index, &extractor, &target, millis).await {
                    tracing::warn!(uri = %target.uri(), error = %e, "index job failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        // Phase 4: single commit for the whole cycle.
        let index = self.index.clone();
        spawn_blocking(move || index.commit())
            .await
            .map_err(|e| SymdexErr::Index {
                cause: format!("commit task failed: {e}"),
            })??;

        tracing::info!(
            deleted,
            indexed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh complete"
        );
        Ok((deleted, indexed))
    }

    /// Delete batches run concurrently but are all awaited here.
    async fn run_deletes(&self, stale: Vec<String>) {
        let batch_size = self.config.indexing.delete_batch_size as usize;
        let mut handles = Vec::new();
        for batch in stale.chunks(batch_size) {
            let batch: Vec<String> = batch.to_vec();
            let permit = self.jobs.clone().acquire_owned().await.expect("pool closed");
            let store = self.store.clone();
            let index = self.index.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = delete_batch(&store, &index, batch).await {
                    tracing::warn!(error = %e, "delete job failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Enumerate configured bases: module output directories expand to
    /// their loose class files; archives stand for themselves.
    fn scan_bases(&self) -> Vec<IndexTarget> {
        let mut targets = Vec::new();
        for module in self.config.modules.values() {
            for dir in module.target_dirs.iter().chain(&module.test_target_dirs) {
                for file in vfs::walk_class_files(dir) {
                    targets.push(IndexTarget::Loose(file));
                }
            }
        }
        for jar in self.config.all_jars() {
            if jar.is_file() {
                targets.push(IndexTarget::Archive(jar));
            }
        }
        targets
    }
}

/// A fingerprint is stale when its file vanished, aged past the stored
/// stamp, or is an archive no longer in the configuration.
fn is_stale(check: &FileCheck, configured: &HashSet<String>) -> bool {
    let Some(path) = vfs::path_from_file_uri(&check.filename) else {
        return true;
    };
    if !path.exists() {
        return true;
    }
    if let Ok(millis) = vfs::last_modified_millis(&path) {
        if check.changed_since(millis) {
            return true;
        }
    }
    let is_archive = path.extension().is_some_and(|ext| ext == "jar");
    is_archive && !configured.contains(&check.filename)
}

/// Index one on-disk file outside a refresh cycle (listener path).
pub(crate) async fn index_file(
    store: &SymbolStore,
    index: &Arc<TextIndex>,
    extractor: &Arc<SymbolExtractor>,
    path: &std::path::Path,
) -> Result<()> {
    let target = if path.extension().is_some_and(|ext| ext == "jar") {
        IndexTarget::Archive(path.to_path_buf())
    } else {
        IndexTarget::Loose(path.to_path_buf())
    };
    let millis = vfs::last_modified_millis(target.path())?;
    index_one(store, index, extractor, &target, millis).await
}

/// Remove one batch from the text index first, then the relational store.
pub(crate) async fn delete_batch(
    store: &SymbolStore,
    index: &Arc<TextIndex>,
    batch: Vec<String>,
) -> Result<()> {
    let index = index.clone();
    let files = batch.clone();
    spawn_blocking(move || index.remove(&files))
        .await
        .map_err(|e| SymdexErr::Index {
            cause: format!("delete task failed: {e}"),
        })??;
    store.remove_files(batch).await?;
    Ok(())
}

/// Extract and persist one base into both stores.
async fn index_one(
    store: &SymbolStore,
    index: &Arc<TextIndex>,
    extractor: &Arc<SymbolExtractor>,
    target: &IndexTarget,
    millis: i64,
) -> Result<()> {
    let symbols = match extract_target(extractor, target).await {
        Ok(symbols) => symbols,
        // Unreadable inputs skip the fingerprint so the next cycle retries.
        Err(e @ (SymdexErr::Io(_) | SymdexErr::Zip { .. })) => {
            tracing::warn!(uri = %target.uri(), error = %e, "unreadable input, skipping");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let check = FileCheck::new(target.uri(), millis);
    store.persist(check.clone(), symbols.clone()).await?;

    let index = index.clone();
    spawn_blocking(move || index.add(&check, &symbols))
        .await
        .map_err(|e| SymdexErr::Index {
            cause: format!("index task failed: {e}"),
        })??;
    Ok(())
}

/// Run extraction on the blocking pool; malformed class units contribute
/// no symbols but still fingerprint the file.
async fn extract_target(
    extractor: &Arc<SymbolExtractor>,
    target: &IndexTarget,
) -> Result<Vec<FqnSymbol>> {
    let extractor = extractor.clone();
    let target = target.clone();
    spawn_blocking(move || match &target {
        IndexTarget::Loose(path) => {
            let location = ClassLocation::File { path: path.clone() };
            match extractor.extract(&location) {
                Ok(symbols) => Ok(symbols),
                Err(SymdexErr::ClassParse { cause }) => {
                    tracing::debug!(uri = %location.uri(), %cause, "malformed class, no symbols");
                    Ok(Vec::new())
                }
                Err(e) => Err(e),
            }
        }
        IndexTarget::Archive(path) => {
            let mut symbols = Vec::new();
            for entry in vfs::walk_archive_classes(path)? {
                let location = ClassLocation::ArchiveEntry {
                    archive: path.clone(),
                    entry,
                };
                match extractor.extract(&location) {
                    Ok(batch) => symbols.extend(batch),
                    Err(SymdexErr::ClassParse { cause }) => {
                        tracing::debug!(uri = %location.uri(), %cause, "malformed entry, skipping");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(symbols)
        }
    })
    .await
    .map_err(|e| SymdexErr::Index {
        cause: format!("extract task failed: {e}"),
    })?
}
