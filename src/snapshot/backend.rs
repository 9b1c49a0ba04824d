use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::snapshot::error::StoreError;
use crate::snapshot::snapshot_model::Snapshot;

/// Durable medium behind the snapshot store.
///
/// Addressed by generated id only. There is no index by URL: callers list
/// everything and filter, so listing is O(total stored snapshots).
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Persist a new record. Fails with [`StoreError::Duplicate`] if the id exists.
    async fn create(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    async fn read(&self, id: &str) -> Result<Option<Snapshot>, StoreError>;

    async fn list(&self) -> Result<Vec<Snapshot>, StoreError>;

    /// Returns whether a record was actually removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

// ============================================================================
// Filesystem backend: one JSON file per snapshot
// ============================================================================

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` for ids that could escape the snapshot directory.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return None;
        }
        Some(self.dir.join(format!("{id}.json")))
    }

    /// Hidden, non-`.json` name in the same directory, unique per call.
    fn staging_path(&self, id: &str) -> PathBuf {
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{id}.{}.{seq}.tmp", std::process::id()))
    }

    async fn read_file(path: &Path) -> Result<Option<Snapshot>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            // Deleted by a concurrent cleanup between list and read.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Serialize {
                context: path.display().to_string(),
                source,
            })
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn write_new_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(io_err(path))?;
    file.write_all(bytes).await.map_err(io_err(path))?;
    file.sync_all().await.map_err(io_err(path))
}

#[async_trait]
impl SnapshotBackend for FsBackend {
    async fn create(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = self
            .path_for(&snapshot.id)
            .ok_or_else(|| StoreError::Io {
                path: self.dir.join(&snapshot.id),
                source: std::io::Error::new(ErrorKind::InvalidInput, "invalid snapshot id"),
            })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Serialize {
            context: snapshot.id.clone(),
            source,
        })?;

        // Stage the full record, then link it into place: readers never see a
        // partial file and an existing id is never overwritten.
        let staged = self.staging_path(&snapshot.id);
        let result = match write_new_file(&staged, &json).await {
            Ok(()) => match tokio::fs::hard_link(&staged, &path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    Err(StoreError::Duplicate(snapshot.id.clone()))
                }
                Err(source) => Err(StoreError::Io {
                    path: path.clone(),
                    source,
                }),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&staged).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %staged.display(), error = %e, "could not remove staged snapshot file");
            }
        }

        if result.is_ok() {
            debug!(id = %snapshot.id, path = %path.display(), "snapshot written");
        }
        result
    }

    async fn read(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        match self.path_for(id) {
            Some(path) => Self::read_file(&path).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Snapshot>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&self.dir))? {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match Self::read_file(&path).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(StoreError::Serialize { context, source }) => {
                    warn!(file = %context, error = %source, "skipping unreadable snapshot file");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(snapshots)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Some(path) = self.path_for(id) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<String, Snapshot>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotBackend for MemoryBackend {
    async fn create(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&snapshot.id) {
            return Err(StoreError::Duplicate(snapshot.id.clone()));
        }
        records.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Snapshot>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }
}
