use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::snapshot::backend::SnapshotBackend;
use crate::snapshot::error::StoreError;
use crate::snapshot::snapshot_model::{Snapshot, TextDiff};

/// Hex characters of the URL hash embedded in snapshot ids.
pub const URL_HASH_LEN: usize = 8;

/// Sortable UTC timestamp used in snapshot ids.
const ID_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Same-millisecond collisions tolerated before a save gives up.
const MAX_ID_RETRIES: u32 = 1000;

/// Append-only store of page markup captures, keyed by generated id.
///
/// Ordering and identity both come from (url, timestamp); two captures of
/// identical markup are distinct records.
///
/// No locking guards `cleanup` against concurrent `save`/`load`: a record
/// may be deleted just before it is read, in which case the read returns
/// `None`. That is accepted loss, not corruption.
pub struct SnapshotStore {
    backend: Arc<dyn SnapshotBackend>,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self { backend }
    }

    /// Capture markup for a URL at the current time.
    pub async fn save(
        &self,
        url: &str,
        markup: &str,
        test_file: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Snapshot, StoreError> {
        self.save_at(url, markup, test_file, metadata, Utc::now()).await
    }

    /// Capture markup with an explicit timestamp (e.g. importing older captures).
    ///
    /// If the generated id is already taken (two captures of one URL in the
    /// same millisecond) the timestamp is bumped by 1 ms and retried.
    pub async fn save_at(
        &self,
        url: &str,
        markup: &str,
        test_file: Option<&str>,
        metadata: BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Snapshot, StoreError> {
        // Ids carry millisecond precision; truncate so the record round-trips exactly.
        let mut snapshot = Snapshot {
            id: String::new(),
            url: url.to_string(),
            markup: markup.to_string(),
            timestamp: truncate_to_millis(timestamp),
            test_file: test_file.map(String::from),
            metadata,
        };

        let mut attempt = 0;
        loop {
            snapshot.id = snapshot_id(url, &snapshot.timestamp);
            match self.backend.create(&snapshot).await {
                Ok(()) => break,
                Err(StoreError::Duplicate(id)) if attempt < MAX_ID_RETRIES => {
                    debug!(%id, "snapshot id taken, bumping timestamp");
                    snapshot.timestamp += Duration::milliseconds(1);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(id = %snapshot.id, url, bytes = markup.len(), "snapshot saved");
        Ok(snapshot)
    }

    pub async fn load(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        self.backend.read(id).await
    }

    /// Explicit removal. Returns whether a record existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self.backend.delete(id).await?;
        debug!(id, deleted, "snapshot delete");
        Ok(deleted)
    }

    /// Every snapshot with exactly this URL, unordered.
    pub async fn list_by_url(&self, url: &str) -> Result<Vec<Snapshot>, StoreError> {
        let mut all = self.backend.list().await?;
        all.retain(|s| s.url == url);
        Ok(all)
    }

    /// Newest first; ties broken by id so the order is total.
    async fn history(&self, url: &str) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots = self.list_by_url(url).await?;
        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    pub async fn get_latest(&self, url: &str) -> Result<Option<Snapshot>, StoreError> {
        self.get_previous(url, 0).await
    }

    /// The `n`-th snapshot before the latest (`n = 1` is the one just before it).
    pub async fn get_previous(&self, url: &str, n: usize) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.history(url).await?.into_iter().nth(n))
    }

    /// The capture of the same URL immediately preceding `snapshot`.
    pub async fn get_before(&self, snapshot: &Snapshot) -> Result<Option<Snapshot>, StoreError> {
        Ok(self
            .history(&snapshot.url)
            .await?
            .into_iter()
            .find(|s| s.timestamp < snapshot.timestamp))
    }

    /// Snapshots captured for a test file, newest first.
    pub async fn get_by_test_file(&self, test_file: &str) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots = self.backend.list().await?;
        snapshots.retain(|s| s.test_file.as_deref() == Some(test_file));
        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    /// Delete snapshots older than `retention_days`. Returns how many were removed.
    pub async fn cleanup(&self, retention_days: u32) -> Result<usize, StoreError> {
        self.cleanup_at(retention_days, Utc::now()).await
    }

    /// Delete every snapshot with `timestamp < now - retention_days`.
    /// A snapshot exactly at the cutoff is kept.
    pub async fn cleanup_at(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        // A window reaching past the earliest representable time deletes nothing.
        let cutoff = now
            .checked_sub_signed(Duration::days(i64::from(retention_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut deleted = 0;

        for snapshot in self.backend.list().await? {
            if snapshot.timestamp < cutoff && self.backend.delete(&snapshot.id).await? {
                deleted += 1;
            }
        }

        info!(retention_days, %cutoff, deleted, "snapshot cleanup");
        Ok(deleted)
    }

    /// Line-level diff of two snapshots' raw markup, for human-readable summaries.
    ///
    /// `None` if either id is unknown.
    pub async fn compare(&self, id_a: &str, id_b: &str) -> Result<Option<TextDiff>, StoreError> {
        let (Some(a), Some(b)) = (self.load(id_a).await?, self.load(id_b).await?) else {
            return Ok(None);
        };
        Ok(Some(text_diff(&a, &b)))
    }
}

/// `snapshot-{8 hex of sha1(url)}-{YYYYMMDDTHHMMSSmmmZ}`
pub fn snapshot_id(url: &str, timestamp: &DateTime<Utc>) -> String {
    format!(
        "snapshot-{}-{}",
        url_hash(url),
        timestamp.format(ID_TIMESTAMP_FORMAT)
    )
}

pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..URL_HASH_LEN].to_string()
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

fn sort_newest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

fn text_diff(a: &Snapshot, b: &Snapshot) -> TextDiff {
    let lines = |s: &Snapshot| -> Vec<String> {
        s.markup
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    };
    let a_lines = lines(a);
    let b_lines = lines(b);

    let a_set: HashSet<&str> = a_lines.iter().map(String::as_str).collect();
    let b_set: HashSet<&str> = b_lines.iter().map(String::as_str).collect();

    let added: Vec<String> = b_lines
        .iter()
        .filter(|l| !a_set.contains(l.as_str()))
        .cloned()
        .collect();
    let removed: Vec<String> = a_lines
        .iter()
        .filter(|l| !b_set.contains(l.as_str()))
        .cloned()
        .collect();

    TextDiff {
        from_id: a.id.clone(),
        to_id: b.id.clone(),
        added_count: added.len(),
        removed_count: removed.len(),
        added,
        removed,
    }
}
