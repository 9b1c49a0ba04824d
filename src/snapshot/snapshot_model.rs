use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A captured copy of a page's markup. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub url: String,
    pub markup: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Coarse line-level comparison of two raw markup blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDiff {
    pub from_id: String,
    pub to_id: String,

    /// Lines present only in the later snapshot.
    pub added: Vec<String>,

    /// Lines present only in the earlier snapshot.
    pub removed: Vec<String>,

    pub added_count: usize,
    pub removed_count: usize,
}

impl TextDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn summary(&self) -> String {
        if !self.has_changes() {
            return format!("{} -> {}: no changes", self.from_id, self.to_id);
        }
        format!(
            "{} -> {}: +{} -{} lines",
            self.from_id,
            self.to_id,
            self.added_count, self.removed_count
        )
    }
}
