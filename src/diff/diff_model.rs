use serde::{Deserialize, Serialize};

use crate::dom::dom_model::ElementInfo;

/// Structural comparison of two extractions, keyed by CSS path.
///
/// CSS paths are an approximate identity: an element whose `:nth-child`
/// position shifts shows up as one removal plus one addition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: Vec<ElementInfo>,
    pub removed: Vec<ElementInfo>,
    pub modified: Vec<ElementChange>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// One-line summary, e.g. `2 added, 1 removed, 0 modified`.
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} removed, {} modified",
            self.added.len(),
            self.removed.len(),
            self.modified.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementChange {
    pub before: ElementInfo,
    pub after: ElementInfo,

    /// One entry per differing category, in order: text, id, classes.
    pub changes: Vec<String>,
}
