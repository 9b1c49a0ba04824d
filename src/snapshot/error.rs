use std::path::PathBuf;

use thiserror::Error;

/// Failures of the snapshot persistence medium.
///
/// A missing snapshot is not an error; lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot serialization failed ({context}): {source}")]
    Serialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot {0} already exists")]
    Duplicate(String),
}
