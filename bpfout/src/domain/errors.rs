//! Structured error types for bpfout
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

/// Errors raised while rendering collected data
///
/// None of these are recoverable: a short buffer means the collection layer
/// and the descriptors disagree, and a failed write means the output stream
/// is gone.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("{what} needs {needed} bytes but only {got} were supplied")]
    ShortBuffer { what: &'static str, needed: usize, got: usize },

    #[error("No histogram buckets for key {0}")]
    MissingKey(String),

    #[error("Invalid type descriptor: {0}")]
    InvalidDescriptor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    pub(crate) fn short(what: &'static str, needed: usize, got: usize) -> Self {
        Self::ShortBuffer { what, needed, got }
    }
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to parse snapshot: {0}")]
    ParseFailed(String),

    #[error("Snapshot item {index} ({item}) failed to render: {source}")]
    RenderFailed {
        index: usize,
        item: &'static str,
        #[source]
        source: RenderError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
