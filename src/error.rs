//! Errors surfaced by the retrieval path.
//!
//! Everything else in the crate uses `anyhow`; these variants exist so
//! callers can tell an aborted call from a failed one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to list workspace files: {0:#}")]
    FileListing(#[source] anyhow::Error),

    /// Both search strategies failed; each field names what went wrong.
    #[error("context search failed (vector: {vector}; fallback: {fallback})")]
    Search { vector: String, fallback: String },
}

impl RetrievalError {
    /// True for cancellation and deadline expiry.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Recover an abort that was wrapped into an `anyhow::Error` on its way up.
    pub(crate) fn aborted_from(err: &anyhow::Error) -> Option<Self> {
        match err.downcast_ref::<RetrievalError>() {
            Some(Self::Cancelled) => Some(Self::Cancelled),
            Some(Self::DeadlineExceeded) => Some(Self::DeadlineExceeded),
            _ => None,
        }
    }
}
