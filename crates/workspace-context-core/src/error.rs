//! Typed errors for chunking and vector storage.

use thiserror::Error;

/// Configuration errors raised while building or running a [`Chunker`](crate::chunk::Chunker).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("unknown chunk strategy '{0}': expected lines, tokens, or semantic")]
    UnknownStrategy(String),
    #[error("invalid chunk options: {0}")]
    InvalidOptions(String),
}

/// Errors raised by the [`VectorStore`](crate::vector_store::VectorStore).
///
/// A failed operation never leaves the store partially modified.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("embedding dimension mismatch: store has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding is empty")]
    EmptyEmbedding,
    #[error("embedding has zero norm and cannot be normalized")]
    ZeroNorm,
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
