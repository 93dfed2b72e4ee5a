//! # Workspace Context Core
//!
//! Pure retrieval logic for Workspace Context: data models, line-oriented
//! chunking, the in-memory vector store, vector math, and the
//! language-model collaborator trait.
//!
//! This crate does no filesystem or network I/O and has no async runtime
//! dependency. Everything that touches the workspace lives in the
//! `workspace-context` crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod vector_store;

pub use chunk::{ChunkOptions, ChunkStrategy, Chunker};
pub use error::{ChunkError, StoreError};
pub use llm::{GenerateRequest, LanguageModel, ToolDefinition};
pub use models::{ContextPiece, ContextResponse, Document, Metadata, PieceKind, SearchResult, TextChunk};
pub use vector_store::{Snapshot, VectorStore};
