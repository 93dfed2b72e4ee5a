//! # Workspace Context
//!
//! Retrieval of relevant codebase snippets for a coding assistant.
//!
//! Given a natural-language question about a workspace, the
//! [`ContextManager`](manager::ContextManager) returns the snippets most
//! likely to answer it. With an embedding-capable model it chunks and
//! embeds the workspace into an in-memory vector index; without one (or
//! when vector search fails) it asks the model to pick files from the
//! workspace tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Workspace  │──▶│ Chunk+Embed  │──▶│ VectorStore  │
//! │ walk+globs │   │  (indexing)  │   │  (in-memory) │
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │
//!        ┌──────────┐   ┌───────────────┐    │
//!        │ Gatherer │──▶│ContextManager │◀───┘
//!        └──────────┘   │ cache + index │
//!                       └───────┬───────┘
//!                               ▼
//!                         ┌──────────┐
//!                         │   CLI    │
//!                         │  (wctx)  │
//!                         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wctx index                         # embed the workspace
//! wctx query "where is config parsed"
//! wctx basic                         # tree, git, dependencies
//! wctx export --output index.json    # snapshot the index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`workspace`] | Source file enumeration |
//! | [`gather`] | Tree, git, and manifest facts |
//! | [`summarize`] | Model-backed summarization |
//! | [`manager`] | Cache, indexing, and search |
//! | [`llm`] | Language-model clients |
//! | [`call_context`] | Cancellation and deadlines |
//! | [`snapshot`] | Index export/import files |
//! | [`stats`] | Stats rendering |
//!
//! Data models, chunking, and the vector store live in
//! [`workspace_context_core`].

pub mod call_context;
pub mod config;
pub mod error;
pub mod gather;
pub mod llm;
pub mod manager;
pub mod snapshot;
pub mod stats;
pub mod summarize;
pub mod workspace;

pub use call_context::CallContext;
pub use error::RetrievalError;
pub use manager::{ContextManager, ContextOptions};
pub use workspace_context_core as core;
