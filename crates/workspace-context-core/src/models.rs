//! Core data models shared by the chunker, the vector store, and the
//! context manager.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form document metadata (any JSON value per key).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A contiguous line range of a text, produced by the chunker.
///
/// Line numbers are 1-indexed and inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Zero-based position of this chunk within its source text.
    pub chunk_index: usize,
    pub metadata: BTreeMap<String, String>,
}

impl TextChunk {
    /// Number of lines covered by the chunk.
    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }
}

/// A stored entry of the vector store.
///
/// `embedding` is always L2-normalized once it is inside a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

/// A ranked hit from a vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub document: Document,
    /// Dot product of the normalized query and document vectors, in `[-1, 1]`.
    pub similarity: f32,
}

/// What a [`ContextPiece`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Chunk,
    File,
    Summary,
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PieceKind::Chunk => "chunk",
            PieceKind::File => "file",
            PieceKind::Summary => "summary",
        };
        f.write_str(label)
    }
}

/// One unit of retrieved context handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPiece {
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub relevance: f32,
    pub kind: PieceKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Result of a retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResponse {
    /// Human-readable transcript of all pieces.
    pub content: String,
    pub pieces: Vec<ContextPiece>,
    /// True when served from the query cache.
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_kind_display_matches_serde() {
        for kind in [PieceKind::Chunk, PieceKind::File, PieceKind::Summary] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_line_count_inclusive() {
        let chunk = TextChunk {
            content: "a\nb\nc".to_string(),
            start_line: 4,
            end_line: 6,
            chunk_index: 0,
            metadata: BTreeMap::new(),
        };
        assert_eq!(chunk.line_count(), 3);
    }
}
