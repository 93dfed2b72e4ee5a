//! Line-oriented text chunker.
//!
//! Splits source text into overlapping [`TextChunk`]s under one of three
//! strategies:
//!
//! | Strategy | Window bound | Overlap |
//! |----------|--------------|---------|
//! | [`ChunkStrategy::Lines`] | `chunk_size` lines | `overlap` lines |
//! | [`ChunkStrategy::Tokens`] | `max_tokens` whitespace-separated words | `overlap` trailing lines |
//! | [`ChunkStrategy::Semantic`] | `chunk_size` lines, cut at code boundaries | `min(overlap, 5)` lines |
//!
//! Every chunk records its inclusive 1-indexed line range, a zero-based
//! sequential index, the strategy that produced it, and a SHA-256 hash of
//! its content. Chunking is deterministic: the same text and options always
//! produce the same chunks.
//!
//! # Semantic Boundaries
//!
//! A break point is a line position where a new chunk may begin:
//!
//! 1. before a declaration line (`fn`, `func`, `def`, `class`, `struct`, ...),
//! 2. after a line holding only a closing brace,
//! 3. before a long comment line,
//! 4. after a blank line that sits between two non-blank lines.
//!
//! Lines are accumulated up to the last break point that keeps the chunk
//! within `chunk_size` lines. When no break point fits, the chunk is cut
//! hard at `chunk_size`.
//!
//! # Example
//!
//! ```rust
//! use workspace_context_core::chunk::{ChunkOptions, ChunkStrategy, Chunker};
//!
//! let text = (1..=220).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
//! let chunker = Chunker::new(ChunkOptions {
//!     strategy: ChunkStrategy::Lines,
//!     chunk_size: 100,
//!     overlap: 10,
//!     ..ChunkOptions::default()
//! })
//! .unwrap();
//! let starts: Vec<usize> = chunker.chunk_text(&text).iter().map(|c| c.start_line).collect();
//! assert_eq!(starts, vec![1, 91, 181]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::ChunkError;
use crate::models::TextChunk;

/// Upper bound on the step-back between consecutive semantic chunks.
const MAX_SEMANTIC_OVERLAP: usize = 5;

/// Comment lines at least this long (trimmed, in bytes) count as break points.
const LONG_COMMENT_CHARS: usize = 60;

static DECLARATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:(?:pub(?:\([^)]*\))?|export|default|public|private|protected|internal|static|abstract|final|async|unsafe|extern(?:\s+"[^"]*")?|const)\s+)*(?:fn|func|function|def|class|struct|enum|trait|impl|interface|type|mod|module|namespace)\b"#,
    )
    .expect("declaration regex must compile")
});

static CLOSING_BRACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\}\s*$").expect("closing brace regex must compile"));

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?://|/\*|\*|#(?:\s|$)|--|;;)").expect("comment regex must compile")
});

/// How text is split into chunks.
///
/// The set is closed; every consumer matches it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkStrategy {
    /// Fixed-size line windows.
    Lines,
    /// Windows bounded by an approximate token budget.
    Tokens,
    /// Line windows cut at declaration, brace, comment, and paragraph boundaries.
    Semantic,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Lines => "lines",
            ChunkStrategy::Tokens => "tokens",
            ChunkStrategy::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lines" | "by-lines" | "by_lines" => Ok(ChunkStrategy::Lines),
            "tokens" | "by-tokens" | "by_tokens" => Ok(ChunkStrategy::Tokens),
            "semantic" | "by-semantic-boundaries" | "by_semantic_boundaries" => {
                Ok(ChunkStrategy::Semantic)
            }
            _ => Err(ChunkError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Chunker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOptions {
    pub strategy: ChunkStrategy,
    /// Window size in lines (`Lines`, `Semantic`).
    pub chunk_size: usize,
    /// Overlap in lines between consecutive chunks.
    pub overlap: usize,
    /// Token budget per chunk (`Tokens`).
    pub max_tokens: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Semantic,
            chunk_size: 150,
            overlap: 15,
            max_tokens: 512,
        }
    }
}

/// Splits text into [`TextChunk`]s according to [`ChunkOptions`].
#[derive(Debug, Clone)]
pub struct Chunker {
    options: ChunkOptions,
}

impl Chunker {
    /// Build a chunker, validating the options.
    ///
    /// # Errors
    ///
    /// [`ChunkError::InvalidOptions`] when `chunk_size` is zero, or when the
    /// token strategy is selected with a zero `max_tokens`.
    pub fn new(options: ChunkOptions) -> Result<Self, ChunkError> {
        if options.chunk_size == 0 {
            return Err(ChunkError::InvalidOptions(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if options.strategy == ChunkStrategy::Tokens && options.max_tokens == 0 {
            return Err(ChunkError::InvalidOptions(
                "max_tokens must be > 0 for the tokens strategy".to_string(),
            ));
        }
        Ok(Self { options })
    }

    /// Split `text` into chunks. Blank input yields no chunks.
    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        self.chunk_text_with(text, &BTreeMap::new())
    }

    /// Split `text` into chunks, copying `base` into every chunk's metadata.
    pub fn chunk_text_with(&self, text: &str, base: &BTreeMap<String, String>) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let lines: Vec<&str> = text.lines().collect();

        let windows = match self.options.strategy {
            ChunkStrategy::Lines => self.line_windows(lines.len()),
            ChunkStrategy::Tokens => self.token_windows(&lines),
            ChunkStrategy::Semantic => self.semantic_windows(&lines),
        };

        windows
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| self.make_chunk(&lines, start, end, index, base))
            .collect()
    }

    /// Fixed windows advancing by `chunk_size - overlap`.
    fn line_windows(&self, total: usize) -> Vec<(usize, usize)> {
        let size = self.options.chunk_size;
        let step = size.saturating_sub(self.options.overlap);

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + size).min(total);
            windows.push((start, end));
            if end >= total || step == 0 {
                break;
            }
            start += step;
        }
        windows
    }

    /// Windows bounded by `max_tokens`; each holds at least one line.
    fn token_windows(&self, lines: &[&str]) -> Vec<(usize, usize)> {
        let total = lines.len();
        let budget = self.options.max_tokens;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < total {
            let mut end = start;
            let mut tokens = 0;
            while end < total {
                let line_tokens = estimate_tokens(lines[end]);
                if end > start && tokens + line_tokens > budget {
                    break;
                }
                tokens += line_tokens;
                end += 1;
            }
            windows.push((start, end));
            if end >= total {
                break;
            }
            start = end.saturating_sub(self.options.overlap).max(start + 1);
        }
        windows
    }

    fn semantic_windows(&self, lines: &[&str]) -> Vec<(usize, usize)> {
        let total = lines.len();
        let size = self.options.chunk_size;
        let step_back = self.options.overlap.min(MAX_SEMANTIC_OVERLAP);
        let breaks = break_points(lines);

        let mut windows = Vec::new();
        let mut start = 0;
        while start < total {
            let end = if total - start <= size {
                total
            } else {
                let limit = start + size;
                let idx = breaks.partition_point(|&p| p <= limit);
                match idx.checked_sub(1).map(|i| breaks[i]) {
                    Some(p) if p > start => p,
                    _ => limit,
                }
            };
            windows.push((start, end));
            if end >= total {
                break;
            }
            start = end.saturating_sub(step_back).max(start + 1);
        }
        windows
    }

    fn make_chunk(
        &self,
        lines: &[&str],
        start: usize,
        end: usize,
        index: usize,
        base: &BTreeMap<String, String>,
    ) -> TextChunk {
        let content = lines[start..end].join("\n");

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let mut metadata = base.clone();
        metadata.insert("strategy".to_string(), self.options.strategy.to_string());
        metadata.insert("content_hash".to_string(), hash);

        TextChunk {
            content,
            start_line: start + 1,
            end_line: end,
            chunk_index: index,
            metadata,
        }
    }
}

/// Approximate token count: whitespace-separated words.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Sorted, de-duplicated 0-based line positions where a new chunk may begin.
fn break_points(lines: &[&str]) -> Vec<usize> {
    let total = lines.len();
    let mut points = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if is_declaration(line) || is_long_comment(line) {
            points.push(i);
        }
        if CLOSING_BRACE_RE.is_match(line) {
            points.push(i + 1);
        }
        if line.trim().is_empty()
            && i > 0
            && i + 1 < total
            && !lines[i - 1].trim().is_empty()
            && !lines[i + 1].trim().is_empty()
        {
            points.push(i + 1);
        }
    }

    points.retain(|&p| p > 0 && p < total);
    points.sort_unstable();
    points.dedup();
    points
}

fn is_declaration(line: &str) -> bool {
    DECLARATION_RE.is_match(line)
}

fn is_long_comment(line: &str) -> bool {
    line.trim().len() >= LONG_COMMENT_CHARS && COMMENT_RE.is_match(line)
}
