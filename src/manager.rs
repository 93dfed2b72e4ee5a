//! The context manager: cache, index lifecycle, and search strategy.
//!
//! # Retrieval Pipeline
//!
//! ```text
//! query ─▶ cache? ──hit──▶ response (cached = true)
//!            │ miss
//!            ▼
//!     index fresh? ──no──▶ re-index (one at a time)
//!            │
//!            ▼
//!     vector search ──fails / no embeddings──▶ model picks files
//!            │                                       │
//!            ▼                                       ▼
//!        format transcript ◀─────────────────────────┘
//!            │
//!            ▼
//!        cache + response (cached = false)
//! ```
//!
//! # Locking
//!
//! The query cache and the index state sit behind separate `RwLock`s. A
//! tokio `Mutex` serializes re-index runs; whoever acquires it re-checks
//! freshness first, so a burst of queries against a stale index triggers
//! exactly one re-index. The vector store has its own lock.
//!
//! # Cache Eviction
//!
//! When the cache is full, the entry with the oldest insertion timestamp is
//! dropped. Hits never refresh timestamps. Expired entries are removed
//! lazily when looked up.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use workspace_context_core::{
    ChunkOptions, ChunkStrategy, Chunker, ContextPiece, ContextResponse, GenerateRequest,
    LanguageModel, Metadata, PieceKind, SearchResult, Snapshot, StoreError, TextChunk, VectorStore,
};

use crate::call_context::CallContext;
use crate::config::default_include_globs;
use crate::error::RetrievalError;
use crate::gather::{GatheredContext, Gatherer};
use crate::summarize::{Summarizer, SummaryStyle};
use crate::workspace::Workspace;

/// Maximum age of an index before it is rebuilt.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Fallback files larger than this are narrowed to their best chunk.
pub const FALLBACK_CHUNK_THRESHOLD: usize = 5 * 1024;

/// Piece content longer than this is cut in the transcript.
pub const MAX_PIECE_CHARS: usize = 2000;

pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Vector search fetches this many candidates per requested result.
const CANDIDATE_MULTIPLIER: usize = 2;

/// Relevance given to files the model selected as a whole.
const SELECTED_FILE_RELEVANCE: f32 = 1.0;

const FILE_SELECTION_SYSTEM_PROMPT: &str =
    "You help locate source files in a codebase. Answer only with file paths taken from the \
     structure you are given.";

static LIST_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]\s*|\d+[.)]\s*)+").expect("list marker regex"));

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub max_cache_size: usize,
    pub cache_timeout: Duration,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_strategy: ChunkStrategy,
    pub max_tokens: usize,
    pub summary_max_length: usize,
    pub summary_style: SummaryStyle,
    /// Fixed embedding dimension; `None` adopts the first embedding's.
    pub vector_dimension: Option<usize>,
    pub generation_model: String,
    pub max_file_bytes: u64,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_cache_size: 100,
            cache_timeout: Duration::from_secs(30 * 60),
            chunk_size: 150,
            chunk_overlap: 15,
            chunk_strategy: ChunkStrategy::Semantic,
            max_tokens: 512,
            summary_max_length: 500,
            summary_style: SummaryStyle::Technical,
            vector_dimension: None,
            generation_model: "llama3".to_string(),
            max_file_bytes: 1024 * 1024,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

/// A cached retrieval result, keyed by the exact query string.
#[derive(Debug, Clone)]
pub struct CachedContext {
    pub content: String,
    pub pieces: Vec<ContextPiece>,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub result_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct IndexState {
    indexed: bool,
    last_index_time: Option<DateTime<Utc>>,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_embedded: usize,
    pub chunks_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextStats {
    pub cache_size: usize,
    pub max_cache_size: usize,
    pub indexed: bool,
    pub last_index_time: Option<DateTime<Utc>>,
    pub vector_store_size: usize,
}

/// Embedding-free workspace overview plus index state.
#[derive(Debug, Clone, Serialize)]
pub struct ContextInfo {
    #[serde(flatten)]
    pub gathered: GatheredContext,
    pub indexed: bool,
    pub last_index_time: Option<DateTime<Utc>>,
    pub vector_store_size: usize,
}

pub struct ContextManager {
    model: Arc<dyn LanguageModel>,
    store: Arc<VectorStore>,
    workspace: Workspace,
    gatherer: Gatherer,
    summarizer: Summarizer,
    chunker: Chunker,
    options: ContextOptions,
    cache: RwLock<HashMap<String, CachedContext>>,
    index_state: RwLock<IndexState>,
    reindex_gate: Mutex<()>,
}

impl ContextManager {
    pub fn new(
        root: impl Into<PathBuf>,
        model: Arc<dyn LanguageModel>,
        options: ContextOptions,
    ) -> Result<Self> {
        let workspace = Workspace::new(
            root,
            &options.include_globs,
            &options.exclude_globs,
            options.follow_symlinks,
        )?;
        let chunker = Chunker::new(ChunkOptions {
            strategy: options.chunk_strategy,
            chunk_size: options.chunk_size,
            overlap: options.chunk_overlap,
            max_tokens: options.max_tokens,
        })
        .context("Invalid chunking options")?;
        let summarizer = Summarizer::new(
            Arc::clone(&model),
            options.generation_model.clone(),
            options.summary_max_length,
            options.summary_style,
            options.chunk_size,
            options.chunk_overlap,
        )?;
        let store = match options.vector_dimension {
            Some(dimension) => VectorStore::with_dimension(dimension),
            None => VectorStore::new(),
        };

        Ok(Self {
            model,
            store: Arc::new(store),
            gatherer: Gatherer::new(workspace.clone()),
            workspace,
            summarizer,
            chunker,
            options,
            cache: RwLock::new(HashMap::new()),
            index_state: RwLock::new(IndexState::default()),
            reindex_gate: Mutex::new(()),
        })
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    /// Retrieve context for `query`, serving from the cache when possible.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Cancelled`] / [`RetrievalError::DeadlineExceeded`]
    ///   when `ctx` aborts the call.
    /// - [`RetrievalError::FileListing`] when a needed re-index cannot list
    ///   the workspace.
    /// - [`RetrievalError::Search`] when vector search is unavailable or
    ///   failed and the fallback failed too.
    pub async fn retrieve_context(
        &self,
        ctx: &CallContext,
        query: &str,
        max_results: usize,
    ) -> Result<ContextResponse, RetrievalError> {
        if let Some(hit) = self.cached(query) {
            debug!(query, "context cache hit");
            return Ok(ContextResponse {
                content: hit.content,
                pieces: hit.pieces,
                cached: true,
                timestamp: hit.timestamp,
            });
        }
        ctx.check()?;

        if self.model.supports_embeddings() {
            self.ensure_indexed(ctx).await?;
        }

        let pieces = self.search(ctx, query, max_results).await?;
        let content = format_pieces(&pieces);
        let timestamp = Utc::now();
        self.insert_cached(CachedContext {
            content: content.clone(),
            pieces: pieces.clone(),
            timestamp,
            query: query.to_string(),
            result_count: pieces.len(),
        });

        Ok(ContextResponse {
            content,
            pieces,
            cached: false,
            timestamp,
        })
    }

    /// Rebuild the index now, regardless of freshness.
    ///
    /// Without embedding support nothing is indexed and an empty report is
    /// returned.
    pub async fn index_workspace(&self, ctx: &CallContext) -> Result<IndexReport, RetrievalError> {
        if !self.model.supports_embeddings() {
            warn!(model = self.model.name(), "model has no embeddings; skipping indexing");
            return Ok(IndexReport::default());
        }
        let _gate = ctx.run(self.reindex_gate.lock()).await?;
        self.reindex(ctx).await
    }

    /// Gatherer output plus index state. Needs no model.
    pub fn basic_context(&self) -> Result<ContextInfo> {
        let gathered = self.gatherer.gather()?;
        let state = self.index_state();
        Ok(ContextInfo {
            gathered,
            indexed: state.indexed,
            last_index_time: state.last_index_time,
            vector_store_size: self.store.count(),
        })
    }

    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> ContextStats {
        let cache_size = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let state = self.index_state();
        ContextStats {
            cache_size,
            max_cache_size: self.options.max_cache_size,
            indexed: state.indexed,
            last_index_time: state.last_index_time,
            vector_store_size: self.store.count(),
        }
    }

    /// Replace the index with a snapshot and treat it as freshly built.
    pub fn restore_index(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.store.import(snapshot)?;
        self.mark_indexed(Utc::now());
        Ok(())
    }

    // ---- cache ----

    fn cached(&self, query: &str) -> Option<CachedContext> {
        let timeout = self.options.cache_timeout;
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            match cache.get(query) {
                None => return None,
                Some(entry) if !is_older_than(entry.timestamp, timeout) => {
                    return Some(entry.clone())
                }
                Some(_) => {}
            }
        }
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache
            .get(query)
            .is_some_and(|entry| is_older_than(entry.timestamp, timeout))
        {
            cache.remove(query);
            debug!(query, "expired cache entry removed");
        }
        None
    }

    fn insert_cached(&self, entry: CachedContext) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if !cache.contains_key(&entry.query) && cache.len() >= self.options.max_cache_size {
            let oldest = cache
                .iter()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(query, _)| query.clone());
            if let Some(oldest) = oldest {
                cache.remove(&oldest);
                debug!(query = %oldest, "evicted oldest cache entry");
            }
        }
        cache.insert(entry.query.clone(), entry);
    }

    // ---- index lifecycle ----

    fn index_state(&self) -> IndexState {
        *self
            .index_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_indexed(&self, at: DateTime<Utc>) {
        let mut state = self
            .index_state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        state.indexed = true;
        state.last_index_time = Some(at);
    }

    fn needs_reindex(&self) -> bool {
        let state = self.index_state();
        match (state.indexed, state.last_index_time) {
            (true, Some(at)) => is_older_than(at, STALENESS_WINDOW),
            _ => true,
        }
    }

    async fn ensure_indexed(&self, ctx: &CallContext) -> Result<(), RetrievalError> {
        if !self.needs_reindex() {
            return Ok(());
        }
        let _gate = ctx.run(self.reindex_gate.lock()).await?;
        if !self.needs_reindex() {
            debug!("index refreshed by a concurrent call");
            return Ok(());
        }
        self.reindex(ctx).await.map(|_| ())
    }

    /// Clear the store and embed every chunk of every workspace file.
    ///
    /// Callers must hold `reindex_gate`. A listing failure leaves the old
    /// index untouched. An aborted run keeps the documents inserted so far
    /// but leaves the index marked as not built.
    async fn reindex(&self, ctx: &CallContext) -> Result<IndexReport, RetrievalError> {
        let started = Instant::now();
        let workspace = self.workspace.clone();
        let files = tokio::task::spawn_blocking(move || workspace.list_files())
            .await
            .map_err(|e| RetrievalError::FileListing(e.into()))?
            .map_err(RetrievalError::FileListing)?;

        self.index_state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .indexed = false;
        self.store.clear();

        let mut report = IndexReport {
            files_seen: files.len(),
            ..IndexReport::default()
        };

        for file in &files {
            ctx.check()?;
            if file.size > self.options.max_file_bytes {
                debug!(path = %file.relative_path, size = file.size, "skipping oversized file");
                report.files_skipped += 1;
                continue;
            }
            let text = match tokio::fs::read_to_string(&file.absolute_path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %file.relative_path, error = %e, "skipping unreadable file");
                    report.files_skipped += 1;
                    continue;
                }
            };

            let base = BTreeMap::from([("file_path".to_string(), file.relative_path.clone())]);
            let language = file.extension();
            for chunk in self.chunker.chunk_text_with(&text, &base) {
                let embedding = match ctx.run(self.model.embed(&chunk.content)).await? {
                    Ok(embedding) => embedding,
                    Err(e) => {
                        warn!(
                            path = %file.relative_path,
                            chunk = chunk.chunk_index,
                            error = %e,
                            "failed to embed chunk"
                        );
                        report.chunks_failed += 1;
                        continue;
                    }
                };
                let id = format!("{}#{}", file.relative_path, chunk.chunk_index);
                let metadata = chunk_metadata(&chunk, &language);
                if let Err(e) = self.store.add(id, chunk.content, &embedding, metadata) {
                    warn!(path = %file.relative_path, error = %e, "failed to store chunk");
                    report.chunks_failed += 1;
                    continue;
                }
                report.chunks_embedded += 1;
            }
            report.files_indexed += 1;
        }

        self.mark_indexed(Utc::now());
        info!(
            files = report.files_indexed,
            skipped = report.files_skipped,
            chunks = report.chunks_embedded,
            failed = report.chunks_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "workspace indexed"
        );
        Ok(report)
    }

    // ---- search ----

    async fn search(
        &self,
        ctx: &CallContext,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ContextPiece>, RetrievalError> {
        let vector_error = if !self.model.supports_embeddings() {
            "model does not support embeddings".to_string()
        } else if self.store.is_empty() {
            "vector store is empty".to_string()
        } else {
            match self.vector_search(ctx, query, max_results).await {
                Ok(pieces) => return Ok(pieces),
                Err(e) => {
                    if let Some(abort) = RetrievalError::aborted_from(&e) {
                        return Err(abort);
                    }
                    warn!(error = %format!("{:#}", e), "vector search failed; using fallback search");
                    format!("{:#}", e)
                }
            }
        };

        self.fallback_search(ctx, query, max_results)
            .await
            .map_err(|e| match RetrievalError::aborted_from(&e) {
                Some(abort) => abort,
                None => RetrievalError::Search {
                    vector: vector_error,
                    fallback: format!("{:#}", e),
                },
            })
    }

    async fn vector_search(
        &self,
        ctx: &CallContext,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ContextPiece>> {
        let embedding = ctx
            .run(self.model.embed(query))
            .await?
            .context("Failed to embed query")?;
        let results = self
            .store
            .search(&embedding, max_results.saturating_mul(CANDIDATE_MULTIPLIER))?;
        Ok(results
            .into_iter()
            .take(max_results)
            .map(piece_from_result)
            .collect())
    }

    /// Ask the model which files matter, then read them.
    async fn fallback_search(
        &self,
        ctx: &CallContext,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ContextPiece>> {
        let gatherer = self.gatherer.clone();
        let structure = ctx
            .run(tokio::task::spawn_blocking(move || gatherer.file_structure()))
            .await?
            .context("File structure task failed")??;

        let request = GenerateRequest::new(
            self.options.generation_model.clone(),
            file_selection_prompt(query, &structure, max_results),
        )
        .with_system_prompt(FILE_SELECTION_SYSTEM_PROMPT);
        let reply = ctx
            .run(self.model.generate(&request))
            .await?
            .context("File selection request failed")?;

        let mut pieces = Vec::new();
        for (path, justification) in parse_file_selection(&reply) {
            if pieces.len() >= max_results {
                break;
            }
            ctx.check()?;
            let absolute = match self.workspace.resolve(&path) {
                Ok(absolute) => absolute,
                Err(e) => {
                    debug!(path, error = %e, "ignoring selected path");
                    continue;
                }
            };
            match tokio::fs::metadata(&absolute).await {
                Ok(meta) if meta.len() > self.options.max_file_bytes => {
                    debug!(path, size = meta.len(), "selected file is oversized");
                    continue;
                }
                _ => {}
            }
            let content = match tokio::fs::read_to_string(&absolute).await {
                Ok(content) => content,
                Err(e) => {
                    debug!(path, error = %e, "selected file is unreadable");
                    continue;
                }
            };
            pieces.push(
                self.piece_for_file(ctx, &path, &absolute, content, justification)
                    .await?,
            );
        }
        Ok(pieces)
    }

    async fn piece_for_file(
        &self,
        ctx: &CallContext,
        path: &str,
        absolute: &Path,
        content: String,
        justification: String,
    ) -> Result<ContextPiece> {
        let end_line = content.lines().count().max(1);
        if content.len() <= FALLBACK_CHUNK_THRESHOLD {
            return Ok(ContextPiece {
                file_path: path.to_string(),
                content,
                start_line: 1,
                end_line,
                relevance: SELECTED_FILE_RELEVANCE,
                kind: PieceKind::File,
                summary: justification,
                metadata: BTreeMap::new(),
            });
        }

        let base = BTreeMap::from([("file_path".to_string(), path.to_string())]);
        let chunks = self.chunker.chunk_text_with(&content, &base);
        let best = chunks
            .iter()
            .map(|chunk| (keyword_score(&justification, &chunk.content), chunk))
            .fold(None, |best: Option<(f32, &TextChunk)>, (score, chunk)| match best {
                Some((top, _)) if top >= score => best,
                _ => Some((score, chunk)),
            });
        if let Some((score, chunk)) = best {
            if score > 0.0 {
                return Ok(chunk_piece(path, chunk, score, justification));
            }
        }

        // Nothing in the file matches the justification: summarize it instead.
        match self.summarizer.summarize_file(ctx, absolute).await {
            Ok(summary) => Ok(ContextPiece {
                file_path: path.to_string(),
                content: summary,
                start_line: 1,
                end_line,
                relevance: SELECTED_FILE_RELEVANCE,
                kind: PieceKind::Summary,
                summary: justification,
                metadata: BTreeMap::new(),
            }),
            Err(e) => {
                if let Some(abort) = RetrievalError::aborted_from(&e) {
                    return Err(abort.into());
                }
                warn!(path, error = %format!("{:#}", e), "summarization failed; using first chunk");
                match chunks.first() {
                    Some(first) => Ok(chunk_piece(path, first, 0.0, justification)),
                    None => Ok(ContextPiece {
                        file_path: path.to_string(),
                        content,
                        start_line: 1,
                        end_line,
                        relevance: 0.0,
                        kind: PieceKind::File,
                        summary: justification,
                        metadata: BTreeMap::new(),
                    }),
                }
            }
        }
    }
}

fn is_older_than(timestamp: DateTime<Utc>, window: Duration) -> bool {
    (Utc::now() - timestamp)
        .to_std()
        .map(|age| age > window)
        .unwrap_or(false)
}

fn chunk_metadata(chunk: &TextChunk, language: &str) -> Metadata {
    let mut metadata: Metadata = chunk
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    metadata.insert("start_line".into(), Value::from(chunk.start_line));
    metadata.insert("end_line".into(), Value::from(chunk.end_line));
    metadata.insert("chunk_index".into(), Value::from(chunk.chunk_index));
    if !language.is_empty() {
        metadata.insert("language".into(), Value::String(language.to_string()));
    }
    metadata
}

fn piece_from_result(result: SearchResult) -> ContextPiece {
    let document = result.document;
    let md = &document.metadata;
    let file_path = md
        .get("file_path")
        .and_then(Value::as_str)
        .unwrap_or(&document.id)
        .to_string();
    let start_line = md.get("start_line").and_then(Value::as_u64).unwrap_or(1) as usize;
    let end_line = md
        .get("end_line")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(start_line);
    let metadata = md
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "file_path" | "start_line" | "end_line"))
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect();

    ContextPiece {
        file_path,
        content: document.content,
        start_line,
        end_line,
        relevance: result.similarity,
        kind: PieceKind::Chunk,
        summary: String::new(),
        metadata,
    }
}

fn chunk_piece(path: &str, chunk: &TextChunk, relevance: f32, justification: String) -> ContextPiece {
    ContextPiece {
        file_path: path.to_string(),
        content: chunk.content.clone(),
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        relevance,
        kind: PieceKind::Chunk,
        summary: justification,
        metadata: chunk
            .metadata
            .iter()
            .filter(|(k, _)| k.as_str() != "file_path")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

/// Fraction of the explanation's words (lower-cased, longer than two
/// characters) that occur in the chunk.
pub fn keyword_score(explanation: &str, chunk: &str) -> f32 {
    let haystack = chunk.to_lowercase();
    let words: Vec<String> = explanation
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 2)
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| haystack.contains(w.as_str())).count();
    hits as f32 / words.len() as f32
}

fn file_selection_prompt(query: &str, structure: &str, max_results: usize) -> String {
    format!(
        "A developer asked about this codebase:\n\"{}\"\n\n\
         Workspace file structure:\n{}\n\
         List up to {} files from the structure above that are most relevant to the \
         question, most relevant first. Write one file per line as\n\
         relative/path/to/file: one-line justification\n\
         Output nothing else.",
        query, structure, max_results
    )
}

/// Parse `path: justification` lines out of a model reply.
///
/// List markers, numbering, and quoting around the path are tolerated.
/// Lines whose path part contains whitespace are ignored, as are repeats.
pub fn parse_file_selection(reply: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut selections = Vec::new();
    for line in reply.lines() {
        let line = LIST_MARKER_RE.replace(line.trim(), "");
        let (path, justification) = match line.split_once(": ").or_else(|| line.split_once(" - ")) {
            Some((path, justification)) => (path, justification.trim()),
            None => (&*line, ""),
        };
        let path = path
            .trim()
            .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '*' | ':'))
            .trim_start_matches("./");
        if path.is_empty() || path.contains(char::is_whitespace) {
            continue;
        }
        if seen.insert(path.to_string()) {
            selections.push((path.to_string(), justification.to_string()));
        }
    }
    selections
}

/// Cut `content` at [`MAX_PIECE_CHARS`] characters, appending a marker.
pub fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(MAX_PIECE_CHARS) {
        Some((idx, _)) => format!("{}{}", &content[..idx], TRUNCATION_MARKER),
        None => content.to_string(),
    }
}

/// Render pieces as the human-readable transcript handed to the model.
pub fn format_pieces(pieces: &[ContextPiece]) -> String {
    if pieces.is_empty() {
        return "No relevant context found.\n".to_string();
    }
    let mut out = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        let _ = writeln!(
            out,
            "## [{}] {} (lines {}-{}) [{}] relevance: {:.3}",
            i + 1,
            piece.file_path,
            piece.start_line,
            piece.end_line,
            piece.kind,
            piece.relevance
        );
        if !piece.summary.is_empty() {
            let _ = writeln!(out, "Summary: {}", piece.summary);
        }
        out.push_str("```\n");
        out.push_str(&truncate_content(&piece.content));
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::DisabledModel;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn manager(dir: &Path, options: ContextOptions) -> ContextManager {
        ContextManager::new(dir, Arc::new(DisabledModel), options).unwrap()
    }

    fn entry(query: &str, age_secs: i64) -> CachedContext {
        CachedContext {
            content: format!("content for {}", query),
            pieces: Vec::new(),
            timestamp: Utc::now() - ChronoDuration::seconds(age_secs),
            query: query.to_string(),
            result_count: 0,
        }
    }

    fn piece(content: &str) -> ContextPiece {
        ContextPiece {
            file_path: "src/lib.rs".into(),
            content: content.into(),
            start_line: 3,
            end_line: 9,
            relevance: 0.875,
            kind: PieceKind::Chunk,
            summary: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_eviction_drops_single_oldest() {
        let tmp = TempDir::new().unwrap();
        let m = manager(
            tmp.path(),
            ContextOptions {
                max_cache_size: 3,
                ..ContextOptions::default()
            },
        );
        m.insert_cached(entry("b", 20));
        m.insert_cached(entry("a", 30));
        m.insert_cached(entry("c", 10));
        // A hit does not refresh "a".
        assert!(m.cached("a").is_some());
        m.insert_cached(entry("d", 0));

        assert_eq!(m.stats().cache_size, 3);
        assert!(m.cached("a").is_none());
        for q in ["b", "c", "d"] {
            assert!(m.cached(q).is_some(), "missing {}", q);
        }
    }

    #[test]
    fn test_reinserting_same_query_does_not_evict() {
        let tmp = TempDir::new().unwrap();
        let m = manager(
            tmp.path(),
            ContextOptions {
                max_cache_size: 2,
                ..ContextOptions::default()
            },
        );
        m.insert_cached(entry("a", 5));
        m.insert_cached(entry("b", 4));
        m.insert_cached(entry("b", 0));
        assert!(m.cached("a").is_some());
        assert!(m.cached("b").is_some());
    }

    #[test]
    fn test_expired_entries_are_purged_on_lookup() {
        let tmp = TempDir::new().unwrap();
        let m = manager(
            tmp.path(),
            ContextOptions {
                cache_timeout: Duration::from_secs(60),
                ..ContextOptions::default()
            },
        );
        m.insert_cached(entry("old", 120));
        m.insert_cached(entry("new", 1));
        assert_eq!(m.stats().cache_size, 2);
        assert!(m.cached("old").is_none());
        assert_eq!(m.stats().cache_size, 1);
        assert!(m.cached("new").is_some());

        m.clear_cache();
        assert_eq!(m.stats().cache_size, 0);
    }

    #[test]
    fn test_staleness_window() {
        let tmp = TempDir::new().unwrap();
        let m = manager(tmp.path(), ContextOptions::default());
        assert!(m.needs_reindex());
        m.mark_indexed(Utc::now());
        assert!(!m.needs_reindex());
        m.mark_indexed(Utc::now() - ChronoDuration::hours(25));
        assert!(m.needs_reindex());
        m.mark_indexed(Utc::now() - ChronoDuration::hours(23));
        assert!(!m.needs_reindex());
    }

    #[test]
    fn test_keyword_score() {
        let chunk = "fn parse_config(path: &Path) -> Config { toml::from_str(..) }";
        assert_eq!(keyword_score("Parse config path.", chunk), 1.0);
        assert!((keyword_score("the config file", chunk) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(keyword_score("Config loading", chunk), 0.5);
        assert_eq!(keyword_score("a to of", chunk), 0.0);
        assert_eq!(keyword_score("", chunk), 0.0);
    }

    #[test]
    fn test_parse_file_selection() {
        let reply = "Here are the most relevant files:\n\
                     1. `src/config.rs`: loads the TOML config\n\
                     - ./src/main.rs - CLI entry point\n\
                     * src/config.rs: duplicate\n\
                     src/lib.rs\n\
                     \n\
                     Some closing remark about the files.";
        let parsed = parse_file_selection(reply);
        assert_eq!(
            parsed,
            vec![
                ("src/config.rs".to_string(), "loads the TOML config".to_string()),
                ("src/main.rs".to_string(), "CLI entry point".to_string()),
                ("src/lib.rs".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_truncate_content() {
        let short = "x".repeat(MAX_PIECE_CHARS);
        assert_eq!(truncate_content(&short), short);
        let long = "é".repeat(MAX_PIECE_CHARS + 5);
        let cut = truncate_content(&long);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            cut.chars().count(),
            MAX_PIECE_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_format_pieces() {
        let mut p = piece("fn main() {}");
        p.summary = "entry point".into();
        let out = format_pieces(&[p]);
        assert!(out.starts_with("## [1] src/lib.rs (lines 3-9) [chunk] relevance: 0.875\n"));
        assert!(out.contains("Summary: entry point\n"));
        assert!(out.contains("```\nfn main() {}\n```\n"));

        let out = format_pieces(&[piece(&"y".repeat(MAX_PIECE_CHARS + 1))]);
        assert!(out.contains(TRUNCATION_MARKER));
        assert_eq!(format_pieces(&[]), "No relevant context found.\n");
    }

    #[test]
    fn test_piece_from_result_reads_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("file_path".into(), Value::from("src/a.rs"));
        metadata.insert("start_line".into(), Value::from(10));
        metadata.insert("end_line".into(), Value::from(20));
        metadata.insert("chunk_index".into(), Value::from(2));
        metadata.insert("strategy".into(), Value::from("semantic"));
        let result = SearchResult {
            document: workspace_context_core::Document {
                id: "src/a.rs#2".into(),
                content: "body".into(),
                embedding: vec![1.0],
                metadata,
                timestamp: Utc::now(),
            },
            similarity: 0.5,
        };
        let p = piece_from_result(result);
        assert_eq!(p.file_path, "src/a.rs");
        assert_eq!((p.start_line, p.end_line), (10, 20));
        assert_eq!(p.metadata.get("chunk_index").unwrap(), "2");
        assert_eq!(p.metadata.get("strategy").unwrap(), "semantic");
        assert!(!p.metadata.contains_key("file_path"));
    }

    #[tokio::test]
    async fn test_index_without_embeddings_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.rs"), "fn a() {}\n").unwrap();
        let m = manager(tmp.path(), ContextOptions::default());
        let report = m.index_workspace(&CallContext::new()).await.unwrap();
        assert_eq!(report, IndexReport::default());
        assert!(!m.stats().indexed);
    }

    #[tokio::test]
    async fn test_disabled_model_fails_with_both_stages_named() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.rs"), "fn a() {}\n").unwrap();
        let m = manager(tmp.path(), ContextOptions::default());
        let err = m
            .retrieve_context(&CallContext::new(), "where is a", 3)
            .await
            .unwrap_err();
        match err {
            RetrievalError::Search { vector, fallback } => {
                assert!(vector.contains("embeddings"));
                assert!(fallback.contains("File selection request failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(m.stats().cache_size, 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_keyword_score_is_a_fraction(explanation in "[a-z ,.]{0,60}", chunk in "[a-z_ ]{0,80}") {
            let score = keyword_score(&explanation, &chunk);
            proptest::prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_truncation_bounds_length(text in "\\PC{0,2100}") {
            let cut = truncate_content(&text);
            proptest::prop_assert!(
                cut.chars().count() <= MAX_PIECE_CHARS + TRUNCATION_MARKER.chars().count()
            );
            proptest::prop_assert!(text.starts_with(cut.trim_end_matches(TRUNCATION_MARKER)));
        }
    }

    #[test]
    fn test_basic_context_without_model() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.rs"), "fn a() {}\n").unwrap();
        let info = manager(tmp.path(), ContextOptions::default())
            .basic_context()
            .unwrap();
        assert!(info.gathered.file_structure.contains("a.rs"));
        assert!(info.gathered.codebase_analysis.starts_with("Files: 1, Lines: 1"));
        assert!(!info.indexed);
        assert_eq!(info.vector_store_size, 0);
    }
}
