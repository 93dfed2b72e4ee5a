//! Model-backed summarization of oversized text.
//!
//! Short inputs are passed through untouched. Longer ones go to the model
//! with a prompt shaped by the configured [`SummaryStyle`] and a list of
//! the code constructs found in the text. Files and sliding windows are
//! summarized piece by piece; if the joined result is still more than
//! twice the limit it is summarized once more, and never again.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use anyhow::{bail, Context, Result};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use workspace_context_core::{ChunkOptions, ChunkStrategy, Chunker, GenerateRequest, LanguageModel};

use crate::call_context::CallContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryStyle {
    Brief,
    Detailed,
    #[default]
    Technical,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown summary style '{0}': expected brief, detailed, or technical")]
pub struct UnknownStyle(pub String);

impl SummaryStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::Brief => "brief",
            SummaryStyle::Detailed => "detailed",
            SummaryStyle::Technical => "technical",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            SummaryStyle::Brief => {
                "Summarize the following content in two or three sentences. \
                 Name only the most important elements."
            }
            SummaryStyle::Detailed => {
                "Write a detailed summary of the following content. Cover its purpose, \
                 its main parts, and how they relate to each other."
            }
            SummaryStyle::Technical => {
                "Write a technical summary of the following code for another engineer. \
                 List the public API, key data structures, control flow, and any \
                 notable edge cases."
            }
        }
    }
}

impl fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(SummaryStyle::Brief),
            "detailed" => Ok(SummaryStyle::Detailed),
            "technical" => Ok(SummaryStyle::Technical),
            _ => Err(UnknownStyle(s.to_string())),
        }
    }
}

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|func|def|function)\s+\w+")
        .expect("function regex")
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|interface|type)\s+\w+")
        .expect("type regex")
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:abstract\s+)?class\s+\w+").expect("class regex")
});
static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:use\s+\w|import\s|from\s+\S+\s+import|#include|require\()")
        .expect("import regex")
});
static TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)#\[(?:tokio::)?test\]|^\s*def\s+test_|^\s*func\s+Test\w+|\b(?:describe|it)\(")
        .expect("test regex")
});

/// Names of the code constructs present in `text`, in a fixed order.
pub fn detect_constructs(text: &str) -> Vec<&'static str> {
    [
        (&*FUNCTION_RE, "functions"),
        (&*TYPE_RE, "types"),
        (&*CLASS_RE, "classes"),
        (&*IMPORT_RE, "imports"),
        (&*TEST_RE, "tests"),
    ]
    .into_iter()
    .filter(|(re, _)| re.is_match(text))
    .map(|(_, name)| name)
    .collect()
}

/// Build the summarization prompt for `text`.
pub fn build_prompt(text: &str, style: SummaryStyle, max_length: usize) -> String {
    let mut prompt = String::from(style.instructions());
    prompt.push_str(&format!(
        "\nKeep the summary under {} characters.",
        max_length
    ));
    let constructs = detect_constructs(text);
    if !constructs.is_empty() {
        prompt.push_str(&format!(
            "\nThe content contains {}; mention the important ones by name.",
            constructs.join(", ")
        ));
    }
    prompt.push_str("\n\nContent:\n");
    prompt.push_str(text);
    prompt
}

pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    generation_model: String,
    max_length: usize,
    style: SummaryStyle,
    chunker: Chunker,
}

impl Summarizer {
    /// `chunk_size` and `overlap` shape the semantic chunks used by
    /// [`summarize_file`](Summarizer::summarize_file).
    pub fn new(
        model: Arc<dyn LanguageModel>,
        generation_model: impl Into<String>,
        max_length: usize,
        style: SummaryStyle,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self> {
        let chunker = Chunker::new(ChunkOptions {
            strategy: ChunkStrategy::Semantic,
            chunk_size,
            overlap,
            ..ChunkOptions::default()
        })?;
        Ok(Self {
            model,
            generation_model: generation_model.into(),
            max_length,
            style,
            chunker,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn style(&self) -> SummaryStyle {
        self.style
    }

    fn fits(&self, text: &str) -> bool {
        text.chars().count() <= self.max_length
    }

    /// Summarize `text`, or return it unchanged when it already fits.
    pub async fn summarize_text(&self, ctx: &CallContext, text: &str) -> Result<String> {
        if self.fits(text) {
            return Ok(text.to_string());
        }
        let request = GenerateRequest::new(
            self.generation_model.clone(),
            build_prompt(text, self.style, self.max_length),
        )
        .with_system_prompt("You summarize source code and documentation accurately and concisely.");
        let reply = ctx
            .run(self.model.generate(&request))
            .await?
            .context("Summarization request failed")?;
        Ok(reply.trim().to_string())
    }

    /// Summarize a file chunk by chunk.
    pub async fn summarize_file(&self, ctx: &CallContext, path: &Path) -> Result<String> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if self.fits(&text) {
            return Ok(text);
        }
        let chunks = self.chunker.chunk_text(&text);
        debug!(path = %path.display(), chunks = chunks.len(), "summarizing file");

        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            parts.push(self.summarize_text(ctx, &chunk.content).await?);
        }
        self.condense(ctx, parts).await
    }

    /// Summarize `text` in line windows that overlap by half.
    pub async fn summarize_sliding_window(
        &self,
        ctx: &CallContext,
        text: &str,
        window_lines: usize,
    ) -> Result<String> {
        if window_lines == 0 {
            bail!("window_lines must be > 0");
        }
        if self.fits(text) {
            return Ok(text.to_string());
        }
        let lines: Vec<&str> = text.lines().collect();
        let step = (window_lines / 2).max(1);

        let mut parts = Vec::new();
        let mut start = 0;
        while start < lines.len() {
            let end = (start + window_lines).min(lines.len());
            parts.push(self.summarize_text(ctx, &lines[start..end].join("\n")).await?);
            if end == lines.len() {
                break;
            }
            start += step;
        }
        self.condense(ctx, parts).await
    }

    async fn condense(&self, ctx: &CallContext, parts: Vec<String>) -> Result<String> {
        let combined = parts.join("\n\n");
        if combined.chars().count() > 2 * self.max_length {
            return self.summarize_text(ctx, &combined).await;
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with a fixed string and records every prompt.
    struct EchoModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl EchoModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, request: &GenerateRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            Ok(format!("  {}  \n", self.reply))
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("no embeddings")
        }
        fn supports_embeddings(&self) -> bool {
            false
        }
    }

    fn summarizer(model: Arc<EchoModel>, max_length: usize) -> Summarizer {
        Summarizer::new(model, "test", max_length, SummaryStyle::Technical, 20, 2).unwrap()
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("Brief".parse::<SummaryStyle>().unwrap(), SummaryStyle::Brief);
        assert_eq!("detailed".parse::<SummaryStyle>().unwrap(), SummaryStyle::Detailed);
        assert_eq!(" technical ".parse::<SummaryStyle>().unwrap(), SummaryStyle::Technical);
        assert!("verbose".parse::<SummaryStyle>().is_err());
    }

    #[test]
    fn test_detect_constructs() {
        let code = "use std::fmt;\npub struct Foo;\npub async fn run() {}\n#[test]\nfn t() {}\n";
        assert_eq!(
            detect_constructs(code),
            vec!["functions", "types", "imports", "tests"]
        );
        assert_eq!(detect_constructs("class Widget:\n    pass\n"), vec!["classes"]);
        assert!(detect_constructs("just prose here").is_empty());
    }

    #[test]
    fn test_prompt_mentions_style_and_constructs() {
        let prompt = build_prompt("fn main() {}", SummaryStyle::Brief, 100);
        assert!(prompt.contains("two or three sentences"));
        assert!(prompt.contains("functions"));
        assert!(prompt.ends_with("fn main() {}"));
    }

    #[tokio::test]
    async fn test_short_text_passes_through() {
        let model = EchoModel::new("summary");
        let s = summarizer(model.clone(), 100);
        let out = s.summarize_text(&CallContext::new(), "short").await.unwrap();
        assert_eq!(out, "short");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_long_text_is_summarized_and_trimmed() {
        let model = EchoModel::new("summary");
        let s = summarizer(model.clone(), 10);
        let out = s
            .summarize_text(&CallContext::new(), "this text is longer than ten characters")
            .await
            .unwrap();
        assert_eq!(out, "summary");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_file_summarized_per_chunk_with_one_repass() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let body: String = (0..100).map(|i| format!("let value_{} = {};\n", i, i)).collect();
        std::fs::write(tmp.path(), &body).unwrap();

        // Every reply is 40 chars, so the joined chunk summaries exceed 2 * 50.
        let model = EchoModel::new(&"x".repeat(40));
        let s = summarizer(model.clone(), 50);
        let out = s.summarize_file(&CallContext::new(), tmp.path()).await.unwrap();
        assert_eq!(out, "x".repeat(40));
        let chunk_count = s.chunker.chunk_text(&body).len();
        assert_eq!(model.calls.load(Ordering::SeqCst), chunk_count + 1);
    }

    #[tokio::test]
    async fn test_small_file_returned_verbatim() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "fn a() {}\n").unwrap();
        let model = EchoModel::new("unused");
        let s = summarizer(model.clone(), 500);
        let out = s.summarize_file(&CallContext::new(), tmp.path()).await.unwrap();
        assert_eq!(out, "fn a() {}\n");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sliding_window_overlaps_by_half() {
        let text: String = (1..=10).map(|i| format!("line number {}\n", i)).collect();
        let model = EchoModel::new("s");
        let s = summarizer(model.clone(), 20);
        let out = s
            .summarize_sliding_window(&CallContext::new(), &text, 4)
            .await
            .unwrap();
        // Windows start at lines 1, 3, 5, 7 (the last reaches the end).
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
        assert_eq!(out, "s\n\ns\n\ns\n\ns");
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[1].contains("line number 3\nline number 4\nline number 5\nline number 6"));
    }

    #[tokio::test]
    async fn test_sliding_window_rejects_zero() {
        let s = summarizer(EchoModel::new("s"), 5);
        assert!(s
            .summarize_sliding_window(&CallContext::new(), "some long text", 0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts() {
        let s = summarizer(EchoModel::new("s"), 5);
        let ctx = CallContext::new();
        ctx.cancel();
        let err = s.summarize_text(&ctx, "long enough text").await.unwrap_err();
        assert!(err.downcast_ref::<crate::error::RetrievalError>().is_some());
    }
}
