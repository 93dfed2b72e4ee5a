//! TOML configuration.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration (no language model, workspace rooted at `.`).
//!
//! ```toml
//! [workspace]
//! root = "."
//! exclude_globs = ["**/vendor/**"]
//!
//! [context]
//! chunk_strategy = "semantic"
//! chunk_size = 150
//!
//! [model]
//! provider = "ollama"
//! generation_model = "llama3"
//! embedding_model = "nomic-embed-text"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use workspace_context_core::ChunkStrategy;

use crate::manager::ContextOptions;
use crate::summarize::SummaryStyle;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Files larger than this are not indexed.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

pub fn default_include_globs() -> Vec<String> {
    [
        "**/*.rs", "**/*.go", "**/*.py", "**/*.js", "**/*.jsx", "**/*.ts", "**/*.tsx",
        "**/*.java", "**/*.kt", "**/*.c", "**/*.h", "**/*.cc", "**/*.cpp", "**/*.hpp",
        "**/*.cs", "**/*.rb", "**/*.php", "**/*.swift", "**/*.sh", "**/*.sql", "**/*.md",
        "**/*.toml", "**/*.yaml", "**/*.yml",
    ]
    .iter()
    .map(|g| g.to_string())
    .collect()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_chunk_strategy")]
    pub chunk_strategy: String,
    /// Only used by the `tokens` strategy.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_summary_max_length")]
    pub summary_max_length: usize,
    #[serde(default = "default_summary_style")]
    pub summary_style: String,
    #[serde(default)]
    pub vector_dimension: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            cache_timeout_secs: default_cache_timeout_secs(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            chunk_strategy: default_chunk_strategy(),
            max_tokens: default_max_tokens(),
            summary_max_length: default_summary_max_length(),
            summary_style: default_summary_style(),
            vector_dimension: None,
        }
    }
}

fn default_max_cache_size() -> usize {
    100
}
fn default_cache_timeout_secs() -> u64 {
    30 * 60
}
fn default_chunk_size() -> usize {
    150
}
fn default_chunk_overlap() -> usize {
    15
}
fn default_chunk_strategy() -> String {
    "semantic".to_string()
}
fn default_max_tokens() -> usize {
    512
}
fn default_summary_max_length() -> usize {
    500
}
fn default_summary_style() -> String {
    "technical".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub generation_model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_url(),
            generation_model: None,
            embedding_model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ctx = &self.context;
        if ctx.chunk_size == 0 {
            bail!("context.chunk_size must be > 0");
        }
        if ctx.chunk_overlap >= ctx.chunk_size {
            bail!(
                "context.chunk_overlap ({}) must be smaller than context.chunk_size ({})",
                ctx.chunk_overlap,
                ctx.chunk_size
            );
        }
        if ctx.max_cache_size == 0 {
            bail!("context.max_cache_size must be > 0");
        }
        if ctx.cache_timeout_secs == 0 {
            bail!("context.cache_timeout_secs must be > 0");
        }
        if ctx.max_tokens == 0 {
            bail!("context.max_tokens must be > 0");
        }
        if ctx.vector_dimension == Some(0) {
            bail!("context.vector_dimension must be > 0 when set");
        }
        ctx.chunk_strategy
            .parse::<ChunkStrategy>()
            .context("Invalid context.chunk_strategy")?;
        ctx.summary_style
            .parse::<SummaryStyle>()
            .context("Invalid context.summary_style")?;

        match self.model.provider.as_str() {
            "disabled" => {}
            "ollama" => {
                if self.model.generation_model.is_none() {
                    bail!("model.generation_model must be specified when provider is 'ollama'");
                }
                if self.model.embedding_model.is_none() {
                    bail!("model.embedding_model must be specified when provider is 'ollama'");
                }
            }
            other => bail!(
                "Unknown model provider: '{}'. Must be disabled or ollama.",
                other
            ),
        }
        Ok(())
    }

    /// Manager options derived from the `[context]` and `[workspace]` sections.
    pub fn context_options(&self) -> Result<ContextOptions> {
        let ctx = &self.context;
        Ok(ContextOptions {
            max_cache_size: ctx.max_cache_size,
            cache_timeout: Duration::from_secs(ctx.cache_timeout_secs),
            chunk_size: ctx.chunk_size,
            chunk_overlap: ctx.chunk_overlap,
            chunk_strategy: ctx.chunk_strategy.parse()?,
            max_tokens: ctx.max_tokens,
            summary_max_length: ctx.summary_max_length,
            summary_style: ctx.summary_style.parse()?,
            vector_dimension: ctx.vector_dimension,
            generation_model: self
                .model
                .generation_model
                .clone()
                .unwrap_or_else(|| ContextOptions::default().generation_model),
            max_file_bytes: self.workspace.max_file_bytes,
            include_globs: self.workspace.include_globs.clone(),
            exclude_globs: self.workspace.exclude_globs.clone(),
            follow_symlinks: self.workspace.follow_symlinks,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}
