//! # Workspace Context CLI (`wctx`)
//!
//! ## Usage
//!
//! ```bash
//! wctx --config ./config/wctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wctx query "<text>"` | Retrieve context for a question (`--snapshot` searches an export) |
//! | `wctx index` | Re-index the workspace now |
//! | `wctx stats` | Cache and index statistics |
//! | `wctx basic` | File tree, codebase analysis, git, dependencies |
//! | `wctx chunk <file>` | Show how a file is chunked |
//! | `wctx summarize <file>` | Summarize a file with the model |
//! | `wctx export` | Index, then write a JSON snapshot |
//! | `wctx import <file>` | Validate a snapshot and print its stats |
//!
//! Logs go to stderr; set `RUST_LOG=workspace_context=debug` for detail.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use workspace_context::config::{self, Config};
use workspace_context::core::{ChunkOptions, ChunkStrategy, Chunker};
use workspace_context::llm::create_model;
use workspace_context::manager::ContextManager;
use workspace_context::{snapshot, stats, CallContext};

/// Workspace Context: retrieve relevant codebase snippets for a question.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing default config file means built-in defaults.
#[derive(Parser)]
#[command(name = "wctx", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wctx.toml")]
    config: PathBuf,

    /// Override `[workspace].root`.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Abort model-backed commands after this many seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve context for a natural-language query.
    Query {
        query: String,

        /// Maximum number of pieces to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Print the full response as JSON instead of the transcript.
        #[arg(long)]
        json: bool,

        /// Search a snapshot written by `wctx export` instead of re-indexing.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Re-index the workspace now.
    Index,

    /// Show cache and index statistics.
    Stats,

    /// Print embedding-free workspace context.
    Basic {
        #[arg(long)]
        json: bool,
    },

    /// Show how a file would be chunked.
    Chunk {
        file: PathBuf,

        /// `lines`, `tokens`, or `semantic`; defaults to the configured strategy.
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Summarize a file.
    Summarize {
        file: PathBuf,

        /// Summarize in half-overlapping windows of this many lines.
        #[arg(long)]
        window: Option<usize>,
    },

    /// Index the workspace and export the vector store as JSON.
    ///
    /// Writes to stdout unless `--output` is given.
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a JSON snapshot and print the stats it would produce.
    ///
    /// Nothing is persisted; use `query --snapshot` to search a snapshot.
    Import { file: PathBuf },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new("./config/wctx.toml") {
        return Ok(Config::default());
    }
    config::load_config(path)
}

fn call_context(timeout: Option<u64>) -> CallContext {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    match timeout {
        Some(secs) => CallContext::with_timeout(Duration::from_secs(secs)).with_token(token),
        None => CallContext::new().with_token(token),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut cfg = load(&cli.config)?;
    if let Some(root) = cli.root {
        cfg.workspace.root = root;
    }
    let options = cfg.context_options()?;
    let ctx = call_context(cli.timeout);

    // Chunking needs no model.
    if let Commands::Chunk { file, strategy } = &cli.command {
        let strategy = match strategy {
            Some(s) => s.parse::<ChunkStrategy>()?,
            None => options.chunk_strategy,
        };
        let chunker = Chunker::new(ChunkOptions {
            strategy,
            chunk_size: options.chunk_size,
            overlap: options.chunk_overlap,
            max_tokens: options.max_tokens,
        })?;
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        for chunk in chunker.chunk_text(&text) {
            println!(
                "--- chunk {} (lines {}-{}, {}) ---",
                chunk.chunk_index,
                chunk.start_line,
                chunk.end_line,
                chunk.metadata.get("content_hash").map(|h| &h[..12]).unwrap_or("")
            );
            println!("{}", chunk.content);
        }
        return Ok(());
    }

    let model = create_model(&cfg.model)?;
    let manager = ContextManager::new(&cfg.workspace.root, model, options)?;

    match cli.command {
        Commands::Query {
            query,
            limit,
            json,
            snapshot: snapshot_path,
        } => {
            if let Some(path) = snapshot_path {
                manager.restore_index(snapshot::read_snapshot(&path)?)?;
            }
            let response = manager.retrieve_context(&ctx, &query, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", response.content);
            }
        }
        Commands::Index => {
            let report = manager.index_workspace(&ctx).await?;
            println!("{}", stats::render_index_report(&report));
        }
        Commands::Stats => {
            print!("{}", stats::render_stats(&manager.stats()));
        }
        Commands::Basic { json } => {
            let info = manager.basic_context()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("== Codebase ==\n{}", info.gathered.codebase_analysis);
                println!("== Files ==\n{}", info.gathered.file_structure);
                println!("== Git ==\n{}", info.gathered.git_info);
                println!("== Dependencies ==\n{}", info.gathered.dependencies);
            }
        }
        Commands::Summarize { file, window } => {
            let summarizer = manager.summarizer();
            let summary = match window {
                Some(lines) => {
                    let text = std::fs::read_to_string(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    summarizer
                        .summarize_sliding_window(&ctx, &text, lines)
                        .await?
                }
                None => summarizer.summarize_file(&ctx, &file).await?,
            };
            println!("{}", summary);
        }
        Commands::Export { output } => {
            let report = manager.index_workspace(&ctx).await?;
            eprintln!("{}", stats::render_index_report(&report));
            let count = snapshot::write_snapshot(manager.vector_store(), output.as_deref())?;
            if let Some(path) = output {
                eprintln!("Exported {} documents to {}", count, path.display());
            }
        }
        Commands::Import { file } => {
            let snap = snapshot::read_snapshot(&file)?;
            manager.restore_index(snap)?;
            print!("{}", stats::render_stats(&manager.stats()));
        }
        Commands::Chunk { .. } => unreachable!("handled before the model is built"),
    }

    Ok(())
}
