//! Vector-store snapshots on disk.
//!
//! `wctx export` writes the whole store as pretty-printed JSON, either to
//! a file or to stdout for piping; `wctx import` reads it back. The format
//! is [`Snapshot`]: `{"documents": {id: Document}, "dimension": n}`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use workspace_context_core::{Snapshot, VectorStore};

/// Export `store` as JSON.
///
/// If `output` is `Some`, writes to that file path (creating parent
/// directories). Otherwise writes to stdout. Returns the document count.
pub fn write_snapshot(store: &VectorStore, output: Option<&Path>) -> Result<usize> {
    let snapshot = store.export();
    let count = snapshot.documents.len();
    let json = serde_json::to_string_pretty(&snapshot)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
            info!(documents = count, path = %path.display(), "snapshot exported");
        }
        None => {
            println!("{}", json);
        }
    }
    Ok(count)
}

/// Read and parse a snapshot file without applying it.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid snapshot file: {}", path.display()))
}
