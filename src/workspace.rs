//! Workspace file enumeration.
//!
//! Walks the workspace root with `walkdir`, keeps files that match the
//! include globs and none of the exclude globs, and returns them sorted by
//! relative path. `.git`, `target`, and `node_modules` are always excluded.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Exclude patterns applied in addition to the configured ones.
pub const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Directory names that are never descended into.
pub(crate) const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

/// A source file under the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFile {
    /// Path relative to the root, `/`-separated.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
}

impl WorkspaceFile {
    /// Lower-cased extension, or `""` when the file has none.
    pub fn extension(&self) -> String {
        Path::new(&self.relative_path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl Workspace {
    pub fn new(
        root: impl Into<PathBuf>,
        include_globs: &[String],
        exclude_globs: &[String],
        follow_symlinks: bool,
    ) -> Result<Self> {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(exclude_globs.iter().cloned());
        Ok(Self {
            root: root.into(),
            include: build_globset(include_globs).context("Invalid include glob")?,
            exclude: build_globset(&excludes).context("Invalid exclude glob")?,
            follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a relative path passes the include and exclude globs.
    pub fn is_included(&self, relative_path: &str) -> bool {
        !self.exclude.is_match(relative_path) && self.include.is_match(relative_path)
    }

    /// All matching files, sorted by relative path.
    ///
    /// Fails only when the root itself is missing or unreadable; entries
    /// that cannot be read are logged and skipped.
    pub fn list_files(&self) -> Result<Vec<WorkspaceFile>> {
        if !self.root.is_dir() {
            bail!("Workspace root does not exist: {}", self.root.display());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(e).with_context(|| {
                        format!("Failed to read workspace root: {}", self.root.display())
                    });
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable workspace entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let rel_str = relative_string(path.strip_prefix(&self.root).unwrap_or(path));
            if !self.is_included(&rel_str) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(WorkspaceFile {
                relative_path: rel_str,
                absolute_path: path.to_path_buf(),
                size,
            });
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    /// Resolve a workspace-relative path to the file it names.
    ///
    /// Rejects paths that would leave the root and paths the include and
    /// exclude globs filter out, so callers see the same files as
    /// [`Workspace::list_files`].
    pub fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let rel = Path::new(relative_path.trim());
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy()),
                Component::CurDir => {}
                _ => bail!("Path escapes the workspace: {}", relative_path),
            }
        }
        if parts.is_empty() {
            bail!("Empty path");
        }
        let rel_str = parts.join("/");
        if !self.is_included(&rel_str) {
            bail!("Path is not part of the workspace: {}", rel_str);
        }
        Ok(self.root.join(rel_str))
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
