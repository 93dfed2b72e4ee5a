//! Cheap structural facts about the workspace.
//!
//! The [`Gatherer`] needs no embeddings and no model. It is what the
//! fallback search shows the model when asking it to pick files, and what
//! `wctx basic` prints.
//!
//! | Section | Source | On failure |
//! |---------|--------|------------|
//! | `file_structure` | included files, as a tree | error |
//! | `codebase_analysis` | included files, counted by extension | error |
//! | `git_info` | `git rev-parse`, `git status`, `git log` | placeholder text |
//! | `dependencies` | first manifests found at the root | placeholder text |

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::debug;
use crate::workspace::Workspace;

pub const GIT_UNAVAILABLE: &str = "Git information unavailable";
pub const NO_MANIFEST: &str = "No dependency manifest found";

/// Manifests checked, in order.
pub const MANIFESTS: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "go.mod",
    "pyproject.toml",
    "requirements.txt",
];

const MAX_TREE_DEPTH: usize = 4;
const MAX_TREE_ENTRIES: usize = 400;
const MAX_MANIFESTS: usize = 2;
const MAX_MANIFEST_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatheredContext {
    pub codebase_analysis: String,
    pub file_structure: String,
    pub git_info: String,
    pub dependencies: String,
}

#[derive(Debug, Clone)]
pub struct Gatherer {
    workspace: Workspace,
}

impl Gatherer {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn gather(&self) -> Result<GatheredContext> {
        Ok(GatheredContext {
            codebase_analysis: self.codebase_analysis()?,
            file_structure: self.file_structure()?,
            git_info: self.git_info(),
            dependencies: self.dependencies(),
        })
    }

    /// Indented tree of the included files, depth-limited, directories first.
    ///
    /// Built from [`Workspace::list_files`], so the model is never shown a
    /// path that indexing would skip.
    pub fn file_structure(&self) -> Result<String> {
        let mut tree = TreeNode::default();
        for file in self.workspace.list_files()? {
            let mut parts: Vec<&str> = file.relative_path.split('/').collect();
            let Some(name) = parts.pop() else {
                continue;
            };
            let mut node = &mut tree;
            for dir in parts {
                node = node.dirs.entry(dir.to_string()).or_default();
            }
            node.files.push(name.to_string());
        }

        let mut out = String::from("./\n");
        let mut entries = 0;
        if !tree.render(1, &mut out, &mut entries) {
            out.push_str("... (truncated)\n");
        }
        Ok(out)
    }

    /// File and line counts per extension over the included files.
    pub fn codebase_analysis(&self) -> Result<String> {
        let files = self.workspace.list_files()?;

        let mut by_ext: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut total_lines = 0;
        for file in &files {
            let lines = std::fs::read_to_string(&file.absolute_path)
                .map(|s| s.lines().count())
                .unwrap_or(0);
            let ext = match file.extension() {
                e if e.is_empty() => "(none)".to_string(),
                e => e,
            };
            let slot = by_ext.entry(ext).or_default();
            slot.0 += 1;
            slot.1 += lines;
            total_lines += lines;
        }

        let mut rows: Vec<(String, (usize, usize))> = by_ext.into_iter().collect();
        rows.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| a.0.cmp(&b.0)));

        let mut out = format!("Files: {}, Lines: {}\n", files.len(), total_lines);
        for (ext, (count, lines)) in rows {
            let _ = writeln!(
                out,
                "  {:<8} {:>5} file{} {:>8} lines",
                ext,
                count,
                if count == 1 { " " } else { "s" },
                lines
            );
        }
        Ok(out)
    }

    /// Branch, working-tree status, and recent commits.
    pub fn git_info(&self) -> String {
        let root = self.workspace.root();
        let branch = match git(root, &["rev-parse", "--abbrev-ref", "HEAD"]) {
            Ok(branch) => branch,
            Err(e) => {
                debug!(error = %e, "git unavailable");
                return GIT_UNAVAILABLE.to_string();
            }
        };
        let status = git(root, &["status", "--porcelain"]).unwrap_or_default();
        let log = git(root, &["log", "-5", "--oneline"]).unwrap_or_default();

        let mut out = format!("Branch: {}\n", branch.trim());
        if status.trim().is_empty() {
            out.push_str("Status: clean\n");
        } else {
            out.push_str("Status:\n");
            for line in status.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
        if !log.trim().is_empty() {
            out.push_str("Recent commits:\n");
            for line in log.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
        out
    }

    /// Contents of the first manifests found, each truncated.
    pub fn dependencies(&self) -> String {
        let root = self.workspace.root();
        let mut out = String::new();
        let mut found = 0;
        for name in MANIFESTS {
            if found == MAX_MANIFESTS {
                break;
            }
            let Ok(body) = std::fs::read_to_string(root.join(name)) else {
                continue;
            };
            let _ = writeln!(out, "== {} ==", name);
            out.push_str(&truncate_chars(&body, MAX_MANIFEST_CHARS));
            if !out.ends_with('\n') {
                out.push('\n');
            }
            found += 1;
        }
        if found == 0 {
            return NO_MANIFEST.to_string();
        }
        out
    }
}

#[derive(Default)]
struct TreeNode {
    dirs: BTreeMap<String, TreeNode>,
    files: Vec<String>,
}

impl TreeNode {
    /// Append this node's children at `depth`. Returns `false` once
    /// [`MAX_TREE_ENTRIES`] is reached.
    fn render(&self, depth: usize, out: &mut String, entries: &mut usize) -> bool {
        let indent = "  ".repeat(depth);
        for (name, child) in &self.dirs {
            if *entries == MAX_TREE_ENTRIES {
                return false;
            }
            let _ = writeln!(out, "{}{}/", indent, name);
            *entries += 1;
            if depth < MAX_TREE_DEPTH && !child.render(depth + 1, out, entries) {
                return false;
            }
        }
        for name in &self.files {
            if *entries == MAX_TREE_ENTRIES {
                return false;
            }
            let _ = writeln!(out, "{}{}", indent, name);
            *entries += 1;
        }
        true
    }
}

fn git(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .context("Failed to run git")?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n... (truncated)", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_include_globs;
    use std::fs;
    use tempfile::TempDir;

    fn gatherer(dir: &Path) -> Gatherer {
        Gatherer::new(Workspace::new(dir, &default_include_globs(), &[], false).unwrap())
    }

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_file_structure_tree() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/lib.rs", "");
        write(tmp.path(), "src/util/mod.rs", "");
        write(tmp.path(), "README.md", "");
        write(tmp.path(), "target/debug/out.rs", "");

        let tree = gatherer(tmp.path()).file_structure().unwrap();
        assert_eq!(tree, "./\n  src/\n    util/\n      mod.rs\n    lib.rs\n  README.md\n");
    }

    #[test]
    fn test_file_structure_hides_excluded_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/lib.rs", "");
        write(tmp.path(), "secrets/keys.rs", "");
        write(tmp.path(), ".git/config", "");
        write(tmp.path(), "assets/logo.png", "");

        let excludes = vec!["secrets/**".to_string()];
        let g = Gatherer::new(
            Workspace::new(tmp.path(), &default_include_globs(), &excludes, false).unwrap(),
        );
        assert_eq!(g.file_structure().unwrap(), "./\n  src/\n    lib.rs\n");
    }

    #[test]
    fn test_file_structure_depth_limit() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a/b/c/d/e/deep.rs", "");
        let tree = gatherer(tmp.path()).file_structure().unwrap();
        assert_eq!(tree, "./\n  a/\n    b/\n      c/\n        d/\n");
    }

    #[test]
    fn test_codebase_analysis_counts() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.rs", "1\n2\n3\n");
        write(tmp.path(), "b.rs", "1\n");
        write(tmp.path(), "c.py", "1\n2\n");

        let analysis = gatherer(tmp.path()).codebase_analysis().unwrap();
        let mut lines = analysis.lines();
        assert_eq!(lines.next().unwrap(), "Files: 3, Lines: 6");
        assert!(lines.next().unwrap().trim_start().starts_with("rs"));
        assert!(lines.next().unwrap().trim_start().starts_with("py"));
    }

    #[test]
    fn test_missing_root_propagates() {
        let g = gatherer(Path::new("/no/such/root/for/gather"));
        assert!(g.file_structure().is_err());
        assert!(g.codebase_analysis().is_err());
        assert!(g.gather().is_err());
    }

    #[test]
    fn test_git_degrades_to_placeholder() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(gatherer(tmp.path()).git_info(), GIT_UNAVAILABLE);
    }

    #[test]
    fn test_dependencies() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(gatherer(tmp.path()).dependencies(), NO_MANIFEST);

        write(tmp.path(), "go.mod", "module example.com/x\n");
        write(tmp.path(), "Cargo.toml", "[package]\nname = \"x\"\n");
        let deps = gatherer(tmp.path()).dependencies();
        assert!(deps.starts_with("== Cargo.toml ==\n[package]"));
        assert!(deps.contains("== go.mod ==\nmodule example.com/x"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc\n... (truncated)");
    }
}
