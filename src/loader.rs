//! Reads a working copy from disk into a [`FileTree`].

use std::path::Path;

use anyhow::Context;
use codegraph_index::FileTree;
use codegraph_index::languages::detect_language;
use ignore::WalkBuilder;

#[derive(Debug, Default)]
pub struct LoadedTree {
    pub tree: FileTree,
    /// Source files that were not valid UTF-8.
    pub unreadable: Vec<String>,
}

/// Walk `root`, honouring `.gitignore` unless `no_ignore` is set, and collect
/// every file with a supported language keyed by its `/`-separated relative
/// path.
///
/// # Errors
///
/// Returns an error if `root` is not a directory.
pub fn load_tree(root: &Path, no_ignore: bool) -> anyhow::Result<LoadedTree> {
    anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .ignore(!no_ignore)
        .git_ignore(!no_ignore)
        .git_exclude(!no_ignore)
        .git_global(!no_ignore)
        .parents(!no_ignore)
        .require_git(false);

    let mut loaded = LoadedTree::default();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("walk error: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if detect_language(path).is_none() {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        let Some(rel) = rel.to_str().map(|s| s.replace('\\', "/")) else {
            continue;
        };
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        match String::from_utf8(bytes) {
            Ok(content) => {
                loaded.tree.insert(rel, content);
            }
            Err(_) => {
                tracing::debug!(path = %rel, "skipping non-UTF-8 file");
                loaded.unreadable.push(rel);
            }
        }
    }
    tracing::debug!(root = %root.display(), files = loaded.tree.len(), "working copy loaded");
    Ok(loaded)
}

/// Repository id derived from the directory name: ASCII alphanumerics plus
/// `-` and `_`, everything else mapped to `-`.
#[must_use]
pub fn repository_id_for(root: &Path) -> String {
    let name = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let id: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let id = id.trim_matches('-');
    if id.is_empty() {
        "repository".to_owned()
    } else {
        id.to_owned()
    }
}
