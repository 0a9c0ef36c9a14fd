//! Language detection and tree-sitter grammar registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Directory names never descended into.
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    ".venv",
    "venv",
    "dist",
    "build",
    "target",
    ".next",
    "coverage",
];

/// File name suffixes of generated bundles.
const IGNORED_SUFFIXES: &[&str] = &[".min.js", ".bundle.js"];

/// Supported language with its tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

impl Lang {
    /// Identifier stored in entity metadata.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Go => "go",
        }
    }

    /// Get the tree-sitter grammar. Returns `None` if the
    /// corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-js")]
            Self::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            #[cfg(feature = "lang-go")]
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// File stems that name their parent directory as a module
    /// (`pkg/__init__.py` is module `pkg`).
    #[must_use]
    pub fn package_stems(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["__init__"],
            Self::JavaScript | Self::TypeScript | Self::Tsx => &["index"],
            Self::Rust => &["mod", "lib", "main"],
            Self::Go => &[],
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "rs" => Some(Lang::Rust),
        "py" | "pyi" => Some(Lang::Python),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "ts" | "mts" | "cts" => Some(Lang::TypeScript),
        "tsx" => Some(Lang::Tsx),
        "go" => Some(Lang::Go),
        _ => None,
    }
}

/// Whether the path sits under an ignored directory or is a generated bundle.
#[must_use]
pub fn is_ignored(path: &str) -> bool {
    let path = path.replace('\\', "/");
    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_some() && IGNORED_DIRS.contains(&segment) {
            return true;
        }
        if segments.peek().is_none() {
            return IGNORED_SUFFIXES.iter().any(|s| segment.ends_with(s));
        }
    }
    false
}

/// Check if a file should be indexed (has a supported language with grammar).
#[must_use]
pub fn is_indexable(path: &str) -> bool {
    !is_ignored(path)
        && detect_language(Path::new(path))
            .and_then(Lang::grammar)
            .is_some()
}
