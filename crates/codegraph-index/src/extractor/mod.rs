//! Entity extraction: tree-sitter parse → uniform [`Entity`] records plus the
//! unresolved reference sites the relationship builder consumes.
//!
//! One generic walker drives a per-language [`SyntaxProfile`]; adding a
//! language means adding a profile, not branching inside the walker.

mod go;
mod javascript;
mod python;
mod rust;

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::entity::{
    EdgeKind, Entity, EntityKind, META_IMPORT_PATH, META_IMPORTED_NAMES, META_LANGUAGE,
    META_QUALIFIED_NAME, MetaValue, Metadata, entity_id,
};
use crate::error::ParseError;
use crate::languages::Lang;

/// A definition recognised by a language profile.
pub(crate) struct Definition<'t> {
    pub kind: EntityKind,
    pub name: String,
    /// Identifier node naming the definition; never recorded as a reference.
    pub name_node: Option<Node<'t>>,
    /// Nodes naming parent types (`inherits` sites).
    pub bases: Vec<Node<'t>>,
    pub docstring: Option<String>,
    pub extra: Vec<(&'static str, MetaValue)>,
}

impl<'t> Definition<'t> {
    pub fn new(kind: EntityKind, name: impl Into<String>, name_node: Option<Node<'t>>) -> Self {
        Self {
            kind,
            name: name.into(),
            name_node,
            bases: Vec::new(),
            docstring: None,
            extra: Vec::new(),
        }
    }

    pub fn with_docstring(mut self, docstring: Option<String>) -> Self {
        self.docstring = docstring;
        self
    }

    pub fn with_bases(mut self, bases: Vec<Node<'t>>) -> Self {
        self.bases = bases;
        self
    }
}

/// One imported module as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportSpec {
    pub path: String,
    pub names: Vec<String>,
    pub alias: Option<String>,
}

pub(crate) struct CallSite<'t> {
    pub name: String,
    pub qualifier: Option<String>,
    pub callee: Node<'t>,
}

/// Language-specific knowledge of which syntax nodes mean what.
pub(crate) trait SyntaxProfile: Sync {
    fn definition<'t>(&self, node: Node<'t>, src: &str, parent: EntityKind)
    -> Option<Definition<'t>>;

    /// `Some` when `node` is an import statement; its subtree is not walked.
    fn imports(&self, node: Node<'_>, src: &str) -> Option<Vec<ImportSpec>>;

    fn call<'t>(&self, node: Node<'t>, src: &str) -> Option<CallSite<'t>>;

    /// Name used by a plain identifier that may refer to a class or variable.
    fn reference(&self, node: Node<'_>, src: &str) -> Option<String>;

    fn module_docstring(&self, _root: Node<'_>, _src: &str) -> Option<String> {
        None
    }
}

fn profile_for(lang: Lang) -> &'static dyn SyntaxProfile {
    match lang {
        Lang::Python => &python::PythonSyntax,
        Lang::Rust => &rust::RustSyntax,
        Lang::JavaScript | Lang::TypeScript | Lang::Tsx => &javascript::JsSyntax,
        Lang::Go => &go::GoSyntax,
    }
}

/// An unresolved use of a name inside entity `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RefSite {
    pub from: usize,
    pub name: String,
    pub qualifier: Option<String>,
    pub kind: EdgeKind,
    pub line: usize,
}

/// An import entity together with what it imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportBinding {
    pub entity: usize,
    pub path: String,
    pub names: Vec<String>,
    pub alias: Option<String>,
}

/// Everything extracted from one file. Entities are in pre-order, the file's
/// module entity first.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub path: String,
    pub language: Lang,
    pub entities: Vec<Entity>,
    pub(crate) spans: Vec<Range<usize>>,
    pub(crate) sites: Vec<RefSite>,
    pub(crate) imports: Vec<ImportBinding>,
}

/// Parse one file and extract its entities.
///
/// # Errors
///
/// Returns [`ParseError`] when no grammar is available or the source does not
/// parse cleanly for `lang`.
pub fn extract_file(path: &str, source: &str, lang: Lang) -> Result<FileExtraction, ParseError> {
    let grammar = lang
        .grammar()
        .ok_or_else(|| ParseError::new(path, format!("no grammar for {}", lang.id())))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| ParseError::new(path, format!("set_language failed: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::new(path, "parser returned no tree"))?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(ParseError::new(path, format!("syntax error at line {line}")));
    }

    let profile = profile_for(lang);
    let mut walker = Walker {
        src: source,
        path,
        lang,
        profile,
        out: FileExtraction {
            path: path.to_owned(),
            language: lang,
            entities: Vec::new(),
            spans: Vec::new(),
            sites: Vec::new(),
            imports: Vec::new(),
        },
        stack: Vec::new(),
        seen: HashMap::new(),
        skip: HashSet::new(),
        last_line: source.lines().count().max(1),
    };

    let module = walker.module_entity(profile.module_docstring(root, source));
    walker.stack.push(module);
    walker.visit_children(root);

    tracing::debug!(
        file = path,
        entities = walker.out.entities.len(),
        sites = walker.out.sites.len(),
        "extracted"
    );
    Ok(walker.out)
}

struct Walker<'a> {
    src: &'a str,
    path: &'a str,
    lang: Lang,
    profile: &'static dyn SyntaxProfile,
    out: FileExtraction,
    stack: Vec<usize>,
    seen: HashMap<String, usize>,
    skip: HashSet<usize>,
    last_line: usize,
}

impl Walker<'_> {
    fn module_entity(&mut self, docstring: Option<String>) -> usize {
        let name = Path::new(self.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(self.path)
            .to_owned();
        let mut metadata = Metadata::new();
        metadata.insert(META_QUALIFIED_NAME.into(), self.path.into());
        metadata.insert(META_LANGUAGE.into(), self.lang.id().into());
        let entity = Entity {
            id: entity_id(self.path, self.path, 1, self.last_line),
            kind: EntityKind::Module,
            name,
            file_path: self.path.to_owned(),
            start_line: 1,
            end_line: self.last_line,
            signature: None,
            docstring,
            metadata,
        };
        self.push_entity(entity, 0..self.src.len())
    }

    fn visit_children(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        if self.skip.contains(&node.id()) {
            return;
        }
        let current = self.current();
        let parent_kind = self.out.entities[current].kind;

        if let Some(specs) = self.profile.imports(node, self.src) {
            for spec in specs {
                self.add_import(node, spec);
            }
            return;
        }

        if let Some(def) = self.profile.definition(node, self.src, parent_kind) {
            let idx = self.add_definition(node, &def);
            if let Some(name_node) = def.name_node {
                self.skip.insert(name_node.id());
            }
            for base in def.bases {
                self.skip.insert(base.id());
                let name = simple_name(node_text(base, self.src));
                if !name.is_empty() {
                    self.site(idx, name, None, EdgeKind::Inherits, base);
                }
            }
            self.stack.push(idx);
            self.visit_children(node);
            self.stack.pop();
            return;
        }

        if let Some(call) = self.profile.call(node, self.src) {
            self.skip.insert(call.callee.id());
            self.site(current, call.name, call.qualifier, EdgeKind::Calls, node);
        } else if let Some(name) = self.profile.reference(node, self.src) {
            self.site(current, name, None, EdgeKind::References, node);
        }
        self.visit_children(node);
    }

    fn current(&self) -> usize {
        self.stack.last().copied().unwrap_or(0)
    }

    fn qualified(&self, name: &str) -> String {
        let mut parts: Vec<&str> = self
            .stack
            .iter()
            .skip(1)
            .map(|&i| self.out.entities[i].name.as_str())
            .collect();
        parts.push(name);
        parts.join(".")
    }

    fn lines(&self, node: Node<'_>) -> (usize, usize) {
        let start = node.start_position().row + 1;
        let end_pos = node.end_position();
        // A node ending at column 0 stops before that line.
        let end = if end_pos.column == 0 && end_pos.row + 1 > start {
            end_pos.row
        } else {
            end_pos.row + 1
        };
        (start, end.clamp(start, self.last_line.max(start)))
    }

    fn add_definition(&mut self, node: Node<'_>, def: &Definition<'_>) -> usize {
        let (start_line, end_line) = self.lines(node);
        let qualified = self.qualified(&def.name);
        let mut metadata = Metadata::new();
        metadata.insert(META_QUALIFIED_NAME.into(), qualified.clone().into());
        metadata.insert(META_LANGUAGE.into(), self.lang.id().into());
        for (key, value) in &def.extra {
            metadata.insert((*key).to_owned(), value.clone());
        }
        let entity = Entity {
            id: entity_id(self.path, &qualified, start_line, end_line),
            kind: def.kind,
            name: def.name.clone(),
            file_path: self.path.to_owned(),
            start_line,
            end_line,
            signature: first_line(node_text(node, self.src)),
            docstring: def.docstring.clone(),
            metadata,
        };
        self.push_entity(entity, node.byte_range())
    }

    fn add_import(&mut self, node: Node<'_>, spec: ImportSpec) {
        let (start_line, end_line) = self.lines(node);
        let qualified = self.qualified(&spec.path);
        let mut metadata = Metadata::new();
        metadata.insert(META_QUALIFIED_NAME.into(), qualified.clone().into());
        metadata.insert(META_LANGUAGE.into(), self.lang.id().into());
        metadata.insert(META_IMPORT_PATH.into(), spec.path.clone().into());
        if !spec.names.is_empty() {
            metadata.insert(META_IMPORTED_NAMES.into(), spec.names.join(",").into());
        }
        if let Some(alias) = &spec.alias {
            metadata.insert("import_alias".into(), alias.clone().into());
        }
        let entity = Entity {
            id: entity_id(self.path, &qualified, start_line, end_line),
            kind: EntityKind::Import,
            name: spec.path.clone(),
            file_path: self.path.to_owned(),
            start_line,
            end_line,
            signature: first_line(node_text(node, self.src)),
            docstring: None,
            metadata,
        };
        let idx = self.push_entity(entity, node.byte_range());
        if self.out.imports.iter().all(|b| b.entity != idx) {
            self.out.imports.push(ImportBinding {
                entity: idx,
                path: spec.path,
                names: spec.names,
                alias: spec.alias,
            });
        }
    }

    /// Identical ids (same path, qualified name and span) collapse onto the
    /// first entity.
    fn push_entity(&mut self, entity: Entity, span: Range<usize>) -> usize {
        if let Some(&idx) = self.seen.get(&entity.id) {
            return idx;
        }
        let idx = self.out.entities.len();
        self.seen.insert(entity.id.clone(), idx);
        self.out.entities.push(entity);
        self.out.spans.push(span);
        idx
    }

    fn site(
        &mut self,
        from: usize,
        name: String,
        qualifier: Option<String>,
        kind: EdgeKind,
        at: Node<'_>,
    ) {
        self.out.sites.push(RefSite {
            from,
            name,
            qualifier,
            kind,
            line: at.start_position().row + 1,
        });
    }
}

fn first_error_line(node: Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let count = u32::try_from(node.child_count()).unwrap_or(u32::MAX);
    for i in 0..count {
        let Some(child) = node.child(i) else {
            continue;
        };
        if child.has_error()
            && let Some(line) = first_error_line(child)
        {
            return Some(line);
        }
    }
    None
}

pub(crate) fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    (0..count).filter_map(|i| node.named_child(i)).collect()
}

pub(crate) fn node_text<'s>(node: Node<'_>, src: &'s str) -> &'s str {
    src.get(node.byte_range()).unwrap_or("")
}

pub(crate) fn field_text<'s>(node: Node<'_>, field: &str, src: &'s str) -> Option<&'s str> {
    node.child_by_field_name(field).map(|n| node_text(n, src))
}

/// Whether `node` is the child stored under `field` in its parent.
pub(crate) fn is_field_of_parent(node: Node<'_>, field: &str) -> bool {
    node.parent()
        .and_then(|p| p.child_by_field_name(field))
        .is_some_and(|n| n.id() == node.id())
}

/// Last path segment of a dotted or `::` path, without generic arguments.
pub(crate) fn simple_name(text: &str) -> String {
    let head = text
        .split(['<', '[', '(', '{'])
        .next()
        .unwrap_or_default()
        .trim();
    head.rsplit(['.', ':', '/'])
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .trim()
        .to_owned()
}

pub(crate) fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_owned)
}

/// Contiguous comment block directly above `anchor`, skipping attribute-like
/// siblings. `accept` strips the comment markers or rejects the line.
pub(crate) fn preceding_comments(
    anchor: Node<'_>,
    src: &str,
    skip_kinds: &[&str],
    accept: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    let mut lines = Vec::new();
    let mut next_row = anchor.start_position().row;
    let mut current = anchor.prev_named_sibling();
    while let Some(sibling) = current {
        if sibling.end_position().row + 1 < next_row {
            break;
        }
        if skip_kinds.contains(&sibling.kind()) {
            next_row = sibling.start_position().row;
            current = sibling.prev_named_sibling();
            continue;
        }
        if !sibling.kind().contains("comment") {
            break;
        }
        let Some(text) = accept(node_text(sibling, src)) else {
            break;
        };
        lines.push(text);
        next_row = sibling.start_position().row;
        current = sibling.prev_named_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    let joined = lines.join("\n").trim().to_owned();
    (!joined.is_empty()).then_some(joined)
}

/// Strip a `/** ... */` block down to its text.
pub(crate) fn strip_block_doc(text: &str) -> Option<String> {
    let body = text.strip_prefix("/**")?.strip_suffix("*/")?;
    let cleaned: Vec<&str> = body
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect();
    Some(cleaned.join("\n"))
}
