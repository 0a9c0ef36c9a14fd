//! Relationship builder: structural containment from span nesting plus
//! name-resolved `calls` / `references` / `inherits` / `imports` edges.
//!
//! Resolution never guesses. A name resolves within its own file first, then
//! through an explicit import whose module exists in the repository exactly
//! once; anything else produces no edge. A Go package is every Go file in one
//! directory, and a name must be defined in exactly one of them.

use std::collections::HashMap;
use std::path::Path;

use crate::entity::{EdgeKind, Entity, EntityKind, META_LINE, Relationship};
use crate::extractor::{FileExtraction, RefSite};
use crate::languages::Lang;

const SELF_QUALIFIERS: &[&str] = &["self", "this", "Self", "cls", "super"];

/// Build every edge for a repository. Output is sorted by
/// `(source, target, kind)` and free of duplicates.
#[must_use]
pub fn build_relationships(files: &[FileExtraction]) -> Vec<Relationship> {
    let resolver = Resolver::new(files);
    let mut edges = Vec::new();

    for file in files {
        containment(file, &mut edges);
    }

    for (file_idx, file) in files.iter().enumerate() {
        for site in &file.sites {
            let Some((target_file, target)) = resolver.resolve(file_idx, site) else {
                continue;
            };
            let source = &file.entities[site.from];
            let target = &files[target_file].entities[target];
            if source.id == target.id {
                continue;
            }
            edges.push(Relationship::new(&source.id, &target.id, site.kind).with_line(site.line));
        }

        for binding in &file.imports {
            let Some(module) = resolver.module_for(file.language, &binding.path, &[]) else {
                continue;
            };
            let Some(&module_file) = module.first() else {
                continue;
            };
            if module.contains(&file_idx) {
                continue;
            }
            let import = &file.entities[binding.entity];
            edges.push(
                Relationship::new(&import.id, &files[module_file].entities[0].id, EdgeKind::Imports)
                    .with_line(import.start_line),
            );
        }
    }

    edges.sort_by(|a, b| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then_with(|| line_of(a).cmp(&line_of(b)))
    });
    edges.dedup_by(|a, b| a.sort_key() == b.sort_key());
    edges
}

fn line_of(edge: &Relationship) -> i64 {
    edge.metadata
        .get(META_LINE)
        .and_then(crate::entity::MetaValue::as_int)
        .unwrap_or(0)
}

/// Innermost container by byte span. Entities arrive in pre-order, so a
/// stack sweep finds each parent.
fn containment(file: &FileExtraction, edges: &mut Vec<Relationship>) {
    let mut stack: Vec<usize> = Vec::new();
    for (idx, entity) in file.entities.iter().enumerate() {
        let span = &file.spans[idx];
        while let Some(&top) = stack.last() {
            let outer = &file.spans[top];
            if outer.start <= span.start && span.end <= outer.end {
                break;
            }
            stack.pop();
        }
        if let Some(&parent) = stack.last() {
            edges.push(Relationship::new(
                &file.entities[parent].id,
                &entity.id,
                EdgeKind::Contains,
            ));
        }
        if entity.kind.is_container() {
            stack.push(idx);
        }
    }
}

struct Resolver<'a> {
    files: &'a [FileExtraction],
    by_name: Vec<HashMap<&'a str, Vec<usize>>>,
    module_keys: Vec<Vec<String>>,
}

impl<'a> Resolver<'a> {
    fn new(files: &'a [FileExtraction]) -> Self {
        let by_name = files
            .iter()
            .map(|file| {
                let mut map: HashMap<&str, Vec<usize>> = HashMap::new();
                for (idx, entity) in file.entities.iter().enumerate() {
                    if entity.kind != EntityKind::Import {
                        map.entry(entity.name.as_str()).or_default().push(idx);
                    }
                }
                map
            })
            .collect();
        let module_keys = files
            .iter()
            .map(|f| module_key(&f.path, f.language))
            .collect();
        Self {
            files,
            by_name,
            module_keys,
        }
    }

    fn resolve(&self, file_idx: usize, site: &RefSite) -> Option<(usize, usize)> {
        let kinds = accepted_kinds(site);
        let qualifier = site
            .qualifier
            .as_deref()
            .filter(|q| !SELF_QUALIFIERS.contains(q));

        if let Some(q) = qualifier
            && let Some(module) = self.module_for_qualifier(file_idx, q)
            && let Some(hit) = self.pick_unique(&module, &site.name, kinds)
        {
            return Some(hit);
        }

        if let Some(target) = self.pick(file_idx, &site.name, kinds, Some(site.from), false) {
            return Some((file_idx, target));
        }

        let file = &self.files[file_idx];
        if file.language == Lang::Go {
            let siblings: Vec<usize> = self
                .go_package(&self.module_keys[file_idx])
                .into_iter()
                .filter(|&idx| idx != file_idx)
                .collect();
            if let Some(hit) = self.pick_unique(&siblings, &site.name, kinds) {
                return Some(hit);
            }
        }

        file.imports
            .iter()
            .filter(|b| b.names.iter().any(|n| *n == site.name))
            .find_map(|b| {
                let module = self.module_for(file.language, &b.path, &[])?;
                self.pick_unique(&module, &site.name, kinds)
            })
    }

    /// Top-level `name` defined in exactly one file of `module`.
    fn pick_unique(
        &self,
        module: &[usize],
        name: &str,
        kinds: &[EntityKind],
    ) -> Option<(usize, usize)> {
        let mut hits = module
            .iter()
            .filter_map(|&file| Some((file, self.pick(file, name, kinds, None, true)?)));
        let first = hits.next()?;
        hits.next().is_none().then_some(first)
    }

    /// Best candidate named `name` in `file_idx`, ranked by kind preference,
    /// then position, then id.
    fn pick(
        &self,
        file_idx: usize,
        name: &str,
        kinds: &[EntityKind],
        exclude: Option<usize>,
        top_level_only: bool,
    ) -> Option<usize> {
        let entities = &self.files[file_idx].entities;
        self.by_name[file_idx]
            .get(name)?
            .iter()
            .copied()
            .filter(|&idx| Some(idx) != exclude)
            .filter(|&idx| !top_level_only || entities[idx].is_top_level())
            .filter_map(|idx| {
                let rank = kinds.iter().position(|k| *k == entities[idx].kind)?;
                Some((rank, entities[idx].start_line, entities[idx].id.as_str(), idx))
            })
            .min()
            .map(|(_, _, _, idx)| idx)
    }

    fn module_for_qualifier(&self, file_idx: usize, qualifier: &str) -> Option<Vec<usize>> {
        let file = &self.files[file_idx];
        file.imports.iter().find_map(|b| {
            let segments = import_segments(file.language, &b.path);
            let bound = b.alias.as_deref().or(segments.last().map(String::as_str));
            if bound == Some(qualifier) {
                self.module_for(file.language, &b.path, &[])
            } else if b.names.iter().any(|n| n == qualifier) {
                self.module_for(file.language, &b.path, &[qualifier])
            } else {
                None
            }
        })
    }

    /// Files of the unique repository module matching an import path,
    /// sorted by path. Longer keys that end with the path also match;
    /// exact-length keys win ties.
    fn module_for(&self, lang: Lang, path: &str, extra: &[&str]) -> Option<Vec<usize>> {
        let mut segments = import_segments(lang, path);
        segments.extend(extra.iter().map(|s| (*s).to_owned()));
        if segments.is_empty() {
            return None;
        }
        if lang == Lang::Go {
            return self.go_import(&segments);
        }
        let matches: Vec<usize> = self
            .module_keys
            .iter()
            .enumerate()
            .filter(|&(idx, key)| self.files[idx].language != Lang::Go && key.ends_with(&segments))
            .map(|(idx, _)| idx)
            .collect();
        match matches.as_slice() {
            [one] => Some(vec![*one]),
            [] => None,
            many => {
                let exact: Vec<usize> = many
                    .iter()
                    .copied()
                    .filter(|&idx| self.module_keys[idx].len() == segments.len())
                    .collect();
                (exact.len() == 1).then_some(exact)
            }
        }
    }

    /// Go import paths carry a module prefix the repository layout lacks, so
    /// the longest package directory the path ends with wins.
    fn go_import(&self, segments: &[String]) -> Option<Vec<usize>> {
        let key = self
            .module_keys
            .iter()
            .enumerate()
            .filter(|&(idx, key)| {
                self.files[idx].language == Lang::Go && !key.is_empty() && segments.ends_with(key)
            })
            .map(|(_, key)| key)
            .max_by_key(|key| key.len())?;
        Some(self.go_package(key))
    }

    /// Every Go file in the directory `key`, sorted by path.
    fn go_package(&self, key: &[String]) -> Vec<usize> {
        let mut package: Vec<usize> = (0..self.files.len())
            .filter(|&idx| self.files[idx].language == Lang::Go && self.module_keys[idx] == key)
            .collect();
        package.sort_by(|&a, &b| self.files[a].path.cmp(&self.files[b].path));
        package
    }
}

fn accepted_kinds(site: &RefSite) -> &'static [EntityKind] {
    let on_self = site
        .qualifier
        .as_deref()
        .is_some_and(|q| SELF_QUALIFIERS.contains(&q));
    match site.kind {
        EdgeKind::Calls if on_self => &[EntityKind::Method, EntityKind::Function],
        EdgeKind::Calls => &[EntityKind::Function, EntityKind::Method, EntityKind::Class],
        EdgeKind::Inherits => &[EntityKind::Class],
        EdgeKind::References => &[EntityKind::Class, EntityKind::Variable],
        EdgeKind::Contains | EdgeKind::Imports => &[],
    }
}

/// Path segments identifying a file as an importable module.
fn module_key(path: &str, lang: Lang) -> Vec<String> {
    let path = Path::new(path);
    let mut segments: Vec<String> = path
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| c.as_os_str().to_str())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    if lang == Lang::Go {
        // Go imports name packages, i.e. directories.
        return segments;
    }
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        && !lang.package_stems().contains(&stem)
    {
        segments.push(stem.to_owned());
    }
    segments
}

/// Normalised segments of an import path as written in `lang`. Relative
/// markers are dropped; bare JS package specifiers never refer to repository
/// files.
fn import_segments(lang: Lang, path: &str) -> Vec<String> {
    let parts: Vec<&str> = match lang {
        Lang::Python => path.trim_start_matches('.').split('.').collect(),
        Lang::Rust => path
            .split("::")
            .filter(|s| !matches!(*s, "crate" | "self" | "super"))
            .collect(),
        Lang::JavaScript | Lang::TypeScript | Lang::Tsx => {
            if !path.starts_with('.') && !path.starts_with('/') {
                return Vec::new();
            }
            let mut parts: Vec<&str> = path
                .split('/')
                .filter(|s| !matches!(*s, "" | "." | ".."))
                .collect();
            if let Some(last) = parts.last_mut() {
                *last = last.split('.').next().unwrap_or(last);
            }
            if parts.last() == Some(&"index") {
                parts.pop();
            }
            parts
        }
        Lang::Go => path.split('/').collect(),
    };
    parts
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Every entity of the extracted files, in file then pre-order.
#[must_use]
pub fn all_entities(files: &[FileExtraction]) -> Vec<Entity> {
    files.iter().flat_map(|f| f.entities.iter().cloned()).collect()
}
