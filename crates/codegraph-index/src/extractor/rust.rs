use tree_sitter::Node;

use super::{
    CallSite, Definition, ImportSpec, SyntaxProfile, field_text, is_field_of_parent,
    named_children, node_text, preceding_comments, simple_name, strip_block_doc,
};
use crate::entity::{EntityKind, MetaValue};

pub(super) struct RustSyntax;

const DOC_SKIP: &[&str] = &["attribute_item"];

impl SyntaxProfile for RustSyntax {
    fn definition<'t>(
        &self,
        node: Node<'t>,
        src: &str,
        parent: EntityKind,
    ) -> Option<Definition<'t>> {
        let named = |kind: EntityKind| {
            let name_node = node.child_by_field_name("name")?;
            Some(
                Definition::new(kind, node_text(name_node, src), Some(name_node))
                    .with_docstring(doc_comment(node, src)),
            )
        };
        match node.kind() {
            "function_item" | "function_signature_item" => named(if parent == EntityKind::Class {
                EntityKind::Method
            } else {
                EntityKind::Function
            }),
            "struct_item" | "enum_item" | "union_item" => named(EntityKind::Class),
            "trait_item" => {
                let bounds = node
                    .child_by_field_name("bounds")
                    .map(|b| {
                        named_children(b)
                            .into_iter()
                            .filter(|n| matches!(n.kind(), "type_identifier" | "scoped_type_identifier"))
                            .collect()
                    })
                    .unwrap_or_default();
                named(EntityKind::Class).map(|d| d.with_bases(bounds))
            }
            "impl_item" => {
                let ty = node.child_by_field_name("type")?;
                let mut def = Definition::new(EntityKind::Class, simple_name(node_text(ty, src)), None)
                    .with_docstring(doc_comment(node, src));
                if let Some(tr) = node.child_by_field_name("trait") {
                    def.extra
                        .push(("impl_trait", MetaValue::from(simple_name(node_text(tr, src)))));
                    def.bases.push(tr);
                }
                Some(def)
            }
            "mod_item" if node.child_by_field_name("body").is_some() => named(EntityKind::Module),
            "const_item" | "static_item" => named(EntityKind::Variable),
            _ => None,
        }
    }

    fn imports(&self, node: Node<'_>, src: &str) -> Option<Vec<ImportSpec>> {
        if node.kind() != "use_declaration" {
            return None;
        }
        let argument = node.child_by_field_name("argument")?;
        Some(use_tree(argument, src).into_iter().collect())
    }

    fn call<'t>(&self, node: Node<'t>, src: &str) -> Option<CallSite<'t>> {
        if node.kind() != "call_expression" {
            return None;
        }
        let callee = node.child_by_field_name("function")?;
        let target = if callee.kind() == "generic_function" {
            callee.child_by_field_name("function")?
        } else {
            callee
        };
        let (name, qualifier) = match target.kind() {
            "identifier" => (node_text(target, src).to_owned(), None),
            "field_expression" => (
                field_text(target, "field", src)?.to_owned(),
                field_text(target, "value", src).map(simple_name),
            ),
            "scoped_identifier" => (
                field_text(target, "name", src)?.to_owned(),
                field_text(target, "path", src).map(simple_name),
            ),
            _ => return None,
        };
        Some(CallSite {
            name,
            qualifier,
            callee,
        })
    }

    fn reference(&self, node: Node<'_>, src: &str) -> Option<String> {
        if !matches!(node.kind(), "identifier" | "type_identifier") {
            return None;
        }
        let parent = node.parent()?;
        let binds = matches!(
            parent.kind(),
            "parameter" | "let_declaration" | "closure_parameters" | "field_declaration"
        ) && (is_field_of_parent(node, "pattern") || is_field_of_parent(node, "name"));
        if binds || is_field_of_parent(node, "name") || parent.kind() == "closure_parameters" {
            return None;
        }
        Some(node_text(node, src).to_owned())
    }

    fn module_docstring(&self, root: Node<'_>, src: &str) -> Option<String> {
        let lines: Vec<String> = named_children(root)
            .into_iter()
            .take_while(|n| n.kind() == "line_comment" && node_text(*n, src).starts_with("//!"))
            .map(|n| node_text(n, src).trim_start_matches("//!").trim().to_owned())
            .collect();
        let joined = lines.join("\n").trim().to_owned();
        (!joined.is_empty()).then_some(joined)
    }
}

fn doc_comment(node: Node<'_>, src: &str) -> Option<String> {
    preceding_comments(node, src, DOC_SKIP, |text| {
        if let Some(rest) = text.strip_prefix("///") {
            (!rest.starts_with('/')).then(|| rest.trim().to_owned())
        } else {
            strip_block_doc(text.trim())
        }
    })
}

/// Flatten a `use` tree into one spec per imported path.
fn use_tree(node: Node<'_>, src: &str) -> Option<ImportSpec> {
    match node.kind() {
        "scoped_identifier" => Some(ImportSpec {
            path: field_text(node, "path", src).unwrap_or_default().to_owned(),
            names: vec![field_text(node, "name", src)?.to_owned()],
            alias: None,
        }),
        "identifier" | "crate" | "self" | "super" => Some(ImportSpec {
            path: node_text(node, src).to_owned(),
            names: Vec::new(),
            alias: None,
        }),
        "use_as_clause" => {
            let mut spec = use_tree(node.child_by_field_name("path")?, src)?;
            spec.alias = field_text(node, "alias", src).map(str::to_owned);
            Some(spec)
        }
        "scoped_use_list" => {
            let list = node.child_by_field_name("list")?;
            Some(ImportSpec {
                path: field_text(node, "path", src).unwrap_or_default().to_owned(),
                names: use_list_names(list, src),
                alias: None,
            })
        }
        "use_list" => Some(ImportSpec {
            path: String::new(),
            names: use_list_names(node, src),
            alias: None,
        }),
        "use_wildcard" => Some(ImportSpec {
            path: node_text(node, src).trim_end_matches("::*").to_owned(),
            names: Vec::new(),
            alias: None,
        }),
        _ => None,
    }
}

fn use_list_names(list: Node<'_>, src: &str) -> Vec<String> {
    named_children(list)
        .into_iter()
        .filter_map(|item| match item.kind() {
            "identifier" | "type_identifier" => Some(node_text(item, src).to_owned()),
            "scoped_identifier" => field_text(item, "name", src).map(str::to_owned),
            "use_as_clause" => field_text(item, "path", src).map(simple_name),
            _ => None,
        })
        .collect()
}
