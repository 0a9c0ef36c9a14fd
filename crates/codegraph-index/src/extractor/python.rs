use tree_sitter::Node;

use super::{
    CallSite, Definition, ImportSpec, SyntaxProfile, field_text, is_field_of_parent,
    named_children, node_text, simple_name,
};
use crate::entity::EntityKind;

pub(super) struct PythonSyntax;

/// Parents whose identifier children bind names instead of using them.
const BINDING_PARENTS: &[&str] = &[
    "parameters",
    "lambda_parameters",
    "typed_parameter",
    "list_splat_pattern",
    "dictionary_splat_pattern",
    "aliased_import",
    "global_statement",
    "nonlocal_statement",
];

impl SyntaxProfile for PythonSyntax {
    fn definition<'t>(
        &self,
        node: Node<'t>,
        src: &str,
        parent: EntityKind,
    ) -> Option<Definition<'t>> {
        match node.kind() {
            "function_definition" => {
                let name_node = node.child_by_field_name("name")?;
                let kind = if parent == EntityKind::Class {
                    EntityKind::Method
                } else {
                    EntityKind::Function
                };
                Some(
                    Definition::new(kind, node_text(name_node, src), Some(name_node))
                        .with_docstring(body_docstring(node, src)),
                )
            }
            "class_definition" => {
                let name_node = node.child_by_field_name("name")?;
                let bases = node
                    .child_by_field_name("superclasses")
                    .map(|args| {
                        named_children(args)
                            .into_iter()
                            .filter(|n| matches!(n.kind(), "identifier" | "attribute"))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(
                    Definition::new(EntityKind::Class, node_text(name_node, src), Some(name_node))
                        .with_bases(bases)
                        .with_docstring(body_docstring(node, src)),
                )
            }
            "assignment"
                if matches!(parent, EntityKind::Module | EntityKind::Class)
                    && node
                        .parent()
                        .is_some_and(|p| p.kind() == "expression_statement") =>
            {
                let left = node.child_by_field_name("left")?;
                (left.kind() == "identifier").then(|| {
                    Definition::new(EntityKind::Variable, node_text(left, src), Some(left))
                })
            }
            _ => None,
        }
    }

    fn imports(&self, node: Node<'_>, src: &str) -> Option<Vec<ImportSpec>> {
        match node.kind() {
            "import_statement" => Some(
                named_children(node)
                    .into_iter()
                    .filter_map(|child| match child.kind() {
                        "dotted_name" => Some(ImportSpec {
                            path: node_text(child, src).to_owned(),
                            names: Vec::new(),
                            alias: None,
                        }),
                        "aliased_import" => Some(ImportSpec {
                            path: field_text(child, "name", src)?.to_owned(),
                            names: Vec::new(),
                            alias: field_text(child, "alias", src).map(str::to_owned),
                        }),
                        _ => None,
                    })
                    .collect(),
            ),
            "import_from_statement" => {
                let module = node.child_by_field_name("module_name")?;
                let names = named_children(node)
                    .into_iter()
                    .filter(|child| child.id() != module.id())
                    .filter_map(|child| match child.kind() {
                        "dotted_name" => Some(simple_name(node_text(child, src))),
                        "aliased_import" => field_text(child, "name", src).map(simple_name),
                        _ => None,
                    })
                    .collect();
                Some(vec![ImportSpec {
                    path: node_text(module, src).to_owned(),
                    names,
                    alias: None,
                }])
            }
            _ => None,
        }
    }

    fn call<'t>(&self, node: Node<'t>, src: &str) -> Option<CallSite<'t>> {
        if node.kind() != "call" {
            return None;
        }
        let callee = node.child_by_field_name("function")?;
        match callee.kind() {
            "identifier" => Some(CallSite {
                name: node_text(callee, src).to_owned(),
                qualifier: None,
                callee,
            }),
            "attribute" => Some(CallSite {
                name: field_text(callee, "attribute", src)?.to_owned(),
                qualifier: field_text(callee, "object", src).map(simple_name),
                callee,
            }),
            _ => None,
        }
    }

    fn reference(&self, node: Node<'_>, src: &str) -> Option<String> {
        if node.kind() != "identifier" {
            return None;
        }
        let parent = node.parent()?;
        if BINDING_PARENTS.contains(&parent.kind())
            || is_field_of_parent(node, "name")
            || (parent.kind() == "attribute" && is_field_of_parent(node, "attribute"))
        {
            return None;
        }
        Some(node_text(node, src).to_owned())
    }

    fn module_docstring(&self, root: Node<'_>, src: &str) -> Option<String> {
        leading_string(root, src)
    }
}

fn body_docstring(node: Node<'_>, src: &str) -> Option<String> {
    leading_string(node.child_by_field_name("body")?, src)
}

/// A string literal as the first statement of a block.
fn leading_string(block: Node<'_>, src: &str) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let text = strip_string_quotes(node_text(literal, src)).trim().to_owned();
    (!text.is_empty()).then_some(text)
}

fn strip_string_quotes(text: &str) -> &str {
    let text = text.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B', 'f', 'F']);
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}
