//! JavaScript and TypeScript share one profile; the TypeScript grammar only
//! adds node kinds (interfaces, type annotations) on top of JavaScript's.

use tree_sitter::Node;

use super::{
    CallSite, Definition, ImportSpec, SyntaxProfile, field_text, is_field_of_parent,
    named_children, node_text, preceding_comments, simple_name, strip_block_doc,
};
use crate::entity::EntityKind;

pub(super) struct JsSyntax;

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

const BINDING_PARENTS: &[&str] = &[
    "formal_parameters",
    "required_parameter",
    "optional_parameter",
    "import_specifier",
    "namespace_import",
    "import_clause",
];

impl SyntaxProfile for JsSyntax {
    fn definition<'t>(
        &self,
        node: Node<'t>,
        src: &str,
        parent: EntityKind,
    ) -> Option<Definition<'t>> {
        let named = |kind: EntityKind, field: &str| {
            let name_node = node.child_by_field_name(field)?;
            Some(
                Definition::new(kind, node_text(name_node, src), Some(name_node))
                    .with_docstring(jsdoc(node, src)),
            )
        };
        match node.kind() {
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                named(EntityKind::Function, "name")
            }
            "class_declaration" | "abstract_class_declaration" => {
                let bases = named_children(node)
                    .into_iter()
                    .filter(|n| n.kind() == "class_heritage")
                    .flat_map(heritage_names)
                    .collect();
                named(EntityKind::Class, "name").map(|d| d.with_bases(bases))
            }
            "interface_declaration" => {
                let bases = named_children(node)
                    .into_iter()
                    .filter(|n| n.kind() == "extends_type_clause")
                    .flat_map(heritage_names)
                    .collect();
                named(EntityKind::Class, "name").map(|d| d.with_bases(bases))
            }
            "method_definition" | "abstract_method_signature" | "method_signature" => {
                named(EntityKind::Method, "name")
            }
            "public_field_definition" | "field_definition" => {
                let value = node.child_by_field_name("value")?;
                if !FUNCTION_VALUES.contains(&value.kind()) {
                    return None;
                }
                named(EntityKind::Method, "name").or_else(|| named(EntityKind::Method, "property"))
            }
            "variable_declarator" => {
                let name_node = node.child_by_field_name("name")?;
                if name_node.kind() != "identifier" {
                    return None;
                }
                let is_function = node
                    .child_by_field_name("value")
                    .is_some_and(|v| FUNCTION_VALUES.contains(&v.kind()));
                let kind = if is_function {
                    EntityKind::Function
                } else if parent == EntityKind::Module {
                    EntityKind::Variable
                } else {
                    return None;
                };
                Some(
                    Definition::new(kind, node_text(name_node, src), Some(name_node))
                        .with_docstring(jsdoc(node, src)),
                )
            }
            _ => None,
        }
    }

    fn imports(&self, node: Node<'_>, src: &str) -> Option<Vec<ImportSpec>> {
        if node.kind() != "import_statement" {
            return None;
        }
        let source = field_text(node, "source", src)?;
        let mut spec = ImportSpec {
            path: source.trim_matches(['"', '\'', '`']).to_owned(),
            names: Vec::new(),
            alias: None,
        };
        for clause in named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "import_clause")
        {
            for part in named_children(clause) {
                match part.kind() {
                    "identifier" => spec.names.push(node_text(part, src).to_owned()),
                    "named_imports" => {
                        for specifier in named_children(part) {
                            if let Some(name) = field_text(specifier, "name", src) {
                                spec.names.push(name.to_owned());
                            }
                        }
                    }
                    "namespace_import" => {
                        spec.alias = named_children(part)
                            .first()
                            .map(|n| node_text(*n, src).to_owned());
                    }
                    _ => {}
                }
            }
        }
        Some(vec![spec])
    }

    fn call<'t>(&self, node: Node<'t>, src: &str) -> Option<CallSite<'t>> {
        let callee = match node.kind() {
            "call_expression" => node.child_by_field_name("function")?,
            "new_expression" => node.child_by_field_name("constructor")?,
            _ => return None,
        };
        match callee.kind() {
            "identifier" => Some(CallSite {
                name: node_text(callee, src).to_owned(),
                qualifier: None,
                callee,
            }),
            "member_expression" => Some(CallSite {
                name: field_text(callee, "property", src)?.to_owned(),
                qualifier: field_text(callee, "object", src).map(simple_name),
                callee,
            }),
            _ => None,
        }
    }

    fn reference(&self, node: Node<'_>, src: &str) -> Option<String> {
        if !matches!(node.kind(), "identifier" | "type_identifier") {
            return None;
        }
        let parent = node.parent()?;
        if BINDING_PARENTS.contains(&parent.kind())
            || is_field_of_parent(node, "name")
            || is_field_of_parent(node, "pattern")
        {
            return None;
        }
        Some(node_text(node, src).to_owned())
    }
}

fn heritage_names(clause: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut pending = vec![clause];
    while let Some(node) = pending.pop() {
        for child in named_children(node) {
            match child.kind() {
                "identifier" | "type_identifier" => out.push(child),
                "type_arguments" => {}
                _ => pending.push(child),
            }
        }
    }
    out.sort_by_key(tree_sitter::Node::start_byte);
    out
}

/// `/** */` block above the declaration, looking through `export` and the
/// `const` wrapper of a declarator.
fn jsdoc(node: Node<'_>, src: &str) -> Option<String> {
    let mut anchor = node;
    if anchor.kind() == "variable_declarator"
        && let Some(parent) = anchor.parent()
    {
        anchor = parent;
    }
    if let Some(parent) = anchor.parent()
        && parent.kind() == "export_statement"
    {
        anchor = parent;
    }
    preceding_comments(anchor, src, &[], |text| {
        text.starts_with("/**").then(|| strip_block_doc(text.trim())).flatten()
    })
}

#[cfg(all(test, feature = "lang-js"))]
mod tests {
    use crate::entity::{EdgeKind, EntityKind};
    use crate::extractor::extract_file;
    use crate::languages::Lang;

    const SRC: &str = "import { render, mount as m } from './view';\nimport * as api from \"../api\";\n\n/** Base widget. */\nexport class Widget extends Base {\n  draw() {\n    render(this.model);\n    api.fetchAll();\n  }\n}\n\nexport const make = () => new Widget();\nconst LIMIT = 3;\n";

    #[test]
    fn extracts_classes_methods_and_arrow_functions() {
        let out = extract_file("src/widget.js", SRC, Lang::JavaScript).unwrap();
        let widget = out.entities.iter().find(|e| e.name == "Widget").unwrap();
        assert_eq!(widget.kind, EntityKind::Class);
        assert_eq!(widget.docstring.as_deref(), Some("Base widget."));
        let draw = out.entities.iter().find(|e| e.name == "draw").unwrap();
        assert_eq!(draw.kind, EntityKind::Method);
        assert_eq!(draw.qualified_name(), "Widget.draw");
        let make = out.entities.iter().find(|e| e.name == "make").unwrap();
        assert_eq!(make.kind, EntityKind::Function);
        let limit = out.entities.iter().find(|e| e.name == "LIMIT").unwrap();
        assert_eq!(limit.kind, EntityKind::Variable);
    }

    #[test]
    fn imports_record_names_and_namespace_alias() {
        let out = extract_file("src/widget.js", SRC, Lang::JavaScript).unwrap();
        let imports = &out.imports;
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].path, "./view");
        assert_eq!(imports[0].names, vec!["render", "mount"]);
        assert_eq!(imports[1].path, "../api");
        assert_eq!(imports[1].alias.as_deref(), Some("api"));
    }

    #[test]
    fn calls_and_constructors_are_sites() {
        let out = extract_file("src/widget.js", SRC, Lang::JavaScript).unwrap();
        let calls: Vec<_> = out
            .sites
            .iter()
            .filter(|s| s.kind == EdgeKind::Calls)
            .map(|s| (s.name.as_str(), s.qualifier.as_deref()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("render", None),
                ("fetchAll", Some("api")),
                ("Widget", None)
            ]
        );
        assert!(
            out.sites
                .iter()
                .any(|s| s.kind == EdgeKind::Inherits && s.name == "Base")
        );
    }

    #[test]
    fn typescript_interfaces_are_classes() {
        let src = "interface Shape extends Named {\n  area(): number;\n}\n";
        let out = extract_file("src/shape.ts", src, Lang::TypeScript).unwrap();
        let shape = out.entities.iter().find(|e| e.name == "Shape").unwrap();
        assert_eq!(shape.kind, EntityKind::Class);
        assert!(
            out.sites
                .iter()
                .any(|s| s.kind == EdgeKind::Inherits && s.name == "Named")
        );
    }
}
