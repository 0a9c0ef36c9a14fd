use tree_sitter::Node;

use super::{
    CallSite, Definition, ImportSpec, SyntaxProfile, field_text, is_field_of_parent,
    named_children, node_text, preceding_comments, simple_name,
};
use crate::entity::{EntityKind, MetaValue};

pub(super) struct GoSyntax;

impl SyntaxProfile for GoSyntax {
    fn definition<'t>(
        &self,
        node: Node<'t>,
        src: &str,
        parent: EntityKind,
    ) -> Option<Definition<'t>> {
        let kind = match node.kind() {
            "function_declaration" => EntityKind::Function,
            "method_declaration" => EntityKind::Method,
            "type_spec" => EntityKind::Class,
            "const_spec" | "var_spec" if parent == EntityKind::Module => EntityKind::Variable,
            _ => return None,
        };
        let name_node = node.child_by_field_name("name")?;
        let mut def = Definition::new(kind, node_text(name_node, src), Some(name_node))
            .with_docstring(go_doc(node, src));
        if kind == EntityKind::Method
            && let Some(receiver) = node
                .child_by_field_name("receiver")
                .and_then(|r| receiver_type(r, src))
        {
            def.extra.push(("receiver", MetaValue::from(receiver)));
        }
        Some(def)
    }

    fn imports(&self, node: Node<'_>, src: &str) -> Option<Vec<ImportSpec>> {
        if node.kind() != "import_declaration" {
            return None;
        }
        let mut specs = Vec::new();
        let mut pending = named_children(node);
        while let Some(child) = pending.pop() {
            match child.kind() {
                "import_spec" => {
                    let Some(path) = field_text(child, "path", src) else {
                        continue;
                    };
                    specs.push(ImportSpec {
                        path: path.trim_matches(['"', '`']).to_owned(),
                        names: Vec::new(),
                        alias: field_text(child, "name", src)
                            .filter(|a| *a != "_" && *a != ".")
                            .map(str::to_owned),
                    });
                }
                "import_spec_list" => pending.extend(named_children(child)),
                _ => {}
            }
        }
        specs.sort_by(|a, b| a.path.cmp(&b.path));
        Some(specs)
    }

    fn call<'t>(&self, node: Node<'t>, src: &str) -> Option<CallSite<'t>> {
        if node.kind() != "call_expression" {
            return None;
        }
        let callee = node.child_by_field_name("function")?;
        match callee.kind() {
            "identifier" => Some(CallSite {
                name: node_text(callee, src).to_owned(),
                qualifier: None,
                callee,
            }),
            "selector_expression" => Some(CallSite {
                name: field_text(callee, "field", src)?.to_owned(),
                qualifier: field_text(callee, "operand", src).map(simple_name),
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
        if is_field_of_parent(node, "name")
            || (parent.kind() == "expression_list"
                && parent
                    .parent()
                    .is_some_and(|p| p.kind() == "short_var_declaration")
                && is_field_of_parent(parent, "left"))
        {
            return None;
        }
        Some(node_text(node, src).to_owned())
    }

    fn module_docstring(&self, root: Node<'_>, src: &str) -> Option<String> {
        let package = named_children(root)
            .into_iter()
            .find(|n| n.kind() == "package_clause")?;
        line_comments_above(package, src)
    }
}

/// `//` comments above the declaration; specs inside a grouped declaration
/// fall back to the comment above the group.
fn go_doc(node: Node<'_>, src: &str) -> Option<String> {
    line_comments_above(node, src).or_else(|| {
        let parent = node.parent()?;
        matches!(
            parent.kind(),
            "type_declaration" | "const_declaration" | "var_declaration"
        )
        .then(|| line_comments_above(parent, src))
        .flatten()
    })
}

fn line_comments_above(node: Node<'_>, src: &str) -> Option<String> {
    preceding_comments(node, src, &[], |text| {
        text.strip_prefix("//").map(|rest| rest.trim().to_owned())
    })
}

fn receiver_type(receiver: Node<'_>, src: &str) -> Option<String> {
    let mut pending = vec![receiver];
    while let Some(node) = pending.pop() {
        if node.kind() == "type_identifier" {
            return Some(node_text(node, src).to_owned());
        }
        pending.extend(named_children(node).into_iter().rev());
    }
    None
}

#[cfg(all(test, feature = "lang-go"))]
mod tests {
    use crate::entity::{EdgeKind, EntityKind};
    use crate::extractor::extract_file;
    use crate::languages::Lang;

    const SRC: &str = "// Package shapes draws things.\npackage shapes\n\nimport (\n\t\"fmt\"\n\tgeo \"example.com/geo\"\n)\n\n// Circle is round.\ntype Circle struct {\n\tR float64\n}\n\n// Area computes the area.\nfunc (c *Circle) Area() float64 {\n\treturn scale(c.R)\n}\n\nfunc scale(x float64) float64 {\n\tfmt.Println(geo.Pi)\n\treturn x\n}\n";

    #[test]
    fn extracts_types_functions_and_methods() {
        let out = extract_file("shapes/circle.go", SRC, Lang::Go).unwrap();
        assert_eq!(
            out.entities[0].docstring.as_deref(),
            Some("Package shapes draws things.")
        );
        let circle = out.entities.iter().find(|e| e.name == "Circle").unwrap();
        assert_eq!(circle.kind, EntityKind::Class);
        assert_eq!(circle.docstring.as_deref(), Some("Circle is round."));
        let area = out.entities.iter().find(|e| e.name == "Area").unwrap();
        assert_eq!(area.kind, EntityKind::Method);
        assert_eq!(area.metadata["receiver"].as_str(), Some("Circle"));
        assert_eq!(area.docstring.as_deref(), Some("Area computes the area."));
    }

    #[test]
    fn grouped_imports_and_selector_calls() {
        let out = extract_file("shapes/circle.go", SRC, Lang::Go).unwrap();
        let paths: Vec<_> = out.imports.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["example.com/geo", "fmt"]);
        assert_eq!(out.imports[0].alias.as_deref(), Some("geo"));
        let calls: Vec<_> = out
            .sites
            .iter()
            .filter(|s| s.kind == EdgeKind::Calls)
            .map(|s| (s.name.as_str(), s.qualifier.as_deref()))
            .collect();
        assert_eq!(calls, vec![("scale", None), ("Println", Some("fmt"))]);
    }
}
