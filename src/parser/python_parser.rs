//! Illustrative tree-sitter backed Python parser provider (see
//! `rust_parser.rs` for the shared tree-walk idiom this mirrors).

use std::collections::HashMap;
use std::path::Path;

use tree_sitter::{Node, Parser};

use super::{ParseOutput, ParsedReference, ParsedSymbol, ParserProvider};
use crate::index::{FileRecord, SymbolKind};

pub struct PythonParser;

impl ParserProvider for PythonParser {
    fn supported_extensions(&self) -> &[&'static str] {
        &["py"]
    }

    fn parse(&self, _path: &Path, content: &str) -> Result<ParseOutput, String> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| e.to_string())?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| "tree-sitter produced no parse tree".to_string())?;

        let mut symbols = HashMap::new();
        let mut imports = Vec::new();
        let mut symbols_by_kind: HashMap<String, Vec<String>> = HashMap::new();
        let mut references = Vec::new();

        walk(tree.root_node(), content, false, None, &mut |node, in_class, current_fn| {
            match node.kind() {
                "function_definition" => {
                    if let Some(name) = child_text(node, "name", content) {
                        let kind = if in_class {
                            SymbolKind::Method
                        } else {
                            SymbolKind::Function
                        };
                        insert(&mut symbols, &mut symbols_by_kind, name, kind, node, content);
                    }
                }
                "class_definition" => {
                    if let Some(name) = child_text(node, "name", content) {
                        insert(
                            &mut symbols,
                            &mut symbols_by_kind,
                            name,
                            SymbolKind::Class,
                            node,
                            content,
                        );
                    }
                }
                "import_statement" | "import_from_statement" => {
                    imports.push(node_text(node, content));
                }
                "call" => {
                    if let Some(func) = node.child_by_field_name("function") {
                        if let Some(callee_name) = callee_name_of(func, content) {
                            references.push(ParsedReference {
                                callee_name,
                                line: node.start_position().row as u32 + 1,
                                caller_name: current_fn.map(str::to_string),
                            });
                        }
                    }
                }
                _ => {}
            }
        });

        Ok(ParseOutput {
            symbols,
            references,
            file_info: FileRecord {
                language: "python".to_string(),
                line_count: content.lines().count(),
                symbols_by_kind,
                imports,
                exports: Vec::new(),
            },
        })
    }
}

fn walk<'a>(
    node: Node<'a>,
    source: &str,
    in_class: bool,
    current_fn: Option<String>,
    visit: &mut impl FnMut(Node<'a>, bool, Option<&str>),
) {
    let is_class = node.kind() == "class_definition";
    let next_fn = if node.kind() == "function_definition" {
        child_text(node, "name", source).or(current_fn)
    } else {
        current_fn
    };
    visit(node, in_class, next_fn.as_deref());
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, in_class || is_class, next_fn.clone(), visit);
    }
}

/// Resolve a `call` node's `function` field to a bare callee name: a plain
/// identifier, or the attribute name of a method call (`self.bar()`).
fn callee_name_of(func_node: Node, source: &str) -> Option<String> {
    match func_node.kind() {
        "identifier" => Some(node_text(func_node, source)),
        "attribute" => func_node
            .child_by_field_name("attribute")
            .map(|f| node_text(f, source)),
        _ => None,
    }
}

fn node_text(node: Node, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .to_string()
}

fn child_text(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

fn insert(
    symbols: &mut HashMap<String, ParsedSymbol>,
    symbols_by_kind: &mut HashMap<String, Vec<String>>,
    name: String,
    kind: SymbolKind,
    node: Node,
    source: &str,
) {
    let signature = node_text(node, source)
        .lines()
        .next()
        .map(|l| l.trim_end_matches(':').trim().to_string());
    symbols_by_kind
        .entry(kind_name(kind).to_string())
        .or_default()
        .push(name.clone());
    symbols.insert(
        name,
        ParsedSymbol {
            kind,
            line: node.start_position().row as u32 + 1,
            signature,
        },
    );
}

fn kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Function => "function",
        SymbolKind::Method => "method",
        SymbolKind::Class => "class",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_functions_classes_and_methods() {
        let parser = PythonParser;
        let content = "import os\n\nclass Foo:\n    def bar(self):\n        return 1\n\ndef baz():\n    return 2\n";
        let out = parser.parse(Path::new("a.py"), content).unwrap();
        assert!(out.symbols.contains_key("Foo"));
        assert!(out.symbols.contains_key("bar"));
        assert!(out.symbols.contains_key("baz"));
        assert_eq!(out.symbols.get("bar").unwrap().kind, SymbolKind::Method);
        assert_eq!(out.file_info.imports, vec!["import os".to_string()]);
    }

    #[test]
    fn records_call_edges_with_enclosing_function() {
        let parser = PythonParser;
        let content = "def helper():\n    return 1\n\ndef caller():\n    return helper()\n";
        let out = parser.parse(Path::new("a.py"), content).unwrap();
        let edge = out
            .references
            .iter()
            .find(|r| r.callee_name == "helper")
            .expect("helper call recorded");
        assert_eq!(edge.caller_name.as_deref(), Some("caller"));
    }
}
