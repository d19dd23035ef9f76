//! Illustrative tree-sitter backed Rust parser provider, grounded in the
//! teacher's `extractors::rust` tree-walk (match on `node.kind()`,
//! recurse into children), trimmed to the symbol shape `spec.md` §4.2
//! requires rather than the teacher's full relationship/type graph.

use std::collections::HashMap;
use std::path::Path;

use tree_sitter::{Node, Parser};

use super::{ParseOutput, ParsedReference, ParsedSymbol, ParserProvider};
use crate::index::{FileRecord, SymbolKind};

pub struct RustParser;

impl ParserProvider for RustParser {
    fn supported_extensions(&self) -> &[&'static str] {
        &["rs"]
    }

    fn parse(&self, _path: &Path, content: &str) -> Result<ParseOutput, String> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .map_err(|e| e.to_string())?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| "tree-sitter produced no parse tree".to_string())?;

        let mut symbols = HashMap::new();
        let mut imports = Vec::new();
        let mut symbols_by_kind: HashMap<String, Vec<String>> = HashMap::new();
        let mut references = Vec::new();

        walk(tree.root_node(), content, None, &mut |node, current_fn| {
            match node.kind() {
                "function_item" => {
                    if let Some(name) = child_text(node, "name", content) {
                        record(
                            &mut symbols,
                            &mut symbols_by_kind,
                            name,
                            SymbolKind::Function,
                            node,
                            Some(signature_line(node, content)),
                        );
                    }
                }
                "struct_item" => {
                    if let Some(name) = child_text(node, "name", content) {
                        record(
                            &mut symbols,
                            &mut symbols_by_kind,
                            name,
                            SymbolKind::Struct,
                            node,
                            None,
                        );
                    }
                }
                "enum_item" => {
                    if let Some(name) = child_text(node, "name", content) {
                        record(
                            &mut symbols,
                            &mut symbols_by_kind,
                            name,
                            SymbolKind::Enum,
                            node,
                            None,
                        );
                    }
                }
                "trait_item" => {
                    if let Some(name) = child_text(node, "name", content) {
                        record(
                            &mut symbols,
                            &mut symbols_by_kind,
                            name,
                            SymbolKind::Interface,
                            node,
                            None,
                        );
                    }
                }
                "const_item" | "static_item" => {
                    if let Some(name) = child_text(node, "name", content) {
                        record(
                            &mut symbols,
                            &mut symbols_by_kind,
                            name,
                            SymbolKind::Constant,
                            node,
                            None,
                        );
                    }
                }
                "use_declaration" => {
                    imports.push(node_text(node, content).trim_end_matches(';').to_string());
                }
                "call_expression" => {
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
                language: "rust".to_string(),
                line_count: content.lines().count(),
                symbols_by_kind,
                imports,
                exports: Vec::new(),
            },
        })
    }
}

/// Walk the tree, threading down the name of the nearest enclosing
/// `function_item` so callers can attribute call sites found deeper in the
/// tree (spec.md §3.1 `called_by`).
fn walk<'a>(
    node: Node<'a>,
    source: &str,
    current_fn: Option<String>,
    visit: &mut impl FnMut(Node<'a>, Option<&str>),
) {
    let next_fn = if node.kind() == "function_item" {
        child_text(node, "name", source).or(current_fn)
    } else {
        current_fn
    };
    visit(node, next_fn.as_deref());
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, next_fn.clone(), visit);
    }
}

/// Resolve a `call_expression`'s `function` field to a bare callee name:
/// a plain identifier, the last segment of a path (`Foo::bar`), or the
/// field name of a method call (`self.bar()`).
fn callee_name_of(func_node: Node, source: &str) -> Option<String> {
    match func_node.kind() {
        "identifier" => Some(node_text(func_node, source)),
        "field_expression" => func_node
            .child_by_field_name("field")
            .map(|f| node_text(f, source)),
        "scoped_identifier" => func_node
            .child_by_field_name("name")
            .map(|n| node_text(n, source)),
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

fn signature_line(node: Node, source: &str) -> String {
    node_text(node, source)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('{')
        .trim()
        .to_string()
}

fn record(
    symbols: &mut HashMap<String, ParsedSymbol>,
    symbols_by_kind: &mut HashMap<String, Vec<String>>,
    name: String,
    kind: SymbolKind,
    node: Node,
    signature: Option<String>,
) {
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
        SymbolKind::Struct => "struct",
        SymbolKind::Enum => "enum",
        SymbolKind::Interface => "interface",
        SymbolKind::Constant => "constant",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_functions_and_structs() {
        let parser = RustParser;
        let content = "use std::fmt;\n\npub struct Foo { x: i32 }\n\nfn bar() -> i32 { 1 }\n";
        let out = parser.parse(Path::new("a.rs"), content).unwrap();
        assert!(out.symbols.contains_key("Foo"));
        assert!(out.symbols.contains_key("bar"));
        assert_eq!(out.file_info.imports, vec!["use std::fmt".to_string()]);
    }

    #[test]
    fn records_call_edges_with_enclosing_function() {
        let parser = RustParser;
        let content = "fn helper() -> i32 { 1 }\n\nfn caller() -> i32 { helper() }\n";
        let out = parser.parse(Path::new("a.rs"), content).unwrap();
        let edge = out
            .references
            .iter()
            .find(|r| r.callee_name == "helper")
            .expect("helper call recorded");
        assert_eq!(edge.caller_name.as_deref(), Some("caller"));
    }
}
