//! Default fallback parser (spec.md §4.2): invoked for every extension
//! without a dedicated provider. Extracts imports and top-level
//! identifiers via line-level heuristics rather than a real grammar,
//! mirroring the teacher's `regex`/`markdown` extractors, which are
//! themselves pattern-based rather than full parses.

use std::collections::HashMap;
use std::path::Path;

use patterns::{IMPORT_LIKE, TOP_LEVEL_DEF};

use super::{ParseOutput, ParsedSymbol};
use crate::index::{FileRecord, SymbolKind};

pub struct FallbackParser;

impl FallbackParser {
    pub fn parse(&self, path: &Path, content: &str) -> Result<ParseOutput, String> {
        let language = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mut symbols = HashMap::new();
        let mut imports = Vec::new();
        let mut symbols_by_kind: HashMap<String, Vec<String>> = HashMap::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            let trimmed = line.trim();

            if IMPORT_LIKE.is_match(trimmed) {
                imports.push(trimmed.to_string());
                continue;
            }

            if let Some(caps) = TOP_LEVEL_DEF.captures(trimmed) {
                let name = caps.name("name").map(|m| m.as_str()).unwrap_or("");
                if name.is_empty() {
                    continue;
                }
                let kind = if trimmed.starts_with("class ") {
                    SymbolKind::Class
                } else {
                    SymbolKind::Function
                };
                symbols_by_kind
                    .entry(kind_name(kind).to_string())
                    .or_default()
                    .push(name.to_string());
                symbols.insert(
                    name.to_string(),
                    ParsedSymbol {
                        kind,
                        line: line_no,
                        signature: Some(trimmed.to_string()),
                    },
                );
            }
        }

        let line_count = content.lines().count();

        Ok(ParseOutput {
            symbols,
            // Line-oriented heuristics can't reliably tell a call site from
            // any other parenthesized text, so the fallback parser leaves
            // call-graph edges to the dedicated providers.
            references: Vec::new(),
            file_info: FileRecord {
                language,
                line_count,
                symbols_by_kind,
                imports,
                exports: Vec::new(),
            },
        })
    }
}

fn kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Function => "function",
        SymbolKind::Class => "class",
        _ => "other",
    }
}

/// Heuristic regexes shared by the fallback parser. Kept in their own
/// tiny module so the patterns are compiled once per process rather than
/// once per file parsed.
mod patterns {
    use regex::Regex;
    use std::sync::LazyLock;

    pub static IMPORT_LIKE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(import\s|from\s.+\simport\b|#include\s|use\s.+;|require\()").unwrap()
    });

    pub static TOP_LEVEL_DEF: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(def|class|function|fn|func)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)").unwrap()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_imports_and_top_level_defs() {
        let parser = FallbackParser;
        let content = "import os\n\ndef handle(x):\n    return x\n";
        let out = parser.parse(Path::new("a.py"), content).unwrap();
        assert_eq!(out.file_info.imports, vec!["import os".to_string()]);
        assert!(out.symbols.contains_key("handle"));
    }
}
