//! Parser Registry (spec.md §4.2 / C2).
//!
//! `spec.md` §1 places full per-language parsing out of scope: parsers are
//! pluggable providers returning a fixed symbol-record shape. This module
//! defines that seam ([`ParserProvider`]) and ships a small illustrative
//! set of providers (Rust, Python) plus the mandatory default fallback
//! that every extension without a dedicated provider uses.

mod fallback;
mod python_parser;
mod rust_parser;

pub use fallback::FallbackParser;
pub use python_parser::PythonParser;
pub use rust_parser::RustParser;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::index::{FileRecord, SymbolKind};

/// One symbol's fields, minus the `file` (the registry fills that in),
/// keyed by a name unique within the file (e.g. `name` or `Class.method`)
/// per spec.md §4.2.
#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub kind: SymbolKind,
    pub line: u32,
    pub signature: Option<String>,
}

/// A call/usage site found while parsing one file: `callee_name` was
/// referenced at `line`, optionally from within the body of `caller_name`.
/// The registry's caller threads these into the Index Store's call-graph
/// edges (spec.md §3.1 `SymbolRecord.called_by`/`references`).
#[derive(Debug, Clone)]
pub struct ParsedReference {
    pub callee_name: String,
    pub line: u32,
    pub caller_name: Option<String>,
}

pub struct ParseOutput {
    pub symbols: HashMap<String, ParsedSymbol>,
    pub references: Vec<ParsedReference>,
    pub file_info: FileRecord,
}

/// Capability set every language provider implements (spec.md §6.1).
/// `Send + Sync` so a `ParserRegistry` can live inside a project state
/// shared across threads per spec.md §5's concurrency model.
pub trait ParserProvider: Send + Sync {
    fn supported_extensions(&self) -> &[&'static str];

    /// Parse `content` from `path`. Parsers may fail recoverably; the
    /// registry catches the error and falls back to an empty result plus a
    /// warning (spec.md §4.2).
    fn parse(&self, path: &Path, content: &str) -> Result<ParseOutput, String>;
}

pub struct ParserRegistry {
    providers: HashMap<&'static str, Arc<dyn ParserProvider>>,
    fallback: FallbackParser,
}

impl ParserRegistry {
    /// Registry with the bundled illustrative providers plus the fallback.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RustParser));
        registry.register(Arc::new(PythonParser));
        registry
    }

    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
            fallback: FallbackParser,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn ParserProvider>) {
        for ext in provider.supported_extensions() {
            self.providers.insert(ext, provider.clone());
        }
    }

    /// Parse a file, dispatching to a registered provider by extension or
    /// the default fallback when none matches or the provider fails.
    pub fn parse(&self, path: &Path, content: &str) -> ParseOutput {
        let ext = path.extension().and_then(|e| e.to_str());
        if let Some(ext) = ext {
            if let Some(provider) = self.providers.get(ext) {
                match provider.parse(path, content) {
                    Ok(out) => return out,
                    Err(message) => {
                        tracing::warn!(path = %path.display(), message, "parser_failed, falling back to heuristic parser");
                    }
                }
            }
        }
        self.fallback
            .parse(path, content)
            .unwrap_or_else(|_| empty_output())
    }
}

fn empty_output() -> ParseOutput {
    ParseOutput {
        symbols: HashMap::new(),
        references: Vec::new(),
        file_info: FileRecord::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_for_unknown_extension() {
        let registry = ParserRegistry::with_defaults();
        let out = registry.parse(Path::new("a.unknownlang"), "foo bar\nbaz");
        assert_eq!(out.file_info.language, "unknownlang");
    }

    #[test]
    fn falls_back_to_literal_unknown_when_extensionless() {
        let registry = ParserRegistry::with_defaults();
        let out = registry.parse(Path::new("Makefile"), "all:\n\techo hi\n");
        assert_eq!(out.file_info.language, "unknown");
    }

    #[test]
    fn dispatches_by_extension() {
        let registry = ParserRegistry::with_defaults();
        let out = registry.parse(Path::new("a.rs"), "fn foo() {}\n");
        assert!(out.symbols.contains_key("foo"));
    }
}
