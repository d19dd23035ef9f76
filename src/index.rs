//! Index Store (spec.md §4.3 / C3) and the reentrant global coordination
//! lock described in §5 and §9.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use globset::Glob;
use serde::{Deserialize, Serialize};

/// Kind of a symbol, per spec.md §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Type,
    Constant,
    Variable,
    Module,
    Import,
    Export,
    Other,
}

/// A file tracked by the index (spec.md §3.1 `FileRecord`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRecord {
    pub language: String,
    pub line_count: usize,
    pub symbols_by_kind: HashMap<String, Vec<String>>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

/// A symbol declared somewhere in the project (spec.md §3.1 `SymbolRecord`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
    pub file: PathBuf,
    pub line: u32,
    pub signature: Option<String>,
    #[serde(default)]
    pub called_by: HashSet<String>,
    #[serde(default)]
    pub references: HashSet<String>,
}

/// A single call/usage edge discovered while parsing one file: `callee_name`
/// was referenced at `line` in that file, optionally from within
/// `caller_name`'s body. Kept separate from `SymbolRecord` so resolution
/// against the (possibly not-yet-inserted) target symbol happens in one
/// pass after every file's edges are known, per spec.md §9's "resolution
/// happens at read time through the symbol map" guidance.
#[derive(Debug, Clone)]
pub struct CallReference {
    pub callee_name: String,
    pub line: u32,
    pub caller_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexStats {
    pub file_count: usize,
    pub symbol_count: usize,
}

/// The in-memory aggregate of files and symbols. All writes go through
/// `add_file`/`remove_file`/`add_symbol`/`remove_symbols_for_file` so the
/// "every symbol's file exists" invariant (spec.md §8.1) always holds.
#[derive(Debug, Default)]
pub struct IndexStore {
    files: HashMap<PathBuf, FileRecord>,
    symbols: HashMap<String, SymbolRecord>,
    /// Secondary index: file -> names of symbols defined in it, so
    /// `remove_file` can drop them in O(k) instead of scanning everything.
    symbols_by_file: HashMap<PathBuf, Vec<String>>,
    /// Raw caller->callee edges recorded per file during parsing, the
    /// source `rebuild_call_graph` resolves into `called_by`/`references`.
    call_refs: HashMap<PathBuf, Vec<CallReference>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: PathBuf, record: FileRecord) {
        self.files.insert(path, record);
    }

    /// Remove a file and, atomically with it, every symbol whose `file`
    /// field names it (spec.md §3.1 invariant).
    pub fn remove_file(&mut self, path: &Path) {
        self.files.remove(path);
        self.remove_symbols_for_file(path);
    }

    pub fn add_symbol(&mut self, name: String, record: SymbolRecord) {
        self.symbols_by_file
            .entry(record.file.clone())
            .or_default()
            .push(name.clone());
        self.symbols.insert(name, record);
    }

    pub fn remove_symbols_for_file(&mut self, path: &Path) {
        if let Some(names) = self.symbols_by_file.remove(path) {
            for name in names {
                self.symbols.remove(&name);
            }
        }
        self.call_refs.remove(path);
    }

    /// Record the caller->callee edges found while parsing `path`, replacing
    /// whatever was recorded for it on a previous pass. Call before
    /// `rebuild_call_graph`.
    pub fn set_references_for_file(&mut self, path: PathBuf, refs: Vec<CallReference>) {
        self.call_refs.insert(path, refs);
    }

    pub fn get_file(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn get_symbol(&self, name: &str) -> Option<&SymbolRecord> {
        self.symbols.get(name)
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn file_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&String, &SymbolRecord)> {
        self.symbols.iter()
    }

    pub fn symbols_mut(&mut self) -> impl Iterator<Item = (&String, &mut SymbolRecord)> {
        self.symbols.iter_mut()
    }

    pub fn find_files_by_glob(&self, pattern: &str) -> Vec<PathBuf> {
        let glob = match Glob::new(pattern) {
            Ok(g) => g.compile_matcher(),
            Err(_) => return Vec::new(),
        };
        self.files
            .keys()
            .filter(|p| glob.is_match(p))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            file_count: self.files.len(),
            symbol_count: self.symbols.len(),
        }
    }

    /// Rebuild `called_by` and `references` from scratch off the raw
    /// `call_refs` edges recorded per file during parsing. Cyclic call
    /// graphs are safe here because edges are stored as symbol-name
    /// strings, not direct references (spec.md §9); `references` entries
    /// are formatted `path:line` off the file the edge was recorded
    /// against, matching the shape `search_references` expects.
    pub fn rebuild_call_graph(&mut self) {
        for record in self.symbols.values_mut() {
            record.called_by.clear();
            record.references.clear();
        }

        let mut called_by: HashMap<String, HashSet<String>> = HashMap::new();
        let mut references: HashMap<String, HashSet<String>> = HashMap::new();

        for (file, edges) in &self.call_refs {
            for edge in edges {
                let loc = format!("{}:{}", file.display(), edge.line);
                references
                    .entry(edge.callee_name.clone())
                    .or_default()
                    .insert(loc);
                if let Some(caller) = &edge.caller_name {
                    called_by
                        .entry(edge.callee_name.clone())
                        .or_default()
                        .insert(caller.clone());
                }
            }
        }

        for (name, locs) in references {
            if let Some(record) = self.symbols.get_mut(&name) {
                record.references = locs;
            }
        }
        for (name, callers) in called_by {
            if let Some(record) = self.symbols.get_mut(&name) {
                record.called_by = callers;
            }
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.symbols.clear();
        self.symbols_by_file.clear();
        self.call_refs.clear();
    }
}

/// The single coordination lock guarding the Index Store (spec.md §5/§9).
///
/// spec.md §9 asks for a reentrant lock "so high-level operations can call
/// their own read APIs without self-deadlock" (rename calling into search
/// while already holding the lock, for instance). A hand-rolled reentrant
/// mutex that hands out a `&mut IndexStore` to more than one live guard on
/// the same thread is unsound in safe Rust: nothing stops one guard's
/// `&mut` from aliasing another guard's live `&`. Rather than reach for
/// `unsafe`, this is resolved structurally: `IndexLock` is a plain
/// `Mutex<IndexStore>`, acquired exactly once per top-level operation
/// (Updater, Edit Engine). Internal helpers that would otherwise
/// "re-enter" the lock (e.g. a rename looking up references) instead take
/// the already-held `&IndexStore`/`&mut IndexStore` as a parameter, so no
/// second acquisition ever happens. This gives every caller the semantics
/// the spec describes without the soundness hazard of a real reentrant
/// mutex.
pub struct IndexLock {
    inner: Mutex<IndexStore>,
}

impl IndexLock {
    pub fn new(store: IndexStore) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, IndexStore> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_file_drops_its_symbols() {
        let mut store = IndexStore::new();
        store.add_file(PathBuf::from("a.py"), FileRecord::default());
        store.add_symbol(
            "foo".into(),
            SymbolRecord {
                name: "foo".into(),
                kind: SymbolKind::Function,
                file: PathBuf::from("a.py"),
                line: 1,
                signature: None,
                called_by: HashSet::new(),
                references: HashSet::new(),
            },
        );
        assert!(store.get_symbol("foo").is_some());
        store.remove_file(Path::new("a.py"));
        assert!(store.get_symbol("foo").is_none());
        assert!(store.get_file(Path::new("a.py")).is_none());
    }

    #[test]
    fn call_graph_resolves_cyclic_references() {
        let mut store = IndexStore::new();
        let mk = |name: &str| SymbolRecord {
            name: name.into(),
            kind: SymbolKind::Function,
            file: PathBuf::from("a.py"),
            line: 1,
            signature: None,
            called_by: HashSet::new(),
            references: HashSet::new(),
        };
        store.add_file(PathBuf::from("a.py"), FileRecord::default());
        store.add_symbol("a".into(), mk("a"));
        store.add_symbol("b".into(), mk("b"));
        store.set_references_for_file(
            PathBuf::from("a.py"),
            vec![
                CallReference {
                    callee_name: "b".into(),
                    line: 5,
                    caller_name: Some("a".into()),
                },
                CallReference {
                    callee_name: "a".into(),
                    line: 9,
                    caller_name: Some("b".into()),
                },
            ],
        );
        store.rebuild_call_graph();
        assert!(store.get_symbol("b").unwrap().called_by.contains("a"));
        assert!(store.get_symbol("a").unwrap().called_by.contains("b"));
        assert!(store.get_symbol("b").unwrap().references.contains("a.py:5"));
    }
}
