//! Engine facade: the stable named-operation surface `spec.md` §6.1
//! describes for a tool-dispatch layer to wrap. Not itself the
//! tool-dispatch transport (that's out of scope, per `spec.md` §1) - just
//! the in-process API that such a layer would call.
//!
//! Wires C1-C10 together behind one lazily-initialized project state, per
//! the "global mutable state... init is lazy on first `set_project_path`"
//! design note (`spec.md` §9). `reset()` gives tests (and a project
//! switch) a clean teardown hook.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::backup::BackupCache;
use crate::config::Config;
use crate::content_cache::ContentCache;
use crate::edit::{AtomicEdit, EditEngine};
use crate::error::{CodeloomError, Result};
use crate::index::{IndexLock, IndexStore, SymbolKind};
use crate::parser::ParserRegistry;
use crate::search::{Query, QueryType, SearchEngine, SearchHit};
use crate::symbol_body::detect_body_end;
use crate::tracker::ChangeTracker;
use crate::updater::{IncrementalUpdater, UpdateStats};
use crate::walker::{normalize, Walker};

struct ProjectState {
    root: PathBuf,
    walker: Walker,
    parsers: ParserRegistry,
    index: Arc<IndexLock>,
    tracker: Arc<Mutex<ChangeTracker>>,
    content_cache: Arc<Mutex<ContentCache>>,
    search: Arc<SearchEngine>,
    edit: EditEngine,
}

/// Process-wide (per-`Engine`-instance) entry point. One `Engine` is
/// scoped to at most one project at a time; switching projects via
/// `set_project_path` tears down and rebuilds all three owned stores
/// (spec.md §9).
pub struct Engine {
    config: Config,
    state: Mutex<Option<ProjectState>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&ProjectState) -> Result<T>) -> Result<T> {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(state) => f(state),
            None => Err(CodeloomError::NoProject),
        }
    }

    /// Tear down any current project state. Exposed for tests and for an
    /// explicit project switch (spec.md §9 "teardown is explicit on
    /// project switch").
    pub fn reset(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// `set_project_path` (spec.md §6.1): point the engine at a new
    /// project root and run a full initial index build.
    pub fn set_project_path(&self, path: &Path) -> Result<SetProjectPathResult> {
        if !path.is_dir() {
            return Err(CodeloomError::InvalidPath(path.to_path_buf()));
        }
        let root = path
            .canonicalize()
            .map_err(|_| CodeloomError::InvalidPath(path.to_path_buf()))?;

        let walker = Walker::new(&root);
        let parsers = ParserRegistry::with_defaults();
        let mut index_store = IndexStore::new();
        let mut tracker = ChangeTracker::new();
        {
            let updater = IncrementalUpdater::new(&root, &walker, &parsers);
            updater.update(&mut index_store, &mut tracker);
        }
        let stats = index_store.stats();

        let index = Arc::new(IndexLock::new(index_store));
        let tracker = Arc::new(Mutex::new(tracker));
        let content_cache = Arc::new(Mutex::new(ContentCache::new(
            self.config.content_cache_max_files,
            self.config.content_cache_max_memory_mb,
        )));
        let search = Arc::new(SearchEngine::new(self.config.parallel_search_threshold));

        let edit_walker = Walker::new(&root);
        let edit_parsers = ParserRegistry::with_defaults();
        let edit = EditEngine::new(
            root.clone(),
            edit_walker,
            edit_parsers,
            Arc::clone(&index),
            BackupCache::new(&self.config),
            Arc::clone(&content_cache),
            Arc::clone(&tracker),
            Arc::clone(&search),
            Duration::from_secs(self.config.lock_timeout_seconds),
        );

        let new_state = ProjectState {
            root,
            walker,
            parsers,
            index,
            tracker,
            content_cache,
            search,
            edit,
        };

        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(new_state);

        Ok(SetProjectPathResult {
            files_indexed: stats.file_count,
            symbols_indexed: stats.symbol_count,
        })
    }

    /// `refresh_index` (spec.md §6.1): incremental delta against the
    /// current on-disk state.
    pub fn refresh_index(&self) -> Result<RefreshIndexResult> {
        self.with_state(|state| {
            let start = Instant::now();
            let mut store = state.index.lock();
            let mut tracker = state.tracker.lock().unwrap_or_else(|e| e.into_inner());
            let updater = IncrementalUpdater::new(&state.root, &state.walker, &state.parsers);
            let update_stats = updater.update(&mut store, &mut tracker);
            Ok(RefreshIndexResult {
                update_stats,
                update_time_s: start.elapsed().as_secs_f64(),
            })
        })
    }

    /// `full_rebuild_index` (spec.md §6.1): drop and reparse everything,
    /// as opposed to `refresh_index`'s change-detected delta.
    pub fn full_rebuild_index(&self) -> Result<FullRebuildResult> {
        self.with_state(|state| {
            let start = Instant::now();
            let mut store = state.index.lock();
            let mut tracker = state.tracker.lock().unwrap_or_else(|e| e.into_inner());
            store.clear();
            tracker.clear();
            let mut cache = state.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.clear();
            drop(cache);
            let updater = IncrementalUpdater::new(&state.root, &state.walker, &state.parsers);
            updater.update(&mut store, &mut tracker);
            let stats = store.stats();
            Ok(FullRebuildResult {
                files_indexed: stats.file_count,
                symbols_indexed: stats.symbol_count,
                rebuild_time_s: start.elapsed().as_secs_f64(),
            })
        })
    }

    /// `search_code` (spec.md §6.1).
    pub fn search_code(&self, args: SearchArgs) -> Result<SearchCodeResult> {
        self.with_state(|state| {
            let start = Instant::now();
            let query = Query {
                pattern: args.pattern,
                query_type: args.query_type.unwrap_or(QueryType::Text),
                file_pattern: args.file_pattern,
                case_sensitive: args.case_sensitive.unwrap_or(false),
                limit: args.limit.unwrap_or(100),
            };
            let store = state.index.lock();
            let mut cache = state.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            let matches = state.search.search(&store, &mut cache, &state.root, &query)?;
            Ok(SearchCodeResult {
                total_count: matches.len(),
                matches,
                search_time_s: start.elapsed().as_secs_f64(),
            })
        })
    }

    /// `find_files` (spec.md §6.1).
    pub fn find_files(&self, glob_pattern: &str) -> Result<FindFilesResult> {
        self.with_state(|state| {
            let store = state.index.lock();
            let files = store.find_files_by_glob(glob_pattern);
            Ok(FindFilesResult {
                count: files.len(),
                files,
            })
        })
    }

    /// `get_file_summary` (spec.md §6.1).
    pub fn get_file_summary(&self, path: &Path) -> Result<FileSummaryResult> {
        self.with_state(|state| {
            let path = normalize(path);
            let store = state.index.lock();
            let record = store
                .get_file(&path)
                .ok_or_else(|| CodeloomError::FileNotInIndex(path.clone()))?;
            let symbol_count: usize = record.symbols_by_kind.values().map(|v| v.len()).sum();
            Ok(FileSummaryResult {
                language: record.language.clone(),
                line_count: record.line_count,
                symbol_count,
                imports: record.imports.clone(),
                exports: record.exports.clone(),
            })
        })
    }

    /// `get_file_content` (spec.md §6.1).
    pub fn get_file_content(&self, args: FileContentArgs) -> Result<FileContentResult> {
        self.with_state(|state| {
            let path = normalize(&args.path);
            let abs = state.root.join(&path);
            if !abs.exists() {
                return Err(CodeloomError::FileNotFound(path));
            }
            let mut cache = state.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            let lines = cache.get_file_lines(&state.root, &path);
            let total_lines = lines.len();

            let start = args.start_line.unwrap_or(1).max(1) as usize;
            let end = args.end_line.map(|e| e as usize).unwrap_or(total_lines).min(total_lines);
            let slice: Vec<&String> = if start > total_lines || start > end {
                Vec::new()
            } else {
                lines[start - 1..end].iter().collect()
            };

            let content = if args.line_numbers.unwrap_or(false) {
                slice
                    .iter()
                    .enumerate()
                    .map(|(i, line)| format!("{}: {}", start + i, line))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                slice.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n")
            };

            let store = state.index.lock();
            let language = store.get_file(&path).map(|f| f.language.clone());

            Ok(FileContentResult {
                content,
                total_lines,
                language,
            })
        })
    }

    /// `get_symbol_body` (spec.md §6.1).
    pub fn get_symbol_body(&self, args: SymbolBodyArgs) -> Result<SymbolBodyResult> {
        self.with_state(|state| {
            let store = state.index.lock();
            let record = match &args.file_path {
                Some(file_path) => {
                    let normalized = normalize(file_path);
                    store
                        .get_symbol(&args.symbol_name)
                        .filter(|r| r.file == normalized)
                }
                None => store.get_symbol(&args.symbol_name),
            }
            .ok_or_else(|| CodeloomError::SymbolNotFound(args.symbol_name.clone()))?;

            let file = record.file.clone();
            let language = args
                .language
                .or_else(|| store.get_file(&file).map(|f| f.language.clone()))
                .unwrap_or_default();
            let kind = record.kind;
            let signature = record.signature.clone();
            let start_line = record.line;
            drop(store);

            let mut cache = state.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            let lines = cache.get_file_lines(&state.root, &file);
            let end_line = detect_body_end(&lines, start_line, &language);

            let start_idx = start_line.saturating_sub(1) as usize;
            let end_idx = (end_line as usize).min(lines.len());
            let body_lines = if start_idx < end_idx {
                lines[start_idx..end_idx].to_vec()
            } else {
                Vec::new()
            };

            Ok(SymbolBodyResult {
                symbol_name: args.symbol_name,
                kind,
                start_line,
                end_line,
                body_lines,
                signature,
            })
        })
    }

    /// `apply_edit` (spec.md §6.1).
    pub fn apply_edit(&self, file_path: &Path, old_content: Option<&str>, new_content: &str) -> Result<EditResult> {
        self.with_state(|state| {
            let path = normalize(file_path);
            match state.edit.edit_file_atomic(&path, old_content, new_content) {
                Ok(()) => Ok(EditResult {
                    files_changed: 1,
                    error: None,
                }),
                Err(e) => Ok(EditResult {
                    files_changed: 0,
                    error: Some(e.code().to_string()),
                }),
            }
        })
    }

    /// `rename_symbol` (spec.md §6.1).
    pub fn rename_symbol(&self, old_name: &str, new_name: &str) -> Result<EditResult> {
        self.with_state(|state| match state.edit.rename_symbol_atomic(old_name, new_name) {
            Ok(files) => Ok(EditResult {
                files_changed: files.len(),
                error: None,
            }),
            Err(e) => Ok(EditResult {
                files_changed: 0,
                error: Some(e.code().to_string()),
            }),
        })
    }

    /// `add_import` (spec.md §6.1, expansion per SPEC_FULL.md §6.1):
    /// thin wrapper over `edit_file_atomic` that prepends the import
    /// statement, grouped with any existing imports when present.
    pub fn add_import(&self, file_path: &Path, import_statement: &str) -> Result<EditResult> {
        self.with_state(|state| {
            let path = normalize(file_path);
            let abs = state.root.join(&path);
            let current = match std::fs::read_to_string(&abs) {
                Ok(c) => c,
                Err(_) => {
                    return Ok(EditResult {
                        files_changed: 0,
                        error: Some("file_not_found".to_string()),
                    })
                }
            };
            if current.contains(import_statement.trim()) {
                return Ok(EditResult {
                    files_changed: 0,
                    error: None,
                });
            }

            let new_content = insert_import(&current, import_statement);
            let edit = AtomicEdit {
                path,
                old_content: None,
                new_content,
            };
            match state.edit.edit_files_transaction(vec![edit]) {
                Ok(()) => Ok(EditResult {
                    files_changed: 1,
                    error: None,
                }),
                Err(e) => Ok(EditResult {
                    files_changed: 0,
                    error: Some(e.code().to_string()),
                }),
            }
        })
    }

    /// Shared implementation behind `find_references`/`find_definition`/
    /// `find_callers`/`find_implementations`/`find_hierarchy` (spec.md
    /// §6.1): each is `search_code` pre-bound to its query type.
    pub fn find_by_symbol(&self, query_type: QueryType, symbol_name: &str) -> Result<Vec<SearchHit>> {
        self.with_state(|state| {
            let query = Query {
                pattern: symbol_name.to_string(),
                query_type,
                file_pattern: None,
                case_sensitive: true,
                limit: usize::MAX,
            };
            let store = state.index.lock();
            let mut cache = state.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            state.search.search(&store, &mut cache, &state.root, &query)
        })
    }
}

/// Prepend `import_statement` to `content`, grouped after any existing
/// leading import/use lines rather than at the absolute top (so a
/// license header or shebang line isn't pushed below a new import).
fn insert_import(content: &str, import_statement: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    let mut insert_at = 0;
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("use ")
            || trimmed.starts_with("import ")
            || trimmed.starts_with("from ")
            || trimmed.starts_with("#include")
        {
            insert_at = i + 1;
        } else if trimmed.is_empty() && insert_at > 0 {
            continue;
        } else if insert_at > 0 {
            break;
        }
    }
    lines.insert(insert_at, import_statement.trim_end());
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct SetProjectPathResult {
    pub files_indexed: usize,
    pub symbols_indexed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshIndexResult {
    pub update_stats: UpdateStats,
    pub update_time_s: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullRebuildResult {
    pub files_indexed: usize,
    pub symbols_indexed: usize,
    pub rebuild_time_s: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub pattern: String,
    pub query_type: Option<QueryType>,
    pub file_pattern: Option<String>,
    pub case_sensitive: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchCodeResult {
    pub matches: Vec<SearchHit>,
    pub total_count: usize,
    pub search_time_s: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindFilesResult {
    pub files: Vec<PathBuf>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummaryResult {
    pub language: String,
    pub line_count: usize,
    pub symbol_count: usize,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileContentArgs {
    pub path: PathBuf,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub line_numbers: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContentResult {
    pub content: String,
    pub total_lines: usize,
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SymbolBodyArgs {
    pub symbol_name: String,
    pub file_path: Option<PathBuf>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolBodyResult {
    pub symbol_name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub body_lines: Vec<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditResult {
    pub files_changed: usize,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn engine_on(dir: &Path) -> Engine {
        let engine = Engine::default();
        engine.set_project_path(dir).unwrap();
        engine
    }

    #[test]
    fn no_project_errors_before_set_project_path() {
        let engine = Engine::default();
        let err = engine.refresh_index().unwrap_err();
        assert_eq!(err.code(), "no_project");
    }

    #[test]
    fn scenario_a_edit_then_reread_and_definition_lookup() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
        let engine = engine_on(dir.path());

        let summary = engine.get_file_summary(Path::new("a.py")).unwrap();
        assert_eq!(summary.symbol_count, 1);

        let result = engine
            .apply_edit(Path::new("a.py"), Some("return 1"), "return 2")
            .unwrap();
        assert_eq!(result.files_changed, 1);
        assert!(result.error.is_none());

        let content = engine
            .get_file_content(FileContentArgs {
                path: PathBuf::from("a.py"),
                ..Default::default()
            })
            .unwrap();
        assert!(content.content.contains("return 2"));

        let hits = engine.find_by_symbol(QueryType::Definition, "foo").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 1);
    }

    #[test]
    fn scenario_b_content_mismatch_rejects_without_reporting_a_crate_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "return 1\n").unwrap();
        let engine = engine_on(dir.path());

        let result = engine
            .apply_edit(Path::new("a.py"), Some("return 99"), "return 2")
            .unwrap();
        assert_eq!(result.files_changed, 0);
        assert_eq!(result.error.as_deref(), Some("content_mismatch"));
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "return 1\n");
    }

    #[test]
    fn scenario_d_refresh_reports_added_updated_removed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("b.py"), "y = 2\n").unwrap();
        fs::write(dir.path().join("c.py"), "z = 3\n").unwrap();
        let engine = engine_on(dir.path());

        fs::write(dir.path().join("a.py"), "x = 99\n").unwrap();
        fs::remove_file(dir.path().join("b.py")).unwrap();
        fs::write(dir.path().join("d.py"), "w = 4\n").unwrap();

        let result = engine.refresh_index().unwrap();
        assert_eq!(result.update_stats.updated, 1);
        assert_eq!(result.update_stats.added, 1);
        assert_eq!(result.update_stats.removed, 1);
    }

    #[test]
    fn refresh_twice_with_no_changes_is_idempotent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let engine = engine_on(dir.path());
        engine.refresh_index().unwrap();
        let second = engine.refresh_index().unwrap();
        assert_eq!(second.update_stats, UpdateStats::default());
    }

    #[test]
    fn add_import_prepends_grouped_with_existing_imports() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "import os\n\ndef foo():\n    pass\n").unwrap();
        let engine = engine_on(dir.path());

        let result = engine.add_import(Path::new("a.py"), "import sys").unwrap();
        assert_eq!(result.files_changed, 1);
        let content = fs::read_to_string(dir.path().join("a.py")).unwrap();
        assert_eq!(content.lines().next(), Some("import os"));
        assert!(content.contains("import sys"));
    }

    #[test]
    fn reset_clears_project_state() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let engine = engine_on(dir.path());
        engine.reset();
        let err = engine.refresh_index().unwrap_err();
        assert_eq!(err.code(), "no_project");
    }
}
