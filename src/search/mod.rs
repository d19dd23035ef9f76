//! Search Engine (spec.md §4.7 / C7): a single dispatcher over the index
//! and the File-Content Cache, with a regex safety check, an LRU compile
//! cache, and a parallel scan path above a file-count threshold.

mod regex_cache;
mod safety;

pub use regex_cache::RegexCache;
pub use safety::is_unsafe_pattern;

use std::path::PathBuf;
use std::sync::Mutex;

use globset::Glob;
use rayon::prelude::*;
use serde::Serialize;

use crate::content_cache::ContentCache;
use crate::error::{CodeloomError, Result};
use crate::index::{IndexStore, SymbolKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Text,
    Regex,
    Symbol,
    References,
    Definition,
    Callers,
    Implementations,
    Hierarchy,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub pattern: String,
    pub query_type: QueryType,
    pub file_pattern: Option<String>,
    pub case_sensitive: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file: PathBuf,
    pub line: u32,
    pub content: Option<String>,
    pub language: Option<String>,
    pub symbol: Option<String>,
    pub kind: Option<SymbolKind>,
    pub level: Option<i32>,
}

impl SearchHit {
    fn line_hit(file: PathBuf, line: u32, content: String, language: String) -> Self {
        Self {
            file,
            line,
            content: Some(content),
            language: Some(language),
            symbol: None,
            kind: None,
            level: None,
        }
    }
}

pub struct SearchEngine {
    regex_cache: Mutex<RegexCache>,
    parallel_threshold: usize,
}

impl SearchEngine {
    pub fn new(parallel_threshold: usize) -> Self {
        Self {
            regex_cache: Mutex::new(RegexCache::new(64)),
            parallel_threshold,
        }
    }

    pub fn search(
        &self,
        store: &IndexStore,
        cache: &mut ContentCache,
        root: &std::path::Path,
        query: &Query,
    ) -> Result<Vec<SearchHit>> {
        match query.query_type {
            QueryType::Text => self.scan_lines(store, cache, root, query, None),
            QueryType::Regex => {
                if is_unsafe_pattern(&query.pattern) {
                    return Err(CodeloomError::UnsafeRegex(query.pattern.clone()));
                }
                let regex = {
                    let mut rc = self.regex_cache.lock().unwrap_or_else(|e| e.into_inner());
                    rc.get_or_compile(&query.pattern, query.case_sensitive)?
                };
                self.scan_lines(store, cache, root, query, Some(regex))
            }
            QueryType::Symbol => Ok(self.search_symbols(store, query)),
            QueryType::References => Ok(self.search_references(store, query)),
            QueryType::Definition => Ok(self.search_definition(store, query)),
            QueryType::Callers => Ok(self.search_callers(store, query)),
            QueryType::Implementations => Ok(self.search_implementations(store, query)),
            QueryType::Hierarchy => Ok(self.search_hierarchy(store, query)),
        }
    }

    fn candidate_files(&self, store: &IndexStore, query: &Query) -> Vec<PathBuf> {
        match &query.file_pattern {
            Some(pattern) => store.find_files_by_glob(pattern),
            None => store.file_paths().cloned().collect(),
        }
    }

    /// Shared scan path for `text` and `regex`: line-by-line match against
    /// C6 content, with parallel partitioning above the configured
    /// threshold (spec.md §4.7).
    fn scan_lines(
        &self,
        store: &IndexStore,
        cache: &mut ContentCache,
        root: &std::path::Path,
        query: &Query,
        compiled_regex: Option<std::sync::Arc<regex::Regex>>,
    ) -> Result<Vec<SearchHit>> {
        let files = self.candidate_files(store, query);

        // The content cache is not `Sync`-shareable across a rayon scan
        // (it mutates on every read), so pre-load every candidate file's
        // lines single-threaded, then fan the match loop out in parallel.
        let loaded: Vec<(PathBuf, Vec<String>, String)> = files
            .into_iter()
            .map(|path| {
                let lines = cache.get_file_lines(root, &path);
                let language = store
                    .get_file(&path)
                    .map(|f| f.language.clone())
                    .unwrap_or_default();
                (path, lines, language)
            })
            .collect();

        let regex = compiled_regex;

        let pattern_for_text = if query.case_sensitive {
            query.pattern.clone()
        } else {
            query.pattern.to_lowercase()
        };

        let scan_chunk = |chunk: &[(PathBuf, Vec<String>, String)], chunk_limit: usize| -> Vec<SearchHit> {
            let mut hits = Vec::new();
            for (path, lines, language) in chunk {
                for (idx, line) in lines.iter().enumerate() {
                    let matched = match &regex {
                        Some(re) => re.is_match(line),
                        None => {
                            let hay = if query.case_sensitive {
                                line.clone()
                            } else {
                                line.to_lowercase()
                            };
                            hay.contains(&pattern_for_text)
                        }
                    };
                    if matched {
                        hits.push(SearchHit::line_hit(
                            path.clone(),
                            (idx + 1) as u32,
                            line.clone(),
                            language.clone(),
                        ));
                        if hits.len() >= chunk_limit {
                            break;
                        }
                    }
                }
                if hits.len() >= chunk_limit {
                    break;
                }
            }
            hits
        };

        let mut hits = if loaded.len() > self.parallel_threshold {
            let chunk_count = rayon::current_num_threads().max(1);
            let chunk_size = loaded.len().div_ceil(chunk_count).max(1);
            let per_chunk_limit = query.limit.div_ceil(chunk_count).max(1);
            loaded
                .par_chunks(chunk_size)
                .map(|chunk| scan_chunk(chunk, per_chunk_limit))
                .reduce(Vec::new, |mut a, b| {
                    a.extend(b);
                    a
                })
        } else {
            scan_chunk(&loaded, query.limit)
        };

        hits.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        hits.truncate(query.limit);
        Ok(hits)
    }

    fn search_symbols(&self, store: &IndexStore, query: &Query) -> Vec<SearchHit> {
        let needle = if query.case_sensitive {
            query.pattern.clone()
        } else {
            query.pattern.to_lowercase()
        };
        let mut hits: Vec<SearchHit> = store
            .symbols()
            .filter(|(name, _)| {
                let hay = if query.case_sensitive {
                    (*name).clone()
                } else {
                    name.to_lowercase()
                };
                hay.contains(&needle)
            })
            .map(|(name, record)| SearchHit {
                file: record.file.clone(),
                line: record.line,
                content: None,
                language: None,
                symbol: Some(name.clone()),
                kind: Some(record.kind),
                level: None,
            })
            .collect();
        hits.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        hits.truncate(query.limit);
        hits
    }

    fn search_references(&self, store: &IndexStore, query: &Query) -> Vec<SearchHit> {
        let Some(record) = store.get_symbol(&query.pattern) else {
            return Vec::new();
        };
        let mut hits: Vec<SearchHit> = record
            .references
            .iter()
            .filter_map(|loc| {
                let (file, line) = loc.rsplit_once(':')?;
                Some(SearchHit {
                    file: PathBuf::from(file),
                    line: line.parse().ok()?,
                    content: None,
                    language: None,
                    symbol: Some(query.pattern.clone()),
                    kind: Some(record.kind),
                    level: None,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        hits.truncate(query.limit);
        hits
    }

    fn search_definition(&self, store: &IndexStore, query: &Query) -> Vec<SearchHit> {
        match store.get_symbol(&query.pattern) {
            Some(record) => vec![SearchHit {
                file: record.file.clone(),
                line: record.line,
                content: None,
                language: None,
                symbol: Some(query.pattern.clone()),
                kind: Some(record.kind),
                level: None,
            }],
            None => Vec::new(),
        }
    }

    fn search_callers(&self, store: &IndexStore, query: &Query) -> Vec<SearchHit> {
        let Some(record) = store.get_symbol(&query.pattern) else {
            return Vec::new();
        };
        let mut hits: Vec<SearchHit> = record
            .called_by
            .iter()
            .filter_map(|caller_name| {
                let caller = store.get_symbol(caller_name)?;
                Some(SearchHit {
                    file: caller.file.clone(),
                    line: caller.line,
                    content: None,
                    language: None,
                    symbol: Some(caller_name.clone()),
                    kind: Some(caller.kind),
                    level: None,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        hits.truncate(query.limit);
        hits
    }

    fn search_implementations(&self, store: &IndexStore, query: &Query) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = store
            .symbols()
            .filter(|(_, record)| {
                record.kind == SymbolKind::Class
                    && record
                        .signature
                        .as_deref()
                        .is_some_and(|s| s.contains(&query.pattern))
            })
            .map(|(name, record)| SearchHit {
                file: record.file.clone(),
                line: record.line,
                content: None,
                language: None,
                symbol: Some(name.clone()),
                kind: Some(record.kind),
                level: None,
            })
            .collect();
        hits.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        hits.truncate(query.limit);
        hits
    }

    fn search_hierarchy(&self, store: &IndexStore, query: &Query) -> Vec<SearchHit> {
        let Some(record) = store.get_symbol(&query.pattern) else {
            return Vec::new();
        };
        let mut hits = vec![SearchHit {
            file: record.file.clone(),
            line: record.line,
            content: None,
            language: None,
            symbol: Some(query.pattern.clone()),
            kind: Some(record.kind),
            level: Some(0),
        }];
        for caller_name in &record.called_by {
            if let Some(caller) = store.get_symbol(caller_name) {
                hits.push(SearchHit {
                    file: caller.file.clone(),
                    line: caller.line,
                    content: None,
                    language: None,
                    symbol: Some(caller_name.clone()),
                    kind: Some(caller.kind),
                    level: Some(-1),
                });
            }
        }
        hits.truncate(query.limit);
        hits
    }
}

/// Whether `path` matches `pattern`, used by callers that need to test a
/// single path without materializing the whole candidate set.
pub fn matches_glob(pattern: &str, path: &std::path::Path) -> bool {
    match Glob::new(pattern) {
        Ok(g) => g.compile_matcher().is_match(path),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FileRecord, SymbolRecord};
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    fn mk_query(pattern: &str, query_type: QueryType) -> Query {
        Query {
            pattern: pattern.to_string(),
            query_type,
            file_pattern: None,
            case_sensitive: false,
            limit: 100,
        }
    }

    #[test]
    fn text_search_finds_matching_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
        let mut store = IndexStore::new();
        store.add_file(PathBuf::from("a.py"), FileRecord::default());
        let mut cache = ContentCache::new(Some(10), Some(10));
        let engine = SearchEngine::new(50);

        let hits = engine
            .search(&store, &mut cache, dir.path(), &mk_query("return", QueryType::Text))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 2);
    }

    #[test]
    fn unsafe_regex_is_rejected() {
        let store = IndexStore::new();
        let mut cache = ContentCache::new(Some(10), Some(10));
        let engine = SearchEngine::new(50);
        let dir = tempdir().unwrap();

        let err = engine
            .search(
                &store,
                &mut cache,
                dir.path(),
                &mk_query("(a+)+$", QueryType::Regex),
            )
            .unwrap_err();
        assert_eq!(err.code(), "unsafe_regex");
    }

    #[test]
    fn callers_query_resolves_against_symbol_map() {
        let mut store = IndexStore::new();
        store.add_file(PathBuf::from("a.py"), FileRecord::default());
        store.add_symbol(
            "callee".into(),
            SymbolRecord {
                name: "callee".into(),
                kind: SymbolKind::Function,
                file: PathBuf::from("a.py"),
                line: 1,
                signature: None,
                called_by: HashSet::from(["caller".to_string()]),
                references: HashSet::new(),
            },
        );
        store.add_symbol(
            "caller".into(),
            SymbolRecord {
                name: "caller".into(),
                kind: SymbolKind::Function,
                file: PathBuf::from("a.py"),
                line: 5,
                signature: None,
                called_by: HashSet::new(),
                references: HashSet::new(),
            },
        );

        let mut cache = ContentCache::new(Some(10), Some(10));
        let engine = SearchEngine::new(50);
        let dir = tempdir().unwrap();
        let hits = engine
            .search(&store, &mut cache, dir.path(), &mk_query("callee", QueryType::Callers))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.as_deref(), Some("caller"));
    }
}
