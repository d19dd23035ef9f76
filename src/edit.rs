//! Atomic Edit Engine (spec.md §4.10 / C10): validate -> backup -> lock ->
//! write -> verify -> reindex, with full rollback on failure. Grounded in
//! the teacher's `EditingTransaction`/`MultiFileTransaction` temp-file +
//! rename pattern, adapted to the backup-cache/lock-manager/index-store
//! pipeline this crate uses instead of the teacher's direct-write model.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, SystemTime};

use regex::Regex;
use tracing::warn;

use crate::backup::{BackupCache, EditStatus};
use crate::content_cache::ContentCache;
use crate::error::{CodeloomError, Result};
use crate::index::IndexLock;
use crate::lock::{FileLockManager, LockKind};
use crate::parser::ParserRegistry;
use crate::search::{Query, QueryType, SearchEngine};
use crate::tracker::ChangeTracker;
use crate::updater::IncrementalUpdater;
use crate::walker::Walker;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// One file's half of a multi-file transaction (spec.md §3.1 `EditOperation`
/// input shape).
#[derive(Debug, Clone)]
pub struct AtomicEdit {
    pub path: PathBuf,
    pub old_content: Option<String>,
    pub new_content: String,
}

pub struct EditEngine {
    root: PathBuf,
    walker: Walker,
    parsers: ParserRegistry,
    index: Arc<IndexLock>,
    backups: Mutex<BackupCache>,
    locks: FileLockManager,
    content_cache: Arc<Mutex<ContentCache>>,
    tracker: Arc<Mutex<ChangeTracker>>,
    search: Arc<SearchEngine>,
    lock_timeout: Duration,
}

impl EditEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: PathBuf,
        walker: Walker,
        parsers: ParserRegistry,
        index: Arc<IndexLock>,
        backups: BackupCache,
        content_cache: Arc<Mutex<ContentCache>>,
        tracker: Arc<Mutex<ChangeTracker>>,
        search: Arc<SearchEngine>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            root,
            walker,
            parsers,
            index,
            backups: Mutex::new(backups),
            locks: FileLockManager::new(),
            content_cache,
            tracker,
            search,
            lock_timeout,
        }
    }

    /// `edit_file_atomic` (spec.md §4.10 single-file algorithm).
    pub fn edit_file_atomic(
        &self,
        path: &Path,
        old_content: Option<&str>,
        new_content: &str,
    ) -> Result<()> {
        let abs = self.root.join(path);
        if !abs.exists() {
            return Err(CodeloomError::FileNotFound(path.to_path_buf()));
        }
        let current = read_content(&abs, path)?;

        let final_content = resolve_content(&current, old_content, new_content)
            .ok_or_else(|| CodeloomError::ContentMismatch(path.to_path_buf()))?;

        let fingerprint = file_fingerprint(&abs);
        let operation_id = {
            let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
            backups.add_backup(path, current.clone(), fingerprint)?
        };

        let guard = match self.locks.acquire(&abs, LockKind::Exclusive, self.lock_timeout) {
            Ok(g) => g,
            Err(e) => {
                let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
                backups.remove_backup(path);
                return Err(e);
            }
        };

        let result = self.write_and_reindex(path, &abs, &final_content);
        match result {
            Ok(()) => {
                let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
                backups.set_status(path, EditStatus::Completed);
                backups.remove_backup(path);
                drop(guard);
                Ok(())
            }
            Err(write_err) => {
                let rollback = self.rollback_one(path, &abs);
                drop(guard);
                match rollback {
                    Ok(()) => Err(write_err),
                    Err(rollback_err) => Err(rollback_err),
                }
            }
        }
    }

    fn write_and_reindex(&self, rel_path: &Path, abs: &Path, content: &str) -> Result<()> {
        fs::write(abs, content).map_err(|e| CodeloomError::DiskWriteFailed {
            path: rel_path.to_path_buf(),
            source: e,
        })?;

        if let Some(fingerprint) = file_fingerprint(abs) {
            let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(op) = backups.get_backup_mut(rel_path) {
                op.fingerprint = Some(fingerprint);
            }
        }

        {
            let mut store = self.index.lock();
            let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
            let updater = IncrementalUpdater::new(&self.root, &self.walker, &self.parsers);
            updater.force_update_file(&mut store, &mut tracker, rel_path);
        }
        {
            let mut cache = self.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.invalidate(rel_path);
        }
        Ok(())
    }

    /// Restore `path` from its backup if the on-disk state still matches
    /// the fingerprint captured at backup time; otherwise refuse the
    /// rollback as unsafe (spec.md §4.10 step 9).
    fn rollback_one(&self, rel_path: &Path, abs: &Path) -> Result<()> {
        let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
        let Some(op) = backups.get_backup_mut(rel_path) else {
            return Err(CodeloomError::RollbackFailed {
                path: rel_path.to_path_buf(),
                reason: "no backup recorded".to_string(),
            });
        };

        if let Some(expected) = op.fingerprint {
            let current = file_fingerprint(abs);
            if current.is_some() && current != Some(expected) {
                op.status = EditStatus::Failed;
                return Err(CodeloomError::RollbackUnsafe(rel_path.to_path_buf()));
            }
        }

        let original = op.original_content.clone();
        match fs::write(abs, &original) {
            Ok(()) => {
                op.status = EditStatus::RolledBack;
                drop(backups);
                let mut cache = self.content_cache.lock().unwrap_or_else(|e| e.into_inner());
                cache.invalidate(rel_path);
                Ok(())
            }
            Err(e) => {
                op.status = EditStatus::Failed;
                Err(CodeloomError::RollbackFailed {
                    path: rel_path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// `edit_files_transaction` (spec.md §4.10 multi-file algorithm).
    pub fn edit_files_transaction(&self, edits: Vec<AtomicEdit>) -> Result<()> {
        // Phase A: validate all, no side effects.
        let mut resolved = Vec::with_capacity(edits.len());
        for edit in &edits {
            let abs = self.root.join(&edit.path);
            if !abs.exists() {
                return Err(CodeloomError::FileNotFound(edit.path.clone()));
            }
            let current = read_content(&abs, &edit.path)?;
            let final_content = resolve_content(&current, edit.old_content.as_deref(), &edit.new_content)
                .ok_or_else(|| CodeloomError::ContentMismatch(edit.path.clone()))?;
            resolved.push((edit.path.clone(), abs, current, final_content));
        }

        // Phase B: backup all, rolling back already-created backups on
        // any failure.
        let mut backed_up: Vec<PathBuf> = Vec::new();
        for (path, abs, current, _) in &resolved {
            let fingerprint = file_fingerprint(abs);
            let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
            match backups.add_backup(path, current.clone(), fingerprint) {
                Ok(_) => backed_up.push(path.clone()),
                Err(e) => {
                    for done in &backed_up {
                        backups.remove_backup(done);
                    }
                    return Err(e);
                }
            }
        }

        // Phase C: apply all in deterministic path-sorted order, locking
        // each file for the duration of its own write.
        let mut sorted = resolved.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut applied: Vec<PathBuf> = Vec::new();
        let mut first_error: Option<CodeloomError> = None;

        for (path, abs, _, final_content) in &sorted {
            let guard = match self.locks.acquire(abs, LockKind::Exclusive, self.lock_timeout) {
                Ok(g) => g,
                Err(e) => {
                    first_error = Some(e);
                    break;
                }
            };
            match self.write_and_reindex(path, abs, final_content) {
                Ok(()) => {
                    applied.push(path.clone());
                    drop(guard);
                }
                Err(e) => {
                    // The write may have landed partially before failing
                    // (or a reindex step after a successful write failed);
                    // either way this file's own backup still carries the
                    // pre-write fingerprint, so it needs rolling back too,
                    // not just the files that applied cleanly before it.
                    applied.push(path.clone());
                    first_error = Some(e);
                    drop(guard);
                    break;
                }
            }
        }

        if let Some(err) = first_error {
            let mut rollback_errors = Vec::new();
            for path in applied.iter().rev() {
                let abs = self.root.join(path);
                if let Err(rollback_err) = self.rollback_one(path, &abs) {
                    warn!(path = %path.display(), error = %rollback_err, "failed to rollback during transaction abort");
                    rollback_errors.push(rollback_err);
                }
            }
            let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
            for path in &backed_up {
                backups.remove_backup(path);
            }
            if !rollback_errors.is_empty() {
                return Err(CodeloomError::RollbackFailed {
                    path: sorted.first().map(|(p, ..)| p.clone()).unwrap_or_default(),
                    reason: format!("edit failed: {err}; {} file(s) failed rollback", rollback_errors.len()),
                });
            }
            return Err(err);
        }

        let mut backups = self.backups.lock().unwrap_or_else(|e| e.into_inner());
        for path in &backed_up {
            backups.set_status(path, EditStatus::Completed);
            backups.remove_backup(path);
        }
        Ok(())
    }

    /// `rename_symbol_atomic` (spec.md §4.10): word-boundary substitution
    /// across every file referencing `old_name`, applied as one
    /// transaction.
    pub fn rename_symbol_atomic(&self, old_name: &str, new_name: &str) -> Result<Vec<PathBuf>> {
        if !IDENTIFIER.is_match(new_name) {
            return Err(CodeloomError::InvalidSymbolName(new_name.to_string()));
        }

        let word_boundary = Regex::new(&format!(r"\b{}\b", regex::escape(old_name)))
            .map_err(|e| CodeloomError::InvalidRegex(e.to_string()))?;

        let hits = {
            let store = self.index.lock();
            let mut cache = self.content_cache.lock().unwrap_or_else(|e| e.into_inner());
            let query = Query {
                pattern: old_name.to_string(),
                query_type: QueryType::Symbol,
                file_pattern: None,
                case_sensitive: true,
                limit: usize::MAX,
            };
            let mut files: Vec<PathBuf> = self
                .search
                .search(&store, &mut cache, &self.root, &query)?
                .into_iter()
                .map(|h| h.file)
                .collect();
            let text_query = Query {
                pattern: old_name.to_string(),
                query_type: QueryType::Text,
                file_pattern: None,
                case_sensitive: true,
                limit: usize::MAX,
            };
            files.extend(
                self.search
                    .search(&store, &mut cache, &self.root, &text_query)?
                    .into_iter()
                    .map(|h| h.file),
            );
            files.sort();
            files.dedup();
            files
        };

        let mut edits = Vec::new();
        for path in &hits {
            let abs = self.root.join(path);
            let Ok(current) = fs::read_to_string(&abs) else {
                continue;
            };
            let replaced = word_boundary.replace_all(&current, new_name).into_owned();
            if replaced != current {
                edits.push(AtomicEdit {
                    path: path.clone(),
                    old_content: None,
                    new_content: replaced,
                });
            }
        }

        let changed_files: Vec<PathBuf> = edits.iter().map(|e| e.path.clone()).collect();
        if !edits.is_empty() {
            self.edit_files_transaction(edits)?;
        }
        Ok(changed_files)
    }
}

/// Read a file's current content, distinguishing `permission_denied` from
/// a genuine UTF-8 decode failure (spec.md §7 treats them as separate
/// error kinds under `io`).
fn read_content(abs: &Path, rel_path: &Path) -> Result<String> {
    fs::read_to_string(abs).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            CodeloomError::PermissionDenied(rel_path.to_path_buf())
        } else {
            CodeloomError::EncodingError {
                path: rel_path.to_path_buf(),
                message: e.to_string(),
            }
        }
    })
}

/// Apply spec.md §4.10 step 2's content-validation rule: no constraint,
/// exact full-file match, or substring presence with an in-place replace.
fn resolve_content(current: &str, old_content: Option<&str>, new_content: &str) -> Option<String> {
    match old_content {
        None => Some(new_content.to_string()),
        Some(old) if old.trim().is_empty() => Some(new_content.to_string()),
        Some(old) if old == current => Some(new_content.to_string()),
        Some(old) if current.contains(old.trim()) => {
            Some(current.replace(old.trim(), new_content))
        }
        Some(_) => None,
    }
}

fn file_fingerprint(abs: &Path) -> Option<(SystemTime, u64)> {
    let meta = fs::metadata(abs).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    fn build_engine(root: &Path) -> EditEngine {
        let cfg = Config::default();
        let walker = Walker::new(root);
        let parsers = ParserRegistry::with_defaults();
        let index = Arc::new(IndexLock::new(crate::index::IndexStore::new()));
        let mut tracker = ChangeTracker::new();
        {
            let mut store = index.lock();
            let updater = IncrementalUpdater::new(root, &walker, &parsers);
            updater.update(&mut store, &mut tracker);
        }
        EditEngine::new(
            root.to_path_buf(),
            walker,
            parsers,
            index,
            BackupCache::new(&cfg),
            Arc::new(Mutex::new(ContentCache::new(Some(10), Some(10)))),
            Arc::new(Mutex::new(tracker)),
            Arc::new(SearchEngine::new(cfg.parallel_search_threshold)),
            Duration::from_secs(cfg.lock_timeout_seconds),
        )
    }

    #[test]
    fn edits_file_and_reindexes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let engine = build_engine(dir.path());

        engine
            .edit_file_atomic(Path::new("a.py"), Some("x = 1"), "x = 2")
            .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "x = 2\n");
    }

    #[test]
    fn content_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let engine = build_engine(dir.path());

        let err = engine
            .edit_file_atomic(Path::new("a.py"), Some("x = 999"), "x = 2")
            .unwrap_err();
        assert_eq!(err.code(), "content_mismatch");
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "x = 1\n");
    }

    #[test]
    #[cfg(unix)]
    fn transaction_rolls_back_an_earlier_file_when_a_later_write_fails() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.txt"), "X").unwrap();
        fs::write(dir.path().join("y.txt"), "Y").unwrap();
        let engine = build_engine(dir.path());

        let y_path = dir.path().join("y.txt");
        let mut perms = fs::metadata(&y_path).unwrap().permissions();
        perms.set_mode(0o400);
        fs::set_permissions(&y_path, perms).unwrap();

        let edits = vec![
            AtomicEdit {
                path: Path::new("x.txt").to_path_buf(),
                old_content: Some("X".to_string()),
                new_content: "X2".to_string(),
            },
            AtomicEdit {
                path: Path::new("y.txt").to_path_buf(),
                old_content: Some("Y".to_string()),
                new_content: "Y2".to_string(),
            },
        ];

        let result = engine.edit_files_transaction(edits);
        assert!(result.is_err());

        let mut restore_perms = fs::metadata(&y_path).unwrap().permissions();
        restore_perms.set_mode(0o600);
        fs::set_permissions(&y_path, restore_perms).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("x.txt")).unwrap(), "X");
        assert_eq!(fs::read_to_string(&y_path).unwrap(), "Y");
    }

    #[test]
    fn rename_rejects_invalid_identifier() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "def foo():\n    return foo\n").unwrap();
        let engine = build_engine(dir.path());

        let err = engine.rename_symbol_atomic("foo", "not valid").unwrap_err();
        assert_eq!(err.code(), "invalid_symbol_name");
    }

    #[test]
    fn rename_substitutes_word_boundaries_across_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
        fs::write(dir.path().join("b.py"), "from a import foo\nfoo()\n").unwrap();
        let engine = build_engine(dir.path());

        let changed = engine.rename_symbol_atomic("foo", "bar").unwrap();
        assert!(!changed.is_empty());
        assert!(fs::read_to_string(dir.path().join("a.py")).unwrap().contains("def bar"));
        assert!(fs::read_to_string(dir.path().join("b.py")).unwrap().contains("bar()"));
    }
}
