//! End-to-end scenarios from `spec.md` §8.3 that don't fit naturally as a
//! single module's unit tests: a transaction forced to roll back midway,
//! and backup-cache memory-cap enforcement against a realistic file set.

use std::fs;
use std::path::Path;

use codeloom::backup::BackupCache;
use codeloom::config::Config;
use codeloom::Engine;

#[test]
fn scenario_c_transaction_rollback_when_a_later_files_lock_is_unavailable() {
    use codeloom::lock::{FileLockManager, LockKind};

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.txt"), "X").unwrap();
    fs::write(dir.path().join("y.txt"), "Y").unwrap();

    // Hold an exclusive OS-level lock on y.txt from an independent
    // FileLockManager (contention is at the advisory-lock-on-sibling-file
    // level, so a second manager instance genuinely contends), forcing
    // the transaction's Phase C acquisition on y.txt to time out after
    // x.txt's write has already landed.
    let blocker = std::sync::Arc::new(FileLockManager::new());
    let blocker_path = dir.path().join("y.txt");
    let blocker_guard = blocker
        .acquire(&blocker_path, LockKind::Exclusive, std::time::Duration::from_secs(5))
        .unwrap();

    let edits = vec![
        codeloom::edit::AtomicEdit {
            path: Path::new("x.txt").to_path_buf(),
            old_content: Some("X".to_string()),
            new_content: "X2".to_string(),
        },
        codeloom::edit::AtomicEdit {
            path: Path::new("y.txt").to_path_buf(),
            old_content: Some("Y".to_string()),
            new_content: "Y2".to_string(),
        },
    ];

    let walker = codeloom::walker::Walker::new(dir.path());
    let parsers = codeloom::parser::ParserRegistry::with_defaults();
    let index = std::sync::Arc::new(codeloom::index::IndexLock::new(codeloom::index::IndexStore::new()));
    let mut tracker = codeloom::tracker::ChangeTracker::new();
    {
        let mut store = index.lock();
        let updater = codeloom::updater::IncrementalUpdater::new(dir.path(), &walker, &parsers);
        updater.update(&mut store, &mut tracker);
    }
    let cfg = Config::default();
    let edit_engine = codeloom::edit::EditEngine::new(
        dir.path().to_path_buf(),
        walker,
        parsers,
        index,
        BackupCache::new(&cfg),
        std::sync::Arc::new(std::sync::Mutex::new(codeloom::content_cache::ContentCache::new(Some(10), Some(10)))),
        std::sync::Arc::new(std::sync::Mutex::new(tracker)),
        std::sync::Arc::new(codeloom::search::SearchEngine::new(cfg.parallel_search_threshold)),
        std::time::Duration::from_millis(200),
    );

    let result = edit_engine.edit_files_transaction(edits);
    assert!(result.is_err());
    drop(blocker_guard);

    assert_eq!(fs::read_to_string(dir.path().join("x.txt")).unwrap(), "X");
    assert_eq!(fs::read_to_string(dir.path().join("y.txt")).unwrap(), "Y");
}

#[test]
fn scenario_e_backup_cache_enforces_memory_ceiling_across_five_files() {
    let mut cfg = Config::default();
    cfg.max_memory_mb = 1;
    cfg.max_file_size_mb = 1;
    let mut cache = BackupCache::new(&cfg);

    let chunk = "x".repeat(300 * 1024);
    for i in 0..5 {
        cache
            .add_backup(Path::new(&format!("f{i}.txt")), chunk.clone(), None)
            .unwrap();
    }

    let usage = cache.memory_usage();
    assert!(usage.count <= 4, "expected oldest backup evicted, got count {}", usage.count);
    assert!(
        usage.current_mb <= 1.0 + f64::EPSILON,
        "aggregate memory {}MB exceeds the 1MB cap",
        usage.current_mb
    );
}

#[test]
fn scenario_f_rename_respects_word_boundaries_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.py"),
        "def foo():\n    return 1\n\ndef foobar():\n    return 2\n\ndef barfoo():\n    return foo()\n",
    )
    .unwrap();

    let engine = Engine::default();
    engine.set_project_path(dir.path()).unwrap();
    let result = engine.rename_symbol("foo", "baz").unwrap();
    assert_eq!(result.files_changed, 1);

    let content = fs::read_to_string(dir.path().join("a.py")).unwrap();
    assert!(content.contains("def baz():"));
    assert!(content.contains("def foobar():"));
    assert!(content.contains("def barfoo():"));
    assert!(content.contains("return baz()"));
}
