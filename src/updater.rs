//! Incremental Updater (spec.md §4.5 / C5).
//!
//! Drives Walker -> Parser Registry -> Index Store deltas, and keeps the
//! Change Tracker's fingerprints in sync with what actually landed in the
//! index.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::index::{CallReference, IndexStore, SymbolRecord};
use crate::parser::ParserRegistry;
use crate::tracker::{ChangeStatus, ChangeTracker};
use crate::walker::Walker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct UpdateStats {
    pub updated: usize,
    pub added: usize,
    pub removed: usize,
}

pub struct IncrementalUpdater<'a> {
    pub root: &'a Path,
    pub walker: &'a Walker,
    pub parsers: &'a ParserRegistry,
}

impl<'a> IncrementalUpdater<'a> {
    pub fn new(root: &'a Path, walker: &'a Walker, parsers: &'a ParserRegistry) -> Self {
        Self {
            root,
            walker,
            parsers,
        }
    }

    /// Full `update()` procedure, spec.md §4.5 steps 1-6.
    pub fn update(&self, store: &mut IndexStore, tracker: &mut ChangeTracker) -> UpdateStats {
        let s_now: HashSet<PathBuf> = self.walker.walk().into_iter().collect();
        let s_idx: HashSet<PathBuf> = store.file_paths().cloned().collect();

        let mut stats = UpdateStats::default();

        // Files present both on disk and in the index: unchanged, changed,
        // or first-seen (tracked now but not yet a tracker fingerprint).
        for path in s_now.intersection(&s_idx) {
            if !tracker.is_tracked(path) {
                // First time the tracker has seen a file that was already
                // indexed (e.g. index loaded without a tracker). spec.md
                // §9 fixes this ambiguity: not counted as "changed".
                if let Err(e) = tracker.update_tracking(self.root, path) {
                    warn!(path = %path.display(), error = %e, "failed to fingerprint tracked file");
                }
                continue;
            }
            match tracker.classify(self.root, path) {
                ChangeStatus::Changed => {
                    self.reparse(store, tracker, path);
                    stats.updated += 1;
                }
                ChangeStatus::Unchanged => {}
                ChangeStatus::New => unreachable!("path was already tracked"),
            }
        }

        // New files: on disk, not yet in the index.
        for path in s_now.difference(&s_idx) {
            self.parse_and_add(store, tracker, path);
            stats.added += 1;
        }

        // Removed files: indexed, no longer on disk.
        for path in s_idx.difference(&s_now) {
            store.remove_file(path);
            tracker.remove_tracking(path);
            stats.removed += 1;
        }

        store.rebuild_call_graph();
        stats
    }

    /// `force_update_file` (spec.md §4.5): unconditional reparse, or
    /// removal if the file is gone.
    pub fn force_update_file(&self, store: &mut IndexStore, tracker: &mut ChangeTracker, path: &Path) {
        let abs = self.root.join(path);
        if abs.exists() {
            self.reparse(store, tracker, path);
        } else {
            store.remove_file(path);
            tracker.remove_tracking(path);
        }
        store.rebuild_call_graph();
    }

    fn reparse(&self, store: &mut IndexStore, tracker: &mut ChangeTracker, path: &Path) {
        store.remove_symbols_for_file(path);
        self.parse_and_add(store, tracker, path);
    }

    fn parse_and_add(&self, store: &mut IndexStore, tracker: &mut ChangeTracker, path: &Path) {
        let abs = self.root.join(path);
        let content = match fs::read_to_string(&abs) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file during index update");
                return;
            }
        };
        let output = self.parsers.parse(path, &content);
        store.add_file(path.to_path_buf(), output.file_info);
        let refs: Vec<CallReference> = output
            .references
            .into_iter()
            .map(|r| CallReference {
                callee_name: r.callee_name,
                line: r.line,
                caller_name: r.caller_name,
            })
            .collect();
        store.set_references_for_file(path.to_path_buf(), refs);
        for (name, parsed) in output.symbols {
            store.add_symbol(
                name.clone(),
                SymbolRecord {
                    name,
                    kind: parsed.kind,
                    file: path.to_path_buf(),
                    line: parsed.line,
                    signature: parsed.signature,
                    called_by: HashSet::new(),
                    references: HashSet::new(),
                },
            );
        }
        if let Err(e) = tracker.update_tracking(self.root, path) {
            warn!(path = %path.display(), error = %e, "failed to fingerprint file after parse");
        }
    }
}
