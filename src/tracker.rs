//! Change Tracker (spec.md §4.4 / C4).
//!
//! Classifies files as unchanged/changed/new by comparing a cheap
//! `(mtime, size)` tuple first and only falling back to a content hash
//! when that comparison is inconclusive.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::hashing::content_hash;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileFingerprint {
    pub content_hash: u64,
    pub mtime: SystemTime,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Unchanged,
    Changed,
    New,
}

#[derive(Debug, Default)]
pub struct ChangeTracker {
    fingerprints: HashMap<PathBuf, FileFingerprint>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `path` (project-relative) against `root`/`path` on disk.
    pub fn classify(&self, root: &Path, path: &Path) -> ChangeStatus {
        let Some(existing) = self.fingerprints.get(path) else {
            return ChangeStatus::New;
        };
        let abs = root.join(path);
        let meta = match fs::metadata(&abs) {
            Ok(m) => m,
            Err(_) => return ChangeStatus::Changed,
        };
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let size = meta.len();
        if mtime == existing.mtime && size == existing.size {
            return ChangeStatus::Unchanged;
        }
        // mtime/size moved; content hash is the tiebreaker (spec.md §4.4
        // step 3) since some tools rewrite files without altering bytes.
        match content_hash(&abs) {
            Ok(hash) if hash == existing.content_hash => ChangeStatus::Unchanged,
            Ok(_) => ChangeStatus::Changed,
            Err(_) => ChangeStatus::Changed,
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.fingerprints.contains_key(path)
    }

    /// Recompute and store the fingerprint for `path`.
    pub fn update_tracking(&mut self, root: &Path, path: &Path) -> std::io::Result<()> {
        let abs = root.join(path);
        let meta = fs::metadata(&abs)?;
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let size = meta.len();
        let hash = content_hash(&abs)?;
        self.fingerprints.insert(
            path.to_path_buf(),
            FileFingerprint {
                content_hash: hash,
                mtime,
                size,
            },
        );
        Ok(())
    }

    pub fn remove_tracking(&mut self, path: &Path) {
        self.fingerprints.remove(path);
    }

    pub fn tracked_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.fingerprints.keys()
    }

    pub fn clear(&mut self) {
        self.fingerprints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unchanged_file_is_reported_unchanged() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let mut tracker = ChangeTracker::new();
        tracker
            .update_tracking(dir.path(), Path::new("a.py"))
            .unwrap();
        assert_eq!(
            tracker.classify(dir.path(), Path::new("a.py")),
            ChangeStatus::Unchanged
        );
    }

    #[test]
    fn content_change_is_detected_even_with_stale_mtime_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x = 1\n").unwrap();
        let mut tracker = ChangeTracker::new();
        tracker
            .update_tracking(dir.path(), Path::new("a.py"))
            .unwrap();
        fs::write(&path, "x = 2\n").unwrap();
        assert_eq!(
            tracker.classify(dir.path(), Path::new("a.py")),
            ChangeStatus::Changed
        );
    }

    #[test]
    fn untracked_file_is_new() {
        let dir = tempdir().unwrap();
        let tracker = ChangeTracker::new();
        assert_eq!(
            tracker.classify(dir.path(), Path::new("never_seen.py")),
            ChangeStatus::New
        );
    }
}
