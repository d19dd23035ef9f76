//! Backup Cache (spec.md §4.8 / C8): an in-memory, LRU-bounded store of
//! pre-edit file snapshots, grounded in the teacher's editing-transaction
//! style and the original `BackupSystem`/`MemoryBackupManager` pairing
//! (backup creation is separate from eviction policy).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::config::Config;
use crate::error::{CodeloomError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// A pre-edit snapshot plus enough file-state to detect whether the file
/// changed externally before a rollback is attempted.
#[derive(Debug, Clone)]
pub struct EditOperation {
    pub operation_id: String,
    pub path: PathBuf,
    pub original_content: String,
    pub status: EditStatus,
    pub created_at: SystemTime,
    /// `(mtime, size)` captured right after the backup was taken, refreshed
    /// after a successful write so a later rollback can detect outside
    /// interference (spec.md §4.10 step 6).
    pub fingerprint: Option<(SystemTime, u64)>,
    pub memory_bytes: u64,
}

impl EditOperation {
    fn new(path: PathBuf, original_content: String, fingerprint: Option<(SystemTime, u64)>) -> Self {
        let memory_bytes = original_content.len() as u64;
        Self {
            operation_id: Uuid::new_v4().to_string(),
            path,
            original_content,
            status: EditStatus::Pending,
            created_at: SystemTime::now(),
            fingerprint,
            memory_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BackupMemoryUsage {
    pub current_mb: f64,
    pub max_mb: f64,
    pub usage_percent: f64,
    pub count: usize,
    pub max_count: usize,
}

/// LRU-bounded map of path -> `EditOperation`, enforcing the per-file and
/// aggregate caps from spec.md §4.8. Access order is tracked as a simple
/// `Vec` of paths (most-recently-used last) since the expected working set
/// is small relative to `max_backups`.
pub struct BackupCache {
    entries: HashMap<PathBuf, EditOperation>,
    access_order: Vec<PathBuf>,
    current_bytes: u64,
    max_memory_mb: u64,
    max_file_size_mb: u64,
    max_backups: usize,
}

impl BackupCache {
    pub fn new(config: &Config) -> Self {
        Self {
            entries: HashMap::new(),
            access_order: Vec::new(),
            current_bytes: 0,
            max_memory_mb: config.max_memory_mb,
            max_file_size_mb: config.max_file_size_mb,
            max_backups: config.max_backups,
        }
    }

    /// Snapshot `path`'s current on-disk content and register it as a
    /// pending edit operation, evicting LRU entries as needed to honor the
    /// per-file and aggregate caps. Returns the new operation id.
    pub fn add_backup(
        &mut self,
        path: &Path,
        content: String,
        fingerprint: Option<(SystemTime, u64)>,
    ) -> Result<String> {
        let size_mb = content.len() as f64 / (1024.0 * 1024.0);
        if size_mb > self.max_file_size_mb as f64 {
            return Err(CodeloomError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb,
                limit_mb: self.max_file_size_mb,
            });
        }

        // Replace any existing backup for the same path first, per spec.
        self.remove_backup(path);

        let operation = EditOperation::new(path.to_path_buf(), content, fingerprint);
        let required = operation.memory_bytes;

        self.evict_until_fits(required)?;

        let operation_id = operation.operation_id.clone();
        self.current_bytes += required;
        self.access_order.push(path.to_path_buf());
        self.entries.insert(path.to_path_buf(), operation);
        Ok(operation_id)
    }

    fn evict_until_fits(&mut self, required: u64) -> Result<()> {
        let cap_bytes = self.max_memory_mb * 1024 * 1024;
        while (self.current_bytes + required > cap_bytes || self.entries.len() >= self.max_backups)
            && !self.access_order.is_empty()
        {
            let oldest = self.access_order.remove(0);
            if let Some(op) = self.entries.remove(&oldest) {
                self.current_bytes = self.current_bytes.saturating_sub(op.memory_bytes);
            }
        }
        if self.current_bytes + required > cap_bytes {
            return Err(CodeloomError::MemoryLimitExceeded(format!(
                "cannot fit {required} bytes under {}MB cap after evicting all entries",
                self.max_memory_mb
            )));
        }
        Ok(())
    }

    /// Promote `path` to most-recently-used and return its entry.
    pub fn get_backup(&mut self, path: &Path) -> Option<&EditOperation> {
        if !self.entries.contains_key(path) {
            return None;
        }
        self.access_order.retain(|p| p != path);
        self.access_order.push(path.to_path_buf());
        self.entries.get(path)
    }

    pub fn get_backup_mut(&mut self, path: &Path) -> Option<&mut EditOperation> {
        self.entries.get_mut(path)
    }

    pub fn remove_backup(&mut self, path: &Path) -> bool {
        if let Some(op) = self.entries.remove(path) {
            self.current_bytes = self.current_bytes.saturating_sub(op.memory_bytes);
            self.access_order.retain(|p| p != path);
            true
        } else {
            false
        }
    }

    pub fn set_status(&mut self, path: &Path, status: EditStatus) {
        if let Some(op) = self.entries.get_mut(path) {
            op.status = status;
        }
    }

    pub fn cleanup_expired(&mut self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let stale: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, op)| {
                now.duration_since(op.created_at).unwrap_or(Duration::ZERO) > max_age
            })
            .map(|(p, _)| p.clone())
            .collect();
        let n = stale.len();
        for path in stale {
            self.remove_backup(&path);
        }
        n
    }

    pub fn list_backups(&self) -> Vec<&EditOperation> {
        self.entries.values().collect()
    }

    pub fn memory_usage(&self) -> BackupMemoryUsage {
        let max_bytes = (self.max_memory_mb * 1024 * 1024) as f64;
        let current_mb = self.current_bytes as f64 / (1024.0 * 1024.0);
        BackupMemoryUsage {
            current_mb,
            max_mb: self.max_memory_mb as f64,
            usage_percent: if max_bytes > 0.0 {
                (self.current_bytes as f64 / max_bytes) * 100.0
            } else {
                0.0
            },
            count: self.entries.len(),
            max_count: self.max_backups,
        }
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.access_order.clear();
        self.current_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_memory_mb: u64, max_backups: usize) -> Config {
        let mut c = Config::default();
        c.max_memory_mb = max_memory_mb;
        c.max_file_size_mb = max_memory_mb;
        c.max_backups = max_backups;
        c
    }

    #[test]
    fn rejects_oversized_file() {
        let mut cache = BackupCache::new(&cfg(1, 10));
        let big = "x".repeat(2 * 1024 * 1024);
        let err = cache
            .add_backup(Path::new("a.py"), big, None)
            .unwrap_err();
        assert_eq!(err.code(), "file_too_large");
    }

    #[test]
    fn evicts_lru_when_count_cap_reached() {
        let mut cache = BackupCache::new(&cfg(50, 2));
        cache.add_backup(Path::new("a.py"), "a".into(), None).unwrap();
        cache.add_backup(Path::new("b.py"), "b".into(), None).unwrap();
        cache.get_backup(Path::new("a.py"));
        cache.add_backup(Path::new("c.py"), "c".into(), None).unwrap();
        assert!(cache.get_backup(Path::new("b.py")).is_none());
        assert!(cache.entries.contains_key(Path::new("a.py")));
        assert!(cache.entries.contains_key(Path::new("c.py")));
    }

    #[test]
    fn cleanup_expired_removes_stale_entries() {
        let mut cache = BackupCache::new(&cfg(50, 10));
        cache.add_backup(Path::new("a.py"), "a".into(), None).unwrap();
        let removed = cache.cleanup_expired(Duration::from_secs(0));
        assert_eq!(removed, 1);
        assert!(cache.get_backup(Path::new("a.py")).is_none());
    }

    #[test]
    fn readding_same_path_replaces_prior_entry() {
        let mut cache = BackupCache::new(&cfg(50, 10));
        cache.add_backup(Path::new("a.py"), "first".into(), None).unwrap();
        cache.add_backup(Path::new("a.py"), "second".into(), None).unwrap();
        assert_eq!(cache.entries.len(), 1);
        assert_eq!(
            cache.get_backup(Path::new("a.py")).unwrap().original_content,
            "second"
        );
    }
}
