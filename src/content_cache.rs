//! File-Content Cache (spec.md §4.6 / C6).
//!
//! A bounded, line-split LRU of file contents keyed by path, backing both
//! the Search Engine and `get_file_content`. Eviction is a weighted score
//! (age, access frequency, access-pattern regularity) rather than plain
//! recency, so files read on a steady cadence survive longer than a single
//! burst of reads on an unrelated file.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sysinfo::System;

use crate::hashing::hash_bytes;

const RECENT_WINDOW: usize = 10;
const CLEANUP_THRESHOLD: f64 = 0.8;
const LARGE_FILE_THRESHOLD_BYTES: u64 = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    None,
    Warning,
    Critical,
}

#[derive(Debug)]
struct CacheEntry {
    lines: Vec<String>,
    fingerprint: u64,
    byte_size: usize,
    last_access: Instant,
    access_count: u64,
    recent_accesses: VecDeque<Instant>,
}

pub struct ContentCache {
    entries: HashMap<PathBuf, CacheEntry>,
    max_files: usize,
    max_memory_bytes: usize,
    current_memory: usize,
    total_requests: u64,
    cache_hits: u64,
    last_memory_check: Instant,
}

/// Auto-sized defaults from `spec.md` §4.6: roughly 400 entries per GB of
/// system RAM (capped 100-5000) and a memory ceiling of ~20% of system
/// memory (capped 50MB-2048MB).
pub fn auto_size() -> (usize, usize) {
    let mut sys = System::new();
    sys.refresh_memory();
    let total_bytes = sys.total_memory(); // bytes
    if total_bytes == 0 {
        return (1000, 100 * 1024 * 1024);
    }
    let total_gb = total_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    let max_files = ((400.0 * total_gb) as usize).clamp(100, 5000);
    let max_memory_mb = (((total_bytes as f64) * 0.2) / (1024.0 * 1024.0)) as usize;
    let max_memory_mb = max_memory_mb.clamp(50, 2048);
    (max_files, max_memory_mb * 1024 * 1024)
}

impl ContentCache {
    pub fn new(max_files: Option<usize>, max_memory_mb: Option<u64>) -> Self {
        let (auto_files, auto_bytes) = auto_size();
        Self {
            entries: HashMap::new(),
            max_files: max_files.unwrap_or(auto_files),
            max_memory_bytes: max_memory_mb
                .map(|mb| (mb * 1024 * 1024) as usize)
                .unwrap_or(auto_bytes),
            current_memory: 0,
            total_requests: 0,
            cache_hits: 0,
            last_memory_check: Instant::now(),
        }
    }

    /// Get a file's lines, loading or refreshing from disk as needed.
    /// Lines have no trailing newline (spec.md §3.1 `CacheEntry`).
    pub fn get_file_lines(&mut self, root: &Path, path: &Path) -> Vec<String> {
        self.total_requests += 1;
        let abs = root.join(path);
        let fingerprint = fingerprint_of(&abs).unwrap_or(0);

        let needs_reload = match self.entries.get(path) {
            Some(entry) => entry.fingerprint != fingerprint,
            None => true,
        };

        if needs_reload {
            self.load(path, &abs, fingerprint);
        } else {
            self.cache_hits += 1;
        }

        let now = Instant::now();
        if let Some(entry) = self.entries.get_mut(path) {
            entry.last_access = now;
            entry.access_count += 1;
            entry.recent_accesses.push_back(now);
            if entry.recent_accesses.len() > RECENT_WINDOW {
                entry.recent_accesses.pop_front();
            }
        }

        self.maybe_cleanup();

        self.entries
            .get(path)
            .map(|e| e.lines.clone())
            .unwrap_or_default()
    }

    fn load(&mut self, path: &Path, abs: &Path, fingerprint: u64) {
        self.remove(path);
        let lines = match fs::read(abs) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                text.lines().map(str::to_string).collect::<Vec<_>>()
            }
            Err(_) => Vec::new(),
        };
        let byte_size: usize = lines.iter().map(|l| l.len()).sum();
        self.current_memory += byte_size;
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                lines,
                fingerprint,
                byte_size,
                last_access: Instant::now(),
                access_count: 0,
                recent_accesses: VecDeque::new(),
            },
        );
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.remove(path);
    }

    fn remove(&mut self, path: &Path) {
        if let Some(entry) = self.entries.remove(path) {
            self.current_memory = self.current_memory.saturating_sub(entry.byte_size);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_memory = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        self.current_memory
    }

    pub fn hit_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }

    fn maybe_cleanup(&mut self) {
        if Instant::now().duration_since(self.last_memory_check) > Duration::from_secs(30) {
            self.last_memory_check = Instant::now();
            match self.memory_pressure() {
                MemoryPressure::Critical => self.evict_to_targets(0.3),
                MemoryPressure::Warning => self.evict_to_targets(0.5),
                MemoryPressure::None => {}
            }
        }

        let over_count = self.entries.len() as f64 > self.max_files as f64 * CLEANUP_THRESHOLD;
        let over_memory =
            self.current_memory as f64 > self.max_memory_bytes as f64 * CLEANUP_THRESHOLD;
        if over_count || over_memory {
            self.evict_to_targets(0.7);
        }
    }

    /// System-wide memory pressure, consulted by `maybe_cleanup` on a
    /// periodic (30s) cadence rather than every request.
    pub fn memory_pressure(&self) -> MemoryPressure {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return MemoryPressure::None;
        }
        let available_percent = sys.available_memory() as f64 / total as f64 * 100.0;
        if available_percent < 10.0 {
            MemoryPressure::Critical
        } else if available_percent < 20.0 {
            MemoryPressure::Warning
        } else {
            MemoryPressure::None
        }
    }

    /// Evict entries, highest score first, until both the file count and
    /// memory usage are at or below `target_fraction` of their caps.
    fn evict_to_targets(&mut self, target_fraction: f64) {
        let target_files = (self.max_files as f64 * target_fraction) as usize;
        let target_memory = (self.max_memory_bytes as f64 * target_fraction) as usize;

        let now = Instant::now();
        let mut scored: Vec<(PathBuf, f64)> = self
            .entries
            .iter()
            .map(|(path, entry)| (path.clone(), eviction_score(entry, now)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (path, _) in scored {
            if self.entries.len() <= target_files && self.current_memory <= target_memory {
                break;
            }
            self.remove(&path);
        }
    }
}

/// `score = age_hours + 1/access_count - pattern_bonus`. Higher score is
/// more evictable. `pattern_bonus` rewards regular, periodic access
/// (spec.md §4.6).
fn eviction_score(entry: &CacheEntry, now: Instant) -> f64 {
    let age_hours = now.duration_since(entry.last_access).as_secs_f64() / 3600.0;
    let freq_score = 1.0 / entry.access_count.max(1) as f64;
    let pattern_bonus = pattern_score(&entry.recent_accesses, now);
    age_hours + freq_score - pattern_bonus
}

fn pattern_score(recent_accesses: &VecDeque<Instant>, now: Instant) -> f64 {
    if recent_accesses.len() < 2 {
        return 0.0;
    }
    let intervals: Vec<f64> = recent_accesses
        .iter()
        .zip(recent_accesses.iter().skip(1))
        .map(|(a, b)| b.duration_since(*a).as_secs_f64())
        .collect();
    if intervals.is_empty() {
        return 0.0;
    }
    let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let variance = intervals.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / intervals.len() as f64;
    let time_since_last = now.duration_since(*recent_accesses.back().unwrap()).as_secs_f64();
    if time_since_last < avg * 2.0 && variance < avg * 0.5 {
        2.0
    } else {
        0.0
    }
}

/// Fingerprint used to detect whether a cached entry needs reloading.
/// Files at or above 10 KiB use `(mtime, size, inode)` metadata only;
/// smaller files hash their content (spec.md §4.6).
fn fingerprint_of(abs_path: &Path) -> std::io::Result<u64> {
    let meta = fs::metadata(abs_path)?;
    if meta.len() >= LARGE_FILE_THRESHOLD_BYTES {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            meta.ino()
        };
        #[cfg(not(unix))]
        let inode: u64 = 0;
        let combined = format!("{mtime}:{}:{inode}", meta.len());
        Ok(hash_bytes(combined.as_bytes()))
    } else {
        let bytes = fs::read(abs_path)?;
        Ok(hash_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reload_reflects_external_edits() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "one\n").unwrap();
        let mut cache = ContentCache::new(Some(10), Some(10));
        assert_eq!(
            cache.get_file_lines(dir.path(), Path::new("a.py")),
            vec!["one".to_string()]
        );
        fs::write(dir.path().join("a.py"), "one\ntwo\n").unwrap();
        assert_eq!(
            cache.get_file_lines(dir.path(), Path::new("a.py")),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn invalidate_forces_reload() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "one\n").unwrap();
        let mut cache = ContentCache::new(Some(10), Some(10));
        cache.get_file_lines(dir.path(), Path::new("a.py"));
        cache.invalidate(Path::new("a.py"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn eviction_prefers_low_access_stale_entries() {
        let now = Instant::now();
        let fresh = CacheEntry {
            lines: vec![],
            fingerprint: 0,
            byte_size: 0,
            last_access: now,
            access_count: 100,
            recent_accesses: VecDeque::new(),
        };
        let stale = CacheEntry {
            lines: vec![],
            fingerprint: 0,
            byte_size: 0,
            last_access: now - Duration::from_secs(3600 * 5),
            access_count: 1,
            recent_accesses: VecDeque::new(),
        };
        assert!(eviction_score(&stale, now) > eviction_score(&fresh, now));
    }
}
