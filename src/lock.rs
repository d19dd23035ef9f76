//! File Lock Manager (spec.md §4.9 / C9).
//!
//! Per-path exclusive/shared locking with timeout + retry, grounded in the
//! original `FileLock`/`LockManager` pairing: a process-wide table of
//! in-flight locks layered over an OS-level primitive. The OS primitive
//! here is `fs2`'s advisory lock on a sibling `.lock` file rather than
//! fcntl/LockFileEx directly, since `fs2` already abstracts that split the
//! way the original's platform branch does. When the advisory lock call
//! reports it isn't supported by the target filesystem, a sentinel file
//! carrying the owner pid and timestamp stands in, with the same 30s
//! stale cutoff the original uses for its Windows-without-pywin32 path.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::ThreadId;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fs2::FileExt;

use crate::error::{CodeloomError, Result};

const STALE_SENTINEL_SECS: u64 = 30;
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    Shared,
    Exclusive,
}

enum OsLock {
    Advisory(File),
    Sentinel(PathBuf),
}

/// Outcome of one non-blocking OS-level lock attempt. `Contended` is not an
/// error: the caller folds it back into the sleep-retry loop so contention
/// from another process or manager is retried until `timeout`, same as
/// in-table contention from another thread (spec.md §4.9).
enum OsLockAttempt {
    Acquired(OsLock),
    Contended,
}

struct LockRecord {
    kind: LockKind,
    owners: HashMap<ThreadId, usize>,
    os_lock: OsLock,
}

pub struct FileLockManager {
    locks: Mutex<HashMap<PathBuf, LockRecord>>,
}

/// RAII handle; dropping it (or calling `release` explicitly, which is
/// idempotent) releases this thread's hold on the path.
pub struct LockGuard<'a> {
    manager: &'a FileLockManager,
    path: PathBuf,
    released: bool,
}

impl FileLockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire(&self, path: &Path, kind: LockKind, timeout: Duration) -> Result<LockGuard<'_>> {
        let key = normalize(path);
        let thread = std::thread::current().id();
        let start = Instant::now();

        loop {
            {
                let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
                match locks.get_mut(&key) {
                    None => match acquire_os_lock(&key, kind)? {
                        OsLockAttempt::Acquired(os_lock) => {
                            let mut owners = HashMap::new();
                            owners.insert(thread, 1);
                            locks.insert(
                                key.clone(),
                                LockRecord {
                                    kind,
                                    owners,
                                    os_lock,
                                },
                            );
                            return Ok(LockGuard {
                                manager: self,
                                path: key,
                                released: false,
                            });
                        }
                        // Held by another process/manager: fall through to
                        // retry rather than failing on the first attempt.
                        OsLockAttempt::Contended => {}
                    },
                    Some(record) if record.kind == kind => {
                        if kind == LockKind::Shared || record.owners.contains_key(&thread) {
                            *record.owners.entry(thread).or_insert(0) += 1;
                            return Ok(LockGuard {
                                manager: self,
                                path: key,
                                released: false,
                            });
                        }
                        // Exclusive held by a different thread: fall through to retry.
                    }
                    Some(record) => {
                        // Kind mismatch. Per spec.md §4.9, a same-thread
                        // upgrade/downgrade request fails immediately
                        // rather than retrying.
                        if record.owners.contains_key(&thread) {
                            return Err(CodeloomError::IncompatibleKind(path.to_path_buf()));
                        }
                        // Held by another thread with an incompatible
                        // kind: fall through to retry.
                    }
                }
            }

            if start.elapsed() >= timeout {
                return Err(CodeloomError::LockTimeout {
                    path: path.to_path_buf(),
                    kind,
                    timeout_secs: timeout.as_secs(),
                });
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }

    fn release(&self, path: &Path, thread: ThreadId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let Some(record) = locks.get_mut(path) else {
            return;
        };
        if let Some(count) = record.owners.get_mut(&thread) {
            *count -= 1;
            if *count == 0 {
                record.owners.remove(&thread);
            }
        }
        if record.owners.is_empty() {
            if let Some(record) = locks.remove(path) {
                release_os_lock(record.os_lock);
            }
        }
    }
}

impl Default for FileLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.manager.release(&self.path, std::thread::current().id());
        }
    }
}

impl LockGuard<'_> {
    /// Idempotent explicit release; `Drop` performs the same action for
    /// callers that don't invoke this.
    pub fn release(mut self) {
        self.manager.release(&self.path, std::thread::current().id());
        self.released = true;
    }
}

fn normalize(path: &Path) -> PathBuf {
    crate::walker::normalize(path)
}

fn lock_sibling_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Non-blocking single attempt at the OS-level primitive. A genuine `Err`
/// here means the lock file itself couldn't be opened/written, not that it
/// is contended - contention is reported as `Contended` so `acquire`'s
/// retry loop, not this function, decides when to give up (spec.md §4.9).
fn acquire_os_lock(path: &Path, kind: LockKind) -> Result<OsLockAttempt> {
    let sibling = lock_sibling_path(path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&sibling)
        .map_err(|e| CodeloomError::DiskWriteFailed {
            path: sibling.clone(),
            source: e,
        })?;

    let result = match kind {
        LockKind::Exclusive => file.try_lock_exclusive(),
        LockKind::Shared => file.try_lock_shared(),
    };

    match result {
        Ok(()) => Ok(OsLockAttempt::Acquired(OsLock::Advisory(file))),
        Err(e) if e.kind() == io::ErrorKind::Unsupported => acquire_sentinel_lock(&sibling, kind),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(OsLockAttempt::Contended),
        Err(_) => Err(CodeloomError::LockUnavailable(path.to_path_buf())),
    }
}

/// Sentinel-file fallback for filesystems where advisory byte-range locks
/// aren't available (spec.md §4.9's Windows-without-native-API path).
fn acquire_sentinel_lock(sibling: &Path, kind: LockKind) -> Result<OsLockAttempt> {
    if let Ok(meta) = fs::metadata(sibling) {
        let age = meta
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|mtime| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .saturating_sub(mtime)
            })
            .unwrap_or_default();
        if age.as_secs() < STALE_SENTINEL_SECS {
            return Ok(OsLockAttempt::Contended);
        }
        let _ = fs::remove_file(sibling);
    }

    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let kind_str = match kind {
        LockKind::Shared => "shared",
        LockKind::Exclusive => "exclusive",
    };
    let contents = format!("{}\n{}\n{}\n", std::process::id(), now_secs, kind_str);
    fs::write(sibling, contents).map_err(|e| CodeloomError::DiskWriteFailed {
        path: sibling.to_path_buf(),
        source: e,
    })?;
    Ok(OsLockAttempt::Acquired(OsLock::Sentinel(sibling.to_path_buf())))
}

fn release_os_lock(lock: OsLock) {
    match lock {
        OsLock::Advisory(file) => {
            let _ = fs2::FileExt::unlock(&file);
        }
        OsLock::Sentinel(path) => {
            let _ = fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exclusive_lock_excludes_a_second_acquisition_from_another_thread() {
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x").unwrap();
        let manager = Arc::new(FileLockManager::new());

        let guard = manager
            .acquire(&path, LockKind::Exclusive, Duration::from_secs(1))
            .unwrap();

        let other_manager = Arc::clone(&manager);
        let other_path = path.clone();
        let handle = std::thread::spawn(move || {
            other_manager.acquire(&other_path, LockKind::Exclusive, Duration::from_millis(200))
        });
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(CodeloomError::LockTimeout { .. })));
        drop(guard);
    }

    #[test]
    fn shared_locks_coexist_on_same_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x").unwrap();
        let manager = FileLockManager::new();

        let g1 = manager
            .acquire(&path, LockKind::Shared, Duration::from_secs(1))
            .unwrap();
        let g2 = manager
            .acquire(&path, LockKind::Shared, Duration::from_secs(1))
            .unwrap();
        drop(g1);
        drop(g2);
    }

    #[test]
    fn reentrant_exclusive_on_same_thread_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x").unwrap();
        let manager = FileLockManager::new();

        let g1 = manager
            .acquire(&path, LockKind::Exclusive, Duration::from_secs(1))
            .unwrap();
        let g2 = manager
            .acquire(&path, LockKind::Exclusive, Duration::from_secs(1))
            .unwrap();
        drop(g1);
        drop(g2);
    }

    #[test]
    fn os_level_contention_from_another_manager_retries_until_timeout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x").unwrap();

        // A second, independent manager holds the OS-level advisory lock,
        // so from this manager's perspective the in-process table has no
        // entry for the path and `acquire_os_lock` is the only thing that
        // can observe the contention.
        let blocker = FileLockManager::new();
        let guard = blocker
            .acquire(&path, LockKind::Exclusive, Duration::from_secs(5))
            .unwrap();

        let manager = FileLockManager::new();
        let start = Instant::now();
        let result = manager.acquire(&path, LockKind::Exclusive, Duration::from_millis(200));
        assert!(matches!(result, Err(CodeloomError::LockTimeout { .. })));
        assert!(start.elapsed() >= Duration::from_millis(200));

        drop(guard);
    }

    #[test]
    fn incompatible_kind_on_same_thread_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x").unwrap();
        let manager = FileLockManager::new();

        let _g1 = manager
            .acquire(&path, LockKind::Exclusive, Duration::from_secs(1))
            .unwrap();
        let err = manager
            .acquire(&path, LockKind::Shared, Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.code(), "incompatible_kind");
    }
}
