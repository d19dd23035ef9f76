//! Recognized configuration options (spec.md §6.4), with the stated
//! defaults. There is no file-based config loader in this crate -
//! construct a `Config` literal or call [`Config::from_env`].

use std::env;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Aggregate cap on Backup Cache contents, in MB.
    pub max_memory_mb: u64,
    /// Per-file rejection threshold for backups, in MB.
    pub max_file_size_mb: u64,
    /// Count cap on Backup Cache.
    pub max_backups: usize,
    /// Expiry age for backup sweep, in seconds.
    pub backup_timeout_seconds: u64,
    /// Fraction of memory cap that emits a warning signal.
    pub warning_threshold: f64,
    /// Default file-lock acquisition timeout, in seconds.
    pub lock_timeout_seconds: u64,
    /// File-Content Cache entry cap. `None` means auto-size from system memory.
    pub content_cache_max_files: Option<usize>,
    /// File-Content Cache byte cap, in MB. `None` means auto-size.
    pub content_cache_max_memory_mb: Option<u64>,
    /// File count above which search scans are parallelized.
    pub parallel_search_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_memory_mb: 50,
            max_file_size_mb: 10,
            max_backups: 1000,
            backup_timeout_seconds: 300,
            warning_threshold: 0.8,
            lock_timeout_seconds: 30,
            content_cache_max_files: None,
            content_cache_max_memory_mb: None,
            parallel_search_threshold: 50,
        }
    }
}

impl Config {
    /// Overlay `CODELOOM_*` environment variables on top of the defaults.
    /// Unset or unparsable variables are left at their default value.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u64("CODELOOM_MAX_MEMORY_MB") {
            cfg.max_memory_mb = v;
        }
        if let Some(v) = env_u64("CODELOOM_MAX_FILE_SIZE_MB") {
            cfg.max_file_size_mb = v;
        }
        if let Some(v) = env_u64("CODELOOM_MAX_BACKUPS") {
            cfg.max_backups = v as usize;
        }
        if let Some(v) = env_u64("CODELOOM_BACKUP_TIMEOUT_SECONDS") {
            cfg.backup_timeout_seconds = v;
        }
        if let Ok(v) = env::var("CODELOOM_WARNING_THRESHOLD") {
            if let Ok(v) = v.parse() {
                cfg.warning_threshold = v;
            }
        }
        if let Some(v) = env_u64("CODELOOM_LOCK_TIMEOUT_SECONDS") {
            cfg.lock_timeout_seconds = v;
        }
        if let Some(v) = env_u64("CODELOOM_CONTENT_CACHE_MAX_FILES") {
            cfg.content_cache_max_files = Some(v as usize);
        }
        if let Some(v) = env_u64("CODELOOM_CONTENT_CACHE_MAX_MEMORY_MB") {
            cfg.content_cache_max_memory_mb = Some(v);
        }
        if let Some(v) = env_u64("CODELOOM_PARALLEL_SEARCH_THRESHOLD") {
            cfg.parallel_search_threshold = v as usize;
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.max_memory_mb, 50);
        assert_eq!(cfg.max_file_size_mb, 10);
        assert_eq!(cfg.max_backups, 1000);
        assert_eq!(cfg.backup_timeout_seconds, 300);
        assert_eq!(cfg.warning_threshold, 0.8);
        assert_eq!(cfg.lock_timeout_seconds, 30);
        assert_eq!(cfg.parallel_search_threshold, 50);
    }
}
