//! Error taxonomy shared by every component.
//!
//! Every fallible operation in this crate returns [`CodeloomError`] rather
//! than panicking. Variants are grouped the way the spec's error taxonomy
//! groups them (input / not_found / io / concurrency / resource / edit /
//! internal) so a caller can match on kind without parsing message text.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodeloomError {
    // --- input ---
    #[error("invalid project path: {0}")]
    InvalidPath(PathBuf),

    #[error("invalid symbol name: {0}")]
    InvalidSymbolName(String),

    #[error("invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("unsafe regex pattern rejected: {0}")]
    UnsafeRegex(String),

    #[error("no project has been set")]
    NoProject,

    // --- not_found ---
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("file not in index: {0}")]
    FileNotInIndex(PathBuf),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    // --- io ---
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("encoding error reading {path}: {message}")]
    EncodingError { path: PathBuf, message: String },

    #[error("disk write failed for {path}: {source}")]
    DiskWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // --- concurrency ---
    #[error("timed out acquiring {kind:?} lock on {path} after {timeout_secs}s")]
    LockTimeout {
        path: PathBuf,
        kind: crate::lock::LockKind,
        timeout_secs: u64,
    },

    #[error("lock unavailable for {0}")]
    LockUnavailable(PathBuf),

    #[error("incompatible lock kind requested for {0} (upgrade/downgrade unsupported)")]
    IncompatibleKind(PathBuf),

    // --- resource ---
    #[error("memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    #[error("backup refused for {path}: {reason}")]
    BackupRefused { path: PathBuf, reason: String },

    #[error("file too large: {path} ({size_mb:.1}MB > {limit_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: f64,
        limit_mb: u64,
    },

    // --- edit ---
    #[error("content mismatch editing {0}: old_content not found")]
    ContentMismatch(PathBuf),

    #[error("rollback succeeded for {0}")]
    RollbackSucceeded(PathBuf),

    #[error("rollback failed for {path}: {reason}")]
    RollbackFailed { path: PathBuf, reason: String },

    #[error("rollback unsafe for {0}: file changed externally after backup")]
    RollbackUnsafe(PathBuf),

    // --- internal ---
    #[error("parser failed for {path}: {message}")]
    ParserFailed { path: PathBuf, message: String },

    #[error("index inconsistent after operation {operation_id}: {message}")]
    IndexInconsistent {
        operation_id: String,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CodeloomError>;

impl CodeloomError {
    /// Stable machine-readable code, the shape a tool-dispatch boundary
    /// would surface alongside the human message (spec.md §7).
    pub fn code(&self) -> &'static str {
        match self {
            CodeloomError::InvalidPath(_) => "invalid_path",
            CodeloomError::InvalidSymbolName(_) => "invalid_symbol_name",
            CodeloomError::InvalidRegex(_) => "invalid_regex",
            CodeloomError::UnsafeRegex(_) => "unsafe_regex",
            CodeloomError::NoProject => "no_project",
            CodeloomError::FileNotFound(_) => "file_not_found",
            CodeloomError::FileNotInIndex(_) => "file_not_in_index",
            CodeloomError::SymbolNotFound(_) => "symbol_not_found",
            CodeloomError::PermissionDenied(_) => "permission_denied",
            CodeloomError::EncodingError { .. } => "encoding_error",
            CodeloomError::DiskWriteFailed { .. } => "disk_write_failed",
            CodeloomError::LockTimeout { .. } => "lock_timeout",
            CodeloomError::LockUnavailable(_) => "lock_unavailable",
            CodeloomError::IncompatibleKind(_) => "incompatible_kind",
            CodeloomError::MemoryLimitExceeded(_) => "memory_limit_exceeded",
            CodeloomError::BackupRefused { .. } => "backup_refused",
            CodeloomError::FileTooLarge { .. } => "file_too_large",
            CodeloomError::ContentMismatch(_) => "content_mismatch",
            CodeloomError::RollbackSucceeded(_) => "rollback_succeeded",
            CodeloomError::RollbackFailed { .. } => "rollback_failed",
            CodeloomError::RollbackUnsafe(_) => "rollback_unsafe",
            CodeloomError::ParserFailed { .. } => "parser_failed",
            CodeloomError::IndexInconsistent { .. } => "index_inconsistent",
            CodeloomError::Io(_) => "io_error",
        }
    }

    /// Critical errors are surfaced verbatim; the caller is expected to
    /// trigger a full rebuild (spec.md §7 propagation policy).
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            CodeloomError::RollbackFailed { .. } | CodeloomError::IndexInconsistent { .. }
        )
    }
}
