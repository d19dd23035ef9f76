//! Fast non-cryptographic 64-bit hashing (spec.md §9: "any fast 64-bit
//! non-cryptographic hash is acceptable (xxh3 family is a natural fit)").

use std::fs;
use std::path::Path;

use xxhash_rust::xxh3::xxh3_64;

/// Hash of a file's full byte content. Used by the Change Tracker (C4) as
/// the tiebreaker when `(mtime, size)` alone is inconclusive.
pub fn content_hash(path: &Path) -> std::io::Result<u64> {
    let bytes = fs::read(path)?;
    Ok(xxh3_64(&bytes))
}

/// Hash of an in-memory byte slice, used by the content cache and search
/// compile cache keys.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}
