//! File Walker + Filter (spec.md §4.1 / C1).
//!
//! Recursively walks a project root and yields files whose leaf extension
//! is registered as a source extension and no path segment names an
//! excluded directory. Individual entry errors (permission, stat failure)
//! are skipped silently; traversal continues.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Directory names skipped wholesale, regardless of depth.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".idea",
    ".vscode",
    ".codeloom",
];

/// Extensions recognized as source files out of the box. The Parser
/// Registry (C2) may recognize a superset via registered providers; this
/// set only governs what the walker *yields* as candidates.
pub fn default_extensions() -> HashSet<&'static str> {
    [
        "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp", "cc", "hpp", "cs",
        "rb", "php", "swift", "kt", "lua", "sql", "html", "css", "vue", "sh", "bash", "md", "json",
        "toml", "yaml", "yml",
    ]
    .into_iter()
    .collect()
}

pub struct Walker {
    root: PathBuf,
    extensions: HashSet<String>,
    excluded_dirs: HashSet<String>,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: default_extensions().into_iter().map(String::from).collect(),
            excluded_dirs: EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.extensions = extensions.into_iter().collect();
        self
    }

    /// Whether `path` would be yielded by this walker, without walking.
    /// Used by the incremental updater to classify individually-touched
    /// paths without a full re-walk.
    pub fn accepts(&self, path: &Path) -> bool {
        if path
            .components()
            .any(|c| self.excluded_dirs.contains(c.as_os_str().to_string_lossy().as_ref()))
        {
            return false;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.contains(ext),
            None => false,
        }
    }

    /// Enumerate all accepted files under the root, as paths relative to
    /// the root with forward-slash separators.
    pub fn walk(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                if !e.file_type().is_dir() {
                    return true;
                }
                !self
                    .excluded_dirs
                    .contains(e.file_name().to_string_lossy().as_ref())
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue, // permission / stat failure: skip silently
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !self.accepts(path) {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(&self.root) {
                out.push(normalize(rel));
            }
        }
        out
    }
}

/// Normalize a path to forward-slash separators (project-relative key
/// shape used throughout the index, per spec.md §3.1).
pub fn normalize(path: &Path) -> PathBuf {
    let s = path.to_string_lossy().replace('\\', "/");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn skips_excluded_dirs_and_unrecognized_extensions() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.js"), "x").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("readme.bin"), "x").unwrap();

        let found = Walker::new(dir.path()).walk();
        assert_eq!(found, vec![PathBuf::from("main.rs")]);
    }

    #[test]
    fn does_not_follow_symlinks_outside_root() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.rs"), "fn f(){}").unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
            let found = Walker::new(dir.path()).walk();
            assert!(found.is_empty());
        }
    }
}
