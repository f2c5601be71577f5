//! Path resolution and ignore handling for the file tools.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;

use crate::context;

static DEFAULT_IGNORE_SET: Lazy<GlobSet> = Lazy::new(|| build_ignore_set(&[]));

/// Names and patterns skipped by `file_ls` and `file_grep` unless the caller
/// asks for them explicitly: version-control metadata, common build outputs,
/// editor and OS cruft.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    ".idea",
    ".vscode",
    ".DS_Store",
    "*.swp",
    "*.pyc",
];

/// Resolve a tool path argument against the current workspace root, creating
/// the root when missing. Absolute paths pass through untouched.
pub async fn resolve(path: &str) -> std::io::Result<PathBuf> {
    let root = context::ensure_workspace_root().await?;
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        Ok(candidate.to_path_buf())
    } else {
        Ok(root.join(candidate))
    }
}

/// The compiled default ignore set, shared by callers without extra globs.
pub fn default_ignore_set() -> &'static GlobSet {
    &DEFAULT_IGNORE_SET
}

/// Compile the default ignore set unioned with caller-supplied globs.
///
/// Invalid caller globs are skipped with a warning rather than failing the
/// whole call.
pub fn build_ignore_set(extra: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_IGNORES.iter().copied() {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    for pattern in extra {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => {
                log::warn!("skipping invalid ignore glob '{}': {}", pattern, e);
            }
        }
    }
    builder.build().unwrap_or_else(|e| {
        log::warn!("failed to build ignore set: {}", e);
        GlobSet::empty()
    })
}

/// Whether a path (relative to the listing root) is ignored: matched as a
/// whole, or any single component matched.
pub fn is_ignored(rel_path: &Path, ignore: &GlobSet) -> bool {
    if ignore.is_match(rel_path) {
        return true;
    }
    rel_path
        .components()
        .any(|component| ignore.is_match(Path::new(component.as_os_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ignores() {
        let set = build_ignore_set(&[]);
        assert!(is_ignored(Path::new(".git"), &set));
        assert!(is_ignored(Path::new("src/.git/config"), &set));
        assert!(is_ignored(Path::new("node_modules/left-pad/index.js"), &set));
        assert!(is_ignored(Path::new("notes.swp"), &set));
        assert!(!is_ignored(Path::new("src/main.rs"), &set));
    }

    #[test]
    fn test_caller_globs_union() {
        let set = build_ignore_set(&["*.log".to_string(), "tmp".to_string()]);
        assert!(is_ignored(Path::new("debug.log"), &set));
        assert!(is_ignored(Path::new("tmp/scratch.txt"), &set));
        assert!(!is_ignored(Path::new("src/lib.rs"), &set));
    }

    #[test]
    fn test_invalid_caller_glob_is_skipped() {
        let set = build_ignore_set(&["[".to_string()]);
        // The defaults still apply even when a caller glob fails to compile.
        assert!(is_ignored(Path::new(".git"), &set));
        assert!(!is_ignored(Path::new("src/lib.rs"), &set));
    }
}
