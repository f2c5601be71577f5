//! `file_edit`: exact-substring replacement with backup-then-replace.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::paths;

pub async fn edit_file(path: &str, old_string: &str, new_string: &str, replace_all: bool) -> String {
    if old_string == new_string {
        return "Error: oldString and newString must be different".to_string();
    }

    let resolved = match paths::resolve(path).await {
        Ok(p) => p,
        Err(e) => return format!("Error: failed to prepare workspace root: {}", e),
    };

    let content = match tokio::fs::read_to_string(&resolved).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return format!("Error: File not found: {}", resolved.display());
        }
        Err(e) => return format!("Error: Failed to read file: {}", e),
    };

    if !content.contains(old_string) {
        return "Error: String not found in file".to_string();
    }

    let replacements = if replace_all {
        content.matches(old_string).count()
    } else {
        1
    };
    let replaced = if replace_all {
        content.replace(old_string, new_string)
    } else {
        content.replacen(old_string, new_string, 1)
    };

    let backup = backup_path(&resolved);
    if let Err(e) = tokio::fs::copy(&resolved, &backup).await {
        return format!("Error: Failed to create backup: {}", e);
    }

    if let Err(e) = tokio::fs::write(&resolved, &replaced).await {
        // Restore is unconditional; the write may have clobbered the file.
        if let Err(restore_err) = tokio::fs::copy(&backup, &resolved).await {
            log::error!(
                "failed to restore {} from backup: {}",
                resolved.display(),
                restore_err
            );
        }
        let _ = tokio::fs::remove_file(&backup).await;
        return format!("Error: Failed to write file (original restored): {}", e);
    }

    if let Err(e) = tokio::fs::remove_file(&backup).await {
        // The edit already succeeded; a stale backup is only noise.
        log::warn!("failed to remove backup {}: {}", backup.display(), e);
    }

    format!(
        "File edited successfully: {} ({} replacement{})",
        resolved.display(),
        replacements,
        if replacements == 1 { "" } else { "s" }
    )
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(".backup");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        tokio::fs::write(&path, content).await.unwrap();
        (dir, path.to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn test_edit_first_occurrence() {
        let (_dir, path) = fixture("aaa bbb aaa").await;
        let result = edit_file(&path, "aaa", "ccc", false).await;
        assert!(result.contains("1 replacement"), "{}", result);
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "ccc bbb aaa"
        );
    }

    #[tokio::test]
    async fn test_edit_replace_all() {
        let (_dir, path) = fixture("aaa bbb aaa").await;
        let result = edit_file(&path, "aaa", "ccc", true).await;
        assert!(result.contains("2 replacements"), "{}", result);
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "ccc bbb ccc"
        );
    }

    #[tokio::test]
    async fn test_edit_twice_is_noop_failure() {
        let (_dir, path) = fixture("X").await;
        let first = edit_file(&path, "X", "Y", true).await;
        assert!(first.starts_with("File edited successfully"), "{}", first);

        let second = edit_file(&path, "X", "Y", true).await;
        assert_eq!(second, "Error: String not found in file");
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "Y");
    }

    #[tokio::test]
    async fn test_edit_identical_strings_refused() {
        let (_dir, path) = fixture("X").await;
        let result = edit_file(&path, "X", "X", false).await;
        assert_eq!(result, "Error: oldString and newString must be different");
    }

    #[tokio::test]
    async fn test_edit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.txt").to_string_lossy().to_string();
        let result = edit_file(&path, "a", "b", false).await;
        assert!(result.starts_with("Error: File not found"));
    }

    #[tokio::test]
    async fn test_backup_removed_on_success() {
        let (_dir, path) = fixture("needle in haystack").await;
        edit_file(&path, "needle", "pin", false).await;
        assert!(!Path::new(&format!("{}.backup", path)).exists());
    }
}
