//! `file_write`: verbatim writes with parent-directory creation.

use super::paths;

pub async fn write_file(path: &str, content: &str) -> String {
    let resolved = match paths::resolve(path).await {
        Ok(p) => p,
        Err(e) => return format!("Error: failed to prepare workspace root: {}", e),
    };

    if let Some(parent) = resolved.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return format!("Error: Failed to create parent directories: {}", e);
        }
    }

    match tokio::fs::write(&resolved, content).await {
        Ok(()) => format!(
            "File written successfully: {} ({} bytes)",
            resolved.display(),
            content.len()
        ),
        Err(e) => format!("Error: Failed to write file: {}", e),
    }
}
