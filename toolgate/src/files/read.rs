//! `file_read`: line-numbered file reading.

use super::paths;

/// Longest line emitted before truncation.
const MAX_LINE_CHARS: usize = 2000;

/// Bytes inspected when sniffing for binary content.
const SNIFF_BYTES: usize = 8192;

/// Read `limit` lines starting at 0-based line `offset`, rendered with a
/// five-character right-justified line-number column.
pub async fn read_file(path: &str, offset: usize, limit: usize) -> String {
    let resolved = match paths::resolve(path).await {
        Ok(p) => p,
        Err(e) => return format!("Error: failed to prepare workspace root: {}", e),
    };

    match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_dir() => {
            return format!("Error: Path is a directory: {}", resolved.display());
        }
        Ok(_) => {}
        Err(_) => {
            return format!("Error: File not found: {}", resolved.display());
        }
    }

    let bytes = match tokio::fs::read(&resolved).await {
        Ok(bytes) => bytes,
        Err(e) => return format!("Error: Failed to read file: {}", e),
    };

    if bytes
        .iter()
        .take(SNIFF_BYTES)
        .any(|&b| b == 0)
    {
        return format!("Error: Cannot read binary file: {}", resolved.display());
    }

    let content = String::from_utf8_lossy(&bytes);
    let mut rendered = String::new();
    for (idx, line) in content.lines().enumerate().skip(offset).take(limit) {
        let shown: String = if line.chars().count() > MAX_LINE_CHARS {
            line.chars().take(MAX_LINE_CHARS).collect()
        } else {
            line.to_string()
        };
        rendered.push_str(&format!("{:>5}| {}\n", idx + 1, shown));
    }

    // Empty files (and windows past EOF) yield an empty rendering.
    rendered.trim_end_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_fixture(content: &[u8]) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.txt");
        tokio::fs::write(&path, content).await.unwrap();
        (dir, path.to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn test_read_renders_line_numbers() {
        let (_dir, path) = write_fixture(b"alpha\nbeta\ngamma\n").await;
        let rendered = read_file(&path, 0, 2000).await;
        assert_eq!(rendered, "    1| alpha\n    2| beta\n    3| gamma");
    }

    #[tokio::test]
    async fn test_read_offset_and_limit() {
        let (_dir, path) = write_fixture(b"a\nb\nc\nd\n").await;
        let rendered = read_file(&path, 1, 2).await;
        assert_eq!(rendered, "    2| b\n    3| c");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.txt").to_string_lossy().to_string();
        let rendered = read_file(&path, 0, 2000).await;
        assert!(rendered.starts_with("Error: File not found"));
    }

    #[tokio::test]
    async fn test_read_binary_file() {
        let (_dir, path) = write_fixture(&[0u8, 159, 146, 150]).await;
        let rendered = read_file(&path, 0, 2000).await;
        assert!(rendered.starts_with("Error: Cannot read binary file"));
    }

    #[tokio::test]
    async fn test_read_empty_file() {
        let (_dir, path) = write_fixture(b"").await;
        assert_eq!(read_file(&path, 0, 2000).await, "");
    }

    #[tokio::test]
    async fn test_long_line_truncated() {
        let long = "x".repeat(3000);
        let (_dir, path) = write_fixture(long.as_bytes()).await;
        let rendered = read_file(&path, 0, 2000).await;
        let line = rendered.lines().next().unwrap();
        // "    1| " prefix plus exactly 2000 kept characters.
        assert_eq!(line.chars().count(), 7 + 2000);
    }

    #[tokio::test]
    async fn test_read_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = read_file(&dir.path().to_string_lossy(), 0, 2000).await;
        assert!(rendered.starts_with("Error: Path is a directory"));
    }
}
