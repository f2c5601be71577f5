//! `file_ls`, `file_glob` and `file_grep`.

use std::path::Path;
use std::time::SystemTime;

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use walkdir::WalkDir;

use super::paths;

/// Entry cap for `file_ls`.
const LS_CAP: usize = 100;

/// Longest matched line emitted by `file_grep` before the ellipsis.
const GREP_LINE_CHARS: usize = 200;

// ============================================================================
// file_ls
// ============================================================================

/// Render a directory tree: directories before files, lexicographic within
/// each group, capped at 100 files.
pub async fn list_dir(path: &str, ignore: &[String]) -> String {
    let resolved = match paths::resolve(path).await {
        Ok(p) => p,
        Err(e) => return format!("Error: failed to prepare workspace root: {}", e),
    };

    if !resolved.is_dir() {
        return format!("Error: Directory not found: {}", resolved.display());
    }

    let ignore_set = paths::build_ignore_set(ignore);
    let mut lines: Vec<String> = Vec::new();
    let mut shown = 0usize;
    let mut total = 0usize;
    walk_tree(&resolved, &resolved, 0, &ignore_set, &mut lines, &mut shown, &mut total);

    if total == 0 {
        return "Directory is empty".to_string();
    }

    let mut body = lines.join("\n");
    if total > LS_CAP {
        body.push_str(&format!(
            "\n(showing first {} of {}, use more specific path to see more)",
            LS_CAP, total
        ));
    }
    body.push_str(&format!("\n\nFound {} files", total));
    body
}

fn walk_tree(
    dir: &Path,
    root: &Path,
    depth: usize,
    ignore: &GlobSet,
    lines: &mut Vec<String>,
    shown: &mut usize,
    total: &mut usize,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("cannot list {}: {}", dir.display(), e);
            return;
        }
    };

    let mut children: Vec<(bool, String, std::path::PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            if paths::is_ignored(&rel, ignore) {
                return None;
            }
            Some((path.is_dir(), name, path))
        })
        .collect();

    // Directories before files, lexicographic within each group.
    children.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let indent = "  ".repeat(depth);
    for (is_dir, name, path) in children {
        if is_dir {
            if *shown < LS_CAP {
                lines.push(format!("{}{}/", indent, name));
            }
            walk_tree(&path, root, depth + 1, ignore, lines, shown, total);
        } else {
            *total += 1;
            if *shown < LS_CAP {
                lines.push(format!("{}{}", indent, name));
                *shown += 1;
            }
        }
    }
}

// ============================================================================
// file_glob
// ============================================================================

/// Files matching a glob under `path`, newest modification time first.
pub async fn glob_files(pattern: &str, path: &str, max_results: usize) -> String {
    let resolved = match paths::resolve(path).await {
        Ok(p) => p,
        Err(e) => return format!("Error: failed to prepare workspace root: {}", e),
    };

    let glob = match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => return format!("Error: Invalid glob pattern '{}': {}", pattern, e),
    };

    let mut matches: Vec<(SystemTime, String)> = Vec::new();
    for entry in WalkDir::new(&resolved).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(&resolved).unwrap_or(entry.path());
        if !glob.is_match(rel) {
            continue;
        }
        let mtime = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        matches.push((mtime, rel.to_string_lossy().to_string()));
    }

    if matches.is_empty() {
        return "No files found".to_string();
    }

    matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let total = matches.len();
    let mut body: String = matches
        .iter()
        .take(max_results)
        .map(|(_, rel)| rel.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if total > max_results {
        body.push_str(&format!(
            "\n(showing first {} of {} matches)",
            max_results, total
        ));
    }
    body
}

// ============================================================================
// file_grep
// ============================================================================

/// Regex search over file contents, grouped by file, files ordered by
/// modification time (newest first).
pub async fn grep_files(
    pattern: &str,
    path: &str,
    include: Option<&str>,
    case_insensitive: bool,
    max_results: usize,
) -> String {
    let resolved = match paths::resolve(path).await {
        Ok(p) => p,
        Err(e) => return format!("Error: failed to prepare workspace root: {}", e),
    };

    let regex = if case_insensitive {
        Regex::new(&format!("(?i){}", pattern))
    } else {
        Regex::new(pattern)
    };
    let regex = match regex {
        Ok(regex) => regex,
        Err(e) => return format!("Error: Invalid regex pattern: {}", e),
    };

    let include_set = match include {
        Some(raw) => match build_include_set(raw) {
            Ok(set) => Some(set),
            Err(e) => return format!("Error: Invalid include glob '{}': {}", raw, e),
        },
        None => None,
    };

    let ignore_set = paths::default_ignore_set();

    // Collect matches per file, then order files by mtime.
    let mut files: Vec<(SystemTime, String, Vec<(usize, String)>)> = Vec::new();
    for entry in WalkDir::new(&resolved).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&resolved)
            .unwrap_or(entry.path())
            .to_path_buf();
        if paths::is_ignored(&rel, ignore_set) {
            continue;
        }
        if let Some(set) = &include_set {
            let name_match = entry
                .path()
                .file_name()
                .map(|n| set.is_match(Path::new(n)))
                .unwrap_or(false);
            if !set.is_match(&rel) && !name_match {
                continue;
            }
        }

        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            // Binary or unreadable files are silently skipped.
            continue;
        };

        let mut hits: Vec<(usize, String)> = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                hits.push((idx + 1, clip_line(line)));
            }
        }
        if !hits.is_empty() {
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let label = if rel.as_os_str().is_empty() {
                entry.path().to_string_lossy().to_string()
            } else {
                rel.to_string_lossy().to_string()
            };
            files.push((mtime, label, hits));
        }
    }

    if files.is_empty() {
        return "No matches found".to_string();
    }

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let total: usize = files.iter().map(|(_, _, hits)| hits.len()).sum();
    let mut emitted = 0usize;
    let mut sections: Vec<String> = Vec::new();
    'files: for (_, label, hits) in &files {
        let mut section = format!("{}:", label);
        for (line_num, line) in hits {
            if emitted >= max_results {
                sections.push(section);
                break 'files;
            }
            section.push_str(&format!("\n  {}| {}", line_num, line));
            emitted += 1;
        }
        sections.push(section);
        if emitted >= max_results {
            break;
        }
    }

    let mut body = sections.join("\n\n");
    if total > max_results {
        body.push_str(&format!(
            "\n\n(showing first {} of {} matches)",
            max_results, total
        ));
    }
    body
}

fn build_include_set(pattern: &str) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new(pattern)?);
    builder.build()
}

fn clip_line(line: &str) -> String {
    if line.chars().count() > GREP_LINE_CHARS {
        let clipped: String = line.chars().take(GREP_LINE_CHARS).collect();
        format!("{}...", clipped)
    } else {
        line.to_string()
    }
}
