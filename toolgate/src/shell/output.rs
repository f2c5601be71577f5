//! Renderings for command results.
//!
//! All strings the shell tools hand back to the client are composed here:
//! stdout/stderr block layout, the running and backgrounded notices, and the
//! head-tail truncation applied to every outbound rendering.

/// Renderings above this size are head-tail truncated.
pub const MAX_RENDER_CHARS: usize = 30_000;

/// Share of the budget kept from the head of an oversized rendering.
const HEAD_SHARE_CHARS: usize = MAX_RENDER_CHARS * 8 / 10;

/// Drop the sentinel marker line and everything after it from stdout.
pub fn strip_marker(stdout: &str, marker: &str) -> String {
    match stdout.find(marker) {
        Some(pos) => stdout[..pos].to_string(),
        None => stdout.to_string(),
    }
}

/// Compose stdout/stderr into labeled blocks.
///
/// A single populated stream is emitted alone; both populated get `STDOUT:`
/// then `STDERR:` labels. Chunks are never re-ordered within a stream.
pub fn compose_blocks(stdout: &str, stderr: &str) -> String {
    let out = stdout.trim_end_matches('\n');
    let err = stderr.trim_end_matches('\n');
    match (out.is_empty(), err.is_empty()) {
        (true, true) => String::new(),
        (false, true) => out.to_string(),
        (true, false) => err.to_string(),
        (false, false) => format!("STDOUT:\n{}\nSTDERR:\n{}", out, err),
    }
}

/// Synchronous completion rendering: output blocks plus the exit code line.
pub fn render_completed(stdout_stripped: &str, stderr: &str, exit_code: i32) -> String {
    let blocks = compose_blocks(stdout_stripped, stderr);
    let rendering = if blocks.is_empty() {
        format!("Exit code: {}", exit_code)
    } else {
        format!("{}\nExit code: {}", blocks, exit_code)
    };
    truncate_head_tail(&rendering)
}

/// Notice returned when a synchronous call gives up and backgrounds.
pub fn render_backgrounded(id: &str, command: &str, reason: &str, stdout: &str, stderr: &str) -> String {
    let blocks = compose_blocks(stdout, stderr);
    let output_section = if blocks.is_empty() {
        "No output captured yet".to_string()
    } else {
        blocks
    };
    let rendering = format!(
        "Command is still running in background ({}).\n\
         Process ID: {}\n\
         Command: {}\n\
         Use check_process to poll its output, or send_input to write to its stdin.\n\n\
         {}",
        reason, id, command, output_section
    );
    truncate_head_tail(&rendering)
}

/// `check_process` rendering for a still-running record.
pub fn render_running(
    id: &str,
    command: &str,
    rationale: Option<&str>,
    elapsed_secs: u64,
    reason: &str,
    stdout: &str,
    stderr: &str,
) -> String {
    let blocks = compose_blocks(stdout, stderr);
    let output_section = if blocks.is_empty() {
        "No output captured yet".to_string()
    } else {
        blocks
    };
    let rationale_line = match rationale {
        Some(r) => format!("Rationale: {}\n", r),
        None => String::new(),
    };
    let rendering = format!(
        "Process Status: RUNNING\n\
         Process ID: {}\n\
         Command: {}\n\
         {}Elapsed: {}s\n\
         Wait reason: {}\n\n\
         {}",
        id, command, rationale_line, elapsed_secs, reason, output_section
    );
    truncate_head_tail(&rendering)
}

/// `check_process` rendering for a completed record, wrapping the cached
/// final rendering.
pub fn render_completed_check(id: &str, command: &str, final_rendering: &str) -> String {
    let rendering = format!(
        "Process Status: COMPLETED\n\
         Process ID: {}\n\
         Command: {}\n\n\
         {}",
        id, command, final_rendering
    );
    truncate_head_tail(&rendering)
}

/// Head-tail truncation: keep the first 80% and last 20% of the budget,
/// separated by a count of the characters removed.
pub fn truncate_head_tail(text: &str) -> String {
    let total = text.chars().count();
    if total <= MAX_RENDER_CHARS {
        return text.to_string();
    }

    let tail_chars = MAX_RENDER_CHARS - HEAD_SHARE_CHARS;
    let removed = total - MAX_RENDER_CHARS;

    let head_end = text
        .char_indices()
        .nth(HEAD_SHARE_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let tail_start = text
        .char_indices()
        .nth(total - tail_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);

    format!(
        "{}\n\n[... truncated {} characters ...]\n\n{}",
        &text[..head_end],
        removed,
        &text[tail_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_marker() {
        let marker = "__TOOLGATE_DONE_abc__";
        let raw = format!("hello\n{} EXIT_CODE:0\n", marker);
        assert_eq!(strip_marker(&raw, marker), "hello\n");
        assert_eq!(strip_marker("no marker here", marker), "no marker here");
    }

    #[test]
    fn test_compose_blocks() {
        assert_eq!(compose_blocks("", ""), "");
        assert_eq!(compose_blocks("out\n", ""), "out");
        assert_eq!(compose_blocks("", "err\n"), "err");
        assert_eq!(compose_blocks("out\n", "err\n"), "STDOUT:\nout\nSTDERR:\nerr");
    }

    #[test]
    fn test_render_completed() {
        let rendering = render_completed("hello\n", "", 0);
        assert_eq!(rendering, "hello\nExit code: 0");

        let empty = render_completed("", "", 3);
        assert_eq!(empty, "Exit code: 3");
    }

    #[test]
    fn test_render_running_no_output() {
        let rendering = render_running(
            "proc_1_aaaaaaaa",
            "sleep 30",
            Some("testing"),
            4,
            "no output for 2 seconds",
            "",
            "",
        );
        assert!(rendering.starts_with("Process Status: RUNNING"));
        assert!(rendering.contains("Process ID: proc_1_aaaaaaaa"));
        assert!(rendering.contains("Command: sleep 30"));
        assert!(rendering.contains("Rationale: testing"));
        assert!(rendering.contains("No output captured yet"));
    }

    #[test]
    fn test_render_backgrounded_mentions_id_and_background() {
        let rendering = render_backgrounded("proc_1_bbbbbbbb", "sleep 30", "no output for 2 seconds", "", "");
        assert!(rendering.contains("running in background"));
        assert!(rendering.contains("Process ID: proc_1_bbbbbbbb"));
    }

    #[test]
    fn test_truncation_boundary() {
        let short = "a".repeat(MAX_RENDER_CHARS);
        assert_eq!(truncate_head_tail(&short), short);

        let long = "b".repeat(MAX_RENDER_CHARS + 1_000);
        let truncated = truncate_head_tail(&long);
        assert!(truncated.contains("[... truncated 1000 characters ...]"));
        // Head and tail shares survive around the divider.
        assert!(truncated.starts_with(&"b".repeat(100)));
        assert!(truncated.ends_with(&"b".repeat(100)));
    }

    #[test]
    fn test_truncation_is_multibyte_safe() {
        let long = "é".repeat(MAX_RENDER_CHARS + 500);
        let truncated = truncate_head_tail(&long);
        assert!(truncated.contains("[... truncated 500 characters ...]"));
    }
}
