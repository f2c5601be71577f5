//! Interactive command executor.
//!
//! One `bash` per call, the command injected through its stdin with a
//! sentinel trailer so the exit code can be recovered without closing stdin.
//! The call either completes synchronously or backgrounds once the
//! output-inactivity budget (or the absolute cap) runs out; the shell keeps
//! running either way and stays pollable through the registry.

use std::process::Stdio;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use super::output;
use super::registry::{ProcessRecord, ProcessRegistry, ProcessStatus};
use crate::context;

/// Hard ceiling on any synchronous wait, and the inactivity clamp.
pub const ABSOLUTE_CAP_SECS: u64 = 600;

/// Poll interval of the `execute_command` wait loop.
const EXECUTE_POLL: Duration = Duration::from_millis(100);

/// Poll interval of the `check_process` wait loop.
const CHECK_POLL: Duration = Duration::from_millis(500);

/// Executor over a shared process registry.
#[derive(Clone)]
pub struct ShellExecutor {
    registry: ProcessRegistry,
    default_inactivity_secs: u64,
}

impl ShellExecutor {
    pub fn new(registry: ProcessRegistry, default_inactivity_secs: u64) -> Self {
        Self {
            registry,
            default_inactivity_secs,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Run a command, returning either a synchronous completion rendering or
    /// a backgrounded notice carrying the process id.
    pub async fn execute(
        &self,
        command: &str,
        rationale: Option<String>,
        inactivity_secs: Option<u64>,
    ) -> String {
        let budget = inactivity_secs
            .unwrap_or(self.default_inactivity_secs)
            .min(ABSOLUTE_CAP_SECS);
        let id = ProcessRegistry::generate_id();
        let marker = make_marker();
        let framed = frame_command(command, &marker);

        log::info!(
            "execute_command id={} inactivity={}s rationale={}",
            id,
            budget,
            rationale.as_deref().unwrap_or("-")
        );

        let mut record = ProcessRecord::new(
            id.clone(),
            command.to_string(),
            rationale,
            marker.clone(),
            budget,
        );

        let root = match context::ensure_workspace_root().await {
            Ok(root) => root,
            Err(e) => {
                let rendering =
                    format!("Error: failed to prepare workspace root: {}\nExit code: 1", e);
                record.complete(1, rendering.clone());
                self.registry.insert(record).await;
                return rendering;
            }
        };

        let mut child = match Command::new("bash")
            .current_dir(&root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::error!("failed to spawn shell for {}: {}", id, e);
                let rendering = format!("Error: failed to spawn shell: {}\nExit code: 1", e);
                record.complete(1, rendering.clone());
                self.registry.insert(record).await;
                return rendering;
            }
        };

        let mut stdin = child.stdin.take().expect("shell stdin not captured");
        let stdout = child.stdout.take().expect("shell stdout not captured");
        let stderr = child.stderr.take().expect("shell stderr not captured");

        let injected = async {
            stdin.write_all(framed.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = injected {
            let _ = child.start_kill();
            let rendering = format!("Error: failed to inject command: {}\nExit code: 1", e);
            record.complete(1, rendering.clone());
            self.registry.insert(record).await;
            return rendering;
        }

        // Stdin stays open for the life of the record; send_input writes to
        // it, and dropping it is what lets the shell exit.
        record.stdin = Some(stdin);
        let (kill_tx, kill_rx) = oneshot::channel();
        record.kill_tx = Some(kill_tx);
        let entry = self.registry.insert(record).await;

        // Output pumps: append chunks, refresh the inactivity clock, watch
        // stdout for the sentinel marker.
        let stdout_entry = entry.clone();
        let stdout_pump = tokio::spawn(async move {
            let mut reader = stdout;
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
                        let mut record = stdout_entry.lock().await;
                        record.stdout_buf.push_str(&chunk);
                        record.last_output_at = Instant::now();
                        if !record.marker_seen {
                            if let Some(code) =
                                parse_marker_exit(&record.stdout_buf, &record.marker)
                            {
                                record.marker_seen = true;
                                record.marker_exit_code = Some(code);
                                // EOF on stdin lets the shell exit; trailing
                                // stderr is still drained before rendering.
                                record.stdin = None;
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let stderr_entry = entry.clone();
        let stderr_pump = tokio::spawn(async move {
            let mut reader = stderr;
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
                        let mut record = stderr_entry.lock().await;
                        record.stderr_buf.push_str(&chunk);
                        record.last_output_at = Instant::now();
                    }
                    Err(_) => break,
                }
            }
        });

        // Monitor: owns the shell. Completion latches only after the shell
        // exited and both pumps drained.
        let monitor_entry = entry.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let _ = stdout_pump.await;
            let _ = stderr_pump.await;

            let mut record = monitor_entry.lock().await;
            let os_code = match status {
                Ok(st) => st.code().unwrap_or(-1),
                Err(e) => {
                    log::error!("wait for shell {} failed: {}", record.id, e);
                    -1
                }
            };
            // The marker value is authoritative; the OS status only covers
            // spawn/EOF paths where the marker never surfaced.
            let exit_code = record.marker_exit_code.unwrap_or(os_code);
            let stdout = output::strip_marker(&record.stdout_buf, &record.marker);
            let rendering = output::render_completed(&stdout, &record.stderr_buf, exit_code);
            log::debug!("shell {} completed with exit code {}", record.id, exit_code);
            record.complete(exit_code, rendering);
        });

        // A zero budget means "background immediately": no wait loop runs,
        // so no race can deliver a synchronous result.
        if budget == 0 {
            let record = entry.lock().await;
            return backgrounded_snapshot(&record, "backgrounded immediately");
        }

        let mut ticker = tokio::time::interval(EXECUTE_POLL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let record = entry.lock().await;
            if record.status == ProcessStatus::Completed {
                return record
                    .final_rendering
                    .clone()
                    .unwrap_or_else(|| format!("Exit code: {}", record.exit_code.unwrap_or(-1)));
            }
            if record.last_output_at.elapsed() >= Duration::from_secs(budget) {
                let reason = format!("no output for {} seconds", budget);
                return backgrounded_snapshot(&record, &reason);
            }
            if record.started_at.elapsed() >= Duration::from_secs(ABSOLUTE_CAP_SECS) {
                return backgrounded_snapshot(&record, "maximum timeout reached");
            }
        }
    }

    /// Poll a record: cached rendering when completed, otherwise a bounded
    /// wait for progress.
    pub async fn check(&self, process_id: &str, rationale: Option<&str>) -> String {
        let Some(entry) = self.registry.get(process_id).await else {
            return "Error: Process not found".to_string();
        };

        log::info!(
            "check_process id={} rationale={}",
            process_id,
            rationale.unwrap_or("-")
        );

        // The inactivity clamp is mirrored here for consistency with
        // execute_command.
        let budget = {
            let record = entry.lock().await;
            record.inactivity_budget_secs.min(ABSOLUTE_CAP_SECS)
        };

        let poll_started = Instant::now();
        let mut ticker = tokio::time::interval(CHECK_POLL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            {
                let record = entry.lock().await;
                if record.status == ProcessStatus::Completed {
                    let cached = record.final_rendering.as_deref().unwrap_or("");
                    return output::render_completed_check(&record.id, &record.command, cached);
                }
                if record.last_output_at.elapsed() >= Duration::from_secs(budget) {
                    let reason = format!("no output for {} seconds", budget);
                    return running_snapshot(&record, &reason);
                }
                if poll_started.elapsed() >= Duration::from_secs(ABSOLUTE_CAP_SECS) {
                    return running_snapshot(&record, "maximum wait time reached");
                }
            }
            ticker.tick().await;
        }
    }

    /// Write to a running record's stdin.
    pub async fn send_input(&self, process_id: &str, input: &str, auto_newline: bool) -> String {
        let Some(entry) = self.registry.get(process_id).await else {
            return "Error: Process not found".to_string();
        };

        let mut record = entry.lock().await;
        if record.status == ProcessStatus::Completed {
            return "Error: Cannot send input to completed process".to_string();
        }
        let Some(stdin) = record.stdin.as_mut() else {
            return "Error: Process stdin not available".to_string();
        };

        let mut data = input.to_string();
        if auto_newline && !data.ends_with('\n') {
            data.push('\n');
        }

        let written = async {
            stdin.write_all(data.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        match written {
            Ok(()) => format!("Input sent to process {}", process_id),
            Err(e) => format!("Error: Failed to write to process stdin: {}", e),
        }
    }
}

fn backgrounded_snapshot(record: &ProcessRecord, reason: &str) -> String {
    let stdout = output::strip_marker(&record.stdout_buf, &record.marker);
    output::render_backgrounded(&record.id, &record.command, reason, &stdout, &record.stderr_buf)
}

fn running_snapshot(record: &ProcessRecord, reason: &str) -> String {
    let stdout = output::strip_marker(&record.stdout_buf, &record.marker);
    output::render_running(
        &record.id,
        &record.command,
        record.rationale.as_deref(),
        record.started_at.elapsed().as_secs(),
        reason,
        &stdout,
        &record.stderr_buf,
    )
}

/// Per-call sentinel token.
fn make_marker() -> String {
    const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("__TOOLGATE_DONE_{}__", suffix)
}

/// Append the sentinel trailer to the submitted command.
///
/// Three shapes: a command ending in `&` gets the trailer as the next list
/// element so `$?` reflects the fork; a command containing a here-document
/// opener gets a newline-separated trailer (a `;` inside the document body
/// would not terminate it); everything else is null-redirected and the
/// trailer follows on the same line. The redirect binds to the last simple
/// command only, so earlier commands in a pipeline or conjunction still read
/// the shell's stdin.
pub(crate) fn frame_command(command: &str, marker: &str) -> String {
    let trimmed = command.trim_end();
    let trailer = format!("echo \"{} EXIT_CODE:$?\"", marker);

    if trimmed.ends_with('&') {
        format!("{} {}", trimmed, trailer)
    } else if command.contains("<<") {
        format!("{}\n{}", command, trailer)
    } else {
        format!("{} < /dev/null; {}", trimmed, trailer)
    }
}

/// Extract the decimal exit code following the marker, once the trailer line
/// has fully arrived.
fn parse_marker_exit(stdout: &str, marker: &str) -> Option<i32> {
    let pos = stdout.find(marker)?;
    let after = &stdout[pos + marker.len()..];
    let tag_pos = after.find("EXIT_CODE:")?;
    let rest = &after[tag_pos + "EXIT_CODE:".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || rest.len() == digits.len() {
        // Trailer line not fully flushed yet; retry on the next chunk.
        return None;
    }
    digits.parse().ok()
}
