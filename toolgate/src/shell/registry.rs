//! Process record store.
//!
//! Every `execute_command` call creates a record that lives for the rest of
//! the server process; backgrounded shells stay pollable through it. A record
//! has its own lock so concurrent polls, pumps and input writes see a
//! consistent snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tokio::process::ChildStdin;
use tokio::sync::{oneshot, Mutex, RwLock};

/// Lifecycle state of a tracked shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Completed,
}

/// One tracked shell invocation.
#[derive(Debug)]
pub struct ProcessRecord {
    /// Opaque id, unique for the life of the server process.
    pub id: String,
    /// The original command string as submitted by the caller.
    pub command: String,
    /// Caller-supplied rationale, used for logging and renderings only.
    pub rationale: Option<String>,
    /// Per-call sentinel token delimiting command completion in stdout.
    pub marker: String,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    pub status: ProcessStatus,
    /// Live stdin handle while running; dropped to let the shell exit.
    pub stdin: Option<ChildStdin>,
    /// Everything the shell has emitted on stdout since start.
    pub stdout_buf: String,
    /// Everything the shell has emitted on stderr since start.
    pub stderr_buf: String,
    /// Updated on every non-empty chunk from either stream.
    pub last_output_at: Instant,
    /// Caller-supplied inactivity threshold, already clamped to [0, 600].
    pub inactivity_budget_secs: u64,
    /// Final exit code, set exactly once on completion.
    pub exit_code: Option<i32>,
    /// Exit code recovered from the sentinel marker, when observed.
    pub marker_exit_code: Option<i32>,
    /// Latched once the sentinel marker is seen in stdout.
    pub marker_seen: bool,
    /// Cached, pre-truncated rendering of the final outcome.
    pub final_rendering: Option<String>,
    /// Signal to the monitor task to kill the shell (shutdown drain).
    pub kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessRecord {
    pub fn new(
        id: String,
        command: String,
        rationale: Option<String>,
        marker: String,
        budget_secs: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            command,
            rationale,
            marker,
            started_at: now,
            ended_at: None,
            status: ProcessStatus::Running,
            stdin: None,
            stdout_buf: String::new(),
            stderr_buf: String::new(),
            last_output_at: now,
            inactivity_budget_secs: budget_secs,
            exit_code: None,
            marker_exit_code: None,
            marker_seen: false,
            final_rendering: None,
            kill_tx: None,
        }
    }

    /// Latch completion. A completed record never transitions back.
    pub fn complete(&mut self, exit_code: i32, final_rendering: String) {
        if self.status == ProcessStatus::Completed {
            log::debug!("ignoring duplicate completion for {}", self.id);
            return;
        }
        self.status = ProcessStatus::Completed;
        self.exit_code = Some(exit_code);
        self.ended_at = Some(Instant::now());
        self.final_rendering = Some(final_rendering);
        self.stdin = None;
        self.kill_tx = None;
    }
}

/// Shared store of process records keyed by id.
#[derive(Clone)]
pub struct ProcessRegistry {
    records: Arc<RwLock<HashMap<String, Arc<Mutex<ProcessRecord>>>>>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Generate a process id of the form `proc_<unix-millis>_<base36>`.
    pub fn generate_id() -> String {
        const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut rng = rand::thread_rng();
        let suffix: String = (0..8)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        format!("proc_{}_{}", millis, suffix)
    }

    pub async fn insert(&self, record: ProcessRecord) -> Arc<Mutex<ProcessRecord>> {
        let id = record.id.clone();
        let entry = Arc::new(Mutex::new(record));
        self.records.write().await.insert(id, Arc::clone(&entry));
        entry
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<ProcessRecord>>> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Signal every running shell to die. Used by process-wide shutdown; the
    /// per-record monitor tasks observe the signal and latch completion.
    pub async fn drain(&self) {
        let entries: Vec<Arc<Mutex<ProcessRecord>>> =
            self.records.read().await.values().cloned().collect();

        let mut signalled = 0usize;
        for entry in entries {
            let mut record = entry.lock().await;
            if record.status == ProcessStatus::Running {
                if let Some(kill_tx) = record.kill_tx.take() {
                    let _ = kill_tx.send(());
                    signalled += 1;
                }
            }
        }
        if signalled > 0 {
            log::info!("shutdown drain signalled {} running shell(s)", signalled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_id_format() {
        let re = Regex::new(r"^proc_\d+_[0-9a-z]{8}$").unwrap();
        let id = ProcessRegistry::generate_id();
        assert!(re.is_match(&id), "unexpected id: {}", id);
        assert_ne!(ProcessRegistry::generate_id(), id);
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let registry = ProcessRegistry::new();
        let id = ProcessRegistry::generate_id();
        registry
            .insert(ProcessRecord::new(id.clone(), "echo hi".into(), None, "__m__".into(), 20))
            .await;

        let entry = registry.get(&id).await.expect("record should exist");
        let record = entry.lock().await;
        assert_eq!(record.command, "echo hi");
        assert_eq!(record.status, ProcessStatus::Running);
        assert!(registry.get("proc_0_missing0").await.is_none());
    }

    #[tokio::test]
    async fn test_completion_latches() {
        let registry = ProcessRegistry::new();
        let id = ProcessRegistry::generate_id();
        let entry = registry
            .insert(ProcessRecord::new(id, "true".into(), None, "__m__".into(), 20))
            .await;

        let mut record = entry.lock().await;
        record.complete(0, "Exit code: 0".to_string());
        assert_eq!(record.status, ProcessStatus::Completed);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.ended_at.is_some());
        assert!(record.stdin.is_none());

        // A second completion must not overwrite the first.
        record.complete(1, "Exit code: 1".to_string());
        assert_eq!(record.exit_code, Some(0));
        assert_eq!(record.final_rendering.as_deref(), Some("Exit code: 0"));
    }
}
