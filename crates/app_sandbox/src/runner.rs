//! Process/command runner
//!
//! Two ways to run something in the sandbox:
//! - one-shot commands, either streamed chunk by chunk ([`RunningProcess`])
//!   or collected into a [`CommandOutput`] once they exit
//! - tracked processes, registered under a caller-chosen id so they can be
//!   listed and stopped later; their output is published as [`ProcessEvent`]s

use crate::{
    OutputChunk, OutputStream, ProcessControl, Result, Sandbox, SandboxBridge, SandboxError,
    SpawnedProcess,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};

const EVENT_CAPACITY: usize = 1024;

/// Aggregate result of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Result reported when the command never ran
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: error.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A process in its streaming phase
///
/// Chunks read through [`next_chunk`](Self::next_chunk) are also kept, so
/// [`wait`](Self::wait) always returns the full output.
pub struct RunningProcess {
    command: String,
    output: mpsc::UnboundedReceiver<OutputChunk>,
    exit: oneshot::Receiver<i32>,
    control: Arc<dyn ProcessControl>,
    stdout: String,
    stderr: String,
}

impl RunningProcess {
    fn new(command: &str, spawned: SpawnedProcess) -> Self {
        Self {
            command: command.to_string(),
            output: spawned.output,
            exit: spawned.exit,
            control: spawned.control,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Next output chunk, or `None` once both streams are closed
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        let chunk = self.output.recv().await?;
        match chunk.stream {
            OutputStream::Stdout => self.stdout.push_str(&chunk.data),
            OutputStream::Stderr => self.stderr.push_str(&chunk.data),
        }
        Some(chunk)
    }

    pub fn kill(&self) {
        self.control.kill();
    }

    /// Drain the remaining output and wait for exit
    pub async fn wait(mut self) -> CommandOutput {
        while self.next_chunk().await.is_some() {}

        let exit_code = match self.exit.await {
            Ok(code) => code,
            Err(_) => {
                tracing::warn!("{} vanished without an exit code", self.command);
                -1
            }
        };

        CommandOutput {
            exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Live output of tracked processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProcessEvent {
    Output { id: String, run: u64, chunk: OutputChunk },
    #[serde(rename_all = "camelCase")]
    Exited { id: String, run: u64, exit_code: i32 },
}

impl ProcessEvent {
    pub fn id(&self) -> &str {
        match self {
            ProcessEvent::Output { id, .. } | ProcessEvent::Exited { id, .. } => id,
        }
    }

    /// Distinguishes successive processes registered under the same id
    pub fn run(&self) -> u64 {
        match self {
            ProcessEvent::Output { run, .. } | ProcessEvent::Exited { run, .. } => *run,
        }
    }
}

/// Snapshot of a tracked process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProcessInfo {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Set once the process has exited
    pub exit_code: Option<i32>,
}

struct TrackedEntry {
    run: u64,
    command: String,
    args: Vec<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    control: Arc<dyn ProcessControl>,
    exit_code: Arc<Mutex<Option<i32>>>,
}

/// Caller's view of one tracked process
pub struct ProcessHandle {
    id: String,
    run: u64,
    events: broadcast::Receiver<ProcessEvent>,
}

impl ProcessHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event of this process; `None` after its exit event
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.id() == self.id && event.run() == self.run => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Process {} listener lagged, {} events dropped", self.id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Follow the process until it exits, returning its exit code
    pub async fn wait(mut self) -> Option<i32> {
        while let Some(event) = self.next_event().await {
            if let ProcessEvent::Exited { exit_code, .. } = event {
                return Some(exit_code);
            }
        }
        None
    }
}

fn owned_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

pub struct ProcessRunner {
    bridge: SandboxBridge,
    tracked: DashMap<String, TrackedEntry>,
    events: broadcast::Sender<ProcessEvent>,
    next_run: AtomicU64,
}

impl ProcessRunner {
    pub fn new(bridge: SandboxBridge) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bridge,
            tracked: DashMap::new(),
            events,
            next_run: AtomicU64::new(1),
        }
    }

    pub fn bridge(&self) -> &SandboxBridge {
        &self.bridge
    }

    async fn sandbox(&self) -> Result<Arc<dyn Sandbox>> {
        self.bridge.boot().await.ok_or_else(|| {
            SandboxError::Unavailable(
                self.bridge
                    .last_error()
                    .unwrap_or_else(|| "sandbox is not available".to_string()),
            )
        })
    }

    /// Spawn, falling back through the configured shells for the
    /// interactive shell name
    async fn spawn_raw(&self, command: &str, args: &[String]) -> Result<SpawnedProcess> {
        let sandbox = self.sandbox().await?;
        let settings = self.bridge.settings();
        if command != settings.interactive_shell {
            return sandbox.spawn(command, args).await;
        }

        let candidates = std::iter::once(command).chain(settings.shell_fallbacks.iter().map(String::as_str));
        let mut last_error = None;
        for shell in candidates {
            match sandbox.spawn(shell, args).await {
                Ok(process) => {
                    if shell != command {
                        tracing::info!("{} unavailable, using {}", command, shell);
                    }
                    return Ok(process);
                }
                Err(e @ SandboxError::SpawnFailure { .. }) => {
                    tracing::warn!("{}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| SandboxError::SpawnFailure {
            command: command.to_string(),
            reason: "no shell available".to_string(),
        }))
    }

    /// Start a command and stream its output
    pub async fn spawn(&self, command: &str, args: &[&str]) -> Result<RunningProcess> {
        let spawned = self.spawn_raw(command, &owned_args(args)).await?;
        Ok(RunningProcess::new(command, spawned))
    }

    /// Run a command to exit
    ///
    /// A nonzero exit is data, not an error; only boot and spawn failures are.
    pub async fn try_run(&self, command: &str, args: &[&str]) -> Result<CommandOutput> {
        Ok(self.spawn(command, args).await?.wait().await)
    }

    /// Like [`try_run`](Self::try_run), but reports failures as exit code -1
    /// with the error message on stderr
    pub async fn run_to_completion(&self, command: &str, args: &[&str]) -> CommandOutput {
        match self.try_run(command, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Command failed ({} {}): {}", command, args.join(" "), e);
                CommandOutput::failed(e)
            }
        }
    }

    /// Start a long-running process under `id`, stopping any previous one
    pub async fn start_tracked(&self, id: &str, command: &str, args: &[&str]) -> Result<ProcessHandle> {
        if self.stop_tracked(id) {
            tracing::info!("Replacing tracked process {}", id);
        }

        let args = owned_args(args);
        let spawned = self.spawn_raw(command, &args).await?;
        let run = self.next_run.fetch_add(1, Ordering::SeqCst);
        let handle = ProcessHandle {
            id: id.to_string(),
            run,
            events: self.events.subscribe(),
        };

        let SpawnedProcess {
            mut output,
            exit,
            control,
        } = spawned;
        let exit_code = Arc::new(Mutex::new(None));

        self.tracked.insert(
            id.to_string(),
            TrackedEntry {
                run,
                command: command.to_string(),
                args,
                started_at: Utc::now(),
                started: Instant::now(),
                control,
                exit_code: exit_code.clone(),
            },
        );

        let events = self.events.clone();
        let id = id.to_string();
        tracing::info!("Started tracked process {} ({})", id, command);

        tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                let _ = events.send(ProcessEvent::Output {
                    id: id.clone(),
                    run,
                    chunk,
                });
            }

            let code = exit.await.unwrap_or(-1);
            *exit_code.lock() = Some(code);
            tracing::info!("Tracked process {} exited with {}", id, code);
            let _ = events.send(ProcessEvent::Exited {
                id,
                run,
                exit_code: code,
            });
        });

        Ok(handle)
    }

    /// Terminate and forget a tracked process; false if `id` is unknown
    pub fn stop_tracked(&self, id: &str) -> bool {
        match self.tracked.remove(id) {
            Some((_, entry)) => {
                tracing::info!("Stopping tracked process {} (run {})", id, entry.run);
                entry.control.kill();
                true
            }
            None => false,
        }
    }

    /// Stop every tracked process; returns how many were stopped
    pub fn stop_all(&self) -> usize {
        let ids: Vec<String> = self.tracked.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.stop_tracked(id)).count()
    }

    pub fn list_tracked(&self) -> Vec<TrackedProcessInfo> {
        let mut list: Vec<TrackedProcessInfo> = self
            .tracked
            .iter()
            .map(|entry| TrackedProcessInfo {
                id: entry.key().clone(),
                command: entry.command.clone(),
                args: entry.args.clone(),
                started_at: entry.started_at,
                elapsed_ms: entry.started.elapsed().as_millis() as u64,
                exit_code: *entry.exit_code.lock(),
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn process_count(&self) -> usize {
        self.tracked.len()
    }

    /// Events of every tracked process
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::FakeBooter;
    use crate::SandboxSettings;

    fn runner_with(booter: FakeBooter, settings: SandboxSettings) -> ProcessRunner {
        ProcessRunner::new(SandboxBridge::new(Arc::new(booter), settings))
    }

    #[tokio::test]
    async fn test_run_to_completion() {
        let runner = runner_with(FakeBooter::working(), SandboxSettings::default());
        let output = runner.run_to_completion("echo", &["hi"]).await;

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "hi\n");
        assert!(output.stderr.is_empty());
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_unavailable_sandbox_reports_exit_minus_one() {
        let runner = runner_with(FakeBooter::failing(), SandboxSettings::default());
        let output = runner.run_to_completion("echo", &["hi"]).await;

        assert_eq!(output.exit_code, -1);
        assert_eq!(output.stdout, "");
        assert!(!output.stderr.is_empty());

        assert!(matches!(
            runner.try_run("echo", &["hi"]).await,
            Err(SandboxError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_distinct_from_exit_code() {
        let runner = runner_with(FakeBooter::working(), SandboxSettings::default());
        assert!(matches!(
            runner.try_run("node", &["index.js"]).await,
            Err(SandboxError::SpawnFailure { .. })
        ));

        let output = runner.run_to_completion("node", &["index.js"]).await;
        assert_eq!(output.exit_code, -1);
        assert!(output.stderr.contains("node"));
    }

    #[tokio::test]
    async fn test_streaming_then_completion() {
        let runner = runner_with(FakeBooter::working(), SandboxSettings::default());
        let mut process = runner.spawn("echo", &["a", "b"]).await.unwrap();

        let chunk = process.next_chunk().await.unwrap();
        assert_eq!(chunk, OutputChunk::stdout("a b\n"));

        // chunks already read still count toward the aggregate
        let output = process.wait().await;
        assert_eq!(output.stdout, "a b\n");
        assert_eq!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_interactive_shell_fallback() {
        let settings = SandboxSettings {
            shell_fallbacks: vec!["bash".to_string(), "echo".to_string()],
            ..SandboxSettings::default()
        };
        let runner = runner_with(FakeBooter::working(), settings);

        let output = runner.try_run("jsh", &["ready"]).await.unwrap();
        assert_eq!(output.stdout, "ready\n");
    }

    #[tokio::test]
    async fn test_interactive_shell_exhausted() {
        let runner = runner_with(FakeBooter::working(), SandboxSettings::default());
        assert!(matches!(
            runner.spawn("jsh", &[]).await,
            Err(SandboxError::SpawnFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_tracked_lifecycle() {
        let runner = runner_with(FakeBooter::working(), SandboxSettings::default());

        let mut handle = runner.start_tracked("greet", "echo", &["hello"]).await.unwrap();
        assert_eq!(handle.id(), "greet");

        match handle.next_event().await.unwrap() {
            ProcessEvent::Output { chunk, .. } => assert_eq!(chunk.data, "hello\n"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(handle.wait().await, Some(0));

        let listing = runner.list_tracked();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].command, "echo");
        assert_eq!(listing[0].args, vec!["hello"]);
        assert_eq!(listing[0].exit_code, Some(0));

        assert!(runner.stop_tracked("greet"));
        assert!(!runner.stop_tracked("greet"));
        assert_eq!(runner.process_count(), 0);
    }

    #[tokio::test]
    async fn test_tracked_id_reuse_replaces() {
        let runner = runner_with(FakeBooter::working(), SandboxSettings::default());

        let first = runner.start_tracked("job", "echo", &["one"]).await.unwrap();
        let second = runner.start_tracked("job", "echo", &["two"]).await.unwrap();

        assert_eq!(runner.process_count(), 1);
        assert_eq!(runner.list_tracked()[0].args, vec!["two"]);
        assert_ne!(first.run, second.run);
        assert_eq!(second.wait().await, Some(0));
    }

    #[tokio::test]
    async fn test_tracked_start_on_unavailable_sandbox() {
        let runner = runner_with(FakeBooter::failing(), SandboxSettings::default());
        assert!(runner.start_tracked("x", "echo", &[]).await.is_err());
        assert_eq!(runner.process_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_local_process() {
        let dir = tempfile::tempdir().unwrap();
        let booter = crate::LocalBooter::new(Some(dir.path().to_path_buf()));
        let runner = ProcessRunner::new(SandboxBridge::new(Arc::new(booter), SandboxSettings::default()));

        let handle = runner.start_tracked("sleeper", "sleep", &["30"]).await.unwrap();
        assert_eq!(runner.list_tracked()[0].exit_code, None);

        assert!(runner.stop_tracked("sleeper"));
        let code = handle.wait().await.unwrap();
        assert_ne!(code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_shell_script_with_children() {
        let dir = tempfile::tempdir().unwrap();
        let booter = crate::LocalBooter::new(Some(dir.path().to_path_buf()));
        let runner = ProcessRunner::new(SandboxBridge::new(Arc::new(booter), SandboxSettings::default()));

        let handle = runner
            .start_tracked("dev", "sh", &["-c", "sleep 20; echo done"])
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(runner.stop_tracked("dev"));

        let code = tokio::time::timeout(std::time::Duration::from_secs(3), handle.wait())
            .await
            .expect("exit event after stop");
        assert!(matches!(code, Some(code) if code != 0));
    }
}
