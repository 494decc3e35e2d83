//! Directory-backed sandbox
//!
//! Runs commands as child processes confined (by working directory) to a
//! dedicated root directory. Paths handed in are always relative to that
//! root and may not climb out of it.

use crate::{
    probe_capability, CapabilityReport, MountTree, OutputChunk, ProcessControl, Result, Sandbox,
    SandboxBooter, SandboxError, SpawnedProcess,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// How long stream readers may lag behind process exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct LocalSandbox {
    root: PathBuf,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a sandbox path onto the host, rejecting `..`
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for segment in path.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return Err(SandboxError::InvalidPath(path.to_string())),
                name => resolved.push(name),
            }
        }
        Ok(resolved)
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

/// Incremental UTF-8 decoding of a byte stream
///
/// A character split across two reads is held back until it is complete.
struct Utf8Stream {
    decoder: encoding_rs::Decoder,
}

impl Utf8Stream {
    fn new() -> Self {
        Self {
            decoder: encoding_rs::UTF_8.new_decoder_without_bom_handling(),
        }
    }

    /// Decode the next bytes; `last` flushes an incomplete tail as U+FFFD
    fn decode(&mut self, bytes: &[u8], last: bool) -> String {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 4);
        let mut text = String::with_capacity(capacity);
        let _ = self.decoder.decode_to_string(bytes, &mut text, last);
        text
    }
}

/// Make sure `target` is not occupied by an entry of the other kind
async fn clear_conflicting(target: &Path, want_dir: bool) -> std::io::Result<()> {
    let Ok(meta) = tokio::fs::symlink_metadata(target).await else {
        return Ok(());
    };

    if want_dir && !meta.is_dir() {
        tracing::debug!("Replacing file {} with a directory", target.display());
        tokio::fs::remove_file(target).await
    } else if !want_dir && meta.is_dir() {
        tracing::debug!("Replacing directory {} with a file", target.display());
        tokio::fs::remove_dir_all(target).await
    } else {
        Ok(())
    }
}

/// Kill the child and every process it forked
fn kill_tree(child: &mut tokio::process::Child, pid: Option<u32>, label: &str) {
    #[cfg(unix)]
    if let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        // the child leads its own group; a negative pid signals all of it
        if unsafe { libc::kill(-pid, libc::SIGKILL) } == 0 {
            return;
        }
        tracing::debug!(
            "Group kill failed for {}: {}",
            label,
            std::io::Error::last_os_error()
        );
    }

    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.start_kill() {
        tracing::warn!("Kill failed for {}: {}", label, e);
    }
}

/// Forward one stream into the shared output channel
fn pump<R>(
    mut reader: R,
    wrap: fn(String) -> OutputChunk,
    tx: mpsc::UnboundedSender<OutputChunk>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut text = Utf8Stream::new();
        loop {
            let (data, done) = match reader.read(&mut buf).await {
                Ok(0) => (text.decode(&[], true), true),
                Ok(n) => (text.decode(&buf[..n], false), false),
                Err(e) => {
                    tracing::warn!("Process stream read failed: {}", e);
                    (text.decode(&[], true), true)
                }
            };
            if !data.is_empty() && tx.send(wrap(data)).is_err() {
                break;
            }
            if done {
                break;
            }
        }
    })
}

struct LocalControl {
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ProcessControl for LocalControl {
    fn kill(&self) {
        if let Some(tx) = self.kill_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn mount(&self, tree: &MountTree) -> Result<()> {
        for (path, contents) in tree.flatten() {
            let target = self.resolve(&path)?;
            // mounted entries win over whatever the sandbox had at their path
            let written = match contents {
                None => match clear_conflicting(&target, true).await {
                    Ok(()) => tokio::fs::create_dir_all(&target).await,
                    Err(e) => Err(e),
                },
                Some(body) => match clear_conflicting(&target, false).await {
                    Ok(()) => tokio::fs::write(&target, body).await,
                    Err(e) => Err(e),
                },
            };
            written.map_err(|e| SandboxError::Mount(format!("{}: {}", path, e)))?;
        }

        tracing::debug!("Mounted {} files into {}", tree.file_count(), self.root.display());
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(&target).await?)
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // own process group, so a kill reaches everything the command forks
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| SandboxError::SpawnFailure {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        tracing::debug!("Spawned {} {:?} (pid {:?})", command, args, pid);

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let readers: Vec<_> = [
            child.stdout.take().map(|s| pump(s, |data| OutputChunk::stdout(data), out_tx.clone())),
            child.stderr.take().map(|s| pump(s, |data| OutputChunk::stderr(data), out_tx.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();
        drop(out_tx);

        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let label = command.to_string();

        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                Ok(()) = kill_rx => None,
            };

            let status = match finished {
                Some(status) => status,
                None => {
                    tracing::info!("Killing {}", label);
                    kill_tree(&mut child, pid, &label);
                    child.wait().await
                }
            };

            // all output is delivered before the exit code, unless a leftover
            // descendant holds the pipes open
            for mut reader in readers {
                if tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await.is_err() {
                    tracing::warn!("Output of {} still open after exit, detaching", label);
                    reader.abort();
                }
            }

            let code = match status {
                Ok(status) => exit_code_of(status),
                Err(e) => {
                    tracing::warn!("Waiting on {} failed: {}", label, e);
                    -1
                }
            };
            tracing::debug!("{} exited with {}", label, code);
            let _ = exit_tx.send(code);
        });

        Ok(SpawnedProcess {
            output: out_rx,
            exit: exit_rx,
            control: Arc::new(LocalControl {
                kill_tx: Mutex::new(Some(kill_tx)),
            }),
        })
    }
}

/// Boots a [`LocalSandbox`] rooted at the configured directory, or at a
/// fresh directory under the system temp dir
pub struct LocalBooter {
    root: Option<PathBuf>,
}

impl LocalBooter {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl SandboxBooter for LocalBooter {
    fn capabilities(&self) -> CapabilityReport {
        probe_capability(self.root.as_deref())
    }

    async fn boot(&self) -> Result<Arc<dyn Sandbox>> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => std::env::temp_dir().join(format!("codebox-{}", uuid::Uuid::new_v4())),
        };

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SandboxError::Unavailable(format!("{}: {}", root.display(), e)))?;

        tracing::info!("Local sandbox root: {}", root.display());
        Ok(Arc::new(LocalSandbox::new(root)))
    }
}
