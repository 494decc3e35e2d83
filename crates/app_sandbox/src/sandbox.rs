//! Sandbox abstraction
//!
//! A [`Sandbox`] is an isolated environment with its own filesystem that
//! can run commands. A [`SandboxBooter`] produces one; the bridge makes sure
//! that happens at most once.

use crate::{CapabilityReport, MountTree, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A piece of process output, delivered in arrival order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub data: String,
}

impl OutputChunk {
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            data: data.into(),
        }
    }

    pub fn stderr(data: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            data: data.into(),
        }
    }
}

/// Termination handle for a spawned process
pub trait ProcessControl: Send + Sync {
    /// Request termination; a no-op once the process has exited
    fn kill(&self);
}

/// Raw process as returned by [`Sandbox::spawn`]
///
/// `output` closes once both streams are drained; `exit` resolves after that.
pub struct SpawnedProcess {
    pub output: mpsc::UnboundedReceiver<OutputChunk>,
    pub exit: oneshot::Receiver<i32>,
    pub control: Arc<dyn ProcessControl>,
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Human-readable backend name
    fn backend_name(&self) -> &'static str;

    /// Overlay `tree` onto the sandbox root; existing files outside it are kept
    async fn mount(&self, tree: &MountTree) -> Result<()>;

    /// Entry names directly under `path` (`""` or `"/"` is the root)
    async fn read_dir(&self, path: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn read_file(&self, path: &str) -> Result<String>;

    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Start `command` with `args` in the sandbox root
    async fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess>;
}

#[async_trait]
pub trait SandboxBooter: Send + Sync {
    /// Host prerequisites; must be cheap and side-effect free
    fn capabilities(&self) -> CapabilityReport;

    async fn boot(&self) -> Result<Arc<dyn Sandbox>>;
}
