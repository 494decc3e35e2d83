//! Sandbox error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    /// Boot failed or the host cannot run a sandbox; permanent for the process
    #[error("Sandbox unavailable: {0}")]
    Unavailable(String),

    /// The command could not even be started
    #[error("Failed to spawn `{command}`: {reason}")]
    SpawnFailure { command: String, reason: String },

    #[error("Mount failed: {0}")]
    Mount(String),

    #[error("Path escapes the sandbox root: {0}")]
    InvalidPath(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
