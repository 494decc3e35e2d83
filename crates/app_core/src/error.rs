//! Application error types

use app_fs::FsError;
use app_sandbox::SandboxError;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Recoverable Errors (notify user, continue) =====
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Name already taken: {0}")]
    DuplicateName(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("Could not start command: {0}")]
    SpawnFailure(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Background task failed: {0}")]
    Task(String),

    // ===== Fatal Errors (application termination) =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Init(String),
}

impl AppError {
    /// Is this error recoverable?
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Config(_) | AppError::Init(_))
    }

    /// Is this a fatal error?
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(what) => format!("{} no longer exists", what),
            AppError::DuplicateName(name) => format!("\"{}\" already exists in this folder", name),
            AppError::SandboxUnavailable(_) => {
                "The sandbox is not available. Files are edited locally only.".to_string()
            }
            AppError::SpawnFailure(msg) => format!("Could not start command: {}", msg),
            _ => self.to_string(),
        }
    }
}

impl From<FsError> for AppError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(what) => AppError::NotFound(what),
            FsError::DuplicateName(name) => AppError::DuplicateName(name),
            FsError::EmptyClipboard | FsError::SelfPaste | FsError::PasteIntoDescendant => {
                AppError::Clipboard(e.to_string())
            }
            FsError::EmptyName | FsError::InvalidName(_) | FsError::InvalidKey(_) => {
                AppError::InvalidInput(e.to_string())
            }
        }
    }
}

impl From<SandboxError> for AppError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Unavailable(reason) => AppError::SandboxUnavailable(reason),
            SandboxError::SpawnFailure { .. } => AppError::SpawnFailure(e.to_string()),
            SandboxError::Io(io) => AppError::Io(io),
            _ => AppError::Sandbox(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_errors_are_recoverable() {
        let err: AppError = FsError::PasteIntoDescendant.into();
        assert!(matches!(err, AppError::Clipboard(_)));
        assert!(err.is_recoverable());

        let err: AppError = FsError::DuplicateName("a.txt".into()).into();
        assert_eq!(err.user_message(), "\"a.txt\" already exists in this folder");
    }

    #[test]
    fn test_sandbox_errors() {
        let err: AppError = SandboxError::SpawnFailure {
            command: "node".into(),
            reason: "not found".into(),
        }
        .into();
        assert!(matches!(err, AppError::SpawnFailure(_)));

        let err: AppError = SandboxError::Unavailable("boot refused".into()).into();
        assert!(!err.is_fatal());
        assert!(AppError::Init("x".into()).is_fatal());
    }
}
