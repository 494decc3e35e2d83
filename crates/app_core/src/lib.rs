//! Codebox Core
//!
//! This crate contains:
//! - Configuration
//! - Error types
//! - The workspace (explorer tree + sandbox)

pub mod config;
pub mod error;
pub mod workspace;

pub use config::{AppConfig, GeneralConfig, LoggingConfig};
pub use error::AppError;
pub use workspace::Workspace;

use app_sandbox::SandboxBooter;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Global workspace (for frontends that cannot thread a handle through)
static WORKSPACE: OnceCell<Workspace> = OnceCell::new();

/// Initialize the global workspace
pub fn init(config: AppConfig, booter: Arc<dyn SandboxBooter>) -> anyhow::Result<&'static Workspace> {
    let workspace = if config.general.seed_default_project {
        Workspace::with_default_project(config, booter)?
    } else {
        Workspace::new(config, booter)
    };

    WORKSPACE
        .set(workspace)
        .map_err(|_| anyhow::anyhow!("Workspace already initialized"))?;
    WORKSPACE
        .get()
        .ok_or_else(|| anyhow::anyhow!("Workspace missing after init"))
}

/// Get the global workspace
pub fn workspace() -> Option<&'static Workspace> {
    WORKSPACE.get()
}
