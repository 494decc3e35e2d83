//! Codebox - project explorer with a sandboxed runtime
//!
//! Main entry point. Usage: `codebox [PROJECT_DIR]`

mod app;

use anyhow::Result;
use app_sandbox::LocalBooter;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging and panic hook first
    let _log_guard = app_log::init()?;

    tracing::info!("Codebox starting...");

    // Load configuration
    let mut config = app_core::AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load configuration: {}. Using defaults.", e);
        app_core::AppConfig::default()
    });

    if let Err(e) = app_log::cleanup_old_logs(config.logging.retention_days) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    let project = std::env::args_os().nth(1).map(PathBuf::from);
    if let Some(project) = &project {
        // an imported project replaces the starter files
        config.general.seed_default_project = false;
        config.push_recent_project(&project.to_string_lossy());
        if let Err(e) = config.save() {
            tracing::warn!("Failed to save configuration: {}", e);
        }
    }

    let booter = Arc::new(LocalBooter::new(config.sandbox.root_dir.clone()));
    let workspace = app_core::init(config, booter)?;

    app::run(workspace, project).await
}
