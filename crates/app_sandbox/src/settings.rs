//! Sandbox settings (the `[sandbox]` config section)

use crate::ProjectManifest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Directory backing the local sandbox; a fresh temp dir when unset
    pub root_dir: Option<PathBuf>,
    /// Package manager binary
    pub package_manager: String,
    /// Name the terminal uses for the interactive shell
    pub interactive_shell: String,
    /// Shells tried in order when the interactive shell cannot be spawned
    pub shell_fallbacks: Vec<String>,
    /// Root entries that do not count as project content
    pub ignored_entries: Vec<String>,
    /// Tracked process id used by `start_dev_server`
    pub dev_server_id: String,
    /// Manifest written when a project has none
    pub manifest: ProjectManifest,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            root_dir: None,
            package_manager: "npm".to_string(),
            interactive_shell: "jsh".to_string(),
            shell_fallbacks: vec!["bash".to_string(), "sh".to_string()],
            ignored_entries: vec![".jsh_history".to_string()],
            dev_server_id: "dev-server".to_string(),
            manifest: ProjectManifest::default(),
        }
    }
}
