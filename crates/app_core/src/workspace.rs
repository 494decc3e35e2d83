//! Workspace: the explorer tree plus its sandbox
//!
//! This is what the editor and terminal talk to. Tree mutations are
//! synchronous under a write lock; anything touching the sandbox is async and
//! never holds the tree lock across an await.

use crate::{AppConfig, AppError};
use app_fs::{
    ClipboardEntry, FileInfo, Node, NodeKey, PasteOutcome, UploadedFile, VirtualTree,
};
use app_sandbox::{
    CapabilityReport, CommandOutput, MountTree, ProcessRunner, SandboxBooter, SandboxBridge,
    SandboxStatus,
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host directories never imported into the tree
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

pub struct Workspace {
    tree: RwLock<VirtualTree>,
    runner: Arc<ProcessRunner>,
    config: RwLock<AppConfig>,
    /// Fingerprint of the last successful mount
    last_mount: Mutex<Option<u64>>,
}

impl Workspace {
    /// Empty workspace
    pub fn new(config: AppConfig, booter: Arc<dyn SandboxBooter>) -> Self {
        let bridge = SandboxBridge::new(booter, config.sandbox.clone());
        Self {
            tree: RwLock::new(VirtualTree::with_options(config.explorer.clone())),
            runner: Arc::new(ProcessRunner::new(bridge)),
            config: RwLock::new(config),
            last_mount: Mutex::new(None),
        }
    }

    /// Workspace seeded with the starter project
    pub fn with_default_project(
        config: AppConfig,
        booter: Arc<dyn SandboxBooter>,
    ) -> Result<Self, AppError> {
        let project = MountTree::default_project(&config.sandbox.manifest)?;
        let workspace = Self::new(config, booter);

        {
            let mut tree = workspace.tree.write();
            for (path, body) in project.flatten() {
                match body {
                    Some(body) => tree.insert_file_at(&path, Some(body.to_string()))?,
                    None => tree.ensure_directory(&path)?,
                };
            }
        }

        tracing::info!("Workspace seeded with default project");
        Ok(workspace)
    }

    pub fn config(&self) -> RwLockReadGuard<'_, AppConfig> {
        self.config.read()
    }

    pub fn runner(&self) -> &Arc<ProcessRunner> {
        &self.runner
    }

    pub fn bridge(&self) -> &SandboxBridge {
        self.runner.bridge()
    }

    /// Read access to the tree (for rendering the explorer)
    pub fn tree(&self) -> RwLockReadGuard<'_, VirtualTree> {
        self.tree.read()
    }

    // ===== Explorer operations =====

    pub fn create_file(&self, parent: &NodeKey, name: &str) -> Result<NodeKey, AppError> {
        Ok(self.tree.write().create_file(parent, name)?)
    }

    pub fn create_directory(&self, parent: &NodeKey, name: &str) -> Result<NodeKey, AppError> {
        Ok(self.tree.write().create_directory(parent, name)?)
    }

    pub fn rename(&self, key: &NodeKey, new_name: &str) -> Result<NodeKey, AppError> {
        Ok(self.tree.write().rename(key, new_name)?)
    }

    pub fn delete(&self, key: &NodeKey) -> Result<Node, AppError> {
        Ok(self.tree.write().delete(key)?)
    }

    pub fn copy(&self, key: &NodeKey) -> Result<ClipboardEntry, AppError> {
        Ok(self.tree.write().copy_to_clipboard(key)?.clone())
    }

    pub fn cut(&self, key: &NodeKey) -> Result<ClipboardEntry, AppError> {
        Ok(self.tree.write().cut_to_clipboard(key)?.clone())
    }

    pub fn paste(&self, target: &NodeKey) -> Result<PasteOutcome, AppError> {
        Ok(self.tree.write().paste_from_clipboard(target)?)
    }

    // ===== Editor operations =====

    /// Name, path, type and body of a file (placeholder while loading)
    pub fn get_file_content_by_key(&self, key: &NodeKey) -> Result<FileInfo, AppError> {
        Ok(self.tree.read().file_info(key)?)
    }

    /// Store an explicit save from the editor
    pub fn save_file(&self, key: &NodeKey, content: &str) -> bool {
        match self.tree.write().write_content(key, content) {
            Ok(()) => {
                tracing::debug!("Saved {}", key);
                true
            }
            Err(e) => {
                tracing::warn!("Save failed for {}: {}", key, e);
                false
            }
        }
    }

    // ===== Import =====

    /// Fold uploaded files into the tree below `target`, then mount
    ///
    /// Files appear immediately with a loading placeholder; bodies are decoded
    /// on the blocking pool. Returns how many bodies landed.
    pub async fn import_files(
        &self,
        target: &NodeKey,
        files: Vec<UploadedFile>,
    ) -> Result<usize, AppError> {
        let staged = self.tree.write().stage_uploads(target, files)?;
        let hint = self.config.read().general.encoding_hint();

        let decoded = tokio::task::spawn_blocking(move || {
            staged
                .into_iter()
                .map(|upload| {
                    let text = upload.decode(hint);
                    (upload.read, text)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| AppError::Task(e.to_string()))?;

        let landed = {
            let mut tree = self.tree.write();
            decoded
                .into_iter()
                .map(|(read, text)| tree.resolve_read(read, text))
                .filter(|landed| *landed)
                .count()
        };

        tracing::info!("Imported {} files", landed);
        self.sync_to_sandbox().await;
        Ok(landed)
    }

    /// Import a host directory (skipping VCS and dependency folders)
    pub async fn import_directory(&self, dir: &Path) -> Result<usize, AppError> {
        let root = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || collect_host_files(&root))
            .await
            .map_err(|e| AppError::Task(e.to_string()))??;

        tracing::info!("Importing {} files from {}", files.len(), dir.display());
        self.import_files(&NodeKey::root(), files).await
    }

    // ===== Sandbox =====

    /// Mount the current tree; skipped when nothing changed since the last mount
    pub async fn sync_to_sandbox(&self) -> bool {
        let mount = MountTree::from_tree(&self.tree.read());
        let fingerprint = mount.fingerprint();

        if *self.last_mount.lock() == Some(fingerprint) {
            tracing::debug!("Tree unchanged, skipping mount");
            return true;
        }

        let mounted = self.bridge().mount(mount).await;
        if mounted {
            *self.last_mount.lock() = Some(fingerprint);
        }
        mounted
    }

    /// Sync, then run a command to completion
    pub async fn run(&self, command: &str, args: &[&str]) -> CommandOutput {
        if !self.sync_to_sandbox().await {
            tracing::warn!("Sync failed, {} runs against the last mounted files", command);
        }
        self.runner.run_to_completion(command, args).await
    }

    pub fn capability(&self) -> CapabilityReport {
        self.bridge().probe_capability()
    }

    pub fn status(&self) -> SandboxStatus {
        self.runner.status()
    }
}

fn collect_host_files(root: &Path) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                let name = entry.file_name();
                if SKIPPED_DIRS.iter().any(|skip| name == *skip) {
                    continue;
                }
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(UploadedFile::new(relative, std::fs::read(&path)?));
            }
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_sandbox::{LocalBooter, ProjectManifest};

    fn key(path: &str) -> NodeKey {
        NodeKey::encode(path)
    }

    fn local_workspace(dir: &Path) -> Workspace {
        let booter = Arc::new(LocalBooter::new(Some(dir.to_path_buf())));
        Workspace::new(AppConfig::default(), booter)
    }

    #[test]
    fn test_default_project_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let booter = Arc::new(LocalBooter::new(Some(dir.path().to_path_buf())));
        let workspace = Workspace::with_default_project(AppConfig::default(), booter).unwrap();

        let info = workspace.get_file_content_by_key(&key("package.json")).unwrap();
        let manifest: ProjectManifest = serde_json::from_str(&info.content).unwrap();
        assert_eq!(manifest.main, "index.js");
        assert_eq!(info.language, "json");

        let names: Vec<String> = workspace.tree().roots().iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names, vec!["README.md", "index.js", "package.json"]);
    }

    #[test]
    fn test_save_file() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(dir.path());
        let file = workspace.create_file(&NodeKey::root(), "a.txt").unwrap();

        assert!(workspace.save_file(&file, "hello"));
        assert_eq!(workspace.get_file_content_by_key(&file).unwrap().content, "hello");
        assert!(!workspace.save_file(&key("missing.txt"), "x"));
    }

    #[test]
    fn test_errors_surface_as_app_errors() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(dir.path());
        workspace.create_file(&NodeKey::root(), "a.txt").unwrap();

        assert!(matches!(
            workspace.create_file(&NodeKey::root(), "a.txt"),
            Err(AppError::DuplicateName(_))
        ));
        assert!(matches!(workspace.paste(&NodeKey::root()), Err(AppError::Clipboard(_))));
    }

    #[tokio::test]
    async fn test_import_and_sync() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(dir.path());

        let landed = workspace
            .import_files(
                &NodeKey::root(),
                vec![
                    UploadedFile::new("app/src/index.js", "console.log(1)"),
                    UploadedFile::new("app/README.md", "# app"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(landed, 2);

        let info = workspace.get_file_content_by_key(&key("app/src/index.js")).unwrap();
        assert!(info.loaded);
        assert_eq!(info.content, "console.log(1)");

        let on_disk = std::fs::read_to_string(dir.path().join("app/src/index.js")).unwrap();
        assert_eq!(on_disk, "console.log(1)");
        assert!(dir.path().join("package.json").is_file());
        assert!(workspace.status().initialized);
    }

    #[tokio::test]
    async fn test_import_directory() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("src")).unwrap();
        std::fs::create_dir_all(source.path().join("node_modules/dep")).unwrap();
        std::fs::write(source.path().join("src/main.js"), "main()").unwrap();
        std::fs::write(source.path().join("node_modules/dep/index.js"), "dep").unwrap();

        let sandbox_dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(sandbox_dir.path());

        assert_eq!(workspace.import_directory(source.path()).await.unwrap(), 1);
        assert!(workspace.tree().find("src/main.js").is_some());
        assert!(workspace.tree().find("node_modules").is_none());
    }

    #[tokio::test]
    async fn test_sync_skips_unchanged_tree() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(dir.path());
        let file = workspace.create_file(&NodeKey::root(), "a.txt").unwrap();

        assert!(workspace.sync_to_sandbox().await);
        std::fs::remove_file(dir.path().join("a.txt")).unwrap();

        // unchanged tree: no remount
        assert!(workspace.sync_to_sandbox().await);
        assert!(!dir.path().join("a.txt").exists());

        workspace.save_file(&file, "changed");
        assert!(workspace.sync_to_sandbox().await);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "changed");
    }

    #[tokio::test]
    async fn test_sync_after_file_becomes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(dir.path());
        let file = workspace.create_file(&NodeKey::root(), "a").unwrap();
        assert!(workspace.sync_to_sandbox().await);

        workspace.delete(&file).unwrap();
        let folder = workspace.create_directory(&NodeKey::root(), "a").unwrap();
        let inner = workspace.create_file(&folder, "b.txt").unwrap();
        workspace.save_file(&inner, "x");

        assert!(workspace.sync_to_sandbox().await);
        assert_eq!(std::fs::read_to_string(dir.path().join("a/b.txt")).unwrap(), "x");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_sees_tree_contents() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(dir.path());
        let file = workspace.create_file(&NodeKey::root(), "hello.txt").unwrap();
        workspace.save_file(&file, "from the tree");

        let output = workspace.run("cat", &["hello.txt"]).await;
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "from the tree");
    }

    #[tokio::test]
    async fn test_capability_probe_is_pure() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = local_workspace(dir.path());

        assert!(workspace.capability().supported);
        assert!(workspace.capability().reasons.worker_support);
        assert!(!workspace.status().initialized);
    }
}
