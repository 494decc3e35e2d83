//! Sandbox mount bridge
//!
//! Owns the sandbox lifecycle: a lazy, race-safe boot that happens at most
//! once, and mounting the explorer tree into the booted sandbox. Boot
//! failure is permanent for the lifetime of the bridge; callers fall back to
//! a non-sandboxed mode instead of retrying.

use crate::{CapabilityReport, MountTree, Sandbox, SandboxBooter, SandboxSettings, MANIFEST_FILE};
use app_fs::VirtualTree;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type BootFuture = Shared<BoxFuture<'static, Option<Arc<dyn Sandbox>>>>;

enum BootState {
    Idle,
    /// Every concurrent caller awaits this same future
    Booting(BootFuture),
    Ready {
        sandbox: Arc<dyn Sandbox>,
        booted_at: DateTime<Utc>,
    },
    Unsupported,
}

struct BridgeInner {
    state: Mutex<BootState>,
    booter: Arc<dyn SandboxBooter>,
    settings: SandboxSettings,
    boot_attempts: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl BridgeInner {
    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    fn mark_unsupported(&self, reason: String) {
        tracing::warn!("Sandbox disabled: {}", reason);
        self.record_error(reason);
        *self.state.lock() = BootState::Unsupported;
    }
}

/// Handle to the sandbox lifecycle; cheap to clone
#[derive(Clone)]
pub struct SandboxBridge {
    inner: Arc<BridgeInner>,
}

impl SandboxBridge {
    pub fn new(booter: Arc<dyn SandboxBooter>, settings: SandboxSettings) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                state: Mutex::new(BootState::Idle),
                booter,
                settings,
                boot_attempts: AtomicUsize::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.inner.settings
    }

    /// Boot the sandbox if needed and return it
    ///
    /// `None` means the sandbox is unavailable for good.
    pub async fn boot(&self) -> Option<Arc<dyn Sandbox>> {
        let pending = {
            let mut state = self.inner.state.lock();
            match &*state {
                BootState::Unsupported => return None,
                BootState::Ready { sandbox, .. } => return Some(sandbox.clone()),
                BootState::Booting(pending) => pending.clone(),
                BootState::Idle => {
                    let pending = Self::boot_once(self.inner.clone()).boxed().shared();
                    *state = BootState::Booting(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    async fn boot_once(inner: Arc<BridgeInner>) -> Option<Arc<dyn Sandbox>> {
        let report = inner.booter.capabilities();
        if !report.supported {
            inner.mark_unsupported(format!(
                "host not supported (secure context: {}, worker support: {})",
                report.reasons.secure_context, report.reasons.worker_support
            ));
            return None;
        }

        let attempt = inner.boot_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Booting sandbox (attempt {})", attempt);

        let sandbox = match inner.booter.boot().await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                tracing::error!("Sandbox boot failed: {}", e);
                inner.mark_unsupported(e.to_string());
                return None;
            }
        };

        Self::setup_default_workspace(&inner, sandbox.as_ref()).await;

        *inner.state.lock() = BootState::Ready {
            sandbox: sandbox.clone(),
            booted_at: Utc::now(),
        };
        tracing::info!("Sandbox ready ({})", sandbox.backend_name());
        Some(sandbox)
    }

    /// Mount the starter project when the sandbox root holds nothing yet
    async fn setup_default_workspace(inner: &BridgeInner, sandbox: &dyn Sandbox) {
        match sandbox.read_dir("/").await {
            Ok(entries) => {
                let has_content = entries
                    .iter()
                    .any(|name| !inner.settings.ignored_entries.contains(name));
                if has_content {
                    tracing::info!("Using existing sandbox content as workspace");
                    return;
                }
            }
            Err(e) => tracing::warn!("Reading sandbox root failed, mounting default project: {}", e),
        }

        let mounted = match MountTree::default_project(&inner.settings.manifest) {
            Ok(project) => sandbox.mount(&project).await,
            Err(e) => Err(e),
        };
        if let Err(e) = mounted {
            tracing::warn!("Default project mount failed: {}", e);
            inner.record_error(e.to_string());
        }
    }

    /// Host prerequisites as reported by the booter; never boots
    pub fn probe_capability(&self) -> CapabilityReport {
        self.inner.booter.capabilities()
    }

    /// The booted sandbox, without triggering a boot
    pub fn sandbox(&self) -> Option<Arc<dyn Sandbox>> {
        match &*self.inner.state.lock() {
            BootState::Ready { sandbox, .. } => Some(sandbox.clone()),
            _ => None,
        }
    }

    /// False once a boot has failed or the host was found unsupported
    pub fn is_supported(&self) -> bool {
        !matches!(*self.inner.state.lock(), BootState::Unsupported)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.inner.state.lock(), BootState::Ready { .. })
    }

    pub fn is_booting(&self) -> bool {
        matches!(*self.inner.state.lock(), BootState::Booting(_))
    }

    pub fn booted_at(&self) -> Option<DateTime<Utc>> {
        match &*self.inner.state.lock() {
            BootState::Ready { booted_at, .. } => Some(*booted_at),
            _ => None,
        }
    }

    /// Number of times the booter was actually invoked
    pub fn boot_attempts(&self) -> usize {
        self.inner.boot_attempts.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// Mount the explorer tree
    pub async fn mount_tree(&self, tree: &VirtualTree) -> bool {
        self.mount(MountTree::from_tree(tree)).await
    }

    /// Mount a flat `(path, contents)` list
    pub async fn mount_files<P, C>(&self, files: &[(P, C)]) -> bool
    where
        P: AsRef<str>,
        C: AsRef<str>,
    {
        let mount = MountTree::from_files(
            files
                .iter()
                .map(|(path, contents)| (path.as_ref(), contents.as_ref())),
        );
        self.mount(mount).await
    }

    /// Overlay `mount` onto the sandbox, making sure a manifest exists
    ///
    /// Returns false if the sandbox is unavailable or the mount failed.
    pub async fn mount(&self, mut mount: MountTree) -> bool {
        let Some(sandbox) = self.boot().await else {
            tracing::warn!("Sandbox unavailable, skipping mount");
            return false;
        };

        // an existing manifest in the sandbox wins
        let manifest = &self.inner.settings.manifest;
        let sandbox_has_manifest = matches!(sandbox.exists(MANIFEST_FILE).await, Ok(true));
        if !sandbox_has_manifest {
            if let Err(e) = mount.ensure_manifest(manifest) {
                self.inner.record_error(e.to_string());
                return false;
            }
        }

        if let Err(e) = sandbox.mount(&mount).await {
            tracing::error!("Mount failed: {}", e);
            self.inner.record_error(e.to_string());
            return false;
        }
        tracing::info!("Mounted {} files into sandbox", mount.file_count());

        // verify the manifest landed
        match sandbox.exists(MANIFEST_FILE).await {
            Ok(true) => true,
            _ => {
                let written = match manifest.to_json() {
                    Ok(json) => sandbox.write_file(MANIFEST_FILE, &json).await,
                    Err(e) => Err(e),
                };
                match written {
                    Ok(()) => {
                        tracing::info!("Wrote default {}", MANIFEST_FILE);
                        true
                    }
                    Err(e) => {
                        tracing::error!("Writing {} failed: {}", MANIFEST_FILE, e);
                        self.inner.record_error(e.to_string());
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{OutputChunk, ProcessControl, Result, SandboxError, SpawnedProcess};
    use app_fs::NodeKey;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    struct NoopControl;

    impl ProcessControl for NoopControl {
        fn kill(&self) {}
    }

    /// In-memory sandbox; `echo` prints its args, anything else fails to spawn
    #[derive(Default)]
    pub(crate) struct FakeSandbox {
        pub files: Mutex<MountTree>,
        pub mounts: AtomicUsize,
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        fn backend_name(&self) -> &'static str {
            "fake"
        }

        async fn mount(&self, tree: &MountTree) -> Result<()> {
            self.mounts.fetch_add(1, Ordering::SeqCst);
            self.files.lock().overlay(tree.clone());
            Ok(())
        }

        async fn read_dir(&self, _path: &str) -> Result<Vec<String>> {
            Ok(self.files.lock().entries().map(|(name, _)| name.to_string()).collect())
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            Ok(self.files.lock().lookup(path).is_some())
        }

        async fn read_file(&self, path: &str) -> Result<String> {
            match self.files.lock().lookup(path) {
                Some(crate::MountEntry::File { contents }) => Ok(contents.clone()),
                _ => Err(SandboxError::Io(std::io::ErrorKind::NotFound.into())),
            }
        }

        async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
            self.files.lock().insert_file(path, contents);
            Ok(())
        }

        async fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess> {
            if command != "echo" {
                return Err(SandboxError::SpawnFailure {
                    command: command.to_string(),
                    reason: "not found".to_string(),
                });
            }

            let (out_tx, output) = mpsc::unbounded_channel();
            let (exit_tx, exit) = oneshot::channel();
            let _ = out_tx.send(OutputChunk::stdout(format!("{}\n", args.join(" "))));
            let _ = exit_tx.send(0);

            Ok(SpawnedProcess {
                output,
                exit,
                control: Arc::new(NoopControl),
            })
        }
    }

    /// Booter that counts attempts and can be told to fail
    pub(crate) struct FakeBooter {
        pub attempts: AtomicUsize,
        pub fail: bool,
        pub supported: bool,
        pub sandbox: Arc<FakeSandbox>,
    }

    impl FakeBooter {
        pub fn working() -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                fail: false,
                supported: true,
                sandbox: Arc::new(FakeSandbox::default()),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::working()
            }
        }
    }

    #[async_trait]
    impl SandboxBooter for FakeBooter {
        fn capabilities(&self) -> CapabilityReport {
            CapabilityReport::new(self.supported, true)
        }

        async fn boot(&self) -> Result<Arc<dyn Sandbox>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            // give concurrent callers time to pile up
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(SandboxError::Unavailable("boot refused".to_string()));
            }
            Ok(self.sandbox.clone())
        }
    }

    fn bridge_with(booter: &Arc<FakeBooter>) -> SandboxBridge {
        SandboxBridge::new(booter.clone(), SandboxSettings::default())
    }

    #[tokio::test]
    async fn test_concurrent_boot_single_attempt() {
        let booter = Arc::new(FakeBooter::working());
        let bridge = bridge_with(&booter);

        let results = futures::future::join_all((0..8).map(|_| {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.boot().await.is_some() })
        }))
        .await;

        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(booter.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.boot_attempts(), 1);
        assert!(bridge.is_initialized());
        assert!(bridge.booted_at().is_some());

        bridge.boot().await.unwrap();
        assert_eq!(booter.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_boot_is_permanent() {
        let booter = Arc::new(FakeBooter::failing());
        let bridge = bridge_with(&booter);

        let (a, b) = tokio::join!(bridge.boot(), bridge.boot());
        assert!(a.is_none() && b.is_none());
        assert!(bridge.boot().await.is_none());

        assert_eq!(booter.attempts.load(Ordering::SeqCst), 1);
        assert!(!bridge.is_supported());
        assert!(bridge.last_error().unwrap().contains("boot refused"));
        assert!(bridge.sandbox().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_host_never_boots() {
        let booter = Arc::new(FakeBooter {
            supported: false,
            ..FakeBooter::working()
        });
        let bridge = bridge_with(&booter);

        assert!(!bridge.probe_capability().supported);
        assert!(bridge.boot().await.is_none());
        assert_eq!(booter.attempts.load(Ordering::SeqCst), 0);
        assert!(!bridge.mount_tree(&VirtualTree::new()).await);
    }

    #[tokio::test]
    async fn test_boot_mounts_default_project_into_empty_root() {
        let booter = Arc::new(FakeBooter::working());
        let bridge = bridge_with(&booter);
        bridge.boot().await.unwrap();

        let files = booter.sandbox.files.lock();
        assert!(files.has_manifest());
        assert!(files.lookup("index.js").is_some());
        assert!(files.lookup("README.md").is_some());
    }

    #[tokio::test]
    async fn test_boot_keeps_existing_content() {
        let booter = Arc::new(FakeBooter::working());
        booter.sandbox.files.lock().insert_file("main.py", "print(1)");
        let bridge = bridge_with(&booter);
        bridge.boot().await.unwrap();

        let files = booter.sandbox.files.lock();
        assert!(files.lookup("index.js").is_none());
        assert!(!files.has_manifest());
    }

    #[tokio::test]
    async fn test_mount_empty_tree_adds_manifest() {
        let booter = Arc::new(FakeBooter::working());
        booter.sandbox.files.lock().insert_file(".jsh_history", "");
        let bridge = bridge_with(&booter);

        // a history file alone does not count as content
        bridge.boot().await.unwrap();
        assert!(booter.sandbox.files.lock().lookup("index.js").is_some());

        *booter.sandbox.files.lock() = MountTree::new();
        assert!(bridge.mount_tree(&VirtualTree::new()).await);
        assert!(booter.sandbox.files.lock().has_manifest());
    }

    #[tokio::test]
    async fn test_mount_twice_is_idempotent() {
        let booter = Arc::new(FakeBooter::working());
        let bridge = bridge_with(&booter);

        let mut tree = VirtualTree::new();
        let src = tree.create_directory(&NodeKey::root(), "src").unwrap();
        let file = tree.create_file(&src, "index.js").unwrap();
        tree.write_content(&file, "console.log(1)").unwrap();

        assert!(bridge.mount_tree(&tree).await);
        let first = booter.sandbox.files.lock().clone();
        assert!(bridge.mount_tree(&tree).await);
        let second = booter.sandbox.files.lock().clone();

        assert_eq!(first, second);
        // default project plus two tree mounts
        assert_eq!(booter.sandbox.mounts.load(Ordering::SeqCst), 3);
        assert_eq!(
            second.entries().filter(|(name, _)| *name == "src").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_mount_files() {
        let booter = Arc::new(FakeBooter::working());
        let bridge = bridge_with(&booter);

        assert!(bridge.mount_files(&[("lib/a.js", "a"), ("b.js", "b")]).await);
        let files = booter.sandbox.files.lock();
        assert!(files.lookup("lib/a.js").is_some());
        assert!(files.lookup("b.js").is_some());
    }
}
