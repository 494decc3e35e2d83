//! Sandbox status reporting

use crate::ProcessRunner;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of the sandbox lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatus {
    /// False once boot failed or the host was found unsupported
    pub available: bool,
    pub initialized: bool,
    pub booted_at: Option<DateTime<Utc>>,
    pub uptime_ms: Option<i64>,
    pub process_count: usize,
    pub boot_attempts: usize,
    pub last_error: Option<String>,
}

impl ProcessRunner {
    /// Read the current state; never boots
    pub fn status(&self) -> SandboxStatus {
        let bridge = self.bridge();
        let booted_at = bridge.booted_at();

        SandboxStatus {
            available: bridge.is_supported(),
            initialized: bridge.is_initialized(),
            booted_at,
            uptime_ms: booted_at.map(|at| (Utc::now() - at).num_milliseconds()),
            process_count: self.process_count(),
            boot_attempts: bridge.boot_attempts(),
            last_error: bridge.last_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bridge::tests::FakeBooter;
    use crate::{ProcessRunner, SandboxBridge, SandboxSettings};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_has_no_side_effects() {
        let booter = Arc::new(FakeBooter::working());
        let runner = ProcessRunner::new(SandboxBridge::new(booter.clone(), SandboxSettings::default()));

        let before = runner.status();
        assert!(before.available);
        assert!(!before.initialized);
        assert_eq!(before.booted_at, None);
        assert_eq!(runner.status().boot_attempts, 0);

        runner.bridge().boot().await.unwrap();
        let after = runner.status();
        assert!(after.initialized);
        assert!(after.uptime_ms.unwrap() >= 0);
        assert_eq!(after.boot_attempts, 1);
        assert_eq!(after.process_count, 0);
    }

    #[tokio::test]
    async fn test_status_after_failed_boot() {
        let booter = Arc::new(FakeBooter::failing());
        let runner = ProcessRunner::new(SandboxBridge::new(booter, SandboxSettings::default()));
        runner.bridge().boot().await;

        let status = runner.status();
        assert!(!status.available);
        assert!(!status.initialized);
        assert!(status.last_error.is_some());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["processCount"], 0);
    }
}
