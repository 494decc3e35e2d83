//! Capability probe

use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReasons {
    /// The sandbox root is an isolated location (never the host root)
    pub secure_context: bool,
    /// A background task runtime is available to drive processes
    pub worker_support: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub supported: bool,
    pub reasons: CapabilityReasons,
}

impl CapabilityReport {
    pub fn new(secure_context: bool, worker_support: bool) -> Self {
        Self {
            supported: secure_context && worker_support,
            reasons: CapabilityReasons {
                secure_context,
                worker_support,
            },
        }
    }
}

/// Check whether a local sandbox can run on this host
///
/// Pure: reads nothing but its argument and the current thread's runtime
/// context, and may be called any number of times.
pub fn probe_capability(root: Option<&Path>) -> CapabilityReport {
    let secure_context = match root {
        // a fresh temp directory is created at boot
        None => true,
        Some(path) => path.is_absolute() && path.parent().is_some(),
    };
    let worker_support = tokio::runtime::Handle::try_current().is_ok();

    CapabilityReport::new(secure_context, worker_support)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_runtime_is_unsupported() {
        let report = probe_capability(None);
        assert!(report.reasons.secure_context);
        assert!(!report.reasons.worker_support);
        assert!(!report.supported);
    }

    #[tokio::test]
    async fn test_probe_with_runtime() {
        assert!(probe_capability(None).supported);
        assert!(!probe_capability(Some(Path::new("relative/dir"))).supported);
        assert!(!probe_capability(Some(Path::new("/"))).supported);

        let dir = std::env::temp_dir();
        assert!(probe_capability(Some(&dir)).supported);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let json = serde_json::to_value(CapabilityReport::new(true, false)).unwrap();
        assert_eq!(json["reasons"]["secureContext"], true);
        assert_eq!(json["reasons"]["workerSupport"], false);
        assert_eq!(json["supported"], false);
    }
}
