//! Codebox sandbox integration
//!
//! Keeps the explorer tree in sync with an isolated execution environment:
//! - Sandbox/SandboxBooter traits and a directory-backed implementation
//! - Mount format and the starter project manifest
//! - SandboxBridge: single-flight boot and mounting
//! - ProcessRunner: one-shot and tracked processes, package helpers
//! - Capability probe and status reporting

mod error;
mod settings;
mod mount;
mod sandbox;
mod local;
mod bridge;
mod runner;
mod packages;
mod probe;
mod status;

pub use error::{Result, SandboxError};
pub use settings::SandboxSettings;
pub use mount::{MountEntry, MountTree, ProjectManifest, MANIFEST_FILE};
pub use sandbox::{OutputChunk, OutputStream, ProcessControl, Sandbox, SandboxBooter, SpawnedProcess};
pub use local::{LocalBooter, LocalSandbox};
pub use bridge::SandboxBridge;
pub use runner::{
    CommandOutput, ProcessEvent, ProcessHandle, ProcessRunner, RunningProcess, TrackedProcessInfo,
};
pub use packages::{parse_package_listing, PackageInfo};
pub use probe::{probe_capability, CapabilityReasons, CapabilityReport};
pub use status::SandboxStatus;
