//! Package manager helpers

use crate::{CommandOutput, ProcessHandle, ProcessRunner, Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An installed top-level package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    dependencies: BTreeMap<String, ListedPackage>,
}

#[derive(Deserialize)]
struct ListedPackage {
    version: Option<String>,
}

/// Parse the output of `<pm> list --json --depth=0`
pub fn parse_package_listing(json: &str) -> Result<Vec<PackageInfo>> {
    let listing: Listing = serde_json::from_str(json)?;
    Ok(listing
        .dependencies
        .into_iter()
        .map(|(name, package)| PackageInfo {
            name,
            version: package.version,
        })
        .collect())
}

impl ProcessRunner {
    fn package_manager(&self) -> String {
        self.bridge().settings().package_manager.clone()
    }

    pub async fn install_package(&self, name: &str, dev: bool) -> CommandOutput {
        let pm = self.package_manager();
        let mut args = vec!["install", name];
        if dev {
            args.push("--save-dev");
        }

        tracing::info!("Installing {}{}", name, if dev { " (dev)" } else { "" });
        self.run_to_completion(&pm, &args).await
    }

    pub async fn uninstall_package(&self, name: &str) -> CommandOutput {
        let pm = self.package_manager();
        tracing::info!("Uninstalling {}", name);
        self.run_to_completion(&pm, &["uninstall", name]).await
    }

    /// Top-level dependencies of the sandbox project
    ///
    /// The listing exits nonzero on peer-dependency problems while still
    /// printing valid JSON, so stdout is parsed whenever it is present.
    pub async fn list_packages(&self) -> Result<Vec<PackageInfo>> {
        let pm = self.package_manager();
        let output = self.try_run(&pm, &["list", "--json", "--depth=0"]).await?;

        if output.stdout.trim().is_empty() {
            return Err(SandboxError::Process(format!(
                "{} list exited with {}: {}",
                pm,
                output.exit_code,
                output.stderr.trim()
            )));
        }

        parse_package_listing(&output.stdout)
    }

    /// Run a manifest script as a tracked process (`script:<name>`)
    pub async fn start_script(&self, script: &str) -> Result<ProcessHandle> {
        let pm = self.package_manager();
        let id = format!("script:{}", script);
        self.start_tracked(&id, &pm, &["run", script]).await
    }

    /// Start the `dev` script under the configured dev-server id
    pub async fn start_dev_server(&self) -> Result<ProcessHandle> {
        let pm = self.package_manager();
        let id = self.bridge().settings().dev_server_id.clone();
        self.start_tracked(&id, &pm, &["run", "dev"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::FakeBooter;
    use crate::{SandboxBridge, SandboxSettings};
    use std::sync::Arc;

    #[test]
    fn test_parse_listing() {
        let json = r#"{
            "name": "code-editor-project",
            "version": "1.0.0",
            "dependencies": {
                "express": { "version": "4.18.2" },
                "nodemon": { "version": "2.0.22" },
                "broken": {}
            }
        }"#;

        let packages = parse_package_listing(json).unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[1].name, "express");
        assert_eq!(packages[1].version.as_deref(), Some("4.18.2"));
        assert_eq!(packages[0].version, None);
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(parse_package_listing(r#"{"name":"x"}"#).unwrap().is_empty());
        assert!(parse_package_listing("not json").is_err());
    }

    #[tokio::test]
    async fn test_commands_use_configured_package_manager() {
        // the fake sandbox only knows `echo`, which makes the argv visible
        let settings = SandboxSettings {
            package_manager: "echo".to_string(),
            ..SandboxSettings::default()
        };
        let runner = ProcessRunner::new(SandboxBridge::new(Arc::new(FakeBooter::working()), settings));

        let output = runner.install_package("lodash", true).await;
        assert_eq!(output.stdout, "install lodash --save-dev\n");

        let output = runner.uninstall_package("lodash").await;
        assert_eq!(output.stdout, "uninstall lodash\n");

        let handle = runner.start_script("build").await.unwrap();
        assert_eq!(handle.id(), "script:build");
        assert_eq!(runner.list_tracked()[0].args, vec!["run", "build"]);
    }

    #[tokio::test]
    async fn test_list_packages_without_output() {
        let runner = ProcessRunner::new(SandboxBridge::new(
            Arc::new(FakeBooter::working()),
            SandboxSettings::default(),
        ));
        // `npm` cannot spawn in the fake sandbox
        assert!(matches!(
            runner.list_packages().await,
            Err(SandboxError::SpawnFailure { .. })
        ));
    }
}
