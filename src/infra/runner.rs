//! Shell build action
//!
//! Runs the configured steps of a package with `sh -c`, in the package
//! directory, appending output to a per-package log file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::defaults::SHELL;
use crate::core::executor::BuildAction;
use crate::core::manifest::Manifest;
use crate::core::package::Package;

/// Environment variable holding the package name
pub const ENV_PACKAGE_NAME: &str = "BILT_PACKAGE_NAME";
/// Environment variable holding the package directory
pub const ENV_PACKAGE_DIRECTORY: &str = "BILT_PACKAGE_DIRECTORY";
/// Environment variable holding the dependency directories
pub const ENV_DEPENDENCIES: &str = "BILT_DEPENDENCIES";
/// Set to `1` when dependencies should be linked into the package
pub const ENV_LINK_DEPENDENCIES: &str = "BILT_LINK_DEPENDENCIES";

/// Builds a package by running shell steps
#[derive(Debug, Clone)]
pub struct ShellBuildAction {
    root: PathBuf,
    manifest: Arc<Manifest>,
    logs_dir: PathBuf,
    link_dependencies: bool,
}

impl ShellBuildAction {
    /// Run steps from `manifest` for packages of the working tree at `root`
    pub fn new(root: impl Into<PathBuf>, manifest: Arc<Manifest>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest,
            logs_dir: logs_dir.into(),
            link_dependencies: false,
        }
    }

    /// Ask packages to link their dependencies
    #[must_use]
    pub fn link_dependencies(mut self, link: bool) -> Self {
        self.link_dependencies = link;
        self
    }

    /// Log file of a package
    pub fn log_path(&self, package: &Package) -> PathBuf {
        let file = if package.directory == crate::core::package::ROOT_DIRECTORY {
            "root".to_string()
        } else {
            package.directory.replace('/', "-")
        };
        self.logs_dir.join(format!("{file}.log"))
    }

    fn environment(&self, package: &Package) -> Result<HashMap<&'static str, String>> {
        let dependencies = std::env::join_paths(
            package.dependencies.iter().map(|dep| self.root.join(dep)),
        )
        .context("Dependency directory cannot be passed in the environment")?;

        let mut env = HashMap::from([
            (ENV_PACKAGE_NAME, package.name.clone()),
            (ENV_PACKAGE_DIRECTORY, self.root.join(&package.directory).display().to_string()),
            (ENV_DEPENDENCIES, dependencies.to_string_lossy().into_owned()),
        ]);
        if self.link_dependencies {
            env.insert(ENV_LINK_DEPENDENCIES, "1".to_string());
        }
        Ok(env)
    }
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    std::fs::File::create(path).with_context(|| format!("Failed to create log {}", path.display()))
}

#[async_trait]
impl BuildAction for ShellBuildAction {
    async fn build(&self, package: &Package) -> Result<()> {
        let steps = self.manifest.steps_for(&package.directory);
        if steps.is_empty() {
            tracing::debug!("No build steps for '{}'", package.directory);
            return Ok(());
        }

        let directory = self.root.join(&package.directory);
        let env = self.environment(package)?;
        let log_path = self.log_path(package);
        let log = open_log(&log_path)?;

        for step in steps {
            tracing::info!("[{}] {}", package.directory, step);
            let status = Command::new(SHELL)
                .arg("-c")
                .arg(step)
                .current_dir(&directory)
                .envs(&env)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .stdout(log.try_clone()?)
                .stderr(log.try_clone()?)
                .status()
                .await
                .with_context(|| format!("Failed to run `{step}` in {}", directory.display()))?;

            if !status.success() {
                bail!(
                    "`{step}` failed in '{}' ({status}), see {}",
                    package.directory,
                    log_path.display()
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn action(repo: &TempDir, logs: &TempDir, config: &str) -> ShellBuildAction {
        let manifest = Manifest::from_toml(config).unwrap();
        ShellBuildAction::new(repo.path(), Arc::new(manifest), logs.path())
    }

    #[tokio::test]
    async fn test_steps_run_in_package_directory_with_environment() {
        let repo = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        std::fs::create_dir_all(repo.path().join("packages/a")).unwrap();

        let action = action(
            &repo,
            &logs,
            r#"
[build]
steps = ["echo \"$BILT_PACKAGE_NAME:$BILT_LINK_DEPENDENCIES\" > built.txt", "pwd"]
"#,
        )
        .link_dependencies(true);
        let package = Package::new("packages/a", "a").with_dependencies(["packages/b"]);

        action.build(&package).await.unwrap();

        let built = std::fs::read_to_string(repo.path().join("packages/a/built.txt")).unwrap();
        assert_eq!(built.trim(), "a:1");
        let log = std::fs::read_to_string(action.log_path(&package)).unwrap();
        assert!(log.contains("packages/a"), "{log}");
    }

    #[tokio::test]
    async fn test_failing_step_stops_the_build() {
        let repo = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        std::fs::create_dir_all(repo.path().join("a")).unwrap();

        let action = action(&repo, &logs, "[build]\nsteps = [\"exit 3\", \"touch after\"]");
        let err = action.build(&Package::new("a", "a")).await.unwrap_err();

        assert!(err.to_string().contains("exit 3"), "{err}");
        assert!(!repo.path().join("a/after").exists());
    }

    #[tokio::test]
    async fn test_abandoned_build_kills_running_step() {
        let repo = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        std::fs::create_dir_all(repo.path().join("a")).unwrap();

        let action = action(&repo, &logs, "[build]\nsteps = [\"sleep 0.5; touch late\"]");
        let package = Package::new("a", "a");
        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(100), action.build(&package)).await;
        assert!(abandoned.is_err(), "step should still be running");

        tokio::time::sleep(std::time::Duration::from_millis(900)).await;
        assert!(!repo.path().join("a/late").exists());
    }

    #[tokio::test]
    async fn test_no_steps_is_success() {
        let repo = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let action = action(&repo, &logs, "");
        action.build(&Package::new("missing", "m")).await.unwrap();
    }

    #[test]
    fn test_log_path_flattens_directory() {
        let action = ShellBuildAction::new("/r", Arc::new(Manifest::default()), "/logs");
        assert_eq!(
            action.log_path(&Package::new("packages/a", "a")),
            PathBuf::from("/logs/packages-a.log")
        );
        assert_eq!(action.log_path(&Package::new(".", "r")), PathBuf::from("/logs/root.log"));
    }
}
