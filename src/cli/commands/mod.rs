//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod jobs;
pub mod order;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::core::job::Repository;
use crate::core::manifest::Manifest;
use crate::error::ConfigError;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the packages that changed, or resume an interrupted build
    Build {
        /// Repository directory or remote URL (defaults to the current directory)
        repository: Option<String>,

        /// Configuration file (required for remote repositories)
        #[arg(short, long, env = "BILT_CONFIG")]
        config: Option<PathBuf>,

        /// Number of packages built at once (0 = one per CPU)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Print the order packages are built in
    Order {
        /// Repository directory or remote URL (defaults to the current directory)
        repository: Option<String>,

        /// Configuration file (required for remote repositories)
        #[arg(short, long, env = "BILT_CONFIG")]
        config: Option<PathBuf>,
    },

    /// List recorded jobs, including jobs of an interrupted build
    Jobs {
        /// Repository directory or remote URL (defaults to the current directory)
        repository: Option<String>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        let current_dir = std::env::current_dir()?;
        match self {
            Self::Build {
                repository,
                config,
                jobs,
            } => {
                let options = build::BuildOptions {
                    repository,
                    config,
                    jobs,
                };
                build::execute(&current_dir, options).await
            }
            Self::Order { repository, config } => {
                order::execute(&current_dir, repository.as_deref(), config.as_deref()).await
            }
            Self::Jobs { repository } => jobs::execute(&current_dir, repository.as_deref()).await,
        }
    }
}

/// Resolve the build target; local directories are canonicalized
pub(crate) fn resolve_target(current_dir: &Path, reference: Option<&str>) -> Result<Repository> {
    match Repository::parse(reference.unwrap_or(".")) {
        Repository::Local(path) => {
            let path = current_dir.join(path);
            let root = std::fs::canonicalize(&path)
                .with_context(|| format!("Repository directory {} does not exist", path.display()))?;
            Ok(Repository::Local(root))
        }
        remote @ Repository::Remote(_) => Ok(remote),
    }
}

/// Load the configuration of a target
///
/// An explicit file wins; otherwise `bilt.toml` at the root of a local
/// repository is used. Remote repositories need an explicit file.
pub(crate) fn load_manifest(target: &Repository, config: Option<&Path>) -> Result<Manifest> {
    let manifest = match (config, target) {
        (Some(path), _) => Manifest::load(path)?,
        (None, Repository::Local(root)) => Manifest::discover(root)?,
        (None, Repository::Remote(url)) => {
            return Err(ConfigError::RemoteWithoutConfig {
                repository: url.clone(),
            }
            .into())
        }
    };
    Ok(manifest)
}
