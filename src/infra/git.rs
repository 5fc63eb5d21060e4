//! Git operations
//!
//! Shallow-clones remote repositories using the gix crate so that a remote
//! build target gets a working tree to build from.

use gix::remote::fetch::Shallow;
use sha2::{Digest, Sha256};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Invalid repository
    #[error("Invalid repository at '{path}': {error}")]
    InvalidRepository { path: PathBuf, error: String },
}

/// Result of a git clone operation
#[derive(Debug, Clone)]
pub struct CloneResult {
    /// Path to the cloned working tree
    pub path: PathBuf,
    /// Commit checked out
    pub commit_sha: String,
}

/// Directory name a remote URL is cloned into
///
/// Stable for a given URL so that repeated builds reuse one location.
pub fn checkout_dir_name(url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let stem = url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit(['/', ':'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("repository");
    format!("{stem}-{}", &digest[..12])
}

/// Git repository operations rooted in a checkout directory
#[derive(Debug)]
pub struct GitOperations {
    /// Directory holding the clones
    work_dir: PathBuf,
}

impl GitOperations {
    /// Create a new git operations handler
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }

    /// Shallow-clone `url` at its default branch, replacing any previous clone
    pub fn clone_repo(&self, url: &str) -> Result<CloneResult, GitError> {
        let dest_path = self.work_dir.join(checkout_dir_name(url));

        if dest_path.exists() {
            std::fs::remove_dir_all(&dest_path).map_err(|e| GitError::IoError {
                path: dest_path.clone(),
                error: e.to_string(),
            })?;
        }
        std::fs::create_dir_all(&self.work_dir).map_err(|e| GitError::IoError {
            path: self.work_dir.clone(),
            error: e.to_string(),
        })?;

        tracing::info!("Cloning {url} into {}", dest_path.display());
        self.clone_internal(url, &dest_path)?;

        let commit_sha = Self::head_sha(&dest_path)?;
        tracing::debug!("Checked out {commit_sha}");

        Ok(CloneResult {
            path: dest_path,
            commit_sha,
        })
    }

    fn clone_internal(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        let clone_failed = |e: &dyn std::fmt::Display| GitError::CloneFailed {
            url: url.to_string(),
            error: e.to_string(),
        };

        let mut prepare = gix::prepare_clone(url, dest).map_err(|e| clone_failed(&e))?;
        prepare = prepare.with_shallow(Shallow::DepthAtRemote(NonZeroU32::MIN));

        let (mut checkout, _outcome) = prepare
            .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_failed(&e))?;

        checkout
            .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_failed(&e))?;

        Ok(())
    }

    /// Commit SHA of `HEAD` in the repository at `repo_path`
    pub fn head_sha(repo_path: &Path) -> Result<String, GitError> {
        let invalid = |e: &dyn std::fmt::Display| GitError::InvalidRepository {
            path: repo_path.to_path_buf(),
            error: e.to_string(),
        };

        let repo = gix::open(repo_path).map_err(|e| invalid(&e))?;
        let id = repo.head_id().map_err(|e| invalid(&e))?;
        Ok(id.to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checkout_dir_name_uses_repository_stem() {
        let name = checkout_dir_name("https://github.com/org/monorepo.git");
        assert!(name.starts_with("monorepo-"), "{name}");
        assert_eq!(name.len(), "monorepo-".len() + 12);

        let name = checkout_dir_name("git@github.com:org/tools");
        assert!(name.starts_with("tools-"), "{name}");
    }

    #[test]
    fn test_checkout_dir_name_is_stable_and_distinct() {
        let a = checkout_dir_name("ssh://host/a.git");
        assert_eq!(a, checkout_dir_name("ssh://host/a.git"));
        assert_ne!(a, checkout_dir_name("ssh://other/a.git"));
    }

    #[test]
    fn test_clone_of_unreachable_url_fails() {
        let temp = TempDir::new().unwrap();
        let git = GitOperations::new(temp.path().join("checkouts"));

        let err = git.clone_repo("file:///nonexistent/bilt/repo.git").unwrap_err();
        assert!(matches!(err, GitError::CloneFailed { .. }));
    }

    #[test]
    fn test_head_sha_of_non_repository_fails() {
        let temp = TempDir::new().unwrap();
        let err = GitOperations::head_sha(temp.path()).unwrap_err();
        assert!(matches!(err, GitError::InvalidRepository { .. }));
    }
}
