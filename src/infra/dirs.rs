//! Platform-specific directory management
//!
//! Provides platform-specific paths for cache and data directories.
//! Follows XDG Base Directory Specification on Linux and standard locations on macOS.
//!
//! Environment variables can override default directories:
//! - `BILT_CACHE_DIR` - Override cache directory
//! - `BILT_DATA_DIR` - Override data directory

use std::env;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::defaults::{CHECKOUTS_SUBDIR, REPOSITORIES_SUBDIR};

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "BILT_CACHE_DIR";
pub const ENV_DATA_DIR: &str = "BILT_DATA_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "bilt";

/// Platform-specific directory provider for bilt
#[derive(Debug, Clone)]
pub struct BiltDirs {
    cache_dir: PathBuf,
    data_dir: PathBuf,
}

impl BiltDirs {
    /// Create a new `BiltDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve(ENV_CACHE_DIR, dirs::cache_dir, &[".cache"]),
            data_dir: Self::resolve(ENV_DATA_DIR, dirs::data_dir, &[".local", "share"]),
        }
    }

    /// Use explicit directories instead of the environment
    #[must_use]
    pub fn with_roots(cache_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data_dir,
        }
    }

    /// Get the cache directory path
    ///
    /// Used for data that can be regenerated, like remote clones.
    /// - Linux: `$XDG_CACHE_HOME/bilt` or `~/.cache/bilt`
    /// - macOS: `~/Library/Caches/bilt`
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the data directory path
    ///
    /// Used for job state and last build records.
    /// - Linux: `$XDG_DATA_HOME/bilt` or `~/.local/share/bilt`
    /// - macOS: `~/Library/Application Support/bilt`
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory remote repositories are cloned into
    #[must_use]
    pub fn checkouts_dir(&self) -> PathBuf {
        self.cache_dir.join(CHECKOUTS_SUBDIR)
    }

    /// State directory of one repository
    ///
    /// Keyed by a hash of the repository reference so that every working
    /// tree or remote URL gets its own job store and last build record.
    #[must_use]
    pub fn repository_state_dir(&self, repository: &str) -> PathBuf {
        self.data_dir
            .join(REPOSITORIES_SUBDIR)
            .join(repository_key(repository))
    }

    fn resolve(var: &str, platform: fn() -> Option<PathBuf>, home_fallback: &[&str]) -> PathBuf {
        if let Ok(path) = env::var(var) {
            return PathBuf::from(path);
        }

        platform().map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
            // Fallback to home directory
            let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home_fallback
                .iter()
                .fold(base, |path, part| path.join(part))
                .join(APP_NAME)
        })
    }
}

impl Default for BiltDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable key of a repository reference
pub fn repository_key(repository: &str) -> String {
    hex::encode(Sha256::digest(repository.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = BiltDirs::new();
        assert!(!dirs.cache_dir().as_os_str().is_empty());
        assert!(!dirs.data_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_checkouts_dir_is_under_cache_dir() {
        let dirs = BiltDirs::new();
        assert!(dirs.checkouts_dir().starts_with(dirs.cache_dir()));
    }

    #[test]
    fn test_repository_state_dir_is_keyed_by_repository() {
        let dirs = BiltDirs::with_roots("/cache".into(), "/data".into());
        let a = dirs.repository_state_dir("/work/a");
        let b = dirs.repository_state_dir("/work/b");

        assert!(a.starts_with("/data"));
        assert_ne!(a, b);
        assert_eq!(a, dirs.repository_state_dir("/work/a"));
        assert_eq!(a.file_name().unwrap().len(), 64);
    }
}
