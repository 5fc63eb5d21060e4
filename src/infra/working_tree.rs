//! Working tree fingerprints and the last build record
//!
//! Content hashing walks the whole repository, so it runs on the blocking
//! thread pool.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use crate::config::defaults::DEFAULT_IGNORED_PATHS;
use crate::core::change_scope::{ChangeTracker, Fingerprint, LastBuildInfo};
use crate::error::{ChangeTrackingError, FilesystemError};
use crate::infra::filesystem;

/// Change tracker of a local working tree
#[derive(Debug, Clone)]
pub struct WorkingTreeTracker {
    root: PathBuf,
    record: PathBuf,
    ignore: Vec<String>,
}

impl WorkingTreeTracker {
    /// Track `root`, recording the last build at `record`
    ///
    /// `ignore` lists repository-relative path prefixes that never count
    /// as changes.
    pub fn new(root: impl Into<PathBuf>, record: impl Into<PathBuf>, ignore: Vec<String>) -> Self {
        Self {
            root: root.into(),
            record: record.into(),
            ignore,
        }
    }

    fn is_ignored(&self, relative: &str) -> bool {
        relative.split('/').any(|part| DEFAULT_IGNORED_PATHS.contains(&part))
            || self.ignore.iter().any(|prefix| {
                let prefix = prefix.trim_end_matches('/');
                relative == prefix || relative.starts_with(&format!("{prefix}/"))
            })
    }
}

/// Repository-relative path with `/` separators
fn relative_path(root: &Path, entry: &DirEntry) -> Option<String> {
    let relative = entry.path().strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

fn hash_file(path: &Path) -> Result<String, FilesystemError> {
    let read_error = |e: std::io::Error| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let mut file = std::fs::File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer).map_err(read_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint every non-ignored file under the tracker's root
fn fingerprint_tree(tracker: &WorkingTreeTracker) -> Result<Fingerprint, ChangeTrackingError> {
    let root = &tracker.root;
    let mut fingerprint = Fingerprint::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || relative_path(root, entry).is_some_and(|rel| !tracker.is_ignored(&rel))
        });

    for entry in walker {
        let entry = entry.map_err(|e| ChangeTrackingError::Walk {
            path: root.clone(),
            error: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(relative) = relative_path(root, &entry) {
            fingerprint.insert(relative, hash_file(entry.path())?);
        }
    }

    tracing::debug!("Fingerprinted {} file(s) under {}", fingerprint.len(), root.display());
    Ok(fingerprint)
}

#[async_trait]
impl ChangeTracker for WorkingTreeTracker {
    async fn read_last_build_info(&self) -> Result<Option<LastBuildInfo>, ChangeTrackingError> {
        let Some(content) = filesystem::read_file_if_exists(&self.record)? else {
            return Ok(None);
        };

        let info: LastBuildInfo =
            serde_json::from_str(&content).map_err(|e| ChangeTrackingError::Corrupt {
                path: self.record.clone(),
                error: e.to_string(),
            })?;
        Ok(Some(info))
    }

    async fn fingerprint(&self) -> Result<Fingerprint, ChangeTrackingError> {
        let tracker = self.clone();
        tokio::task::spawn_blocking(move || fingerprint_tree(&tracker))
            .await
            .map_err(|e| ChangeTrackingError::Task(e.to_string()))?
    }

    async fn save_last_build_info(
        &self,
        fingerprint: Fingerprint,
        unbuilt: BTreeSet<String>,
    ) -> Result<(), ChangeTrackingError> {
        let built_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let info = LastBuildInfo {
            repository: self.root.display().to_string(),
            built_at,
            fingerprint,
            unbuilt,
        };

        let content = serde_json::to_string_pretty(&info).map_err(|e| ChangeTrackingError::Corrupt {
            path: self.record.clone(),
            error: e.to_string(),
        })?;
        filesystem::write_file(&self.record, &content)?;
        tracing::debug!("Recorded last build of {}", self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &str) {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn setup() -> (TempDir, TempDir, WorkingTreeTracker) {
        let repo = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(repo.path(), "packages/a/index.js", "a");
        write(repo.path(), "packages/b/index.js", "b");
        write(repo.path(), ".git/HEAD", "ref");
        write(repo.path(), "packages/a/node_modules/dep/index.js", "dep");
        write(repo.path(), "dist/out.js", "out");

        let tracker = WorkingTreeTracker::new(
            repo.path(),
            state.path().join("last-build.json"),
            vec!["dist/".to_string()],
        );
        (repo, state, tracker)
    }

    #[tokio::test]
    async fn test_fingerprint_skips_ignored_paths() {
        let (_repo, _state, tracker) = setup();
        let fingerprint = tracker.fingerprint().await.unwrap();

        assert_eq!(fingerprint.len(), 2);
        assert!(fingerprint.digest("packages/a/index.js").is_some());
        assert!(fingerprint.digest("packages/b/index.js").is_some());
    }

    #[tokio::test]
    async fn test_fingerprint_detects_content_change() {
        let (repo, _state, tracker) = setup();
        let before = tracker.fingerprint().await.unwrap();

        write(repo.path(), "packages/b/index.js", "changed");
        write(repo.path(), "dist/out.js", "rebuilt");
        let after = tracker.fingerprint().await.unwrap();

        assert_eq!(
            before.changed_files(&after).into_iter().collect::<Vec<_>>(),
            vec!["packages/b/index.js".to_string()]
        );
    }

    #[tokio::test]
    async fn test_last_build_round_trip() {
        let (_repo, _state, tracker) = setup();
        assert_eq!(tracker.read_last_build_info().await.unwrap(), None);

        let fingerprint = tracker.fingerprint().await.unwrap();
        let unbuilt = BTreeSet::from(["packages/b".to_string()]);
        tracker
            .save_last_build_info(fingerprint.clone(), unbuilt.clone())
            .await
            .unwrap();

        let info = tracker.read_last_build_info().await.unwrap().unwrap();
        assert_eq!(info.fingerprint, fingerprint);
        assert_eq!(info.unbuilt, unbuilt);
        assert!(info.built_at > 0);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let (_repo, state, tracker) = setup();
        std::fs::write(state.path().join("last-build.json"), "{").unwrap();

        assert!(matches!(
            tracker.read_last_build_info().await,
            Err(ChangeTrackingError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_configured_ignore_is_a_path_prefix() {
        let tracker = WorkingTreeTracker::new("/r", "/s", vec!["build".to_string()]);
        assert!(tracker.is_ignored("build"));
        assert!(tracker.is_ignored("build/x.o"));
        assert!(!tracker.is_ignored("builder/x.rs"));
        assert!(tracker.is_ignored("a/target/debug"));
    }
}
