//! Filesystem operations
//!
//! Handles file and directory operations for the persisted state.

use std::path::Path;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a file, replacing it atomically
///
/// The content goes to a sibling temporary file first, which is then
/// renamed over `path`. A crash mid-write leaves the old content intact.
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let write_error = |e: std::io::Error| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, content).map_err(write_error)?;
    std::fs::rename(&tmp, path).map_err(write_error)
}

/// Read content from a file, `None` if it does not exist
pub fn read_file_if_exists(path: &Path) -> Result<Option<String>, FilesystemError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_creates_parents_and_replaces() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/state.json");

        write_file(&path, "one").unwrap();
        write_file(&path, "two").unwrap();

        assert_eq!(read_file_if_exists(&path).unwrap().as_deref(), Some("two"));
        assert!(!temp.path().join("a/b/state.json.tmp").exists());
    }

    #[test]
    fn test_read_file_if_exists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.json");
        assert_eq!(read_file_if_exists(&path).unwrap(), None);

        write_file(&path, "{}").unwrap();
        assert_eq!(read_file_if_exists(&path).unwrap().as_deref(), Some("{}"));
    }
}
