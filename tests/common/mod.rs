//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test project context
///
/// A monorepo in a temporary directory, with its own bilt data and cache
/// directories so that tests never share job state.
pub struct TestProject {
    /// Temporary directory for the repository
    pub dir: TempDir,
    /// Temporary directory for bilt's data and cache
    pub home: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            home: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a project with the given bilt.toml and package directories
    pub fn with_config(config: &str) -> Self {
        let project = Self::new();
        project.create_file("bilt.toml", config);
        for line in config.lines() {
            if let Some(dir) = line.trim().strip_prefix("directory = ") {
                project.create_dir(dir.trim_matches('"'));
            }
        }
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        std::fs::canonicalize(self.dir.path()).expect("Failed to canonicalize project path")
    }

    /// bilt data directory used by this project
    pub fn data_dir(&self) -> PathBuf {
        self.home.path().join("data")
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Remove a file from the test project
    pub fn remove_file(&self, name: &str) {
        std::fs::remove_file(self.dir.path().join(name)).expect("Failed to remove file");
    }

    /// Run bilt in the project directory
    pub fn bilt(&self, args: &[&str]) -> Output {
        self.bilt_in(self.dir.path(), args)
    }

    /// Run bilt in another directory, sharing this project's bilt state
    pub fn bilt_in(&self, dir: &Path, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_bilt"))
            .current_dir(dir)
            .args(args)
            .env("BILT_DATA_DIR", self.data_dir())
            .env("BILT_CACHE_DIR", self.home.path().join("cache"))
            .env_remove("BILT_CONFIG")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute bilt")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard output of a command as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Standard error of a command as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Directories printed as `Building <dir>`, in print order
pub fn built_packages(output: &Output) -> Vec<String> {
    stdout(output)
        .lines()
        .filter_map(|line| line.strip_prefix("Building "))
        .map(str::to_string)
        .collect()
}

/// Six packages whose build order is `edir, cdir, ddir, packages/bdir, adir, fdir`
///
/// Every package fails when it contains a `fail` file and otherwise
/// touches `built`.
pub const SAMPLE_CONFIG: &str = r#"
[build]
steps = ["test ! -f fail", "touch built"]
ignore = ["ignored"]

[[packages]]
directory = "adir"
dependencies = ["packages/bdir", "cdir"]

[[packages]]
directory = "packages/bdir"
dependencies = ["ddir"]

[[packages]]
directory = "cdir"
dependencies = ["edir"]

[[packages]]
directory = "ddir"
dependencies = ["cdir", "edir"]

[[packages]]
directory = "edir"

[[packages]]
directory = "fdir"
"#;

/// Build order of [`SAMPLE_CONFIG`]
pub const SAMPLE_ORDER: &[&str] = &["edir", "cdir", "ddir", "packages/bdir", "adir", "fdir"];
