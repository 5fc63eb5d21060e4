//! Configuration (bilt.toml) parsing and validation
//!
//! The configuration lives at the repository root and declares the
//! packages of the monorepo, their dependencies and how to build them:
//!
//! ```toml
//! [build]
//! steps = ["make"]
//! jobs = 2
//! ignore = ["dist"]
//!
//! [[packages]]
//! directory = "packages/a"
//! dependencies = ["packages/b"]
//! ```

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::config::defaults::{CONFIG_FILE_NAME, DEFAULT_BUILD_JOBS};
use crate::core::package::{Package, PackageSet, ROOT_DIRECTORY};
use crate::error::ConfigError;

/// The repository configuration (bilt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Build settings shared by every package
    #[serde(default)]
    pub build: BuildConfig,

    /// Packages in declaration order
    #[serde(default)]
    pub packages: Vec<PackageConfig>,
}

/// Build configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildConfig {
    /// Shell steps run in each package directory
    #[serde(default)]
    pub steps: Vec<String>,

    /// Number of packages built at once
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Repository-relative paths excluded from change detection
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// One declared package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageConfig {
    /// Directory relative to the repository root
    pub directory: String,

    /// Package name, defaults to the last directory component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Directories of the packages this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Steps overriding `build.steps`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
}

impl Manifest {
    /// Load the configuration of the repository rooted at `root`
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        Self::load(&root.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from file path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let manifest = Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.message().to_string(),
        })?;
        tracing::debug!(
            "Loaded {} package(s) from {}",
            manifest.packages.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Build the package set, normalizing every directory
    pub fn package_set(&self) -> Result<PackageSet, ConfigError> {
        let mut set = PackageSet::new();
        for config in &self.packages {
            let directory = normalize_directory(&config.directory)?;
            let dependencies = config
                .dependencies
                .iter()
                .map(|dep| normalize_directory(dep))
                .collect::<Result<Vec<_>, _>>()?;
            let name = config
                .name
                .clone()
                .unwrap_or_else(|| default_name(&directory));

            set.insert(Package::new(directory, name).with_dependencies(dependencies))?;
        }
        Ok(set)
    }

    /// Steps to run for the package at `directory`
    pub fn steps_for(&self, directory: &str) -> &[String] {
        self.packages
            .iter()
            .find(|p| normalize_directory(&p.directory).is_ok_and(|d| d == directory))
            .and_then(|p| p.steps.as_deref())
            .unwrap_or(&self.build.steps)
    }

    /// Number of packages built at once
    pub fn jobs(&self) -> usize {
        self.build.jobs.unwrap_or(DEFAULT_BUILD_JOBS).max(1)
    }
}

/// Normalize a repository-relative directory
///
/// Strips `./` components and trailing slashes; the repository root
/// itself becomes `.`. Absolute paths and paths leaving the repository
/// are rejected.
pub fn normalize_directory(directory: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDirectory {
        directory: directory.to_string(),
        reason: reason.to_string(),
    };

    if directory.trim().is_empty() {
        return Err(invalid("directory is empty"));
    }

    let mut parts = Vec::new();
    for component in Path::new(directory).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                parts.push(part.to_str().ok_or_else(|| invalid("not valid UTF-8"))?);
            }
            Component::ParentDir => return Err(invalid("must not leave the repository")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("must be relative to the repository root"));
            }
        }
    }

    if parts.is_empty() {
        Ok(ROOT_DIRECTORY.to_string())
    } else {
        Ok(parts.join("/"))
    }
}

fn default_name(directory: &str) -> String {
    directory
        .rsplit('/')
        .next()
        .filter(|name| *name != ROOT_DIRECTORY)
        .unwrap_or("root")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[build]
steps = ["make"]
jobs = 3
ignore = ["dist"]

[[packages]]
directory = "./packages/a/"
dependencies = ["packages/b"]

[[packages]]
directory = "packages/b"
name = "bee"
steps = ["npm test", "npm run build"]
"#;

    #[test]
    fn test_manifest_deserializes_from_valid_toml() {
        let manifest = Manifest::from_toml(SAMPLE).unwrap();
        assert_eq!(manifest.build.steps, vec!["make"]);
        assert_eq!(manifest.jobs(), 3);
        assert_eq!(manifest.build.ignore, vec!["dist"]);
        assert_eq!(manifest.packages.len(), 2);
    }

    #[test]
    fn test_package_set_normalizes_directories_and_names() {
        let set = Manifest::from_toml(SAMPLE).unwrap().package_set().unwrap();

        let dirs: Vec<_> = set.directories().collect();
        assert_eq!(dirs, vec!["packages/a", "packages/b"]);

        let a = set.get("packages/a").unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(a.dependencies, vec!["packages/b"]);
        assert_eq!(set.get("packages/b").unwrap().name, "bee");
    }

    #[test]
    fn test_steps_fall_back_to_build_steps() {
        let manifest = Manifest::from_toml(SAMPLE).unwrap();
        assert_eq!(manifest.steps_for("packages/a"), ["make"]);
        assert_eq!(manifest.steps_for("packages/b"), ["npm test", "npm run build"]);
    }

    #[test]
    fn test_defaults() {
        let manifest = Manifest::from_toml("").unwrap();
        assert_eq!(manifest, Manifest::default());
        assert_eq!(manifest.jobs(), DEFAULT_BUILD_JOBS);
        assert!(manifest.package_set().unwrap().is_empty());
    }

    #[test]
    fn test_zero_jobs_means_one() {
        let manifest = Manifest::from_toml("[build]\njobs = 0").unwrap();
        assert_eq!(manifest.jobs(), 1);
    }

    #[test]
    fn test_duplicate_directories_are_rejected() {
        let manifest = Manifest::from_toml(
            "[[packages]]\ndirectory = \"a\"\n[[packages]]\ndirectory = \"./a/\"",
        )
        .unwrap();
        assert!(matches!(
            manifest.package_set(),
            Err(ConfigError::DuplicatePackage { directory }) if directory == "a"
        ));
    }

    #[test]
    fn test_normalize_directory() {
        assert_eq!(normalize_directory("a/b/").unwrap(), "a/b");
        assert_eq!(normalize_directory("./a/./b").unwrap(), "a/b");
        assert_eq!(normalize_directory(".").unwrap(), ".");
        assert_eq!(normalize_directory("./").unwrap(), ".");
        assert!(normalize_directory("").is_err());
        assert!(normalize_directory("/abs").is_err());
        assert!(normalize_directory("a/../../b").is_err());
    }

    #[test]
    fn test_root_package_name() {
        let manifest = Manifest::from_toml("[[packages]]\ndirectory = \".\"").unwrap();
        let set = manifest.package_set().unwrap();
        assert_eq!(set.get(".").unwrap().name, "root");
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::discover(temp.path()),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "[[packages]]\nname = 1").unwrap();
        assert!(matches!(
            Manifest::discover(temp.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
