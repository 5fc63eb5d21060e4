//! Packages and the package set
//!
//! A package is identified by its directory, relative to the repository
//! root. The package set owns every package of a run and keeps them in
//! declaration order, which seeds the build order traversal.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory key of the package at the repository root
pub const ROOT_DIRECTORY: &str = ".";

/// A unit of build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Directory relative to the repository root (unique key within a run)
    pub directory: String,

    /// Package name
    pub name: String,

    /// Directories of the direct dependencies, in declared order
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Package {
    /// Create a package with no dependencies
    pub fn new(directory: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Set the direct dependencies
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `directory` is a direct dependency of this package
    pub fn depends_on(&self, directory: &str) -> bool {
        self.dependencies.iter().any(|dep| dep == directory)
    }

    /// Whether a repository-relative file path lies inside this package
    pub fn contains_file(&self, path: &str) -> bool {
        self.directory == ROOT_DIRECTORY || Path::new(path).starts_with(&self.directory)
    }
}

/// Packages of one run, keyed by directory, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    packages: Vec<Package>,
    index: HashMap<String, usize>,
}

impl PackageSet {
    /// Create an empty package set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a package set, rejecting duplicate directories
    pub fn from_packages<I>(packages: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Package>,
    {
        let mut set = Self::new();
        for package in packages {
            set.insert(package)?;
        }
        Ok(set)
    }

    /// Append a package at the end of the declaration order
    pub fn insert(&mut self, package: Package) -> Result<(), ConfigError> {
        if self.index.contains_key(&package.directory) {
            return Err(ConfigError::DuplicatePackage {
                directory: package.directory,
            });
        }
        self.index
            .insert(package.directory.clone(), self.packages.len());
        self.packages.push(package);
        Ok(())
    }

    /// Look up a package by directory
    pub fn get(&self, directory: &str) -> Option<&Package> {
        self.index.get(directory).map(|&i| &self.packages[i])
    }

    /// Whether a package with this directory exists
    pub fn contains(&self, directory: &str) -> bool {
        self.index.contains_key(directory)
    }

    /// Iterate packages in declaration order
    pub fn iter(&self) -> std::slice::Iter<'_, Package> {
        self.packages.iter()
    }

    /// Iterate package directories in declaration order
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(|p| p.directory.as_str())
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Packages that directly depend on `directory`, in declaration order
    pub fn dependents<'a>(&'a self, directory: &'a str) -> impl Iterator<Item = &'a Package> {
        self.packages.iter().filter(move |p| p.depends_on(directory))
    }

    /// Packages whose directory contains the given file
    pub fn owners_of<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Package> {
        self.packages.iter().filter(move |p| p.contains_file(path))
    }

    /// Widen a set of directories with every transitive dependent
    ///
    /// A package whose dependency changed must be rebuilt as well.
    /// Directories not in the set are dropped.
    pub fn with_dependents(&self, directories: &BTreeSet<String>) -> BTreeSet<String> {
        let mut result: BTreeSet<String> = directories
            .iter()
            .filter(|d| self.contains(d))
            .cloned()
            .collect();
        let mut frontier: Vec<String> = result.iter().cloned().collect();

        while let Some(directory) = frontier.pop() {
            for dependent in self.dependents(&directory) {
                if result.insert(dependent.directory.clone()) {
                    frontier.push(dependent.directory.clone());
                }
            }
        }

        result
    }
}

impl<'a> IntoIterator for &'a PackageSet {
    type Item = &'a Package;
    type IntoIter = std::slice::Iter<'a, Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
