//! Dependency resolution
//!
//! Computes the build order of a package set: every dependency comes
//! before its dependents, and ties are broken by declaration order.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::package::{Package, PackageSet};
use crate::error::ResolverError;

/// One dependency-consistent total order over a package set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildOrder(Vec<String>);

impl BuildOrder {
    /// Directories in build order
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Iterate directories in build order
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the order is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of a directory in the order
    pub fn position(&self, directory: &str) -> Option<usize> {
        self.0.iter().position(|d| d == directory)
    }

    /// Keep only the given directories, preserving their relative order
    #[must_use]
    pub fn restricted_to(&self, keep: &BTreeSet<String>) -> Self {
        Self(self.0.iter().filter(|d| keep.contains(*d)).cloned().collect())
    }
}

impl From<Vec<String>> for BuildOrder {
    fn from(directories: Vec<String>) -> Self {
        Self(directories)
    }
}

impl<'a> IntoIterator for &'a BuildOrder {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Compute the build order of a package set
///
/// Depth-first post-order traversal: packages are visited in declaration
/// order and each package's dependencies are emitted, in their declared
/// order, before the package itself.
pub fn calculate_build_order(packages: &PackageSet) -> Result<BuildOrder, ResolverError> {
    let mut visited = HashSet::new();
    let mut in_progress = Vec::new();
    let mut result = Vec::with_capacity(packages.len());

    for package in packages {
        visit(packages, package, &mut visited, &mut in_progress, &mut result)?;
    }

    Ok(BuildOrder(result))
}

fn visit<'a>(
    packages: &'a PackageSet,
    package: &'a Package,
    visited: &mut HashSet<&'a str>,
    in_progress: &mut Vec<&'a str>,
    result: &mut Vec<String>,
) -> Result<(), ResolverError> {
    let directory = package.directory.as_str();

    if visited.contains(directory) {
        return Ok(());
    }

    if let Some(start) = in_progress.iter().position(|d| *d == directory) {
        let mut cycle: Vec<String> = in_progress[start..].iter().map(ToString::to_string).collect();
        cycle.push(directory.to_string());
        return Err(ResolverError::CircularDependency { cycle });
    }

    in_progress.push(directory);

    for dep in &package.dependencies {
        let dependency = packages
            .get(dep)
            .ok_or_else(|| ResolverError::MissingDependency {
                package: directory.to_string(),
                dependency: dep.clone(),
            })?;
        visit(packages, dependency, visited, in_progress, result)?;
    }

    in_progress.pop();
    visited.insert(directory);
    result.push(directory.to_string());

    Ok(())
}
