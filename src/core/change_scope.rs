//! Change scoping
//!
//! Turns "what changed since the last successful build" into "which
//! packages must be rebuilt". Fingerprinting the working tree and
//! persisting the last build belong to a [`ChangeTracker`]; this module
//! only makes the decision.
//!
//! Packages that failed, or were never built, stay in scope until a later
//! run builds them, whether or not any of their files changed.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::package::PackageSet;
use crate::error::ChangeTrackingError;

/// Packages requiring a rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeScope {
    /// No prior build is recorded: build everything
    #[default]
    Everything,
    /// Directories of the packages with at least one changed file or
    /// without a successful build
    Packages(BTreeSet<String>),
}

impl ChangeScope {
    /// Whether there is nothing to build
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Packages(dirs) if dirs.is_empty())
    }
}

/// Content digests of the files of a working tree
///
/// Keys are repository-relative paths with `/` separators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint {
    files: BTreeMap<String, String>,
}

impl Fingerprint {
    /// Create an empty fingerprint
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the digest of a file
    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.files.insert(path.into(), digest.into());
    }

    /// Digest of a file, if recorded
    pub fn digest(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is recorded
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files added, modified or removed between `self` and `current`
    pub fn changed_files(&self, current: &Self) -> BTreeSet<String> {
        let modified_or_added = current
            .files
            .iter()
            .filter(|(path, digest)| self.files.get(*path) != Some(*digest))
            .map(|(path, _)| path.clone());
        let removed = self
            .files
            .keys()
            .filter(|path| !current.files.contains_key(*path))
            .cloned();

        modified_or_added.chain(removed).collect()
    }
}

impl<P: Into<String>, D: Into<String>> FromIterator<(P, D)> for Fingerprint {
    fn from_iter<T: IntoIterator<Item = (P, D)>>(iter: T) -> Self {
        let mut fingerprint = Self::new();
        for (path, digest) in iter {
            fingerprint.insert(path, digest);
        }
        fingerprint
    }
}

/// Record of the last successful build of a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBuildInfo {
    /// Repository root the record belongs to
    pub repository: String,

    /// Seconds since the Unix epoch when the build finished
    pub built_at: u64,

    /// Working tree fingerprint at the end of the build
    pub fingerprint: Fingerprint,

    /// Packages that did not build successfully since they last changed
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unbuilt: BTreeSet<String>,
}

/// Collaborator that fingerprints the working tree and persists the last build
#[async_trait]
pub trait ChangeTracker: Send + Sync {
    /// Read the last build record, `None` if no build was recorded
    async fn read_last_build_info(&self) -> Result<Option<LastBuildInfo>, ChangeTrackingError>;

    /// Fingerprint the current working tree
    async fn fingerprint(&self) -> Result<Fingerprint, ChangeTrackingError>;

    /// Record a finished build with the given working tree fingerprint and
    /// the packages it left without a successful build
    async fn save_last_build_info(
        &self,
        fingerprint: Fingerprint,
        unbuilt: BTreeSet<String>,
    ) -> Result<(), ChangeTrackingError>;
}

/// Directories of the packages owning at least one of the files
pub fn packages_owning_files<'a, I>(packages: &PackageSet, files: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut owners = BTreeSet::new();
    for file in files {
        owners.extend(packages.owners_of(file).map(|p| p.directory.clone()));
    }
    owners
}

/// Compute the change scope of a run
pub fn resolve_change_scope(
    last_build: Option<&LastBuildInfo>,
    current: &Fingerprint,
    packages: &PackageSet,
) -> ChangeScope {
    let Some(last_build) = last_build else {
        tracing::debug!("No previous build recorded, building everything");
        return ChangeScope::Everything;
    };

    let changed = last_build.fingerprint.changed_files(current);
    tracing::debug!("{} file(s) changed since last build", changed.len());

    let mut scope = packages_owning_files(packages, &changed);
    let unbuilt = last_build.unbuilt.iter().filter(|dir| packages.contains(dir));
    for directory in unbuilt {
        if scope.insert(directory.clone()) {
            tracing::debug!("'{directory}' has not built successfully yet");
        }
    }
    ChangeScope::Packages(scope)
}
