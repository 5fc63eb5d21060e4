//! Error types for bilt
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration (bilt.toml) errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration not found at '{path}'. Create a bilt.toml at the repository root.")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Configuration file is not valid TOML or has the wrong shape
    #[error("Failed to parse configuration '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Two packages declared with the same directory
    #[error("Package directory '{directory}' is declared more than once")]
    DuplicatePackage { directory: String },

    /// Package directory is empty, absolute, or escapes the repository
    #[error("Invalid package directory '{directory}': {reason}")]
    InvalidDirectory { directory: String, reason: String },

    /// Remote repositories have no working tree to discover configuration from
    #[error("Repository '{repository}' is remote: a configuration file must be given with --config")]
    RemoteWithoutConfig { repository: String },
}

/// Dependency resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Missing dependency
    #[error("Missing dependency: '{dependency}' required by '{package}'")]
    MissingDependency { package: String, dependency: String },
}

/// Build executor errors
///
/// Package build failures are outcomes, not errors. These only cover
/// a build order that does not fit the package set it is run against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Build order references a directory that is not in the package set
    #[error("Build order references unknown package '{directory}'")]
    UnknownPackage { directory: String },

    /// Build order lists the same directory twice
    #[error("Build order lists package '{directory}' more than once")]
    DuplicateEntry { directory: String },

    /// Build order places a dependency after its dependent
    #[error("Build order places '{dependency}' after its dependent '{package}'")]
    DependencyAfterDependent { package: String, dependency: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

/// Job persistence errors
#[derive(Error, Debug)]
pub enum JobStoreError {
    /// Underlying file operation failed
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Persisted job state is not valid JSON
    #[error("Job state at '{path}' is corrupt: {error}")]
    Corrupt { path: PathBuf, error: String },

    /// Serialization of job state failed
    #[error("Failed to serialize job state: {0}")]
    Serialize(String),
}

/// Working-tree fingerprint and last-build bookkeeping errors
#[derive(Error, Debug)]
pub enum ChangeTrackingError {
    /// Underlying file operation failed
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Walking the working tree failed
    #[error("Failed to scan '{path}': {error}")]
    Walk { path: PathBuf, error: String },

    /// Persisted last build info is not valid JSON
    #[error("Last build info at '{path}' is corrupt: {error}")]
    Corrupt { path: PathBuf, error: String },

    /// Background task failed
    #[error("Change tracking task failed: {0}")]
    Task(String),
}

/// Job dispatch and infrastructure errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Job state could not be read or written
    #[error("Job store error: {0}")]
    Store(#[from] JobStoreError),

    /// Configuration could not be loaded for a job
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Package graph is malformed
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Build order does not fit the package set
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Remote repository could not be cloned
    #[error("Git error: {0}")]
    Git(#[from] crate::infra::git::GitError),

    /// Filesystem error while preparing a job
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Descriptor is not valid for the requested kind of job
    #[error("Invalid job descriptor: {message}")]
    InvalidDescriptor { message: String },

    /// Background task panicked or was cancelled
    #[error("Job task failed: {0}")]
    Task(String),
}

/// Completion tracking errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// Wait was cancelled before every job ended
    #[error("Interrupted while waiting for {pending} job(s); run again to resume")]
    Cancelled { pending: usize },

    /// Event bus closed before every job ended
    #[error("Event bus closed while waiting for {pending} job(s)")]
    BusClosed { pending: usize },

    /// Subscriber fell behind and END_JOB events may have been lost
    #[error("Missed {missed} job event(s) while waiting for completion")]
    Lagged { missed: u64 },
}

/// Top-level bilt error type
#[derive(Error, Debug)]
pub enum BiltError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Completion tracking error
    #[error("{0}")]
    Tracker(#[from] TrackerError),

    /// Change tracking error
    #[error("Change tracking error: {0}")]
    ChangeTracking(#[from] ChangeTrackingError),
}
