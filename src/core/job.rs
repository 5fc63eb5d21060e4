//! Jobs and the job dispatcher contract
//!
//! A run is a tree of jobs: one `repository` job and one `package` job per
//! package actually built. Job state is owned by the [`JobDispatcher`];
//! the orchestrator only dispatches or resumes, then observes lifecycle
//! events.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::change_scope::ChangeScope;
use crate::core::executor::BuildOutcome;
use crate::error::DispatchError;

/// URL prefixes that mark a repository reference as remote
pub const REMOTE_PREFIXES: &[&str] = &["http:", "https:", "ssh:", "git@"];

/// Generated job identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a job builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// A whole run over a repository
    Repository,
    /// One package's build
    Package,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository => write!(f, "repository"),
            Self::Package => write!(f, "package"),
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Running,
    Ended,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// A repository reference: a local directory or a remote URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Repository {
    /// Local, already-cloned working tree
    Local(PathBuf),
    /// Remote URL (`http:`, `https:`, `ssh:` or `git@`)
    Remote(String),
}

impl Repository {
    /// Classify a repository reference
    pub fn parse(reference: &str) -> Self {
        if REMOTE_PREFIXES.iter().any(|p| reference.starts_with(p)) {
            Self::Remote(reference.to_string())
        } else {
            Self::Local(PathBuf::from(reference))
        }
    }

    /// Whether this is a remote URL
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// What to dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Job kind
    pub kind: JobKind,

    /// Repository reference the job belongs to
    pub repository: String,

    /// Package directory, for package jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// Repository job this package job belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<JobId>,

    /// Expose dependency directories to the package build
    #[serde(default)]
    pub link_dependencies: bool,

    /// Packages to build; dependents of scoped packages are built too
    #[serde(default)]
    pub change_scope: ChangeScope,
}

impl JobDescriptor {
    /// Descriptor of a whole-repository run
    pub fn repository(repository: impl Into<String>, change_scope: ChangeScope) -> Self {
        Self {
            kind: JobKind::Repository,
            repository: repository.into(),
            directory: None,
            parent: None,
            link_dependencies: true,
            change_scope,
        }
    }

    /// Descriptor of one package build inside a repository run
    pub fn package(parent: &Job, directory: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Package,
            repository: parent.descriptor.repository.clone(),
            directory: Some(directory.into()),
            parent: Some(parent.id),
            link_dependencies: parent.descriptor.link_dependencies,
            change_scope: ChangeScope::Everything,
        }
    }
}

/// A unit of dispatched, trackable work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job identity
    pub id: JobId,

    /// Lifecycle state
    pub status: JobStatus,

    /// What the job does
    #[serde(flatten)]
    pub descriptor: JobDescriptor,

    /// Outcome of an ended package job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BuildOutcome>,

    /// Why the job failed, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job with a fresh id
    pub fn new(descriptor: JobDescriptor) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            descriptor,
            outcome: None,
            error: None,
        }
    }

    /// Job kind
    pub fn kind(&self) -> JobKind {
        self.descriptor.kind
    }

    /// What the job builds: the package directory, or the repository
    pub fn target(&self) -> &str {
        self.descriptor
            .directory
            .as_deref()
            .unwrap_or(&self.descriptor.repository)
    }

    /// Whether the job reached its terminal state
    pub fn is_ended(&self) -> bool {
        self.status == JobStatus::Ended
    }
}

/// Dispatches jobs and resumes jobs left unfinished by a previous process
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Whether a previous run left unterminated jobs behind
    async fn has_aborted_jobs(&self) -> Result<bool, DispatchError>;

    /// Dispatch a fresh job; it runs in the background
    async fn dispatch_job(&self, descriptor: JobDescriptor) -> Result<Job, DispatchError>;

    /// Resume every aborted job, keeping their identities
    async fn rerun_aborted_jobs(&self) -> Result<Vec<Job>, DispatchError>;
}
