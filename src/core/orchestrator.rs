//! Top-level run logic
//!
//! One run either dispatches a fresh repository job or resumes the jobs a
//! previous process left unfinished, never both, then waits for every job
//! it started to end. Collaborators are injected, so the same logic drives
//! the local dispatcher and the test doubles alike.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::change_scope::{resolve_change_scope, ChangeScope, ChangeTracker};
use crate::core::completion::CompletionTracker;
use crate::core::events::EventBus;
use crate::core::executor::BuildOutcome;
use crate::core::job::{Job, JobDescriptor, JobDispatcher, JobId, JobKind, Repository};
use crate::core::package::PackageSet;
use crate::error::BiltError;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// The change scope was empty; no job was dispatched
    NothingToBuild,
    /// A fresh repository job was dispatched and ended
    Dispatched { jobs: Vec<JobId> },
    /// Aborted jobs of a previous run were resumed and ended
    Resumed { jobs: Vec<JobId> },
}

impl RunReport {
    /// Jobs the run waited for
    pub fn jobs(&self) -> &[JobId] {
        match self {
            Self::NothingToBuild => &[],
            Self::Dispatched { jobs } | Self::Resumed { jobs } => jobs,
        }
    }
}

/// Runs builds through injected capabilities
pub struct Orchestrator {
    dispatcher: Arc<dyn JobDispatcher>,
    changes: Option<Arc<dyn ChangeTracker>>,
    bus: EventBus,
}

impl Orchestrator {
    /// Create an orchestrator publishing and observing on `bus`
    pub fn new(dispatcher: Arc<dyn JobDispatcher>, bus: EventBus) -> Self {
        Self {
            dispatcher,
            changes: None,
            bus,
        }
    }

    /// Scope local runs to what changed since the last successful build
    #[must_use]
    pub fn with_change_tracker(mut self, changes: Arc<dyn ChangeTracker>) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Execute one run and wait for it to finish
    ///
    /// The last build record is written only for local repositories, after
    /// every dispatched or resumed job ended. It carries forward the
    /// packages still lacking a successful build so the next run retries
    /// them together with their dependents.
    pub async fn run(
        &self,
        repository: &Repository,
        packages: &PackageSet,
        cancel: &CancellationToken,
    ) -> Result<RunReport, BiltError> {
        // Subscribe before dispatch so early completions are not missed
        let tracker = CompletionTracker::new(self.bus.subscribe());

        let report = if repository.is_remote() || !self.dispatcher.has_aborted_jobs().await? {
            let scope = self.change_scope(repository, packages).await?;
            if scope.is_nothing() {
                tracing::info!("No package changed since the last build");
                return Ok(RunReport::NothingToBuild);
            }

            tracing::debug!("Building {repository} with change scope {scope:?}");
            let job = self
                .dispatcher
                .dispatch_job(JobDescriptor::repository(repository.to_string(), scope))
                .await?;
            RunReport::Dispatched { jobs: vec![job.id] }
        } else {
            tracing::info!("Continuing previous build");
            let jobs = self.dispatcher.rerun_aborted_jobs().await?;
            RunReport::Resumed {
                jobs: jobs.iter().map(|job| job.id).collect(),
            }
        };

        let ended = tracker.wait(report.jobs().iter().copied(), cancel).await?;

        if !repository.is_remote() {
            if let Some(changes) = &self.changes {
                let previous = changes
                    .read_last_build_info()
                    .await?
                    .map(|info| info.unbuilt)
                    .unwrap_or_default();
                let unbuilt = unbuilt_packages(previous, &ended, packages);
                if !unbuilt.is_empty() {
                    tracing::info!("{} package(s) left to build next run", unbuilt.len());
                }
                let fingerprint = changes.fingerprint().await?;
                changes.save_last_build_info(fingerprint, unbuilt).await?;
            }
        }

        Ok(report)
    }

    async fn change_scope(
        &self,
        repository: &Repository,
        packages: &PackageSet,
    ) -> Result<ChangeScope, BiltError> {
        let Some(changes) = self.changes.as_ref().filter(|_| !repository.is_remote()) else {
            return Ok(ChangeScope::Everything);
        };

        let last_build = changes.read_last_build_info().await?;
        let current = changes.fingerprint().await?;
        Ok(resolve_change_scope(last_build.as_ref(), &current, packages))
    }
}

/// Packages without a successful build once `ended` jobs are accounted for
///
/// A repository job that failed before building anything leaves its whole
/// scope unbuilt. Dependents of an unbuilt package need not be listed: they
/// are pulled back into scope with it.
fn unbuilt_packages(
    mut unbuilt: BTreeSet<String>,
    ended: &[Job],
    packages: &PackageSet,
) -> BTreeSet<String> {
    for job in ended {
        match (job.kind(), job.outcome) {
            (JobKind::Package, Some(BuildOutcome::Success)) => {
                unbuilt.remove(job.target());
            }
            (JobKind::Package, Some(_)) => {
                unbuilt.insert(job.target().to_string());
            }
            (JobKind::Repository, _) if job.error.is_some() => match &job.descriptor.change_scope {
                ChangeScope::Everything => unbuilt.extend(packages.directories().map(String::from)),
                ChangeScope::Packages(directories) => unbuilt.extend(directories.iter().cloned()),
            },
            _ => {}
        }
    }
    unbuilt
}
