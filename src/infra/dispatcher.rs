//! Local job dispatcher
//!
//! Runs repository jobs on the tokio runtime of the current process.
//! A repository job computes the build order, narrows it to its change
//! scope and drives the executor; every package it builds is wrapped in a
//! package job of its own. Job state goes through the [`JobStore`] so that
//! a later process can resume what this one left unfinished.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use crate::config::defaults::{JOBS_FILE_NAME, LOGS_SUBDIR};
use crate::core::change_scope::ChangeScope;
use crate::core::events::EventBus;
use crate::core::executor::{self, BuildAction, BuildOutcome, PackageBuildResult};
use crate::core::job::{Job, JobDescriptor, JobDispatcher, JobKind, JobStatus, Repository};
use crate::core::manifest::Manifest;
use crate::core::package::Package;
use crate::core::resolver::calculate_build_order;
use crate::error::DispatchError;
use crate::infra::git::GitOperations;
use crate::infra::job_store::JobStore;
use crate::infra::runner::ShellBuildAction;

/// Settings of a [`LocalJobDispatcher`]
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Repository configuration
    pub manifest: Arc<Manifest>,
    /// Number of packages built at once
    pub jobs: usize,
    /// Per-repository state directory (job store, logs)
    pub state_dir: PathBuf,
    /// Directory remote repositories are cloned into
    pub checkouts_dir: PathBuf,
}

struct Inner {
    options: DispatcherOptions,
    store: JobStore,
    bus: EventBus,
}

impl Inner {
    /// Persist a transition, then publish it
    fn transition(&self, job: &mut Job, status: JobStatus) -> Result<(), DispatchError> {
        job.status = status;
        self.store.upsert(job)?;
        match status {
            JobStatus::Running => self.bus.start_job(job),
            JobStatus::Ended => self.bus.end_job(job),
            JobStatus::Pending => {}
        }
        Ok(())
    }

    /// End a job, publishing `END_JOB` even if it cannot be persisted
    fn end(&self, job: &mut Job, outcome: BuildOutcome) {
        job.outcome = Some(outcome);
        if let Err(e) = self.transition(job, JobStatus::Ended) {
            tracing::error!("Failed to record end of job {}: {e}", job.id);
            self.bus.end_job(job);
        }
    }

    async fn checkout(&self, repository: &Repository) -> Result<PathBuf, DispatchError> {
        match repository {
            Repository::Local(path) => Ok(path.clone()),
            Repository::Remote(url) => {
                let git = GitOperations::new(self.options.checkouts_dir.clone());
                let url = url.clone();
                let clone = tokio::task::spawn_blocking(move || git.clone_repo(&url))
                    .await
                    .map_err(|e| DispatchError::Task(e.to_string()))??;
                Ok(clone.path)
            }
        }
    }

    /// Build every package of a repository job
    ///
    /// `previous` holds the package jobs of an earlier attempt of the same
    /// repository job, by directory.
    async fn build_repository(
        self: &Arc<Self>,
        job: &Job,
        previous: &HashMap<String, Job>,
    ) -> Result<BuildOutcome, DispatchError> {
        let packages = self.options.manifest.package_set()?;
        let full_order = calculate_build_order(&packages)?;
        let order = match &job.descriptor.change_scope {
            ChangeScope::Everything => full_order,
            ChangeScope::Packages(changed) => {
                full_order.restricted_to(&packages.with_dependents(changed))
            }
        };
        tracing::info!("Building {} package(s)", order.len());

        let root = self.checkout(&Repository::parse(&job.descriptor.repository)).await?;
        let shell = ShellBuildAction::new(
            root,
            Arc::clone(&self.options.manifest),
            self.options.state_dir.join(LOGS_SUBDIR),
        )
        .link_dependencies(job.descriptor.link_dependencies);
        let action = PackageJobAction {
            inner: Arc::clone(self),
            parent: job,
            previous,
            shell,
        };

        let mut results: BoxStream<'_, PackageBuildResult<'_>> = if self.options.jobs > 1 {
            executor::build_concurrently(&packages, &order, &action, self.options.jobs)?.boxed()
        } else {
            executor::build(&packages, &order, &action)?.boxed()
        };

        let mut outcome = BuildOutcome::Success;
        while let Some(result) = results.next().await {
            tracing::debug!("{}: {}", result.package.directory, result.outcome);
            if result.outcome != BuildOutcome::Success {
                outcome = BuildOutcome::Failure;
            }
            if result.outcome == BuildOutcome::NotBuilt {
                if let Some(leftover) = previous.get(&result.package.directory) {
                    if !leftover.is_ended() {
                        self.end(&mut leftover.clone(), BuildOutcome::NotBuilt);
                    }
                }
            }
        }
        drop(results);

        // Package jobs of an earlier attempt whose package left the order
        for leftover in previous.values().filter(|j| !j.is_ended()) {
            if order.position(leftover.target()).is_none() {
                self.end(&mut leftover.clone(), BuildOutcome::NotBuilt);
            }
        }

        Ok(outcome)
    }

    /// Run a repository job to its end
    async fn run_repository(self: Arc<Self>, mut job: Job, previous: HashMap<String, Job>) {
        if let Err(e) = self.transition(&mut job, JobStatus::Running) {
            tracing::error!("Failed to start job {}: {e}", job.id);
        }

        let outcome = match self.build_repository(&job, &previous).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Job {} failed: {e}", job.id);
                job.error = Some(e.to_string());
                self.end_unfinished(&previous);
                BuildOutcome::Failure
            }
        };

        // Record and prune before publishing so that observers of END_JOB
        // find the store settled
        job.outcome = Some(outcome);
        job.status = JobStatus::Ended;
        if let Err(e) = self.store.upsert(&job) {
            tracing::error!("Failed to record end of job {}: {e}", job.id);
        } else if let Err(e) = self.store.prune_ended_runs() {
            tracing::warn!("Failed to prune job records: {e}");
        }
        self.bus.end_job(&job);
    }

    /// End package jobs of an earlier attempt that are still unfinished
    fn end_unfinished(&self, previous: &HashMap<String, Job>) {
        let unfinished = previous
            .values()
            .filter_map(|job| self.store.get(job.id))
            .filter(|job| !job.is_ended());
        for mut job in unfinished {
            self.end(&mut job, BuildOutcome::NotBuilt);
        }
    }

    fn spawn(self: &Arc<Self>, job: Job, previous: HashMap<String, Job>) {
        tokio::spawn(Arc::clone(self).run_repository(job, previous));
    }
}

/// Wraps the build of each package in a package job
struct PackageJobAction<'a> {
    inner: Arc<Inner>,
    parent: &'a Job,
    previous: &'a HashMap<String, Job>,
    shell: ShellBuildAction,
}

#[async_trait]
impl BuildAction for PackageJobAction<'_> {
    async fn build(&self, package: &Package) -> anyhow::Result<()> {
        let earlier = self.previous.get(&package.directory);
        if earlier.is_some_and(|j| j.is_ended() && j.outcome == Some(BuildOutcome::Success)) {
            tracing::info!("'{}' was already built, skipping", package.directory);
            return Ok(());
        }

        let mut job = earlier
            .filter(|j| !j.is_ended())
            .cloned()
            .unwrap_or_else(|| Job::new(JobDescriptor::package(self.parent, &package.directory)));
        self.inner.transition(&mut job, JobStatus::Running)?;

        let result = self.shell.build(package).await;
        let outcome = match &result {
            Ok(()) => BuildOutcome::Success,
            Err(e) => {
                job.error = Some(format!("{e:#}"));
                BuildOutcome::Failure
            }
        };
        self.inner.end(&mut job, outcome);

        result
    }
}

/// Dispatcher running jobs in-process with on-disk job state
#[derive(Clone)]
pub struct LocalJobDispatcher {
    inner: Arc<Inner>,
}

impl LocalJobDispatcher {
    /// Open the job store under `options.state_dir` and publish on `bus`
    pub fn open(options: DispatcherOptions, bus: EventBus) -> Result<Self, DispatchError> {
        let store = JobStore::open(options.state_dir.join(JOBS_FILE_NAME))?;
        Ok(Self {
            inner: Arc::new(Inner {
                options,
                store,
                bus,
            }),
        })
    }

    /// Every job currently recorded
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.store.all()
    }
}

#[async_trait]
impl JobDispatcher for LocalJobDispatcher {
    async fn has_aborted_jobs(&self) -> Result<bool, DispatchError> {
        Ok(!self.inner.store.aborted().is_empty())
    }

    async fn dispatch_job(&self, descriptor: JobDescriptor) -> Result<Job, DispatchError> {
        if descriptor.kind != JobKind::Repository {
            return Err(DispatchError::InvalidDescriptor {
                message: "only repository jobs can be dispatched".to_string(),
            });
        }

        self.inner.store.prune_ended_runs()?;
        let job = Job::new(descriptor);
        self.inner.store.upsert(&job)?;
        tracing::debug!("Dispatching job {} for {}", job.id, job.target());

        self.inner.spawn(job.clone(), HashMap::new());
        Ok(job)
    }

    async fn rerun_aborted_jobs(&self) -> Result<Vec<Job>, DispatchError> {
        let aborted = self.inner.store.aborted();
        let roots: Vec<&Job> = aborted
            .iter()
            .filter(|j| j.kind() == JobKind::Repository)
            .collect();

        for job in aborted.iter().filter(|j| j.kind() == JobKind::Package) {
            let orphan = !job
                .descriptor
                .parent
                .is_some_and(|parent| roots.iter().any(|root| root.id == parent));
            if orphan {
                tracing::warn!("Ending job {} whose repository job is gone", job.id);
                self.inner.end(&mut job.clone(), BuildOutcome::NotBuilt);
            }
        }

        for root in roots {
            tracing::info!("Resuming job {} for {}", root.id, root.target());
            let previous = self
                .inner
                .store
                .children_of(root.id)
                .into_iter()
                .filter_map(|j| j.descriptor.directory.clone().map(|dir| (dir, j)))
                .collect();
            self.inner.spawn(root.clone(), previous);
        }

        Ok(aborted)
    }
}
