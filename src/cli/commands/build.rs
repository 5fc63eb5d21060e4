//! Build command implementation
//!
//! Implements `bilt build`: validates the configuration, then either
//! builds what changed or resumes an interrupted build, printing package
//! jobs as they start and end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{self, status, OutputConfig};
use crate::config::defaults::LAST_BUILD_FILE_NAME;
use crate::core::events::{EventBus, EventReceiver, JobEvent};
use crate::core::executor::BuildOutcome;
use crate::core::job::{Job, JobKind, Repository};
use crate::core::orchestrator::{Orchestrator, RunReport};
use crate::core::resolver::calculate_build_order;
use crate::infra::dirs::BiltDirs;
use crate::infra::dispatcher::{DispatcherOptions, LocalJobDispatcher};
use crate::infra::working_tree::WorkingTreeTracker;

/// Build options
pub struct BuildOptions {
    /// Repository directory or remote URL
    pub repository: Option<String>,
    /// Configuration file overriding the repository's bilt.toml
    pub config: Option<PathBuf>,
    /// Number of packages built at once
    pub jobs: Option<usize>,
}

/// What the jobs of a run reported
#[derive(Debug, Default, Serialize)]
struct Summary {
    outcomes: BTreeMap<String, BuildOutcome>,
    errors: Vec<String>,
}

impl Summary {
    fn count(&self, outcome: BuildOutcome) -> usize {
        self.outcomes.values().filter(|o| **o == outcome).count()
    }

    fn record(&mut self, output: OutputConfig, event: &JobEvent) {
        output.json(event);
        match event {
            JobEvent::StartJob(job) if job.kind() == JobKind::Package => {
                output.line(format!("Building {}", job.target()));
            }
            JobEvent::EndJob(job) => self.ended(output, job),
            JobEvent::StartJob(_) => {}
        }
    }

    fn ended(&mut self, output: OutputConfig, job: &Job) {
        match (job.kind(), job.outcome) {
            (JobKind::Package, Some(outcome)) => {
                if outcome == BuildOutcome::Failure {
                    let reason = job.error.as_deref().unwrap_or("build failed");
                    output.failure(format!("{} failed: {reason}", job.target()));
                }
                self.outcomes.insert(job.target().to_string(), outcome);
            }
            (JobKind::Repository, _) => {
                if let Some(error) = &job.error {
                    output.failure(error);
                    self.errors.push(error.clone());
                }
            }
            (JobKind::Package, None) => {}
        }
    }
}

/// Prints job events while a run is in progress
///
/// Aborts its task when dropped, so an early return never leaves it
/// running.
struct ProgressReporter {
    task: Option<JoinHandle<Summary>>,
    done: CancellationToken,
}

impl ProgressReporter {
    fn spawn(mut receiver: EventReceiver, output: OutputConfig) -> Self {
        let done = CancellationToken::new();
        let finished = done.clone();
        let task = tokio::spawn(async move {
            let mut summary = Summary::default();
            loop {
                tokio::select! {
                    biased;
                    event = receiver.recv() => match event {
                        Ok(event) => summary.record(output, &event),
                        Err(e) => {
                            tracing::warn!("Stopped reporting progress: {e}");
                            break;
                        }
                    },
                    () = finished.cancelled() => break,
                }
            }
            summary
        });

        Self {
            task: Some(task),
            done,
        }
    }

    /// Report every event published so far, then stop
    async fn finish(mut self) -> Summary {
        self.done.cancel();
        match self.task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Summary::default(),
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Cancels the run on ctrl-c
struct InterruptGuard(JoinHandle<()>);

impl InterruptGuard {
    fn spawn(cancel: CancellationToken) -> Self {
        Self(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, the build can be resumed by running bilt again");
                cancel.cancel();
            }
        }))
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn effective_jobs(requested: Option<usize>, configured: usize) -> usize {
    match requested {
        Some(0) => num_cpus::get(),
        Some(jobs) => jobs,
        None => configured,
    }
}

/// Execute the build command
pub async fn execute(current_dir: &Path, options: BuildOptions) -> Result<()> {
    let output = output::current();
    let target = super::resolve_target(current_dir, options.repository.as_deref())?;
    let manifest = super::load_manifest(&target, options.config.as_deref())?;

    // Malformed configuration is fatal before anything is dispatched
    let packages = manifest.package_set()?;
    calculate_build_order(&packages)?;

    let dirs = BiltDirs::new();
    let state_dir = dirs.repository_state_dir(&target.to_string());
    let jobs = effective_jobs(options.jobs, manifest.jobs());
    tracing::debug!("Using state directory {} and {jobs} job(s)", state_dir.display());

    let ignore = manifest.build.ignore.clone();
    let bus = EventBus::with_default_capacity();
    let dispatcher = LocalJobDispatcher::open(
        DispatcherOptions {
            manifest: Arc::new(manifest),
            jobs,
            state_dir: state_dir.clone(),
            checkouts_dir: dirs.checkouts_dir(),
        },
        bus.clone(),
    )
    .context("Failed to open job state")?;

    let mut orchestrator = Orchestrator::new(Arc::new(dispatcher), bus.clone());
    if let Repository::Local(root) = &target {
        orchestrator = orchestrator.with_change_tracker(Arc::new(WorkingTreeTracker::new(
            root,
            state_dir.join(LAST_BUILD_FILE_NAME),
            ignore,
        )));
    }

    let reporter = ProgressReporter::spawn(bus.subscribe(), output);
    let cancel = CancellationToken::new();
    let _interrupt = InterruptGuard::spawn(cancel.clone());

    let report = orchestrator.run(&target, &packages, &cancel).await?;
    let summary = reporter.finish().await;

    match &report {
        RunReport::NothingToBuild => output.line("Nothing to build"),
        RunReport::Dispatched { .. } | RunReport::Resumed { .. } => {
            let verb = if matches!(report, RunReport::Resumed { .. }) {
                "Resumed build"
            } else {
                "Build finished"
            };
            output.line(format!(
                "{} {verb}: {} built, {} failed, {} not built",
                status::SUCCESS,
                summary.count(BuildOutcome::Success),
                summary.count(BuildOutcome::Failure),
                summary.count(BuildOutcome::NotBuilt),
            ));
        }
    }
    let result = match report {
        RunReport::NothingToBuild => "nothing-to-build",
        RunReport::Dispatched { .. } => "dispatched",
        RunReport::Resumed { .. } => "resumed",
    };
    output.json(&serde_json::json!({
        "result": result,
        "packages": summary.outcomes,
    }));

    if let Some(error) = summary.errors.first() {
        bail!("Build of {target} did not run: {error}");
    }
    Ok(())
}
