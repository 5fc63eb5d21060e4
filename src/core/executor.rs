//! Build execution
//!
//! Drives a build order through a pluggable [`BuildAction`] and yields one
//! [`PackageBuildResult`] per package, lazily and in build order.
//!
//! Failure cascades: a package is only built when every dependency that is
//! part of the run recorded [`BuildOutcome::Success`]. Otherwise it is
//! recorded as [`BuildOutcome::NotBuilt`] without invoking the action, which
//! in turn blocks its own dependents.
//!
//! Dependencies that are not part of the build order (packages left out of
//! a narrowed change scope) are treated as already built.

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, FuturesUnordered, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::core::package::{Package, PackageSet};
use crate::core::resolver::BuildOrder;
use crate::error::ExecutorError;

/// Terminal result of one package in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildOutcome {
    /// Build action succeeded
    Success,
    /// Build action failed
    Failure,
    /// Build action was never invoked because a dependency did not succeed
    NotBuilt,
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::NotBuilt => write!(f, "not-built"),
        }
    }
}

/// Outcome of one package, as emitted by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageBuildResult<'a> {
    /// The package
    pub package: &'a Package,
    /// Its outcome
    pub outcome: BuildOutcome,
}

/// Per-package build step
///
/// An `Err` is recorded as [`BuildOutcome::Failure`]; it never escapes the
/// executor.
#[async_trait]
pub trait BuildAction: Send + Sync {
    /// Build one package
    async fn build(&self, package: &Package) -> anyhow::Result<()>;
}

/// Whether a package can be built given the outcomes recorded so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    Blocked,
    Waiting,
}

fn readiness(
    package: &Package,
    outcomes: &HashMap<&str, BuildOutcome>,
    scheduled: &HashSet<&str>,
) -> Readiness {
    let mut waiting = false;

    for dep in &package.dependencies {
        if !scheduled.contains(dep.as_str()) {
            continue;
        }
        match outcomes.get(dep.as_str()) {
            Some(BuildOutcome::Success) => {}
            Some(_) => return Readiness::Blocked,
            None => waiting = true,
        }
    }

    if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}

/// Check that every entry of the order is a known package, listed once, and
/// after all of its scheduled dependencies
fn scheduled_packages<'a>(
    packages: &'a PackageSet,
    order: &'a BuildOrder,
) -> Result<HashSet<&'a str>, ExecutorError> {
    let mut scheduled = HashSet::with_capacity(order.len());

    for directory in order {
        if !packages.contains(directory) {
            return Err(ExecutorError::UnknownPackage {
                directory: directory.clone(),
            });
        }
        if !scheduled.insert(directory.as_str()) {
            return Err(ExecutorError::DuplicateEntry {
                directory: directory.clone(),
            });
        }
    }

    for (position, directory) in order.iter().enumerate() {
        let Some(package) = packages.get(directory) else {
            continue;
        };
        for dep in &package.dependencies {
            if !scheduled.contains(dep.as_str()) {
                continue;
            }
            if order.position(dep).is_some_and(|dep_position| dep_position > position) {
                return Err(ExecutorError::DependencyAfterDependent {
                    package: directory.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    Ok(scheduled)
}

async fn run_action<A>(action: &A, package: &Package) -> BuildOutcome
where
    A: BuildAction + ?Sized,
{
    tracing::debug!("Building package: {}", package.directory);
    match action.build(package).await {
        Ok(()) => {
            tracing::info!("Built package: {}", package.directory);
            BuildOutcome::Success
        }
        Err(e) => {
            tracing::warn!("Build failed for package '{}': {e:#}", package.directory);
            BuildOutcome::Failure
        }
    }
}

struct Sequential<'a> {
    remaining: std::slice::Iter<'a, String>,
    outcomes: HashMap<&'a str, BuildOutcome>,
    scheduled: HashSet<&'a str>,
}

/// Build packages one at a time, in build order
///
/// Nothing runs ahead of consumption: the action for the next package is
/// only invoked when the stream is polled for it, so dropping the stream
/// early leaves the remaining packages untouched.
pub fn build<'a, A>(
    packages: &'a PackageSet,
    order: &'a BuildOrder,
    action: &'a A,
) -> Result<impl Stream<Item = PackageBuildResult<'a>> + Send + 'a, ExecutorError>
where
    A: BuildAction + ?Sized,
{
    let scheduled = scheduled_packages(packages, order)?;
    let state = Sequential {
        remaining: order.iter(),
        outcomes: HashMap::with_capacity(order.len()),
        scheduled,
    };

    Ok(stream::unfold(state, move |mut state| async move {
        let directory = state.remaining.next()?;
        let package = packages.get(directory)?;

        let outcome = match readiness(package, &state.outcomes, &state.scheduled) {
            Readiness::Ready => run_action(action, package).await,
            Readiness::Blocked | Readiness::Waiting => {
                tracing::info!("Not building '{}': a dependency did not succeed", directory);
                BuildOutcome::NotBuilt
            }
        };

        state.outcomes.insert(directory.as_str(), outcome);
        Some((PackageBuildResult { package, outcome }, state))
    }))
}

struct Concurrent<'a> {
    order: &'a [String],
    next: usize,
    jobs: usize,
    started: HashSet<&'a str>,
    outcomes: HashMap<&'a str, BuildOutcome>,
    scheduled: HashSet<&'a str>,
    in_flight: FuturesUnordered<BoxFuture<'a, (&'a str, BuildOutcome)>>,
}

impl<'a> Concurrent<'a> {
    /// Start every ready package, up to the concurrency limit, and resolve
    /// blocked packages as not built
    fn schedule<A>(&mut self, packages: &'a PackageSet, action: &'a A)
    where
        A: BuildAction + ?Sized,
    {
        let order = self.order;
        for directory in &order[self.next..] {
            if self.in_flight.len() >= self.jobs {
                break;
            }
            let key = directory.as_str();
            if self.started.contains(key) || self.outcomes.contains_key(key) {
                continue;
            }
            let Some(package) = packages.get(key) else {
                continue;
            };

            match readiness(package, &self.outcomes, &self.scheduled) {
                Readiness::Ready => {
                    self.started.insert(key);
                    self.in_flight
                        .push(Box::pin(async move { (key, run_action(action, package).await) }));
                }
                Readiness::Blocked => {
                    tracing::info!("Not building '{}': a dependency did not succeed", key);
                    self.outcomes.insert(key, BuildOutcome::NotBuilt);
                }
                Readiness::Waiting => {}
            }
        }
    }
}

/// Build independent packages concurrently
///
/// A ready-set scheduler: every package whose scheduled dependencies all
/// succeeded is started, with at most `jobs` actions in flight. Results are
/// still emitted in build order and the outcome of every package is the
/// same as with [`build`].
pub fn build_concurrently<'a, A>(
    packages: &'a PackageSet,
    order: &'a BuildOrder,
    action: &'a A,
    jobs: usize,
) -> Result<impl Stream<Item = PackageBuildResult<'a>> + Send + 'a, ExecutorError>
where
    A: BuildAction + ?Sized,
{
    let scheduled = scheduled_packages(packages, order)?;
    let state = Concurrent {
        order: order.as_slice(),
        next: 0,
        jobs: jobs.max(1),
        started: HashSet::new(),
        outcomes: HashMap::with_capacity(order.len()),
        scheduled,
        in_flight: FuturesUnordered::new(),
    };

    Ok(stream::unfold(state, move |mut state| async move {
        loop {
            let order = state.order;
            let directory = order.get(state.next)?;

            if let Some(&outcome) = state.outcomes.get(directory.as_str()) {
                state.next += 1;
                let package = packages.get(directory)?;
                return Some((PackageBuildResult { package, outcome }, state));
            }

            state.schedule(packages, action);
            if state.outcomes.contains_key(directory.as_str()) {
                continue;
            }

            // The head of the order is either in flight or waiting on
            // something in flight.
            let (finished, outcome) = state.in_flight.next().await?;
            state.outcomes.insert(finished, outcome);
        }
    }))
}
