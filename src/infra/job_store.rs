//! Persisted job state
//!
//! Every job transition is written to `jobs.json` in the repository state
//! directory so that a later process can tell which jobs were left
//! unfinished and resume them.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::job::{Job, JobId, JobKind};
use crate::error::JobStoreError;
use crate::infra::filesystem;

/// Job records of one repository, mirrored to disk
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    jobs: Mutex<Vec<Job>>,
}

impl JobStore {
    /// Open the store at `path`, loading existing records
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
        let path = path.into();
        let jobs = match filesystem::read_file_if_exists(&path)? {
            Some(content) => {
                serde_json::from_str(&content).map_err(|e| JobStoreError::Corrupt {
                    path: path.clone(),
                    error: e.to_string(),
                })?
            }
            None => Vec::new(),
        };

        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a job record and persist
    pub fn upsert(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => jobs.push(job.clone()),
        }
        self.persist(&jobs)
    }

    /// Look up a job
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().iter().find(|j| j.id == id).cloned()
    }

    /// Every recorded job, in creation order
    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }

    /// Jobs that never reached their terminal state
    pub fn aborted(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .iter()
            .filter(|j| !j.is_ended())
            .cloned()
            .collect()
    }

    /// Package jobs belonging to a repository job
    pub fn children_of(&self, parent: JobId) -> Vec<Job> {
        self.jobs
            .lock()
            .iter()
            .filter(|j| j.descriptor.parent == Some(parent))
            .cloned()
            .collect()
    }

    /// Forget runs whose repository job and package jobs all ended
    ///
    /// Returns the number of records removed.
    pub fn prune_ended_runs(&self) -> Result<usize, JobStoreError> {
        let mut jobs = self.jobs.lock();
        let finished: Vec<JobId> = jobs
            .iter()
            .filter(|root| root.kind() == JobKind::Repository && root.is_ended())
            .filter(|root| {
                jobs.iter()
                    .filter(|j| j.descriptor.parent == Some(root.id))
                    .all(Job::is_ended)
            })
            .map(|root| root.id)
            .collect();

        if finished.is_empty() {
            return Ok(0);
        }

        let before = jobs.len();
        jobs.retain(|j| {
            !finished.contains(&j.id)
                && !j.descriptor.parent.is_some_and(|p| finished.contains(&p))
        });
        let removed = before - jobs.len();
        tracing::debug!("Pruned {removed} finished job record(s)");

        self.persist(&jobs)?;
        Ok(removed)
    }

    fn persist(&self, jobs: &[Job]) -> Result<(), JobStoreError> {
        let content =
            serde_json::to_string_pretty(jobs).map_err(|e| JobStoreError::Serialize(e.to_string()))?;
        filesystem::write_file(&self.path, &content)?;
        Ok(())
    }
}
