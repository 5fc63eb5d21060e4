//! CLI command for listing recorded jobs
//!
//! Implements the `bilt jobs` command. Jobs still recorded after a run
//! are the ones an interrupted build left behind.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{self, status};
use crate::config::defaults::JOBS_FILE_NAME;
use crate::core::job::Job;
use crate::infra::dirs::BiltDirs;
use crate::infra::job_store::JobStore;

fn describe(job: &Job) -> String {
    let mut line = format!(
        "{} {:<10} {:<8} {}",
        job.id,
        job.kind().to_string(),
        job.status.to_string(),
        job.target()
    );
    if let Some(outcome) = job.outcome {
        line.push_str(&format!(" ({outcome})"));
    }
    line
}

/// Execute the jobs command
pub async fn execute(current_dir: &Path, repository: Option<&str>) -> Result<()> {
    let target = super::resolve_target(current_dir, repository)?;
    let state_dir = BiltDirs::new().repository_state_dir(&target.to_string());
    let store = JobStore::open(state_dir.join(JOBS_FILE_NAME))
        .with_context(|| format!("Failed to read job state of {target}"))?;

    let jobs = store.all();
    let output = output::current();
    output.json(&jobs);

    if jobs.is_empty() {
        output.line(format!("{} No recorded jobs for {target}", status::INFO));
        return Ok(());
    }

    for job in &jobs {
        output.line(describe(job));
    }
    if jobs.iter().any(|j| !j.is_ended()) {
        output.line(format!(
            "{} Unfinished jobs will be resumed by the next `bilt build`",
            status::WARNING
        ));
    }
    Ok(())
}
