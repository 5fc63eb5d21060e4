//! Completion tracking
//!
//! Waits until every tracked job published `END_JOB`, whatever order the
//! jobs end in.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::core::events::{EventBusError, EventReceiver, JobEvent};
use crate::core::job::{Job, JobId};
use crate::error::TrackerError;

/// Countdown over the `END_JOB` events of a set of jobs
///
/// Create it from a subscription taken before dispatch so that jobs
/// ending before [`CompletionTracker::wait`] is called are not missed.
#[derive(Debug)]
pub struct CompletionTracker {
    receiver: EventReceiver,
}

impl CompletionTracker {
    /// Track completions seen by `receiver`
    pub fn new(receiver: EventReceiver) -> Self {
        Self { receiver }
    }

    /// Resolve once every job in `jobs` has ended
    ///
    /// Resolves immediately for an empty set. Repeated `END_JOB` events and
    /// `START_JOB` events are ignored. Returns every job that ended while
    /// waiting, tracked or not, in the order they ended.
    pub async fn wait<I>(
        mut self,
        jobs: I,
        cancel: &CancellationToken,
    ) -> Result<Vec<Job>, TrackerError>
    where
        I: IntoIterator<Item = JobId>,
    {
        let mut pending: HashSet<JobId> = jobs.into_iter().collect();
        let mut seen = HashSet::new();
        let mut ended = Vec::new();
        tracing::debug!("Waiting for {} job(s)", pending.len());

        while !pending.is_empty() {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(TrackerError::Cancelled { pending: pending.len() });
                }
                event = self.receiver.recv() => event,
            };

            match event {
                Ok(JobEvent::EndJob(job)) => {
                    if pending.remove(&job.id) {
                        tracing::debug!("Job {} ended, {} still working", job.id, pending.len());
                    }
                    if seen.insert(job.id) {
                        ended.push(job);
                    }
                }
                Ok(JobEvent::StartJob(_)) => {}
                Err(EventBusError::Closed) => {
                    return Err(TrackerError::BusClosed {
                        pending: pending.len(),
                    });
                }
                Err(EventBusError::Lagged(missed)) => {
                    return Err(TrackerError::Lagged { missed });
                }
            }
        }

        Ok(ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change_scope::ChangeScope;
    use crate::core::events::EventBus;
    use crate::core::job::{Job, JobDescriptor};
    use proptest::prelude::*;
    use std::time::Duration;

    fn make_jobs(n: usize) -> Vec<Job> {
        (0..n)
            .map(|i| Job::new(JobDescriptor::repository(format!("/repo-{i}"), ChangeScope::Everything)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_set_resolves_immediately() {
        let bus = EventBus::with_default_capacity();
        let tracker = CompletionTracker::new(bus.subscribe());
        tracker.wait([], &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_resolves_after_last_end_in_reverse_order() {
        let bus = EventBus::with_default_capacity();
        let tracker = CompletionTracker::new(bus.subscribe());
        let jobs = make_jobs(3);

        for job in jobs.iter().rev() {
            bus.start_job(job);
            bus.end_job(job);
        }

        tracker
            .wait(jobs.iter().map(|j| j.id), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_does_not_resolve_before_last_end() {
        let bus = EventBus::with_default_capacity();
        let tracker = CompletionTracker::new(bus.subscribe());
        let jobs = make_jobs(2);

        bus.end_job(&jobs[0]);
        // Repeated and foreign events do not count
        bus.end_job(&jobs[0]);
        bus.end_job(&make_jobs(1)[0]);
        bus.start_job(&jobs[1]);

        let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
        let cancel = CancellationToken::new();
        let wait = tracker.wait(ids, &cancel);
        tokio::pin!(wait);

        let early = tokio::time::timeout(Duration::from_millis(50), &mut wait).await;
        assert!(early.is_err(), "must keep waiting for the second job");

        bus.end_job(&jobs[1]);
        wait.await.unwrap();
    }

    #[tokio::test]
    async fn test_returns_each_ended_job_once() {
        let bus = EventBus::with_default_capacity();
        let tracker = CompletionTracker::new(bus.subscribe());
        let jobs = make_jobs(2);
        let untracked = make_jobs(1).remove(0);

        bus.start_job(&untracked);
        bus.end_job(&untracked);
        bus.end_job(&jobs[1]);
        bus.end_job(&jobs[1]);
        bus.end_job(&jobs[0]);

        let ended = tracker
            .wait(jobs.iter().map(|j| j.id), &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<_> = ended.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![untracked.id, jobs[1].id, jobs[0].id]);
    }

    #[tokio::test]
    async fn test_cancellation_reports_pending_jobs() {
        let bus = EventBus::with_default_capacity();
        let tracker = CompletionTracker::new(bus.subscribe());
        let jobs = make_jobs(2);
        bus.end_job(&jobs[0]);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tracker
            .wait(jobs.iter().map(|j| j.id), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_bus_closed_is_an_error() {
        let bus = EventBus::with_default_capacity();
        let tracker = CompletionTracker::new(bus.subscribe());
        let jobs = make_jobs(1);
        drop(bus);

        let err = tracker
            .wait(jobs.iter().map(|j| j.id), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, TrackerError::BusClosed { pending: 1 });
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::with_default_capacity();
        let tracker = CompletionTracker::new(bus.subscribe());
        let jobs = make_jobs(16);

        for (i, job) in jobs.iter().cloned().enumerate() {
            let bus = bus.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis((16 - i as u64) * 2)).await;
                bus.start_job(&job);
                bus.end_job(&job);
            });
        }

        tokio::time::timeout(
            Duration::from_secs(5),
            tracker.wait(jobs.iter().map(|j| j.id), &CancellationToken::new()),
        )
        .await
        .expect("tracker should resolve")
        .unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Any interleaving of END_JOB events resolves the tracker exactly
        /// when the last tracked job ends
        #[test]
        fn prop_resolves_after_last_end_in_any_order(order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let bus = EventBus::with_default_capacity();
                let jobs = make_jobs(8);
                let cancel = CancellationToken::new();

                for (published, &i) in order.iter().enumerate() {
                    // Everything but the final event: the tracker must still be waiting
                    let tracker = CompletionTracker::new(bus.subscribe());
                    for &j in &order[..published] {
                        bus.end_job(&jobs[j]);
                    }
                    let pending = tokio::time::timeout(
                        Duration::from_millis(5),
                        tracker.wait(jobs.iter().map(|j| j.id), &cancel),
                    )
                    .await;
                    assert!(pending.is_err(), "resolved with job {i} still running");
                }

                let tracker = CompletionTracker::new(bus.subscribe());
                for &i in &order {
                    bus.end_job(&jobs[i]);
                }
                tracker.wait(jobs.iter().map(|j| j.id), &cancel).await.unwrap();
            });
        }
    }
}
