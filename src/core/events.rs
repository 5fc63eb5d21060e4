//! Job lifecycle events
//!
//! A per-run publish/subscribe bus on a tokio broadcast channel. Every
//! subscriber sees every event published after it subscribed, so
//! subscriptions must be taken before jobs are dispatched.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::core::job::Job;

/// Event name published when a job starts
pub const START_JOB: &str = "START_JOB";

/// Event name published when a job ends
pub const END_JOB: &str = "END_JOB";

/// Default number of buffered events per subscriber
pub const DEFAULT_CAPACITY: usize = 1024;

/// A job lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "job")]
pub enum JobEvent {
    #[serde(rename = "START_JOB")]
    StartJob(Job),
    #[serde(rename = "END_JOB")]
    EndJob(Job),
}

impl JobEvent {
    /// Event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartJob(_) => START_JOB,
            Self::EndJob(_) => END_JOB,
        }
    }

    /// The job the event is about
    pub fn job(&self) -> &Job {
        match self {
            Self::StartJob(job) | Self::EndJob(job) => job,
        }
    }
}

/// Event bus errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Every publisher is gone
    #[error("Event bus is closed")]
    Closed,

    /// The receiver fell behind and events were dropped
    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

/// Scoped publish/subscribe bus for job events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a bus with [`DEFAULT_CAPACITY`]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: JobEvent) {
        tracing::debug!("Publishing {} for job {}", event.name(), event.job().id);
        if self.sender.send(event).is_err() {
            tracing::debug!("No subscribers listening to event");
        }
    }

    /// Publish `START_JOB`
    pub fn start_job(&self, job: &Job) {
        self.publish(JobEvent::StartJob(job.clone()));
    }

    /// Publish `END_JOB`
    pub fn end_job(&self, job: &Job) {
        self.publish(JobEvent::EndJob(job.clone()));
    }

    /// Subscribe to every event published from now on
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiving side of a subscription; dropping it unsubscribes
#[derive(Debug)]
pub struct EventReceiver {
    receiver: broadcast::Receiver<JobEvent>,
}

impl EventReceiver {
    /// Receive the next event
    pub async fn recv(&mut self) -> Result<JobEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                tracing::warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}
