//! Bounded background pipeline for best-effort side effects.
//!
//! Jobs are queued without blocking the caller and run on a fixed set of
//! worker tasks. A job never reports back to the operation that queued it;
//! its failures are logged, counted and published as [`Degraded`] outcomes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::types::UserId;

const OUTCOME_BUFFER: usize = 1024;

/// Kind of best-effort side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideEffect {
    /// Mirror an event into the external calendar.
    CalendarSync,
    /// Notify event attendees by mail.
    EventEmail,
    /// Deliver an announcement by mail.
    AnnouncementEmail,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CalendarSync => "calendar_sync",
            Self::EventEmail => "event_email",
            Self::AnnouncementEmail => "announcement_email",
        })
    }
}

/// A side-effect failure. Logged, never returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded {
    pub effect: SideEffect,
    /// Entity the effect was about, e.g. `event 4`.
    pub subject: String,
    /// Set for per-recipient mail failures.
    pub recipient: Option<UserId>,
    pub reason: String,
}

impl Degraded {
    pub(crate) fn new(effect: SideEffect, subject: &str, reason: impl ToString) -> Self {
        Self {
            effect,
            subject: subject.to_string(),
            recipient: None,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn for_recipient(mut self, recipient: UserId) -> Self {
        self.recipient = Some(recipient);
        self
    }
}

/// Final state of one queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The job finished without any failure.
    Completed { effect: SideEffect, subject: String },
    /// One failure of a job; a mail job may emit several.
    Degraded(Degraded),
    /// The queue was full or closed and the job never ran.
    Dropped { effect: SideEffect, subject: String },
}

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub submitted: u64,
    pub completed: u64,
    pub degraded: u64,
    pub dropped: u64,
}

struct Job {
    effect: SideEffect,
    subject: String,
    task: BoxFuture<'static, Vec<Degraded>>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    degraded: AtomicU64,
    dropped: AtomicU64,
}

struct Shared {
    counters: Counters,
    outcomes: broadcast::Sender<Outcome>,
}

impl Shared {
    fn publish(&self, outcome: Outcome) {
        // No subscribers is the normal case.
        let _ = self.outcomes.send(outcome);
    }
}

/// Cloneable submission side of the pipeline.
#[derive(Clone)]
pub(crate) struct DispatchHandle {
    tx: mpsc::Sender<Job>,
    shared: Arc<Shared>,
}

impl DispatchHandle {
    /// Queues a job; never waits for queue space.
    pub(crate) fn submit(
        &self,
        effect: SideEffect,
        subject: String,
        task: BoxFuture<'static, Vec<Degraded>>,
    ) {
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            effect,
            subject,
            task,
        };
        match self.tx.try_send(job) {
            Ok(()) => debug!(%effect, "side effect queued"),
            Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(effect = %job.effect, subject = %job.subject, "side effect dropped; queue unavailable");
                self.shared.publish(Outcome::Dropped {
                    effect: job.effect,
                    subject: job.subject,
                });
            }
        }
    }
}

impl fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle").finish_non_exhaustive()
    }
}

/// Owner of the worker tasks.
pub struct Dispatcher {
    handle: DispatchHandle,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns the workers on the current tokio runtime.
    pub fn start(config: &EngineConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (outcomes, _) = broadcast::channel(OUTCOME_BUFFER);
        let shared = Arc::new(Shared {
            counters: Counters::default(),
            outcomes,
        });
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let shared = Arc::clone(&shared);
                runtime.spawn(run_worker(worker, rx, shared))
            })
            .collect();

        Ok(Self {
            handle: DispatchHandle { tx, shared },
            workers,
        })
    }

    pub(crate) fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Subscribes to job outcomes published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
        self.handle.shared.outcomes.subscribe()
    }

    /// Returns the current counters.
    pub fn stats(&self) -> DispatchStats {
        let counters = &self.handle.shared.counters;
        DispatchStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            degraded: counters.degraded.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Closes the queue and waits until every queued job has run.
    ///
    /// Workers stop once every [`DispatchHandle`] is dropped, so callers must
    /// release the handles they gave out first.
    pub async fn shutdown(self) {
        let Self { handle, workers } = self;
        drop(handle);
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "side-effect worker ended abnormally");
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

async fn run_worker(worker: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>, shared: Arc<Shared>) {
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(job) = next else {
            debug!(worker, "side-effect worker stopping");
            break;
        };
        run_job(job, &shared).await;
    }
}

async fn run_job(job: Job, shared: &Shared) {
    let Job {
        effect,
        subject,
        task,
    } = job;

    // A separate task keeps a panicking side effect away from the worker.
    let failures = match tokio::spawn(task).await {
        Ok(failures) => failures,
        Err(err) if err.is_panic() => vec![Degraded::new(effect, &subject, "side effect panicked")],
        Err(err) => vec![Degraded::new(effect, &subject, err)],
    };

    if failures.is_empty() {
        shared.counters.completed.fetch_add(1, Ordering::Relaxed);
        debug!(%effect, %subject, "side effect completed");
        shared.publish(Outcome::Completed { effect, subject });
        return;
    }

    for failure in failures {
        shared.counters.degraded.fetch_add(1, Ordering::Relaxed);
        match failure.recipient {
            Some(recipient) => warn!(
                effect = %failure.effect,
                subject = %failure.subject,
                recipient = %recipient,
                reason = %failure.reason,
                "side effect degraded"
            ),
            None => warn!(
                effect = %failure.effect,
                subject = %failure.subject,
                reason = %failure.reason,
                "side effect degraded"
            ),
        }
        shared.publish(Outcome::Degraded(failure));
    }
}
