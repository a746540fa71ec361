use std::time::Duration;

use crate::error::{Error, Result};

/// Longest calendar entry mirrored for an event.
pub const MAX_CALENDAR_EVENT_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MIN_CALENDAR_EVENT_DURATION: Duration = Duration::from_secs(60);

/// Runtime settings for the background side-effect pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Number of worker tasks draining the side-effect queue.
    pub workers: usize,
    /// Maximum number of queued side-effect jobs; extra jobs are dropped.
    pub queue_capacity: usize,
    /// Upper bound for one external calendar call.
    pub calendar_timeout: Duration,
    /// Upper bound for one mail delivery.
    pub mail_timeout: Duration,
    /// Length of the calendar entry mirrored for an event.
    pub calendar_event_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            calendar_timeout: Duration::from_secs(5),
            mail_timeout: Duration::from_secs(10),
            calendar_event_duration: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl EngineConfig {
    /// Sets the worker count; zero is raised to one.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the queue capacity; zero is raised to one.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn calendar_timeout(mut self, timeout: Duration) -> Self {
        self.calendar_timeout = timeout;
        self
    }

    pub fn mail_timeout(mut self, timeout: Duration) -> Self {
        self.mail_timeout = timeout;
        self
    }

    /// Sets the calendar entry length, clamped to one minute through
    /// [`MAX_CALENDAR_EVENT_DURATION`].
    pub fn calendar_event_duration(mut self, duration: Duration) -> Self {
        self.calendar_event_duration =
            duration.clamp(MIN_CALENDAR_EVENT_DURATION, MAX_CALENDAR_EVENT_DURATION);
        self
    }

    /// Checks fields that bypassed the setters, e.g. after deserializing.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.queue_capacity == 0 {
            return Err(Error::Invalid(
                "workers and queue capacity must be at least 1".to_string(),
            ));
        }
        self.calendar_span().map(|_| ())
    }

    /// Calendar entry length as a chrono duration.
    pub(crate) fn calendar_span(&self) -> Result<chrono::Duration> {
        let duration = self.calendar_event_duration;
        if !(MIN_CALENDAR_EVENT_DURATION..=MAX_CALENDAR_EVENT_DURATION).contains(&duration) {
            return Err(Error::Invalid(format!(
                "calendar event duration {duration:?} is outside {MIN_CALENDAR_EVENT_DURATION:?}..={MAX_CALENDAR_EVENT_DURATION:?}"
            )));
        }
        chrono::Duration::from_std(duration)
            .map_err(|err| Error::Invalid(format!("calendar event duration: {err}")))
    }
}
