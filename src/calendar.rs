use crate::error::PortError;
use crate::model::Event;
use crate::types::{EventId, ExternalEventId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Calendar entry mirrored from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub event: EventId,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEntry {
    /// Builds an entry starting at the event date and lasting `duration`.
    ///
    /// Returns `None` when the end falls outside the representable range.
    pub fn from_event(event: &Event, duration: Duration) -> Option<Self> {
        let end = event.date.checked_add_signed(duration)?;
        Some(Self {
            event: event.id,
            summary: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: event.date,
            end,
        })
    }
}

/// Port to an external calendar provider.
///
/// Failures are never fatal to the caller; the orchestrator logs them.
#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Creates the entry and returns the provider's id for it.
    async fn create_calendar_event(
        &self,
        entry: &CalendarEntry,
    ) -> std::result::Result<ExternalEventId, PortError>;

    /// Returns whether calendar sync is configured at all.
    fn enabled(&self) -> bool {
        true
    }
}

/// Calendar port that mirrors nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCalendar;

#[async_trait]
impl CalendarSync for NoCalendar {
    async fn create_calendar_event(
        &self,
        _entry: &CalendarEntry,
    ) -> std::result::Result<ExternalEventId, PortError> {
        Err("calendar sync is not configured".into())
    }

    fn enabled(&self) -> bool {
        false
    }
}
