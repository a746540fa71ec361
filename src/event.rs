//! Event workflows.
//!
//! Creating or updating an event runs authorize, validate, commit. The commit
//! is one store call carrying the event row with its performances and
//! attendees, so a failure leaves nothing behind. Calendar sync and attendee
//! mail are queued on the dispatcher only after the commit succeeded and
//! never change the returned result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::authz::{authorize, require_membership};
use crate::calendar::{CalendarSync, NoCalendar};
use crate::config::EngineConfig;
use crate::dispatch::{DispatchHandle, SideEffect};
use crate::error::{Error, Result};
use crate::mailer::{Mailer, NoMailer};
use crate::model::{Event, EventDetails, NewEvent};
use crate::notify;
use crate::role::Role;
use crate::store::Store;
use crate::types::{EventId, GroupId, TrackId, UserId, unique, validate_name};

/// Input for [`EventOrchestrator::create_event`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventDraft {
    pub group: GroupId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    /// Tracks performed at the event, starting at `date`.
    pub tracks: Vec<TrackId>,
    /// Empty means every member of the group at creation time.
    pub attendees: Vec<UserId>,
}

/// Input for [`EventOrchestrator::update_event`].
///
/// Basic fields are always replaced. `None` leaves a relation untouched,
/// `Some(vec![])` clears it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventUpdate {
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub tracks: Option<Vec<TrackId>>,
    pub attendees: Option<Vec<UserId>>,
}

/// Coordinates event persistence with its best-effort side effects.
pub struct EventOrchestrator<S, C = NoCalendar, M = NoMailer> {
    store: Arc<S>,
    calendar: Arc<C>,
    mailer: Arc<M>,
    dispatch: DispatchHandle,
    calendar_timeout: Duration,
    mail_timeout: Duration,
    calendar_duration: chrono::Duration,
}

impl<S, C, M> EventOrchestrator<S, C, M>
where
    S: Store + 'static,
    C: CalendarSync + 'static,
    M: Mailer + 'static,
{
    pub(crate) fn new(
        store: Arc<S>,
        calendar: Arc<C>,
        mailer: Arc<M>,
        dispatch: DispatchHandle,
        config: &EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            calendar,
            mailer,
            dispatch,
            calendar_timeout: config.calendar_timeout,
            mail_timeout: config.mail_timeout,
            calendar_duration: config.calendar_span()?,
        })
    }

    /// Creates an event and queues calendar sync and attendee mail.
    #[instrument(skip(self, draft), fields(group = %draft.group))]
    pub async fn create_event(&self, actor: UserId, draft: EventDraft) -> Result<Event> {
        let group = draft.group;
        authorize(&*self.store, actor, group, Role::Moderator).await?;
        let title = validate_name(&draft.title, "event title")?;
        let tracks = self.check_tracks(group, &draft.tracks).await?;
        let attendees = if draft.attendees.is_empty() {
            self.store
                .group_memberships(group)
                .await?
                .into_iter()
                .map(|m| m.user)
                .collect()
        } else {
            self.check_attendees(group, &draft.attendees).await?
        };

        let event = self
            .store
            .create_event(
                NewEvent {
                    group,
                    title,
                    description: draft.description.trim().to_string(),
                    location: draft.location.trim().to_string(),
                    date: draft.date,
                },
                &tracks,
                &attendees,
            )
            .await?;
        info!(
            %group,
            event = %event.id,
            %actor,
            tracks = tracks.len(),
            attendees = attendees.len(),
            "event created"
        );

        self.queue_side_effects(&event);
        Ok(event)
    }

    /// Replaces the basic fields and, when given, the tracks and attendees.
    ///
    /// Updates do not re-sync the calendar or mail attendees.
    #[instrument(skip(self, update))]
    pub async fn update_event(
        &self,
        actor: UserId,
        event: EventId,
        update: EventUpdate,
    ) -> Result<Event> {
        let current = self.load(event).await?;
        let group = current.group;
        authorize(&*self.store, actor, group, Role::Moderator).await?;
        let title = validate_name(&update.title, "event title")?;
        let tracks = match &update.tracks {
            Some(tracks) => Some(self.check_tracks(group, tracks).await?),
            None => None,
        };
        let attendees = match &update.attendees {
            Some(attendees) => Some(self.check_attendees(group, attendees).await?),
            None => None,
        };

        let updated = self
            .store
            .update_event(
                event,
                EventDetails {
                    title,
                    description: update.description.trim().to_string(),
                    location: update.location.trim().to_string(),
                    date: update.date,
                },
                tracks.as_deref(),
                attendees.as_deref(),
            )
            .await?;
        info!(
            %group,
            %event,
            %actor,
            tracks_replaced = tracks.is_some(),
            attendees_replaced = attendees.is_some(),
            "event updated"
        );
        Ok(updated)
    }

    /// Adds performances to an event. The batch is checked as a whole, so
    /// one foreign track leaves the event unchanged.
    #[instrument(skip(self))]
    pub async fn attach_tracks(
        &self,
        actor: UserId,
        event: EventId,
        tracks: &[TrackId],
    ) -> Result<Event> {
        let current = self.load(event).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        let tracks = self.check_tracks(current.group, tracks).await?;
        let updated = self.store.append_event_tracks(event, &tracks).await?;
        info!(%event, %actor, added = tracks.len(), "tracks attached");
        Ok(updated)
    }

    /// Deletes an event with its performances, attendees and calendar link.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, actor: UserId, event: EventId) -> Result<()> {
        let current = self.load(event).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        self.store.delete_event(event).await?;
        info!(%event, group = %current.group, %actor, "event deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_event(&self, actor: UserId, event: EventId) -> Result<Event> {
        let event = self.load(event).await?;
        require_membership(&*self.store, actor, event.group).await?;
        Ok(event)
    }

    #[instrument(skip(self))]
    pub async fn group_events(&self, actor: UserId, group: GroupId) -> Result<Vec<Event>> {
        require_membership(&*self.store, actor, group).await?;
        Ok(self.store.group_events(group).await?)
    }

    /// Lists the events `user` attends across all groups.
    #[instrument(skip(self))]
    pub async fn user_events(&self, user: UserId) -> Result<Vec<Event>> {
        Ok(self.store.user_events(user).await?)
    }

    async fn load(&self, event: EventId) -> Result<Event> {
        self.store
            .find_event(event)
            .await?
            .ok_or_else(|| Error::not_found("event", event))
    }

    async fn check_tracks(&self, group: GroupId, tracks: &[TrackId]) -> Result<Vec<TrackId>> {
        let tracks = unique(tracks);
        for id in &tracks {
            let track = self
                .store
                .find_track(*id)
                .await?
                .ok_or_else(|| Error::not_found("track", id))?;
            if track.group != group {
                return Err(Error::Conflict(format!(
                    "track {id} does not belong to group {group}"
                )));
            }
        }
        Ok(tracks)
    }

    async fn check_attendees(&self, group: GroupId, users: &[UserId]) -> Result<Vec<UserId>> {
        let users = unique(users);
        for user in &users {
            if self.store.membership(group, *user).await?.is_none() {
                return Err(Error::Conflict(format!(
                    "attendee {user} is not a member of group {group}"
                )));
            }
        }
        Ok(users)
    }

    fn queue_side_effects(&self, event: &Event) {
        let subject = format!("event {}", event.id);
        if self.calendar.enabled() {
            self.dispatch.submit(
                SideEffect::CalendarSync,
                subject.clone(),
                notify::sync_calendar(
                    Arc::clone(&self.store),
                    Arc::clone(&self.calendar),
                    event.clone(),
                    self.calendar_duration,
                    self.calendar_timeout,
                ),
            );
        } else {
            debug!(event = %event.id, "calendar sync disabled");
        }
        if self.mailer.enabled() && !event.attendees.is_empty() {
            self.dispatch.submit(
                SideEffect::EventEmail,
                subject,
                notify::mail_event(
                    Arc::clone(&self.store),
                    Arc::clone(&self.mailer),
                    event.clone(),
                    self.mail_timeout,
                ),
            );
        }
    }
}

impl<S, C, M> std::fmt::Debug for EventOrchestrator<S, C, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventOrchestrator")
            .field("calendar_timeout", &self.calendar_timeout)
            .field("mail_timeout", &self.mail_timeout)
            .finish_non_exhaustive()
    }
}
