//! Side-effect jobs queued after an event or announcement is committed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::calendar::{CalendarEntry, CalendarSync};
use crate::dispatch::{Degraded, SideEffect};
use crate::mailer::Mailer;
use crate::model::{Announcement, CalendarLink, Event, User};
use crate::store::{EventStore, UserStore};

/// Mirrors `event` into the external calendar and records the link.
pub(crate) fn sync_calendar<S, C>(
    store: Arc<S>,
    calendar: Arc<C>,
    event: Event,
    duration: chrono::Duration,
    timeout: Duration,
) -> BoxFuture<'static, Vec<Degraded>>
where
    S: EventStore + Send + Sync + 'static,
    C: CalendarSync + 'static,
{
    async move {
        let subject = format!("event {}", event.id);
        let Some(entry) = CalendarEntry::from_event(&event, duration) else {
            return vec![Degraded::new(
                SideEffect::CalendarSync,
                &subject,
                format!("calendar entry end overflows: {} + {duration}", event.date),
            )];
        };
        let external_id =
            match tokio::time::timeout(timeout, calendar.create_calendar_event(&entry)).await {
                Ok(Ok(external_id)) => external_id,
                Ok(Err(err)) => {
                    return vec![Degraded::new(SideEffect::CalendarSync, &subject, err)];
                }
                Err(_) => {
                    return vec![Degraded::new(
                        SideEffect::CalendarSync,
                        &subject,
                        format!("calendar call timed out after {timeout:?}"),
                    )];
                }
            };

        let link = CalendarLink {
            external_id: external_id.clone(),
            last_synced: Utc::now(),
        };
        if let Err(err) = store.set_calendar_link(event.id, link).await {
            return vec![Degraded::new(SideEffect::CalendarSync, &subject, err)];
        }
        info!(event = %event.id, %external_id, "event mirrored to calendar");
        Vec::new()
    }
    .boxed()
}

/// Mails every attendee of a new event, one delivery per recipient.
pub(crate) fn mail_event<S, M>(
    store: Arc<S>,
    mailer: Arc<M>,
    event: Event,
    timeout: Duration,
) -> BoxFuture<'static, Vec<Degraded>>
where
    S: UserStore + Send + Sync + 'static,
    M: Mailer + 'static,
{
    async move {
        let subject = format!("event {}", event.id);
        let recipients = match store.find_users(&event.attendees).await {
            Ok(recipients) => recipients,
            Err(err) => return vec![Degraded::new(SideEffect::EventEmail, &subject, err)],
        };
        let mut failures = Vec::new();
        for recipient in &recipients {
            let delivery = mailer.send_event_email(&event, recipient);
            if let Some(failure) =
                deliver(SideEffect::EventEmail, &subject, recipient, timeout, delivery).await
            {
                failures.push(failure);
            }
        }
        debug!(event = %event.id, sent = recipients.len() - failures.len(), "event mail done");
        failures
    }
    .boxed()
}

/// Mails an announcement to its recipients, one delivery per recipient.
pub(crate) fn mail_announcement<S, M>(
    store: Arc<S>,
    mailer: Arc<M>,
    announcement: Announcement,
    timeout: Duration,
) -> BoxFuture<'static, Vec<Degraded>>
where
    S: UserStore + Send + Sync + 'static,
    M: Mailer + 'static,
{
    async move {
        let subject = format!("announcement {}", announcement.id);
        let recipients = match store.find_users(&announcement.recipients).await {
            Ok(recipients) => recipients,
            Err(err) => {
                return vec![Degraded::new(SideEffect::AnnouncementEmail, &subject, err)];
            }
        };
        let mut failures = Vec::new();
        for recipient in &recipients {
            let delivery = mailer.send_announcement_email(&announcement, recipient);
            if let Some(failure) = deliver(
                SideEffect::AnnouncementEmail,
                &subject,
                recipient,
                timeout,
                delivery,
            )
            .await
            {
                failures.push(failure);
            }
        }
        debug!(
            announcement = %announcement.id,
            sent = recipients.len() - failures.len(),
            "announcement mail done"
        );
        failures
    }
    .boxed()
}

async fn deliver(
    effect: SideEffect,
    subject: &str,
    recipient: &User,
    timeout: Duration,
    delivery: impl Future<Output = std::result::Result<(), crate::error::PortError>>,
) -> Option<Degraded> {
    match tokio::time::timeout(timeout, delivery).await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(Degraded::new(effect, subject, err).for_recipient(recipient.id)),
        Err(_) => Some(
            Degraded::new(effect, subject, format!("mail delivery timed out after {timeout:?}"))
                .for_recipient(recipient.id),
        ),
    }
}
