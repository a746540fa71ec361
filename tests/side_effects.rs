#![cfg(feature = "memory-store")]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rs_band::{
    Announcement, AnnouncementDraft, AnnouncementTarget, CalendarEntry, CalendarSync, EngineBuilder,
    EngineConfig, Event, EventDraft, EventStore, ExternalEventId, GroupId, Mailer, MemoryStore,
    NewUser, Outcome, PortError, Priority, Role, SideEffect, User, UserId,
};
use tokio::sync::broadcast;

#[derive(Clone, Default)]
struct RecordingCalendar {
    entries: Arc<Mutex<Vec<CalendarEntry>>>,
}

#[async_trait]
impl CalendarSync for RecordingCalendar {
    async fn create_calendar_event(
        &self,
        entry: &CalendarEntry,
    ) -> Result<ExternalEventId, PortError> {
        let mut entries = self.entries.lock().unwrap();
        entries.push(entry.clone());
        Ok(ExternalEventId::from(format!("cal-{}", entries.len())))
    }
}

struct FailingCalendar;

#[async_trait]
impl CalendarSync for FailingCalendar {
    async fn create_calendar_event(
        &self,
        _entry: &CalendarEntry,
    ) -> Result<ExternalEventId, PortError> {
        Err("calendar quota exceeded".into())
    }
}

struct SlowCalendar;

#[async_trait]
impl CalendarSync for SlowCalendar {
    async fn create_calendar_event(
        &self,
        _entry: &CalendarEntry,
    ) -> Result<ExternalEventId, PortError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ExternalEventId::from("late".to_string()))
    }
}

/// Records deliveries and refuses mail for the addresses in `bounce`.
#[derive(Clone, Default)]
struct RecordingMailer {
    sent: Arc<Mutex<Vec<(SideEffect, UserId)>>>,
    bounce: Arc<HashSet<String>>,
}

impl RecordingMailer {
    fn bouncing(emails: &[&str]) -> Self {
        Self {
            bounce: Arc::new(emails.iter().map(|email| email.to_string()).collect()),
            ..Self::default()
        }
    }

    fn deliver(&self, effect: SideEffect, recipient: &User) -> Result<(), PortError> {
        if self.bounce.contains(&recipient.email) {
            return Err(format!("mailbox {} unavailable", recipient.email).into());
        }
        self.sent.lock().unwrap().push((effect, recipient.id));
        Ok(())
    }

    fn recipients(&self, effect: SideEffect) -> Vec<UserId> {
        let mut recipients: Vec<UserId> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == effect)
            .map(|(_, user)| *user)
            .collect();
        recipients.sort();
        recipients
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_event_email(&self, _event: &Event, recipient: &User) -> Result<(), PortError> {
        self.deliver(SideEffect::EventEmail, recipient)
    }

    async fn send_announcement_email(
        &self,
        _announcement: &Announcement,
        recipient: &User,
    ) -> Result<(), PortError> {
        self.deliver(SideEffect::AnnouncementEmail, recipient)
    }
}

fn add_user(store: &MemoryStore, name: &str) -> UserId {
    store
        .add_user(NewUser {
            first_name: name.to_string(),
            last_name: "Player".to_string(),
            email: format!("{name}@example.com"),
        })
        .unwrap()
        .id
}

fn rehearsal(group: GroupId) -> EventDraft {
    EventDraft {
        group,
        title: "Rehearsal".to_string(),
        description: String::new(),
        location: "Music school".to_string(),
        date: Utc.with_ymd_and_hms(2026, 3, 12, 19, 0, 0).unwrap(),
        tracks: Vec::new(),
        attendees: Vec::new(),
    }
}

fn drain(outcomes: &mut broadcast::Receiver<Outcome>) -> Vec<Outcome> {
    let mut drained = Vec::new();
    while let Ok(outcome) = outcomes.try_recv() {
        drained.push(outcome);
    }
    drained
}

#[tokio::test]
async fn created_event_should_be_mirrored_and_mailed() {
    let calendar = RecordingCalendar::default();
    let mailer = RecordingMailer::default();
    let engine = EngineBuilder::new(MemoryStore::new())
        .calendar(calendar.clone())
        .mailer(mailer.clone())
        .build()
        .unwrap();
    let store = Arc::clone(engine.store());
    let maria = add_user(&store, "maria");
    let anna = add_user(&store, "anna");
    let group = engine
        .groups()
        .create_group("Brass Band", "", maria)
        .await
        .unwrap();
    engine
        .groups()
        .join_group(anna, &group.access_token)
        .await
        .unwrap();

    let event = engine
        .events()
        .create_event(maria, rehearsal(group.id))
        .await
        .unwrap();
    engine.shutdown().await;

    let entries = calendar.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, event.id);
    assert_eq!(entries[0].end - entries[0].start, chrono::Duration::hours(2));

    let stored = store.find_event(event.id).await.unwrap().unwrap();
    let link = stored.calendar.expect("calendar link");
    assert_eq!(link.external_id.as_str(), "cal-1");

    assert_eq!(mailer.recipients(SideEffect::EventEmail), vec![maria, anna]);
}

#[tokio::test]
async fn failing_ports_should_degrade_without_affecting_the_event() {
    let mailer = RecordingMailer::bouncing(&["anna@example.com"]);
    let engine = EngineBuilder::new(MemoryStore::new())
        .calendar(FailingCalendar)
        .mailer(mailer.clone())
        .build()
        .unwrap();
    let mut outcomes = engine.subscribe();
    let store = Arc::clone(engine.store());
    let maria = add_user(&store, "maria");
    let anna = add_user(&store, "anna");
    let group = engine
        .groups()
        .create_group("Brass Band", "", maria)
        .await
        .unwrap();
    engine
        .groups()
        .join_group(anna, &group.access_token)
        .await
        .unwrap();

    let event = engine
        .events()
        .create_event(maria, rehearsal(group.id))
        .await
        .expect("event survives side-effect failures");
    engine.shutdown().await;

    let degraded: Vec<_> = drain(&mut outcomes)
        .into_iter()
        .filter_map(|outcome| match outcome {
            Outcome::Degraded(failure) => Some(failure),
            _ => None,
        })
        .collect();
    assert_eq!(degraded.len(), 2);
    assert!(degraded.iter().any(|failure| {
        failure.effect == SideEffect::CalendarSync
            && failure.reason.contains("quota")
            && failure.recipient.is_none()
    }));
    assert!(degraded.iter().any(|failure| {
        failure.effect == SideEffect::EventEmail && failure.recipient == Some(anna)
    }));

    assert_eq!(mailer.recipients(SideEffect::EventEmail), vec![maria]);
    let stored = store.find_event(event.id).await.unwrap().unwrap();
    assert!(stored.calendar.is_none());
    assert_eq!(stored.attendees.len(), 2);
}

#[tokio::test]
async fn slow_calendar_should_time_out() {
    let config = EngineConfig::default().calendar_timeout(Duration::from_millis(50));
    let engine = EngineBuilder::new(MemoryStore::new())
        .calendar(SlowCalendar)
        .config(config)
        .build()
        .unwrap();
    let mut outcomes = engine.subscribe();
    let maria = add_user(engine.store(), "maria");
    let group = engine
        .groups()
        .create_group("Brass Band", "", maria)
        .await
        .unwrap();

    engine
        .events()
        .create_event(maria, rehearsal(group.id))
        .await
        .unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .expect("outcome before the provider answers")
        .unwrap();

    match outcome {
        Outcome::Degraded(failure) => {
            assert_eq!(failure.effect, SideEffect::CalendarSync);
            assert!(failure.reason.contains("timed out"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(engine.stats().degraded, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn announcement_should_mail_each_recipient() {
    let mailer = RecordingMailer::default();
    let engine = EngineBuilder::new(MemoryStore::new())
        .mailer(mailer.clone())
        .build()
        .unwrap();
    let maria = add_user(engine.store(), "maria");
    let anna = add_user(engine.store(), "anna");
    let piotr = add_user(engine.store(), "piotr");
    let group = engine
        .groups()
        .create_group("Brass Band", "", maria)
        .await
        .unwrap();
    for user in [anna, piotr] {
        engine
            .groups()
            .join_group(user, &group.access_token)
            .await
            .unwrap();
    }

    engine
        .announcements()
        .create_announcement(
            maria,
            group.id,
            AnnouncementDraft {
                title: "Uniform fitting".to_string(),
                description: "Saturday 10:00".to_string(),
                priority: Priority::Normal,
                target: AnnouncementTarget::Users(vec![anna, piotr]),
            },
        )
        .await
        .unwrap();
    let stats_before = engine.stats();
    engine.shutdown().await;

    assert_eq!(stats_before.submitted, 1);
    assert_eq!(
        mailer.recipients(SideEffect::AnnouncementEmail),
        vec![anna, piotr]
    );
}

#[tokio::test]
async fn full_queue_should_drop_side_effects_but_keep_events() {
    let config = EngineConfig::default().workers(1).queue_capacity(1);
    let engine = EngineBuilder::new(MemoryStore::new())
        .calendar(SlowCalendar)
        .config(config.calendar_timeout(Duration::from_secs(30)))
        .build()
        .unwrap();
    let maria = add_user(engine.store(), "maria");
    let group = engine
        .groups()
        .create_group("Brass Band", "", maria)
        .await
        .unwrap();

    for _ in 0..4 {
        engine
            .events()
            .create_event(maria, rehearsal(group.id))
            .await
            .unwrap();
    }

    let stats = engine.stats();
    assert_eq!(engine.store().event_count(), 4);
    assert_eq!(stats.submitted, 4);
    assert!(stats.dropped >= 2, "dropped {}", stats.dropped);
}

#[tokio::test]
async fn deleted_event_should_lose_its_calendar_link() {
    let engine = EngineBuilder::new(MemoryStore::new())
        .calendar(RecordingCalendar::default())
        .build()
        .unwrap();
    let mut outcomes = engine.subscribe();
    let store = Arc::clone(engine.store());
    let maria = add_user(&store, "maria");
    let anna = add_user(&store, "anna");
    let group = engine
        .groups()
        .create_group("Brass Band", "", maria)
        .await
        .unwrap();
    engine
        .groups()
        .join_group(anna, &group.access_token)
        .await
        .unwrap();
    let event = engine
        .events()
        .create_event(maria, rehearsal(group.id))
        .await
        .unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .expect("calendar sync finishes")
        .unwrap();
    assert!(matches!(outcome, Outcome::Completed { .. }), "{outcome:?}");
    assert_eq!(store.calendar_link_count(), 1);

    let err = engine
        .events()
        .delete_event(anna, event.id)
        .await
        .expect_err("plain member");
    assert_eq!(err.code(), "denied");
    assert_eq!(store.event_count(), 1);

    engine
        .groups()
        .update_member_role(maria, group.id, anna, Role::Moderator)
        .await
        .unwrap();
    engine.events().delete_event(anna, event.id).await.unwrap();

    let err = engine
        .events()
        .get_event(maria, event.id)
        .await
        .expect_err("deleted");
    assert_eq!(err.code(), "not_found");
    assert!(engine.events().user_events(anna).await.unwrap().is_empty());
    assert!(engine.events().user_events(maria).await.unwrap().is_empty());
    assert!(store.find_event(event.id).await.unwrap().is_none());
    assert_eq!(store.calendar_link_count(), 0);
    engine.shutdown().await;
}
