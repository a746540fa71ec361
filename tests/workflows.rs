#![cfg(feature = "memory-store")]

use chrono::{TimeZone, Utc};
use rs_band::{
    AnnouncementDraft, AnnouncementTarget, DenyReason, Engine, EngineBuilder, Error, EventDraft,
    EventUpdate, GroupId, MemoryStore, NewUser, Priority, Role, TrackId, UserId,
};

fn add_user(engine: &Engine<MemoryStore>, name: &str) -> UserId {
    engine
        .store()
        .add_user(NewUser {
            first_name: name.to_string(),
            last_name: "Player".to_string(),
            email: format!("{name}@example.com"),
        })
        .unwrap()
        .id
}

fn draft(group: GroupId, tracks: Vec<TrackId>, attendees: Vec<UserId>) -> EventDraft {
    EventDraft {
        group,
        title: "Spring concert".to_string(),
        description: "Season opener".to_string(),
        location: "Town hall".to_string(),
        date: Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).unwrap(),
        tracks,
        attendees,
    }
}

fn update_from(event: &rs_band::Event) -> EventUpdate {
    EventUpdate {
        title: event.title.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        date: event.date,
        tracks: None,
        attendees: None,
    }
}

struct Band {
    engine: Engine<MemoryStore>,
    group: GroupId,
    manager: UserId,
    member: UserId,
}

async fn band() -> Band {
    let engine = EngineBuilder::new(MemoryStore::new()).build().unwrap();
    let manager = add_user(&engine, "maria");
    let member = add_user(&engine, "anna");
    let group = engine
        .groups()
        .create_group("Brass Band", "Village brass band", manager)
        .await
        .unwrap();
    engine
        .groups()
        .join_group(member, &group.access_token)
        .await
        .unwrap();
    Band {
        engine,
        group: group.id,
        manager,
        member,
    }
}

#[tokio::test]
async fn band_lifecycle_should_keep_event_when_track_is_deleted() {
    let engine = EngineBuilder::new(MemoryStore::new()).build().unwrap();
    let maria = add_user(&engine, "maria");
    let anna = add_user(&engine, "anna");

    let group = engine
        .groups()
        .create_group("Brass Band", "", maria)
        .await
        .unwrap();
    let info = engine.groups().get_group_info(maria, group.id).await.unwrap();
    assert_eq!(info.access_token, Some(group.access_token.clone()));

    let joined = engine
        .groups()
        .join_group(anna, &group.access_token)
        .await
        .unwrap();
    assert_eq!(joined.role, Role::Member);
    let info = engine.groups().get_group_info(anna, group.id).await.unwrap();
    assert_eq!(info.access_token, None);

    let march = engine
        .tracks()
        .create_track(maria, group.id, "Radetzky March", "")
        .await
        .unwrap();
    let event = engine
        .events()
        .create_event(maria, draft(group.id, vec![march.id], Vec::new()))
        .await
        .unwrap();
    let mut attendees = event.attendees.clone();
    attendees.sort();
    assert_eq!(attendees, vec![maria, anna]);
    assert_eq!(event.track_ids(), vec![march.id]);
    assert_eq!(event.performances[0].start_time, event.date);

    engine.tracks().delete_track(maria, march.id).await.unwrap();

    let event = engine.events().get_event(anna, event.id).await.unwrap();
    assert!(event.performances.is_empty());
    assert_eq!(event.attendees.len(), 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn second_join_should_conflict() {
    let band = band().await;
    let info = band
        .engine
        .groups()
        .get_group_info(band.manager, band.group)
        .await
        .unwrap();
    let token = info.access_token.unwrap();

    let err = band
        .engine
        .groups()
        .join_group(band.member, &token)
        .await
        .expect_err("already a member");

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(band.engine.store().membership_count(band.group, band.member), 1);
}

#[tokio::test]
async fn non_member_announcement_should_be_denied_without_rows() {
    let band = band().await;
    let outsider = add_user(&band.engine, "zoe");

    let err = band
        .engine
        .announcements()
        .create_announcement(
            outsider,
            band.group,
            AnnouncementDraft {
                title: "Free tickets".to_string(),
                description: String::new(),
                priority: Priority::Normal,
                target: AnnouncementTarget::AllMembers,
            },
        )
        .await
        .expect_err("outsider");

    assert!(matches!(err, Error::Denied(DenyReason::NotMember)));
    assert_eq!(band.engine.store().announcement_count(), 0);
}

#[tokio::test]
async fn member_should_not_create_event() {
    let band = band().await;
    let err = band
        .engine
        .events()
        .create_event(band.member, draft(band.group, Vec::new(), Vec::new()))
        .await
        .expect_err("member");
    assert!(matches!(
        err,
        Error::Denied(DenyReason::InsufficientRole {
            required: Role::Moderator,
            actual: Role::Member,
        })
    ));
    assert_eq!(band.engine.store().event_count(), 0);
}

#[tokio::test]
async fn foreign_track_should_abort_creation_without_rows() {
    let band = band().await;
    let other = band
        .engine
        .groups()
        .create_group("Strings", "", band.manager)
        .await
        .unwrap();
    let foreign = band
        .engine
        .tracks()
        .create_track(band.manager, other.id, "Adagio", "")
        .await
        .unwrap();

    let err = band
        .engine
        .events()
        .create_event(band.manager, draft(band.group, vec![foreign.id], Vec::new()))
        .await
        .expect_err("foreign track");

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(band.engine.store().event_count(), 0);
}

#[tokio::test]
async fn attach_tracks_should_leave_event_unchanged_on_foreign_track() {
    let band = band().await;
    let own = band
        .engine
        .tracks()
        .create_track(band.manager, band.group, "March", "")
        .await
        .unwrap();
    let other = band
        .engine
        .groups()
        .create_group("Strings", "", band.manager)
        .await
        .unwrap();
    let foreign = band
        .engine
        .tracks()
        .create_track(band.manager, other.id, "Adagio", "")
        .await
        .unwrap();
    let event = band
        .engine
        .events()
        .create_event(band.manager, draft(band.group, Vec::new(), Vec::new()))
        .await
        .unwrap();

    let err = band
        .engine
        .events()
        .attach_tracks(band.manager, event.id, &[own.id, foreign.id])
        .await
        .expect_err("foreign track");
    assert!(matches!(err, Error::Conflict(_)));
    let unchanged = band
        .engine
        .events()
        .get_event(band.member, event.id)
        .await
        .unwrap();
    assert!(unchanged.performances.is_empty());

    let attached = band
        .engine
        .events()
        .attach_tracks(band.manager, event.id, &[own.id, own.id])
        .await
        .unwrap();
    assert_eq!(attached.track_ids(), vec![own.id]);
}

#[tokio::test]
async fn explicit_attendees_must_be_members() {
    let band = band().await;
    let outsider = add_user(&band.engine, "zoe");

    let err = band
        .engine
        .events()
        .create_event(
            band.manager,
            draft(band.group, Vec::new(), vec![band.member, outsider]),
        )
        .await
        .expect_err("outsider attendee");
    assert!(matches!(err, Error::Conflict(_)));

    let event = band
        .engine
        .events()
        .create_event(
            band.manager,
            draft(band.group, Vec::new(), vec![band.member, band.member]),
        )
        .await
        .unwrap();
    assert_eq!(event.attendees, vec![band.member]);
}

#[tokio::test]
async fn update_should_distinguish_absent_from_empty_lists() {
    let band = band().await;
    let march = band
        .engine
        .tracks()
        .create_track(band.manager, band.group, "March", "")
        .await
        .unwrap();
    let event = band
        .engine
        .events()
        .create_event(band.manager, draft(band.group, vec![march.id], Vec::new()))
        .await
        .unwrap();

    let mut update = update_from(&event);
    update.title = "Spring gala".to_string();
    let kept = band
        .engine
        .events()
        .update_event(band.manager, event.id, update)
        .await
        .unwrap();
    assert_eq!(kept.title, "Spring gala");
    assert_eq!(kept.track_ids(), vec![march.id]);
    assert_eq!(kept.attendees.len(), 2);

    let mut update = update_from(&kept);
    update.tracks = Some(Vec::new());
    update.attendees = Some(vec![band.member]);
    let cleared = band
        .engine
        .events()
        .update_event(band.manager, event.id, update)
        .await
        .unwrap();
    assert!(cleared.performances.is_empty());
    assert_eq!(cleared.attendees, vec![band.member]);
}

#[tokio::test]
async fn moderator_rights_should_follow_role_changes() {
    let band = band().await;
    let err = band
        .engine
        .tracks()
        .create_track(band.member, band.group, "March", "")
        .await
        .expect_err("member");
    assert_eq!(err.code(), "denied");

    band.engine
        .groups()
        .update_member_role(band.manager, band.group, band.member, Role::Moderator)
        .await
        .unwrap();
    band.engine
        .tracks()
        .create_track(band.member, band.group, "March", "")
        .await
        .unwrap();

    let err = band
        .engine
        .groups()
        .refresh_access_token(band.member, band.group)
        .await
        .expect_err("moderator");
    assert_eq!(err.code(), "denied");
}

#[tokio::test]
async fn subgroup_announcement_should_reach_union_of_members() {
    let band = band().await;
    let piotr = add_user(&band.engine, "piotr");
    let info = band
        .engine
        .groups()
        .get_group_info(band.manager, band.group)
        .await
        .unwrap();
    band.engine
        .groups()
        .join_group(piotr, &info.access_token.unwrap())
        .await
        .unwrap();
    let horns = band
        .engine
        .subgroups()
        .create_subgroup(band.manager, band.group, "Horns", "")
        .await
        .unwrap();
    let drums = band
        .engine
        .subgroups()
        .create_subgroup(band.manager, band.group, "Drums", "")
        .await
        .unwrap();
    band.engine
        .subgroups()
        .add_subgroup_members(band.manager, horns.id, &[band.member])
        .await
        .unwrap();
    band.engine
        .subgroups()
        .add_subgroup_members(band.manager, drums.id, &[band.member, piotr])
        .await
        .unwrap();

    let announcement = band
        .engine
        .announcements()
        .create_announcement(
            band.manager,
            band.group,
            AnnouncementDraft {
                title: "Sectional".to_string(),
                description: "Bring mutes".to_string(),
                priority: Priority::from_level(2),
                target: AnnouncementTarget::Subgroups(vec![horns.id, drums.id]),
            },
        )
        .await
        .unwrap();

    let mut recipients = announcement.recipients.clone();
    recipients.sort();
    assert_eq!(recipients, vec![band.member, piotr]);
    assert_eq!(announcement.priority, Priority::Important);
    assert_eq!(
        band.engine
            .announcements()
            .user_announcements(piotr)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(
        band.engine
            .announcements()
            .user_announcements(band.manager)
            .await
            .unwrap()
            .is_empty()
    );

    let err = band
        .engine
        .announcements()
        .create_announcement(
            band.manager,
            band.group,
            AnnouncementDraft {
                title: "Nobody".to_string(),
                description: String::new(),
                priority: Priority::Normal,
                target: AnnouncementTarget::Subgroups(Vec::new()),
            },
        )
        .await
        .expect_err("empty subgroups");
    assert!(matches!(err, Error::Invalid(_)));
}

#[tokio::test]
async fn announcement_sender_may_delete_after_demotion() {
    let band = band().await;
    let piotr = add_user(&band.engine, "piotr");
    let info = band
        .engine
        .groups()
        .get_group_info(band.manager, band.group)
        .await
        .unwrap();
    band.engine
        .groups()
        .join_group(piotr, &info.access_token.unwrap())
        .await
        .unwrap();
    band.engine
        .groups()
        .update_member_role(band.manager, band.group, band.member, Role::Moderator)
        .await
        .unwrap();
    let announcement = band
        .engine
        .announcements()
        .create_announcement(
            band.member,
            band.group,
            AnnouncementDraft {
                title: "Rehearsal moved".to_string(),
                description: String::new(),
                priority: Priority::Urgent,
                target: AnnouncementTarget::Users(Vec::new()),
            },
        )
        .await
        .unwrap();
    assert_eq!(announcement.recipients.len(), 3);
    band.engine
        .groups()
        .update_member_role(band.manager, band.group, band.member, Role::Member)
        .await
        .unwrap();

    let err = band
        .engine
        .announcements()
        .delete_announcement(piotr, announcement.id)
        .await
        .expect_err("other member");
    assert_eq!(err.code(), "denied");

    band.engine
        .announcements()
        .delete_announcement(band.member, announcement.id)
        .await
        .unwrap();
    assert_eq!(band.engine.store().announcement_count(), 0);
}

#[tokio::test]
async fn deleting_group_should_remove_owned_entities() {
    let band = band().await;
    band.engine
        .events()
        .create_event(band.manager, draft(band.group, Vec::new(), Vec::new()))
        .await
        .unwrap();

    let err = band
        .engine
        .groups()
        .delete_group(band.member, band.group)
        .await
        .expect_err("member");
    assert_eq!(err.code(), "denied");

    band.engine
        .groups()
        .delete_group(band.manager, band.group)
        .await
        .unwrap();
    assert_eq!(band.engine.store().event_count(), 0);
    assert!(
        band.engine
            .groups()
            .user_groups(band.member)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(band.engine.events().user_events(band.member).await.unwrap().is_empty());
}
