use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{
    Announcement, CalendarLink, Event, EventDetails, Group, Membership, NewAnnouncement, NewEvent,
    NewGroup, NewNotesheet, NewSubgroup, NewTrack, NewUser, Notesheet, Performance, Priority,
    Subgroup, Track, User,
};
use crate::role::Role;
use crate::store::{
    AnnouncementStore, EventStore, GroupStore, MembershipStore, SubgroupStore, TrackStore,
    UserStore,
};
use crate::types::{
    AccessToken, AnnouncementId, EventId, GroupId, NotesheetId, SubgroupId, TrackId, UserId,
};

type StoreResult<T> = std::result::Result<T, StoreError>;

/// In-memory store implementation for tests and demos.
///
/// Every table sits behind one lock, so each trait call is atomic and
/// multi-row writes never become visible half-done.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    users: BTreeMap<UserId, User>,
    groups: BTreeMap<GroupId, Group>,
    memberships: BTreeMap<(GroupId, UserId), Role>,
    subgroups: BTreeMap<SubgroupId, SubgroupRow>,
    subgroup_members: BTreeSet<(SubgroupId, UserId)>,
    tracks: BTreeMap<TrackId, Track>,
    notesheets: BTreeMap<NotesheetId, NotesheetRow>,
    notesheet_subgroups: BTreeSet<(NotesheetId, SubgroupId)>,
    events: BTreeMap<EventId, EventRow>,
    performances: BTreeMap<(EventId, TrackId), DateTime<Utc>>,
    event_attendees: BTreeSet<(EventId, UserId)>,
    calendar_links: HashMap<EventId, CalendarLink>,
    announcements: BTreeMap<AnnouncementId, AnnouncementRow>,
    announcement_recipients: BTreeSet<(AnnouncementId, UserId)>,
    announcement_subgroups: BTreeSet<(AnnouncementId, SubgroupId)>,
}

#[derive(Debug, Clone)]
struct SubgroupRow {
    group: GroupId,
    name: String,
    description: String,
}

#[derive(Debug, Clone)]
struct NotesheetRow {
    track: TrackId,
    instrument: String,
    filepath: String,
}

#[derive(Debug, Clone)]
struct EventRow {
    group: GroupId,
    title: String,
    description: String,
    location: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct AnnouncementRow {
    group: GroupId,
    sender: UserId,
    title: String,
    description: String,
    priority: Priority,
    created_at: DateTime<Utc>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user; emails are unique ignoring case.
    pub fn add_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.inner.write().expect("poisoned lock");
        let email = user.email.trim().to_string();
        if tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&email))
        {
            return Err(StoreError::Conflict(format!("email {email} already registered")));
        }
        let id = UserId::new(tables.next_id());
        let user = User {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            email,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    /// Returns the number of memberships a user holds in a group (0 or 1).
    pub fn membership_count(&self, group: GroupId, user: UserId) -> usize {
        let tables = self.inner.read().expect("poisoned lock");
        usize::from(tables.memberships.contains_key(&(group, user)))
    }

    /// Returns the number of stored announcements.
    pub fn announcement_count(&self) -> usize {
        self.inner.read().expect("poisoned lock").announcements.len()
    }

    /// Returns the number of stored events.
    pub fn event_count(&self) -> usize {
        self.inner.read().expect("poisoned lock").events.len()
    }

    /// Returns the number of events linked to an external calendar.
    pub fn calendar_link_count(&self) -> usize {
        self.inner.read().expect("poisoned lock").calendar_links.len()
    }
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn subgroup(&self, id: SubgroupId) -> Option<Subgroup> {
        let row = self.subgroups.get(&id)?;
        Some(Subgroup {
            id,
            group: row.group,
            name: row.name.clone(),
            description: row.description.clone(),
            members: self
                .subgroup_members
                .iter()
                .filter(|(subgroup, _)| *subgroup == id)
                .map(|(_, user)| *user)
                .collect(),
        })
    }

    fn notesheet(&self, id: NotesheetId) -> Option<Notesheet> {
        let row = self.notesheets.get(&id)?;
        Some(Notesheet {
            id,
            track: row.track,
            instrument: row.instrument.clone(),
            filepath: row.filepath.clone(),
            subgroups: self
                .notesheet_subgroups
                .iter()
                .filter(|(notesheet, _)| *notesheet == id)
                .map(|(_, subgroup)| *subgroup)
                .collect(),
        })
    }

    fn event(&self, id: EventId) -> Option<Event> {
        let row = self.events.get(&id)?;
        Some(Event {
            id,
            group: row.group,
            title: row.title.clone(),
            description: row.description.clone(),
            location: row.location.clone(),
            date: row.date,
            attendees: self
                .event_attendees
                .iter()
                .filter(|(event, _)| *event == id)
                .map(|(_, user)| *user)
                .collect(),
            performances: self
                .performances
                .iter()
                .filter(|((event, _), _)| *event == id)
                .map(|((event, track), start_time)| Performance {
                    event: *event,
                    track: *track,
                    start_time: *start_time,
                })
                .collect(),
            calendar: self.calendar_links.get(&id).cloned(),
        })
    }

    fn announcement(&self, id: AnnouncementId) -> Option<Announcement> {
        let row = self.announcements.get(&id)?;
        Some(Announcement {
            id,
            group: row.group,
            sender: row.sender,
            title: row.title.clone(),
            description: row.description.clone(),
            priority: row.priority,
            recipients: self
                .announcement_recipients
                .iter()
                .filter(|(announcement, _)| *announcement == id)
                .map(|(_, user)| *user)
                .collect(),
            subgroups: self
                .announcement_subgroups
                .iter()
                .filter(|(announcement, _)| *announcement == id)
                .map(|(_, subgroup)| *subgroup)
                .collect(),
            created_at: row.created_at,
        })
    }

    fn ensure_users(&self, users: &[UserId]) -> StoreResult<()> {
        match users.iter().find(|user| !self.users.contains_key(*user)) {
            Some(missing) => Err(StoreError::not_found("user", missing)),
            None => Ok(()),
        }
    }

    fn ensure_tracks(&self, tracks: &[TrackId]) -> StoreResult<()> {
        match tracks.iter().find(|track| !self.tracks.contains_key(*track)) {
            Some(missing) => Err(StoreError::not_found("track", missing)),
            None => Ok(()),
        }
    }

    fn ensure_subgroups(&self, subgroups: &[SubgroupId]) -> StoreResult<()> {
        match subgroups
            .iter()
            .find(|subgroup| !self.subgroups.contains_key(*subgroup))
        {
            Some(missing) => Err(StoreError::not_found("subgroup", missing)),
            None => Ok(()),
        }
    }

    fn ensure_other_manager(&self, group: GroupId, leaving: UserId) -> StoreResult<()> {
        let others = self
            .memberships
            .iter()
            .any(|((owner, user), role)| *owner == group && *user != leaving && role.is_manager());
        if others {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "group {group} must retain at least one manager"
            )))
        }
    }

    fn replace_performances(&mut self, event: EventId, tracks: &[TrackId], start: DateTime<Utc>) {
        self.performances.retain(|(owner, _), _| *owner != event);
        for track in tracks {
            self.performances.insert((event, *track), start);
        }
    }

    fn replace_attendees(&mut self, event: EventId, attendees: &[UserId]) {
        self.event_attendees.retain(|(owner, _)| *owner != event);
        for user in attendees {
            self.event_attendees.insert((event, *user));
        }
    }

    fn drop_subgroup(&mut self, id: SubgroupId) {
        self.subgroups.remove(&id);
        self.subgroup_members.retain(|(subgroup, _)| *subgroup != id);
        self.notesheet_subgroups.retain(|(_, subgroup)| *subgroup != id);
        self.announcement_subgroups
            .retain(|(_, subgroup)| *subgroup != id);
    }

    fn drop_track(&mut self, id: TrackId) {
        self.tracks.remove(&id);
        self.performances.retain(|(_, track), _| *track != id);
        let notesheets: Vec<NotesheetId> = self
            .notesheets
            .iter()
            .filter(|(_, row)| row.track == id)
            .map(|(notesheet, _)| *notesheet)
            .collect();
        for notesheet in notesheets {
            self.notesheets.remove(&notesheet);
            self.notesheet_subgroups
                .retain(|(owner, _)| *owner != notesheet);
        }
    }

    fn drop_event(&mut self, id: EventId) {
        self.events.remove(&id);
        self.performances.retain(|(event, _), _| *event != id);
        self.event_attendees.retain(|(event, _)| *event != id);
        self.calendar_links.remove(&id);
    }

    fn drop_announcement(&mut self, id: AnnouncementId) {
        self.announcements.remove(&id);
        self.announcement_recipients
            .retain(|(announcement, _)| *announcement != id);
        self.announcement_subgroups
            .retain(|(announcement, _)| *announcement != id);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, user: UserId) -> StoreResult<Option<User>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables.users.get(&user).cloned())
    }

    async fn find_users(&self, users: &[UserId]) -> StoreResult<Vec<User>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(users
            .iter()
            .filter_map(|user| tables.users.get(user).cloned())
            .collect())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn membership(&self, group: GroupId, user: UserId) -> StoreResult<Option<Membership>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .memberships
            .get(&(group, user))
            .map(|role| Membership {
                user,
                group,
                role: *role,
            }))
    }

    async fn group_memberships(&self, group: GroupId) -> StoreResult<Vec<Membership>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .memberships
            .iter()
            .filter(|((owner, _), _)| *owner == group)
            .map(|((group, user), role)| Membership {
                user: *user,
                group: *group,
                role: *role,
            })
            .collect())
    }

    async fn user_memberships(&self, user: UserId) -> StoreResult<Vec<Membership>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .memberships
            .iter()
            .filter(|((_, member), _)| *member == user)
            .map(|((group, user), role)| Membership {
                user: *user,
                group: *group,
                role: *role,
            })
            .collect())
    }

    async fn add_membership(&self, membership: Membership) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.groups.contains_key(&membership.group) {
            return Err(StoreError::not_found("group", membership.group));
        }
        tables.ensure_users(&[membership.user])?;
        let key = (membership.group, membership.user);
        if tables.memberships.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "user {} is already a member of group {}",
                membership.user, membership.group
            )));
        }
        tables.memberships.insert(key, membership.role);
        Ok(())
    }

    async fn update_membership_role(
        &self,
        group: GroupId,
        user: UserId,
        role: Role,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        let Some(current) = tables.memberships.get(&(group, user)).copied() else {
            return Err(StoreError::not_found("membership", format!("{group}/{user}")));
        };
        if current.is_manager() && !role.is_manager() {
            tables.ensure_other_manager(group, user)?;
        }
        tables.memberships.insert((group, user), role);
        Ok(())
    }

    async fn remove_membership(&self, group: GroupId, user: UserId) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        match tables.memberships.get(&(group, user)) {
            None => {
                return Err(StoreError::not_found("membership", format!("{group}/{user}")));
            }
            Some(role) if role.is_manager() => tables.ensure_other_manager(group, user)?,
            Some(_) => {}
        }
        tables.memberships.remove(&(group, user));
        let subgroups: BTreeSet<SubgroupId> = tables
            .subgroups
            .iter()
            .filter(|(_, row)| row.group == group)
            .map(|(id, _)| *id)
            .collect();
        tables
            .subgroup_members
            .retain(|(subgroup, member)| !(*member == user && subgroups.contains(subgroup)));
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create_group_with_manager(
        &self,
        group: NewGroup,
        creator: UserId,
    ) -> StoreResult<Group> {
        let mut tables = self.inner.write().expect("poisoned lock");
        tables.ensure_users(&[creator])?;
        if tables
            .groups
            .values()
            .any(|existing| existing.access_token == group.access_token)
        {
            return Err(StoreError::Conflict("access token already in use".to_string()));
        }
        let id = GroupId::new(tables.next_id());
        let group = Group {
            id,
            name: group.name,
            description: group.description,
            access_token: group.access_token,
        };
        tables.groups.insert(id, group.clone());
        tables.memberships.insert((id, creator), Role::Manager);
        Ok(group)
    }

    async fn find_group(&self, group: GroupId) -> StoreResult<Option<Group>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables.groups.get(&group).cloned())
    }

    async fn find_group_by_token(&self, token: &AccessToken) -> StoreResult<Option<Group>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .groups
            .values()
            .find(|group| &group.access_token == token)
            .cloned())
    }

    async fn update_access_token(&self, group: GroupId, token: AccessToken) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if tables
            .groups
            .values()
            .any(|existing| existing.id != group && existing.access_token == token)
        {
            return Err(StoreError::Conflict("access token already in use".to_string()));
        }
        match tables.groups.get_mut(&group) {
            Some(existing) => {
                existing.access_token = token;
                Ok(())
            }
            None => Err(StoreError::not_found("group", group)),
        }
    }

    async fn delete_group(&self, group: GroupId) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if tables.groups.remove(&group).is_none() {
            return Err(StoreError::not_found("group", group));
        }
        tables.memberships.retain(|(owner, _), _| *owner != group);

        let subgroups: Vec<SubgroupId> = tables
            .subgroups
            .iter()
            .filter(|(_, row)| row.group == group)
            .map(|(id, _)| *id)
            .collect();
        for subgroup in subgroups {
            tables.drop_subgroup(subgroup);
        }

        let tracks: Vec<TrackId> = tables
            .tracks
            .values()
            .filter(|track| track.group == group)
            .map(|track| track.id)
            .collect();
        for track in tracks {
            tables.drop_track(track);
        }

        let events: Vec<EventId> = tables
            .events
            .iter()
            .filter(|(_, row)| row.group == group)
            .map(|(id, _)| *id)
            .collect();
        for event in events {
            tables.drop_event(event);
        }

        let announcements: Vec<AnnouncementId> = tables
            .announcements
            .iter()
            .filter(|(_, row)| row.group == group)
            .map(|(id, _)| *id)
            .collect();
        for announcement in announcements {
            tables.drop_announcement(announcement);
        }
        Ok(())
    }
}

#[async_trait]
impl SubgroupStore for MemoryStore {
    async fn create_subgroup(&self, subgroup: NewSubgroup) -> StoreResult<Subgroup> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.groups.contains_key(&subgroup.group) {
            return Err(StoreError::not_found("group", subgroup.group));
        }
        let id = SubgroupId::new(tables.next_id());
        tables.subgroups.insert(
            id,
            SubgroupRow {
                group: subgroup.group,
                name: subgroup.name,
                description: subgroup.description,
            },
        );
        tables
            .subgroup(id)
            .ok_or_else(|| StoreError::not_found("subgroup", id))
    }

    async fn find_subgroup(&self, subgroup: SubgroupId) -> StoreResult<Option<Subgroup>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables.subgroup(subgroup))
    }

    async fn update_subgroup(
        &self,
        subgroup: SubgroupId,
        name: String,
        description: String,
    ) -> StoreResult<Subgroup> {
        let mut tables = self.inner.write().expect("poisoned lock");
        let row = tables
            .subgroups
            .get_mut(&subgroup)
            .ok_or_else(|| StoreError::not_found("subgroup", subgroup))?;
        row.name = name;
        row.description = description;
        tables
            .subgroup(subgroup)
            .ok_or_else(|| StoreError::not_found("subgroup", subgroup))
    }

    async fn delete_subgroup(&self, subgroup: SubgroupId) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.subgroups.contains_key(&subgroup) {
            return Err(StoreError::not_found("subgroup", subgroup));
        }
        tables.drop_subgroup(subgroup);
        Ok(())
    }

    async fn group_subgroups(&self, group: GroupId) -> StoreResult<Vec<Subgroup>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .subgroups
            .iter()
            .filter(|(_, row)| row.group == group)
            .filter_map(|(id, _)| tables.subgroup(*id))
            .collect())
    }

    async fn add_subgroup_members(
        &self,
        subgroup: SubgroupId,
        users: &[UserId],
    ) -> StoreResult<Subgroup> {
        let mut tables = self.inner.write().expect("poisoned lock");
        tables.ensure_subgroups(&[subgroup])?;
        tables.ensure_users(users)?;
        for user in users {
            tables.subgroup_members.insert((subgroup, *user));
        }
        tables
            .subgroup(subgroup)
            .ok_or_else(|| StoreError::not_found("subgroup", subgroup))
    }

    async fn remove_subgroup_member(
        &self,
        subgroup: SubgroupId,
        user: UserId,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.subgroup_members.remove(&(subgroup, user)) {
            return Err(StoreError::not_found(
                "subgroup member",
                format!("{subgroup}/{user}"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn create_track(&self, track: NewTrack) -> StoreResult<Track> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.groups.contains_key(&track.group) {
            return Err(StoreError::not_found("group", track.group));
        }
        let id = TrackId::new(tables.next_id());
        let track = Track {
            id,
            group: track.group,
            name: track.name,
            description: track.description,
        };
        tables.tracks.insert(id, track.clone());
        Ok(track)
    }

    async fn find_track(&self, track: TrackId) -> StoreResult<Option<Track>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables.tracks.get(&track).cloned())
    }

    async fn update_track(
        &self,
        track: TrackId,
        name: String,
        description: String,
    ) -> StoreResult<Track> {
        let mut tables = self.inner.write().expect("poisoned lock");
        let existing = tables
            .tracks
            .get_mut(&track)
            .ok_or_else(|| StoreError::not_found("track", track))?;
        existing.name = name;
        existing.description = description;
        Ok(existing.clone())
    }

    async fn delete_track(&self, track: TrackId) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        tables.ensure_tracks(&[track])?;
        tables.drop_track(track);
        Ok(())
    }

    async fn group_tracks(&self, group: GroupId) -> StoreResult<Vec<Track>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .tracks
            .values()
            .filter(|track| track.group == group)
            .cloned()
            .collect())
    }

    async fn add_notesheet(&self, notesheet: NewNotesheet) -> StoreResult<Notesheet> {
        let mut tables = self.inner.write().expect("poisoned lock");
        tables.ensure_tracks(&[notesheet.track])?;
        tables.ensure_subgroups(&notesheet.subgroups)?;
        let id = NotesheetId::new(tables.next_id());
        tables.notesheets.insert(
            id,
            NotesheetRow {
                track: notesheet.track,
                instrument: notesheet.instrument,
                filepath: notesheet.filepath,
            },
        );
        for subgroup in notesheet.subgroups {
            tables.notesheet_subgroups.insert((id, subgroup));
        }
        tables
            .notesheet(id)
            .ok_or_else(|| StoreError::not_found("notesheet", id))
    }

    async fn find_notesheet(&self, notesheet: NotesheetId) -> StoreResult<Option<Notesheet>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables.notesheet(notesheet))
    }

    async fn track_notesheets(&self, track: TrackId) -> StoreResult<Vec<Notesheet>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .notesheets
            .iter()
            .filter(|(_, row)| row.track == track)
            .filter_map(|(id, _)| tables.notesheet(*id))
            .collect())
    }

    async fn update_notesheet_filepath(
        &self,
        notesheet: NotesheetId,
        filepath: String,
    ) -> StoreResult<Notesheet> {
        let mut tables = self.inner.write().expect("poisoned lock");
        let row = tables
            .notesheets
            .get_mut(&notesheet)
            .ok_or_else(|| StoreError::not_found("notesheet", notesheet))?;
        row.filepath = filepath;
        tables
            .notesheet(notesheet)
            .ok_or_else(|| StoreError::not_found("notesheet", notesheet))
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_event(
        &self,
        event: NewEvent,
        tracks: &[TrackId],
        attendees: &[UserId],
    ) -> StoreResult<Event> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.groups.contains_key(&event.group) {
            return Err(StoreError::not_found("group", event.group));
        }
        tables.ensure_tracks(tracks)?;
        tables.ensure_users(attendees)?;

        let id = EventId::new(tables.next_id());
        let date = event.date;
        tables.events.insert(
            id,
            EventRow {
                group: event.group,
                title: event.title,
                description: event.description,
                location: event.location,
                date,
            },
        );
        tables.replace_performances(id, tracks, date);
        tables.replace_attendees(id, attendees);
        tables
            .event(id)
            .ok_or_else(|| StoreError::not_found("event", id))
    }

    async fn find_event(&self, event: EventId) -> StoreResult<Option<Event>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables.event(event))
    }

    async fn update_event(
        &self,
        event: EventId,
        details: EventDetails,
        tracks: Option<&[TrackId]>,
        attendees: Option<&[UserId]>,
    ) -> StoreResult<Event> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.events.contains_key(&event) {
            return Err(StoreError::not_found("event", event));
        }
        if let Some(tracks) = tracks {
            tables.ensure_tracks(tracks)?;
        }
        if let Some(attendees) = attendees {
            tables.ensure_users(attendees)?;
        }

        let date = details.date;
        if let Some(row) = tables.events.get_mut(&event) {
            row.title = details.title;
            row.description = details.description;
            row.location = details.location;
            row.date = date;
        }
        if let Some(tracks) = tracks {
            tables.replace_performances(event, tracks, date);
        }
        if let Some(attendees) = attendees {
            tables.replace_attendees(event, attendees);
        }
        tables
            .event(event)
            .ok_or_else(|| StoreError::not_found("event", event))
    }

    async fn append_event_tracks(
        &self,
        event: EventId,
        tracks: &[TrackId],
    ) -> StoreResult<Event> {
        let mut tables = self.inner.write().expect("poisoned lock");
        let date = tables
            .events
            .get(&event)
            .map(|row| row.date)
            .ok_or_else(|| StoreError::not_found("event", event))?;
        tables.ensure_tracks(tracks)?;
        for track in tracks {
            tables.performances.entry((event, *track)).or_insert(date);
        }
        tables
            .event(event)
            .ok_or_else(|| StoreError::not_found("event", event))
    }

    async fn delete_event(&self, event: EventId) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.events.contains_key(&event) {
            return Err(StoreError::not_found("event", event));
        }
        tables.drop_event(event);
        Ok(())
    }

    async fn group_events(&self, group: GroupId) -> StoreResult<Vec<Event>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .events
            .iter()
            .filter(|(_, row)| row.group == group)
            .filter_map(|(id, _)| tables.event(*id))
            .collect())
    }

    async fn user_events(&self, user: UserId) -> StoreResult<Vec<Event>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .event_attendees
            .iter()
            .filter(|(_, attendee)| *attendee == user)
            .filter_map(|(event, _)| tables.event(*event))
            .collect())
    }

    async fn set_calendar_link(&self, event: EventId, link: CalendarLink) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.events.contains_key(&event) {
            return Err(StoreError::not_found("event", event));
        }
        tables.calendar_links.insert(event, link);
        Ok(())
    }
}

#[async_trait]
impl AnnouncementStore for MemoryStore {
    async fn create_announcement(
        &self,
        announcement: NewAnnouncement,
        recipients: &[UserId],
        subgroups: &[SubgroupId],
    ) -> StoreResult<Announcement> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.groups.contains_key(&announcement.group) {
            return Err(StoreError::not_found("group", announcement.group));
        }
        tables.ensure_users(recipients)?;
        tables.ensure_subgroups(subgroups)?;

        let id = AnnouncementId::new(tables.next_id());
        tables.announcements.insert(
            id,
            AnnouncementRow {
                group: announcement.group,
                sender: announcement.sender,
                title: announcement.title,
                description: announcement.description,
                priority: announcement.priority,
                created_at: announcement.created_at,
            },
        );
        for user in recipients {
            tables.announcement_recipients.insert((id, *user));
        }
        for subgroup in subgroups {
            tables.announcement_subgroups.insert((id, *subgroup));
        }
        tables
            .announcement(id)
            .ok_or_else(|| StoreError::not_found("announcement", id))
    }

    async fn find_announcement(
        &self,
        announcement: AnnouncementId,
    ) -> StoreResult<Option<Announcement>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables.announcement(announcement))
    }

    async fn delete_announcement(&self, announcement: AnnouncementId) -> StoreResult<()> {
        let mut tables = self.inner.write().expect("poisoned lock");
        if !tables.announcements.contains_key(&announcement) {
            return Err(StoreError::not_found("announcement", announcement));
        }
        tables.drop_announcement(announcement);
        Ok(())
    }

    async fn group_announcements(&self, group: GroupId) -> StoreResult<Vec<Announcement>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .announcements
            .iter()
            .filter(|(_, row)| row.group == group)
            .filter_map(|(id, _)| tables.announcement(*id))
            .collect())
    }

    async fn user_announcements(&self, user: UserId) -> StoreResult<Vec<Announcement>> {
        let tables = self.inner.read().expect("poisoned lock");
        Ok(tables
            .announcement_recipients
            .iter()
            .filter(|(_, recipient)| *recipient == user)
            .filter_map(|(announcement, _)| tables.announcement(*announcement))
            .collect())
    }
}
