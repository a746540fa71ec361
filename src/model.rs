//! Entities persisted through the [`Store`](crate::Store) traits.
//!
//! Relations between entities are stored as key lists (`Vec<UserId>`,
//! `Vec<Performance>`) rather than object references; the store owns the
//! join rows and resolves them on read.

use crate::role::Role;
use crate::types::{
    AccessToken, AnnouncementId, EventId, ExternalEventId, GroupId, NotesheetId, SubgroupId,
    TrackId, UserId,
};
use chrono::{DateTime, Utc};

/// A registered user. Credentials live outside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Fields required to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A band.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub access_token: AccessToken,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub access_token: AccessToken,
}

/// The `(user, group) -> role` relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Membership {
    pub user: UserId,
    pub group: GroupId,
    pub role: Role,
}

/// Named subset of a group's members.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Subgroup {
    pub id: SubgroupId,
    pub group: GroupId,
    pub name: String,
    pub description: String,
    pub members: Vec<UserId>,
}

#[derive(Debug, Clone)]
pub struct NewSubgroup {
    pub group: GroupId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    pub id: TrackId,
    pub group: GroupId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewTrack {
    pub group: GroupId,
    pub name: String,
    pub description: String,
}

/// Sheet music for one instrument of a track.
///
/// An empty `subgroups` list means every group member may see it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Notesheet {
    pub id: NotesheetId,
    pub track: TrackId,
    pub instrument: String,
    pub filepath: String,
    pub subgroups: Vec<SubgroupId>,
}

#[derive(Debug, Clone)]
pub struct NewNotesheet {
    pub track: TrackId,
    pub instrument: String,
    pub filepath: String,
    pub subgroups: Vec<SubgroupId>,
}

/// A track scheduled within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Performance {
    pub event: EventId,
    pub track: TrackId,
    pub start_time: DateTime<Utc>,
}

/// Link between an event and its mirrored external calendar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalendarLink {
    pub external_id: ExternalEventId,
    pub last_synced: DateTime<Utc>,
}

/// A concert, rehearsal or any other dated gathering of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub id: EventId,
    pub group: GroupId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub attendees: Vec<UserId>,
    pub performances: Vec<Performance>,
    pub calendar: Option<CalendarLink>,
}

impl Event {
    /// Returns the ids of the tracks performed at this event.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.performances.iter().map(|p| p.track).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub group: GroupId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
}

/// Basic event fields replaced on update.
#[derive(Debug, Clone)]
pub struct EventDetails {
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
}

/// Announcement urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Priority {
    Normal,
    Important,
    Urgent,
}

impl Priority {
    /// Maps a numeric level: `<= 1` normal, `2` important, `>= 3` urgent.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => Self::Normal,
            2 => Self::Important,
            _ => Self::Urgent,
        }
    }
}

/// A message from a member to some or all of the group.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Announcement {
    pub id: AnnouncementId,
    pub group: GroupId,
    pub sender: UserId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub recipients: Vec<UserId>,
    pub subgroups: Vec<SubgroupId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub group: GroupId,
    pub sender: UserId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Group details as seen by one member.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupInfo {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    /// Present only when the viewer is a manager.
    pub access_token: Option<AccessToken>,
}

/// Result of joining a group through its token.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JoinedGroup {
    pub group: GroupId,
    pub name: String,
    pub role: Role,
}

/// A group member with their role.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemberInfo {
    pub user: User,
    pub role: Role,
}

/// A group the user belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserGroup {
    pub group: GroupId,
    pub name: String,
    pub description: String,
    pub role: Role,
    pub member_count: usize,
}
