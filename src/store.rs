use crate::error::StoreError;
use crate::model::{
    Announcement, CalendarLink, Event, EventDetails, Group, Membership, NewAnnouncement, NewEvent,
    NewGroup, NewNotesheet, NewSubgroup, NewTrack, Notesheet, Subgroup, Track, User,
};
use crate::role::Role;
use crate::types::{
    AccessToken, AnnouncementId, EventId, GroupId, NotesheetId, SubgroupId, TrackId, UserId,
};
use async_trait::async_trait;

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store interface for users.
#[async_trait]
pub trait UserStore {
    /// Returns a user by id.
    async fn find_user(&self, user: UserId) -> StoreResult<Option<User>>;

    /// Returns the users that exist among `users`, in input order.
    async fn find_users(&self, users: &[UserId]) -> StoreResult<Vec<User>>;
}

/// Store interface for the `(user, group) -> role` relation.
#[async_trait]
pub trait MembershipStore {
    /// Returns the membership of a user in a group.
    async fn membership(&self, group: GroupId, user: UserId) -> StoreResult<Option<Membership>>;

    /// Returns every membership of a group.
    async fn group_memberships(&self, group: GroupId) -> StoreResult<Vec<Membership>>;

    /// Returns every membership of a user.
    async fn user_memberships(&self, user: UserId) -> StoreResult<Vec<Membership>>;

    /// Inserts a membership; a duplicate `(user, group)` key is a `Conflict`.
    async fn add_membership(&self, membership: Membership) -> StoreResult<()>;

    /// Changes the role of an existing membership.
    ///
    /// Demoting the group's only manager is a `Conflict`. The check and the
    /// write must be atomic.
    async fn update_membership_role(
        &self,
        group: GroupId,
        user: UserId,
        role: Role,
    ) -> StoreResult<()>;

    /// Deletes a membership together with the user's subgroup memberships in
    /// that group. Removing the only manager is a `Conflict`, checked
    /// atomically with the delete.
    async fn remove_membership(&self, group: GroupId, user: UserId) -> StoreResult<()>;
}

/// Store interface for groups.
#[async_trait]
pub trait GroupStore {
    /// Inserts a group and grants `creator` the manager role atomically.
    async fn create_group_with_manager(
        &self,
        group: NewGroup,
        creator: UserId,
    ) -> StoreResult<Group>;

    async fn find_group(&self, group: GroupId) -> StoreResult<Option<Group>>;

    async fn find_group_by_token(&self, token: &AccessToken) -> StoreResult<Option<Group>>;

    /// Replaces the access token; tokens are unique across groups.
    async fn update_access_token(&self, group: GroupId, token: AccessToken) -> StoreResult<()>;

    /// Deletes a group and everything it owns.
    async fn delete_group(&self, group: GroupId) -> StoreResult<()>;
}

/// Store interface for subgroups.
#[async_trait]
pub trait SubgroupStore {
    async fn create_subgroup(&self, subgroup: NewSubgroup) -> StoreResult<Subgroup>;

    async fn find_subgroup(&self, subgroup: SubgroupId) -> StoreResult<Option<Subgroup>>;

    async fn update_subgroup(
        &self,
        subgroup: SubgroupId,
        name: String,
        description: String,
    ) -> StoreResult<Subgroup>;

    /// Deletes a subgroup and its member, notesheet and announcement rows.
    async fn delete_subgroup(&self, subgroup: SubgroupId) -> StoreResult<()>;

    async fn group_subgroups(&self, group: GroupId) -> StoreResult<Vec<Subgroup>>;

    /// Appends members in one call; existing members are kept once.
    async fn add_subgroup_members(
        &self,
        subgroup: SubgroupId,
        users: &[UserId],
    ) -> StoreResult<Subgroup>;

    async fn remove_subgroup_member(&self, subgroup: SubgroupId, user: UserId)
    -> StoreResult<()>;
}

/// Store interface for tracks and their notesheets.
#[async_trait]
pub trait TrackStore {
    async fn create_track(&self, track: NewTrack) -> StoreResult<Track>;

    async fn find_track(&self, track: TrackId) -> StoreResult<Option<Track>>;

    async fn update_track(
        &self,
        track: TrackId,
        name: String,
        description: String,
    ) -> StoreResult<Track>;

    /// Deletes a track, its notesheets and every performance of it. Events
    /// that featured the track are kept.
    async fn delete_track(&self, track: TrackId) -> StoreResult<()>;

    async fn group_tracks(&self, group: GroupId) -> StoreResult<Vec<Track>>;

    /// Inserts a notesheet with its subgroup associations.
    async fn add_notesheet(&self, notesheet: NewNotesheet) -> StoreResult<Notesheet>;

    async fn find_notesheet(&self, notesheet: NotesheetId) -> StoreResult<Option<Notesheet>>;

    async fn track_notesheets(&self, track: TrackId) -> StoreResult<Vec<Notesheet>>;

    async fn update_notesheet_filepath(
        &self,
        notesheet: NotesheetId,
        filepath: String,
    ) -> StoreResult<Notesheet>;
}

/// Store interface for events.
///
/// Creation and update commit the event row together with its relations, so
/// a failure leaves no partial event behind.
#[async_trait]
pub trait EventStore {
    /// Inserts an event with its performances and attendees atomically.
    async fn create_event(
        &self,
        event: NewEvent,
        tracks: &[TrackId],
        attendees: &[UserId],
    ) -> StoreResult<Event>;

    async fn find_event(&self, event: EventId) -> StoreResult<Option<Event>>;

    /// Replaces basic fields and, when given, the track and attendee lists
    /// atomically. `None` leaves a relation untouched.
    async fn update_event(
        &self,
        event: EventId,
        details: EventDetails,
        tracks: Option<&[TrackId]>,
        attendees: Option<&[UserId]>,
    ) -> StoreResult<Event>;

    /// Appends performances in one call; tracks already performed are kept once.
    async fn append_event_tracks(&self, event: EventId, tracks: &[TrackId])
    -> StoreResult<Event>;

    /// Deletes an event with its performances, attendees and calendar link.
    async fn delete_event(&self, event: EventId) -> StoreResult<()>;

    async fn group_events(&self, group: GroupId) -> StoreResult<Vec<Event>>;

    async fn user_events(&self, user: UserId) -> StoreResult<Vec<Event>>;

    async fn set_calendar_link(&self, event: EventId, link: CalendarLink) -> StoreResult<()>;
}

/// Store interface for announcements.
#[async_trait]
pub trait AnnouncementStore {
    /// Inserts an announcement with its recipient and subgroup rows atomically.
    async fn create_announcement(
        &self,
        announcement: NewAnnouncement,
        recipients: &[UserId],
        subgroups: &[SubgroupId],
    ) -> StoreResult<Announcement>;

    async fn find_announcement(
        &self,
        announcement: AnnouncementId,
    ) -> StoreResult<Option<Announcement>>;

    async fn delete_announcement(&self, announcement: AnnouncementId) -> StoreResult<()>;

    async fn group_announcements(&self, group: GroupId) -> StoreResult<Vec<Announcement>>;

    async fn user_announcements(&self, user: UserId) -> StoreResult<Vec<Announcement>>;
}

/// Composite store trait.
pub trait Store:
    UserStore
    + MembershipStore
    + GroupStore
    + SubgroupStore
    + TrackStore
    + EventStore
    + AnnouncementStore
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: UserStore
        + MembershipStore
        + GroupStore
        + SubgroupStore
        + TrackStore
        + EventStore
        + AnnouncementStore
        + Send
        + Sync
{
}
