//! Role-based authorization and event orchestration for band management.
//!
//! A group (band) holds members with a [`Role`], subgroups, tracks with
//! notesheets, events and announcements. Every mutation passes through
//! [`authorize`] before it touches the [`Store`]; reads call
//! [`require_membership`]. Lookup failures deny.
//!
//! Events and announcements are committed in one store call each. Calendar
//! sync and mail delivery then run on a bounded background [`Dispatcher`];
//! their failures surface as [`Degraded`] outcomes and never reach the caller.
//!
//! # Examples
//!
//! Create a band, let a member join and schedule a rehearsal (enable
//! `memory-store`):
//! ```no_run
//! # #[cfg(feature = "memory-store")]
//! # async fn demo() -> rs_band::Result<()> {
//! use rs_band::{EngineBuilder, EventDraft, MemoryStore, NewUser};
//! let engine = EngineBuilder::new(MemoryStore::new()).build()?;
//! let maria = engine.store().add_user(NewUser {
//!     first_name: "Maria".to_string(),
//!     last_name: "Nowak".to_string(),
//!     email: "maria@example.com".to_string(),
//! })?;
//! let group = engine.groups().create_group("Brass Band", "", maria.id).await?;
//! let event = engine
//!     .events()
//!     .create_event(
//!         maria.id,
//!         EventDraft {
//!             group: group.id,
//!             title: "Rehearsal".to_string(),
//!             description: String::new(),
//!             location: "Town hall".to_string(),
//!             date: chrono::Utc::now(),
//!             tracks: Vec::new(),
//!             attendees: Vec::new(),
//!         },
//!     )
//!     .await?;
//! # let _ = event;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod announcement;
mod authz;
mod calendar;
mod config;
mod dispatch;
mod engine;
mod error;
mod event;
mod group;
mod mailer;
mod model;
mod notify;
mod role;
mod store;
mod subgroup;
mod token;
mod track;
mod types;

#[cfg(feature = "memory-store")]
mod memory_store;

pub use crate::announcement::{AnnouncementDraft, AnnouncementManager, AnnouncementTarget};
pub use crate::authz::{authorize, require_membership};
pub use crate::calendar::{CalendarEntry, CalendarSync, NoCalendar};
pub use crate::config::{EngineConfig, MAX_CALENDAR_EVENT_DURATION};
pub use crate::dispatch::{Degraded, DispatchStats, Dispatcher, Outcome, SideEffect};
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{BackendError, DenyReason, Error, PortError, Result, StoreError};
pub use crate::event::{EventDraft, EventOrchestrator, EventUpdate};
pub use crate::group::GroupManager;
pub use crate::mailer::{Mailer, NoMailer};
pub use crate::model::{
    Announcement, CalendarLink, Event, EventDetails, Group, GroupInfo, JoinedGroup, MemberInfo,
    Membership, NewAnnouncement, NewEvent, NewGroup, NewNotesheet, NewSubgroup, NewTrack,
    NewUser, Notesheet, Performance, Priority, Subgroup, Track, User, UserGroup,
};
pub use crate::role::Role;
pub use crate::store::{
    AnnouncementStore, EventStore, GroupStore, MembershipStore, Store, SubgroupStore, TrackStore,
    UserStore,
};
pub use crate::subgroup::SubgroupManager;
pub use crate::token::{RandomTokenGenerator, TokenGenerator};
pub use crate::track::TrackManager;
pub use crate::types::{
    AccessToken, AnnouncementId, EventId, ExternalEventId, GroupId, NotesheetId, SubgroupId,
    TrackId, UserId,
};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;
