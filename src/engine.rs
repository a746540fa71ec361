use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::announcement::AnnouncementManager;
use crate::authz;
use crate::calendar::{CalendarSync, NoCalendar};
use crate::config::EngineConfig;
use crate::dispatch::{DispatchStats, Dispatcher, Outcome};
use crate::error::Result;
use crate::event::EventOrchestrator;
use crate::group::GroupManager;
use crate::mailer::{Mailer, NoMailer};
use crate::role::Role;
use crate::store::Store;
use crate::subgroup::SubgroupManager;
use crate::token::{RandomTokenGenerator, TokenGenerator};
use crate::track::TrackManager;
use crate::types::{GroupId, UserId};

/// Band management engine: every manager over one shared store plus the
/// side-effect dispatcher.
pub struct Engine<S, C = NoCalendar, M = NoMailer, T = RandomTokenGenerator> {
    store: Arc<S>,
    groups: GroupManager<S, T>,
    subgroups: SubgroupManager<S>,
    tracks: TrackManager<S>,
    announcements: AnnouncementManager<S, M>,
    events: EventOrchestrator<S, C, M>,
    dispatcher: Dispatcher,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<S, C = NoCalendar, M = NoMailer, T = RandomTokenGenerator> {
    store: S,
    calendar: C,
    mailer: M,
    tokens: T,
    config: EngineConfig,
}

impl<S> EngineBuilder<S> {
    /// Creates a builder without calendar or mail integration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            calendar: NoCalendar,
            mailer: NoMailer,
            tokens: RandomTokenGenerator,
            config: EngineConfig::default(),
        }
    }
}

impl<S, C, M, T> EngineBuilder<S, C, M, T> {
    /// Sets the pipeline configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the calendar port.
    pub fn calendar<C2: CalendarSync>(self, calendar: C2) -> EngineBuilder<S, C2, M, T> {
        EngineBuilder {
            store: self.store,
            calendar,
            mailer: self.mailer,
            tokens: self.tokens,
            config: self.config,
        }
    }

    /// Sets the mail port.
    pub fn mailer<M2: Mailer>(self, mailer: M2) -> EngineBuilder<S, C, M2, T> {
        EngineBuilder {
            store: self.store,
            calendar: self.calendar,
            mailer,
            tokens: self.tokens,
            config: self.config,
        }
    }

    /// Sets the join token source.
    pub fn token_generator<T2: TokenGenerator>(self, tokens: T2) -> EngineBuilder<S, C, M, T2> {
        EngineBuilder {
            store: self.store,
            calendar: self.calendar,
            mailer: self.mailer,
            tokens,
            config: self.config,
        }
    }
}

impl<S, C, M, T> EngineBuilder<S, C, M, T>
where
    S: Store + 'static,
    C: CalendarSync + 'static,
    M: Mailer + 'static,
    T: TokenGenerator,
{
    /// Builds the engine and starts the side-effect workers.
    ///
    /// Must be called inside a tokio runtime. An out-of-range config is
    /// `Invalid`.
    pub fn build(self) -> Result<Engine<S, C, M, T>> {
        self.config.validate()?;
        let dispatcher = Dispatcher::start(&self.config)?;
        let store = Arc::new(self.store);
        let calendar = Arc::new(self.calendar);
        let mailer = Arc::new(self.mailer);
        info!(
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            calendar = calendar.enabled(),
            mail = mailer.enabled(),
            "engine started"
        );

        Ok(Engine {
            groups: GroupManager::new(Arc::clone(&store), self.tokens),
            subgroups: SubgroupManager::new(Arc::clone(&store)),
            tracks: TrackManager::new(Arc::clone(&store)),
            announcements: AnnouncementManager::new(
                Arc::clone(&store),
                Arc::clone(&mailer),
                dispatcher.handle(),
                self.config.mail_timeout,
            ),
            events: EventOrchestrator::new(
                Arc::clone(&store),
                calendar,
                mailer,
                dispatcher.handle(),
                &self.config,
            )?,
            store,
            dispatcher,
        })
    }
}

impl<S, C, M, T> Engine<S, C, M, T>
where
    S: Store + 'static,
    C: CalendarSync + 'static,
    M: Mailer + 'static,
    T: TokenGenerator,
{
    pub fn groups(&self) -> &GroupManager<S, T> {
        &self.groups
    }

    pub fn subgroups(&self) -> &SubgroupManager<S> {
        &self.subgroups
    }

    pub fn tracks(&self) -> &TrackManager<S> {
        &self.tracks
    }

    pub fn announcements(&self) -> &AnnouncementManager<S, M> {
        &self.announcements
    }

    pub fn events(&self) -> &EventOrchestrator<S, C, M> {
        &self.events
    }

    /// Returns the shared store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Authorizes `actor` for an action needing at least `required` in `group`.
    pub async fn authorize(&self, actor: UserId, group: GroupId, required: Role) -> Result<Role> {
        authz::authorize(&*self.store, actor, group, required).await
    }

    /// Authorizes a read in `group`.
    pub async fn require_membership(&self, actor: UserId, group: GroupId) -> Result<Role> {
        authz::require_membership(&*self.store, actor, group).await
    }

    /// Subscribes to side-effect outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
        self.dispatcher.subscribe()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Stops accepting work and waits for queued side effects to finish.
    pub async fn shutdown(self) {
        let Self {
            groups,
            subgroups,
            tracks,
            announcements,
            events,
            store,
            dispatcher,
        } = self;
        drop((groups, subgroups, tracks, announcements, events, store));
        dispatcher.shutdown().await;
        info!("engine stopped");
    }
}

impl<S, C, M, T> std::fmt::Debug for Engine<S, C, M, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
