use std::sync::Arc;

use tracing::{info, instrument};

use crate::authz::{authorize, require_membership};
use crate::error::{Error, Result};
use crate::model::{NewNotesheet, NewTrack, Notesheet, Track};
use crate::role::Role;
use crate::store::Store;
use crate::types::{GroupId, NotesheetId, SubgroupId, TrackId, UserId, unique, validate_name};

/// Track and notesheet administration.
#[derive(Debug)]
pub struct TrackManager<S> {
    store: Arc<S>,
}

impl<S: Store> TrackManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, description))]
    pub async fn create_track(
        &self,
        actor: UserId,
        group: GroupId,
        name: &str,
        description: &str,
    ) -> Result<Track> {
        authorize(&*self.store, actor, group, Role::Moderator).await?;
        let name = validate_name(name, "track name")?;
        let track = self
            .store
            .create_track(NewTrack {
                group,
                name,
                description: description.trim().to_string(),
            })
            .await?;
        info!(%group, track = %track.id, %actor, "track created");
        Ok(track)
    }

    #[instrument(skip(self))]
    pub async fn get_track(&self, actor: UserId, track: TrackId) -> Result<Track> {
        let track = self.load(track).await?;
        require_membership(&*self.store, actor, track.group).await?;
        Ok(track)
    }

    #[instrument(skip(self, description))]
    pub async fn update_track(
        &self,
        actor: UserId,
        track: TrackId,
        name: &str,
        description: &str,
    ) -> Result<Track> {
        let current = self.load(track).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        let name = validate_name(name, "track name")?;
        let updated = self
            .store
            .update_track(track, name, description.trim().to_string())
            .await?;
        info!(%track, %actor, "track updated");
        Ok(updated)
    }

    /// Deletes a track with its notesheets. Events that performed it stay,
    /// minus the performance.
    #[instrument(skip(self))]
    pub async fn delete_track(&self, actor: UserId, track: TrackId) -> Result<()> {
        let current = self.load(track).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        self.store.delete_track(track).await?;
        info!(%track, group = %current.group, %actor, "track deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn group_tracks(&self, actor: UserId, group: GroupId) -> Result<Vec<Track>> {
        require_membership(&*self.store, actor, group).await?;
        Ok(self.store.group_tracks(group).await?)
    }

    /// Adds a notesheet. Every subgroup must belong to the track's group.
    #[instrument(skip(self))]
    pub async fn add_notesheet(
        &self,
        actor: UserId,
        track: TrackId,
        instrument: &str,
        filepath: &str,
        subgroups: &[SubgroupId],
    ) -> Result<Notesheet> {
        let current = self.load(track).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        let instrument = validate_name(instrument, "instrument")?;
        let filepath = validate_filepath(filepath)?;
        let subgroups = unique(subgroups);
        for id in &subgroups {
            let subgroup = self
                .store
                .find_subgroup(*id)
                .await?
                .ok_or_else(|| Error::not_found("subgroup", id))?;
            if subgroup.group != current.group {
                return Err(Error::Conflict(format!(
                    "subgroup {id} does not belong to group {}",
                    current.group
                )));
            }
        }
        let notesheet = self
            .store
            .add_notesheet(NewNotesheet {
                track,
                instrument,
                filepath,
                subgroups,
            })
            .await?;
        info!(%track, notesheet = %notesheet.id, %actor, "notesheet added");
        Ok(notesheet)
    }

    #[instrument(skip(self))]
    pub async fn get_notesheet(&self, actor: UserId, notesheet: NotesheetId) -> Result<Notesheet> {
        let notesheet = self.load_notesheet(notesheet).await?;
        let track = self.load(notesheet.track).await?;
        require_membership(&*self.store, actor, track.group).await?;
        Ok(notesheet)
    }

    /// Lists every notesheet of a track regardless of subgroup scoping.
    #[instrument(skip(self))]
    pub async fn track_notesheets(&self, actor: UserId, track: TrackId) -> Result<Vec<Notesheet>> {
        let current = self.load(track).await?;
        require_membership(&*self.store, actor, current.group).await?;
        Ok(self.store.track_notesheets(track).await?)
    }

    /// Lists the notesheets of a track the actor may play from.
    #[instrument(skip(self))]
    pub async fn user_notesheets(&self, actor: UserId, track: TrackId) -> Result<Vec<Notesheet>> {
        let current = self.load(track).await?;
        let role = require_membership(&*self.store, actor, current.group).await?;
        let notesheets = self.store.track_notesheets(track).await?;
        if role.can_moderate() {
            return Ok(notesheets);
        }

        let own: Vec<SubgroupId> = self
            .store
            .group_subgroups(current.group)
            .await?
            .into_iter()
            .filter(|subgroup| subgroup.members.contains(&actor))
            .map(|subgroup| subgroup.id)
            .collect();
        Ok(notesheets
            .into_iter()
            .filter(|sheet| {
                sheet.subgroups.is_empty() || sheet.subgroups.iter().any(|id| own.contains(id))
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn update_notesheet_filepath(
        &self,
        actor: UserId,
        notesheet: NotesheetId,
        filepath: &str,
    ) -> Result<Notesheet> {
        let current = self.load_notesheet(notesheet).await?;
        let track = self.load(current.track).await?;
        authorize(&*self.store, actor, track.group, Role::Moderator).await?;
        let filepath = validate_filepath(filepath)?;
        let updated = self
            .store
            .update_notesheet_filepath(notesheet, filepath)
            .await?;
        info!(%notesheet, %actor, "notesheet file replaced");
        Ok(updated)
    }

    async fn load(&self, track: TrackId) -> Result<Track> {
        self.store
            .find_track(track)
            .await?
            .ok_or_else(|| Error::not_found("track", track))
    }

    async fn load_notesheet(&self, notesheet: NotesheetId) -> Result<Notesheet> {
        self.store
            .find_notesheet(notesheet)
            .await?
            .ok_or_else(|| Error::not_found("notesheet", notesheet))
    }
}

fn validate_filepath(filepath: &str) -> Result<String> {
    let filepath = filepath.trim();
    if filepath.is_empty() {
        return Err(Error::Invalid("notesheet filepath must not be empty".to_string()));
    }
    Ok(filepath.to_string())
}
