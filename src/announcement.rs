use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};

use crate::authz::{authorize, require_membership};
use crate::dispatch::{DispatchHandle, SideEffect};
use crate::error::{Error, Result};
use crate::mailer::{Mailer, NoMailer};
use crate::model::{Announcement, NewAnnouncement, Priority};
use crate::notify;
use crate::role::Role;
use crate::store::Store;
use crate::types::{AnnouncementId, GroupId, SubgroupId, UserId, unique, validate_name};

/// Who receives an announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnnouncementTarget {
    /// Every member at creation time.
    AllMembers,
    /// Explicit members; an empty list falls back to every member.
    Users(Vec<UserId>),
    /// The union of the members of these subgroups.
    Subgroups(Vec<SubgroupId>),
}

/// Input for [`AnnouncementManager::create_announcement`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnouncementDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub target: AnnouncementTarget,
}

/// Announcement lifecycle with mail fan-out after commit.
pub struct AnnouncementManager<S, M = NoMailer> {
    store: Arc<S>,
    mailer: Arc<M>,
    dispatch: DispatchHandle,
    mail_timeout: Duration,
}

impl<S, M> AnnouncementManager<S, M>
where
    S: Store + 'static,
    M: Mailer + 'static,
{
    pub(crate) fn new(
        store: Arc<S>,
        mailer: Arc<M>,
        dispatch: DispatchHandle,
        mail_timeout: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            dispatch,
            mail_timeout,
        }
    }

    /// Persists an announcement with its recipient snapshot, then queues one
    /// mail per recipient.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create_announcement(
        &self,
        actor: UserId,
        group: GroupId,
        draft: AnnouncementDraft,
    ) -> Result<Announcement> {
        authorize(&*self.store, actor, group, Role::Moderator).await?;
        let title = validate_name(&draft.title, "announcement title")?;
        let (recipients, subgroups) = self.resolve_target(group, &draft.target).await?;

        let announcement = self
            .store
            .create_announcement(
                NewAnnouncement {
                    group,
                    sender: actor,
                    title,
                    description: draft.description.trim().to_string(),
                    priority: draft.priority,
                    created_at: Utc::now(),
                },
                &recipients,
                &subgroups,
            )
            .await?;
        info!(
            %group,
            announcement = %announcement.id,
            %actor,
            recipients = announcement.recipients.len(),
            "announcement created"
        );

        if self.mailer.enabled() && !announcement.recipients.is_empty() {
            self.dispatch.submit(
                SideEffect::AnnouncementEmail,
                format!("announcement {}", announcement.id),
                notify::mail_announcement(
                    Arc::clone(&self.store),
                    Arc::clone(&self.mailer),
                    announcement.clone(),
                    self.mail_timeout,
                ),
            );
        }
        Ok(announcement)
    }

    /// Deletes an announcement. Allowed for moderators and for its sender.
    #[instrument(skip(self))]
    pub async fn delete_announcement(
        &self,
        actor: UserId,
        announcement: AnnouncementId,
    ) -> Result<()> {
        let current = self
            .store
            .find_announcement(announcement)
            .await?
            .ok_or_else(|| Error::not_found("announcement", announcement))?;
        if current.sender == actor {
            require_membership(&*self.store, actor, current.group).await?;
        } else {
            authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        }
        self.store.delete_announcement(announcement).await?;
        info!(%announcement, group = %current.group, %actor, "announcement deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn group_announcements(
        &self,
        actor: UserId,
        group: GroupId,
    ) -> Result<Vec<Announcement>> {
        require_membership(&*self.store, actor, group).await?;
        Ok(self.store.group_announcements(group).await?)
    }

    /// Lists the announcements addressed to `user` across all groups.
    #[instrument(skip(self))]
    pub async fn user_announcements(&self, user: UserId) -> Result<Vec<Announcement>> {
        Ok(self.store.user_announcements(user).await?)
    }

    async fn resolve_target(
        &self,
        group: GroupId,
        target: &AnnouncementTarget,
    ) -> Result<(Vec<UserId>, Vec<SubgroupId>)> {
        match target {
            AnnouncementTarget::Users(users) if !users.is_empty() => {
                let users = unique(users);
                for user in &users {
                    if self.store.membership(group, *user).await?.is_none() {
                        return Err(Error::Conflict(format!(
                            "recipient {user} is not a member of group {group}"
                        )));
                    }
                }
                Ok((users, Vec::new()))
            }
            AnnouncementTarget::AllMembers | AnnouncementTarget::Users(_) => {
                let members = self.store.group_memberships(group).await?;
                Ok((members.into_iter().map(|m| m.user).collect(), Vec::new()))
            }
            AnnouncementTarget::Subgroups(ids) => {
                if ids.is_empty() {
                    return Err(Error::Invalid(
                        "subgroup announcement needs at least one subgroup".to_string(),
                    ));
                }
                let ids = unique(ids);
                let mut recipients = Vec::new();
                for id in &ids {
                    let subgroup = self
                        .store
                        .find_subgroup(*id)
                        .await?
                        .ok_or_else(|| Error::not_found("subgroup", id))?;
                    if subgroup.group != group {
                        return Err(Error::Conflict(format!(
                            "subgroup {id} does not belong to group {group}"
                        )));
                    }
                    recipients.extend(subgroup.members);
                }
                Ok((unique(&recipients), ids))
            }
        }
    }
}

impl<S, M> std::fmt::Debug for AnnouncementManager<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncementManager")
            .field("mail_timeout", &self.mail_timeout)
            .finish_non_exhaustive()
    }
}
