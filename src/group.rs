use std::sync::Arc;

use tracing::{info, instrument};

use crate::authz::{authorize, require_membership};
use crate::error::{Error, Result};
use crate::model::{
    Group, GroupInfo, JoinedGroup, MemberInfo, Membership, NewGroup, UserGroup,
};
use crate::role::Role;
use crate::store::Store;
use crate::token::{RandomTokenGenerator, TokenGenerator};
use crate::types::{AccessToken, GroupId, UserId, validate_name};

/// Group lifecycle, joining and member administration.
#[derive(Debug)]
pub struct GroupManager<S, T = RandomTokenGenerator> {
    store: Arc<S>,
    tokens: T,
}

impl<S, T> GroupManager<S, T>
where
    S: Store,
    T: TokenGenerator,
{
    pub fn new(store: Arc<S>, tokens: T) -> Self {
        Self { store, tokens }
    }

    /// Creates a group with a fresh join token; the creator becomes its manager.
    #[instrument(skip(self, description))]
    pub async fn create_group(
        &self,
        name: &str,
        description: &str,
        creator: UserId,
    ) -> Result<Group> {
        let name = validate_name(name, "group name")?;
        if self.store.find_user(creator).await?.is_none() {
            return Err(Error::not_found("user", creator));
        }
        let group = self
            .store
            .create_group_with_manager(
                NewGroup {
                    name,
                    description: description.trim().to_string(),
                    access_token: self.tokens.generate(),
                },
                creator,
            )
            .await?;
        info!(group = %group.id, %creator, "group created");
        Ok(group)
    }

    /// Joins the group holding `token` as a plain member.
    #[instrument(skip(self))]
    pub async fn join_group(&self, user: UserId, token: &AccessToken) -> Result<JoinedGroup> {
        let group = self
            .store
            .find_group_by_token(token)
            .await?
            .ok_or_else(|| Error::not_found("group", "for access token"))?;
        if self.store.membership(group.id, user).await?.is_some() {
            return Err(Error::Conflict(format!(
                "user {user} is already a member of group {}",
                group.id
            )));
        }
        // A concurrent join of the same user is rejected by the store's key.
        self.store
            .add_membership(Membership {
                user,
                group: group.id,
                role: Role::Member,
            })
            .await?;
        info!(group = %group.id, %user, "user joined group");
        Ok(JoinedGroup {
            group: group.id,
            name: group.name,
            role: Role::Member,
        })
    }

    /// Returns group details; the join token only for managers.
    #[instrument(skip(self))]
    pub async fn get_group_info(&self, actor: UserId, group: GroupId) -> Result<GroupInfo> {
        let role = require_membership(&*self.store, actor, group).await?;
        let group = self.load_group(group).await?;
        Ok(GroupInfo {
            id: group.id,
            name: group.name,
            description: group.description,
            access_token: role.is_manager().then_some(group.access_token),
        })
    }

    /// Replaces the join token and returns the new one.
    #[instrument(skip(self))]
    pub async fn refresh_access_token(&self, actor: UserId, group: GroupId) -> Result<AccessToken> {
        authorize(&*self.store, actor, group, Role::Manager).await?;
        let token = self.tokens.generate();
        self.store.update_access_token(group, token.clone()).await?;
        info!(%group, %actor, "access token rotated");
        Ok(token)
    }

    /// Changes another member's role.
    #[instrument(skip(self))]
    pub async fn update_member_role(
        &self,
        actor: UserId,
        group: GroupId,
        target: UserId,
        role: Role,
    ) -> Result<()> {
        authorize(&*self.store, actor, group, Role::Manager).await?;
        if target == actor {
            return Err(Error::Invalid("cannot change your own role".to_string()));
        }
        let current = self.load_membership(group, target).await?;
        // The store refuses to demote the last manager.
        self.store.update_membership_role(group, target, role).await?;
        info!(%group, %actor, %target, from = %current.role, to = %role, "member role changed");
        Ok(())
    }

    /// Removes another member from the group.
    #[instrument(skip(self))]
    pub async fn remove_member(&self, actor: UserId, group: GroupId, target: UserId) -> Result<()> {
        if target == actor {
            return Err(Error::Invalid(
                "cannot remove yourself from the group".to_string(),
            ));
        }
        authorize(&*self.store, actor, group, Role::Manager).await?;
        self.store.remove_membership(group, target).await?;
        info!(%group, %actor, %target, "member removed");
        Ok(())
    }

    /// Leaves a group. The last manager cannot leave.
    #[instrument(skip(self))]
    pub async fn leave_group(&self, user: UserId, group: GroupId) -> Result<()> {
        require_membership(&*self.store, user, group).await?;
        self.store.remove_membership(group, user).await?;
        info!(%group, %user, "user left group");
        Ok(())
    }

    /// Deletes the group and everything it owns.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, actor: UserId, group: GroupId) -> Result<()> {
        authorize(&*self.store, actor, group, Role::Manager).await?;
        self.store.delete_group(group).await?;
        info!(%group, %actor, "group deleted");
        Ok(())
    }

    /// Lists members with their roles.
    #[instrument(skip(self))]
    pub async fn group_members(&self, actor: UserId, group: GroupId) -> Result<Vec<MemberInfo>> {
        require_membership(&*self.store, actor, group).await?;
        let memberships = self.store.group_memberships(group).await?;
        let ids: Vec<UserId> = memberships.iter().map(|m| m.user).collect();
        let users = self.store.find_users(&ids).await?;
        Ok(users
            .into_iter()
            .filter_map(|user| {
                memberships
                    .iter()
                    .find(|m| m.user == user.id)
                    .map(|m| MemberInfo { role: m.role, user })
            })
            .collect())
    }

    /// Lists the groups `user` belongs to.
    #[instrument(skip(self))]
    pub async fn user_groups(&self, user: UserId) -> Result<Vec<UserGroup>> {
        let memberships = self.store.user_memberships(user).await?;
        let mut groups = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let Some(group) = self.store.find_group(membership.group).await? else {
                continue;
            };
            let member_count = self.store.group_memberships(group.id).await?.len();
            groups.push(UserGroup {
                group: group.id,
                name: group.name,
                description: group.description,
                role: membership.role,
                member_count,
            });
        }
        Ok(groups)
    }

    async fn load_group(&self, group: GroupId) -> Result<Group> {
        self.store
            .find_group(group)
            .await?
            .ok_or_else(|| Error::not_found("group", group))
    }

    async fn load_membership(&self, group: GroupId, user: UserId) -> Result<Membership> {
        self.store
            .membership(group, user)
            .await?
            .ok_or_else(|| Error::not_found("membership", format!("{group}/{user}")))
    }
}
