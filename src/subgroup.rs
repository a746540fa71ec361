use std::sync::Arc;

use tracing::{info, instrument};

use crate::authz::{authorize, require_membership};
use crate::error::{Error, Result};
use crate::model::{NewSubgroup, Subgroup};
use crate::role::Role;
use crate::store::Store;
use crate::types::{GroupId, SubgroupId, UserId, unique, validate_name};

/// Subgroup administration. Mutations need moderator rights.
#[derive(Debug)]
pub struct SubgroupManager<S> {
    store: Arc<S>,
}

impl<S: Store> SubgroupManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, description))]
    pub async fn create_subgroup(
        &self,
        actor: UserId,
        group: GroupId,
        name: &str,
        description: &str,
    ) -> Result<Subgroup> {
        authorize(&*self.store, actor, group, Role::Moderator).await?;
        let name = validate_name(name, "subgroup name")?;
        let subgroup = self
            .store
            .create_subgroup(NewSubgroup {
                group,
                name,
                description: description.trim().to_string(),
            })
            .await?;
        info!(%group, subgroup = %subgroup.id, %actor, "subgroup created");
        Ok(subgroup)
    }

    #[instrument(skip(self))]
    pub async fn get_subgroup(&self, actor: UserId, subgroup: SubgroupId) -> Result<Subgroup> {
        let subgroup = self.load(subgroup).await?;
        require_membership(&*self.store, actor, subgroup.group).await?;
        Ok(subgroup)
    }

    #[instrument(skip(self, description))]
    pub async fn update_subgroup(
        &self,
        actor: UserId,
        subgroup: SubgroupId,
        name: &str,
        description: &str,
    ) -> Result<Subgroup> {
        let current = self.load(subgroup).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        let name = validate_name(name, "subgroup name")?;
        let updated = self
            .store
            .update_subgroup(subgroup, name, description.trim().to_string())
            .await?;
        info!(%subgroup, %actor, "subgroup updated");
        Ok(updated)
    }

    /// Deletes a subgroup; notesheets and announcements lose the association.
    #[instrument(skip(self))]
    pub async fn delete_subgroup(&self, actor: UserId, subgroup: SubgroupId) -> Result<()> {
        let current = self.load(subgroup).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        self.store.delete_subgroup(subgroup).await?;
        info!(%subgroup, group = %current.group, %actor, "subgroup deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn group_subgroups(&self, actor: UserId, group: GroupId) -> Result<Vec<Subgroup>> {
        require_membership(&*self.store, actor, group).await?;
        Ok(self.store.group_subgroups(group).await?)
    }

    /// Adds group members to a subgroup. Users outside the group reject the
    /// whole batch.
    #[instrument(skip(self))]
    pub async fn add_subgroup_members(
        &self,
        actor: UserId,
        subgroup: SubgroupId,
        users: &[UserId],
    ) -> Result<Subgroup> {
        let current = self.load(subgroup).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        let users = unique(users);
        for user in &users {
            if self.store.membership(current.group, *user).await?.is_none() {
                return Err(Error::Conflict(format!(
                    "user {user} is not a member of group {}",
                    current.group
                )));
            }
        }
        let updated = self.store.add_subgroup_members(subgroup, &users).await?;
        info!(%subgroup, %actor, added = users.len(), "subgroup members added");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn remove_subgroup_member(
        &self,
        actor: UserId,
        subgroup: SubgroupId,
        user: UserId,
    ) -> Result<()> {
        let current = self.load(subgroup).await?;
        authorize(&*self.store, actor, current.group, Role::Moderator).await?;
        self.store.remove_subgroup_member(subgroup, user).await?;
        info!(%subgroup, %actor, %user, "subgroup member removed");
        Ok(())
    }

    async fn load(&self, subgroup: SubgroupId) -> Result<Subgroup> {
        self.store
            .find_subgroup(subgroup)
            .await?
            .ok_or_else(|| Error::not_found("subgroup", subgroup))
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::model::{Membership, NewGroup, NewUser};
    use crate::store::{GroupStore, MembershipStore};
    use crate::types::AccessToken;
    use futures::executor::block_on;

    struct Band {
        store: Arc<MemoryStore>,
        subgroups: SubgroupManager<MemoryStore>,
        group: GroupId,
        manager: UserId,
        member: UserId,
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

    fn band() -> Band {
        let store = Arc::new(MemoryStore::new());
        let manager = add_user(&store, "maria");
        let member = add_user(&store, "anna");
        let group = block_on(store.create_group_with_manager(
            NewGroup {
                name: "Brass Band".to_string(),
                description: String::new(),
                access_token: AccessToken::from("brass"),
            },
            manager,
        ))
        .unwrap()
        .id;
        block_on(store.add_membership(Membership {
            user: member,
            group,
            role: Role::Member,
        }))
        .unwrap();
        Band {
            subgroups: SubgroupManager::new(Arc::clone(&store)),
            store,
            group,
            manager,
            member,
        }
    }

    #[test]
    fn member_should_not_create_subgroup() {
        let band = band();
        let err = block_on(band.subgroups.create_subgroup(band.member, band.group, "Horns", ""))
            .expect_err("member");
        assert_eq!(err.code(), "denied");
    }

    #[test]
    fn add_members_should_dedupe_and_keep_existing_once() {
        let band = band();
        let horns =
            block_on(band.subgroups.create_subgroup(band.manager, band.group, "Horns", "")).unwrap();

        block_on(band.subgroups.add_subgroup_members(
            band.manager,
            horns.id,
            &[band.member, band.member],
        ))
        .unwrap();
        let updated = block_on(band.subgroups.add_subgroup_members(
            band.manager,
            horns.id,
            &[band.member, band.manager],
        ))
        .unwrap();

        assert_eq!(updated.members.len(), 2);
        assert!(updated.members.contains(&band.member));
    }

    #[test]
    fn add_members_should_reject_outsiders_without_partial_writes() {
        let band = band();
        let outsider = add_user(&band.store, "zoe");
        let horns =
            block_on(band.subgroups.create_subgroup(band.manager, band.group, "Horns", "")).unwrap();

        let err = block_on(band.subgroups.add_subgroup_members(
            band.manager,
            horns.id,
            &[band.member, outsider],
        ))
        .expect_err("outsider");

        assert_eq!(err.code(), "conflict");
        let horns = block_on(band.subgroups.get_subgroup(band.member, horns.id)).unwrap();
        assert!(horns.members.is_empty());
    }

    #[test]
    fn removed_group_member_should_leave_subgroups() {
        let band = band();
        let horns =
            block_on(band.subgroups.create_subgroup(band.manager, band.group, "Horns", "")).unwrap();
        block_on(band.subgroups.add_subgroup_members(band.manager, horns.id, &[band.member]))
            .unwrap();

        block_on(band.store.remove_membership(band.group, band.member)).unwrap();

        let horns = block_on(band.subgroups.get_subgroup(band.manager, horns.id)).unwrap();
        assert!(horns.members.is_empty());
    }

    #[test]
    fn get_subgroup_should_require_membership() {
        let band = band();
        let outsider = add_user(&band.store, "zoe");
        let horns =
            block_on(band.subgroups.create_subgroup(band.manager, band.group, "Horns", "")).unwrap();

        let err = block_on(band.subgroups.get_subgroup(outsider, horns.id)).expect_err("outsider");
        assert_eq!(err.code(), "denied");
        let err = block_on(band.subgroups.get_subgroup(band.member, SubgroupId::new(999)))
            .expect_err("missing");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn delete_subgroup_should_need_moderator() {
        let band = band();
        let horns =
            block_on(band.subgroups.create_subgroup(band.manager, band.group, "Horns", "")).unwrap();

        let err =
            block_on(band.subgroups.delete_subgroup(band.member, horns.id)).expect_err("member");
        assert_eq!(err.code(), "denied");

        block_on(band.subgroups.delete_subgroup(band.manager, horns.id)).unwrap();
        let left = block_on(band.subgroups.group_subgroups(band.member, band.group)).unwrap();
        assert!(left.is_empty());
    }

    #[test]
    fn update_subgroup_should_need_moderator_and_valid_name() {
        let band = band();
        let horns =
            block_on(band.subgroups.create_subgroup(band.manager, band.group, "Horns", "")).unwrap();

        let err = block_on(band.subgroups.update_subgroup(band.member, horns.id, "Brass", ""))
            .expect_err("member");
        assert_eq!(err.code(), "denied");

        block_on(band.store.update_membership_role(band.group, band.member, Role::Moderator))
            .unwrap();
        let err = block_on(band.subgroups.update_subgroup(band.member, horns.id, "   ", ""))
            .expect_err("blank");
        assert_eq!(err.code(), "invalid");

        let updated = block_on(band.subgroups.update_subgroup(
            band.member,
            horns.id,
            " Brass ",
            "trumpets and horns",
        ))
        .unwrap();
        assert_eq!(updated.name, "Brass");
        assert_eq!(updated.description, "trumpets and horns");
        let stored = block_on(band.subgroups.get_subgroup(band.manager, horns.id)).unwrap();
        assert_eq!(stored, updated);
    }

    #[test]
    fn remove_subgroup_member_should_need_moderator() {
        let band = band();
        let horns =
            block_on(band.subgroups.create_subgroup(band.manager, band.group, "Horns", "")).unwrap();
        block_on(band.subgroups.add_subgroup_members(
            band.manager,
            horns.id,
            &[band.member, band.manager],
        ))
        .unwrap();

        let err = block_on(band.subgroups.remove_subgroup_member(band.member, horns.id, band.manager))
            .expect_err("member");
        assert_eq!(err.code(), "denied");

        block_on(band.subgroups.remove_subgroup_member(band.manager, horns.id, band.member))
            .unwrap();
        let horns_now = block_on(band.subgroups.get_subgroup(band.member, horns.id)).unwrap();
        assert_eq!(horns_now.members, vec![band.manager]);

        let err = block_on(band.subgroups.remove_subgroup_member(band.manager, horns.id, band.member))
            .expect_err("already gone");
        assert_eq!(err.code(), "not_found");
    }
}
