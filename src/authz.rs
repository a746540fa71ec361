//! Membership-based authorization checks.
//!
//! Both checks read one membership row and nothing else, so the decision is a
//! pure function of the store snapshot. Lookup failures deny.

use crate::error::{DenyReason, Error, Result};
use crate::role::Role;
use crate::store::MembershipStore;
use crate::types::{GroupId, UserId};
use tracing::warn;

/// Authorizes `actor` for an action that needs at least `required` in `group`.
///
/// Returns the actor's role when allowed.
pub async fn authorize<S>(store: &S, actor: UserId, group: GroupId, required: Role) -> Result<Role>
where
    S: MembershipStore + Send + Sync + ?Sized,
{
    let membership = match store.membership(group, actor).await {
        Ok(membership) => membership,
        Err(err) => {
            warn!(%actor, %group, error = %err, "membership lookup failed; denying");
            return Err(Error::Denied(DenyReason::StoreUnavailable));
        }
    };
    let Some(membership) = membership else {
        return Err(Error::Denied(DenyReason::NotMember));
    };
    if !membership.role.satisfies(required) {
        return Err(Error::Denied(DenyReason::InsufficientRole {
            required,
            actual: membership.role,
        }));
    }
    Ok(membership.role)
}

/// Authorizes a read: any role in `group` is enough.
pub async fn require_membership<S>(store: &S, actor: UserId, group: GroupId) -> Result<Role>
where
    S: MembershipStore + Send + Sync + ?Sized,
{
    authorize(store, actor, group, Role::Member).await
}
