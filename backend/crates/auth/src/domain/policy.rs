//! Access Policy (RBAC)
//!
//! The one place role comparisons happen. Roles form a strict total order
//! `Admin > Moderator > User`; there are no custom permissions.

use kernel::id::UserId;

use crate::domain::value_object::user_role::UserRole;
use crate::error::{AuthError, AuthResult};

/// True when `actual` ranks at or above `required`.
pub fn has_role(actual: UserRole, required: UserRole) -> bool {
    actual.id() >= required.id()
}

/// Owner-or-admin rule for mutating owned resources.
pub fn can_access_owned(actual: UserRole, actor_id: &UserId, owner_id: &UserId) -> bool {
    actual == UserRole::Admin || actor_id == owner_id
}

/// [`has_role`] as a guard.
pub fn require_role(actual: UserRole, required: UserRole) -> AuthResult<()> {
    if has_role(actual, required) {
        Ok(())
    } else {
        Err(AuthError::InsufficientRole)
    }
}

/// [`can_access_owned`] as a guard.
pub fn require_owner_or_admin(
    actual: UserRole,
    actor_id: &UserId,
    owner_id: &UserId,
) -> AuthResult<()> {
    if can_access_owned(actual, actor_id, owner_id) {
        Ok(())
    } else {
        Err(AuthError::NotResourceOwner)
    }
}
