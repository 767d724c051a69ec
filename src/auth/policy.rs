use uuid::Uuid;

use crate::error::AppError;
use crate::models::Role;

/// A small set of roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    const fn bit(role: Role) -> u8 {
        match role {
            Role::Customer => 1,
            Role::Manager => 2,
            Role::Admin => 4,
        }
    }

    pub const fn of(roles: &[Role]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < roles.len() {
            bits |= Self::bit(roles[i]);
            i += 1;
        }
        RoleSet(bits)
    }

    pub const fn contains(self, role: Role) -> bool {
        self.0 & Self::bit(role) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: RoleSet) -> RoleSet {
        RoleSet(self.0 | other.0)
    }
}

/// Access rule attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Public,
    /// Empty set means any authenticated principal.
    Roles(RoleSet),
    /// The path `id` must be the principal's own id unless their role is
    /// privileged.
    Ownership { privileged: RoleSet },
}

impl Policy {
    pub const fn any_role() -> Self {
        Policy::Roles(RoleSet::EMPTY)
    }

    pub const fn roles(roles: &[Role]) -> Self {
        Policy::Roles(RoleSet::of(roles))
    }

    pub const fn ownership(privileged: &[Role]) -> Self {
        Policy::Ownership {
            privileged: RoleSet::of(privileged),
        }
    }
}

/// Admin passes every role check.
pub fn check_roles(allowed: RoleSet, role: Role) -> Result<(), AppError> {
    if allowed.is_empty() || role == Role::Admin || allowed.contains(role) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Insufficient role".to_string()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum OwnershipCheck {
    /// The principal is the target.
    Owner,
    /// A privileged principal acting on someone else; the target must exist.
    Privileged(Uuid),
}

pub fn check_ownership(
    principal: Uuid,
    role: Role,
    target: Option<&str>,
    privileged: RoleSet,
) -> Result<OwnershipCheck, AppError> {
    let parsed = target.map(|raw| raw.parse::<Uuid>());

    if let Some(Ok(id)) = parsed {
        if id == principal {
            return Ok(OwnershipCheck::Owner);
        }
    }

    if !privileged.contains(role) {
        return Err(AppError::Forbidden(
            "You can only access your own account".to_string(),
        ));
    }

    match parsed {
        Some(Ok(id)) => Ok(OwnershipCheck::Privileged(id)),
        Some(Err(_)) => Err(AppError::BadRequest("Invalid user id".to_string())),
        None => Err(AppError::BadRequest("Missing user id".to_string())),
    }
}
