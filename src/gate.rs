//! Authorization policy for mutations.
//!
//! `authorize` is a pure function of the principal, the intended action and
//! the target's ownership facts. It never touches engine state, so callers
//! resolve owners first and must consult it before any domain check runs.

use ulid::Ulid;

use crate::model::{Role, User};

/// An already-authenticated actor, as supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Ulid,
    pub role: Role,
    pub confirmed: bool,
}

impl Principal {
    pub fn new(id: Ulid, role: Role, confirmed: bool) -> Self {
        Self { id, role, confirmed }
    }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.role, user.confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateClass,
    CreateReservation,
    UpdateClass,
    DeleteClass,
    EditRoster,
    CancelReservation,
    ViewProfile,
    ConfirmUser,
    ListUsers,
    ManageDirectory,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateClass => "create_class",
            Action::CreateReservation => "create_reservation",
            Action::UpdateClass => "update_class",
            Action::DeleteClass => "delete_class",
            Action::EditRoster => "edit_roster",
            Action::CancelReservation => "cancel_reservation",
            Action::ViewProfile => "view_profile",
            Action::ConfirmUser => "confirm_user",
            Action::ListUsers => "list_users",
            Action::ManageDirectory => "manage_directory",
        }
    }
}

/// What the gate needs to know about the object of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    None,
    /// Something owned by `owner_id` (a class, a reservation).
    Owned { owner_id: Ulid },
    /// A user account.
    User { id: Ulid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

pub fn authorize(principal: &Principal, action: Action, target: Target) -> Decision {
    match principal.role {
        Role::Admin => return Decision::Allow,
        Role::Professor | Role::Student => {}
    }

    let allowed = match action {
        Action::CreateClass | Action::CreateReservation => {
            let may_create = principal.role == Role::Professor && principal.confirmed;
            may_create
                && match target {
                    Target::None => true,
                    Target::Owned { owner_id } => owner_id == principal.id,
                    Target::User { .. } => false,
                }
        }
        Action::UpdateClass | Action::DeleteClass | Action::EditRoster | Action::CancelReservation => {
            matches!(target, Target::Owned { owner_id } if owner_id == principal.id)
        }
        Action::ViewProfile => matches!(target, Target::User { id } if id == principal.id),
        Action::ConfirmUser | Action::ListUsers | Action::ManageDirectory => false,
    };

    if allowed { Decision::Allow } else { Decision::Deny }
}
