//! Authorization gate.
//!
//! Every rule about who may do what lives in [`authorize`]. Handlers consult it before
//! touching a store, so a denied request never leaves a partial write behind.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Actor
///
/// The resolved identity behind a request. Pending and deleted accounts resolve to
/// `Guest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Actor {
    Guest,
    User(Uuid),
    Admin(Uuid),
}

impl Actor {
    /// The account behind the actor, used for attribution.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Guest => None,
            Actor::User(id) | Actor::Admin(id) => Some(*id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Post,
    Comment,
    /// A user account, identified so that self-service can be told apart. `None` stands
    /// for an account that does not exist yet (signup).
    User(Option<Uuid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        *self == Decision::Allow
    }
}

/// The decision table. Admins may do anything; reading is open to everyone; anyone may
/// comment or sign up; regular users may only manage their own account.
pub fn authorize(actor: &Actor, action: Action, resource: &Resource) -> Decision {
    use Action::*;

    if actor.is_admin() {
        return Decision::Allow;
    }

    let allowed = match (action, resource) {
        (View, _) => true,
        (Create, Resource::Comment) => true,
        (Create, Resource::User(_)) => true,
        (Create | Update | Delete, Resource::Post) => false,
        (Update | Delete, Resource::Comment) => false,
        (Update | Delete, Resource::User(target)) => match (actor, target) {
            (Actor::User(id), Some(target)) => id == target,
            _ => false,
        },
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// [`authorize`] as a guard: a deny becomes [`AppError::AccessDenied`].
pub fn ensure(actor: &Actor, action: Action, resource: &Resource) -> AppResult<()> {
    match authorize(actor, action, resource) {
        Decision::Allow => Ok(()),
        Decision::Deny => {
            tracing::warn!(
                actor = ?actor,
                action = ?action,
                resource = ?resource,
                "access denied"
            );
            Err(AppError::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_maps_deny_to_access_denied() {
        let result = ensure(&Actor::Guest, Action::Delete, &Resource::Post);
        assert!(matches!(result, Err(AppError::AccessDenied)));
    }

    #[test]
    fn guest_has_no_account() {
        assert_eq!(Actor::Guest.user_id(), None);
        let id = Uuid::new_v4();
        assert_eq!(Actor::Admin(id).user_id(), Some(id));
    }
}
