//! Ownership-based authorization
//!
//! Handlers load an entity, then ask [`authorize`] whether the requester may
//! see or change it before doing anything else. The same check backs detail,
//! update and delete operations for pins, boards and user profiles.

use crate::models::{Board, Pin, User, UserProfile};

/// Anything with an owning user
pub trait Owned {
    /// ID of the owning user
    fn owner_id(&self) -> i64;

    /// Whether the entity is hidden from everyone but its owner
    fn is_private(&self) -> bool {
        false
    }

    /// Noun used in denial messages
    fn kind(&self) -> &'static str;
}

impl Owned for Pin {
    fn owner_id(&self) -> i64 {
        self.user_id
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn kind(&self) -> &'static str {
        "pin"
    }
}

impl Owned for Board {
    fn owner_id(&self) -> i64 {
        self.user_id
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn kind(&self) -> &'static str {
        "board"
    }
}

impl Owned for User {
    fn owner_id(&self) -> i64 {
        self.id
    }

    fn kind(&self) -> &'static str {
        "account"
    }
}

impl Owned for UserProfile {
    fn owner_id(&self) -> i64 {
        self.user_id
    }

    fn kind(&self) -> &'static str {
        "profile"
    }
}

/// Which requesters an operation admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Only the owner (edit, delete, adding pins to a board)
    OwnerOnly,
    /// The owner, or anyone when the entity is not private (detail views)
    OwnerOrPublic,
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    /// Denied, with a message fit for the 403 page
    Deny(String),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allow)
    }
}

/// Decide whether `requester` may act on `entity` under `policy`.
///
/// Anonymous requesters only get through `OwnerOrPublic` on public entities.
pub fn authorize<E: Owned + ?Sized>(requester: Option<&User>, entity: &E, policy: Policy) -> Access {
    let is_owner = requester.is_some_and(|user| user.id == entity.owner_id());
    let allowed = match policy {
        Policy::OwnerOnly => is_owner,
        Policy::OwnerOrPublic => is_owner || !entity.is_private(),
    };

    if allowed {
        Access::Allow
    } else {
        Access::Deny(denial_message(entity.kind()))
    }
}

fn denial_message(kind: &str) -> String {
    match kind {
        "account" | "profile" => format!("You are not the owner of this {} - you cannot edit it", kind),
        _ => format!("You are not the owner of this {} - you cannot edit or view it", kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> User {
        let mut user = User::new(
            format!("user{}", id),
            format!("user{}@example.com", id),
            "hash".into(),
            "First",
            "Last",
        );
        user.id = id;
        user
    }

    fn board(owner: i64, is_private: bool) -> Board {
        let mut board = Board::new(owner, "Ideas", is_private);
        board.id = 10;
        board
    }

    #[test]
    fn test_owner_only() {
        let owner = user(1);
        let other = user(2);
        let board = board(1, false);

        assert_eq!(authorize(Some(&owner), &board, Policy::OwnerOnly), Access::Allow);
        assert_eq!(
            authorize(Some(&other), &board, Policy::OwnerOnly),
            Access::Deny("You are not the owner of this board - you cannot edit or view it".into())
        );
        assert!(!authorize(None, &board, Policy::OwnerOnly).is_allowed());
    }

    #[test]
    fn test_owner_or_public() {
        let owner = user(1);
        let other = user(2);
        let public = board(1, false);
        let private = board(1, true);

        assert!(authorize(Some(&other), &public, Policy::OwnerOrPublic).is_allowed());
        assert!(authorize(None, &public, Policy::OwnerOrPublic).is_allowed());
        assert!(authorize(Some(&owner), &private, Policy::OwnerOrPublic).is_allowed());
        assert!(!authorize(Some(&other), &private, Policy::OwnerOrPublic).is_allowed());
        assert!(!authorize(None, &private, Policy::OwnerOrPublic).is_allowed());
    }

    #[test]
    fn test_user_is_owned_by_itself() {
        let alice = user(1);
        let bob = user(2);
        assert!(authorize(Some(&alice), &alice, Policy::OwnerOnly).is_allowed());
        match authorize(Some(&bob), &alice, Policy::OwnerOnly) {
            Access::Deny(reason) => assert!(reason.contains("account")),
            Access::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn test_profile_owner() {
        let profile = UserProfile::empty(3);
        assert!(authorize(Some(&user(3)), &profile, Policy::OwnerOnly).is_allowed());
        assert!(!authorize(Some(&user(4)), &profile, Policy::OwnerOnly).is_allowed());
        // Profiles have no privacy flag.
        assert!(authorize(None, &profile, Policy::OwnerOrPublic).is_allowed());
    }
}
