use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{value:?} is not a valid {kind}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Requested by a member, waiting for a librarian.
    Pending,
    /// Accepted by a librarian. The inventory unit is held.
    Approved,
    Declined,
    /// The item was returned.
    Completed,
}

impl ReservationStatus {
    /// Returns true if no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Declined | Self::Completed)
    }

    /// Returns true if the reservation still counts against its inventory unit
    /// or may come to do so.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_become(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Declined)
                | (Self::Approved, Self::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::Completed => "completed",
        }
    }
}

/// The availability of a single physical book copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyStatus {
    Available,
    /// Held for an approved reservation, not yet picked up.
    Reserved,
    CheckedOut,
}

impl CopyStatus {
    /// Returns true if the copy is held by a reservation.
    pub fn is_held(&self) -> bool {
        !matches!(self, Self::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::CheckedOut => "checked-out",
        }
    }
}

/// What kind of inventory a reservation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Book,
    Room,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Room => "room",
        }
    }
}

/// The role of a profile. Roles are ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Librarian,
    Admin,
}

impl Role {
    /// Librarians and admins manage inventory and process reservations.
    pub fn is_staff(&self) -> bool {
        *self >= Self::Librarian
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Librarian => "librarian",
            Self::Admin => "admin",
        }
    }
}

macro_rules! impl_text_enum {
    ($ty:ty, $kind:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == <$ty>::$variant.as_str() {
                        return Ok(<$ty>::$variant);
                    }
                )+

                Err(ParseStatusError::new($kind, s))
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_text_enum!(
    ReservationStatus,
    "reservation status",
    [Pending, Approved, Declined, Completed]
);
impl_text_enum!(CopyStatus, "copy status", [Available, Reserved, CheckedOut]);
impl_text_enum!(ItemType, "item type", [Book, Room]);
impl_text_enum!(Role, "role", [Member, Librarian, Admin]);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_state_machine() {
        use ReservationStatus::*;

        assert!(Pending.can_become(Approved));
        assert!(Pending.can_become(Declined));
        assert!(Approved.can_become(Completed));

        assert!(!Pending.can_become(Completed), "pending must be approved first");
        assert!(!Approved.can_become(Declined));
        assert!(!Approved.can_become(Pending));

        for terminal in [Declined, Completed] {
            assert!(terminal.is_terminal());

            for next in [Pending, Approved, Declined, Completed] {
                assert!(
                    !terminal.can_become(next),
                    "{terminal} must not be re-opened to {next}"
                );
            }
        }
    }

    #[test]
    fn test_text_representation() {
        assert_eq!(CopyStatus::CheckedOut.to_string(), "checked-out");
        assert_eq!(
            "checked-out".parse::<CopyStatus>().unwrap(),
            CopyStatus::CheckedOut
        );
        assert_eq!(
            serde_json::to_string(&CopyStatus::CheckedOut).unwrap(),
            "\"checked-out\""
        );
        assert_eq!("librarian".parse::<Role>().unwrap(), Role::Librarian);
        assert!("Approved".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_role_privileges() {
        assert!(!Role::Member.is_staff());
        assert!(Role::Librarian.is_staff());
        assert!(Role::Admin.is_staff());
        assert!(Role::Admin > Role::Librarian);
    }
}
