use std::{fmt::Display, str::FromStr};

use crossbeam::channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::PrimaryKey;

pub type EventSender = Sender<ChangeEvent>;
pub type EventReceiver = Receiver<ChangeEvent>;

/// The tables a change can happen in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Books,
    BookCopies,
    Rooms,
    RoomAvailability,
    Reservations,
    Activities,
    Notifications,
}

impl Table {
    const ALL: [Table; 8] = [
        Self::Profiles,
        Self::Books,
        Self::BookCopies,
        Self::Rooms,
        Self::RoomAvailability,
        Self::Reservations,
        Self::Activities,
        Self::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Books => "books",
            Self::BookCopies => "book_copies",
            Self::Rooms => "rooms",
            Self::RoomAvailability => "room_availability",
            Self::Reservations => "reservations",
            Self::Activities => "activities",
            Self::Notifications => "notifications",
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown table {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Emitted after a write to a table has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// The id of the changed row. Room schedules use the room id.
    pub row_id: PrimaryKey,
    /// The user the row belongs to, if it belongs to one
    pub user_id: Option<PrimaryKey>,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, row_id: PrimaryKey) -> Self {
        Self {
            table,
            kind,
            row_id,
            user_id: None,
        }
    }

    pub fn owned_by(mut self, user_id: PrimaryKey) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Returns true if a subscriber with the given filters should receive this event
    pub fn matches(&self, table: Option<Table>, user_id: Option<PrimaryKey>) -> bool {
        let table_matches = table.map_or(true, |t| t == self.table);
        let user_matches = user_id.map_or(true, |id| self.user_id == Some(id));

        table_matches && user_matches
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_subscription_filters() {
        let event = ChangeEvent::new(Table::Reservations, ChangeKind::Update, 4).owned_by(7);

        assert!(event.matches(None, None));
        assert!(event.matches(Some(Table::Reservations), Some(7)));
        assert!(!event.matches(Some(Table::BookCopies), None));
        assert!(!event.matches(None, Some(8)));

        let unowned = ChangeEvent::new(Table::Books, ChangeKind::Insert, 1);
        assert!(
            !unowned.matches(None, Some(7)),
            "a user predicate should exclude rows without an owner"
        );
    }

    #[test]
    fn test_table_names() {
        assert_eq!("room_availability".parse(), Ok(Table::RoomAvailability));
        assert!("shelves".parse::<Table>().is_err());
    }
}
