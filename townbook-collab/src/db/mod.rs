use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use townbook_core::{CopyStatus, ItemType, ReservationStatus, Role, ScheduleError, SlotRange};

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A guarded write found the row in another state than expected
    #[error("{resource}:{id} is no longer {expected}")]
    Stale {
        resource: &'static str,
        id: String,
        expected: String,
    },
    /// The write would take away inventory an active reservation depends on
    #[error("{resource}:{id} is in use by an active reservation")]
    InUse { resource: &'static str, id: PrimaryKey },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn stale(resource: &'static str, id: impl ToString, expected: impl ToString) -> Self {
        Self::Stale {
            resource,
            id: id.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Maps a refused slot claim or release on a room's schedule
    fn from_schedule(room_id: PrimaryKey, date: NaiveDate, error: ScheduleError) -> Self {
        match error {
            ScheduleError::Taken { index } => {
                Self::stale("room slot", format!("{room_id}@{date}#{index}"), "available")
            }
            ScheduleError::OutOfBounds { range, .. } => {
                Self::stale("room slots", format!("{room_id}@{date}#{range}"), "scheduled")
            }
            ScheduleError::EmptyRange => {
                Self::stale("room slots", format!("{room_id}@{date}"), "a non-empty range")
            }
            e => Self::Internal(Box::new(e)),
        }
    }
}

/// Refuses a schedule that would drop the slots of an active reservation on the
/// same room and date, or free the slots an approved one has claimed.
pub(crate) fn ensure_schedule_keeps(
    schedule: &RoomScheduleData,
    reservations: &[ReservationData],
) -> Result<()> {
    let bound = reservations.iter().filter(|r| {
        r.status.is_active()
            && r.item_type == ItemType::Room
            && r.item_id == schedule.room_id
            && r.start_date == schedule.date
    });

    for reservation in bound {
        let Some(range) = reservation.slots else {
            continue;
        };

        let kept = match schedule.slots.get(range.start..range.end) {
            Some(slots) if reservation.status == ReservationStatus::Approved => {
                slots.iter().all(|s| !s.is_available)
            }
            Some(_) => true,
            None => false,
        };

        if !kept {
            return Err(DatabaseError::InUse {
                resource: "room slot",
                id: reservation.id,
            });
        }
    }

    Ok(())
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can fetch and store TownBook data
#[async_trait]
pub trait Database: Send + Sync {
    async fn profile_by_id(&self, profile_id: PrimaryKey) -> Result<ProfileData>;
    async fn profile_by_email(&self, email: &str) -> Result<ProfileData>;
    async fn list_profiles(&self) -> Result<Vec<ProfileData>>;
    async fn create_profile(&self, new_profile: NewProfile) -> Result<ProfileData>;
    async fn update_profile_role(&self, profile_id: PrimaryKey, role: Role) -> Result<ProfileData>;

    async fn book_by_id(&self, book_id: PrimaryKey) -> Result<BookData>;
    async fn list_books(&self) -> Result<Vec<BookData>>;
    async fn create_book(&self, new_book: NewBook) -> Result<BookData>;
    async fn update_book(&self, updated_book: UpdatedBook) -> Result<BookData>;
    async fn delete_book(&self, book_id: PrimaryKey) -> Result<()>;

    async fn copy_by_id(&self, copy_id: PrimaryKey) -> Result<BookCopyData>;
    /// Lists the copies of a book, or of every book if none is given
    async fn list_copies(&self, book_id: Option<PrimaryKey>) -> Result<Vec<BookCopyData>>;
    async fn create_copy(&self, new_copy: NewBookCopy) -> Result<BookCopyData>;
    async fn update_copy(&self, updated_copy: UpdatedBookCopy) -> Result<BookCopyData>;
    /// Sets the status of a copy only if it's still `expected`
    async fn update_copy_status(
        &self,
        copy_id: PrimaryKey,
        expected: CopyStatus,
        new: CopyStatus,
    ) -> Result<BookCopyData>;
    /// Deletes a copy only if it's still available
    async fn delete_copy(&self, copy_id: PrimaryKey) -> Result<()>;

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData>;
    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()>;
    async fn room_schedule(&self, room_id: PrimaryKey, date: NaiveDate)
        -> Result<RoomScheduleData>;
    /// Creates or replaces the schedule of a room for a date, keeping the slots
    /// of active reservations in place. Checked and written as one unit.
    async fn put_room_schedule(&self, schedule: RoomScheduleData) -> Result<RoomScheduleData>;

    async fn reservation_by_id(&self, reservation_id: PrimaryKey) -> Result<ReservationData>;
    async fn list_reservations(&self, filter: ReservationFilter) -> Result<Vec<ReservationData>>;
    async fn create_reservation(&self, new_reservation: NewReservation)
        -> Result<ReservationData>;
    /// Applies a reservation change and its inventory change as one unit.
    /// Returns the reservation after the write, or none if it was deleted.
    async fn commit_reservation_write(
        &self,
        write: ReservationWrite,
    ) -> Result<Option<ReservationData>>;

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityData>;
    /// Lists activities, newest first
    async fn list_activities(&self, filter: ActivityFilter) -> Result<Vec<ActivityData>>;
    async fn mark_activities_processed(&self, activity_ids: &[PrimaryKey]) -> Result<()>;

    async fn notification_by_id(&self, notification_id: PrimaryKey) -> Result<NotificationData>;
    async fn create_notification(
        &self,
        new_notification: NewNotification,
    ) -> Result<NotificationData>;
    /// Lists the notifications of a user, newest first
    async fn list_notifications(&self, user_id: PrimaryKey) -> Result<Vec<NotificationData>>;
    async fn mark_notification_read(&self, notification_id: PrimaryKey)
        -> Result<NotificationData>;
}

#[derive(Debug)]
pub struct NewProfile {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genres: Vec<String>,
    pub language: String,
    pub page_count: i32,
    pub rating: f32,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Default)]
pub struct UpdatedBook {
    pub id: PrimaryKey,
    pub title: Option<String>,
    pub author: Option<String>,
    pub genres: Option<Vec<String>>,
    pub language: Option<String>,
    pub page_count: Option<i32>,
    pub rating: Option<f32>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug)]
pub struct NewBookCopy {
    pub book_id: PrimaryKey,
    pub location: String,
    pub condition: String,
}

/// Status is left out on purpose, it only changes through reservations.
#[derive(Debug, Default)]
pub struct UpdatedBookCopy {
    pub id: PrimaryKey,
    pub location: Option<String>,
    pub condition: Option<String>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub capacity: i32,
    pub amenities: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct UpdatedRoom {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub capacity: Option<i32>,
    pub amenities: Option<Vec<String>>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct NewReservation {
    pub user_id: PrimaryKey,
    pub item_type: ItemType,
    pub item_id: PrimaryKey,
    pub copy_id: Option<PrimaryKey>,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub slots: Option<SlotRange>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ReservationFilter {
    pub user_id: Option<PrimaryKey>,
    pub status: Option<ReservationStatus>,
    pub item_type: Option<ItemType>,
    pub item_id: Option<PrimaryKey>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &ReservationData) -> bool {
        self.user_id.map_or(true, |id| reservation.user_id == id)
            && self.status.map_or(true, |s| reservation.status == s)
            && self.item_type.map_or(true, |t| reservation.item_type == t)
            && self.item_id.map_or(true, |id| reservation.item_id == id)
    }
}

/// A guarded change to a reservation and the inventory unit it binds.
#[derive(Debug, Clone)]
pub struct ReservationWrite {
    pub reservation_id: PrimaryKey,
    /// The write is refused unless the reservation is still in this status
    pub expected: ReservationStatus,
    pub outcome: ReservationOutcome,
    /// Applied before the reservation change, in the same unit
    pub inventory: Option<InventoryWrite>,
}

#[derive(Debug, Clone)]
pub enum ReservationOutcome {
    /// Sets the status, optionally binding another book copy
    Transition {
        status: ReservationStatus,
        bind_copy: Option<PrimaryKey>,
    },
    Delete,
}

#[derive(Debug, Clone)]
pub enum InventoryWrite {
    Copy {
        copy_id: PrimaryKey,
        expected: CopyStatus,
        new: CopyStatus,
    },
    /// Refused if any slot in the range is already taken
    ClaimSlots {
        room_id: PrimaryKey,
        date: NaiveDate,
        slots: SlotRange,
    },
    /// A missing schedule is left alone
    ReleaseSlots {
        room_id: PrimaryKey,
        date: NaiveDate,
        slots: SlotRange,
    },
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Option<PrimaryKey>,
    pub user_name: String,
    pub action: String,
    pub description: String,
    pub item_id: Option<PrimaryKey>,
    pub item_type: Option<ItemType>,
}

#[derive(Debug, Default, Clone)]
pub struct ActivityFilter {
    pub user_id: Option<PrimaryKey>,
    pub unprocessed_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: PrimaryKey,
    pub title: String,
    pub message: String,
    pub related_reservation_id: Option<PrimaryKey>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        test_util::{future, Fixture},
        ReservationRequest, ReservationTarget,
    };

    #[test]
    fn test_refused_claims_are_stale() {
        let error = DatabaseError::from_schedule(
            4,
            future(1),
            ScheduleError::OutOfBounds {
                range: SlotRange::new(1, 3),
                len: 1,
            },
        );

        assert!(matches!(error, DatabaseError::Stale { .. }));
        assert!(matches!(
            DatabaseError::from_schedule(4, future(1), ScheduleError::Taken { index: 0 }),
            DatabaseError::Stale { .. }
        ));
    }

    #[tokio::test]
    async fn test_held_copy_is_not_deleted() {
        let fixture = Fixture::new().await;
        let (book_id, copies) = fixture.book("Moomin", 1).await;

        let reservation = fixture
            .library
            .lifecycle
            .request(
                &fixture.member,
                ReservationRequest {
                    user_id: None,
                    target: ReservationTarget::Book { book_id },
                    start_date: future(1),
                    end_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        fixture
            .library
            .lifecycle
            .approve(&fixture.librarian, reservation.id)
            .await
            .unwrap();

        assert!(matches!(
            fixture.database.delete_copy(copies[0]).await,
            Err(DatabaseError::InUse { id, .. }) if id == copies[0]
        ));

        let reservation = fixture.database.reservation_by_id(reservation.id).await.unwrap();
        assert_eq!(reservation.copy_id, Some(copies[0]));
        assert_eq!(
            fixture.database.copy_by_id(copies[0]).await.unwrap().status,
            CopyStatus::Reserved
        );
    }
}
