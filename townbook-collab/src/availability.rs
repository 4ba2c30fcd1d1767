use chrono::{NaiveDate, NaiveTime};
use townbook_core::{display_status, CopyStatus, DisplayStatus, ReservationStatus, SlotsExt};

use crate::{
    ensure_staff, today, LibraryContext, LibraryError, PrimaryKey, ProfileData,
    ReservationFilter, Result,
};

/// Answers what can be reserved right now
#[derive(Clone)]
pub struct Availability {
    context: LibraryContext,
}

/// A bookable slot of a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSlot {
    /// The position of the slot in the day's schedule
    pub index: usize,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookAvailability {
    pub book_id: PrimaryKey,
    pub available: usize,
    pub total: usize,
}

/// Totals shown on the librarian dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub books: usize,
    pub copies: usize,
    pub available_copies: usize,
    pub rooms: usize,
    pub pending_reservations: usize,
    pub approved_reservations: usize,
    pub overdue_reservations: usize,
}

impl Availability {
    pub fn new(context: &LibraryContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// The number of copies of a book with status `available`
    pub async fn available_copies_count(&self, book_id: PrimaryKey) -> Result<usize> {
        Ok(self.book_availability(book_id).await?.available)
    }

    pub async fn book_availability(&self, book_id: PrimaryKey) -> Result<BookAvailability> {
        // Ensure book exists
        let _ = self.context.database.book_by_id(book_id).await?;

        let copies = self.context.database.list_copies(Some(book_id)).await?;
        let available = copies
            .iter()
            .filter(|c| c.status == CopyStatus::Available)
            .count();

        Ok(BookAvailability {
            book_id,
            available,
            total: copies.len(),
        })
    }

    /// The slots of a room that are free on a date. A date without a schedule has none.
    pub async fn free_slots(&self, room_id: PrimaryKey, date: NaiveDate) -> Result<Vec<FreeSlot>> {
        // Ensure room exists
        let _ = self.context.database.room_by_id(room_id).await?;

        let schedule = match self.context.database.room_schedule(room_id, date).await {
            Ok(schedule) => schedule,
            Err(e) if e.is_not_found() => return Ok(vec![]),
            Err(e) => return Err(e),
        };

        Ok(schedule
            .slots
            .free()
            .into_iter()
            .map(|(index, slot)| FreeSlot {
                index,
                start: slot.start,
                end: slot.end,
            })
            .collect())
    }

    pub async fn stats(&self, actor: &ProfileData) -> std::result::Result<LibraryStats, LibraryError> {
        ensure_staff(actor, "view library stats")?;

        let db = &self.context.database;
        let today = today();

        let copies = db.list_copies(None).await?;
        let reservations = db.list_reservations(ReservationFilter::default()).await?;

        let count_status = |status: ReservationStatus| {
            reservations.iter().filter(|r| r.status == status).count()
        };

        Ok(LibraryStats {
            books: db.list_books().await?.len(),
            copies: copies.len(),
            available_copies: copies
                .iter()
                .filter(|c| c.status == CopyStatus::Available)
                .count(),
            rooms: db.list_rooms().await?.len(),
            pending_reservations: count_status(ReservationStatus::Pending),
            approved_reservations: count_status(ReservationStatus::Approved),
            overdue_reservations: reservations
                .iter()
                .filter(|r| display_status(r.status, r.end_date, today) == DisplayStatus::Overdue)
                .count(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        test_util::{future, time, Fixture},
        Database, ReservationRequest, ReservationTarget,
    };
    use townbook_core::SlotRange;

    #[tokio::test]
    async fn test_available_copies_count() {
        let fixture = Fixture::new().await;
        let availability = &fixture.library.availability;

        let (empty, _) = fixture.book("Empty Shelf", 0).await;
        assert_eq!(availability.available_copies_count(empty).await.unwrap(), 0);

        let (book_id, copies) = fixture.book("Full Shelf", 3).await;
        assert_eq!(availability.available_copies_count(book_id).await.unwrap(), 3);

        fixture
            .database
            .update_copy_status(copies[1], CopyStatus::Available, CopyStatus::CheckedOut)
            .await
            .unwrap();

        let counted = availability.book_availability(book_id).await.unwrap();
        assert_eq!(counted.available, 2);
        assert_eq!(counted.total, 3);

        assert!(availability
            .available_copies_count(9999)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_free_slots() {
        let fixture = Fixture::new().await;
        let availability = &fixture.library.availability;
        let date = future(2);
        let room_id = fixture.room("Group Room", date).await;

        let request = ReservationRequest {
            user_id: None,
            target: ReservationTarget::Room {
                room_id,
                slots: SlotRange::single(1),
            },
            start_date: date,
            end_date: None,
            notes: None,
        };

        let reservation = fixture
            .library
            .lifecycle
            .request(&fixture.member, request)
            .await
            .unwrap();
        fixture
            .library
            .lifecycle
            .approve(&fixture.librarian, reservation.id)
            .await
            .unwrap();

        let free = availability.free_slots(room_id, date).await.unwrap();
        assert_eq!(
            free,
            vec![
                FreeSlot {
                    index: 0,
                    start: time(9),
                    end: time(10)
                },
                FreeSlot {
                    index: 2,
                    start: time(11),
                    end: time(12)
                },
            ]
        );

        assert!(availability
            .free_slots(room_id, future(30))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let fixture = Fixture::new().await;
        let (book_id, _) = fixture.book("Counted", 2).await;

        let request = ReservationRequest {
            user_id: None,
            target: ReservationTarget::Book { book_id },
            start_date: future(1),
            end_date: None,
            notes: None,
        };

        let lifecycle = &fixture.library.lifecycle;
        let first = lifecycle.request(&fixture.member, request.clone()).await.unwrap();
        lifecycle.request(&fixture.member, request).await.unwrap();
        lifecycle.approve(&fixture.librarian, first.id).await.unwrap();

        assert!(fixture.library.availability.stats(&fixture.member).await.is_err());

        let stats = fixture
            .library
            .availability
            .stats(&fixture.librarian)
            .await
            .unwrap();

        assert_eq!(
            stats,
            LibraryStats {
                books: 1,
                copies: 2,
                available_copies: 1,
                rooms: 0,
                pending_reservations: 1,
                approved_reservations: 1,
                overdue_reservations: 0,
            }
        );
    }
}
