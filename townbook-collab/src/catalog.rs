use std::collections::HashMap;

use chrono::NaiveDate;
use log::info;
use townbook_core::{CopyStatus, ItemType, SlotsExt, TimeSlot};

use crate::{
    ensure_staff, BookCopyData, BookData, ChangeEvent, ChangeKind, LibraryContext, LibraryError,
    NewBook, NewBookCopy, NewRoom, PrimaryKey, ProfileData, ReservationData, ReservationFilter,
    RoomData, RoomScheduleData, Table, UpdatedBook, UpdatedBookCopy, UpdatedRoom,
};

type CatalogResult<T> = Result<T, LibraryError>;

/// Books, their copies and rooms. Writes are reserved to staff.
#[derive(Clone)]
pub struct Catalog {
    context: LibraryContext,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BookSort {
    #[default]
    Title,
    Author,
    /// Highest rated first
    Rating,
    /// Most recently added first
    Newest,
}

/// Filters for browsing the catalog
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    /// Matched against title and author, ignoring case
    pub search: Option<String>,
    pub genre: Option<String>,
    pub language: Option<String>,
    pub available_only: bool,
    pub sort: BookSort,
}

/// A book as listed in the catalog
#[derive(Debug, Clone)]
pub struct BookListing {
    pub book: BookData,
    pub available_copies: usize,
    pub total_copies: usize,
}

impl BookQuery {
    fn matches(&self, listing: &BookListing) -> bool {
        let book = &listing.book;

        let search_matches = self.search.as_ref().map_or(true, |search| {
            let search = search.to_lowercase();
            book.title.to_lowercase().contains(&search)
                || book.author.to_lowercase().contains(&search)
        });

        let genre_matches = self.genre.as_ref().map_or(true, |genre| {
            book.genres.iter().any(|g| g.eq_ignore_ascii_case(genre))
        });

        let language_matches = self
            .language
            .as_ref()
            .map_or(true, |language| book.language.eq_ignore_ascii_case(language));

        let availability_matches = !self.available_only || listing.available_copies > 0;

        search_matches && genre_matches && language_matches && availability_matches
    }

    fn sort(&self, listings: &mut [BookListing]) {
        match self.sort {
            BookSort::Title => listings.sort_by_key(|l| l.book.title.to_lowercase()),
            BookSort::Author => listings.sort_by_key(|l| l.book.author.to_lowercase()),
            BookSort::Rating => {
                listings.sort_by(|a, b| b.book.rating.total_cmp(&a.book.rating))
            }
            BookSort::Newest => listings.sort_by(|a, b| {
                b.book
                    .created_at
                    .cmp(&a.book.created_at)
                    .then(b.book.id.cmp(&a.book.id))
            }),
        }
    }
}

impl Catalog {
    pub fn new(context: &LibraryContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Lists the books matching the query, with their copy counts
    pub async fn books(&self, query: &BookQuery) -> CatalogResult<Vec<BookListing>> {
        let books = self.context.database.list_books().await?;
        let copies = self.context.database.list_copies(None).await?;

        let mut counts: HashMap<PrimaryKey, (usize, usize)> = HashMap::new();
        for copy in &copies {
            let (available, total) = counts.entry(copy.book_id).or_default();

            *total += 1;
            if copy.status == CopyStatus::Available {
                *available += 1;
            }
        }

        let mut listings: Vec<_> = books
            .into_iter()
            .map(|book| {
                let (available_copies, total_copies) =
                    counts.get(&book.id).copied().unwrap_or_default();

                BookListing {
                    book,
                    available_copies,
                    total_copies,
                }
            })
            .filter(|l| query.matches(l))
            .collect();

        query.sort(&mut listings);
        Ok(listings)
    }

    pub async fn book(&self, book_id: PrimaryKey) -> CatalogResult<BookData> {
        Ok(self.context.database.book_by_id(book_id).await?)
    }

    pub async fn create_book(&self, actor: &ProfileData, new_book: NewBook) -> CatalogResult<BookData> {
        ensure_staff(actor, "add books")?;
        validate_book(&new_book.title, new_book.page_count, new_book.rating)?;

        let book = self.context.database.create_book(new_book).await?;

        info!("{} added book \"{}\"", actor.name, book.title);
        self.context
            .emit(ChangeEvent::new(Table::Books, ChangeKind::Insert, book.id));

        Ok(book)
    }

    pub async fn update_book(
        &self,
        actor: &ProfileData,
        updated_book: UpdatedBook,
    ) -> CatalogResult<BookData> {
        ensure_staff(actor, "edit books")?;
        validate_book(
            updated_book.title.as_deref().unwrap_or("untitled"),
            updated_book.page_count.unwrap_or(0),
            updated_book.rating.unwrap_or(0.),
        )?;

        let book = self.context.database.update_book(updated_book).await?;

        self.context
            .emit(ChangeEvent::new(Table::Books, ChangeKind::Update, book.id));

        Ok(book)
    }

    /// Deletes a book and its copies, unless it's reserved
    pub async fn delete_book(&self, actor: &ProfileData, book_id: PrimaryKey) -> CatalogResult<()> {
        ensure_staff(actor, "delete books")?;

        if !self.active_reservations(ItemType::Book, book_id).await?.is_empty() {
            return Err(LibraryError::InUse {
                resource: "book",
                id: book_id,
            });
        }

        self.context.database.delete_book(book_id).await?;

        info!("{} deleted book {}", actor.name, book_id);
        self.context
            .emit(ChangeEvent::new(Table::Books, ChangeKind::Delete, book_id));

        Ok(())
    }

    pub async fn copies(&self, book_id: PrimaryKey) -> CatalogResult<Vec<BookCopyData>> {
        // Ensure book exists
        let _ = self.context.database.book_by_id(book_id).await?;

        Ok(self.context.database.list_copies(Some(book_id)).await?)
    }

    /// Adds an available copy of a book
    pub async fn add_copy(
        &self,
        actor: &ProfileData,
        new_copy: NewBookCopy,
    ) -> CatalogResult<BookCopyData> {
        ensure_staff(actor, "add copies")?;

        let copy = self.context.database.create_copy(new_copy).await?;

        self.context
            .emit(ChangeEvent::new(Table::BookCopies, ChangeKind::Insert, copy.id));

        Ok(copy)
    }

    /// Changes where a copy is kept or its condition. The status is left to reservations.
    pub async fn update_copy(
        &self,
        actor: &ProfileData,
        updated_copy: UpdatedBookCopy,
    ) -> CatalogResult<BookCopyData> {
        ensure_staff(actor, "edit copies")?;

        let copy = self.context.database.update_copy(updated_copy).await?;

        self.context
            .emit(ChangeEvent::new(Table::BookCopies, ChangeKind::Update, copy.id));

        Ok(copy)
    }

    /// Deletes a copy, unless a reservation holds it
    pub async fn delete_copy(&self, actor: &ProfileData, copy_id: PrimaryKey) -> CatalogResult<()> {
        ensure_staff(actor, "delete copies")?;

        self.context.database.delete_copy(copy_id).await?;

        self.context
            .emit(ChangeEvent::new(Table::BookCopies, ChangeKind::Delete, copy_id));

        Ok(())
    }

    pub async fn rooms(&self) -> CatalogResult<Vec<RoomData>> {
        Ok(self.context.database.list_rooms().await?)
    }

    pub async fn room(&self, room_id: PrimaryKey) -> CatalogResult<RoomData> {
        Ok(self.context.database.room_by_id(room_id).await?)
    }

    pub async fn create_room(&self, actor: &ProfileData, new_room: NewRoom) -> CatalogResult<RoomData> {
        ensure_staff(actor, "add rooms")?;
        validate_room(&new_room.name, new_room.capacity)?;

        let room = self.context.database.create_room(new_room).await?;

        info!("{} added room \"{}\"", actor.name, room.name);
        self.context
            .emit(ChangeEvent::new(Table::Rooms, ChangeKind::Insert, room.id));

        Ok(room)
    }

    pub async fn update_room(
        &self,
        actor: &ProfileData,
        updated_room: UpdatedRoom,
    ) -> CatalogResult<RoomData> {
        ensure_staff(actor, "edit rooms")?;
        validate_room(
            updated_room.name.as_deref().unwrap_or("unnamed"),
            updated_room.capacity.unwrap_or(1),
        )?;

        let room = self.context.database.update_room(updated_room).await?;

        self.context
            .emit(ChangeEvent::new(Table::Rooms, ChangeKind::Update, room.id));

        Ok(room)
    }

    /// Deletes a room and its schedules, unless it's reserved
    pub async fn delete_room(&self, actor: &ProfileData, room_id: PrimaryKey) -> CatalogResult<()> {
        ensure_staff(actor, "delete rooms")?;

        if !self.active_reservations(ItemType::Room, room_id).await?.is_empty() {
            return Err(LibraryError::InUse {
                resource: "room",
                id: room_id,
            });
        }

        self.context.database.delete_room(room_id).await?;

        info!("{} deleted room {}", actor.name, room_id);
        self.context
            .emit(ChangeEvent::new(Table::Rooms, ChangeKind::Delete, room_id));

        Ok(())
    }

    /// The schedule of a room on a date. A date without one has no slots.
    pub async fn schedule(&self, room_id: PrimaryKey, date: NaiveDate) -> CatalogResult<RoomScheduleData> {
        let db = &self.context.database;

        // Ensure room exists
        let _ = db.room_by_id(room_id).await?;

        match db.room_schedule(room_id, date).await {
            Ok(schedule) => Ok(schedule),
            Err(e) if e.is_not_found() => Ok(RoomScheduleData {
                room_id,
                date,
                slots: vec![],
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the slots of a room on a date.
    /// Active reservations keep their slots, and approved ones keep them taken.
    pub async fn set_schedule(
        &self,
        actor: &ProfileData,
        room_id: PrimaryKey,
        date: NaiveDate,
        slots: Vec<TimeSlot>,
    ) -> CatalogResult<RoomScheduleData> {
        ensure_staff(actor, "edit room schedules")?;

        slots
            .validate()
            .map_err(|e| LibraryError::Validation(e.to_string()))?;

        let schedule = self
            .context
            .database
            .put_room_schedule(RoomScheduleData {
                room_id,
                date,
                slots,
            })
            .await?;

        self.context
            .emit(ChangeEvent::new(Table::RoomAvailability, ChangeKind::Update, room_id));

        Ok(schedule)
    }

    async fn active_reservations(
        &self,
        item_type: ItemType,
        item_id: PrimaryKey,
    ) -> CatalogResult<Vec<ReservationData>> {
        let reservations = self
            .context
            .database
            .list_reservations(ReservationFilter {
                item_type: Some(item_type),
                item_id: Some(item_id),
                ..Default::default()
            })
            .await?;

        Ok(reservations
            .into_iter()
            .filter(|r| r.status.is_active())
            .collect())
    }
}

fn validate_book(title: &str, page_count: i32, rating: f32) -> CatalogResult<()> {
    if title.trim().is_empty() {
        return Err(LibraryError::Validation("Title must not be empty".to_string()));
    }

    if page_count < 0 {
        return Err(LibraryError::Validation(
            "Page count must not be negative".to_string(),
        ));
    }

    if !(0. ..=5.).contains(&rating) {
        return Err(LibraryError::Validation(
            "Rating must be between 0 and 5".to_string(),
        ));
    }

    Ok(())
}

fn validate_room(name: &str, capacity: i32) -> CatalogResult<()> {
    if name.trim().is_empty() {
        return Err(LibraryError::Validation("Name must not be empty".to_string()));
    }

    if capacity < 1 {
        return Err(LibraryError::Validation(
            "Capacity must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        test_util::{future, time, Fixture},
        ReservationRequest, ReservationTarget,
    };
    use townbook_core::SlotRange;

    fn new_book(title: &str, author: &str, genre: &str, rating: f32) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: author.to_string(),
            genres: vec![genre.to_string()],
            language: "en".to_string(),
            page_count: 300,
            rating,
            description: None,
            cover_url: None,
        }
    }

    #[tokio::test]
    async fn test_only_staff_edit_the_catalog() {
        let fixture = Fixture::new().await;
        let catalog = &fixture.library.catalog;

        assert!(matches!(
            catalog
                .create_book(&fixture.member, new_book("Dune", "Frank Herbert", "Sci-Fi", 4.6))
                .await,
            Err(LibraryError::Forbidden(_))
        ));

        assert!(matches!(
            catalog
                .create_book(&fixture.librarian, new_book(" ", "Nobody", "Sci-Fi", 4.))
                .await,
            Err(LibraryError::Validation(_))
        ));

        assert!(matches!(
            catalog
                .create_book(&fixture.librarian, new_book("Dune", "Frank Herbert", "Sci-Fi", 6.))
                .await,
            Err(LibraryError::Validation(_))
        ));

        let book = catalog
            .create_book(&fixture.librarian, new_book("Dune", "Frank Herbert", "Sci-Fi", 4.6))
            .await
            .unwrap();

        let updated = catalog
            .update_book(
                &fixture.librarian,
                UpdatedBook {
                    id: book.id,
                    rating: Some(4.8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Dune");
        assert_eq!(updated.rating, 4.8);
    }

    #[tokio::test]
    async fn test_browse_books() {
        let fixture = Fixture::new().await;
        let catalog = &fixture.library.catalog;

        for (title, author, genre, rating) in [
            ("Dune", "Frank Herbert", "Sci-Fi", 4.6),
            ("Emma", "Jane Austen", "Romance", 4.0),
            ("Solaris", "Stanisław Lem", "Sci-Fi", 4.2),
        ] {
            let book = catalog
                .create_book(&fixture.librarian, new_book(title, author, genre, rating))
                .await
                .unwrap();

            if title != "Solaris" {
                catalog
                    .add_copy(
                        &fixture.librarian,
                        NewBookCopy {
                            book_id: book.id,
                            location: "B1".to_string(),
                            condition: "new".to_string(),
                        },
                    )
                    .await
                    .unwrap();
            }
        }

        let titles = |listings: Vec<BookListing>| -> Vec<String> {
            listings.into_iter().map(|l| l.book.title).collect()
        };

        let all = catalog.books(&BookQuery::default()).await.unwrap();
        assert_eq!(all[0].available_copies, 1);
        assert_eq!(titles(all), vec!["Dune", "Emma", "Solaris"]);

        let sci_fi = BookQuery {
            genre: Some("sci-fi".to_string()),
            sort: BookSort::Rating,
            ..Default::default()
        };
        assert_eq!(
            titles(catalog.books(&sci_fi).await.unwrap()),
            vec!["Dune", "Solaris"]
        );

        let available = BookQuery {
            genre: Some("sci-fi".to_string()),
            available_only: true,
            ..Default::default()
        };
        assert_eq!(titles(catalog.books(&available).await.unwrap()), vec!["Dune"]);

        let search = BookQuery {
            search: Some("AUSTEN".to_string()),
            ..Default::default()
        };
        assert_eq!(titles(catalog.books(&search).await.unwrap()), vec!["Emma"]);
    }

    #[tokio::test]
    async fn test_reserved_inventory_cannot_be_deleted() {
        let fixture = Fixture::new().await;
        let catalog = &fixture.library.catalog;
        let lifecycle = &fixture.library.lifecycle;
        let (book_id, copies) = fixture.book("Kept", 2).await;

        let reservation = lifecycle
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
        lifecycle.approve(&fixture.librarian, reservation.id).await.unwrap();

        assert!(matches!(
            catalog.delete_copy(&fixture.librarian, copies[0]).await,
            Err(LibraryError::InUse { .. })
        ));
        assert!(matches!(
            catalog.delete_book(&fixture.librarian, book_id).await,
            Err(LibraryError::InUse { .. })
        ));

        catalog.delete_copy(&fixture.librarian, copies[1]).await.unwrap();

        lifecycle
            .complete_return(&fixture.member, reservation.id)
            .await
            .unwrap();
        catalog.delete_book(&fixture.librarian, book_id).await.unwrap();

        assert!(catalog.copies(book_id).await.is_err());
    }

    #[tokio::test]
    async fn test_schedule_keeps_claimed_slots() {
        let fixture = Fixture::new().await;
        let catalog = &fixture.library.catalog;
        let date = future(5);
        let room_id = fixture.room("Maker Space", date).await;

        let reservation = fixture
            .library
            .lifecycle
            .request(
                &fixture.member,
                ReservationRequest {
                    user_id: None,
                    target: ReservationTarget::Room {
                        room_id,
                        slots: SlotRange::single(2),
                    },
                    start_date: date,
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

        let fresh: Vec<_> = (9..12).map(|h| TimeSlot::new(time(h), time(h + 1))).collect();
        assert!(matches!(
            catalog
                .set_schedule(&fixture.librarian, room_id, date, fresh.clone())
                .await,
            Err(LibraryError::InUse { .. })
        ));

        let shorter = fresh[..2].to_vec();
        assert!(matches!(
            catalog.set_schedule(&fixture.librarian, room_id, date, shorter).await,
            Err(LibraryError::InUse { .. })
        ));

        let overlapping = vec![
            TimeSlot::new(time(9), time(11)),
            TimeSlot::new(time(10), time(12)),
        ];
        assert!(matches!(
            catalog
                .set_schedule(&fixture.librarian, room_id, future(6), overlapping)
                .await,
            Err(LibraryError::Validation(_))
        ));

        let mut kept = fresh;
        kept[2].is_available = false;
        kept.push(TimeSlot::new(time(12), time(13)));
        let schedule = catalog
            .set_schedule(&fixture.librarian, room_id, date, kept)
            .await
            .unwrap();
        assert_eq!(schedule.slots.len(), 4);

        let empty = catalog.schedule(room_id, future(7)).await.unwrap();
        assert!(empty.slots.is_empty());
    }

    #[tokio::test]
    async fn test_schedule_keeps_pending_ranges() {
        let fixture = Fixture::new().await;
        let catalog = &fixture.library.catalog;
        let lifecycle = &fixture.library.lifecycle;
        let date = future(5);
        let room_id = fixture.room("Group Room", date).await;

        let pending = lifecycle
            .request(
                &fixture.member,
                ReservationRequest {
                    user_id: None,
                    target: ReservationTarget::Room {
                        room_id,
                        slots: SlotRange::new(1, 3),
                    },
                    start_date: date,
                    end_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let single = vec![TimeSlot::new(time(9), time(10))];
        assert!(matches!(
            catalog.set_schedule(&fixture.librarian, room_id, date, single).await,
            Err(LibraryError::InUse { id, .. }) if id == pending.id
        ));

        let schedule = catalog.schedule(room_id, date).await.unwrap();
        assert_eq!(schedule.slots.len(), 3);

        let approved = lifecycle.approve(&fixture.librarian, pending.id).await.unwrap();
        assert_eq!(approved.status, townbook_core::ReservationStatus::Approved);
    }
}
