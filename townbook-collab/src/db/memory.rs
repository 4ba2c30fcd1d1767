use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use townbook_core::{CopyStatus, Role, SlotsExt, TimeSlot};

use super::ensure_schedule_keeps;
use crate::{
    ActivityData, ActivityFilter, BookCopyData, BookData, Database, DatabaseError,
    DatabaseResult, InventoryWrite, NewActivity, NewBook, NewBookCopy, NewNotification,
    NewProfile, NewReservation, NewRoom, NotificationData, PrimaryKey, ProfileData,
    ReservationData, ReservationFilter, ReservationOutcome, ReservationWrite, Result, RoomData,
    RoomScheduleData, UpdatedBook, UpdatedBookCopy, UpdatedRoom,
};

/// An in-process database, used for tests and when no database url is configured.
/// Every operation holds a single lock over all tables, so multi-table writes are atomic.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
    #[cfg(test)]
    rejected: Mutex<Vec<crate::Table>>,
}

#[derive(Default)]
struct Tables {
    last_id: PrimaryKey,
    profiles: BTreeMap<PrimaryKey, ProfileData>,
    books: BTreeMap<PrimaryKey, BookData>,
    copies: BTreeMap<PrimaryKey, BookCopyData>,
    rooms: BTreeMap<PrimaryKey, RoomData>,
    schedules: BTreeMap<(PrimaryKey, NaiveDate), Vec<TimeSlot>>,
    reservations: BTreeMap<PrimaryKey, ReservationData>,
    activities: BTreeMap<PrimaryKey, ActivityData>,
    notifications: BTreeMap<PrimaryKey, NotificationData>,
}

impl Tables {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following insert into the table fail
    #[cfg(test)]
    pub fn reject_writes_to(&self, table: crate::Table) {
        self.rejected.lock().push(table)
    }

    #[cfg(test)]
    fn check_rejected(&self, table: crate::Table) -> Result<()> {
        if self.rejected.lock().contains(&table) {
            return Err(DatabaseError::Internal(
                format!("writes to {} are rejected", table).into(),
            ));
        }

        Ok(())
    }

    #[cfg(not(test))]
    fn check_rejected(&self, _: crate::Table) -> Result<()> {
        Ok(())
    }
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn profile_by_id(&self, profile_id: PrimaryKey) -> Result<ProfileData> {
        self.tables
            .lock()
            .profiles
            .get(&profile_id)
            .cloned()
            .ok_or_else(|| not_found("profile", "id"))
    }

    async fn profile_by_email(&self, email: &str) -> Result<ProfileData> {
        self.tables
            .lock()
            .profiles
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| not_found("profile", "email"))
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileData>> {
        Ok(self.tables.lock().profiles.values().cloned().collect())
    }

    async fn create_profile(&self, new_profile: NewProfile) -> Result<ProfileData> {
        self.profile_by_email(&new_profile.email)
            .await
            .conflict_or_ok("profile", "email", &new_profile.email)?;

        let mut tables = self.tables.lock();

        let profile = ProfileData {
            id: tables.next_id(),
            name: new_profile.name,
            email: new_profile.email,
            role: new_profile.role,
            created_at: Utc::now(),
        };

        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update_profile_role(&self, profile_id: PrimaryKey, role: Role) -> Result<ProfileData> {
        let mut tables = self.tables.lock();

        let profile = tables
            .profiles
            .get_mut(&profile_id)
            .ok_or_else(|| not_found("profile", "id"))?;

        profile.role = role;
        Ok(profile.clone())
    }

    async fn book_by_id(&self, book_id: PrimaryKey) -> Result<BookData> {
        self.tables
            .lock()
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| not_found("book", "id"))
    }

    async fn list_books(&self) -> Result<Vec<BookData>> {
        Ok(self.tables.lock().books.values().cloned().collect())
    }

    async fn create_book(&self, new_book: NewBook) -> Result<BookData> {
        let mut tables = self.tables.lock();

        let book = BookData {
            id: tables.next_id(),
            title: new_book.title,
            author: new_book.author,
            genres: new_book.genres,
            language: new_book.language,
            page_count: new_book.page_count,
            rating: new_book.rating,
            description: new_book.description,
            cover_url: new_book.cover_url,
            created_at: Utc::now(),
        };

        tables.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn update_book(&self, updated_book: UpdatedBook) -> Result<BookData> {
        let mut tables = self.tables.lock();

        let book = tables
            .books
            .get_mut(&updated_book.id)
            .ok_or_else(|| not_found("book", "id"))?;

        if let Some(title) = updated_book.title {
            book.title = title;
        }
        if let Some(author) = updated_book.author {
            book.author = author;
        }
        if let Some(genres) = updated_book.genres {
            book.genres = genres;
        }
        if let Some(language) = updated_book.language {
            book.language = language;
        }
        if let Some(page_count) = updated_book.page_count {
            book.page_count = page_count;
        }
        if let Some(rating) = updated_book.rating {
            book.rating = rating;
        }
        book.description = updated_book.description.or(book.description.take());
        book.cover_url = updated_book.cover_url.or(book.cover_url.take());

        Ok(book.clone())
    }

    async fn delete_book(&self, book_id: PrimaryKey) -> Result<()> {
        let mut guard = self.tables.lock();
        let tables = &mut *guard;

        tables
            .books
            .remove(&book_id)
            .ok_or_else(|| not_found("book", "id"))?;

        // Copies go with the book
        let removed: Vec<_> = tables
            .copies
            .values()
            .filter(|c| c.book_id == book_id)
            .map(|c| c.id)
            .collect();

        for copy_id in removed {
            tables.copies.remove(&copy_id);
            unbind_copy(tables, copy_id);
        }

        Ok(())
    }

    async fn copy_by_id(&self, copy_id: PrimaryKey) -> Result<BookCopyData> {
        self.tables
            .lock()
            .copies
            .get(&copy_id)
            .cloned()
            .ok_or_else(|| not_found("book copy", "id"))
    }

    async fn list_copies(&self, book_id: Option<PrimaryKey>) -> Result<Vec<BookCopyData>> {
        Ok(self
            .tables
            .lock()
            .copies
            .values()
            .filter(|c| book_id.map_or(true, |id| c.book_id == id))
            .cloned()
            .collect())
    }

    async fn create_copy(&self, new_copy: NewBookCopy) -> Result<BookCopyData> {
        let mut tables = self.tables.lock();

        if !tables.books.contains_key(&new_copy.book_id) {
            return Err(not_found("book", "id"));
        }

        let copy = BookCopyData {
            id: tables.next_id(),
            book_id: new_copy.book_id,
            status: CopyStatus::Available,
            location: new_copy.location,
            condition: new_copy.condition,
        };

        tables.copies.insert(copy.id, copy.clone());
        Ok(copy)
    }

    async fn update_copy(&self, updated_copy: UpdatedBookCopy) -> Result<BookCopyData> {
        let mut tables = self.tables.lock();

        let copy = tables
            .copies
            .get_mut(&updated_copy.id)
            .ok_or_else(|| not_found("book copy", "id"))?;

        if let Some(location) = updated_copy.location {
            copy.location = location;
        }
        if let Some(condition) = updated_copy.condition {
            copy.condition = condition;
        }

        Ok(copy.clone())
    }

    async fn update_copy_status(
        &self,
        copy_id: PrimaryKey,
        expected: CopyStatus,
        new: CopyStatus,
    ) -> Result<BookCopyData> {
        let mut tables = self.tables.lock();

        let copy = tables
            .copies
            .get_mut(&copy_id)
            .ok_or_else(|| not_found("book copy", "id"))?;

        if copy.status != expected {
            return Err(DatabaseError::stale("book copy", copy_id, expected));
        }

        copy.status = new;
        Ok(copy.clone())
    }

    async fn delete_copy(&self, copy_id: PrimaryKey) -> Result<()> {
        let mut guard = self.tables.lock();
        let tables = &mut *guard;

        let copy = tables
            .copies
            .get(&copy_id)
            .ok_or_else(|| not_found("book copy", "id"))?;

        if copy.status.is_held() {
            return Err(DatabaseError::InUse {
                resource: "book copy",
                id: copy_id,
            });
        }

        tables.copies.remove(&copy_id);
        unbind_copy(tables, copy_id);
        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.tables
            .lock()
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| not_found("room", "id"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self.tables.lock().rooms.values().cloned().collect())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut tables = self.tables.lock();

        let room = RoomData {
            id: tables.next_id(),
            name: new_room.name,
            capacity: new_room.capacity,
            amenities: new_room.amenities,
            description: new_room.description,
        };

        tables.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        let mut tables = self.tables.lock();

        let room = tables
            .rooms
            .get_mut(&updated_room.id)
            .ok_or_else(|| not_found("room", "id"))?;

        if let Some(name) = updated_room.name {
            room.name = name;
        }
        if let Some(capacity) = updated_room.capacity {
            room.capacity = capacity;
        }
        if let Some(amenities) = updated_room.amenities {
            room.amenities = amenities;
        }
        room.description = updated_room.description.or(room.description.take());

        Ok(room.clone())
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let mut tables = self.tables.lock();

        tables
            .rooms
            .remove(&room_id)
            .ok_or_else(|| not_found("room", "id"))?;

        tables.schedules.retain(|(id, _), _| *id != room_id);
        Ok(())
    }

    async fn room_schedule(
        &self,
        room_id: PrimaryKey,
        date: NaiveDate,
    ) -> Result<RoomScheduleData> {
        self.tables
            .lock()
            .schedules
            .get(&(room_id, date))
            .map(|slots| RoomScheduleData {
                room_id,
                date,
                slots: slots.clone(),
            })
            .ok_or_else(|| not_found("room schedule", "room_id:date"))
    }

    async fn put_room_schedule(&self, schedule: RoomScheduleData) -> Result<RoomScheduleData> {
        let mut tables = self.tables.lock();

        if !tables.rooms.contains_key(&schedule.room_id) {
            return Err(not_found("room", "id"));
        }

        let reservations: Vec<_> = tables.reservations.values().cloned().collect();
        ensure_schedule_keeps(&schedule, &reservations)?;

        tables
            .schedules
            .insert((schedule.room_id, schedule.date), schedule.slots.clone());

        Ok(schedule)
    }

    async fn reservation_by_id(&self, reservation_id: PrimaryKey) -> Result<ReservationData> {
        self.tables
            .lock()
            .reservations
            .get(&reservation_id)
            .cloned()
            .ok_or_else(|| not_found("reservation", "id"))
    }

    async fn list_reservations(&self, filter: ReservationFilter) -> Result<Vec<ReservationData>> {
        Ok(self
            .tables
            .lock()
            .reservations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn create_reservation(
        &self,
        new_reservation: NewReservation,
    ) -> Result<ReservationData> {
        let mut tables = self.tables.lock();

        if !tables.profiles.contains_key(&new_reservation.user_id) {
            return Err(not_found("profile", "id"));
        }

        let now = Utc::now();
        let reservation = ReservationData {
            id: tables.next_id(),
            user_id: new_reservation.user_id,
            item_type: new_reservation.item_type,
            item_id: new_reservation.item_id,
            copy_id: new_reservation.copy_id,
            title: new_reservation.title,
            start_date: new_reservation.start_date,
            end_date: new_reservation.end_date,
            slots: new_reservation.slots,
            status: townbook_core::ReservationStatus::Pending,
            notes: new_reservation.notes,
            created_at: now,
            updated_at: now,
        };

        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn commit_reservation_write(
        &self,
        write: ReservationWrite,
    ) -> Result<Option<ReservationData>> {
        let mut guard = self.tables.lock();
        let tables = &mut *guard;

        let current = tables
            .reservations
            .get(&write.reservation_id)
            .map(|r| r.status)
            .ok_or_else(|| not_found("reservation", "id"))?;

        if current != write.expected {
            return Err(DatabaseError::stale(
                "reservation",
                write.reservation_id,
                write.expected,
            ));
        }

        // Nothing below may fail once the inventory has been touched
        match write.inventory {
            Some(InventoryWrite::Copy {
                copy_id,
                expected,
                new,
            }) => {
                let copy = tables
                    .copies
                    .get_mut(&copy_id)
                    .ok_or_else(|| not_found("book copy", "id"))?;

                if copy.status != expected {
                    return Err(DatabaseError::stale("book copy", copy_id, expected));
                }

                copy.status = new;
            }
            Some(InventoryWrite::ClaimSlots {
                room_id,
                date,
                slots,
            }) => {
                tables
                    .schedules
                    .get_mut(&(room_id, date))
                    .ok_or_else(|| not_found("room schedule", "room_id:date"))?
                    .claim(slots)
                    .map_err(|e| DatabaseError::from_schedule(room_id, date, e))?;
            }
            Some(InventoryWrite::ReleaseSlots {
                room_id,
                date,
                slots,
            }) => {
                if let Some(schedule) = tables.schedules.get_mut(&(room_id, date)) {
                    schedule
                        .release(slots)
                        .map_err(|e| DatabaseError::from_schedule(room_id, date, e))?;
                }
            }
            None => {}
        }

        match write.outcome {
            ReservationOutcome::Transition { status, bind_copy } => {
                let reservation = tables
                    .reservations
                    .get_mut(&write.reservation_id)
                    .ok_or_else(|| not_found("reservation", "id"))?;

                reservation.status = status;
                reservation.updated_at = Utc::now();

                if bind_copy.is_some() {
                    reservation.copy_id = bind_copy;
                }

                Ok(Some(reservation.clone()))
            }
            ReservationOutcome::Delete => {
                tables.reservations.remove(&write.reservation_id);

                tables
                    .notifications
                    .values_mut()
                    .filter(|n| n.related_reservation_id == Some(write.reservation_id))
                    .for_each(|n| n.related_reservation_id = None);

                Ok(None)
            }
        }
    }

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityData> {
        self.check_rejected(crate::Table::Activities)?;
        let mut tables = self.tables.lock();

        let activity = ActivityData {
            id: tables.next_id(),
            user_id: new_activity.user_id,
            user_name: new_activity.user_name,
            action: new_activity.action,
            description: new_activity.description,
            item_id: new_activity.item_id,
            item_type: new_activity.item_type,
            is_processed: false,
            timestamp: Utc::now(),
        };

        tables.activities.insert(activity.id, activity.clone());
        Ok(activity)
    }

    async fn list_activities(&self, filter: ActivityFilter) -> Result<Vec<ActivityData>> {
        let tables = self.tables.lock();

        let activities = tables
            .activities
            .values()
            .rev()
            .filter(|a| filter.user_id.map_or(true, |id| a.user_id == Some(id)))
            .filter(|a| !filter.unprocessed_only || !a.is_processed)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(activities)
    }

    async fn mark_activities_processed(&self, activity_ids: &[PrimaryKey]) -> Result<()> {
        let mut tables = self.tables.lock();

        for id in activity_ids {
            if let Some(activity) = tables.activities.get_mut(id) {
                activity.is_processed = true;
            }
        }

        Ok(())
    }

    async fn notification_by_id(&self, notification_id: PrimaryKey) -> Result<NotificationData> {
        self.tables
            .lock()
            .notifications
            .get(&notification_id)
            .cloned()
            .ok_or_else(|| not_found("notification", "id"))
    }

    async fn create_notification(
        &self,
        new_notification: NewNotification,
    ) -> Result<NotificationData> {
        self.check_rejected(crate::Table::Notifications)?;
        let mut tables = self.tables.lock();

        let notification = NotificationData {
            id: tables.next_id(),
            user_id: new_notification.user_id,
            title: new_notification.title,
            message: new_notification.message,
            is_read: false,
            related_reservation_id: new_notification.related_reservation_id,
            created_at: Utc::now(),
        };

        tables
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self, user_id: PrimaryKey) -> Result<Vec<NotificationData>> {
        Ok(self
            .tables
            .lock()
            .notifications
            .values()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        notification_id: PrimaryKey,
    ) -> Result<NotificationData> {
        let mut tables = self.tables.lock();

        let notification = tables
            .notifications
            .get_mut(&notification_id)
            .ok_or_else(|| not_found("notification", "id"))?;

        notification.is_read = true;
        Ok(notification.clone())
    }
}

/// Mirrors `ON DELETE SET NULL` of reservations.copy_id
fn unbind_copy(tables: &mut Tables, copy_id: PrimaryKey) {
    tables
        .reservations
        .values_mut()
        .filter(|r| r.copy_id == Some(copy_id))
        .for_each(|r| r.copy_id = None);
}
