use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    postgres::PgPoolOptions, query, query_as, query_scalar, types::Json, Error as SqlxError,
    FromRow, PgPool,
};
use townbook_core::{CopyStatus, ItemType, ReservationStatus, Role, SlotRange, SlotsExt, TimeSlot};

use super::ensure_schedule_keeps;
use crate::{
    ActivityData, ActivityFilter, BookCopyData, BookData, Database, DatabaseError,
    DatabaseResult, IntoDatabaseError, InventoryWrite, NewActivity, NewBook, NewBookCopy,
    NewNotification, NewProfile, NewReservation, NewRoom, NotificationData, PrimaryKey,
    ProfileData, ReservationData, ReservationFilter, ReservationOutcome, ReservationWrite,
    Result, RoomData, RoomScheduleData, UpdatedBook, UpdatedBookCopy, UpdatedRoom,
};

/// A postgres database implementation for TownBook
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct ProfileRow {
    id: i32,
    name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CopyRow {
    id: i32,
    book_id: i32,
    status: String,
    location: String,
    condition: String,
}

#[derive(FromRow)]
struct ScheduleRow {
    room_id: i32,
    date: NaiveDate,
    slots: Json<Vec<TimeSlot>>,
}

#[derive(FromRow)]
struct ReservationRow {
    id: i32,
    user_id: i32,
    item_type: String,
    item_id: i32,
    copy_id: Option<i32>,
    title: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    slot_start: Option<i32>,
    slot_end: Option<i32>,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ActivityRow {
    id: i32,
    user_id: Option<i32>,
    user_name: String,
    action: String,
    description: String,
    item_id: Option<i32>,
    item_type: Option<String>,
    is_processed: bool,
    timestamp: DateTime<Utc>,
}

/// Parses a text column into one of the domain enums
fn parse<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| DatabaseError::Internal(Box::new(e)))
}

impl TryFrom<ProfileRow> for ProfileData {
    type Error = DatabaseError;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            role: parse(&row.role)?,
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<CopyRow> for BookCopyData {
    type Error = DatabaseError;

    fn try_from(row: CopyRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            book_id: row.book_id,
            status: parse(&row.status)?,
            location: row.location,
            condition: row.condition,
        })
    }
}

impl From<ScheduleRow> for RoomScheduleData {
    fn from(row: ScheduleRow) -> Self {
        Self {
            room_id: row.room_id,
            date: row.date,
            slots: row.slots.0,
        }
    }
}

impl TryFrom<ReservationRow> for ReservationData {
    type Error = DatabaseError;

    fn try_from(row: ReservationRow) -> Result<Self> {
        let slots = match (row.slot_start, row.slot_end) {
            (Some(start), Some(end)) => Some(SlotRange::new(start as usize, end as usize)),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            item_type: parse(&row.item_type)?,
            item_id: row.item_id,
            copy_id: row.copy_id,
            title: row.title,
            start_date: row.start_date,
            end_date: row.end_date,
            slots,
            status: parse(&row.status)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<ActivityRow> for ActivityData {
    type Error = DatabaseError;

    fn try_from(row: ActivityRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            action: row.action,
            description: row.description,
            item_id: row.item_id,
            item_type: row.item_type.as_deref().map(parse).transpose()?,
            is_processed: row.is_processed,
            timestamp: row.timestamp,
        })
    }
}

/// Converts every row, failing on the first one that doesn't parse
fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

impl PgDatabase {
    /// Connects to the database and applies pending migrations
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn profile_by_id(&self, profile_id: PrimaryKey) -> Result<ProfileData> {
        query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("profile", "id"))?
            .try_into()
    }

    async fn profile_by_email(&self, email: &str) -> Result<ProfileData> {
        query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("profile", "email"))?
            .try_into()
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileData>> {
        let rows = query_as::<_, ProfileRow>("SELECT * FROM profiles ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn create_profile(&self, new_profile: NewProfile) -> Result<ProfileData> {
        self.profile_by_email(&new_profile.email)
            .await
            .conflict_or_ok("profile", "email", &new_profile.email)?;

        query_as::<_, ProfileRow>(
            "INSERT INTO profiles (name, email, role) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(new_profile.name)
        .bind(new_profile.email)
        .bind(new_profile.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn update_profile_role(&self, profile_id: PrimaryKey, role: Role) -> Result<ProfileData> {
        query_as::<_, ProfileRow>("UPDATE profiles SET role = $1 WHERE id = $2 RETURNING *")
            .bind(role.as_str())
            .bind(profile_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("profile", "id"))?
            .try_into()
    }

    async fn book_by_id(&self, book_id: PrimaryKey) -> Result<BookData> {
        query_as::<_, BookData>("SELECT * FROM books WHERE id = $1")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("book", "id"))
    }

    async fn list_books(&self) -> Result<Vec<BookData>> {
        query_as::<_, BookData>("SELECT * FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn create_book(&self, new_book: NewBook) -> Result<BookData> {
        query_as::<_, BookData>(
            "
            INSERT INTO books (title, author, genres, language, page_count, rating, description, cover_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *",
        )
        .bind(new_book.title)
        .bind(new_book.author)
        .bind(new_book.genres)
        .bind(new_book.language)
        .bind(new_book.page_count)
        .bind(new_book.rating)
        .bind(new_book.description)
        .bind(new_book.cover_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_book(&self, updated_book: UpdatedBook) -> Result<BookData> {
        query_as::<_, BookData>(
            "UPDATE books SET
                title = COALESCE($1, title),
                author = COALESCE($2, author),
                genres = COALESCE($3, genres),
                language = COALESCE($4, language),
                page_count = COALESCE($5, page_count),
                rating = COALESCE($6, rating),
                description = COALESCE($7, description),
                cover_url = COALESCE($8, cover_url)
            WHERE id = $9
            RETURNING *",
        )
        .bind(updated_book.title)
        .bind(updated_book.author)
        .bind(updated_book.genres)
        .bind(updated_book.language)
        .bind(updated_book.page_count)
        .bind(updated_book.rating)
        .bind(updated_book.description)
        .bind(updated_book.cover_url)
        .bind(updated_book.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("book", "id"))
    }

    async fn delete_book(&self, book_id: PrimaryKey) -> Result<()> {
        // Copies are removed by the foreign key cascade
        let result = query("DELETE FROM books WHERE id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        ensure_affected(result.rows_affected(), "book")
    }

    async fn copy_by_id(&self, copy_id: PrimaryKey) -> Result<BookCopyData> {
        query_as::<_, CopyRow>("SELECT * FROM book_copies WHERE id = $1")
            .bind(copy_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("book copy", "id"))?
            .try_into()
    }

    async fn list_copies(&self, book_id: Option<PrimaryKey>) -> Result<Vec<BookCopyData>> {
        let rows = query_as::<_, CopyRow>(
            "SELECT * FROM book_copies WHERE ($1::int IS NULL OR book_id = $1) ORDER BY id",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn create_copy(&self, new_copy: NewBookCopy) -> Result<BookCopyData> {
        // Ensure book exists
        let _ = self.book_by_id(new_copy.book_id).await?;

        query_as::<_, CopyRow>(
            "INSERT INTO book_copies (book_id, status, location, condition) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(new_copy.book_id)
        .bind(CopyStatus::Available.as_str())
        .bind(new_copy.location)
        .bind(new_copy.condition)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn update_copy(&self, updated_copy: UpdatedBookCopy) -> Result<BookCopyData> {
        query_as::<_, CopyRow>(
            "UPDATE book_copies SET
                location = COALESCE($1, location),
                condition = COALESCE($2, condition)
            WHERE id = $3
            RETURNING *",
        )
        .bind(updated_copy.location)
        .bind(updated_copy.condition)
        .bind(updated_copy.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("book copy", "id"))?
        .try_into()
    }

    async fn update_copy_status(
        &self,
        copy_id: PrimaryKey,
        expected: CopyStatus,
        new: CopyStatus,
    ) -> Result<BookCopyData> {
        let row = query_as::<_, CopyRow>(
            "UPDATE book_copies SET status = $1 WHERE id = $2 AND status = $3 RETURNING *",
        )
        .bind(new.as_str())
        .bind(copy_id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        match row {
            Some(row) => row.try_into(),
            None => {
                // Tell a missing copy apart from one in another state
                let _ = self.copy_by_id(copy_id).await?;
                Err(DatabaseError::stale("book copy", copy_id, expected))
            }
        }
    }

    async fn delete_copy(&self, copy_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM book_copies WHERE id = $1 AND status = $2")
            .bind(copy_id)
            .bind(CopyStatus::Available.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            // Tell a missing copy apart from a held one
            let _ = self.copy_by_id(copy_id).await?;
            return Err(DatabaseError::InUse {
                resource: "book copy",
                id: copy_id,
            });
        }

        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        query_as::<_, RoomData>("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        query_as::<_, RoomData>("SELECT * FROM rooms ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        query_as::<_, RoomData>(
            "INSERT INTO rooms (name, capacity, amenities, description) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(new_room.name)
        .bind(new_room.capacity)
        .bind(new_room.amenities)
        .bind(new_room.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        query_as::<_, RoomData>(
            "UPDATE rooms SET
                name = COALESCE($1, name),
                capacity = COALESCE($2, capacity),
                amenities = COALESCE($3, amenities),
                description = COALESCE($4, description)
            WHERE id = $5
            RETURNING *",
        )
        .bind(updated_room.name)
        .bind(updated_room.capacity)
        .bind(updated_room.amenities)
        .bind(updated_room.description)
        .bind(updated_room.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        ensure_affected(result.rows_affected(), "room")
    }

    async fn room_schedule(
        &self,
        room_id: PrimaryKey,
        date: NaiveDate,
    ) -> Result<RoomScheduleData> {
        query_as::<_, ScheduleRow>(
            "SELECT * FROM room_availability WHERE room_id = $1 AND date = $2",
        )
        .bind(room_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("room schedule", "room_id:date"))
    }

    async fn put_room_schedule(&self, schedule: RoomScheduleData) -> Result<RoomScheduleData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query_scalar::<_, i32>("SELECT id FROM rooms WHERE id = $1 FOR SHARE")
            .bind(schedule.room_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?;

        // Approvals claim slots under the same row lock
        query("SELECT room_id FROM room_availability WHERE room_id = $1 AND date = $2 FOR UPDATE")
            .bind(schedule.room_id)
            .bind(schedule.date)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        let rows = query_as::<_, ReservationRow>(
            "
            SELECT * FROM reservations
            WHERE item_type = $1 AND item_id = $2 AND start_date = $3 AND status IN ($4, $5)",
        )
        .bind(ItemType::Room.as_str())
        .bind(schedule.room_id)
        .bind(schedule.date)
        .bind(ReservationStatus::Pending.as_str())
        .bind(ReservationStatus::Approved.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let reservations: Vec<ReservationData> = convert_all(rows)?;
        ensure_schedule_keeps(&schedule, &reservations)?;

        let row = query_as::<_, ScheduleRow>(
            "
            INSERT INTO room_availability (room_id, date, slots)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, date) DO UPDATE SET slots = EXCLUDED.slots
            RETURNING *",
        )
        .bind(schedule.room_id)
        .bind(schedule.date)
        .bind(Json(schedule.slots))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        Ok(row.into())
    }

    async fn reservation_by_id(&self, reservation_id: PrimaryKey) -> Result<ReservationData> {
        query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("reservation", "id"))?
            .try_into()
    }

    async fn list_reservations(&self, filter: ReservationFilter) -> Result<Vec<ReservationData>> {
        let rows = query_as::<_, ReservationRow>(
            "
            SELECT * FROM reservations
            WHERE ($1::int IS NULL OR user_id = $1)
                AND ($2::text IS NULL OR status = $2)
                AND ($3::text IS NULL OR item_type = $3)
                AND ($4::int IS NULL OR item_id = $4)
            ORDER BY id",
        )
        .bind(filter.user_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.item_type.map(|t| t.as_str()))
        .bind(filter.item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn create_reservation(
        &self,
        new_reservation: NewReservation,
    ) -> Result<ReservationData> {
        // Ensure user exists
        let _ = self.profile_by_id(new_reservation.user_id).await?;

        let (slot_start, slot_end) = slot_columns(new_reservation.slots);

        query_as::<_, ReservationRow>(
            "
            INSERT INTO reservations
                (user_id, item_type, item_id, copy_id, title, start_date, end_date, slot_start, slot_end, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *",
        )
        .bind(new_reservation.user_id)
        .bind(new_reservation.item_type.as_str())
        .bind(new_reservation.item_id)
        .bind(new_reservation.copy_id)
        .bind(new_reservation.title)
        .bind(new_reservation.start_date)
        .bind(new_reservation.end_date)
        .bind(slot_start)
        .bind(slot_end)
        .bind(ReservationStatus::Pending.as_str())
        .bind(new_reservation.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn commit_reservation_write(
        &self,
        write: ReservationWrite,
    ) -> Result<Option<ReservationData>> {
        // Dropping the transaction before commit rolls everything back
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let status: String =
            query_scalar("SELECT status FROM reservations WHERE id = $1 FOR UPDATE")
                .bind(write.reservation_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| e.not_found_or("reservation", "id"))?;

        if parse::<ReservationStatus>(&status)? != write.expected {
            return Err(DatabaseError::stale(
                "reservation",
                write.reservation_id,
                write.expected,
            ));
        }

        match write.inventory {
            Some(InventoryWrite::Copy {
                copy_id,
                expected,
                new,
            }) => {
                let result =
                    query("UPDATE book_copies SET status = $1 WHERE id = $2 AND status = $3")
                        .bind(new.as_str())
                        .bind(copy_id)
                        .bind(expected.as_str())
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| e.any())?;

                if result.rows_affected() == 0 {
                    let exists: Option<i32> =
                        query_scalar("SELECT id FROM book_copies WHERE id = $1")
                            .bind(copy_id)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(|e| e.any())?;

                    return Err(match exists {
                        Some(_) => DatabaseError::stale("book copy", copy_id, expected),
                        None => DatabaseError::NotFound {
                            resource: "book copy",
                            identifier: "id",
                        },
                    });
                }
            }
            Some(InventoryWrite::ClaimSlots {
                room_id,
                date,
                slots,
            }) => {
                let mut schedule = query_as::<_, ScheduleRow>(
                    "SELECT * FROM room_availability WHERE room_id = $1 AND date = $2 FOR UPDATE",
                )
                .bind(room_id)
                .bind(date)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| e.not_found_or("room schedule", "room_id:date"))?;

                schedule
                    .slots
                    .0
                    .claim(slots)
                    .map_err(|e| DatabaseError::from_schedule(room_id, date, e))?;

                store_slots(&mut tx, schedule).await?;
            }
            Some(InventoryWrite::ReleaseSlots {
                room_id,
                date,
                slots,
            }) => {
                let schedule = query_as::<_, ScheduleRow>(
                    "SELECT * FROM room_availability WHERE room_id = $1 AND date = $2 FOR UPDATE",
                )
                .bind(room_id)
                .bind(date)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| e.any())?;

                if let Some(mut schedule) = schedule {
                    schedule
                        .slots
                        .0
                        .release(slots)
                        .map_err(|e| DatabaseError::from_schedule(room_id, date, e))?;

                    store_slots(&mut tx, schedule).await?;
                }
            }
            None => {}
        }

        let result = match write.outcome {
            ReservationOutcome::Transition { status, bind_copy } => {
                let row = query_as::<_, ReservationRow>(
                    "
                    UPDATE reservations SET
                        status = $1,
                        copy_id = COALESCE($2, copy_id),
                        updated_at = now()
                    WHERE id = $3
                    RETURNING *",
                )
                .bind(status.as_str())
                .bind(bind_copy)
                .bind(write.reservation_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| e.any())?;

                Some(row.try_into()?)
            }
            ReservationOutcome::Delete => {
                query("DELETE FROM reservations WHERE id = $1")
                    .bind(write.reservation_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| e.any())?;

                None
            }
        };

        tx.commit().await.map_err(|e| e.any())?;
        Ok(result)
    }

    async fn create_activity(&self, new_activity: NewActivity) -> Result<ActivityData> {
        query_as::<_, ActivityRow>(
            "
            INSERT INTO activities (user_id, user_name, action, description, item_id, item_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *",
        )
        .bind(new_activity.user_id)
        .bind(new_activity.user_name)
        .bind(new_activity.action)
        .bind(new_activity.description)
        .bind(new_activity.item_id)
        .bind(new_activity.item_type.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn list_activities(&self, filter: ActivityFilter) -> Result<Vec<ActivityData>> {
        let rows = query_as::<_, ActivityRow>(
            "
            SELECT * FROM activities
            WHERE ($1::int IS NULL OR user_id = $1)
                AND (NOT $2 OR is_processed = false)
            ORDER BY id DESC
            LIMIT $3",
        )
        .bind(filter.user_id)
        .bind(filter.unprocessed_only)
        .bind(filter.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        convert_all(rows)
    }

    async fn mark_activities_processed(&self, activity_ids: &[PrimaryKey]) -> Result<()> {
        query("UPDATE activities SET is_processed = true WHERE id = ANY($1)")
            .bind(activity_ids.to_vec())
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn notification_by_id(&self, notification_id: PrimaryKey) -> Result<NotificationData> {
        query_as::<_, NotificationData>("SELECT * FROM notifications WHERE id = $1")
            .bind(notification_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("notification", "id"))
    }

    async fn create_notification(
        &self,
        new_notification: NewNotification,
    ) -> Result<NotificationData> {
        query_as::<_, NotificationData>(
            "
            INSERT INTO notifications (user_id, title, message, related_reservation_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *",
        )
        .bind(new_notification.user_id)
        .bind(new_notification.title)
        .bind(new_notification.message)
        .bind(new_notification.related_reservation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn list_notifications(&self, user_id: PrimaryKey) -> Result<Vec<NotificationData>> {
        query_as::<_, NotificationData>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn mark_notification_read(
        &self,
        notification_id: PrimaryKey,
    ) -> Result<NotificationData> {
        query_as::<_, NotificationData>(
            "UPDATE notifications SET is_read = true WHERE id = $1 RETURNING *",
        )
        .bind(notification_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("notification", "id"))
    }
}

async fn store_slots(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    schedule: ScheduleRow,
) -> Result<()> {
    query("UPDATE room_availability SET slots = $1 WHERE room_id = $2 AND date = $3")
        .bind(schedule.slots)
        .bind(schedule.room_id)
        .bind(schedule.date)
        .execute(&mut **tx)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
}

fn slot_columns(slots: Option<SlotRange>) -> (Option<i32>, Option<i32>) {
    match slots {
        Some(range) => (Some(range.start as i32), Some(range.end as i32)),
        None => (None, None),
    }
}

fn ensure_affected(rows_affected: u64, resource: &'static str) -> Result<()> {
    if rows_affected == 0 {
        return Err(DatabaseError::NotFound {
            resource,
            identifier: "id",
        });
    }

    Ok(())
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
