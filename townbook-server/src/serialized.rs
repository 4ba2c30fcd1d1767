//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use townbook_collab::{
    ActivityData, BatchOutcome, BookAvailability as CollabBookAvailability, BookCopyData,
    BookData, BookListing as CollabBookListing, FreeSlot as CollabFreeSlot,
    HistoryEntry as CollabHistoryEntry, LibraryStats, NotificationData, ProcessedActivities,
    ProfileData, ReconcileReport as CollabReconcileReport, ReservationData, RoomData,
    RoomScheduleData,
};
use townbook_core::{CopyStatus, DisplayStatus, ItemType, ReservationStatus, Role, TimeSlot};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    id: i32,
    name: String,
    email: String,
    #[schema(value_type = String, example = "member")]
    role: Role,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    id: i32,
    title: String,
    author: String,
    genres: Vec<String>,
    language: String,
    page_count: i32,
    rating: f32,
    description: Option<String>,
    cover_url: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookListing {
    #[serde(flatten)]
    book: Book,
    available_copies: usize,
    total_copies: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookAvailability {
    book_id: i32,
    available: usize,
    total: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookCopy {
    id: i32,
    book_id: i32,
    #[schema(value_type = String, example = "available")]
    status: CopyStatus,
    location: String,
    condition: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: i32,
    name: String,
    capacity: i32,
    amenities: Vec<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// The position of the slot in the day
    index: usize,
    #[schema(value_type = String, example = "10:00:00")]
    start: NaiveTime,
    #[schema(value_type = String, example = "11:00:00")]
    end: NaiveTime,
    is_available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSchedule {
    room_id: i32,
    #[schema(value_type = String, example = "2025-06-01")]
    date: NaiveDate,
    slots: Vec<Slot>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FreeSlot {
    index: usize,
    #[schema(value_type = String, example = "10:00:00")]
    start: NaiveTime,
    #[schema(value_type = String, example = "11:00:00")]
    end: NaiveTime,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    id: i32,
    user_id: i32,
    #[schema(value_type = String, example = "book")]
    item_type: ItemType,
    item_id: i32,
    copy_id: Option<i32>,
    title: String,
    #[schema(value_type = String, example = "2025-06-01")]
    start_date: NaiveDate,
    #[schema(value_type = String, example = "2025-06-15")]
    end_date: NaiveDate,
    slot_start: Option<usize>,
    slot_end: Option<usize>,
    #[schema(value_type = String, example = "approved")]
    status: ReservationStatus,
    /// The status as shown to people, taking the current date into account
    #[schema(value_type = String, example = "overdue")]
    display_status: DisplayStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    reservation: Reservation,
    days_overdue: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    reservation_id: i32,
    /// The reservation after the transition, if it succeeded
    reservation: Option<Reservation>,
    /// Why the transition failed, if it did
    error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    id: i32,
    user_id: Option<i32>,
    user_name: String,
    action: String,
    description: String,
    item_id: Option<i32>,
    #[schema(value_type = Option<String>, example = "book")]
    item_type: Option<ItemType>,
    is_processed: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedActivityCounts {
    processed: usize,
    counts: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    id: i32,
    user_id: i32,
    title: String,
    message: String,
    is_read: bool,
    related_reservation_id: Option<i32>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    books: usize,
    copies: usize,
    available_copies: usize,
    rooms: usize,
    pending_reservations: usize,
    approved_reservations: usize,
    overdue_reservations: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Copies made available again
    freed: Vec<i32>,
    /// Copies held again for their approved reservation
    held: Vec<i32>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Profile> for ProfileData {
    fn to_serialized(&self) -> Profile {
        Profile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Book> for BookData {
    fn to_serialized(&self) -> Book {
        Book {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
            genres: self.genres.clone(),
            language: self.language.clone(),
            page_count: self.page_count,
            rating: self.rating,
            description: self.description.clone(),
            cover_url: self.cover_url.clone(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<BookListing> for CollabBookListing {
    fn to_serialized(&self) -> BookListing {
        BookListing {
            book: self.book.to_serialized(),
            available_copies: self.available_copies,
            total_copies: self.total_copies,
        }
    }
}

impl ToSerialized<BookAvailability> for CollabBookAvailability {
    fn to_serialized(&self) -> BookAvailability {
        BookAvailability {
            book_id: self.book_id,
            available: self.available,
            total: self.total,
        }
    }
}

impl ToSerialized<BookCopy> for BookCopyData {
    fn to_serialized(&self) -> BookCopy {
        BookCopy {
            id: self.id,
            book_id: self.book_id,
            status: self.status,
            location: self.location.clone(),
            condition: self.condition.clone(),
        }
    }
}

impl ToSerialized<Room> for RoomData {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
            amenities: self.amenities.clone(),
            description: self.description.clone(),
        }
    }
}

impl ToSerialized<RoomSchedule> for RoomScheduleData {
    fn to_serialized(&self) -> RoomSchedule {
        RoomSchedule {
            room_id: self.room_id,
            date: self.date,
            slots: self
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| serialize_slot(index, slot))
                .collect(),
        }
    }
}

fn serialize_slot(index: usize, slot: &TimeSlot) -> Slot {
    Slot {
        index,
        start: slot.start,
        end: slot.end,
        is_available: slot.is_available,
    }
}

impl ToSerialized<FreeSlot> for CollabFreeSlot {
    fn to_serialized(&self) -> FreeSlot {
        FreeSlot {
            index: self.index,
            start: self.start,
            end: self.end,
        }
    }
}

impl ToSerialized<Reservation> for ReservationData {
    fn to_serialized(&self) -> Reservation {
        Reservation {
            id: self.id,
            user_id: self.user_id,
            item_type: self.item_type,
            item_id: self.item_id,
            copy_id: self.copy_id,
            title: self.title.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            slot_start: self.slots.map(|s| s.start),
            slot_end: self.slots.map(|s| s.end),
            status: self.status,
            display_status: self.display_status(townbook_collab::today()),
            notes: self.notes.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ToSerialized<HistoryEntry> for CollabHistoryEntry {
    fn to_serialized(&self) -> HistoryEntry {
        let mut reservation = self.reservation.to_serialized();
        reservation.display_status = self.display_status;

        HistoryEntry {
            reservation,
            days_overdue: self.days_overdue,
        }
    }
}

impl ToSerialized<BatchResult> for BatchOutcome {
    fn to_serialized(&self) -> BatchResult {
        let (reservation, error) = match &self.result {
            Ok(reservation) => (Some(reservation.to_serialized()), None),
            Err(e) => (None, Some(e.to_string())),
        };

        BatchResult {
            reservation_id: self.reservation_id,
            reservation,
            error,
        }
    }
}

impl ToSerialized<Activity> for ActivityData {
    fn to_serialized(&self) -> Activity {
        Activity {
            id: self.id,
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            action: self.action.clone(),
            description: self.description.clone(),
            item_id: self.item_id,
            item_type: self.item_type,
            is_processed: self.is_processed,
            timestamp: self.timestamp,
        }
    }
}

impl ToSerialized<ProcessedActivityCounts> for ProcessedActivities {
    fn to_serialized(&self) -> ProcessedActivityCounts {
        ProcessedActivityCounts {
            processed: self.processed,
            counts: self.counts.clone(),
        }
    }
}

impl ToSerialized<Notification> for NotificationData {
    fn to_serialized(&self) -> Notification {
        Notification {
            id: self.id,
            user_id: self.user_id,
            title: self.title.clone(),
            message: self.message.clone(),
            is_read: self.is_read,
            related_reservation_id: self.related_reservation_id,
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Stats> for LibraryStats {
    fn to_serialized(&self) -> Stats {
        Stats {
            books: self.books,
            copies: self.copies,
            available_copies: self.available_copies,
            rooms: self.rooms,
            pending_reservations: self.pending_reservations,
            approved_reservations: self.approved_reservations,
            overdue_reservations: self.overdue_reservations,
        }
    }
}

impl ToSerialized<ReconcileReport> for CollabReconcileReport {
    fn to_serialized(&self) -> ReconcileReport {
        ReconcileReport {
            freed: self.freed.clone(),
            held: self.held.clone(),
        }
    }
}
