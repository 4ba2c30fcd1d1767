use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use townbook_core::{
    display_status, CopyStatus, DisplayStatus, ItemType, ReservationStatus, Role, SlotRange,
    TimeSlot,
};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A person using TownBook, as provided by the authentication gateway
#[derive(Debug, Clone)]
pub struct ProfileData {
    pub id: PrimaryKey,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A catalog entry. Physical copies are stored separately.
#[derive(Debug, Clone, FromRow)]
pub struct BookData {
    pub id: PrimaryKey,
    pub title: String,
    pub author: String,
    pub genres: Vec<String>,
    pub language: String,
    pub page_count: i32,
    pub rating: f32,
    pub description: Option<String>,
    /// Public URL of the cover image, uploaded elsewhere
    pub cover_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One physical copy of a book
#[derive(Debug, Clone)]
pub struct BookCopyData {
    pub id: PrimaryKey,
    pub book_id: PrimaryKey,
    /// The sole availability signal of the copy
    pub status: CopyStatus,
    /// Shelf or branch the copy is kept at
    pub location: String,
    pub condition: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub name: String,
    pub capacity: i32,
    pub amenities: Vec<String>,
    pub description: Option<String>,
}

/// The bookable slots of a room on a single date.
/// Note: `room_id` and `date` are unique together.
#[derive(Debug, Clone)]
pub struct RoomScheduleData {
    pub room_id: PrimaryKey,
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

/// A request binding a member to a book copy or room slots for a date range
#[derive(Debug, Clone)]
pub struct ReservationData {
    pub id: PrimaryKey,
    /// The member the reservation is for
    pub user_id: PrimaryKey,
    pub item_type: ItemType,
    /// The book or room id, depending on `item_type`
    pub item_id: PrimaryKey,
    /// The copy bound to a book reservation
    pub copy_id: Option<PrimaryKey>,
    /// Title of the book or name of the room at the time of the request
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// The slots occupied on `start_date`, for room reservations
    pub slots: Option<SlotRange>,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationData {
    pub fn display_status(&self, today: NaiveDate) -> DisplayStatus {
        display_status(self.status, self.end_date, today)
    }
}

/// An entry in the audit trail
#[derive(Debug, Clone)]
pub struct ActivityData {
    pub id: PrimaryKey,
    /// The acting profile, or none for system sweeps
    pub user_id: Option<PrimaryKey>,
    pub user_name: String,
    pub action: String,
    pub description: String,
    pub item_id: Option<PrimaryKey>,
    pub item_type: Option<ItemType>,
    /// Set once the analytics consumer has counted this entry
    pub is_processed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub related_reservation_id: Option<PrimaryKey>,
    pub created_at: DateTime<Utc>,
}
