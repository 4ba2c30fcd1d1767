use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use townbook_collab::{
    BookQuery, BookSort, NewBook, NewRoom, PrimaryKey, ReservationFilter, ReservationRequest,
    ReservationTarget, UpdatedBook, UpdatedRoom,
};
use townbook_core::{ItemType, ReservationStatus, Role, SlotRange, TimeSlot};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewBookSchema {
    #[validate(length(min = 1, max = 256))]
    pub title: String,
    #[validate(length(min = 1, max = 256))]
    pub author: String,
    #[validate(length(max = 16))]
    #[serde(default)]
    pub genres: Vec<String>,
    #[validate(length(min = 2, max = 32))]
    pub language: String,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub page_count: i32,
    #[validate(range(min = 0.0, max = 5.0))]
    #[serde(default)]
    pub rating: f32,
    #[validate(length(max = 4096))]
    pub description: Option<String>,
    #[validate(url)]
    pub cover_url: Option<String>,
}

impl From<NewBookSchema> for NewBook {
    fn from(value: NewBookSchema) -> Self {
        Self {
            title: value.title,
            author: value.author,
            genres: value.genres,
            language: value.language,
            page_count: value.page_count,
            rating: value.rating,
            description: value.description,
            cover_url: value.cover_url,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateBookSchema {
    #[validate(length(min = 1, max = 256))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub author: Option<String>,
    #[validate(length(max = 16))]
    pub genres: Option<Vec<String>>,
    #[validate(length(min = 2, max = 32))]
    pub language: Option<String>,
    #[validate(range(min = 0))]
    pub page_count: Option<i32>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub rating: Option<f32>,
    #[validate(length(max = 4096))]
    pub description: Option<String>,
    #[validate(url)]
    pub cover_url: Option<String>,
}

impl UpdateBookSchema {
    pub fn into_update(self, id: PrimaryKey) -> UpdatedBook {
        UpdatedBook {
            id,
            title: self.title,
            author: self.author,
            genres: self.genres,
            language: self.language,
            page_count: self.page_count,
            rating: self.rating,
            description: self.description,
            cover_url: self.cover_url,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewCopySchema {
    #[validate(length(min = 1, max = 128))]
    pub location: String,
    #[validate(length(min = 1, max = 128))]
    pub condition: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateCopySchema {
    #[validate(length(min = 1, max = 128))]
    pub location: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub condition: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(range(min = 1, max = 1000))]
    pub capacity: i32,
    #[validate(length(max = 32))]
    #[serde(default)]
    pub amenities: Vec<String>,
    #[validate(length(max = 4096))]
    pub description: Option<String>,
}

impl From<NewRoomSchema> for NewRoom {
    fn from(value: NewRoomSchema) -> Self {
        Self {
            name: value.name,
            capacity: value.capacity,
            amenities: value.amenities,
            description: value.description,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateRoomSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub capacity: Option<i32>,
    #[validate(length(max = 32))]
    pub amenities: Option<Vec<String>>,
    #[validate(length(max = 4096))]
    pub description: Option<String>,
}

impl UpdateRoomSchema {
    pub fn into_update(self, id: PrimaryKey) -> UpdatedRoom {
        UpdatedRoom {
            id,
            name: self.name,
            capacity: self.capacity,
            amenities: self.amenities,
            description: self.description,
        }
    }
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SlotSchema {
    #[schema(value_type = String, example = "10:00:00")]
    pub start: NaiveTime,
    #[schema(value_type = String, example = "11:00:00")]
    pub end: NaiveTime,
    /// Defaults to true
    pub is_available: Option<bool>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleSchema {
    #[validate(length(max = 96))]
    pub slots: Vec<SlotSchema>,
}

impl ScheduleSchema {
    pub fn into_slots(self) -> Vec<TimeSlot> {
        self.slots
            .into_iter()
            .map(|s| TimeSlot {
                start: s.start,
                end: s.end,
                is_available: s.is_available.unwrap_or(true),
            })
            .collect()
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewReservationSchema {
    /// Staff may reserve on behalf of a member
    pub user_id: Option<i32>,
    #[schema(value_type = String, example = "book")]
    pub item_type: ItemType,
    pub item_id: i32,
    #[schema(value_type = String, example = "2025-06-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    /// The first slot of a room reservation
    pub slot_start: Option<usize>,
    /// The slot after the last one. Defaults to a single slot.
    pub slot_end: Option<usize>,
    #[validate(length(max = 1024))]
    pub notes: Option<String>,
}

impl TryFrom<NewReservationSchema> for ReservationRequest {
    type Error = ServerError;

    fn try_from(value: NewReservationSchema) -> Result<Self, Self::Error> {
        let target = match value.item_type {
            ItemType::Book => ReservationTarget::Book {
                book_id: value.item_id,
            },
            ItemType::Room => {
                let start = value.slot_start.ok_or_else(|| {
                    ServerError::BadRequest("Room reservations need a slotStart".to_string())
                })?;

                ReservationTarget::Room {
                    room_id: value.item_id,
                    slots: SlotRange::new(start, value.slot_end.unwrap_or(start + 1)),
                }
            }
        };

        Ok(Self {
            user_id: value.user_id,
            target,
            start_date: value.start_date,
            end_date: value.end_date,
            notes: value.notes,
        })
    }
}

#[derive(Debug, Clone, Copy, ToSchema, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Approve,
    Decline,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchSchema {
    pub action: BatchAction,
    #[validate(length(min = 1))]
    pub ids: Vec<i32>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewProfileSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    /// Defaults to member
    #[schema(value_type = Option<String>, example = "member")]
    pub role: Option<Role>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleSchema {
    #[schema(value_type = String, example = "librarian")]
    pub role: Role,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcessActivitiesSchema {
    #[validate(range(min = 1, max = 10000))]
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, Default, ToSchema, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSortSchema {
    #[default]
    Title,
    Author,
    Rating,
    Newest,
}

#[derive(Debug, Default, IntoParams, Deserialize)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookQuerySchema {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub available_only: bool,
    #[param(inline)]
    pub sort: Option<BookSortSchema>,
}

impl From<BookQuerySchema> for BookQuery {
    fn from(value: BookQuerySchema) -> Self {
        let sort = match value.sort.unwrap_or_default() {
            BookSortSchema::Title => BookSort::Title,
            BookSortSchema::Author => BookSort::Author,
            BookSortSchema::Rating => BookSort::Rating,
            BookSortSchema::Newest => BookSort::Newest,
        };

        Self {
            search: value.search.filter(|s| !s.is_empty()),
            genre: value.genre,
            language: value.language,
            available_only: value.available_only,
            sort,
        }
    }
}

#[derive(Debug, Default, IntoParams, Deserialize)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ReservationQuerySchema {
    pub user_id: Option<i32>,
    #[param(value_type = Option<String>)]
    pub status: Option<ReservationStatus>,
    #[param(value_type = Option<String>)]
    pub item_type: Option<ItemType>,
    pub item_id: Option<i32>,
}

impl From<ReservationQuerySchema> for ReservationFilter {
    fn from(value: ReservationQuerySchema) -> Self {
        Self {
            user_id: value.user_id,
            status: value.status,
            item_type: value.item_type,
            item_id: value.item_id,
        }
    }
}

#[derive(Debug, Default, IntoParams, Deserialize)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ActivityQuerySchema {
    pub user_id: Option<i32>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, IntoParams, Deserialize)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EventQuerySchema {
    /// Only receive changes of this table
    pub table: Option<String>,
    /// Only receive changes of rows owned by this profile
    pub user_id: Option<i32>,
}

/// Json that is validated before it reaches the handler
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;

        extracted_json
            .0
            .validate()
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;

        Ok(Self(extracted_json.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_room_reservation_needs_slots() {
        let schema: NewReservationSchema = serde_json::from_str(
            r#"{ "itemType": "room", "itemId": 3, "startDate": "2099-01-01" }"#,
        )
        .unwrap();

        assert!(matches!(
            ReservationRequest::try_from(schema),
            Err(ServerError::BadRequest(_))
        ));

        let schema: NewReservationSchema = serde_json::from_str(
            r#"{ "itemType": "room", "itemId": 3, "startDate": "2099-01-01", "slotStart": 2 }"#,
        )
        .unwrap();

        let request = ReservationRequest::try_from(schema).unwrap();
        assert!(matches!(
            request.target,
            ReservationTarget::Room { room_id: 3, slots } if slots == SlotRange::single(2)
        ));
    }

    #[test]
    fn test_book_schema_validation() {
        let schema: NewBookSchema = serde_json::from_str(
            r#"{ "title": "Dune", "author": "Frank Herbert", "language": "en", "rating": 7 }"#,
        )
        .unwrap();

        assert!(schema.validate().is_err());
    }
}
