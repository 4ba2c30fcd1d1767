use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json,
};
use chrono::NaiveDate;

use crate::{
    auth::Actor,
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewRoomSchema, ScheduleSchema, UpdateRoomSchema, ValidatedJson},
    serialized::{FreeSlot, Room, RoomSchedule, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
async fn list_rooms(State(context): State<ServerContext>) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context.library.catalog.rooms().await?;

    Ok(Json(rooms.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    params(("id" = i32, Path, description = "Room id")),
    responses(
        (status = 200, body = Room),
        (status = 404, description = "Room does not exist")
    )
)]
async fn room(
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Room>> {
    let room = context.library.catalog.room(room_id).await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    security(("profile_id" = [])),
    responses(
        (status = 201, body = Room)
    )
)]
async fn create_room(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<(StatusCode, Json<Room>)> {
    let room = context.library.catalog.create_room(&actor, body.into()).await?;

    Ok((StatusCode::CREATED, Json(room.to_serialized())))
}

#[utoipa::path(
    patch,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    params(("id" = i32, Path, description = "Room id")),
    request_body = UpdateRoomSchema,
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Room)
    )
)]
async fn update_room(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UpdateRoomSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .library
        .catalog
        .update_room(&actor, body.into_update(room_id))
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    params(("id" = i32, Path, description = "Room id")),
    security(("profile_id" = [])),
    responses(
        (status = 204, description = "Room was deleted"),
        (status = 409, description = "Room has active reservations")
    )
)]
async fn delete_room(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(room_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context.library.catalog.delete_room(&actor, room_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/schedule/{date}",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "Room id"),
        ("date" = String, Path, description = "Date of the schedule, like 2025-06-01")
    ),
    responses(
        (status = 200, body = RoomSchedule)
    )
)]
async fn schedule(
    State(context): State<ServerContext>,
    Path((room_id, date)): Path<(i32, NaiveDate)>,
) -> ServerResult<Json<RoomSchedule>> {
    let schedule = context.library.catalog.schedule(room_id, date).await?;

    Ok(Json(schedule.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/rooms/{id}/schedule/{date}",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "Room id"),
        ("date" = String, Path, description = "Date of the schedule, like 2025-06-01")
    ),
    request_body = ScheduleSchema,
    security(("profile_id" = [])),
    responses(
        (status = 200, body = RoomSchedule),
        (status = 400, description = "Slots overlap or are out of order"),
        (status = 409, description = "The schedule would drop slots of an approved reservation")
    )
)]
async fn set_schedule(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path((room_id, date)): Path<(i32, NaiveDate)>,
    ValidatedJson(body): ValidatedJson<ScheduleSchema>,
) -> ServerResult<Json<RoomSchedule>> {
    let schedule = context
        .library
        .catalog
        .set_schedule(&actor, room_id, date, body.into_slots())
        .await?;

    Ok(Json(schedule.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/availability/{date}",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "Room id"),
        ("date" = String, Path, description = "Date to check, like 2025-06-01")
    ),
    responses(
        (status = 200, description = "The slots that can still be reserved", body = Vec<FreeSlot>)
    )
)]
async fn free_slots(
    State(context): State<ServerContext>,
    Path((room_id, date)): Path<(i32, NaiveDate)>,
) -> ServerResult<Json<Vec<FreeSlot>>> {
    let slots = context.library.availability.free_slots(room_id, date).await?;

    Ok(Json(slots.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/:id", get(room).patch(update_room).delete(delete_room))
        .route("/:id/schedule/:date", get(schedule).put(set_schedule))
        .route("/:id/availability/:date", get(free_slots))
}
