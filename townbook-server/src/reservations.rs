use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use townbook_collab::ReservationRequest;

use crate::{
    auth::Actor,
    context::ServerContext,
    errors::ServerResult,
    schemas::{BatchAction, BatchSchema, NewReservationSchema, ReservationQuerySchema, ValidatedJson},
    serialized::{BatchResult, Reservation, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/reservations",
    tag = "reservations",
    params(ReservationQuerySchema),
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "Members only see their own reservations", body = Vec<Reservation>)
    )
)]
async fn list_reservations(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Query(query): Query<ReservationQuerySchema>,
) -> ServerResult<Json<Vec<Reservation>>> {
    let reservations = context.library.lifecycle.list(&actor, query.into()).await?;

    Ok(Json(reservations.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/reservations",
    tag = "reservations",
    request_body = NewReservationSchema,
    security(("profile_id" = [])),
    responses(
        (status = 201, body = Reservation),
        (status = 400, description = "Dates or slots are invalid"),
        (status = 409, description = "Nothing is free to reserve")
    )
)]
async fn create_reservation(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    ValidatedJson(body): ValidatedJson<NewReservationSchema>,
) -> ServerResult<(StatusCode, Json<Reservation>)> {
    let request = ReservationRequest::try_from(body)?;
    let reservation = context.library.lifecycle.request(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(reservation.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/reservations/{id}",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Reservation)
    )
)]
async fn reservation(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(reservation_id): Path<i32>,
) -> ServerResult<Json<Reservation>> {
    let reservation = context
        .library
        .lifecycle
        .reservation(&actor, reservation_id)
        .await?;

    Ok(Json(reservation.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/reservations/{id}",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation id")),
    security(("profile_id" = [])),
    responses(
        (status = 204, description = "Reservation was cancelled and its inventory released"),
        (status = 409, description = "Reservation is no longer active")
    )
)]
async fn cancel(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(reservation_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context.library.lifecycle.cancel(&actor, reservation_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/reservations/{id}/approve",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Reservation),
        (status = 409, description = "Not pending, or nothing is free to hold")
    )
)]
async fn approve(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(reservation_id): Path<i32>,
) -> ServerResult<Json<Reservation>> {
    let reservation = context.library.lifecycle.approve(&actor, reservation_id).await?;

    Ok(Json(reservation.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/reservations/{id}/decline",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Reservation),
        (status = 409, description = "Reservation is not pending")
    )
)]
async fn decline(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(reservation_id): Path<i32>,
) -> ServerResult<Json<Reservation>> {
    let reservation = context.library.lifecycle.decline(&actor, reservation_id).await?;

    Ok(Json(reservation.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/reservations/{id}/checkout",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "The held copy was handed out", body = Reservation)
    )
)]
async fn check_out(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(reservation_id): Path<i32>,
) -> ServerResult<Json<Reservation>> {
    let reservation = context
        .library
        .lifecycle
        .check_out(&actor, reservation_id)
        .await?;

    Ok(Json(reservation.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/reservations/{id}/return",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "The reservation is completed and its inventory released", body = Reservation)
    )
)]
async fn complete_return(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(reservation_id): Path<i32>,
) -> ServerResult<Json<Reservation>> {
    let reservation = context
        .library
        .lifecycle
        .complete_return(&actor, reservation_id)
        .await?;

    Ok(Json(reservation.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/reservations/batch",
    tag = "reservations",
    request_body = BatchSchema,
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "One result per reservation, in request order", body = Vec<BatchResult>),
        (status = 400, description = "Too many reservations in one batch")
    )
)]
async fn batch(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    ValidatedJson(body): ValidatedJson<BatchSchema>,
) -> ServerResult<Json<Vec<BatchResult>>> {
    let lifecycle = &context.library.lifecycle;

    let outcomes = match body.action {
        BatchAction::Approve => lifecycle.batch_approve(&actor, &body.ids).await?,
        BatchAction::Decline => lifecycle.batch_decline(&actor, &body.ids).await?,
    };

    Ok(Json(outcomes.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_reservations).post(create_reservation))
        .route("/batch", post(batch))
        .route("/:id", get(reservation).delete(cancel))
        .route("/:id/approve", post(approve))
        .route("/:id/decline", post(decline))
        .route("/:id/checkout", post(check_out))
        .route("/:id/return", post(complete_return))
}
