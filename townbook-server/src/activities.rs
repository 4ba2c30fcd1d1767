//! Audit trail, notifications and the staff dashboard

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json,
};

use crate::{
    auth::Actor,
    context::ServerContext,
    errors::ServerResult,
    schemas::{ActivityQuerySchema, ProcessActivitiesSchema, ValidatedJson},
    serialized::{Activity, Notification, ProcessedActivityCounts, ReconcileReport, Stats, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/activities",
    tag = "activities",
    params(ActivityQuerySchema),
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "Newest first. Members only see their own.", body = Vec<Activity>)
    )
)]
async fn list_activities(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Query(query): Query<ActivityQuerySchema>,
) -> ServerResult<Json<Vec<Activity>>> {
    let activities = context
        .library
        .activity
        .list(&actor, query.user_id, query.limit)
        .await?;

    Ok(Json(activities.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/activities/process",
    tag = "activities",
    request_body = ProcessActivitiesSchema,
    security(("profile_id" = [])),
    responses(
        (status = 200, body = ProcessedActivityCounts),
        (status = 403, description = "Only admins may process activities")
    )
)]
async fn process_activities(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    ValidatedJson(body): ValidatedJson<ProcessActivitiesSchema>,
) -> ServerResult<Json<ProcessedActivityCounts>> {
    let processed = context
        .library
        .activity
        .process_pending(&actor, body.limit)
        .await?;

    Ok(Json(processed.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/notifications",
    tag = "activities",
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "Notifications of the caller, newest first", body = Vec<Notification>)
    )
)]
async fn list_notifications(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
) -> ServerResult<Json<Vec<Notification>>> {
    let notifications = context.library.notifications.list(&actor).await?;

    Ok(Json(notifications.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/notifications/{id}/read",
    tag = "activities",
    params(("id" = i32, Path, description = "Notification id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Notification),
        (status = 403, description = "Notification belongs to someone else")
    )
)]
async fn mark_read(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(notification_id): Path<i32>,
) -> ServerResult<Json<Notification>> {
    let notification = context
        .library
        .notifications
        .mark_read(&actor, notification_id)
        .await?;

    Ok(Json(notification.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/stats",
    tag = "activities",
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Stats)
    )
)]
async fn stats(State(context): State<ServerContext>, Actor(actor): Actor) -> ServerResult<Json<Stats>> {
    let stats = context.library.availability.stats(&actor).await?;

    Ok(Json(stats.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/reconcile",
    tag = "activities",
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "The copies that were repaired", body = ReconcileReport),
        (status = 403, description = "Only admins may reconcile")
    )
)]
async fn reconcile(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
) -> ServerResult<Json<ReconcileReport>> {
    let report = context.library.reconciler.run(&actor).await?;

    Ok(Json(report.to_serialized()))
}

pub fn activities_router() -> Router {
    Router::new()
        .route("/", get(list_activities))
        .route("/process", post(process_activities))
}

pub fn notifications_router() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_read))
}

pub fn router() -> Router {
    Router::new()
        .route("/stats", get(stats))
        .route("/reconcile", post(reconcile))
}
