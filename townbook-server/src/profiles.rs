use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json,
};
use townbook_collab::NewProfile;
use townbook_core::Role;

use crate::{
    auth::Actor,
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewProfileSchema, RoleSchema, ValidatedJson},
    serialized::{HistoryEntry, Profile, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/profiles",
    tag = "profiles",
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Vec<Profile>),
        (status = 403, description = "Only staff may list profiles")
    )
)]
async fn list_profiles(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
) -> ServerResult<Json<Vec<Profile>>> {
    let profiles = context.library.profiles.list(&actor).await?;

    Ok(Json(profiles.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/profiles",
    tag = "profiles",
    request_body = NewProfileSchema,
    responses(
        (status = 201, body = Profile),
        (status = 403, description = "Only admins may create staff profiles"),
        (status = 409, description = "Email is already in use")
    )
)]
async fn create_profile(
    State(context): State<ServerContext>,
    actor: Option<Actor>,
    ValidatedJson(body): ValidatedJson<NewProfileSchema>,
) -> ServerResult<(StatusCode, Json<Profile>)> {
    let new_profile = NewProfile {
        name: body.name,
        email: body.email,
        role: body.role.unwrap_or(Role::Member),
    };

    let profile = context
        .library
        .profiles
        .create(actor.as_ref().map(|Actor(a)| a), new_profile)
        .await?;

    Ok((StatusCode::CREATED, Json(profile.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/profiles/me",
    tag = "profiles",
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "The calling profile", body = Profile)
    )
)]
async fn me(Actor(actor): Actor) -> Json<Profile> {
    Json(actor.to_serialized())
}

#[utoipa::path(
    get,
    path = "/v1/profiles/{id}",
    tag = "profiles",
    params(("id" = i32, Path, description = "Profile id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Profile)
    )
)]
async fn profile(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(profile_id): Path<i32>,
) -> ServerResult<Json<Profile>> {
    let profile = context.library.profiles.profile(&actor, profile_id).await?;

    Ok(Json(profile.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/profiles/{id}/role",
    tag = "profiles",
    params(("id" = i32, Path, description = "Profile id")),
    request_body = RoleSchema,
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Profile),
        (status = 403, description = "Only admins may change roles")
    )
)]
async fn set_role(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(profile_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<RoleSchema>,
) -> ServerResult<Json<Profile>> {
    let profile = context
        .library
        .profiles
        .set_role(&actor, profile_id, body.role)
        .await?;

    Ok(Json(profile.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/profiles/{id}/history",
    tag = "profiles",
    params(("id" = i32, Path, description = "Profile id")),
    security(("profile_id" = [])),
    responses(
        (status = 200, description = "Reservations of the profile, newest first", body = Vec<HistoryEntry>)
    )
)]
async fn history(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(profile_id): Path<i32>,
) -> ServerResult<Json<Vec<HistoryEntry>>> {
    let history = context.library.lifecycle.history(&actor, profile_id).await?;

    Ok(Json(history.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_profiles).post(create_profile))
        .route("/me", get(me))
        .route("/:id", get(profile))
        .route("/:id/role", patch(set_role))
        .route("/:id/history", get(history))
}
