use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use townbook_collab::{PrimaryKey, ProfileData};

use crate::{context::ServerContext, errors::ServerError};

/// The header the authentication gateway forwards the caller's profile id in
pub const PROFILE_HEADER: &str = "x-profile-id";

/// The profile making the request
pub struct Actor(pub ProfileData);

#[async_trait]
impl FromRequestParts<ServerContext> for Actor {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        let profile_id: PrimaryKey = parts
            .headers
            .get(PROFILE_HEADER)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::Unauthorized("Missing profile id"))?
            .trim()
            .parse()
            .map_err(|_| ServerError::Unauthorized("Profile id must be a number"))?;

        let profile = context
            .library
            .profiles
            .resolve(profile_id)
            .await
            .map_err(|e| match e.is_not_found() {
                true => ServerError::Unauthorized("Profile does not exist"),
                false => e.into(),
            })?;

        Ok(Self(profile))
    }
}
