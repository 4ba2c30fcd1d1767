use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipauto::utoipauto;

#[utoipauto(paths = "./townbook-server/src")]
#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    info(
        title = "TownBook API",
        description = "townbook-server exposes the catalog, reservations and room schedules of a TownBook library"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            // Set by the authentication gateway in front of the server
            let scheme = ApiKey::Header(ApiKeyValue::with_description(
                "X-Profile-Id",
                "The id of the calling profile",
            ));

            components.add_security_scheme("profile_id", SecurityScheme::ApiKey(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
