mod activities;
mod auth;
mod books;
mod context;
mod docs;
mod errors;
mod profiles;
mod reservations;
mod rooms;
mod schemas;
mod serialized;
mod sse;

use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use townbook_collab::Library;

pub use auth::PROFILE_HEADER;
pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Builds the routes of the server, with the library in their state
pub fn app(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/books", books::router())
        .nest("/copies", books::copies_router())
        .nest("/rooms", rooms::router())
        .nest("/reservations", reservations::router())
        .nest("/profiles", profiles::router())
        .nest("/activities", activities::activities_router())
        .nest("/notifications", activities::notifications_router())
        .nest("/events", sse::router())
        .merge(activities::router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context)
}

/// Starts the TownBook server
pub async fn run_server(library: Arc<Library>, port: u16) -> std::io::Result<()> {
    let context = ServerContext::new(library);
    sse::forward_events(&context);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);
    axum::serve(listener, app(context).into_make_service()).await
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use townbook_collab::{Database, Library, MemoryDatabase, NewProfile, ProfileData};
    use townbook_core::{Config, Role};

    use super::*;

    struct TestServer {
        app: axum::Router,
        member: ProfileData,
        librarian: ProfileData,
    }

    impl TestServer {
        async fn new() -> Self {
            let database = Arc::new(MemoryDatabase::new());
            let library = Arc::new(Library::new(Config::default(), database.clone()));

            let profile = |name: &str, role| NewProfile {
                name: name.to_string(),
                email: format!("{}@townbook.test", name.to_lowercase()),
                role,
            };

            let member = database.create_profile(profile("Mina", Role::Member)).await.unwrap();
            let librarian = database
                .create_profile(profile("Lena", Role::Librarian))
                .await
                .unwrap();

            Self {
                app: app(ServerContext::new(library)),
                member,
                librarian,
            }
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            profile: Option<&ProfileData>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);

            if let Some(profile) = profile {
                request = request.header(PROFILE_HEADER, profile.id.to_string());
            }

            let request = match body {
                Some(body) => request
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();

            let value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

            (status, value)
        }
    }

    fn tomorrow() -> String {
        (townbook_collab::today() + chrono::Days::new(1)).to_string()
    }

    #[tokio::test]
    async fn test_identity_is_required() {
        let server = TestServer::new().await;

        let (status, _) = server.send(Method::GET, "/v1/profiles/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::get("/v1/profiles/me")
            .header(PROFILE_HEADER, "9999")
            .body(Body::empty())
            .unwrap();
        let response = server.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (status, me) = server
            .send(Method::GET, "/v1/profiles/me", Some(&server.member), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], "member");
    }

    #[tokio::test]
    async fn test_book_reservation_flow() {
        let server = TestServer::new().await;
        let new_book = json!({
            "title": "The Left Hand of Darkness",
            "author": "Ursula K. Le Guin",
            "genres": ["science fiction"],
            "language": "en",
            "pageCount": 304,
            "rating": 4.5
        });

        let (status, _) = server
            .send(Method::POST, "/v1/books", Some(&server.member), Some(new_book.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, book) = server
            .send(Method::POST, "/v1/books", Some(&server.librarian), Some(new_book))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let book_id = book["id"].as_i64().unwrap();

        let (status, _) = server
            .send(
                Method::POST,
                &format!("/v1/books/{book_id}/copies"),
                Some(&server.librarian),
                Some(json!({ "location": "Shelf A3", "condition": "good" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, reservation) = server
            .send(
                Method::POST,
                "/v1/reservations",
                Some(&server.member),
                Some(json!({ "itemType": "book", "itemId": book_id, "startDate": tomorrow() })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reservation["status"], "pending");
        let reservation_id = reservation["id"].as_i64().unwrap();

        let approve = format!("/v1/reservations/{reservation_id}/approve");

        let (status, _) = server
            .send(Method::POST, &approve, Some(&server.member), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, approved) = server
            .send(Method::POST, &approve, Some(&server.librarian), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");
        assert_eq!(approved["displayStatus"], "approved");

        let (_, availability) = server
            .send(Method::GET, &format!("/v1/books/{book_id}/availability"), None, None)
            .await;
        assert_eq!(availability["available"], 0);
        assert_eq!(availability["total"], 1);

        let (status, _) = server
            .send(Method::POST, &approve, Some(&server.librarian), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "approving twice is an invalid transition");

        let (status, _) = server
            .send(Method::DELETE, &format!("/v1/books/{book_id}"), Some(&server.librarian), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, returned) = server
            .send(
                Method::POST,
                &format!("/v1/reservations/{reservation_id}/return"),
                Some(&server.member),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(returned["status"], "completed");

        let (_, availability) = server
            .send(Method::GET, &format!("/v1/books/{book_id}/availability"), None, None)
            .await;
        assert_eq!(availability["available"], 1);

        let (_, notifications) = server
            .send(Method::GET, "/v1/notifications", Some(&server.member), None)
            .await;
        assert_eq!(notifications.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_reports_each_reservation() {
        let server = TestServer::new().await;

        let (_, book) = server
            .send(
                Method::POST,
                "/v1/books",
                Some(&server.librarian),
                Some(json!({ "title": "Kindred", "author": "Octavia E. Butler", "language": "en" })),
            )
            .await;
        let book_id = book["id"].as_i64().unwrap();

        server
            .send(
                Method::POST,
                &format!("/v1/books/{book_id}/copies"),
                Some(&server.librarian),
                Some(json!({ "location": "Shelf B1", "condition": "worn" })),
            )
            .await;

        let mut ids = vec![];
        for _ in 0..2 {
            let (_, reservation) = server
                .send(
                    Method::POST,
                    "/v1/reservations",
                    Some(&server.member),
                    Some(json!({ "itemType": "book", "itemId": book_id, "startDate": tomorrow() })),
                )
                .await;
            ids.push(reservation["id"].as_i64().unwrap());
        }

        let (status, results) = server
            .send(
                Method::POST,
                "/v1/reservations/batch",
                Some(&server.librarian),
                Some(json!({ "action": "approve", "ids": ids })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let results = results.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["reservation"]["status"], "approved");
        assert!(results[0]["error"].is_null());
        assert!(results[1]["reservation"].is_null());
        assert!(results[1]["error"].is_string(), "the only copy is already held");
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let server = TestServer::new().await;

        let (status, _) = server
            .send(
                Method::POST,
                "/v1/books",
                Some(&server.librarian),
                Some(json!({ "title": "", "author": "Nobody", "language": "en" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server
            .send(
                Method::POST,
                "/v1/reservations",
                Some(&server.member),
                Some(json!({ "itemType": "room", "itemId": 1, "startDate": tomorrow() })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server.send(Method::GET, "/v1/books/4040", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = server
            .send(Method::GET, "/v1/events?table=shelves", Some(&server.member), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_room_schedule_and_free_slots() {
        let server = TestServer::new().await;
        let date = tomorrow();

        let (status, room) = server
            .send(
                Method::POST,
                "/v1/rooms",
                Some(&server.librarian),
                Some(json!({ "name": "Quiet Room", "capacity": 4 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let room_id = room["id"].as_i64().unwrap();

        let schedule = format!("/v1/rooms/{room_id}/schedule/{date}");
        let (status, _) = server
            .send(
                Method::PUT,
                &schedule,
                Some(&server.librarian),
                Some(json!({ "slots": [
                    { "start": "09:00:00", "end": "10:00:00" },
                    { "start": "10:00:00", "end": "11:00:00" }
                ] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, reservation) = server
            .send(
                Method::POST,
                "/v1/reservations",
                Some(&server.member),
                Some(json!({
                    "itemType": "room",
                    "itemId": room_id,
                    "startDate": date,
                    "slotStart": 0
                })),
            )
            .await;
        let reservation_id = reservation["id"].as_i64().unwrap();

        server
            .send(
                Method::POST,
                &format!("/v1/reservations/{reservation_id}/approve"),
                Some(&server.librarian),
                None,
            )
            .await;

        let (_, free) = server
            .send(Method::GET, &format!("/v1/rooms/{room_id}/availability/{date}"), None, None)
            .await;
        let free = free.as_array().unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0]["index"], 1);

        let (status, _) = server
            .send(
                Method::PUT,
                &schedule,
                Some(&server.librarian),
                Some(json!({ "slots": [] })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "the claimed slot must stay");

        let crowded: Vec<_> = (0..97)
            .map(|_| json!({ "start": "09:00:00", "end": "10:00:00" }))
            .collect();
        let (status, _) = server
            .send(
                Method::PUT,
                &schedule,
                Some(&server.librarian),
                Some(json!({ "slots": crowded })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_document() {
        let server = TestServer::new().await;

        let (status, document) = server.send(Method::GET, "/api.json", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(document["paths"]["/v1/reservations/{id}/approve"].is_object());
    }
}
