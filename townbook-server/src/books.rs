use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json,
};
use townbook_collab::{BookQuery, NewBookCopy, UpdatedBookCopy};

use crate::{
    auth::Actor,
    context::ServerContext,
    errors::ServerResult,
    schemas::{BookQuerySchema, NewBookSchema, NewCopySchema, UpdateBookSchema, UpdateCopySchema, ValidatedJson},
    serialized::{Book, BookAvailability, BookCopy, BookListing, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/books",
    tag = "books",
    params(BookQuerySchema),
    responses(
        (status = 200, body = Vec<BookListing>)
    )
)]
async fn list_books(
    State(context): State<ServerContext>,
    Query(query): Query<BookQuerySchema>,
) -> ServerResult<Json<Vec<BookListing>>> {
    let query: BookQuery = query.into();
    let books = context.library.catalog.books(&query).await?;

    Ok(Json(books.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, body = Book),
        (status = 404, description = "Book does not exist")
    )
)]
async fn book(
    State(context): State<ServerContext>,
    Path(book_id): Path<i32>,
) -> ServerResult<Json<Book>> {
    let book = context.library.catalog.book(book_id).await?;

    Ok(Json(book.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/books",
    tag = "books",
    request_body = NewBookSchema,
    security(("profile_id" = [])),
    responses(
        (status = 201, body = Book),
        (status = 403, description = "Only staff may add books")
    )
)]
async fn create_book(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    ValidatedJson(body): ValidatedJson<NewBookSchema>,
) -> ServerResult<(StatusCode, Json<Book>)> {
    let book = context.library.catalog.create_book(&actor, body.into()).await?;

    Ok((StatusCode::CREATED, Json(book.to_serialized())))
}

#[utoipa::path(
    patch,
    path = "/v1/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book id")),
    request_body = UpdateBookSchema,
    security(("profile_id" = [])),
    responses(
        (status = 200, body = Book)
    )
)]
async fn update_book(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(book_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UpdateBookSchema>,
) -> ServerResult<Json<Book>> {
    let book = context
        .library
        .catalog
        .update_book(&actor, body.into_update(book_id))
        .await?;

    Ok(Json(book.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book id")),
    security(("profile_id" = [])),
    responses(
        (status = 204, description = "Book and its copies were deleted"),
        (status = 409, description = "Book has active reservations")
    )
)]
async fn delete_book(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(book_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context.library.catalog.delete_book(&actor, book_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/books/{id}/copies",
    tag = "books",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, body = Vec<BookCopy>)
    )
)]
async fn copies(
    State(context): State<ServerContext>,
    Path(book_id): Path<i32>,
) -> ServerResult<Json<Vec<BookCopy>>> {
    let copies = context.library.catalog.copies(book_id).await?;

    Ok(Json(copies.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/books/{id}/copies",
    tag = "books",
    params(("id" = i32, Path, description = "Book id")),
    request_body = NewCopySchema,
    security(("profile_id" = [])),
    responses(
        (status = 201, body = BookCopy)
    )
)]
async fn add_copy(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(book_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewCopySchema>,
) -> ServerResult<(StatusCode, Json<BookCopy>)> {
    let new_copy = NewBookCopy {
        book_id,
        location: body.location,
        condition: body.condition,
    };

    let copy = context.library.catalog.add_copy(&actor, new_copy).await?;

    Ok((StatusCode::CREATED, Json(copy.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/books/{id}/availability",
    tag = "books",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, body = BookAvailability)
    )
)]
async fn availability(
    State(context): State<ServerContext>,
    Path(book_id): Path<i32>,
) -> ServerResult<Json<BookAvailability>> {
    let availability = context.library.availability.book_availability(book_id).await?;

    Ok(Json(availability.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/copies/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Copy id")),
    request_body = UpdateCopySchema,
    security(("profile_id" = [])),
    responses(
        (status = 200, body = BookCopy)
    )
)]
async fn update_copy(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(copy_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UpdateCopySchema>,
) -> ServerResult<Json<BookCopy>> {
    let updated_copy = UpdatedBookCopy {
        id: copy_id,
        location: body.location,
        condition: body.condition,
    };

    let copy = context.library.catalog.update_copy(&actor, updated_copy).await?;

    Ok(Json(copy.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/copies/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Copy id")),
    security(("profile_id" = [])),
    responses(
        (status = 204, description = "Copy was deleted"),
        (status = 409, description = "Copy is held by a reservation")
    )
)]
async fn delete_copy(
    State(context): State<ServerContext>,
    Actor(actor): Actor,
    Path(copy_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context.library.catalog.delete_copy(&actor, copy_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/:id", get(book).patch(update_book).delete(delete_book))
        .route("/:id/copies", get(copies).post(add_copy))
        .route("/:id/availability", get(availability))
}

pub fn copies_router() -> Router {
    Router::new().route("/:id", patch(update_copy).delete(delete_copy))
}
