//! Libraries, authors and the JSON book list

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{
    render::{Page, PageResult},
    AuthenticatedUser,
};
use crate::{
    error::AppResult,
    models::{
        book::BookRecord,
        catalog::{Author, CreateAuthor, CreateLibrarian, CreateLibrary, Librarian, LibraryDetail, SetLibraryBooks},
    },
    AppState,
};

/// Public library page with its books and librarian
pub async fn library_page(State(state): State<AppState>, page: Page, Path(id): Path<i64>) -> PageResult {
    let library = state.services.catalog.get_library(id).await?;

    let mut context = page.context();
    context.insert("library", &library);
    page.render(&state, StatusCode::OK, "library_detail.html", context)
}

/// List every book
#[utoipa::path(
    get,
    path = "/api/books/",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All books", body = Vec<BookRecord>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_book_records(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BookRecord>>> {
    Ok(Json(state.services.books.records().await?))
}

/// List authors
#[utoipa::path(
    get,
    path = "/api/authors/",
    tag = "catalog",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authors ordered by name", body = Vec<Author>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_authors(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Author>>> {
    Ok(Json(state.services.catalog.list_authors().await?))
}

/// Create an author
#[utoipa::path(
    post,
    path = "/api/authors/",
    tag = "catalog",
    security(("bearer_auth" = [])),
    request_body = CreateAuthor,
    responses(
        (status = 201, description = "Author created", body = Author),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Missing can_create")
    )
)]
pub async fn create_author(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(payload): Json<CreateAuthor>,
) -> AppResult<(StatusCode, Json<Author>)> {
    let author = state.services.catalog.create_author(&claims, &payload).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

/// Create a library, optionally with books
#[utoipa::path(
    post,
    path = "/api/libraries/",
    tag = "catalog",
    security(("bearer_auth" = [])),
    request_body = CreateLibrary,
    responses(
        (status = 201, description = "Library created", body = LibraryDetail),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Unknown book id")
    )
)]
pub async fn create_library(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(payload): Json<CreateLibrary>,
) -> AppResult<(StatusCode, Json<LibraryDetail>)> {
    let library = state.services.catalog.create_library(&claims, &payload).await?;
    Ok((StatusCode::CREATED, Json(library)))
}

/// Get a library with its books and librarian
#[utoipa::path(
    get,
    path = "/api/libraries/{id}",
    tag = "catalog",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Library ID")),
    responses(
        (status = 200, description = "Library details", body = LibraryDetail),
        (status = 404, description = "Library not found")
    )
)]
pub async fn get_library(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<LibraryDetail>> {
    Ok(Json(state.services.catalog.get_library(id).await?))
}

/// Replace the books held by a library
#[utoipa::path(
    put,
    path = "/api/libraries/{id}/books",
    tag = "catalog",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Library ID")),
    request_body = SetLibraryBooks,
    responses(
        (status = 200, description = "Updated library", body = LibraryDetail),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Library or book not found")
    )
)]
pub async fn set_library_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<SetLibraryBooks>,
) -> AppResult<Json<LibraryDetail>> {
    let library = state
        .services
        .catalog
        .set_library_books(&claims, id, &payload.book_ids)
        .await?;
    Ok(Json(library))
}

/// Assign the librarian of a library
#[utoipa::path(
    post,
    path = "/api/libraries/{id}/librarian",
    tag = "catalog",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Library ID")),
    request_body = CreateLibrarian,
    responses(
        (status = 201, description = "Librarian created", body = Librarian),
        (status = 403, description = "Staff only"),
        (status = 409, description = "Library already has a librarian")
    )
)]
pub async fn create_librarian(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<CreateLibrarian>,
) -> AppResult<(StatusCode, Json<Librarian>)> {
    let librarian = state.services.catalog.create_librarian(&claims, id, &payload).await?;
    Ok((StatusCode::CREATED, Json(librarian)))
}
