//! HTTP handlers for the books module.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{request::Parts, StatusCode},
    routing::get,
    Json, Router,
};
use bookshelf_http::error::AppError;
use serde_json::{json, Value};

use super::models::{Book, BookFilter, BookPayload};
use super::repository::BookRepository;

pub const INVALID_ID_MESSAGE: &str = "Invalid book ID";
pub const NOT_FOUND_MESSAGE: &str = "Book not found";
pub const DELETED_MESSAGE: &str = "Book deleted successfully";

type Repo = Arc<dyn BookRepository>;

pub fn router(repo: Repo) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/health", get(health_check))
        .route("/{id}", get(get_book).put(update_book).delete(delete_book))
        .with_state(repo)
}

/// Book id taken from the path; anything but an integer is a 400.
pub struct BookId(pub i64);

impl<S> FromRequestParts<S> for BookId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::bad_request(INVALID_ID_MESSAGE))?;

        raw.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| AppError::bad_request(INVALID_ID_MESSAGE))
    }
}

/// `Json<T>` whose rejections are reported as 400 in the standard envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| {
                AppError::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
            })?;
        Ok(Self(value))
    }
}

/// `Query<T>` whose rejections are reported as 400 in the standard envelope.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                AppError::bad_request(format!("Invalid query string: {}", rejection.body_text()))
            })?;
        Ok(Self(value))
    }
}

/// GET /
async fn list_books(
    State(repo): State<Repo>,
    QueryParams(filter): QueryParams<BookFilter>,
) -> Result<Json<Vec<Book>>, AppError> {
    let books = repo.list(filter.normalized()).await?;
    Ok(Json(books))
}

/// GET /{id}
async fn get_book(State(repo): State<Repo>, BookId(id): BookId) -> Result<Json<Book>, AppError> {
    repo.get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(NOT_FOUND_MESSAGE))
}

/// POST /
async fn create_book(
    State(repo): State<Repo>,
    JsonBody(payload): JsonBody<BookPayload>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let new_book = payload
        .validate()
        .map_err(|err| AppError::validation(err.details(), err.to_string()))?;

    let book = repo.create(new_book).await?;
    tracing::info!(book_id = book.id, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// PUT /{id}
async fn update_book(
    State(repo): State<Repo>,
    BookId(id): BookId,
    JsonBody(payload): JsonBody<BookPayload>,
) -> Result<Json<Book>, AppError> {
    let new_book = payload
        .validate()
        .map_err(|err| AppError::validation(err.details(), err.to_string()))?;

    let book = repo
        .update(id, new_book)
        .await?
        .ok_or_else(|| AppError::not_found(NOT_FOUND_MESSAGE))?;
    tracing::info!(book_id = id, "book updated");
    Ok(Json(book))
}

/// DELETE /{id}
async fn delete_book(State(repo): State<Repo>, BookId(id): BookId) -> Result<Json<Value>, AppError> {
    if !repo.remove(id).await? {
        return Err(AppError::not_found(NOT_FOUND_MESSAGE));
    }
    tracing::info!(book_id = id, "book deleted");
    Ok(Json(json!({ "message": DELETED_MESSAGE })))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "books module is healthy"
}
