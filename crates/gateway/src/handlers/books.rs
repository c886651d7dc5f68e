//! Library handlers: the session user's stored books

use axum::{
    extract::{Path, State},
    Json,
};

use crate::AppState;
use youbook_common::{
    auth::SessionUser,
    db::models::{BookListing, BookSection},
    errors::{AppError, Result},
};

/// Stored books, most recently stored first
pub async fn list_books(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<Vec<BookListing>>> {
    let books = state.drafting.repository().list_books(&user.user_id).await?;
    Ok(Json(books))
}

/// Sections of one stored book, in reading order
pub async fn get_book(
    State(state): State<AppState>,
    user: SessionUser,
    Path(book_id): Path<String>,
) -> Result<Json<Vec<BookSection>>> {
    let sections = state
        .drafting
        .repository()
        .book_sections(&user.user_id, &book_id)
        .await?;

    if sections.is_empty() {
        return Err(AppError::NotFound {
            resource_type: "book".to_string(),
            id: book_id,
        });
    }

    Ok(Json(sections))
}
