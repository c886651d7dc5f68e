//! Store handler: copy a finalized draft into the library

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use youbook_common::{
    auth::SessionUser,
    drafting::StoreRequest,
    errors::{AppError, Result},
    extract::AppJson,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StoreBookRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "bookId is required"))]
    pub book_id: String,

    #[validate(required(message = "inputCount is required"), range(min = 1))]
    pub input_count: Option<i32>,

    #[serde(default)]
    pub category: Option<String>,

    /// Defaults to the untitled-book title
    #[serde(default)]
    pub title: Option<String>,

    /// Cover image
    #[serde(default, rename = "image_path", alias = "imagePath")]
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub message: String,
}

pub async fn store(
    State(state): State<AppState>,
    user: SessionUser,
    AppJson(request): AppJson<StoreBookRequest>,
) -> Result<Json<StoreResponse>> {
    request.validate()?;
    let input_count = request.input_count.ok_or_else(|| AppError::MissingField {
        field: "inputCount".to_string(),
    })?;

    let store = StoreRequest {
        book_id: request.book_id,
        input_count,
        category: request.category,
        title: request.title,
        image_path: request.image_path,
    };
    let sections = state
        .drafting
        .detached(move |drafting| async move {
            drafting.store_book(&user.user_id, store).await
        })
        .await?;

    Ok(Json(StoreResponse {
        message: format!(
            "Data successfully stored in book_list and real_book ({} sections).",
            sections
        ),
    }))
}
