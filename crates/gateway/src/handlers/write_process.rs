//! Drafting handlers: stage raw input, optionally with its narrative version

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use youbook_common::{
    auth::SessionUser,
    drafting::{Placement, StagedEntry},
    errors::Result,
    extract::AppJson,
};

/// First entry of a brand-new book
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewBookRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,
}

/// Entry for a new or existing book
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EntryRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,

    /// Absent or empty starts a new book
    #[serde(default)]
    pub book_id: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,
}

/// Entry that may correct the latest slot instead of appending
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,

    #[serde(default)]
    pub book_id: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,

    /// Overwrite the raw entry at the latest sequence
    #[serde(default)]
    pub is_chatbot: bool,

    /// Put the narrative at the latest sequence
    #[serde(default)]
    pub is_chatbot_purified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub status: u16,
    pub book_id: String,
    pub input_count: i32,
}

impl From<StagedEntry> for EntryResponse {
    fn from(entry: StagedEntry) -> Self {
        Self {
            status: 200,
            book_id: entry.book_id,
            input_count: entry.input_count,
        }
    }
}

/// Start a new book with a profile-prefixed first entry
pub async fn chatbot(
    State(state): State<AppState>,
    user: SessionUser,
    AppJson(request): AppJson<NewBookRequest>,
) -> Result<Json<EntryResponse>> {
    request.validate()?;
    user.ensure_same_user(request.user_id.as_deref())?;

    let staged = state
        .drafting
        .detached(move |drafting| async move {
            drafting
                .start_book(&user.user_id, &request.content, request.category)
                .await
        })
        .await?;

    Ok(Json(staged.into()))
}

/// Stage raw input at the next sequence of a book
pub async fn chatbot2(
    State(state): State<AppState>,
    user: SessionUser,
    AppJson(request): AppJson<EntryRequest>,
) -> Result<Json<EntryResponse>> {
    request.validate()?;
    user.ensure_same_user(request.user_id.as_deref())?;

    let staged = state
        .drafting
        .detached(move |drafting| async move {
            drafting
                .stage_raw(
                    &user.user_id,
                    request.book_id.as_deref(),
                    &request.content,
                    request.category,
                )
                .await
        })
        .await?;

    Ok(Json(staged.into()))
}

/// Stage profile-prefixed raw input and its narrative as a new entry
pub async fn book_reading(
    State(state): State<AppState>,
    user: SessionUser,
    AppJson(request): AppJson<EntryRequest>,
) -> Result<Json<EntryResponse>> {
    request.validate()?;
    user.ensure_same_user(request.user_id.as_deref())?;

    let staged = state
        .drafting
        .detached(move |drafting| async move {
            drafting
                .stage_profiled_and_transform(
                    &user.user_id,
                    request.book_id.as_deref(),
                    &request.content,
                    request.category,
                )
                .await
        })
        .await?;

    Ok(Json(staged.into()))
}

/// Stage raw input and its narrative, appending or correcting per the flags
pub async fn book_reading2(
    State(state): State<AppState>,
    user: SessionUser,
    AppJson(request): AppJson<RevisionRequest>,
) -> Result<Json<EntryResponse>> {
    request.validate()?;
    user.ensure_same_user(request.user_id.as_deref())?;

    let placement = Placement {
        overwrite_raw: request.is_chatbot,
        transformed_at_latest: request.is_chatbot_purified,
    };

    let staged = state
        .drafting
        .detached(move |drafting| async move {
            drafting
                .stage_and_transform(
                    &user.user_id,
                    request.book_id.as_deref(),
                    &request.content,
                    request.category,
                    placement,
                )
                .await
        })
        .await?;

    Ok(Json(staged.into()))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{test_app, test_app_with};
    use axum::{body::Body, http::{Request, StatusCode}};
    use sea_orm::{EntityTrait, PaginatorTrait};
    use serde_json::json;
    use std::sync::Arc;
    use youbook_common::db::models::{RawEntryEntity, TransformedEntryEntity};
    use youbook_common::transformer::MockTransformer;

    #[tokio::test]
    async fn test_first_and_second_entry() {
        let app = test_app().await;

        let (status, body) = app
            .send(app.post_json(
                "/write_process/chatbot2",
                json!({ "content": "이름: 홍길동...", "category": "family" }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 200);
        assert_eq!(body["inputCount"], 1);
        let book_id = body["bookId"].as_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&book_id).is_ok());

        let (status, body) = app
            .send(app.post_json(
                "/write_process/chatbot2",
                json!({ "content": "두 번째", "bookId": book_id, "category": "family" }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inputCount"], 2);
        assert_eq!(body["bookId"], book_id.as_str());
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected() {
        let app = test_app().await;
        let (status, body) = app
            .send(app.post_json("/write_process/chatbot2", json!({ "content": "" })))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert_eq!(
            RawEntryEntity::find().count(app.state.db.conn()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_mistyped_field_is_bad_request() {
        let app = test_app().await;
        let (status, body) = app
            .send(app.post_json(
                "/write_process/chatbot2",
                json!({ "content": "x", "bookId": 123 }),
            ))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthorized() {
        let app = test_app().await;
        let request = Request::post("/write_process/chatbot2")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "content": "x" }).to_string()))
            .unwrap();

        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn test_session_cookie_is_accepted() {
        let app = test_app().await;
        let request = Request::post("/write_process/chatbot2")
            .header("content-type", "application/json")
            .header("cookie", format!("theme=dark; session={}", app.token))
            .body(Body::from(json!({ "content": "x" }).to_string()))
            .unwrap();

        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_foreign_user_id_is_forbidden() {
        let app = test_app().await;
        let (status, _) = app
            .send(app.post_json(
                "/write_process/book_reading",
                json!({ "content": "x", "userId": "someone-else" }),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_new_book_is_prefixed_with_profile() {
        let app = test_app().await;
        let (status, body) = app
            .send(app.post_json("/write_process/chatbot", json!({ "content": "학교" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inputCount"], 1);

        let rows = RawEntryEntity::find().all(app.state.db.conn()).await.unwrap();
        assert!(rows[0].content.starts_with("이름: 홍길동, 성별: 남"));
    }

    #[tokio::test]
    async fn test_book_reading_stores_profiled_raw_and_narrative() {
        let app = test_app().await;
        let (status, body) = app
            .send(app.post_json("/write_process/book_reading", json!({ "content": "졸업식" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inputCount"], 1);

        let conn = app.state.db.conn();
        let raw = RawEntryEntity::find().all(conn).await.unwrap();
        assert!(raw[0].content.starts_with("이름: 홍길동"));
        assert!(raw[0].content.ends_with("졸업식"));
        assert_eq!(TransformedEntryEntity::find().count(conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_book_reading2_correction_flow() {
        let app = test_app().await;
        let (_, body) = app
            .send(app.post_json("/write_process/book_reading2", json!({ "content": "초안" })))
            .await;
        assert_eq!(body["inputCount"], 1);
        let book_id = body["bookId"].as_str().unwrap().to_string();

        let (status, body) = app
            .send(app.post_json(
                "/write_process/book_reading2",
                json!({
                    "content": "수정",
                    "bookId": book_id,
                    "isChatbot": true,
                    "isChatbotPurified": true
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inputCount"], 1);
        assert_eq!(
            RawEntryEntity::find().count(app.state.db.conn()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_book_reading2_correction_without_entries() {
        let app = test_app().await;
        let (status, body) = app
            .send(app.post_json(
                "/write_process/book_reading2",
                json!({ "content": "수정", "bookId": "nothing-here", "isChatbot": true }),
            ))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_transformer_failure_leaves_no_rows() {
        let app = test_app_with(Arc::new(MockTransformer::failing())).await;
        let (status, body) = app
            .send(app.post_json(
                "/write_process/book_reading2",
                json!({ "content": "입력", "category": "family" }),
            ))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], 500);
        let conn = app.state.db.conn();
        assert_eq!(RawEntryEntity::find().count(conn).await.unwrap(), 0);
        assert_eq!(TransformedEntryEntity::find().count(conn).await.unwrap(), 0);
    }
}
