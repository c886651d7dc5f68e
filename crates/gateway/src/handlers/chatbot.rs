//! Interview summary handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use youbook_common::{auth::SessionUser, drafting::Summary, errors::Result, extract::AppJson};

/// Summarize an explicit sequence
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "bookId is required"))]
    pub book_id: String,

    #[validate(required(message = "inputCount is required"), range(min = 1))]
    pub input_count: Option<i32>,
}

/// Summarize an explicit sequence, or the book's latest
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LatestSummaryRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "bookId is required"))]
    pub book_id: String,

    #[validate(range(min = 1))]
    pub input_count: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub status: u16,
    pub message: String,
    pub content: String,
}

impl From<Summary> for SummaryResponse {
    fn from(summary: Summary) -> Self {
        Self {
            status: 200,
            message: "Summary successfully saved!".to_string(),
            content: summary.content,
        }
    }
}

pub async fn summary(
    State(state): State<AppState>,
    user: SessionUser,
    AppJson(request): AppJson<SummaryRequest>,
) -> Result<Json<SummaryResponse>> {
    request.validate()?;

    let summary = state
        .drafting
        .detached(move |drafting| async move {
            drafting
                .summarize(&user.user_id, &request.book_id, request.input_count)
                .await
        })
        .await?;

    Ok(Json(summary.into()))
}

pub async fn summary2(
    State(state): State<AppState>,
    user: SessionUser,
    AppJson(request): AppJson<LatestSummaryRequest>,
) -> Result<Json<SummaryResponse>> {
    request.validate()?;

    let summary = state
        .drafting
        .detached(move |drafting| async move {
            drafting
                .summarize(&user.user_id, &request.book_id, request.input_count)
                .await
        })
        .await?;

    Ok(Json(summary.into()))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{test_app, TestApp, USER_ID};
    use axum::http::StatusCode;
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};
    use serde_json::json;
    use youbook_common::db::models::{ChatbotSummaryEntity, ChatbotTurnActiveModel};

    async fn seed_interview(app: &TestApp, book_id: &str) {
        for quest_num in 1..=2 {
            ChatbotTurnActiveModel {
                user_id: Set(USER_ID.into()),
                book_id: Set(book_id.into()),
                input_count: Set(1),
                quest_num: Set(quest_num),
                question: Set(format!("질문 {}", quest_num)),
                response: Set(format!("대답 {}", quest_num)),
            }
            .insert(app.state.db.conn())
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_summary_is_stored() {
        let app = test_app().await;
        seed_interview(&app, "b1").await;

        let (status, body) = app
            .send(app.post_json("/chatbot/summary", json!({ "bookId": "b1", "inputCount": 1 })))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 200);
        assert!(body["content"].as_str().unwrap().contains("질문 1, Assistant: 대답 1"));

        let rows = ChatbotSummaryEntity::find().all(app.state.db.conn()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].input_count, 1);
    }

    #[tokio::test]
    async fn test_summary_requires_input_count() {
        let app = test_app().await;
        let (status, _) = app
            .send(app.post_json("/chatbot/summary", json!({ "bookId": "b1" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_summary2_uses_latest_sequence() {
        let app = test_app().await;
        seed_interview(&app, "b1").await;
        app.send(app.post_json(
            "/write_process/chatbot2",
            json!({ "content": "raw", "bookId": "b1" }),
        ))
        .await;

        let (status, body) = app
            .send(app.post_json("/chatbot/summary2", json!({ "bookId": "b1" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Summary successfully saved!");
    }

    #[tokio::test]
    async fn test_summary_without_transcript_is_not_found() {
        let app = test_app().await;
        let (status, _) = app
            .send(app.post_json("/chatbot/summary", json!({ "bookId": "b1", "inputCount": 3 })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
