//! Router harness for handler tests: SQLite in memory, one seeded user,
//! a session token for that user and a scratch upload directory.

use crate::{create_router, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use youbook_common::{
    config::AppConfig,
    db::{models::UserInfoActiveModel, schema, DbPool},
    transformer::{ContentTransformer, MockTransformer},
};

pub const USER_ID: &str = "hong";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub token: String,
}

pub async fn test_app() -> TestApp {
    test_app_with(Arc::new(MockTransformer::new())).await
}

pub async fn test_app_with(transformer: Arc<dyn ContentTransformer>) -> TestApp {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let conn = Database::connect(opts).await.unwrap();
    schema::create_tables(&conn).await.unwrap();
    let db = DbPool::from_connection(conn);

    UserInfoActiveModel {
        id: Set(USER_ID.into()),
        name: Set("홍길동".into()),
        gender: Set("남".into()),
        birth: Set(NaiveDate::from_ymd_opt(1950, 3, 1).unwrap()),
    }
    .insert(db.conn())
    .await
    .unwrap();

    let mut config = AppConfig::default();
    config.auth.session_secret = Some("test_secret".into());
    config.uploads.dir = std::env::temp_dir()
        .join(format!("youbook-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();

    let state = AppState::new(Arc::new(config), db, transformer).unwrap();
    state.uploads.ensure_dir().await.unwrap();
    let token = state.sessions.issue(USER_ID).unwrap();

    TestApp {
        router: create_router(state.clone()),
        state,
        token,
    }
}

impl TestApp {
    pub fn post_json(&self, uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get(&self, uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .body(Body::empty())
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}
