//! Content transformer abstraction
//!
//! Adapter over the generative-text service. Two operations:
//! - elaborate: turn a raw life-story fragment into autobiography narrative,
//!   given the author's profile and what the book already says
//! - summarize: condense a chatbot interview transcript
//!
//! Calls are read-only with respect to local state and are always made
//! before a transaction is opened.

use crate::config::TransformerConfig;
use crate::db::models::UserInfo;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Author context handed to the narrative model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub gender: String,
    pub birth: NaiveDate,
}

impl UserProfile {
    /// Raw input prefixed with the author's profile, the form the
    /// single-step routes store in `init_input`
    pub fn annotate(&self, content: &str) -> String {
        format!(
            "이름: {}, 성별: {}, 생일: {}, 입력텍스트: {}",
            self.name,
            self.gender,
            self.birth.format("%Y-%m-%d"),
            content
        )
    }
}

impl From<UserInfo> for UserProfile {
    fn from(user: UserInfo) -> Self {
        Self {
            name: user.name,
            gender: user.gender,
            birth: user.birth,
        }
    }
}

/// Trait for generative-text transformations
#[async_trait]
pub trait ContentTransformer: Send + Sync {
    /// Write narrative for `input`. `previous` is the text the book already
    /// holds and must not be regenerated.
    async fn elaborate(
        &self,
        profile: &UserProfile,
        previous: Option<&str>,
        input: &str,
    ) -> Result<String>;

    /// Summarize a chatbot interview transcript
    async fn summarize(&self, transcript: &str) -> Result<String>;

    /// Get the narrative model name
    fn model_name(&self) -> &str;
}

/// System prompt for the narrative model
pub fn narrative_prompt(profile: &UserProfile, previous: Option<&str>) -> String {
    let previous = previous
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("이전 입력 없음");

    format!(
        "당신은 한국인의 자서전 작성을 돕는 도우미입니다. 다음은 사용자의 기본 정보입니다:\n\n\
         이름: {}\n성별: {}\n생일: {}\n\n\
         다음은 이미 알고 있는 입력 내용입니다. 이 내용은 새로 생성할 필요가 없습니다:\n\n\
         {}\n\n\
         위 정보를 제외한 새로운 입력만을 사용하여 내용을 작성해 주세요. 적절히 문단을 나눠 작성해 주세요.",
        profile.name,
        profile.gender,
        profile.birth.format("%Y-%m-%d"),
        previous
    )
}

const SUMMARY_PROMPT: &str = "당신은 한국인이 입력한 글을 요약해주는 도우미입니다. \
    기본 컨텐츠와 질의 응답 형식으로 구성된 텍스트에 대해서, 정제된 텍스트로 제공하세요";

/// OpenAI chat-completions client
pub struct OpenAIChatTransformer {
    client: reqwest::Client,
    api_key: String,
    narrative_model: String,
    summary_model: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIChatTransformer {
    /// Create a new client
    pub fn new(
        api_key: String,
        narrative_model: String,
        summary_model: String,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            narrative_model,
            summary_model,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout,
        })
    }

    async fn complete(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::TransformerError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::TransformerError {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| AppError::TransformerError {
                message: "Empty response".to_string(),
            })
    }

    fn request_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::TransformerTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AppError::TransformerError {
                message: format!("Request failed: {}", err),
            }
        }
    }

    async fn timed(&self, model: &str, operation: &str, system: &str, user: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.complete(model, system, user).await;
        metrics::record_transform(
            start.elapsed().as_secs_f64(),
            model,
            operation,
            result.is_ok(),
        );
        if let Err(ref e) = result {
            tracing::warn!(operation, model, error = %e, "Transformer request failed");
        }
        result
    }
}

#[async_trait]
impl ContentTransformer for OpenAIChatTransformer {
    async fn elaborate(
        &self,
        profile: &UserProfile,
        previous: Option<&str>,
        input: &str,
    ) -> Result<String> {
        let system = narrative_prompt(profile, previous);
        self.timed(&self.narrative_model, "elaborate", &system, input)
            .await
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        let user = format!("{}을 요약해주세요", transcript);
        self.timed(&self.summary_model, "summarize", SUMMARY_PROMPT, &user)
            .await
    }

    fn model_name(&self) -> &str {
        &self.narrative_model
    }
}

/// Deterministic transformer for tests and local development
#[derive(Default)]
pub struct MockTransformer {
    fail: bool,
    calls: AtomicUsize,
}

impl MockTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transformer whose every call fails like an unreachable service
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, text: String) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AppError::TransformerError {
                message: "mock transformer failure".to_string(),
            })
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl ContentTransformer for MockTransformer {
    async fn elaborate(
        &self,
        profile: &UserProfile,
        _previous: Option<&str>,
        input: &str,
    ) -> Result<String> {
        self.answer(format!("{}의 이야기: {}", profile.name, input.trim()))
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        self.answer(format!("요약: {}", transcript.trim()))
    }

    fn model_name(&self) -> &str {
        "mock-transformer"
    }
}

/// Create a transformer based on configuration
pub fn create_transformer(config: &TransformerConfig) -> Result<Arc<dyn ContentTransformer>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "transformer.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIChatTransformer::new(
                key,
                config.narrative_model.clone(),
                config.summary_model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockTransformer::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown transformer provider: {}", other),
        }),
    }
}
