//! Submission of task answers to the verification service.

use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const DEFAULT_VERIFY_URL: &str = "https://poligon.aidevs.pl/verify";

/// Verification URL from `AI_DEVS_TASK_URL`, falling back to the default.
pub fn verify_url_from_env() -> String {
    std::env::var("AI_DEVS_TASK_URL").unwrap_or_else(|_| DEFAULT_VERIFY_URL.to_owned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnswer {
    pub task: String,
    pub apikey: String,
    pub answer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub code: i64,
    pub message: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("sending answer to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("verification service at {url} returned an unreadable body: {message}")]
    InvalidResponse { url: String, message: String },
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Submit an answer. A rejected answer (non-2xx) is a [`TaskResponse`]
    /// carrying the status code, not an error.
    async fn send_answer(&self, answer: &TaskAnswer) -> Result<TaskResponse, VerifyError>;
}

pub struct HttpVerifier {
    client: Client,
    url: String,
}

impl HttpVerifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Body of a rejected answer: JSON when possible, raw text otherwise.
fn rejection_message(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_owned()))
}

#[async_trait]
impl Verifier for HttpVerifier {
    async fn send_answer(&self, answer: &TaskAnswer) -> Result<TaskResponse, VerifyError> {
        info!(task = %answer.task, url = %self.url, answer = %answer.answer, "Sending task answer");
        let response = self
            .client
            .post(&self.url)
            .json(answer)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, url = %self.url, "Failed to send task answer");
                VerifyError::Transport {
                    url: self.url.clone(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| VerifyError::InvalidResponse {
            url: self.url.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            warn!(status = %status, body = %body, "Verification service rejected the answer");
            return Ok(TaskResponse {
                code: i64::from(status.as_u16()),
                message: rejection_message(&body),
            });
        }

        let parsed: TaskResponse =
            serde_json::from_str(&body).map_err(|e| VerifyError::InvalidResponse {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        info!(code = parsed.code, message = %parsed.message, "Verification service responded");
        Ok(parsed)
    }
}
