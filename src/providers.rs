//! reqwest-backed implementations of the collaborator traits.
//!
//! - [`HttpFetcher`]: plain GET, bytes out.
//! - [`OpenAiClient`]: OpenAI-compatible chat completions, used for text
//!   completion and for image description (image sent as a base64 data URL).
//! - [`WhisperTranscriber`]: OpenAI-compatible `/audio/transcriptions`
//!   endpoint (Groq by default).
//!
//! The API key is passed through as a bearer token; nothing else about
//! authentication is handled here.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::contract::{
    CompletionError, Completer, ContentFetcher, DescribeError, FetchError, ImageDescriber,
    Transcriber, TranscriptionError,
};
use crate::markdown::ResourceType;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3";

/// Fetches content over HTTP(S).
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_owned(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            error!(error = ?e, url, "GET request failed");
            transport(e)
        })?;
        let status = response.status();
        if !status.is_success() {
            error!(status = %status, url, "GET returned non-success status");
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        debug!(url, size = bytes.len(), "Fetched content");
        Ok(bytes.to_vec())
    }
}

/// Connection settings for an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root, e.g. `https://api.openai.com/v1` or a local server.
    pub base_url: String,
    pub api_key: String,
    pub completion_model: String,
    pub vision_model: String,
    pub timeout_secs: Option<u64>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_owned(),
            api_key: api_key.into(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_owned(),
            vision_model: DEFAULT_VISION_MODEL.to_owned(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn build_client(timeout_secs: Option<u64>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

/// Chat completions client for text and vision requests.
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, reqwest::Error> {
        info!(
            base_url = %config.base_url,
            completion_model = %config.completion_model,
            vision_model = %config.vision_model,
            "Initialising chat completions client"
        );
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, String> {
        let request = ChatRequest { model, messages };
        debug!(model, endpoint = %self.endpoint(), "Sending chat completion request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API returned {status}: {body}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {e}"))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| "response contained no message content".to_owned())
    }
}

fn text_messages(system_prompt: &str, user_prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system",
            content: MessageContent::Text(system_prompt.to_owned()),
        },
        ChatMessage {
            role: "user",
            content: MessageContent::Text(user_prompt.to_owned()),
        },
    ]
}

fn image_messages(system_prompt: &str, image: &[u8], user_prompt: &str) -> Vec<ChatMessage> {
    let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));
    vec![
        ChatMessage {
            role: "system",
            content: MessageContent::Text(system_prompt.to_owned()),
        },
        ChatMessage {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: user_prompt.to_owned(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        },
    ]
}

#[async_trait]
impl Completer for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        info!(
            model = %self.config.completion_model,
            system_len = system_prompt.len(),
            user_len = user_prompt.len(),
            "Requesting completion"
        );
        let model = self.config.completion_model.clone();
        self.chat(&model, text_messages(system_prompt, user_prompt))
            .await
            .map_err(|message| {
                error!(error = %message, "Completion request failed");
                CompletionError::Provider(message)
            })
    }
}

#[async_trait]
impl ImageDescriber for OpenAiClient {
    async fn describe_image(
        &self,
        system_prompt: &str,
        image: &[u8],
        user_prompt: &str,
    ) -> Result<String, DescribeError> {
        info!(
            model = %self.config.vision_model,
            image_size = image.len(),
            "Requesting image description"
        );
        let model = self.config.vision_model.clone();
        self.chat(&model, image_messages(system_prompt, image, user_prompt))
            .await
            .map_err(|message| {
                error!(error = %message, "Image description request failed");
                DescribeError::Provider(message)
            })
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Speech-to-text over an OpenAI-compatible transcription endpoint.
pub struct WhisperTranscriber {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(None)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Groq's hosted `whisper-large-v3`.
    pub fn groq(api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::new(GROQ_BASE_URL, api_key, DEFAULT_TRANSCRIPTION_MODEL)
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }
}

/// Upload file name and MIME type for an audio resource type.
fn audio_upload(format: &ResourceType) -> (&'static str, &'static str) {
    match format {
        ResourceType::Wav => ("audio.wav", "audio/wav"),
        ResourceType::M4a => ("audio.m4a", "audio/mp4"),
        _ => ("audio.mp3", "audio/mpeg"),
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &ResourceType,
    ) -> Result<String, TranscriptionError> {
        info!(model = %self.model, size = audio.len(), %format, "Trying to transcribe audio");
        let provider_error = |message: String| {
            error!(error = %message, "Transcription failed");
            TranscriptionError::Provider(message)
        };

        let (file_name, mime) = audio_upload(format);
        let file = Part::bytes(audio.to_vec())
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| provider_error(e.to_string()))?;
        let form = Form::new().text("model", self.model.clone()).part("file", file);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| provider_error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(format!("API returned {status}: {body}")));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| provider_error(format!("invalid response body: {e}")))?;
        debug!(chars = parsed.text.len(), "Transcription endpoint responded");
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: text_messages("sys", "usr"),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "usr"}
                ]
            })
        );
    }

    #[test]
    fn image_request_carries_base64_data_url() {
        let messages = image_messages("sys", b"abc", "describe");
        let value = serde_json::to_value(&messages[1]).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "describe"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,YWJj"}}
                ]
            })
        );
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"42"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("42"));
    }

    #[test]
    fn audio_uploads_are_named_after_their_format() {
        assert_eq!(audio_upload(&ResourceType::Mp3), ("audio.mp3", "audio/mpeg"));
        assert_eq!(audio_upload(&ResourceType::Wav), ("audio.wav", "audio/wav"));
        assert_eq!(audio_upload(&ResourceType::M4a), ("audio.m4a", "audio/mp4"));
    }

    #[test]
    fn endpoints_tolerate_trailing_slash() {
        let mut config = OpenAiConfig::new("key");
        config.base_url = "http://localhost:11434/v1/".into();
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");

        let whisper = WhisperTranscriber::new("https://api.groq.com/openai/v1/", "k", "m").unwrap();
        assert_eq!(
            whisper.endpoint(),
            "https://api.groq.com/openai/v1/audio/transcriptions"
        );
    }
}
