//! # contract: interfaces to the collaborators of the context pipeline
//!
//! The pipeline never talks to HTTP or a model provider directly. Every
//! external effect goes through one of the traits below, so the core can be
//! driven by the reqwest-backed clients in [`crate::providers`] in production
//! and by `mockall` mocks in tests.
//!
//! ## Collaborators
//! - [`ContentFetcher`]: downloads raw bytes for a URL (non-2xx is an error).
//! - [`Transcriber`]: turns audio bytes into text.
//! - [`ImageDescriber`]: asks a vision model to describe an image.
//! - [`Completer`]: plain text completion, consumes the assembled context.
//! - [`KeyValueStore`]: cache seam used by the attachment resolver.
//!
//! ## Errors
//! Each collaborator has its own error type. [`PipelineError`] aggregates them
//! for the document pass; none of them are retried.
//!
//! ## Mocking & Testing
//! The traits are annotated for `mockall`; enable the `test-export-mocks`
//! feature (on by default) to use the generated mocks from integration tests.

use std::path::PathBuf;

use async_trait::async_trait;
use mockall::automock;

use crate::markdown::ResourceType;

/// A markdown link token that could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("incorrect markdown link {0}")]
    MalformedLink(String),
}

/// Failure of the content fetch collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },
    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("error occurred when trying to transcribe the audio file: {0}")]
    Provider(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("image description failed: {0}")]
    Provider(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Provider(String),
    #[error("completion response contained no message content")]
    EmptyResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything that can abort a document pass.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid boundary pattern: {0}")]
    Chunk(#[from] regex::Error),
    #[error(transparent)]
    Link(#[from] ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
    #[error(transparent)]
    Describe(#[from] DescribeError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("html conversion failed: {0}")]
    Conversion(String),
}

/// Downloads the raw bytes behind a URL.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url`, failing on transport errors and non-2xx statuses.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Speech-to-text collaborator.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// `format` is the resource type of the link the audio came from.
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &ResourceType,
    ) -> Result<String, TranscriptionError>;
}

/// Vision collaborator: a completion call with an image attached to the user turn.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe_image(
        &self,
        system_prompt: &str,
        image: &[u8],
        user_prompt: &str,
    ) -> Result<String, DescribeError>;
}

/// Text completion collaborator (system + user turn, one answer).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError>;
}

/// Minimal string key-value store. No invalidation or expiry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait KeyValueStore: Send + Sync {
    /// Returns `None` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn save(&self, key: &str, value: &str) -> Result<(), CacheError>;
}
