//! High-level pipeline: raw document text → `full_context`.
//!
//! ```text
//! text ─ StringChunker ─ build_sections ─ Section::from_text ─ AttachmentResolver ─ full_context
//! ```
//!
//! # Error Handling
//! Every stage fails fast: an invalid boundary pattern, a malformed link, or
//! any collaborator error aborts the document and is returned to the caller.

use futures::future::try_join_all;
use tracing::{debug, error, info};

use crate::chunker::StringChunker;
use crate::contract::{ContentFetcher, PipelineError};
use crate::resolve::AttachmentResolver;
use crate::sections::{build_sections, full_context, Section};

/// Splits documents on horizontal rules (`---` / `===` lines).
pub const DEFAULT_BOUNDARY: &str = r"\n[-=]+\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Regex separating paragraphs.
    pub boundary: String,
    /// Prefix for relative link URLs.
    pub base_url: String,
}

impl PipelineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            boundary: DEFAULT_BOUNDARY.to_owned(),
            base_url: base_url.into(),
        }
    }
}

/// Chunk `text`, regroup into titled sections and extract their links.
pub fn split_sections(text: &str, boundary: &str) -> Result<Vec<Section>, PipelineError> {
    let paragraphs = StringChunker::new(text)
        .chunk_by_regex(boundary)
        .map_err(|e| {
            error!(error = %e, boundary, "Invalid paragraph boundary pattern");
            e
        })?;
    let sections: Vec<Section> = build_sections(paragraphs.as_slice())
        .iter()
        .map(|text| Section::from_text(text))
        .collect();
    debug!(
        sections = sections.len(),
        links = sections.iter().map(|s| s.links.len()).sum::<usize>(),
        "Extracted links from sections"
    );
    Ok(sections)
}

/// Run the whole pipeline for one document.
pub async fn build_full_context(
    text: &str,
    config: &PipelineConfig,
    resolver: &AttachmentResolver<'_>,
) -> Result<String, PipelineError> {
    info!(text_len = text.len(), base_url = %config.base_url, "Building full context");
    let sections = split_sections(text, &config.boundary)?;
    let resolved = resolver.resolve_all(sections).await?;
    let context = full_context(&resolved);
    info!(context_len = context.len(), sections = resolved.len(), "Full context assembled");
    Ok(context)
}

/// Build contexts for several documents concurrently. Results follow input order.
pub async fn build_full_contexts<S: AsRef<str>>(
    documents: &[S],
    config: &PipelineConfig,
    resolver: &AttachmentResolver<'_>,
) -> Result<Vec<String>, PipelineError> {
    try_join_all(
        documents
            .iter()
            .map(|document| build_full_context(document.as_ref(), config, resolver)),
    )
    .await
}

/// Convert an HTML page to markdown so its images and links become markdown tokens.
pub fn html_to_markdown(html: &str) -> Result<String, PipelineError> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg"])
        .build();
    let markdown = converter
        .convert(html)
        .map_err(|e| PipelineError::Conversion(e.to_string()))?;
    debug!(html_len = html.len(), markdown_len = markdown.len(), "Converted HTML to markdown");
    Ok(markdown)
}

fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start();
    let prefix: String = head.chars().take(64).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("<!doctype html") || prefix.starts_with("<html")
}

/// Fetch a document and return it as markdown text.
///
/// HTML documents are converted; anything else is decoded as (lossy) UTF-8.
pub async fn load_document(
    fetcher: &dyn ContentFetcher,
    url: &str,
) -> Result<String, PipelineError> {
    info!(url, "Fetching document");
    let bytes = fetcher.fetch(url).await.map_err(|e| {
        error!(error = %e, url, "Failed to fetch document");
        e
    })?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if looks_like_html(&text) {
        html_to_markdown(&text)
    } else {
        Ok(text)
    }
}
