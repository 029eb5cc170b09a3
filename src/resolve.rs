//! Attachment resolution: replace link placeholders with model-derived text.
//!
//! For every placeholder of a section the original token is parsed, relative
//! URLs are joined to the base URL, and the link is dispatched on its
//! [`AttachmentKind`]:
//! - images are fetched and described by the vision collaborator,
//! - audio is fetched and transcribed,
//! - pages and unknown types are not fetched; the original token is put back.
//!
//! Links inside one section are handled one after another. Sections are
//! resolved concurrently and come back in their original order. The first
//! error aborts the whole pass.

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use crate::contract::{
    ContentFetcher, ImageDescriber, KeyValueStore, PipelineError, Transcriber,
};
use crate::markdown::{AttachmentKind, MarkdownLink};
use crate::sections::Section;

pub const IMAGE_SYSTEM_PROMPT: &str = "You describe images that are embedded in a scientific \
article. Describe what the image shows as precisely as possible: objects, people, places, \
visible text and anything that could identify where or when it was taken. Answer in plain \
prose, without any preamble.";

/// Wrap resolved text in the attachment delimiter.
pub fn wrap_attachment(url: &str, content: &str) -> String {
    format!("<attachment url=\"{url}\">\n{content}\n</attachment>")
}

fn image_user_prompt(link: &MarkdownLink) -> String {
    if link.text.trim().is_empty() {
        "Describe this image.".to_owned()
    } else {
        format!(
            "Describe this image. Its caption in the article is: {}",
            link.text
        )
    }
}

pub struct AttachmentResolver<'a> {
    fetcher: &'a dyn ContentFetcher,
    transcriber: &'a dyn Transcriber,
    describer: &'a dyn ImageDescriber,
    cache: Option<&'a dyn KeyValueStore>,
    base_url: String,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(
        fetcher: &'a dyn ContentFetcher,
        transcriber: &'a dyn Transcriber,
        describer: &'a dyn ImageDescriber,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            transcriber,
            describer,
            cache: None,
            base_url: base_url.into(),
        }
    }

    /// Look up and store descriptions by resolved URL.
    pub fn with_cache(mut self, cache: &'a dyn KeyValueStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve all sections concurrently, keeping their order.
    pub async fn resolve_all(&self, sections: Vec<Section>) -> Result<Vec<Section>, PipelineError> {
        let total = sections.len();
        let resolved = try_join_all(sections.into_iter().map(|mut section| async move {
            self.resolve_section(&mut section).await?;
            Ok::<_, PipelineError>(section)
        }))
        .await?;
        info!(sections = total, "Resolved attachments for all sections");
        Ok(resolved)
    }

    /// Replace every placeholder of `section`, in placeholder order.
    pub async fn resolve_section(&self, section: &mut Section) -> Result<(), PipelineError> {
        let links: Vec<(usize, String)> = section
            .links
            .iter()
            .map(|(&index, token)| (index, token.clone()))
            .collect();
        for (index, token) in links {
            let replacement = self.resolve_link(&token).await?;
            section.fill(index, &replacement);
        }
        Ok(())
    }

    /// Produce the text that replaces `token` in its section.
    pub async fn resolve_link(&self, token: &str) -> Result<String, PipelineError> {
        let link = MarkdownLink::parse(token).map_err(|e| {
            error!(error = %e, token, "Failed to parse markdown link");
            e
        })?;
        let link = link.resolve_against(&self.base_url);
        let kind = link.resource_type.attachment_kind();

        match kind {
            AttachmentKind::Page => {
                debug!(url = %link.url, "Leaving page link unresolved");
                return Ok(token.to_owned());
            }
            AttachmentKind::Unknown => {
                warn!(
                    url = %link.url,
                    resource_type = %link.resource_type,
                    "No resolver for resource type, keeping original link"
                );
                return Ok(token.to_owned());
            }
            AttachmentKind::Image | AttachmentKind::Audio => {}
        }

        if let Some(cache) = self.cache {
            if let Some(cached) = cache.get(&link.url)? {
                debug!(url = %link.url, "Using cached attachment description");
                return Ok(wrap_attachment(&link.url, &cached));
            }
        }

        info!(url = %link.url, resource_type = %link.resource_type, "Fetching attachment");
        let bytes = self.fetcher.fetch(&link.url).await.map_err(|e| {
            error!(error = %e, url = %link.url, "Failed to fetch attachment");
            e
        })?;
        debug!(url = %link.url, size = bytes.len(), "Fetched attachment");

        let description = if kind == AttachmentKind::Audio {
            self.transcriber
                .transcribe(&bytes, &link.resource_type)
                .await
                .map_err(|e| {
                    error!(error = %e, url = %link.url, "Failed to transcribe audio attachment");
                    PipelineError::from(e)
                })?
        } else {
            self.describer
                .describe_image(IMAGE_SYSTEM_PROMPT, &bytes, &image_user_prompt(&link))
                .await
                .map_err(|e| {
                    error!(error = %e, url = %link.url, "Failed to describe image attachment");
                    PipelineError::from(e)
                })?
        };
        info!(url = %link.url, chars = description.len(), "Resolved attachment");

        if let Some(cache) = self.cache {
            cache.save(&link.url, &description)?;
        }
        Ok(wrap_attachment(&link.url, &description))
    }
}
