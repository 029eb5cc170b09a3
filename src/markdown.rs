//! Parsing of single markdown link / image tokens.
//!
//! A token is `[text](url)` or `![text](url)`. The parsed [`MarkdownLink`]
//! carries the inferred [`ResourceType`] of the URL, which the attachment
//! resolver uses to decide whether (and how) to turn the link into text.

use std::fmt;

use crate::contract::ParseError;

/// Content kind inferred from the file extension of a link's URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceType {
    Html,
    Png,
    Jpg,
    Jpeg,
    Gif,
    Webp,
    Mp3,
    Wav,
    M4a,
    /// Any other extension, exactly as it appeared in the URL.
    Other(String),
}

/// What the resolver does with a link, derived from its [`ResourceType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Page,
    Image,
    Audio,
    Unknown,
}

impl ResourceType {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "html" | "htm" => ResourceType::Html,
            "png" => ResourceType::Png,
            "jpg" => ResourceType::Jpg,
            "jpeg" => ResourceType::Jpeg,
            "gif" => ResourceType::Gif,
            "webp" => ResourceType::Webp,
            "mp3" => ResourceType::Mp3,
            "wav" => ResourceType::Wav,
            "m4a" => ResourceType::M4a,
            other => ResourceType::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Html => "html",
            ResourceType::Png => "png",
            ResourceType::Jpg => "jpg",
            ResourceType::Jpeg => "jpeg",
            ResourceType::Gif => "gif",
            ResourceType::Webp => "webp",
            ResourceType::Mp3 => "mp3",
            ResourceType::Wav => "wav",
            ResourceType::M4a => "m4a",
            ResourceType::Other(ext) => ext,
        }
    }

    pub fn attachment_kind(&self) -> AttachmentKind {
        match self {
            ResourceType::Html => AttachmentKind::Page,
            ResourceType::Png
            | ResourceType::Jpg
            | ResourceType::Jpeg
            | ResourceType::Gif
            | ResourceType::Webp => AttachmentKind::Image,
            ResourceType::Mp3 | ResourceType::Wav | ResourceType::M4a => AttachmentKind::Audio,
            ResourceType::Other(_) => AttachmentKind::Unknown,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed markdown link or image token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    pub text: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub is_image_link: bool,
}

impl MarkdownLink {
    /// Parse `[text](url)` / `![text](url)`.
    ///
    /// The text runs from the first `[` to the `]` that balances it, the URL
    /// from the first `(` after that to the `)` that balances it. Anything
    /// after the closing `)` is ignored. Either group missing or unbalanced
    /// is a [`ParseError::MalformedLink`].
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        let malformed = || ParseError::MalformedLink(token.to_owned());

        let text_open = token.find('[').ok_or_else(malformed)?;
        let text_close = matching_close(token, text_open, '[', ']').ok_or_else(malformed)?;
        let rest = &token[text_close + 1..];
        let url_open = rest.find('(').ok_or_else(malformed)?;
        let url_close = matching_close(rest, url_open, '(', ')').ok_or_else(malformed)?;

        Ok(Self::from_parts(
            &token[text_open + 1..text_close],
            &rest[url_open + 1..url_close],
            token.starts_with('!'),
        ))
    }

    fn from_parts(text: &str, url: &str, is_image_link: bool) -> Self {
        Self {
            text: text.to_owned(),
            url: url.to_owned(),
            resource_type: resource_type_of(url),
            is_image_link,
        }
    }

    /// True when the URL does not start with `http`/`https`.
    pub fn is_relative(&self) -> bool {
        !self.url.starts_with("http")
    }

    /// Prefix a relative URL with `base_url`. Absolute links are returned unchanged.
    pub fn resolve_against(&self, base_url: &str) -> Self {
        if !self.is_relative() {
            return self.clone();
        }
        let path = self.url.trim_start_matches("./").trim_start_matches('/');
        let url = format!("{}/{}", base_url.trim_end_matches('/'), path);
        Self::from_parts(&self.text, &url, self.is_image_link)
    }

    /// Render the link back into markdown syntax.
    pub fn to_token(&self) -> String {
        let bang = if self.is_image_link { "!" } else { "" };
        format!("{bang}[{}]({})", self.text, self.url)
    }
}

/// Byte offset of the `close` that balances the `open` at `open_at`.
fn matching_close(s: &str, open_at: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s[open_at..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(open_at + i);
            }
        }
    }
    None
}

/// Infer the resource type from the URL path.
///
/// Absolute URLs: a bare domain is a page. Otherwise the last path segment
/// decides: no `.` means a page, else the text after the final `.`.
fn resource_type_of(url: &str) -> ResourceType {
    let (has_domain, path) = match url.split_once("://") {
        Some((_, rest)) => (true, rest),
        None => (false, url),
    };
    let segments: Vec<&str> = path.split('/').collect();
    if has_domain && segments.len() == 1 {
        return ResourceType::Html;
    }
    match segments.last().and_then(|last| last.rsplit_once('.')) {
        Some((_, ext)) => ResourceType::from_extension(ext),
        None => ResourceType::Html,
    }
}
