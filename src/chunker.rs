use regex::Regex;
use tracing::debug;

/// Splits raw document text into paragraphs on a regular-expression boundary.
pub struct StringChunker<'a> {
    text: &'a str,
}

impl<'a> StringChunker<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    /// Split on every match of `pattern`. Separators are dropped and
    /// whitespace is left untouched.
    pub fn chunk_by_regex(&self, pattern: &str) -> Result<Vec<String>, regex::Error> {
        let boundary = Regex::new(pattern)?;
        let paragraphs: Vec<String> = boundary.split(self.text).map(str::to_owned).collect();
        debug!(
            pattern,
            text_len = self.text.len(),
            paragraphs = paragraphs.len(),
            "Chunked document text"
        );
        Ok(paragraphs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_horizontal_rules() {
        let chunks = StringChunker::new("A\n---\nB\n---\nC")
            .chunk_by_regex(r"\n[-=]+\n")
            .unwrap();
        assert_eq!(chunks, vec!["A", "B", "C"]);
    }

    #[test]
    fn keeps_whitespace_inside_paragraphs() {
        let chunks = StringChunker::new("  one\n\ntwo \n===\n\tthree")
            .chunk_by_regex(r"\n[-=]+\n")
            .unwrap();
        assert_eq!(chunks, vec!["  one\n\ntwo ", "\tthree"]);
    }

    #[test]
    fn text_without_boundary_is_a_single_paragraph() {
        let chunks = StringChunker::new("just text").chunk_by_regex(r"\n-+\n").unwrap();
        assert_eq!(chunks, vec!["just text"]);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = StringChunker::new("text").chunk_by_regex(r"(unclosed").unwrap_err();
        assert!(matches!(err, regex::Error::Syntax(_)));
    }
}
