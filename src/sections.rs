//! Regrouping of split paragraphs into titled sections, and per-section link
//! extraction.
//!
//! The upstream split leaves each section's title at the *end* of the
//! previous paragraph, separated by a blank line. [`build_sections`] folds
//! over the paragraphs carrying that trailing title forward.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

const BLANK_LINE: &str = "\n\n";
// The URL group may hold one level of balanced parentheses: `i/photo_(1).png`.
const LINK_PATTERN: &str = r"!?\[[^\]\n]*\]\((?:[^()\n]|\([^()\n]*\))*\)";

/// Fold state: the title found at the end of the previous paragraph.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TitleCarry {
    next_title: String,
}

impl TitleCarry {
    /// One fold step: consume a paragraph, emit the finished section text
    /// (if any) and the carry for the next paragraph.
    ///
    /// Only the chunk after the *last* blank line is taken as the title;
    /// anything before it stays in the body.
    pub fn step(self, paragraph: &str) -> (TitleCarry, Option<String>) {
        let mut section = String::new();
        if !self.next_title.is_empty() {
            section.push_str(&self.next_title);
            section.push_str(BLANK_LINE);
        }

        let (body, next_title) = match paragraph.rsplit_once(BLANK_LINE) {
            Some((body, title)) => (body, title),
            None => (paragraph, ""),
        };
        section.push_str(body);

        let emitted = (!section.trim().is_empty()).then_some(section);
        (
            TitleCarry {
                next_title: next_title.to_owned(),
            },
            emitted,
        )
    }

    pub fn pending_title(&self) -> &str {
        &self.next_title
    }
}

/// Turn ordered paragraphs into titled sections.
///
/// A title left over after the last paragraph is appended to the last
/// section. Sections that end up empty are dropped.
pub fn build_sections<S: AsRef<str>>(paragraphs: &[S]) -> Vec<String> {
    let (carry, mut sections) = paragraphs.iter().fold(
        (TitleCarry::default(), Vec::new()),
        |(carry, mut sections), paragraph| {
            let (carry, emitted) = carry.step(paragraph.as_ref());
            sections.extend(emitted);
            (carry, sections)
        },
    );

    let trailing = carry.pending_title();
    if !trailing.trim().is_empty() {
        match sections.last_mut() {
            Some(last) => {
                last.push_str(BLANK_LINE);
                last.push_str(trailing);
            }
            None => sections.push(trailing.to_owned()),
        }
    }

    debug!(
        paragraphs = paragraphs.len(),
        sections = sections.len(),
        "Built titled sections"
    );
    sections
}

fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(LINK_PATTERN).expect("link pattern is a valid regex"))
}

/// Placeholder token for the `index`-th link of a section.
pub fn placeholder(index: usize) -> String {
    format!("$link_{index}$")
}

/// A section body with its markdown links swapped out for placeholders.
///
/// Each placeholder's byte span in `body` is recorded when the section is
/// built, so filling never searches the text: a literal `$link_0$` in the
/// source, or inside resolved content, is never mistaken for a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub body: String,
    /// Placeholder index -> original link token.
    pub links: BTreeMap<usize, String>,
    slots: BTreeMap<usize, Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    span: Range<usize>,
    filled: bool,
}

impl Section {
    /// Wrap a body that already contains placeholders. Each placeholder's
    /// span is its first occurrence after the previous one.
    pub fn new(body: impl Into<String>, links: BTreeMap<usize, String>) -> Self {
        let body = body.into();
        let mut slots = BTreeMap::new();
        let mut from = 0;
        for &index in links.keys() {
            let token = placeholder(index);
            if let Some(offset) = body[from..].find(&token) {
                let start = from + offset;
                from = start + token.len();
                slots.insert(
                    index,
                    Slot {
                        span: start..from,
                        filled: false,
                    },
                );
            }
        }
        Self { body, links, slots }
    }

    /// Replace every link/image token in `text` with its own placeholder.
    /// Repeated tokens get distinct placeholders.
    pub fn from_text(text: &str) -> Self {
        let mut body = String::with_capacity(text.len());
        let mut links = BTreeMap::new();
        let mut slots = BTreeMap::new();
        let mut last = 0;
        for found in link_regex().find_iter(text) {
            body.push_str(&text[last..found.start()]);
            let index = links.len();
            let start = body.len();
            body.push_str(&placeholder(index));
            links.insert(index, found.as_str().to_owned());
            slots.insert(
                index,
                Slot {
                    span: start..body.len(),
                    filled: false,
                },
            );
            last = found.end();
        }
        body.push_str(&text[last..]);
        Self { body, links, slots }
    }

    /// Substitute the placeholder for `index` at its recorded span. Filling
    /// the same index twice is a no-op.
    pub fn fill(&mut self, index: usize, content: &str) {
        let Some(slot) = self.slots.get(&index) else {
            return;
        };
        if slot.filled {
            return;
        }
        let span = slot.span.clone();
        if self.body.get(span.clone()) != Some(placeholder(index).as_str()) {
            warn!(index, "Section body changed under its placeholder, not filling");
            return;
        }

        self.body.replace_range(span.clone(), content);
        let new_end = span.start + content.len();
        for other in self.slots.values_mut() {
            if other.span.start >= span.end {
                other.span = (other.span.start + new_end - span.end)
                    ..(other.span.end + new_end - span.end);
            }
        }
        if let Some(slot) = self.slots.get_mut(&index) {
            slot.span = span.start..new_end;
            slot.filled = true;
        }
    }

    /// True when every placeholder of this section has been filled.
    pub fn is_resolved(&self) -> bool {
        self.slots.values().all(|slot| slot.filled)
    }
}

/// Join section bodies with blank lines, in order.
pub fn full_context(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|section| section.body.as_str())
        .collect::<Vec<_>>()
        .join(BLANK_LINE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_titles_forward() {
        let sections = build_sections(&["Intro text\n\nTITLE1", "Body1\n\nTITLE2", "Body2"]);
        assert_eq!(
            sections,
            vec!["Intro text", "TITLE1\n\nBody1", "TITLE2\n\nBody2"]
        );
    }

    #[test]
    fn trailing_title_is_appended_to_last_section() {
        let sections = build_sections(&["Intro\n\nT1", "Body1\n\nEND"]);
        assert_eq!(sections, vec!["Intro", "T1\n\nBody1\n\nEND"]);
    }

    #[test]
    fn lone_title_becomes_a_section() {
        let sections = build_sections(&["\n\nONLY"]);
        assert_eq!(sections, vec!["ONLY"]);
    }

    #[test]
    fn empty_sections_are_dropped() {
        let sections = build_sections(&["", "  ", "Body"]);
        assert_eq!(sections, vec!["Body"]);
    }

    #[test]
    fn middle_chunks_stay_in_the_body() {
        let sections = build_sections(&["a\n\nb\n\nTITLE", "next"]);
        assert_eq!(sections, vec!["a\n\nb", "TITLE\n\nnext"]);
    }

    #[test]
    fn fold_step_emits_and_carries() {
        let (carry, emitted) = TitleCarry::default().step("Intro\n\nTITLE");
        assert_eq!(emitted.as_deref(), Some("Intro"));
        assert_eq!(carry.pending_title(), "TITLE");

        let (carry, emitted) = carry.step("Body");
        assert_eq!(emitted.as_deref(), Some("TITLE\n\nBody"));
        assert_eq!(carry.pending_title(), "");
    }

    #[test]
    fn links_are_swapped_for_unique_placeholders() {
        let section = Section::from_text(
            "See ![fig](i/a.png) and [rec](i/b.mp3), again ![fig](i/a.png).",
        );
        assert_eq!(section.body, "See $link_0$ and $link_1$, again $link_2$.");
        assert_eq!(section.links.len(), 3);
        assert_eq!(section.links[&0], "![fig](i/a.png)");
        assert_eq!(section.links[&1], "[rec](i/b.mp3)");
        assert_eq!(section.links[&2], "![fig](i/a.png)");
        assert!(!section.is_resolved());
    }

    #[test]
    fn fill_replaces_only_its_placeholder() {
        let mut section = Section::from_text(
            "[a](1.png) [b](2.png) [c](3.png) [d](4.png) [e](5.png) \
             [f](6.png) [g](7.png) [h](8.png) [i](9.png) [j](10.png) [k](11.png)",
        );
        section.fill(1, "ONE");
        assert!(section.body.contains("$link_10$"));
        assert!(section.body.contains(" ONE "));
        for index in section.links.keys().copied().collect::<Vec<_>>() {
            section.fill(index, "x");
        }
        assert!(section.is_resolved());
    }

    #[test]
    fn literal_placeholder_text_is_left_alone() {
        let mut section = Section::from_text("Template var $link_0$ then ![a](i/a.png)");
        assert_eq!(section.body, "Template var $link_0$ then $link_0$");
        assert_eq!(section.links[&0], "![a](i/a.png)");

        section.fill(0, "<attachment>");
        assert_eq!(section.body, "Template var $link_0$ then <attachment>");
        assert!(section.is_resolved());
    }

    #[test]
    fn filled_content_is_not_rescanned() {
        let mut section = Section::from_text("[a](1.png) and [b](2.png)");
        section.fill(0, "mentions $link_1$ itself");
        section.fill(1, "B");
        assert_eq!(section.body, "mentions $link_1$ itself and B");
        assert!(section.is_resolved());
    }

    #[test]
    fn urls_may_contain_balanced_parentheses() {
        let section = Section::from_text("Intro ![fig](i/photo_(1).png) end");
        assert_eq!(section.body, "Intro $link_0$ end");
        assert_eq!(section.links[&0], "![fig](i/photo_(1).png)");
    }

    #[test]
    fn text_without_links_has_no_placeholders() {
        let section = Section::from_text("plain paragraph");
        assert_eq!(section.body, "plain paragraph");
        assert!(section.links.is_empty());
        assert!(section.is_resolved());
    }

    #[test]
    fn full_context_joins_with_blank_lines() {
        let sections = vec![Section::from_text("one"), Section::from_text("two")];
        assert_eq!(full_context(&sections), "one\n\ntwo");
    }
}
