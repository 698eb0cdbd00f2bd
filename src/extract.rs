//! URL extraction: turn raw pattern matches into `DetectedUrl` records.
//!
//! Extraction runs in three steps over the original message:
//!
//! 1. Reserve the byte ranges of inline code spans and fenced code blocks.
//!    Text inside them is already escaped and never autolinked, so any match
//!    that lies entirely within a reserved range is dropped. This covers a
//!    message that was rewritten earlier and is being fed back (e.g. on edit).
//! 2. Collect embedded links, then plain links. A plain match right after `(`
//!    is the scheme of an embedded link's target and is not counted twice.
//! 3. Sort by start offset so the rewriter can walk the message front to back.

use std::ops::Range;

use log::{debug, trace};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

use crate::pattern::{LinkPatterns, MatchSpan};

/// How a link appeared in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkForm {
    /// `[text](scheme:host)`
    Embedded,
    /// Bare `scheme:host` in running text.
    PlainText,
}

/// One link found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedUrl {
    /// Scheme as written (case preserved).
    pub protocol: String,
    pub host: String,
    /// Exact text covered by `span.whole`.
    pub original_text: String,
    pub form: LinkForm,
    /// Offsets into the original message, never into a rewritten copy.
    pub span: MatchSpan,
    /// Set by the rewriter once the link has been escaped.
    pub rewritten: bool,
}

impl DetectedUrl {
    fn from_span(message: &str, span: MatchSpan, form: LinkForm) -> Self {
        Self {
            protocol: message[span.protocol.clone()].to_string(),
            host: message[span.host.clone()].to_string(),
            original_text: message[span.whole.clone()].to_string(),
            form,
            span,
            rewritten: false,
        }
    }

    pub fn is_plain_text(&self) -> bool {
        self.form == LinkForm::PlainText
    }

    pub fn start(&self) -> usize {
        self.span.whole.start
    }
}

/// Extract every embedded and plain link from `message`, ordered by position.
pub fn extract_urls(patterns: &LinkPatterns, message: &str) -> Vec<DetectedUrl> {
    let reserved = reserved_ranges(message);
    let mut urls = Vec::new();

    for span in patterns.embedded.find_spans(message) {
        if is_reserved(&reserved, &span.whole) {
            trace!("extract: skip escaped embedded link at {:?}", span.whole);
            continue;
        }
        urls.push(DetectedUrl::from_span(message, span, LinkForm::Embedded));
    }

    for span in patterns.plain.find_spans(message) {
        if message[..span.whole.start].ends_with('(') {
            continue;
        }
        if is_reserved(&reserved, &span.whole) {
            trace!("extract: skip escaped plain link at {:?}", span.whole);
            continue;
        }
        urls.push(DetectedUrl::from_span(message, span, LinkForm::PlainText));
    }

    urls.sort_by_key(DetectedUrl::start);
    debug!(
        "extract: {} url(s), {} reserved range(s) in {} bytes",
        urls.len(),
        reserved.len(),
        message.len()
    );
    urls
}

/// Byte ranges of inline code spans and fenced code blocks in `message`.
///
/// Ranges include the delimiters. Indented code blocks are not reserved:
/// chat clients commonly render a leading tab or four spaces as prose.
pub fn reserved_ranges(message: &str) -> Vec<Range<usize>> {
    if !message.contains(['`', '~']) {
        return Vec::new();
    }
    Parser::new_ext(message, Options::empty())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Code(_) | Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) => {
                Some(range)
            }
            _ => None,
        })
        .collect()
}

fn is_reserved(reserved: &[Range<usize>], span: &Range<usize>) -> bool {
    reserved
        .iter()
        .any(|r| r.start <= span.start && span.end <= r.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(message: &str) -> Vec<DetectedUrl> {
        extract_urls(&LinkPatterns::compile().unwrap(), message)
    }

    fn summary(urls: &[DetectedUrl]) -> Vec<(&str, &str, LinkForm)> {
        urls.iter()
            .map(|u| (u.protocol.as_str(), u.host.as_str(), u.form))
            .collect()
    }

    #[test]
    fn embedded_link() {
        let urls = extract("[test](https://www.github.com)");
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].original_text, "[test](https://www.github.com)");
        assert_eq!(
            summary(&urls),
            vec![("https", "www.github.com", LinkForm::Embedded)]
        );
        assert!(!urls[0].rewritten);
    }

    #[test]
    fn plain_link() {
        let urls = extract("https://www.github.com");
        assert_eq!(
            summary(&urls),
            vec![("https", "www.github.com", LinkForm::PlainText)]
        );
        assert_eq!(urls[0].original_text, "https://www.github.com");
    }

    #[test]
    fn embedded_target_is_not_counted_as_plain() {
        let urls = extract("[test](s3://host)");
        assert_eq!(summary(&urls), vec![("s3", "host", LinkForm::Embedded)]);
    }

    #[test]
    fn mixed_links_sorted_by_position() {
        let urls = extract("[test](s3://www.github.com) https://www.github.com");
        assert_eq!(
            summary(&urls),
            vec![
                ("s3", "www.github.com", LinkForm::Embedded),
                ("https", "www.github.com", LinkForm::PlainText),
            ]
        );
    }

    #[test]
    fn plain_before_embedded_keeps_message_order() {
        let urls = extract("tel:123456 [test](tel://999)");
        assert_eq!(
            summary(&urls),
            vec![
                ("tel", "123456", LinkForm::PlainText),
                ("tel", "999", LinkForm::Embedded),
            ]
        );
        assert!(urls[0].start() < urls[1].start());
    }

    #[test]
    fn mailto_embedded_link() {
        let urls = extract("[plugin@example.com](mailto:plugin@example.com)");
        assert_eq!(
            summary(&urls),
            vec![("mailto", "plugin@example.com", LinkForm::Embedded)]
        );
    }

    #[test]
    fn tel_plain_link() {
        let urls = extract("tel://999999999");
        assert_eq!(
            summary(&urls),
            vec![("tel", "999999999", LinkForm::PlainText)]
        );
    }

    #[test]
    fn no_links() {
        assert!(extract("just some words: nothing to see").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn spans_point_into_original_message() {
        let message = "call tel:1 or [x](ftp://y)";
        for url in extract(message) {
            assert_eq!(&message[url.span.whole.clone()], url.original_text);
            assert_eq!(&message[url.span.protocol.clone()], url.protocol);
            assert_eq!(&message[url.span.host.clone()], url.host);
        }
    }

    #[test]
    fn escaped_link_is_not_extracted() {
        assert!(extract("`tel:123456`").is_empty());
        assert!(extract("`tel://999999999`").is_empty());
    }

    #[test]
    fn escaped_span_inside_longer_message() {
        let urls = extract("see `tel:123` please call tel:456");
        assert_eq!(summary(&urls), vec![("tel", "456", LinkForm::PlainText)]);
    }

    #[test]
    fn several_escaped_spans() {
        assert!(extract("`tel:123456` `tel:789012` `tel:123456`").is_empty());
    }

    #[test]
    fn lone_delimiter_reserves_nothing() {
        assert!(reserved_ranges("`tel:123").is_empty());
        assert!(reserved_ranges("tel:123`").is_empty());
    }

    #[test]
    fn fenced_block_is_reserved() {
        let message = "look:\n```\ns3://bucket\n```\nftp://x";
        let urls = extract(message);
        assert_eq!(summary(&urls), vec![("ftp", "x", LinkForm::PlainText)]);
    }

    #[test]
    fn reserved_ranges_include_delimiters() {
        let message = "a `b` c";
        assert_eq!(reserved_ranges(message), vec![2..5]);
        assert!(reserved_ranges("no code here").is_empty());
    }
}
