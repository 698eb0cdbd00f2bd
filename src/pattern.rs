//! Link patterns: markdown embedded links and bare scheme-prefixed links.
//!
//! Both patterns report byte ranges for the whole match and for each named
//! group, so callers can slice the original message without re-scanning.
//! Groups are looked up by name; `LinkPatterns::compile` refuses a pattern
//! that lacks one of the names the extractor relies on.

use std::ops::Range;

use anyhow::{Context, Result, bail};
use regex::{Captures, Regex};

/// `[text](scheme:host)`, with an optional `//` after the colon.
///
/// - Display text is non-greedy and may be empty.
/// - Host stops at whitespace and the closing `)`.
pub const EMBEDDED_LINK_PATTERN: &str =
    r"\[(?P<text>.*?)\]\((?P<protocol>[A-Za-z0-9_]+):(?://)?(?P<host>[^\s)]+)\)";

/// Bare `scheme:host` or `scheme://host`.
///
/// Host is greedy up to whitespace, `)`, `,` or a backtick, so prose commas
/// and code-span delimiters stay outside the match while characters such as
/// `+` in `tel:+123` are kept.
pub const PLAIN_LINK_PATTERN: &str =
    r"(?P<protocol>[A-Za-z0-9_]+):(?://)?(?P<host>[^\s),`]+)";

const EMBEDDED_GROUPS: &[&str] = &["text", "protocol", "host"];
const PLAIN_GROUPS: &[&str] = &["protocol", "host"];

/// Byte ranges of one pattern match within the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub whole: Range<usize>,
    pub protocol: Range<usize>,
    pub host: Range<usize>,
    /// Display text. Only embedded links carry one.
    pub text: Option<Range<usize>>,
}

/// A compiled link pattern whose required capture names have been verified.
#[derive(Debug, Clone)]
pub struct LinkPattern {
    regex: Regex,
}

impl LinkPattern {
    fn compile(pattern: &str, required: &[&str]) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("failed to compile link pattern {pattern:?}"))?;
        for group in required {
            if !regex.capture_names().flatten().any(|name| name == *group) {
                bail!("link pattern {pattern:?} has no capture group named '{group}'");
            }
        }
        Ok(Self { regex })
    }

    /// All non-overlapping matches in `text`, leftmost first.
    pub fn find_spans<'a>(&'a self, text: &'a str) -> impl Iterator<Item = MatchSpan> + 'a {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| span_of(&caps))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

fn span_of(caps: &Captures<'_>) -> Option<MatchSpan> {
    Some(MatchSpan {
        whole: caps.get(0)?.range(),
        protocol: caps.name("protocol")?.range(),
        host: caps.name("host")?.range(),
        text: caps.name("text").map(|m| m.range()),
    })
}

/// The embedded/plain pattern pair used by the extractor.
///
/// The patterns are constants; compiling them is the startup self-test.
#[derive(Debug, Clone)]
pub struct LinkPatterns {
    pub embedded: LinkPattern,
    pub plain: LinkPattern,
}

impl LinkPatterns {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            embedded: LinkPattern::compile(EMBEDDED_LINK_PATTERN, EMBEDDED_GROUPS)?,
            plain: LinkPattern::compile(PLAIN_LINK_PATTERN, PLAIN_GROUPS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> LinkPatterns {
        LinkPatterns::compile().unwrap()
    }

    /// Slice each group of the first match for readable assertions.
    fn first_groups<'a>(
        pattern: &LinkPattern,
        text: &'a str,
    ) -> Option<(&'a str, Option<&'a str>, &'a str, &'a str)> {
        let span = pattern.find_spans(text).next()?;
        Some((
            &text[span.whole.clone()],
            span.text.clone().map(|r| &text[r]),
            &text[span.protocol.clone()],
            &text[span.host.clone()],
        ))
    }

    #[test]
    fn embedded_https() {
        let p = patterns();
        let groups = first_groups(&p.embedded, "[test](https://www.github.com)");
        assert_eq!(
            groups,
            Some((
                "[test](https://www.github.com)",
                Some("test"),
                "https",
                "www.github.com"
            ))
        );
    }

    #[test]
    fn embedded_s3() {
        let p = patterns();
        let (_, text, protocol, host) =
            first_groups(&p.embedded, "[test](s3://bucket.name)").unwrap();
        assert_eq!(text, Some("test"));
        assert_eq!(protocol, "s3");
        assert_eq!(host, "bucket.name");
    }

    #[test]
    fn embedded_without_slashes() {
        let p = patterns();
        let (_, _, protocol, host) =
            first_groups(&p.embedded, "[+999999999](tel:+999999999)").unwrap();
        assert_eq!(protocol, "tel");
        assert_eq!(host, "+999999999");
    }

    #[test]
    fn embedded_empty_display_text() {
        let p = patterns();
        let (_, text, protocol, _) = first_groups(&p.embedded, "[](ftp://x)").unwrap();
        assert_eq!(text, Some(""));
        assert_eq!(protocol, "ftp");
    }

    #[test]
    fn embedded_display_text_is_non_greedy() {
        let p = patterns();
        let spans: Vec<_> = p
            .embedded
            .find_spans("[a](http://x) and [b](s3://y)")
            .collect();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].whole, 0..13);
        assert_eq!(spans[1].text, Some(19..20));
    }

    #[test]
    fn embedded_host_stops_at_whitespace() {
        let p = patterns();
        assert!(p.embedded.find_spans("[a](http://x y)").next().is_none());
    }

    #[test]
    fn plain_https() {
        let p = patterns();
        let (whole, text, protocol, host) =
            first_groups(&p.plain, "https://www.github.com").unwrap();
        assert_eq!(whole, "https://www.github.com");
        assert_eq!(text, None);
        assert_eq!(protocol, "https");
        assert_eq!(host, "www.github.com");
    }

    #[test]
    fn plain_tel_without_slashes() {
        let p = patterns();
        let (_, _, protocol, host) = first_groups(&p.plain, "tel:999999999").unwrap();
        assert_eq!(protocol, "tel");
        assert_eq!(host, "999999999");
    }

    #[test]
    fn plain_mailto() {
        let p = patterns();
        let (_, _, protocol, host) = first_groups(&p.plain, "mailto:user@example.com").unwrap();
        assert_eq!(protocol, "mailto");
        assert_eq!(host, "user@example.com");
    }

    #[test]
    fn plain_host_excludes_comma_and_backtick() {
        let p = patterns();
        let (whole, ..) = first_groups(&p.plain, "ftp://a.example, next").unwrap();
        assert_eq!(whole, "ftp://a.example");
        let (whole, ..) = first_groups(&p.plain, "`tel:123`").unwrap();
        assert_eq!(whole, "tel:123");
    }

    #[test]
    fn colon_followed_by_space_is_not_a_link() {
        let p = patterns();
        assert!(p.plain.find_spans("this is a link: or not").next().is_none());
    }

    #[test]
    fn spans_are_absolute_byte_offsets() {
        let p = patterns();
        let text = "電話 tel:123";
        let span = p.plain.find_spans(text).next().unwrap();
        assert_eq!(&text[span.whole.clone()], "tel:123");
        assert_eq!(span.whole.start, "電話 ".len());
    }

    #[test]
    fn missing_group_is_rejected() {
        let err = LinkPattern::compile(r"(?P<scheme>\w+):", PLAIN_GROUPS).unwrap_err();
        assert!(err.to_string().contains("protocol"), "{err}");
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        assert!(LinkPattern::compile(r"(?P<protocol>\w+", PLAIN_GROUPS).is_err());
    }
}
