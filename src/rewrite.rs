//! Escape rewrite-listed plain links so chat clients stop autolinking them.
//!
//! The output is assembled in a fresh buffer: copy the untouched text up to
//! the next qualifying link, append the link wrapped in `ESCAPE_DELIMITER`,
//! advance the cursor past it. Link spans therefore stay relative to the
//! original message and no offset bookkeeping is needed.

use std::borrow::Cow;
use std::ops::Range;

use log::{debug, trace};

use crate::extract::DetectedUrl;

/// Wraps an escaped link on both sides (a markdown inline code span).
pub const ESCAPE_DELIMITER: char = '`';

/// Whether `url` would be escaped under `rewrite_protocols`.
///
/// Protocol membership is case-sensitive: `TEL:1` is not rewritten by `tel`.
pub fn is_rewrite_candidate(url: &DetectedUrl, rewrite_protocols: &[String]) -> bool {
    url.is_plain_text() && !url.rewritten && rewrite_protocols.iter().any(|p| *p == url.protocol)
}

/// Whether `span` already touches an `ESCAPE_DELIMITER` on either side.
///
/// Balanced code spans never reach the rewriter; this catches the lone
/// delimiter left at one end (`` `tel:1 `` or `` tel:1` ``). Wrapping such a
/// link again would only grow the backtick run on every pass.
fn is_delimited(message: &str, span: &Range<usize>) -> bool {
    message[..span.start].ends_with(ESCAPE_DELIMITER)
        || message[span.end..].starts_with(ESCAPE_DELIMITER)
}

/// Escape every rewrite-listed plain link in `message`, flagging each one
/// as `rewritten`.
///
/// A link that already has a delimiter directly before or after it is left
/// untouched and not flagged. Returns `message` borrowed and untouched when
/// nothing qualifies.
pub fn rewrite_links<'a>(
    urls: &mut [DetectedUrl],
    message: &'a str,
    rewrite_protocols: &[String],
) -> Cow<'a, str> {
    let mut order: Vec<usize> = (0..urls.len()).collect();
    order.sort_by_key(|&i| urls[i].start());

    let mut out: Option<String> = None;
    let mut cursor = 0;
    let mut count = 0;

    for i in order {
        let url = &mut urls[i];
        if !is_rewrite_candidate(url, rewrite_protocols) {
            continue;
        }
        let span = url.span.whole.clone();
        if span.start < cursor || span.end > message.len() {
            trace!("rewrite: skip overlapping span {span:?}");
            continue;
        }
        if is_delimited(message, &span) {
            trace!("rewrite: {span:?} is already delimited, leaving as is");
            continue;
        }
        let buf = out.get_or_insert_with(|| String::with_capacity(message.len() + 8));
        buf.push_str(&message[cursor..span.start]);
        buf.push(ESCAPE_DELIMITER);
        buf.push_str(&message[span.clone()]);
        buf.push(ESCAPE_DELIMITER);
        cursor = span.end;
        url.rewritten = true;
        count += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&message[cursor..]);
            debug!("rewrite: escaped {count} link(s)");
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_urls;
    use crate::pattern::LinkPatterns;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rewrite(message: &str, protocols: &[&str]) -> (String, Vec<DetectedUrl>) {
        let mut urls = extract_urls(&LinkPatterns::compile().unwrap(), message);
        let out = rewrite_links(&mut urls, message, &list(protocols)).into_owned();
        (out, urls)
    }

    #[test]
    fn marks_link_as_rewritten() {
        let (out, urls) = rewrite("tel://999999999", &["tel", "ftp"]);
        assert_eq!(out, "`tel://999999999`");
        assert!(urls[0].rewritten);
    }

    #[test]
    fn rewrites_ftp() {
        let (out, _) = rewrite("ftp://example.com", &["tel", "ftp"]);
        assert_eq!(out, "`ftp://example.com`");
    }

    #[test]
    fn leaves_embedded_links_alone() {
        let (out, urls) = rewrite(
            "tel:123456 [test](ftp://example.com) [test2](tel://999)",
            &["tel", "ftp"],
        );
        assert_eq!(
            out,
            "`tel:123456` [test](ftp://example.com) [test2](tel://999)"
        );
        assert!(urls[0].rewritten);
        assert!(urls[1..].iter().all(|u| !u.rewritten));
    }

    #[test]
    fn unlisted_protocol_is_borrowed_unchanged() {
        let message = "sftp://example.com";
        let mut urls = extract_urls(&LinkPatterns::compile().unwrap(), message);
        let out = rewrite_links(&mut urls, message, &list(&["tel", "ftp"]));
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, message);
        assert!(!urls[0].rewritten);
    }

    #[test]
    fn no_urls_is_identity() {
        let mut urls = Vec::new();
        let out = rewrite_links(&mut urls, "hello", &list(&["tel"]));
        assert!(matches!(out, Cow::Borrowed("hello")));
    }

    #[test]
    fn multiple_occurrences_of_same_protocol() {
        let (out, _) = rewrite("tel:123456 tel:789012", &["tel"]);
        assert_eq!(out, "`tel:123456` `tel:789012`");
    }

    #[test]
    fn repeated_identical_links_each_wrapped_once() {
        let (out, urls) = rewrite("tel:123456 tel:123456", &["tel"]);
        assert_eq!(out, "`tel:123456` `tel:123456`");
        assert!(urls.iter().all(|u| u.rewritten));

        let (out, _) = rewrite("tel:123456 tel:789012 tel:123456", &["tel"]);
        assert_eq!(out, "`tel:123456` `tel:789012` `tel:123456`");
    }

    #[test]
    fn protocol_match_is_case_sensitive() {
        let (out, urls) = rewrite("TEL:123", &["tel"]);
        assert_eq!(out, "TEL:123");
        assert!(!urls[0].rewritten);
    }

    #[test]
    fn keeps_surrounding_text() {
        let (out, _) = rewrite("Call me at tel://1234567890, thanks", &["tel"]);
        assert_eq!(out, "Call me at `tel://1234567890`, thanks");
    }

    #[test]
    fn processes_unsorted_input_in_position_order() {
        let message = "tel:1 x tel:2";
        let mut urls = extract_urls(&LinkPatterns::compile().unwrap(), message);
        urls.reverse();
        let out = rewrite_links(&mut urls, message, &list(&["tel"]));
        assert_eq!(out, "`tel:1` x `tel:2`");
    }

    #[test]
    fn already_rewritten_is_not_wrapped_again() {
        let message = "tel:1";
        let mut urls = extract_urls(&LinkPatterns::compile().unwrap(), message);
        let first = rewrite_links(&mut urls, message, &list(&["tel"])).into_owned();
        let second = rewrite_links(&mut urls, message, &list(&["tel"]));
        assert_eq!(first, "`tel:1`");
        assert_eq!(second, message);
    }

    fn assert_stable(message: &str) {
        let (first, urls) = rewrite(message, &["tel"]);
        assert_eq!(first, message);
        assert!(urls.iter().all(|u| !u.rewritten), "{urls:?}");
        let (second, _) = rewrite(&first, &["tel"]);
        assert_eq!(second, first);
    }

    #[test]
    fn trailing_delimiter_counts_as_escaped() {
        assert_stable("tel:123`");
    }

    #[test]
    fn leading_delimiter_counts_as_escaped() {
        assert_stable("`tel:123");
    }

    #[test]
    fn lone_delimiter_inside_sentence_counts_as_escaped() {
        assert_stable("see `tel:123 please");
    }

    #[test]
    fn delimiter_elsewhere_does_not_block_rewrite() {
        let (out, urls) = rewrite("`x tel:123", &["tel"]);
        assert_eq!(out, "`x `tel:123`");
        assert!(urls[0].rewritten);
    }
}
