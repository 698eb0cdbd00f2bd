#![no_main]

use libfuzzer_sys::fuzz_target;
use schemefilter::extract::extract_urls;
use schemefilter::pattern::LinkPatterns;
use schemefilter::rewrite::{ESCAPE_DELIMITER, rewrite_links};

fuzz_target!(|data: &[u8]| {
    let Ok(message) = std::str::from_utf8(data) else {
        return;
    };
    let patterns = LinkPatterns::compile().expect("link patterns compile");

    let mut urls = extract_urls(&patterns, message);

    // Spans must be in bounds, on char boundaries, sorted, and agree with the
    // copied text.
    for url in &urls {
        let whole = &url.span.whole;
        assert!(whole.start <= whole.end && whole.end <= message.len());
        assert_eq!(message.get(whole.clone()), Some(url.original_text.as_str()));
        assert_eq!(message.get(url.span.protocol.clone()), Some(url.protocol.as_str()));
    }
    for pair in urls.windows(2) {
        assert!(pair[0].start() <= pair[1].start(), "unsorted: {pair:?}");
    }

    // Rewriting every plain scheme adds exactly two delimiters per rewritten
    // link and otherwise keeps the text.
    let protocols: Vec<String> = urls.iter().map(|u| u.protocol.clone()).collect();
    let out = rewrite_links(&mut urls, message, &protocols);
    let rewritten = urls.iter().filter(|u| u.rewritten).count();
    assert_eq!(out.len(), message.len() + 2 * rewritten * ESCAPE_DELIMITER.len_utf8());
    let stripped: String = out.chars().filter(|&c| c != ESCAPE_DELIMITER).collect();
    let original: String = message.chars().filter(|&c| c != ESCAPE_DELIMITER).collect();
    assert_eq!(stripped, original);
});
