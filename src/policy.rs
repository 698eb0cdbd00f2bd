//! Scheme policy: allow-list matching and the per-message invalid set.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::trace;
use regex::Regex;

use crate::config::FilterConfig;
use crate::extract::{DetectedUrl, LinkForm};

/// Trim every token and drop the empty ones, keeping order.
pub fn trim_protocols<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the allow-list pattern `(?i)\b(tok1|tok2|...)\b`.
///
/// Returns `None` for a list with no usable tokens. Tokens are inserted
/// verbatim; a token the regex compiler rejects is a configuration error.
pub fn word_list_to_regex<S: AsRef<str>>(tokens: &[S]) -> Option<String> {
    let tokens = trim_protocols(tokens);
    if tokens.is_empty() {
        return None;
    }
    Some(format!(r"(?i)\b({})\b", tokens.join("|")))
}

/// Case-insensitive, whole-token protocol allow-list.
#[derive(Debug, Clone)]
pub struct ProtocolMatcher {
    regex: Option<Regex>,
}

impl ProtocolMatcher {
    pub fn compile<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let regex = match word_list_to_regex(tokens) {
            Some(pattern) => Some(
                Regex::new(&pattern)
                    .with_context(|| format!("invalid protocol list pattern {pattern:?}"))?,
            ),
            None => None,
        };
        Ok(Self { regex })
    }

    /// An empty allow-list permits nothing.
    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }

    pub fn allows(&self, protocol: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(protocol))
    }
}

/// Immutable, compiled form of a `FilterConfig`.
///
/// One `Policy` is shared by all in-flight messages; a configuration change
/// builds a new one rather than mutating this.
#[derive(Debug, Clone)]
pub struct Policy {
    reject_plain_links: bool,
    embedded: ProtocolMatcher,
    plain: ProtocolMatcher,
    rewrite_protocols: Vec<String>,
    create_warning_message: String,
    edit_warning_message: String,
}

impl Policy {
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            reject_plain_links: config.reject_plain_links,
            embedded: ProtocolMatcher::compile(config.allowed_protocols_embedded.as_slice())
                .context("allowed_protocols_embedded")?,
            plain: ProtocolMatcher::compile(config.allowed_protocols_plain.as_slice())
                .context("allowed_protocols_plain")?,
            rewrite_protocols: trim_protocols(config.rewrite_protocols.as_slice()),
            create_warning_message: config.create_warning_message.clone(),
            edit_warning_message: config.edit_warning_message.clone(),
        })
    }

    pub fn rewrite_protocols(&self) -> &[String] {
        &self.rewrite_protocols
    }

    pub fn create_warning_message(&self) -> &str {
        &self.create_warning_message
    }

    pub fn edit_warning_message(&self) -> &str {
        &self.edit_warning_message
    }

    /// Whether this single occurrence breaks the policy.
    fn violates(&self, url: &DetectedUrl) -> bool {
        match url.form {
            LinkForm::Embedded => self.embedded.is_empty() || !self.embedded.allows(&url.protocol),
            LinkForm::PlainText => {
                self.reject_plain_links
                    && (self.plain.is_empty() || !self.plain.allows(&url.protocol))
            }
        }
    }

    /// Distinct disallowed protocols in order of first violation.
    ///
    /// Rewritten links are resolved and skipped. De-duplication is by
    /// protocol name across both link forms: once `tel` is reported, a later
    /// `tel` violation in the other form adds nothing. The result feeds a
    /// user-facing warning, so one entry per scheme is enough.
    pub fn invalid_protocols(&self, urls: &[DetectedUrl]) -> Vec<String> {
        let mut invalid = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for url in urls {
            if url.rewritten || seen.contains(url.protocol.as_str()) {
                continue;
            }
            if self.violates(url) {
                trace!("policy: {:?} link {:?} not allowed", url.form, url.original_text);
                seen.insert(url.protocol.as_str());
                invalid.push(url.protocol.clone());
            }
        }
        invalid
    }
}
