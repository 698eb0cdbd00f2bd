//! Message filter: the create/edit hooks and the pipeline behind them.
//!
//! Each message runs Extract -> Rewrite -> Evaluate -> Decide against one
//! policy snapshot taken at entry. A configuration change publishes a new
//! `Arc<Policy>`; calls already in flight keep the snapshot they started
//! with.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use log::{debug, info, warn};

use crate::config::FilterConfig;
use crate::extract::{DetectedUrl, extract_urls};
use crate::pattern::LinkPatterns;
use crate::policy::Policy;
use crate::rewrite::rewrite_links;

/// A chat message as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Post {
    pub message: String,
    pub user_id: String,
    pub channel_id: String,
    pub root_id: String,
}

impl Post {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Outbound channel for the author-only warning sent on rejection.
///
/// Delivery is best effort: an error is logged and the decision stands.
pub trait Notifier: Send + Sync {
    fn send_transient_warning(
        &self,
        user_id: &str,
        channel_id: &str,
        root_id: &str,
        text: &str,
    ) -> Result<()>;
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn send_transient_warning(
        &self,
        user_id: &str,
        channel_id: &str,
        root_id: &str,
        text: &str,
    ) -> Result<()> {
        (**self).send_transient_warning(user_id, channel_id, root_id, text)
    }
}

/// Which hook fired; selects the warning template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEvent {
    Create,
    Update,
}

impl fmt::Display for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageEvent::Create => f.write_str("post"),
            MessageEvent::Update => f.write_str("edit"),
        }
    }
}

/// Result of running the pipeline on one message, without side effects.
#[derive(Debug)]
pub struct Evaluation<'a> {
    /// Final text; borrowed when nothing was rewritten.
    pub message: Cow<'a, str>,
    pub urls: Vec<DetectedUrl>,
    /// Disallowed protocols in order of first violation.
    pub invalid_protocols: Vec<String>,
}

impl Evaluation<'_> {
    pub fn is_accepted(&self) -> bool {
        self.invalid_protocols.is_empty()
    }
}

/// Terminal state of a hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Store this post (its message may have been rewritten).
    Accepted(Post),
    /// Drop the post. `reason` is returned to the host.
    Rejected { reason: String },
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted(_))
    }

    /// `(post, error)` in the host's hook convention: `(Some, "")` to
    /// accept, `(None, reason)` to reject.
    pub fn into_parts(self) -> (Option<Post>, String) {
        match self {
            Decision::Accepted(post) => (Some(post), String::new()),
            Decision::Rejected { reason } => (None, reason),
        }
    }
}

/// User-facing error returned to the host on rejection.
pub fn rejection_reason(invalid_protocols: &[String]) -> String {
    format!("Schemes not allowed: {}", invalid_protocols.join(", "))
}

/// Warning text for the author: the configured template (with `%s`
/// replaced by the protocol list) plus a line naming the protocols.
pub fn compose_warning(template: &str, invalid_protocols: &[String]) -> String {
    let joined = invalid_protocols.join(", ");
    let mut text = template.replace("%s", &joined);
    text.push_str(&format!("\nFollowing URL Scheme is not allowed: `{joined}`"));
    text
}

/// Filters posts and edits against the active `Policy`, warning authors through `N`.
pub struct LinkFilter<N> {
    patterns: LinkPatterns,
    policy: RwLock<Arc<Policy>>,
    notifier: N,
}

impl<N: Notifier> LinkFilter<N> {
    /// Compile the link patterns and the initial policy.
    pub fn new(config: &FilterConfig, notifier: N) -> Result<Self> {
        let patterns = LinkPatterns::compile()?;
        let policy = Policy::from_config(config)?;
        info!(
            "filter: activated (embedded /{}/, plain /{}/)",
            patterns.embedded.as_str(),
            patterns.plain.as_str()
        );
        Ok(Self {
            patterns,
            policy: RwLock::new(Arc::new(policy)),
            notifier,
        })
    }

    /// Publish a new policy. On error the previous policy stays active.
    pub fn on_configuration_change(&self, config: &FilterConfig) -> Result<()> {
        let policy = Arc::new(Policy::from_config(config)?);
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
        info!("filter: configuration updated");
        Ok(())
    }

    /// The policy new calls will use.
    pub fn snapshot(&self) -> Arc<Policy> {
        Arc::clone(&self.policy.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn on_message_create(&self, post: Post) -> Decision {
        self.handle(post, MessageEvent::Create)
    }

    /// Same pipeline as create; the previous version is not consulted.
    pub fn on_message_update(&self, new_post: Post, _old_post: &Post) -> Decision {
        self.handle(new_post, MessageEvent::Update)
    }

    /// Run the pipeline on `message` without notifying anyone.
    pub fn evaluate<'a>(&self, message: &'a str) -> Evaluation<'a> {
        let policy = self.snapshot();
        self.evaluate_with(&policy, message)
    }

    fn evaluate_with<'a>(&self, policy: &Policy, message: &'a str) -> Evaluation<'a> {
        let mut urls = extract_urls(&self.patterns, message);
        let rewritten = rewrite_links(&mut urls, message, policy.rewrite_protocols());
        let invalid_protocols = policy.invalid_protocols(&urls);
        debug!(
            "filter: {} url(s), rewritten={}, invalid=[{}]",
            urls.len(),
            matches!(rewritten, Cow::Owned(_)),
            invalid_protocols.join(", ")
        );
        Evaluation {
            message: rewritten,
            urls,
            invalid_protocols,
        }
    }

    fn handle(&self, mut post: Post, event: MessageEvent) -> Decision {
        let policy = self.snapshot();
        let Evaluation {
            message,
            invalid_protocols,
            ..
        } = self.evaluate_with(&policy, &post.message);
        let rewritten = match message {
            Cow::Owned(text) => Some(text),
            Cow::Borrowed(_) => None,
        };
        if let Some(text) = rewritten {
            post.message = text;
        }

        if invalid_protocols.is_empty() {
            return Decision::Accepted(post);
        }

        let template = match event {
            MessageEvent::Create => policy.create_warning_message(),
            MessageEvent::Update => policy.edit_warning_message(),
        };
        let warning = compose_warning(template, &invalid_protocols);
        if let Err(e) = self.notifier.send_transient_warning(
            &post.user_id,
            &post.channel_id,
            &post.root_id,
            &warning,
        ) {
            warn!("filter: failed to warn user {}: {e:#}", post.user_id);
        }

        let reason = rejection_reason(&invalid_protocols);
        info!(
            "filter: rejected {event} from user {} in channel {}: {reason}",
            post.user_id, post.channel_id
        );
        Decision::Rejected { reason }
    }
}
