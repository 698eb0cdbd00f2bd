//! URL scheme filtering for chat messages.
//!
//! Links are found in two forms, markdown `[text](scheme:host)` and bare
//! `scheme:host`. Messages carrying a disallowed scheme are rejected; plain
//! links with a rewrite-listed scheme are wrapped in backticks so clients no
//! longer autolink them. [`LinkFilter`] is the entry point.

pub mod config;
pub mod extract;
pub mod filter;
pub mod input;
pub mod pattern;
pub mod policy;
pub mod rewrite;
pub mod watch;

pub use config::FilterConfig;
pub use extract::{DetectedUrl, LinkForm};
pub use filter::{Decision, Evaluation, LinkFilter, MessageEvent, Notifier, Post};
