use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use schemefilter::config::{self, CliOverrides, FilterConfig};
use schemefilter::input;
use schemefilter::watch::ConfigWatcher;
use schemefilter::{Decision, LinkFilter, LinkForm, Notifier, Post};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SCHEMEFILTER_BUILD_GIT_HASH"),
    " ",
    env!("SCHEMEFILTER_BUILD_PROFILE"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "schemefilter",
    version = VERSION,
    about = "Reject or escape chat-message links by URL scheme"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: $XDG_CONFIG_HOME/schemefilter/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output file path (logs go to stderr via RUST_LOG otherwise)
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Allowed schemes for embedded links, comma-separated
    #[arg(long, global = true, value_name = "LIST")]
    allow_embedded: Option<String>,

    /// Allowed schemes for plain links, comma-separated
    #[arg(long, global = true, value_name = "LIST")]
    allow_plain: Option<String>,

    /// Schemes escaped instead of rejected in plain links, comma-separated
    #[arg(long, global = true, value_name = "LIST")]
    rewrite: Option<String>,

    /// Check plain links against the plain allow-list
    #[arg(long, global = true, value_name = "BOOL")]
    reject_plain_links: Option<bool>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the post hook on one message and print the stored text
    Check {
        /// Message file (use `-` or a pipe for stdin)
        input: Option<PathBuf>,

        /// Treat the message as an edit (uses the edit warning)
        #[arg(long)]
        edit: bool,

        #[arg(long, default_value = "")]
        user: String,

        #[arg(long, default_value = "")]
        channel: String,

        #[arg(long, default_value = "")]
        root: String,
    },
    /// List detected links and the schemes that would be rejected
    Scan {
        /// Message file (use `-` or a pipe for stdin)
        input: Option<PathBuf>,
    },
    /// Filter stdin line by line, one message per line
    Stream {
        /// Treat every line as an edit
        #[arg(long)]
        edit: bool,

        /// Reload the config file when it changes
        #[arg(long)]
        watch: bool,
    },
}

/// Delivers the author warning on stderr.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn send_transient_warning(
        &self,
        user_id: &str,
        channel_id: &str,
        _root_id: &str,
        text: &str,
    ) -> Result<()> {
        let mut err = io::stderr().lock();
        if !user_id.is_empty() || !channel_id.is_empty() {
            writeln!(err, "[to {user_id} in {channel_id}]")?;
        }
        writeln!(err, "{text}")?;
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        match std::fs::File::create(log_path) {
            Ok(file) => env_logger::Builder::from_default_env()
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init(),
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        }
    } else {
        env_logger::init();
    }

    let overrides = CliOverrides {
        reject_plain_links: cli.reject_plain_links,
        allow_embedded: cli.allow_embedded.clone(),
        allow_plain: cli.allow_plain.clone(),
        rewrite: cli.rewrite.clone(),
    };

    let result = load_filter_config(cli.config.as_deref(), &overrides).and_then(|config| {
        let filter = LinkFilter::new(&config, StderrNotifier)?;
        match cli.command {
            Command::Check {
                input,
                edit,
                user,
                channel,
                root,
            } => cmd_check(&filter, input.as_deref(), edit, user, channel, root),
            Command::Scan { input } => cmd_scan(&filter, input.as_deref()),
            Command::Stream { edit, watch } => {
                cmd_stream(&filter, cli.config.as_deref(), &overrides, edit, watch)
            }
        }
    });

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn load_filter_config(path: Option<&Path>, overrides: &CliOverrides) -> Result<FilterConfig> {
    let mut file = config::load_config(path)?;
    file.merge_cli(overrides);
    Ok(file.resolve())
}

/// Returns Ok(false) when the message was rejected.
fn cmd_check(
    filter: &LinkFilter<StderrNotifier>,
    input: Option<&Path>,
    edit: bool,
    user_id: String,
    channel_id: String,
    root_id: String,
) -> Result<bool> {
    let post = Post {
        message: input::read_message(input)?,
        user_id,
        channel_id,
        root_id,
    };
    let decision = if edit {
        let old = post.clone();
        filter.on_message_update(post, &old)
    } else {
        filter.on_message_create(post)
    };
    match decision {
        Decision::Accepted(post) => {
            println!("{}", post.message);
            Ok(true)
        }
        Decision::Rejected { reason } => {
            eprintln!("rejected: {reason}");
            Ok(false)
        }
    }
}

fn cmd_scan(filter: &LinkFilter<StderrNotifier>, input: Option<&Path>) -> Result<bool> {
    let message = input::read_message(input)?;
    let eval = filter.evaluate(&message);

    let mut out = io::stdout().lock();
    for url in &eval.urls {
        let form = match url.form {
            LinkForm::Embedded => "embedded",
            LinkForm::PlainText => "plain",
        };
        writeln!(
            out,
            "{:>5}..{:<5} {:<8} {:<10} {}{}",
            url.span.whole.start,
            url.span.whole.end,
            form,
            url.protocol,
            url.host,
            if url.rewritten { "  (rewritten)" } else { "" }
        )?;
    }
    if eval.urls.is_empty() {
        writeln!(out, "no links")?;
    }
    if eval.is_accepted() {
        writeln!(out, "accepted")?;
    } else {
        writeln!(out, "rejected: {}", eval.invalid_protocols.join(", "))?;
    }
    if eval.message != message.as_str() {
        writeln!(out, "rewritten: {}", eval.message)?;
    }
    Ok(eval.is_accepted())
}

fn cmd_stream(
    filter: &LinkFilter<StderrNotifier>,
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    edit: bool,
    watch: bool,
) -> Result<bool> {
    let watcher = if watch {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => config::config_path()
                .ok_or_else(|| anyhow::anyhow!("--watch needs --config or a HOME directory"))?,
        };
        Some(ConfigWatcher::new(&path)?)
    } else {
        None
    };

    let stdin = io::stdin().lock();
    let mut out = io::stdout().lock();
    let mut all_accepted = true;

    for line in input::message_lines(stdin) {
        let line = line.context("failed to read stdin")?;

        if let Some(w) = &watcher
            && w.has_changed()
        {
            reload(filter, w.path(), overrides);
        }

        let post = Post::new(line);
        let decision = if edit {
            let old = post.clone();
            filter.on_message_update(post, &old)
        } else {
            filter.on_message_create(post)
        };
        match decision {
            Decision::Accepted(post) => writeln!(out, "{}", post.message)?,
            Decision::Rejected { reason } => {
                all_accepted = false;
                writeln!(out, "rejected: {reason}")?;
            }
        }
        out.flush()?;
    }
    Ok(all_accepted)
}

/// Re-read the config file and publish it. A broken file keeps the old policy.
fn reload(filter: &LinkFilter<StderrNotifier>, path: &Path, overrides: &CliOverrides) {
    let result = load_filter_config(Some(path), overrides)
        .and_then(|config| filter.on_configuration_change(&config));
    match result {
        Ok(()) => info!("stream: reloaded {}", path.display()),
        Err(e) => warn!("stream: keeping previous config: {e:#}"),
    }
}
