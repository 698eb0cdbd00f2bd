//! Message input for the CLI: a file path, or stdin via `-` / a pipe.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Detect whether the given CLI input argument represents stdin.
///
/// Returns `true` if input is `Some("-")`, or if input is `None` and stdin is not a terminal.
pub fn is_stdin_input(input: Option<&Path>) -> bool {
    match input {
        Some(p) => p.as_os_str() == "-",
        None => !io::stdin().is_terminal(),
    }
}

/// Read all of stdin to a string (blocking).
pub fn read_stdin_to_string() -> io::Result<String> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// Read one whole message from a file or stdin.
///
/// A single trailing newline (as left by `echo` or an editor) is not part of
/// the message.
pub fn read_message(input: Option<&Path>) -> Result<String> {
    let mut text = if is_stdin_input(input) {
        read_stdin_to_string().context("failed to read stdin")?
    } else {
        let path = input.ok_or_else(|| anyhow::anyhow!("input file required (or pipe via stdin)"))?;
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    strip_trailing_newline(&mut text);
    Ok(text)
}

fn strip_trailing_newline(text: &mut String) {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
}

/// Iterate over newline-separated messages, one per line.
pub fn message_lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<String>> {
    reader.lines()
}
