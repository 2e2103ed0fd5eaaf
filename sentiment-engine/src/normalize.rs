//! Text cleanup applied to `title + " " + text` before classification.

use regex::Regex;
use std::sync::LazyLock;

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"http\S+|www\S+").unwrap());
static USER_MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"u/[A-Za-z0-9_-]+").unwrap());
static SUBREDDIT_MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"r/[A-Za-z0-9_-]+").unwrap());
static NON_ASCII_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\x00-\x7F]+").unwrap());
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercases, strips links and mentions, replaces non-ASCII runs with a
/// space and collapses whitespace.
pub fn normalize_text(text: &str) -> String {
    let text = text.to_lowercase();
    let text = URL_REGEX.replace_all(&text, "");
    let text = USER_MENTION_REGEX.replace_all(&text, "");
    let text = SUBREDDIT_MENTION_REGEX.replace_all(&text, "");
    let text = NON_ASCII_REGEX.replace_all(&text, " ");
    WHITESPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

pub fn combine_title_and_text(title: &str, text: &str) -> String {
    normalize_text(&format!("{} {}", title, text))
}
