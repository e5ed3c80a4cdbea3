// Splits model output into visible response text and "thinking" text.
//
// Reasoning models wrap their chain-of-thought in <think>…</think> or
// <thinking>…</thinking> markers. The two spellings are one semantic. The
// split is recomputed over the full accumulated text on every call, so a
// marker pair completed by a later fragment is picked up automatically.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Non-greedy, dot matches newline, case-insensitive
    static ref THINK_PAIR: Regex =
        Regex::new(r"(?is)<think(?:ing)?>(.*?)</think(?:ing)?>").unwrap();
    static ref THINK_OPEN: Regex = Regex::new(r"(?i)<think(?:ing)?>").unwrap();
}

/// Result of splitting accumulated model output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThinkingSplit {
    /// Extracted thinking text, complete pairs only, in document order.
    pub thinking: String,
    /// Input with all complete pairs and any trailing open section removed.
    pub response: String,
    /// True while an open marker has no closing marker yet.
    pub thinking_in_progress: bool,
}

/// Pure splitter: same input always yields the same split.
pub fn split_thinking(text: &str) -> ThinkingSplit {
    let mut parts: Vec<String> = Vec::new();
    let without_pairs = THINK_PAIR.replace_all(text, |caps: &regex::Captures| {
        let inner = caps[1].trim();
        if !inner.is_empty() {
            parts.push(inner.to_string());
        }
        String::new()
    });

    // An unclosed marker hides everything from the marker onward until the
    // closing marker arrives.
    let (response, thinking_in_progress) = match THINK_OPEN.find(&without_pairs) {
        Some(open) => (without_pairs[..open.start()].to_string(), true),
        None => (without_pairs.into_owned(), false),
    };

    ThinkingSplit {
        thinking: parts.join("\n\n"),
        response,
        thinking_in_progress,
    }
}
