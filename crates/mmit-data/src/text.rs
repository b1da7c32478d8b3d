//! Text normalization for instructions, answers, and captions.
//!
//! All functions are pure and never fail; over-long inputs are truncated by
//! word count.

use regex::Regex;
use std::sync::OnceLock;

/// Characters stripped from the start of questions and captions.
const LEADING_PUNCTUATION: &str = ",.!?*#:;~";

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("whitespace pattern is valid"))
}

/// Collapse whitespace runs, drop trailing newlines, then trim spaces.
fn clean_whitespace(text: &str) -> String {
    let collapsed = whitespace_runs().replace_all(text, " ");
    collapsed.trim_end_matches('\n').trim_matches(' ').to_string()
}

/// Keep the first `max_words` space-separated tokens.
fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split(' ').collect();
    if words.len() > max_words {
        words[..max_words].join(" ")
    } else {
        text.to_string()
    }
}

fn word_count(text: &str) -> usize {
    text.split(' ').count()
}

fn prepare_prompt_text(text: &str) -> String {
    text.to_lowercase()
        .trim_start_matches(|c: char| LEADING_PUNCTUATION.contains(c))
        .replace('-', " ")
        .replace('/', " ")
}

/// Normalize an instruction/question.
///
/// Lower-cases, strips leading punctuation, turns `-` and `/` into spaces,
/// collapses whitespace, and keeps at most `max_words` words.
pub fn normalize_question(text: &str, max_words: usize) -> String {
    let question = clean_whitespace(&prepare_prompt_text(text));
    truncate_words(&question, max_words)
}

/// Normalize a caption.
///
/// Same rules as [`normalize_question`], and `<person>` placeholders become
/// the plain word `person`.
pub fn normalize_caption(text: &str, max_words: usize) -> String {
    let caption = prepare_prompt_text(text).replace("<person>", "person");
    let caption = clean_whitespace(&caption);
    truncate_words(&caption, max_words)
}

/// Normalize an answer with sentence-aware truncation.
///
/// Whole sentences are kept while the running word count stays within
/// `max_words`. When not even the first sentence fits, the answer is cut to
/// `max_words` words instead. Case and punctuation are preserved.
pub fn normalize_answer(text: &str, max_words: usize) -> String {
    let answer = clean_whitespace(text);

    let mut kept = String::new();
    for sentence in answer.split('.') {
        let candidate = if kept.is_empty() {
            sentence.to_string()
        } else {
            format!("{kept}.{sentence}")
        };
        if word_count(&candidate) <= max_words {
            kept = candidate;
        } else {
            break;
        }
    }

    if kept.is_empty() {
        return truncate_words(&answer, max_words);
    }

    if !kept.ends_with('.') {
        kept.push('.');
    }
    kept
}
