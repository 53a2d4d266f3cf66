//! Sentence and word tokenization, plus stopword sources.
//!
//! The natural-language tokenizer is a consumed capability: the ranker only
//! needs `sentences` and `tokens`. [`RuleTokenizer`] is the built-in
//! implementation: sentence split on terminal punctuation and word/punct
//! run tokens, which matches what speech hypotheses (plain lowercase
//! words) actually need.

use crate::error::{RemvoxError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Splits raw text into sentences and sentences into tokens.
pub trait Tokenizer: Send + Sync {
    fn sentences(&self, text: &str) -> Vec<String>;
    fn tokens(&self, sentence: &str) -> Vec<String>;
}

/// Rule-based tokenizer.
///
/// Tokens are maximal runs of word characters (alphanumeric or underscore)
/// or of punctuation; whitespace only separates. `"I have two dogs,"`
/// tokenizes to `["I", "have", "two", "dogs", ","]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleTokenizer;

impl Tokenizer for RuleTokenizer {
    fn sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            current.push(ch);
            if matches!(ch, '.' | '!' | '?') {
                push_nonempty(&mut sentences, &mut current);
            }
        }
        push_nonempty(&mut sentences, &mut current);
        sentences
    }

    fn tokens(&self, sentence: &str) -> Vec<String> {
        #[derive(PartialEq)]
        enum Run {
            Word,
            Punct,
        }

        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut kind = Run::Word;

        for ch in sentence.chars() {
            if ch.is_whitespace() {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                continue;
            }
            let next = if ch.is_alphanumeric() || ch == '_' {
                Run::Word
            } else {
                Run::Punct
            };
            if !current.is_empty() && next != kind {
                tokens.push(std::mem::take(&mut current));
            }
            kind = next;
            current.push(ch);
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }
}

fn push_nonempty(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Resolve a stopword source identifier to a word set.
///
/// `builtin:<language>` selects a bundled list; anything else is read as a
/// file with one word per line (`#` lines are comments).
pub fn stopword_set(source: &str) -> Result<HashSet<String>> {
    if let Some(language) = source.strip_prefix("builtin:") {
        return match language {
            "english" | "en" => Ok(ENGLISH_STOPWORDS.iter().map(|w| w.to_string()).collect()),
            other => Err(RemvoxError::StopwordLoad {
                origin: source.to_string(),
                message: format!("no builtin stopword list for '{}'", other),
            }),
        };
    }

    let contents = fs::read_to_string(Path::new(source)).map_err(|e| RemvoxError::StopwordLoad {
        origin: source.to_string(),
        message: e.to_string(),
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_lowercase())
        .collect())
}

/// Bundled English stopword list (the usual corpus list).
const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such",
    "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
    "will", "just", "don", "should", "now",
];
