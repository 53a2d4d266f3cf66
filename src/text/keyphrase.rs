//! Graph-based keyphrase ranking over recognized text.
//!
//! Candidate phrases are maximal runs of tokens not in the ignore set
//! (stopwords plus punctuation). Each token gets a frequency (occurrences
//! across all candidate phrases) and a co-occurrence degree (sum of its row
//! in the pairwise within-phrase co-occurrence table, self-pairs included).
//! A phrase scores the sum of `degree / frequency` over its tokens, and
//! phrases are returned ordered by descending `(score, phrase)`.
//!
//! The whole pass is a pure function of the text and the ignore set:
//! deterministic, idempotent, and safe to run anywhere.

use crate::protocol::KeyphraseRank;
use crate::text::tokenizer::Tokenizer;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// ASCII punctuation, ignored alongside stopwords.
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Scores candidate phrases in recognized text.
#[derive(Debug, Clone, Default)]
pub struct KeyphraseRanker {
    ignore: BTreeSet<String>,
}

impl KeyphraseRanker {
    /// Build a ranker whose ignore set is `stopwords` plus punctuation.
    pub fn new<I>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut ignore: BTreeSet<String> = stopwords.into_iter().collect();
        ignore.extend(PUNCTUATION.chars().map(|c| c.to_string()));
        Self { ignore }
    }

    /// Build a ranker from an exact ignore set (no punctuation added).
    pub fn with_ignore_set<I>(ignore: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            ignore: ignore.into_iter().collect(),
        }
    }

    fn is_ignored(&self, token: &str) -> bool {
        self.ignore.contains(token)
    }

    /// Rank every candidate phrase in `text`, best first.
    pub fn rank(&self, text: &str, tokenizer: &dyn Tokenizer) -> Vec<KeyphraseRank> {
        let phrases = self.candidate_phrases(text, tokenizer);
        if phrases.is_empty() {
            return Vec::new();
        }

        let frequency = frequency_distribution(&phrases);
        let degree = co_occurrence_degree(&phrases);

        let mut ranked: Vec<KeyphraseRank> = phrases
            .iter()
            .map(|phrase| {
                let score = phrase
                    .iter()
                    .map(|token| degree[token.as_str()] as f64 / frequency[token.as_str()] as f64)
                    .sum();
                KeyphraseRank {
                    score,
                    phrase: phrase.join(" "),
                }
            })
            .collect();

        // Highest rank first; ties resolved by the (score, phrase) pair as a
        // whole, so equal scores order by descending phrase text.
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.phrase.cmp(&a.phrase))
        });
        ranked
    }

    /// Maximal runs of non-ignored tokens, de-duplicated across the text.
    fn candidate_phrases(&self, text: &str, tokenizer: &dyn Tokenizer) -> BTreeSet<Vec<String>> {
        let mut phrases = BTreeSet::new();
        for sentence in tokenizer.sentences(text) {
            let mut run: Vec<String> = Vec::new();
            for token in tokenizer.tokens(&sentence) {
                let token = token.to_lowercase();
                if self.is_ignored(&token) {
                    if !run.is_empty() {
                        phrases.insert(std::mem::take(&mut run));
                    }
                } else {
                    run.push(token);
                }
            }
            if !run.is_empty() {
                phrases.insert(run);
            }
        }
        phrases
    }
}

/// Occurrences of each token across all candidate phrases.
fn frequency_distribution(phrases: &BTreeSet<Vec<String>>) -> HashMap<&str, u64> {
    let mut frequency: HashMap<&str, u64> = HashMap::new();
    for token in phrases.iter().flatten() {
        *frequency.entry(token.as_str()).or_insert(0) += 1;
    }
    frequency
}

/// Row sums of the within-phrase token co-occurrence table.
fn co_occurrence_degree(phrases: &BTreeSet<Vec<String>>) -> HashMap<&str, u64> {
    let mut graph: HashMap<&str, HashMap<&str, u64>> = HashMap::new();
    for phrase in phrases {
        for token in phrase {
            let row = graph.entry(token.as_str()).or_default();
            for co_token in phrase {
                *row.entry(co_token.as_str()).or_insert(0) += 1;
            }
        }
    }

    graph
        .into_iter()
        .map(|(token, row)| (token, row.values().sum()))
        .collect()
}
