//! Text processing: tokenization and keyphrase ranking.

pub mod keyphrase;
pub mod tokenizer;

pub use keyphrase::KeyphraseRanker;
pub use tokenizer::{RuleTokenizer, Tokenizer, stopword_set};
