//! Offline key-phrase extraction.
//!
//! [`LocalPhraseExtractor`] needs no network access: it splits text at
//! punctuation and stop words, and every remaining run of content words
//! becomes a candidate phrase. Runs longer than `max_words` are cut into
//! consecutive pieces of at most `max_words`.
//!
//! ```text
//! "There was a near miss at the loading dock."
//!     → {"near miss", "loading dock"}
//! ```

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::providers::PhraseExtractor;

pub const DEFAULT_MAX_WORDS: usize = 3;

/// Stopword- and punctuation-delimited phrase extractor.
#[derive(Debug, Clone)]
pub struct LocalPhraseExtractor {
    max_words: usize,
    min_word_len: usize,
}

impl Default for LocalPhraseExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORDS)
    }
}

impl LocalPhraseExtractor {
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
            min_word_len: 2,
        }
    }

    pub fn phrases(&self, text: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for fragment in text.split(is_phrase_break) {
            let mut run: Vec<String> = Vec::new();
            for raw in fragment.split_whitespace() {
                let word = raw
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase();
                if self.is_content_word(&word) {
                    run.push(word);
                } else {
                    self.flush(&mut run, &mut out);
                }
            }
            self.flush(&mut run, &mut out);
        }
        out
    }

    fn is_content_word(&self, word: &str) -> bool {
        word.chars().count() >= self.min_word_len
            && !word.chars().all(|c| c.is_ascii_digit())
            && !is_stop_word(word)
    }

    fn flush(&self, run: &mut Vec<String>, out: &mut BTreeSet<String>) {
        for piece in run.chunks(self.max_words) {
            out.insert(piece.join(" "));
        }
        run.clear();
    }
}

/// Punctuation that ends a phrase. Hyphens and apostrophes stay inside
/// words ("fork-lift", "worker's").
fn is_phrase_break(c: char) -> bool {
    !(c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '\'')
}

fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "a" | "about"
            | "after"
            | "again"
            | "all"
            | "also"
            | "an"
            | "and"
            | "any"
            | "are"
            | "as"
            | "at"
            | "be"
            | "been"
            | "before"
            | "being"
            | "but"
            | "by"
            | "can"
            | "could"
            | "did"
            | "do"
            | "does"
            | "during"
            | "each"
            | "for"
            | "from"
            | "had"
            | "has"
            | "have"
            | "he"
            | "her"
            | "his"
            | "how"
            | "if"
            | "in"
            | "into"
            | "is"
            | "it"
            | "its"
            | "may"
            | "more"
            | "no"
            | "not"
            | "of"
            | "on"
            | "or"
            | "our"
            | "out"
            | "over"
            | "she"
            | "should"
            | "so"
            | "some"
            | "such"
            | "than"
            | "that"
            | "the"
            | "their"
            | "them"
            | "then"
            | "there"
            | "these"
            | "they"
            | "this"
            | "those"
            | "to"
            | "up"
            | "very"
            | "was"
            | "we"
            | "were"
            | "what"
            | "when"
            | "where"
            | "which"
            | "while"
            | "who"
            | "will"
            | "with"
            | "would"
            | "you"
    )
}

#[async_trait]
impl PhraseExtractor for LocalPhraseExtractor {
    fn name(&self) -> &str {
        "local"
    }

    async fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        Ok(self.phrases(text))
    }
}
