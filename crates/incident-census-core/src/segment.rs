//! Splitting text for size-limited phrase extractors.
//!
//! Remote extractors reject documents over a fixed size. [`split_segments`]
//! cuts text on paragraph boundaries first, then at the last newline or
//! space before the limit, and never inside a UTF-8 code point.
//! [`extract_chunked`] runs an extractor over every segment and unions
//! the phrases.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::providers::PhraseExtractor;

/// Split `text` into trimmed, non-empty segments of at most `max_chars`
/// bytes each. Empty or whitespace-only text yields no segments.
pub fn split_segments(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut segments = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let joined_len = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if joined_len > max_chars && !buf.is_empty() {
            segments.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            hard_split(para, max_chars, &mut segments);
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }

    if !buf.is_empty() {
        segments.push(buf);
    }
    segments
}

fn hard_split(mut remaining: &str, max_chars: usize, out: &mut Vec<String>) {
    while !remaining.is_empty() {
        let cut = if remaining.len() <= max_chars {
            remaining.len()
        } else {
            let limit = floor_char_boundary(remaining, max_chars);
            let at_space = remaining[..limit]
                .rfind(['\n', ' '])
                .map(|pos| pos + 1);
            match at_space.unwrap_or(limit) {
                0 => first_char_len(remaining),
                n => n,
            }
        };
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }
}

fn floor_char_boundary(s: &str, pos: usize) -> usize {
    let mut pos = pos.min(s.len());
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn first_char_len(s: &str) -> usize {
    s.chars().next().map(char::len_utf8).unwrap_or(s.len())
}

/// Extract phrases from `text`, splitting it first when the extractor
/// declares an input limit. Any segment failure fails the whole call.
pub async fn extract_chunked(
    extractor: &dyn PhraseExtractor,
    text: &str,
) -> Result<BTreeSet<String>> {
    let Some(limit) = extractor.max_input_chars() else {
        return extractor.extract(text).await;
    };
    if text.len() <= limit {
        return extractor.extract(text).await;
    }

    let segments = split_segments(text, limit);
    tracing::debug!(
        extractor = extractor.name(),
        segments = segments.len(),
        "splitting oversized text"
    );
    let mut phrases = BTreeSet::new();
    for segment in &segments {
        phrases.extend(extractor.extract(segment).await?);
    }
    Ok(phrases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EchoExtractor;

    #[test]
    fn short_text_is_one_segment() {
        assert_eq!(split_segments("Hello world.", 100), vec!["Hello world."]);
    }

    #[test]
    fn empty_text_has_no_segments() {
        assert!(split_segments("  \n\n ", 10).is_empty());
    }

    #[test]
    fn paragraphs_are_packed_up_to_the_limit() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        assert_eq!(split_segments(text, 10), vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn long_paragraph_splits_on_spaces() {
        let segs = split_segments("one two three four five", 9);
        assert!(segs.iter().all(|s| s.len() <= 9));
        assert_eq!(segs.join(" "), "one two three four five");
    }

    #[test]
    fn never_splits_inside_a_code_point() {
        let text = "é".repeat(20);
        let segs = split_segments(&text, 5);
        assert!(segs.iter().all(|s| s.len() <= 5));
        assert_eq!(segs.concat(), text);
    }

    #[tokio::test]
    async fn chunked_extraction_unions_segments() {
        let extractor = EchoExtractor::with_limit(20);
        let phrases = extract_chunked(&extractor, "near miss\n\nscaffolding fall")
            .await
            .unwrap();
        assert!(phrases.contains("near"));
        assert!(phrases.contains("scaffolding"));
        assert_eq!(extractor.calls(), 2);
    }
}
