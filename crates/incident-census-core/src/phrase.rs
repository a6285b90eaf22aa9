//! Phrase normalization and fuzzy label matching.
//!
//! Every phrase that is compared, counted or filtered goes through
//! [`normalize_phrase`] first, so "Near  Miss", `"near miss"` and
//! `near miss.` all collapse to the same key.

/// Default similarity a phrase needs to fuzzy-match a label.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

/// Lower-case, collapse internal whitespace, and strip leading and
/// trailing punctuation (quotes, periods, brackets).
pub fn normalize_phrase(phrase: &str) -> String {
    let collapsed = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

/// Character-level Levenshtein distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / max_len`, in `[0.0, 1.0]`. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Whether an extracted phrase refers to the incident type `label`.
///
/// Matches when, after normalization, either side is a substring of the
/// other ("falls from ladder" ↔ "fall"), or when their edit-distance
/// similarity reaches `threshold` ("scafolding" ↔ "scaffolding").
pub fn fuzzy_matches(phrase: &str, label: &str, threshold: f64) -> bool {
    let p = normalize_phrase(phrase);
    let l = normalize_phrase(label);
    if p.is_empty() || l.is_empty() {
        return false;
    }
    if p.contains(&l) || l.contains(&p) {
        return true;
    }
    similarity(&p, &l) >= threshold
}
