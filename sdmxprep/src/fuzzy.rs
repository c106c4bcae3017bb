//! String similarity used to rank code-list names against an observed value.
//!
//! The score is a partial, token-order-insensitive ratio on a 0–100 scale: both strings are
//! lowercased, reduced to alphanumeric tokens and sorted, then the shorter is compared against
//! every equally long window of the longer and the best indel similarity is kept.

use rapidfuzz::distance::indel;

fn sorted_tokens(text: &str) -> Vec<char> {
    let lowered = text.to_lowercase();
    let mut tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    tokens.sort_unstable();
    tokens.join(" ").chars().collect()
}

fn ratio(a: &[char], b: &[char]) -> f64 {
    indel::normalized_similarity(a.iter().copied(), b.iter().copied()) * 100.0
}

fn partial_ratio(a: &[char], b: &[char]) -> f64 {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.is_empty() {
        return 0.0;
    }
    longer
        .windows(shorter.len())
        .map(|window| ratio(shorter, window))
        .fold(0.0, f64::max)
}

/// Partial token-sort similarity between `a` and `b`, from 0 (nothing shared) to 100.
pub fn partial_token_sort_ratio(a: &str, b: &str) -> f64 {
    partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
}
