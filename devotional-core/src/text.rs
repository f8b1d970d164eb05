//! Lexical normalization, token similarity and content hashing.
//!
//! Every comparison the validator makes runs on [`normalize`]d text, and
//! stored content hashes are computed over normalized bodies so that
//! re-punctuated or re-cased copies still collide.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Tokens of this many characters or fewer are ignored by [`similarity`].
pub const DEFAULT_MIN_TOKEN_LEN: usize = 3;

/// Lower-case, turn every non-word character into a space, collapse runs of
/// whitespace and trim.
///
/// Word characters are alphanumerics and `_`.
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The set of normalized tokens longer than `min_len` characters.
pub fn tokens(text: &str, min_len: usize) -> HashSet<String> {
    normalize(text)
        .split(' ')
        .filter(|t| t.chars().count() > min_len)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity over [`tokens`] with the default minimum length.
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_with(a, b, DEFAULT_MIN_TOKEN_LEN)
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` over tokens longer than `min_len`.
///
/// An empty union counts as 1, so two strings without qualifying tokens
/// score 0 rather than dividing by zero.
pub fn similarity_with(a: &str, b: &str, min_len: usize) -> f64 {
    let a = tokens(a, min_len);
    let b = tokens(b, min_len);

    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count().max(1);

    intersection as f64 / union as f64
}

/// Stable hex digest of the normalized text.
pub fn content_hash(body: &str) -> String {
    let digest = Sha256::digest(normalize(body).as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Walking   in FAITH! "), "walking in faith");
        assert_eq!(normalize("John 3:16"), "john 3 16");
        assert_eq!(normalize("God's-love, today."), "god s love today");
        assert_eq!(normalize("snake_case stays"), "snake_case stays");
        assert_eq!(normalize("?!..."), "");
    }

    #[test]
    fn test_tokens_skip_short_words() {
        let t = tokens("The Lord is my shepherd", DEFAULT_MIN_TOKEN_LEN);
        assert_eq!(t.len(), 2);
        assert!(t.contains("lord"));
        assert!(t.contains("shepherd"));
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        let a = "Walking Faithfully Through Dark Valleys";
        let b = "Faithfully Walking Into Morning Light";

        assert_eq!(similarity(a, a), 1.0);
        assert_eq!(similarity(a, b), similarity(b, a));

        let s = similarity(a, b);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn test_similarity_empty_tokens_is_zero() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("a an the", "of in"), 0.0);
        assert_eq!(similarity("faith", ""), 0.0);
    }

    #[test]
    fn test_similarity_ignores_case_and_punctuation() {
        assert_eq!(similarity("Grace, Abounding!", "grace abounding"), 1.0);
    }

    #[test]
    fn test_similarity_subset_ratios() {
        let ten = "alpha bravo charlie delta echoes foxtrot golfer hotel india juliet";
        let eight = "alpha bravo charlie delta echoes foxtrot golfer hotel";
        let six = "alpha bravo charlie delta echoes foxtrot";

        assert!((similarity(ten, eight) - 0.8).abs() < 1e-9);
        assert!((similarity(ten, six) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_content_hash_is_normalized() {
        let a = content_hash("Be still, and know that I am God.");
        let b = content_hash("be still and know that i am god");
        let c = content_hash("Be still and know.");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
