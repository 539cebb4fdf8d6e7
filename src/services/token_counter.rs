//! Deterministic token counting (§4.3). No BPE table ships in this environment, so the
//! word-count fallback is the primary (not a degraded) implementation; callers depend
//! only on the `count(text) -> usize` contract, so a real tokenizer can replace this
//! without touching call sites.

/// `ceil(word_count * 1.3)`.
pub fn count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    ((words as f64) * 1.3).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_scale_with_word_count() {
        assert_eq!(count(""), 0);
        assert_eq!(count("one two three four five"), 7);
    }

    #[test]
    fn rounds_up_fractional_estimates() {
        assert_eq!(count("one two three"), 4);
    }
}
