//! Sequence-matcher-style similarity ratio, used by DeepDiveEngine to suppress
//! near-duplicate follow-up questions (0.80 threshold).

/// Ratio `2*M / T` where `M` is the number of matching characters found by a greedy
/// longest-common-substring recursion and `T` is the total length of both strings.
/// Mirrors Python's `difflib.SequenceMatcher.ratio()` closely enough for the
/// duplicate-question threshold this is used for; not a general-purpose diff algorithm.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let matches = matching_blocks(&a, &b);
    let total = a.len() + b.len();
    if total == 0 { 0.0 } else { (2 * matches) as f64 / total as f64 }
}

fn matching_blocks(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (la, lb) = (a.len(), b.len());
    let mut dp = vec![0usize; lb + 1];
    let mut best = 0usize;
    for i in 0..la {
        let mut prev_diag = 0usize;
        for j in 0..lb {
            let temp = dp[j + 1];
            if a[i] == b[j] {
                dp[j + 1] = prev_diag + 1;
                best = best.max(dp[j + 1]);
            } else {
                dp[j + 1] = 0;
            }
            prev_diag = temp;
        }
    }
    // Single longest common substring underestimates true SequenceMatcher ratio for
    // strings with several disjoint matches; recurse on the remainders either side of
    // the best match found, matching difflib's recursive-block behavior closely enough
    // for a similarity threshold rather than an exact diff.
    if best == 0 {
        return 0;
    }
    let (mut ai, mut bi, mut size) = (0, 0, 0);
    let mut dp2 = vec![0usize; lb + 1];
    for i in 0..la {
        let mut prev_diag = 0usize;
        for j in 0..lb {
            let temp = dp2[j + 1];
            if a[i] == b[j] {
                dp2[j + 1] = prev_diag + 1;
                if dp2[j + 1] > size {
                    size = dp2[j + 1];
                    ai = i + 1 - size;
                    bi = j + 1 - size;
                }
            } else {
                dp2[j + 1] = 0;
            }
            prev_diag = temp;
        }
    }
    let left = matching_blocks(&a[..ai], &b[..bi]);
    let right = matching_blocks(&a[ai + size..], &b[bi + size..]);
    size + left + right
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_fully_similar() {
        assert!((ratio("how long has this been happening", "how long has this been happening") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_strings_have_low_ratio() {
        assert!(ratio("abc", "xyz") < 0.2);
    }

    #[test]
    fn near_duplicate_questions_cross_threshold() {
        let a = "Have you noticed any swelling or redness?";
        let b = "Have you noticed any swelling, redness, or warmth?";
        assert!(ratio(a, b) > 0.80);
    }
}
