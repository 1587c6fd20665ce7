//! Draft-to-draft similarity.

use std::collections::HashSet;

/// Word-set Jaccard similarity in `[0.0, 1.0]`.
///
/// Words are lowercase alphanumeric runs. Two texts with no words at all
/// are identical (`1.0`); one empty text against a non-empty one is `0.0`.
///
/// # Panics
///
/// This function never panics.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let left = words(a);
    let right = words(b);

    if left.is_empty() && right.is_empty() {
        return 1.0;
    }

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
