//! Assertions over collected pipeline output.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Assert equal length and element-wise equality, in order.
///
/// # Panics
///
/// Panics with both collections in the message when they differ.
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: expected {}, got {}\n  expected: {expected:?}\n  actual:   {actual:?}",
        expected.len(),
        actual.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a, e, "mismatch at index {i}\n  expected: {expected:?}\n  actual:   {actual:?}");
    }
}

/// Assert the same elements with the same multiplicities, in any order.
///
/// Fan-in and fan-out give no cross-branch ordering, so output collected
/// after a merge point should usually be compared with this.
///
/// # Panics
///
/// Panics listing missing and unexpected elements when they differ.
pub fn assert_collections_unordered_equal<T: Debug + Eq + Hash>(actual: &[T], expected: &[T]) {
    let mut counts: HashMap<&T, i64> = HashMap::new();
    for e in expected {
        *counts.entry(e).or_default() += 1;
    }
    for a in actual {
        *counts.entry(a).or_default() -= 1;
    }
    let missing: Vec<&&T> = counts.iter().filter(|(_, n)| **n > 0).map(|(k, _)| k).collect();
    let extra: Vec<&&T> = counts.iter().filter(|(_, n)| **n < 0).map(|(k, _)| k).collect();
    assert!(
        missing.is_empty() && extra.is_empty(),
        "content mismatch\n  missing: {missing:?}\n  unexpected: {extra:?}\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
}

/// Assert that every element satisfies `pred`.
///
/// # Panics
///
/// Panics naming the first failing element.
pub fn assert_all<T: Debug>(items: &[T], pred: impl Fn(&T) -> bool) {
    if let Some((i, bad)) = items.iter().enumerate().find(|(_, x)| !pred(x)) {
        panic!("element {i} does not satisfy the predicate: {bad:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_respects_duplicates() {
        assert_collections_unordered_equal(&[2, 1, 2], &[1, 2, 2]);
    }

    #[test]
    #[should_panic(expected = "content mismatch")]
    fn unordered_detects_missing_duplicate() {
        assert_collections_unordered_equal(&[1, 2, 3], &[1, 2, 2]);
    }
}
