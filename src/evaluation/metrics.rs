//! Binary-relevance ranking metrics at a single cutoff.
//!
//! All functions take the relevance of a ranked prediction list as a
//! `&[bool]`, where `relevance[i]` says whether the item at rank `i + 1`
//! is in the user's held-out set.

/// Discount applied to the gain at 1-indexed `position`: `log2(position + 1)`.
#[inline]
fn discount(position: usize) -> f64 {
    (position as f64 + 1.0).log2()
}

fn hits_at_k(relevance: &[bool], k: usize) -> usize {
    relevance.iter().take(k).filter(|&&relevant| relevant).count()
}

/// Discounted cumulative gain over the first `k` positions.
pub fn dcg_at_k(relevance: &[bool], k: usize) -> f64 {
    relevance
        .iter()
        .take(k)
        .enumerate()
        .filter(|&(_, &relevant)| relevant)
        .map(|(i, _)| 1.0 / discount(i + 1))
        .sum()
}

/// NDCG@k of `relevance` against the `ideal` ordering.
///
/// An ideal sequence shorter than `k` behaves as if padded with zeros.
/// Returns `None` when the ideal DCG is zero, i.e. there is nothing
/// relevant to retrieve.
pub fn ndcg_at_k(relevance: &[bool], ideal: &[bool], k: usize) -> Option<f64> {
    let idcg = dcg_at_k(ideal, k);

    if idcg == 0.0 {
        None
    } else {
        Some(dcg_at_k(relevance, k) / idcg)
    }
}

/// Fraction of the first `k` predictions that are relevant.
///
/// The denominator is always `k`, even when fewer than `k` predictions are
/// available. At `k = 1` this is an indicator.
pub fn precision_at_k(relevance: &[bool], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }

    hits_at_k(relevance, k) as f64 / k as f64
}

/// Fraction of the `num_relevant` held-out items found in the first `k`
/// predictions.
///
/// `num_relevant` is floored to 1, so an empty ground truth yields 0 rather
/// than a division by zero.
pub fn recall_at_k(relevance: &[bool], k: usize, num_relevant: usize) -> f64 {
    hits_at_k(relevance, k) as f64 / num_relevant.max(1) as f64
}

/// Harmonic mean of precision and recall; 0 when both are 0.
pub fn f_measure(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}
