//! Deterministic top-K candidate selection.
use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::data::ObservationMask;
use crate::{EvaluationError, ItemId};

/// Penalty the training loop adds to the scores of already-seen items.
pub const EXCLUSION_PENALTY: f32 = -1e5;

/// An item together with the score it was ranked by.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    /// Column index of the item.
    pub item_id: ItemId,
    /// Model score.
    pub score: f32,
}

impl RankedItem {
    /// Ranking order: higher score first, lower item id first on ties.
    ///
    /// `-0.0` and `0.0` count as the same score.
    pub fn rank_cmp(&self, other: &RankedItem) -> Ordering {
        // Adding 0.0 maps -0.0 to 0.0, which total_cmp would otherwise order below it.
        (other.score + 0.0)
            .total_cmp(&(self.score + 0.0))
            .then_with(|| self.item_id.cmp(&other.item_id))
    }
}

/// Select the `count` best-scoring items of `scores`, skipping `excluded`.
///
/// `excluded` must be sorted in increasing order, as mask rows are. The
/// result is ordered by [`RankedItem::rank_cmp`] and holds
/// `min(count, scores.len() - excluded.len())` items.
pub fn select_top_candidates(
    scores: ArrayView1<f32>,
    excluded: &[ItemId],
    count: usize,
) -> Vec<RankedItem> {
    if count == 0 {
        return Vec::new();
    }

    let mut excluded = excluded.iter().peekable();
    let mut candidates = Vec::with_capacity(scores.len());

    for (item_id, &score) in scores.iter().enumerate() {
        while excluded.next_if(|&&next| next < item_id).is_some() {}

        if excluded.peek() == Some(&&item_id) {
            continue;
        }

        candidates.push(RankedItem { item_id, score });
    }

    if candidates.len() > count {
        candidates.select_nth_unstable_by(count - 1, RankedItem::rank_cmp);
        candidates.truncate(count);
    }

    candidates.sort_unstable_by(RankedItem::rank_cmp);

    candidates
}

/// Add [`EXCLUSION_PENALTY`] to every score whose entry in `mask` is set.
///
/// This is the bulk form of exclusion used when feeding a whole score
/// matrix to code that cannot take a mask.
///
/// Penalised items stay rankable, so this is not equivalent to passing the
/// mask to [`select_top_candidates`], which drops excluded items outright.
/// The two disagree when a row has fewer than `count` unexcluded items (the
/// penalised ones then fill the tail of the list, and can hit test items)
/// or when genuine scores fall below the penalty.
pub fn penalize_excluded(
    scores: ArrayView2<f32>,
    mask: &ObservationMask,
) -> Result<Array2<f32>, EvaluationError> {
    if mask.shape() != scores.dim() {
        return Err(EvaluationError::InvalidShape {
            mask: "exclusion",
            expected: scores.dim(),
            actual: mask.shape(),
        });
    }

    let mut penalized = scores.to_owned();

    for row in mask.iter_rows() {
        for &item_id in row.item_ids {
            penalized[(row.row_id, item_id)] += EXCLUSION_PENALTY;
        }
    }

    Ok(penalized)
}

#[cfg(test)]
mod tests {
    use ndarray::{array, aview1};

    use super::*;

    fn item_ids(ranked: &[RankedItem]) -> Vec<ItemId> {
        ranked.iter().map(|x| x.item_id).collect()
    }

    #[test]
    fn orders_by_descending_score() {
        let ranked = select_top_candidates(aview1(&[5.0, 3.0, 1.0, 4.0, 2.0]), &[], 5);

        assert_eq!(item_ids(&ranked), vec![0, 3, 1, 4, 2]);
        assert_eq!(ranked[1].score, 4.0);
    }

    #[test]
    fn breaks_ties_by_item_id() {
        let scores = [1.0, 2.0, 2.0, 1.0, 2.0, 0.0];

        assert_eq!(
            item_ids(&select_top_candidates(aview1(&scores), &[], 6)),
            vec![1, 2, 4, 0, 3, 5]
        );
        assert_eq!(
            item_ids(&select_top_candidates(aview1(&scores), &[], 2)),
            vec![1, 2]
        );
        assert_eq!(
            item_ids(&select_top_candidates(aview1(&scores), &[], 4)),
            vec![1, 2, 4, 0]
        );
    }

    #[test]
    fn skips_excluded_items() {
        let scores = [5.0, 3.0, 1.0, 4.0, 2.0];
        let ranked = select_top_candidates(aview1(&scores), &[0, 3], 2);

        assert_eq!(item_ids(&ranked), vec![1, 4]);

        let ranked = select_top_candidates(aview1(&scores), &[0, 1, 2, 3], 3);
        assert_eq!(item_ids(&ranked), vec![4]);
    }

    #[test]
    fn short_rows_return_everything() {
        let ranked = select_top_candidates(aview1(&[0.5, 0.25]), &[], 50);

        assert_eq!(item_ids(&ranked), vec![0, 1]);
        assert!(select_top_candidates(aview1(&[0.5, 0.25]), &[], 0).is_empty());
        assert!(select_top_candidates(aview1(&[] as &[f32]), &[], 3).is_empty());
    }

    #[test]
    fn signed_zeros_tie() {
        let ranked = select_top_candidates(aview1(&[-0.0, 0.0, 0.0]), &[], 3);
        assert_eq!(item_ids(&ranked), vec![0, 1, 2]);

        let ranked = select_top_candidates(aview1(&[0.0, 1.0, -0.0]), &[], 2);
        assert_eq!(item_ids(&ranked), vec![1, 0]);
    }

    #[test]
    fn penalty_keeps_excluded_items_rankable() {
        let scores = array![[3.0_f32, 2.0, 1.0]];
        let mask = ObservationMask::from_rows(3, vec![vec![0, 1]]).unwrap();
        let penalized = penalize_excluded(scores.view(), &mask).unwrap();

        let masked = select_top_candidates(scores.row(0), &[0, 1], 3);
        let bulk = select_top_candidates(penalized.row(0), &[], 3);

        assert_eq!(item_ids(&masked), vec![2]);
        assert_eq!(item_ids(&bulk), vec![2, 0, 1]);
    }

    #[test]
    fn negative_infinity_ranks_last() {
        let ranked = select_top_candidates(aview1(&[f32::NEG_INFINITY, -3.0, 7.0]), &[], 3);

        assert_eq!(item_ids(&ranked), vec![2, 1, 0]);
    }

    #[test]
    fn penalty_follows_mask() {
        let scores = array![[1.0_f32, 2.0], [3.0, 4.0]];
        let mask = ObservationMask::from_rows(2, vec![vec![1], vec![]]).unwrap();

        let penalized = penalize_excluded(scores.view(), &mask).unwrap();

        assert_eq!(penalized, array![[1.0, 2.0 + EXCLUSION_PENALTY], [3.0, 4.0]]);

        let wrong = ObservationMask::empty(3, 2);
        assert!(matches!(
            penalize_excluded(scores.view(), &wrong),
            Err(EvaluationError::InvalidShape { .. })
        ));
    }
}
