//! Negative sampling masks for training.
//!
//! For each selected row a number of unobserved items proportional to the
//! row's observed items is drawn uniformly without replacement and marked as
//! observed in a fresh copy of the mask.
//!
//! Every row draws from its own `XorShiftRng`, seeded by hashing the row
//! index with the sampler's seed. Rows can therefore be sampled in parallel,
//! and the negatives drawn for a row do not depend on which other rows were
//! requested alongside it.
use std::hash::Hasher;

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher;

use crate::data::ObservationMask;
use crate::{ItemId, SamplingError};

const ROW_STREAM_KEY: u64 = 0x9e37_79b9_7f4a_7c15;

/// Number of negatives to draw for a row.
///
/// `floor(num_observed * ratio)`, clamped to the unobserved items available
/// and raised to at least one. A row with no unobserved items gets none.
pub fn negative_count(num_observed: usize, num_unobserved: usize, ratio: f64) -> usize {
    let target = (num_observed as f64 * ratio).floor() as usize;

    target.min(num_unobserved).max(1).min(num_unobserved)
}

/// Draws negative samples into an [`ObservationMask`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegativeSampler {
    ratio: f64,
    seed: u64,
}

impl NegativeSampler {
    /// Build a sampler drawing `ratio` negatives per observed item, seeded
    /// from the thread RNG.
    pub fn new(ratio: f64) -> Self {
        NegativeSampler {
            ratio,
            seed: rand::thread_rng().gen(),
        }
    }

    /// Set the seed, making sampling reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Negatives drawn per observed item.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// The seed all row streams derive from.
    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    fn row_rng(&self, row: usize) -> XorShiftRng {
        let mut hasher = SipHasher::new_with_keys(self.seed, ROW_STREAM_KEY);
        hasher.write_usize(row);

        XorShiftRng::seed_from_u64(hasher.finish())
    }

    /// Return a copy of `mask` where every row in `rows` additionally has
    /// its sampled negatives set.
    ///
    /// Rows not listed are copied unchanged; a row listed more than once is
    /// sampled once. With a ratio of zero the copy is identical to `mask`.
    pub fn sample(
        &self,
        mask: &ObservationMask,
        rows: &[usize],
    ) -> Result<ObservationMask, SamplingError> {
        if !self.ratio.is_finite() || self.ratio < 0.0 {
            return Err(SamplingError::InvalidRatio(self.ratio));
        }

        if let Some(&row) = rows.iter().find(|&&row| row >= mask.num_rows()) {
            return Err(SamplingError::RowOutOfBounds {
                row,
                num_rows: mask.num_rows(),
            });
        }

        if self.ratio == 0.0 {
            return Ok(mask.clone());
        }

        let mut selected = vec![false; mask.num_rows()];
        for &row in rows {
            selected[row] = true;
        }

        let num_items = mask.num_items();
        let sampled_rows: Vec<Vec<ItemId>> = mask
            .iter_rows()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|row| {
                if selected[row.row_id] {
                    let mut rng = self.row_rng(row.row_id);
                    add_negatives(row.item_ids, num_items, self.ratio, &mut rng)
                } else {
                    row.item_ids.to_vec()
                }
            })
            .collect();

        let sampled = ObservationMask::from_row_vecs(num_items, sampled_rows);

        tracing::debug!(
            rows = selected.iter().filter(|&&x| x).count(),
            negatives = sampled.nnz() - mask.nnz(),
            ratio = self.ratio,
            "sampled negatives"
        );

        Ok(sampled)
    }
}

fn unobserved_items(observed: &[ItemId], num_items: usize) -> Vec<ItemId> {
    let mut observed = observed.iter().peekable();

    (0..num_items)
        .filter(|&item_id| {
            while observed.next_if(|&&next| next < item_id).is_some() {}
            observed.peek() != Some(&&item_id)
        })
        .collect()
}

fn add_negatives<R: Rng>(
    observed: &[ItemId],
    num_items: usize,
    ratio: f64,
    rng: &mut R,
) -> Vec<ItemId> {
    let unobserved = unobserved_items(observed, num_items);
    let count = negative_count(observed.len(), unobserved.len(), ratio);

    let mut row = Vec::with_capacity(observed.len() + count);
    row.extend_from_slice(observed);
    row.extend(
        index::sample(rng, unobserved.len(), count)
            .into_iter()
            .map(|idx| unobserved[idx]),
    );
    row.sort_unstable();

    row
}
