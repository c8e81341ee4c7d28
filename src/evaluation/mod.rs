//! Top-K evaluation of a dense score matrix against held-out interactions.
//!
//! For every user the evaluator ranks the items the user has not interacted
//! with during training, takes the best `num_candidates` of them and scores
//! that list against the user's test items at each cutoff. Users without
//! test items are skipped; everyone else contributes equally to the means.
//!
//! Evaluation is usually run one mini-batch of users at a time, so
//! [`evaluate_batch`] returns running [`MetricSums`] which can be merged
//! across batches and averaged at the end with [`MetricSums::aggregate`].
use itertools::izip;
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::ObservationMask;
use crate::{EvaluationError, ItemId};

pub mod metrics;
pub mod topk;

pub use self::metrics::{dcg_at_k, f_measure, ndcg_at_k, precision_at_k, recall_at_k};
pub use self::topk::{penalize_excluded, select_top_candidates, RankedItem, EXCLUSION_PENALTY};

/// Cutoffs reported by the training loop.
pub const DEFAULT_CUTOFFS: [usize; 5] = [1, 5, 10, 15, 50];
/// Number of candidates ranked per user.
pub const DEFAULT_NUM_CANDIDATES: usize = 50;

fn default_cutoffs() -> Vec<usize> {
    DEFAULT_CUTOFFS.to_vec()
}

fn default_num_candidates() -> usize {
    DEFAULT_NUM_CANDIDATES
}

/// Evaluation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_cutoffs")]
    cutoffs: Vec<usize>,
    #[serde(default = "default_num_candidates")]
    num_candidates: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            cutoffs: default_cutoffs(),
            num_candidates: default_num_candidates(),
        }
    }
}

impl EvaluationConfig {
    /// Default settings: cutoffs 1, 5, 10, 15 and 50 over 50 candidates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cutoffs. They must be strictly increasing.
    pub fn cutoffs(mut self, cutoffs: Vec<usize>) -> Self {
        self.cutoffs = cutoffs;
        self
    }

    /// Set the number of top candidates ranked per user.
    pub fn num_candidates(mut self, num_candidates: usize) -> Self {
        self.num_candidates = num_candidates;
        self
    }

    /// The configured cutoffs.
    pub fn get_cutoffs(&self) -> &[usize] {
        &self.cutoffs
    }

    /// The configured number of candidates.
    pub fn get_num_candidates(&self) -> usize {
        self.num_candidates
    }

    /// Check that the cutoffs are usable with this number of candidates.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.cutoffs.is_empty() || self.cutoffs.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EvaluationError::InvalidCutoffOrder);
        }

        match self
            .cutoffs
            .iter()
            .find(|&&cutoff| cutoff == 0 || cutoff > self.num_candidates)
        {
            Some(&cutoff) => Err(EvaluationError::InvalidCutoff {
                cutoff,
                num_candidates: self.num_candidates,
            }),
            None => Ok(()),
        }
    }
}

/// Metrics of a single user, one entry per cutoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserResult {
    /// Precision at each cutoff.
    pub precision: Vec<f64>,
    /// Recall at each cutoff.
    pub recall: Vec<f64>,
    /// NDCG at each cutoff.
    pub ndcg: Vec<f64>,
}

/// Evaluate one user.
///
/// `train_items` are excluded from the ranking and `test_items` are the
/// ground truth; both must be sorted, as mask rows are. Returns `None` when
/// the user has no test items and therefore cannot be evaluated.
pub fn evaluate_user(
    scores: ArrayView1<f32>,
    train_items: &[ItemId],
    test_items: &[ItemId],
    config: &EvaluationConfig,
) -> Option<UserResult> {
    if test_items.is_empty() {
        return None;
    }

    let ranked = select_top_candidates(scores, train_items, config.num_candidates);
    let relevance: Vec<bool> = ranked
        .iter()
        .map(|candidate| test_items.binary_search(&candidate.item_id).is_ok())
        .collect();
    let ideal = vec![true; test_items.len()];

    let num_cutoffs = config.cutoffs.len();
    let mut result = UserResult {
        precision: Vec::with_capacity(num_cutoffs),
        recall: Vec::with_capacity(num_cutoffs),
        ndcg: Vec::with_capacity(num_cutoffs),
    };

    for &k in &config.cutoffs {
        result.precision.push(precision_at_k(&relevance, k));
        result
            .recall
            .push(recall_at_k(&relevance, k, test_items.len()));
        // The ideal sequence is non-empty here, so the ratio is defined.
        result
            .ndcg
            .push(ndcg_at_k(&relevance, &ideal, k).unwrap_or(0.0));
    }

    Some(result)
}

/// Per-cutoff metric sums over the users evaluated so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSums {
    /// Cutoffs the sums are indexed by.
    pub cutoffs: Vec<usize>,
    /// Summed precision.
    pub precision: Vec<f64>,
    /// Summed recall.
    pub recall: Vec<f64>,
    /// Summed NDCG.
    pub ndcg: Vec<f64>,
    /// Number of evaluable users included in the sums.
    pub num_users: usize,
}

impl MetricSums {
    /// Zero sums for the given cutoffs.
    pub fn new(cutoffs: &[usize]) -> Self {
        MetricSums {
            cutoffs: cutoffs.to_vec(),
            precision: vec![0.0; cutoffs.len()],
            recall: vec![0.0; cutoffs.len()],
            ndcg: vec![0.0; cutoffs.len()],
            num_users: 0,
        }
    }

    /// Add a single user's metrics.
    pub fn add(&mut self, user: &UserResult) {
        for (sum, value) in self.precision.iter_mut().zip(&user.precision) {
            *sum += value;
        }
        for (sum, value) in self.recall.iter_mut().zip(&user.recall) {
            *sum += value;
        }
        for (sum, value) in self.ndcg.iter_mut().zip(&user.ndcg) {
            *sum += value;
        }

        self.num_users += 1;
    }

    /// Fold in the sums of another batch evaluated with the same cutoffs.
    pub fn merge(&mut self, other: &MetricSums) -> Result<(), EvaluationError> {
        if self.cutoffs != other.cutoffs {
            return Err(EvaluationError::CutoffMismatch(
                self.cutoffs.clone(),
                other.cutoffs.clone(),
            ));
        }

        for (precision, recall, ndcg, other_precision, other_recall, other_ndcg) in izip!(
            self.precision.iter_mut(),
            self.recall.iter_mut(),
            self.ndcg.iter_mut(),
            &other.precision,
            &other.recall,
            &other.ndcg
        ) {
            *precision += other_precision;
            *recall += other_recall;
            *ndcg += other_ndcg;
        }

        self.num_users += other.num_users;

        Ok(())
    }

    /// Average the sums over the evaluable users and derive F-measures.
    ///
    /// Fails with [`EvaluationError::DivisionByZero`] if no user was
    /// evaluable.
    pub fn aggregate(&self) -> Result<AggregateResult, EvaluationError> {
        if self.num_users == 0 {
            return Err(EvaluationError::DivisionByZero);
        }

        let precision = mean(&self.precision, self.num_users);
        let recall = mean(&self.recall, self.num_users);
        let f_measure = precision
            .iter()
            .zip(&recall)
            .map(|(&p, &r)| metrics::f_measure(p, r))
            .collect();

        Ok(AggregateResult {
            cutoffs: self.cutoffs.clone(),
            precision,
            recall,
            f_measure,
            ndcg: mean(&self.ndcg, self.num_users),
            num_users: self.num_users,
        })
    }
}

fn mean(sums: &[f64], num_users: usize) -> Vec<f64> {
    sums.iter().map(|sum| sum / num_users as f64).collect()
}

/// Mean metrics over all evaluable users, one entry per cutoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Cutoffs the vectors are indexed by.
    pub cutoffs: Vec<usize>,
    /// Mean precision.
    pub precision: Vec<f64>,
    /// Mean recall.
    pub recall: Vec<f64>,
    /// Harmonic mean of the mean precision and mean recall.
    pub f_measure: Vec<f64>,
    /// Mean NDCG.
    pub ndcg: Vec<f64>,
    /// Number of users averaged over.
    pub num_users: usize,
}

/// All metrics at one cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CutoffMetrics {
    /// The cutoff.
    pub cutoff: usize,
    /// Mean precision.
    pub precision: f64,
    /// Mean recall.
    pub recall: f64,
    /// F-measure of the means.
    pub f_measure: f64,
    /// Mean NDCG.
    pub ndcg: f64,
}

impl AggregateResult {
    /// Metrics at cutoff `k`, if it was evaluated.
    pub fn metrics_at(&self, k: usize) -> Option<CutoffMetrics> {
        let idx = self.cutoffs.iter().position(|&cutoff| cutoff == k)?;

        Some(self.metrics_at_index(idx))
    }

    /// Metrics for every cutoff, in cutoff order.
    pub fn iter(&self) -> impl Iterator<Item = CutoffMetrics> + '_ {
        (0..self.cutoffs.len()).map(move |idx| self.metrics_at_index(idx))
    }

    fn metrics_at_index(&self, idx: usize) -> CutoffMetrics {
        CutoffMetrics {
            cutoff: self.cutoffs[idx],
            precision: self.precision[idx],
            recall: self.recall[idx],
            f_measure: self.f_measure[idx],
            ndcg: self.ndcg[idx],
        }
    }
}

fn check_shape(
    mask: &ObservationMask,
    name: &'static str,
    expected: (usize, usize),
) -> Result<(), EvaluationError> {
    if mask.shape() == expected {
        Ok(())
    } else {
        Err(EvaluationError::InvalidShape {
            mask: name,
            expected,
            actual: mask.shape(),
        })
    }
}

/// Evaluate every user (row) of `scores`.
///
/// `test` holds the ground truth and `train` the items to exclude from the
/// ranking; both must have the same shape as `scores`. Users are evaluated
/// in parallel but summed in row order, so the result does not depend on
/// thread scheduling.
pub fn evaluate_batch(
    scores: ArrayView2<f32>,
    test: &ObservationMask,
    train: &ObservationMask,
    config: &EvaluationConfig,
) -> Result<MetricSums, EvaluationError> {
    config.validate()?;
    check_shape(test, "test", scores.dim())?;
    check_shape(train, "train", scores.dim())?;

    if let Some(((user_id, item_id), _)) = scores.indexed_iter().find(|(_, score)| !score.is_finite()) {
        return Err(EvaluationError::NonFiniteScore { user_id, item_id });
    }

    let num_users = scores.nrows();
    let results: Vec<Option<UserResult>> = (0..num_users)
        .into_par_iter()
        .map(|user_id| {
            let train_items = train.get_row(user_id).unwrap_or(&[]);
            let test_items = test.get_row(user_id).unwrap_or(&[]);

            evaluate_user(scores.row(user_id), train_items, test_items, config)
        })
        .collect();

    let mut sums = MetricSums::new(&config.cutoffs);

    for (user_id, result) in results.iter().enumerate() {
        match result {
            Some(result) => sums.add(result),
            None => tracing::trace!(user_id, "skipping user without test items"),
        }
    }

    tracing::debug!(
        num_users,
        evaluable = sums.num_users,
        skipped = num_users - sums.num_users,
        "evaluated batch"
    );

    Ok(sums)
}

/// Evaluate a single batch and average it.
pub fn evaluate(
    scores: ArrayView2<f32>,
    test: &ObservationMask,
    train: &ObservationMask,
    config: &EvaluationConfig,
) -> Result<AggregateResult, EvaluationError> {
    evaluate_batch(scores, test, train, config)?.aggregate()
}
