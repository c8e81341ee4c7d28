#![deny(missing_docs)]
//! # recmetrics
//!
//! `recmetrics` scores a recommender's dense prediction matrix against held-out
//! interactions: for every user it picks the top candidates the user has not
//! already seen, computes Precision, Recall and NDCG at a set of cutoffs, and
//! averages the results over all users that have any held-out items.
//!
//! It also builds the negative-sampling masks used while training such models:
//! a fraction of each user's unobserved items is marked as observed so the
//! loss has something to contrast the positives against.
//!
//! ## Example
//!
//! ```rust
//! use ndarray::array;
//! use recmetrics::data::ObservationMask;
//! use recmetrics::evaluation::{evaluate, EvaluationConfig};
//! use recmetrics::sampling::NegativeSampler;
//!
//! let scores = array![[5.0_f32, 3.0, 1.0, 4.0, 2.0], [0.1, 0.9, 0.3, 0.2, 0.4]];
//! let train = ObservationMask::from_dense(array![[0_u8, 0, 0, 0, 0], [0, 1, 0, 0, 0]].view());
//! let test = ObservationMask::from_dense(array![[1_u8, 0, 0, 1, 0], [0, 0, 0, 0, 1]].view());
//!
//! let config = EvaluationConfig::new().cutoffs(vec![1, 5]).num_candidates(5);
//! let result = evaluate(scores.view(), &test, &train, &config).unwrap();
//!
//! assert_eq!(result.num_users, 2);
//! assert_eq!(result.precision[0], 1.0);
//!
//! let sampler = NegativeSampler::new(1.0).seed(42);
//! let augmented = sampler.sample(&train, &[1]).unwrap();
//! assert_eq!(augmented.get_row(1).unwrap().len(), 2);
//! ```
use failure::Fail;

pub mod data;
pub mod evaluation;
pub mod sampling;

/// Alias for user (row) indices.
pub type UserId = usize;
/// Alias for item (column) indices.
pub type ItemId = usize;

/// Errors raised while building interaction containers and masks.
#[derive(Debug, Fail, Clone, PartialEq, Eq)]
pub enum DataError {
    /// A user id does not fit the declared number of users.
    #[fail(display = "User id {} out of bounds for {} users.", user_id, num_users)]
    UserOutOfBounds {
        /// The offending id.
        user_id: UserId,
        /// Declared number of users.
        num_users: usize,
    },
    /// An item id does not fit the declared number of items.
    #[fail(display = "Item id {} out of bounds for {} items.", item_id, num_items)]
    ItemOutOfBounds {
        /// The offending id.
        item_id: ItemId,
        /// Declared number of items.
        num_items: usize,
    },
    /// Row pointers do not partition the stored item ids.
    #[fail(display = "Row pointers must start at 0, never decrease and end at {}.", _0)]
    InvalidRowPointers(usize),
    /// A row's item ids are not strictly increasing.
    #[fail(display = "Items of row {} are not strictly increasing.", _0)]
    UnsortedRow(usize),
}

/// Evaluation error types.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum EvaluationError {
    /// A mask does not have the same shape as the score matrix.
    #[fail(
        display = "Shape mismatch: {} mask is {:?}, scores are {:?}.",
        mask, actual, expected
    )]
    InvalidShape {
        /// Which mask was rejected.
        mask: &'static str,
        /// Shape of the score matrix.
        expected: (usize, usize),
        /// Shape of the mask.
        actual: (usize, usize),
    },
    /// The score matrix contains a NaN or infinite value.
    #[fail(display = "Invalid score for user {} and item {}: non-finite or not a number.", user_id, item_id)]
    NonFiniteScore {
        /// Row of the offending score.
        user_id: UserId,
        /// Column of the offending score.
        item_id: ItemId,
    },
    /// A cutoff is zero or larger than the number of ranked candidates.
    #[fail(display = "Cutoff {} must lie in 1..={}.", cutoff, num_candidates)]
    InvalidCutoff {
        /// The offending cutoff.
        cutoff: usize,
        /// Number of candidates ranked per user.
        num_candidates: usize,
    },
    /// Cutoffs are empty or not strictly increasing.
    #[fail(display = "Cutoffs must be a non-empty, strictly increasing list.")]
    InvalidCutoffOrder,
    /// Two metric accumulators were built for different cutoffs.
    #[fail(display = "Cannot merge metrics at cutoffs {:?} with {:?}.", _0, _1)]
    CutoffMismatch(Vec<usize>, Vec<usize>),
    /// Averaging was requested over zero evaluable users.
    #[fail(display = "Division by zero: no user has any held-out items.")]
    DivisionByZero,
}

/// Negative sampling error types.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum SamplingError {
    /// The ratio is negative, NaN or infinite.
    #[fail(display = "Negative sampling ratio must be finite and non-negative, got {}.", _0)]
    InvalidRatio(f64),
    /// A requested row does not exist in the mask.
    #[fail(display = "Row {} out of bounds for a mask with {} rows.", row, num_rows)]
    RowOutOfBounds {
        /// The offending row.
        row: usize,
        /// Number of rows in the mask.
        num_rows: usize,
    },
}
