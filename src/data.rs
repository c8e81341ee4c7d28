//! Interaction containers and the compressed binary mask built from them.
//!
//! An [`ObservationMask`] is a `num_rows x num_items` binary matrix stored
//! row-compressed: each row keeps the sorted column ids of its non-zero
//! entries. Train and test interactions, as well as negative-sampling
//! masks, are all represented this way.
use std::cmp::Ordering;
use std::convert::TryFrom;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{DataError, ItemId, UserId};

/// A single observed (user, item) pair.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct Interaction {
    user_id: UserId,
    item_id: ItemId,
}

impl Interaction {
    /// Build a new interaction.
    pub fn new(user_id: UserId, item_id: ItemId) -> Self {
        Interaction { user_id, item_id }
    }

    /// The user (row) id.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The item (column) id.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }
}

/// An unordered bag of interactions with a declared shape.
#[derive(Clone, Debug, Default)]
pub struct Interactions {
    num_users: usize,
    num_items: usize,
    interactions: Vec<Interaction>,
}

impl Interactions {
    /// Create an empty container for a `num_users x num_items` matrix.
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Interactions {
            num_users,
            num_items,
            interactions: Vec::new(),
        }
    }

    /// Add an interaction, rejecting ids outside the declared shape.
    pub fn push(&mut self, interaction: Interaction) -> Result<(), DataError> {
        if interaction.user_id >= self.num_users {
            return Err(DataError::UserOutOfBounds {
                user_id: interaction.user_id,
                num_users: self.num_users,
            });
        }
        if interaction.item_id >= self.num_items {
            return Err(DataError::ItemOutOfBounds {
                item_id: interaction.item_id,
                num_items: self.num_items,
            });
        }

        self.interactions.push(interaction);

        Ok(())
    }

    /// The raw interactions, in insertion order.
    pub fn data(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of stored interactions (duplicates included).
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether no interactions are stored.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// `(num_users, num_items)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_users, self.num_items)
    }

    /// Compress into a binary mask.
    pub fn to_mask(&self) -> ObservationMask {
        ObservationMask::from(self)
    }
}

impl From<Vec<Interaction>> for Interactions {
    fn from(data: Vec<Interaction>) -> Interactions {
        let num_users = data.iter().map(|x| x.user_id + 1).max().unwrap_or(0);
        let num_items = data.iter().map(|x| x.item_id + 1).max().unwrap_or(0);

        Interactions {
            num_users,
            num_items,
            interactions: data,
        }
    }
}

fn cmp_position(x: &Interaction, y: &Interaction) -> Ordering {
    x.user_id
        .cmp(&y.user_id)
        .then_with(|| x.item_id.cmp(&y.item_id))
}

/// Row-compressed binary matrix.
///
/// Row `r` owns `item_ids[row_pointers[r]..row_pointers[r + 1]]`, which is
/// strictly increasing and bounded by `num_items`. Deserialization checks
/// this layout and fails with a [`DataError`] otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMask")]
pub struct ObservationMask {
    num_rows: usize,
    num_items: usize,
    row_pointers: Vec<usize>,
    item_ids: Vec<ItemId>,
}

#[derive(Deserialize)]
struct RawMask {
    num_rows: usize,
    num_items: usize,
    row_pointers: Vec<usize>,
    item_ids: Vec<ItemId>,
}

impl TryFrom<RawMask> for ObservationMask {
    type Error = DataError;

    fn try_from(raw: RawMask) -> Result<Self, DataError> {
        let pointers = &raw.row_pointers;

        if pointers.len().checked_sub(1) != Some(raw.num_rows)
            || pointers[0] != 0
            || pointers[raw.num_rows] != raw.item_ids.len()
            || pointers.windows(2).any(|pair| pair[0] > pair[1])
        {
            return Err(DataError::InvalidRowPointers(raw.item_ids.len()));
        }

        for (row, bounds) in pointers.windows(2).enumerate() {
            let items = &raw.item_ids[bounds[0]..bounds[1]];

            if items.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(DataError::UnsortedRow(row));
            }
            if let Some(&item_id) = items.last() {
                if item_id >= raw.num_items {
                    return Err(DataError::ItemOutOfBounds {
                        item_id,
                        num_items: raw.num_items,
                    });
                }
            }
        }

        Ok(ObservationMask {
            num_rows: raw.num_rows,
            num_items: raw.num_items,
            row_pointers: raw.row_pointers,
            item_ids: raw.item_ids,
        })
    }
}

impl<'a> From<&'a Interactions> for ObservationMask {
    fn from(interactions: &Interactions) -> ObservationMask {
        let mut data = interactions.data().to_owned();

        data.sort_by(cmp_position);
        data.dedup();

        let mut row_pointers = vec![0; interactions.num_users + 1];
        let mut item_ids = Vec::with_capacity(data.len());

        for datum in &data {
            item_ids.push(datum.item_id);
            row_pointers[datum.user_id + 1] += 1;
        }

        for idx in 1..row_pointers.len() {
            row_pointers[idx] += row_pointers[idx - 1];
        }

        ObservationMask {
            num_rows: interactions.num_users,
            num_items: interactions.num_items,
            row_pointers,
            item_ids,
        }
    }
}

impl ObservationMask {
    /// An all-zero mask.
    pub fn empty(num_rows: usize, num_items: usize) -> Self {
        ObservationMask {
            num_rows,
            num_items,
            row_pointers: vec![0; num_rows + 1],
            item_ids: Vec::new(),
        }
    }

    /// Build a mask from per-row lists of observed items.
    ///
    /// Rows may be unsorted and contain duplicates.
    pub fn from_rows(num_items: usize, rows: Vec<Vec<ItemId>>) -> Result<Self, DataError> {
        let mut row_pointers = Vec::with_capacity(rows.len() + 1);
        let mut item_ids = Vec::with_capacity(rows.iter().map(Vec::len).sum());
        row_pointers.push(0);

        for mut row in rows {
            row.sort_unstable();
            row.dedup();

            if let Some(&item_id) = row.last() {
                if item_id >= num_items {
                    return Err(DataError::ItemOutOfBounds { item_id, num_items });
                }
            }

            item_ids.extend(row);
            row_pointers.push(item_ids.len());
        }

        Ok(ObservationMask {
            num_rows: row_pointers.len() - 1,
            num_items,
            row_pointers,
            item_ids,
        })
    }

    /// Build a mask from a dense array: any entry different from
    /// `A::default()` (zero for numeric types) counts as observed.
    pub fn from_dense<A>(dense: ArrayView2<A>) -> Self
    where
        A: Default + PartialEq,
    {
        let (num_rows, num_items) = dense.dim();
        let zero = A::default();

        let mut row_pointers = Vec::with_capacity(num_rows + 1);
        let mut item_ids = Vec::new();
        row_pointers.push(0);

        for row in dense.outer_iter() {
            item_ids.extend(
                row.iter()
                    .enumerate()
                    .filter(|&(_, value)| *value != zero)
                    .map(|(item_id, _)| item_id),
            );
            row_pointers.push(item_ids.len());
        }

        ObservationMask {
            num_rows,
            num_items,
            row_pointers,
            item_ids,
        }
    }

    /// Expand into a dense 0/1 matrix.
    pub fn to_dense(&self) -> Array2<u8> {
        let mut dense = Array2::zeros(self.shape());

        for row in self.iter_rows() {
            for &item_id in row.item_ids {
                dense[(row.row_id, item_id)] = 1;
            }
        }

        dense
    }

    pub(crate) fn from_row_vecs(num_items: usize, rows: Vec<Vec<ItemId>>) -> Self {
        let mut row_pointers = Vec::with_capacity(rows.len() + 1);
        row_pointers.push(0);

        for row in &rows {
            let last = row_pointers[row_pointers.len() - 1];
            row_pointers.push(last + row.len());
        }

        ObservationMask {
            num_rows: rows.len(),
            num_items,
            row_pointers,
            item_ids: rows.into_iter().flatten().collect(),
        }
    }

    /// The observed items of `row`, in increasing order.
    pub fn get_row(&self, row: usize) -> Option<&[ItemId]> {
        if row >= self.num_rows {
            return None;
        }

        let start = self.row_pointers[row];
        let stop = self.row_pointers[row + 1];

        Some(&self.item_ids[start..stop])
    }

    /// Whether entry `(row, item_id)` is set.
    pub fn contains(&self, row: usize, item_id: ItemId) -> bool {
        self.get_row(row)
            .map(|items| items.binary_search(&item_id).is_ok())
            .unwrap_or(false)
    }

    /// Iterate over all rows, including empty ones.
    pub fn iter_rows(&self) -> MaskRowIterator {
        MaskRowIterator {
            mask: self,
            idx: 0,
        }
    }

    /// Number of set entries.
    pub fn nnz(&self) -> usize {
        self.item_ids.len()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// `(num_rows, num_items)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.num_items)
    }
}

/// Iterator over the rows of an [`ObservationMask`].
pub struct MaskRowIterator<'a> {
    mask: &'a ObservationMask,
    idx: usize,
}

/// A borrowed row of an [`ObservationMask`].
#[derive(Debug, Clone, Copy)]
pub struct MaskRow<'a> {
    /// Row index.
    pub row_id: usize,
    /// Observed items, in increasing order.
    pub item_ids: &'a [ItemId],
}

impl<'a> Iterator for MaskRowIterator<'a> {
    type Item = MaskRow<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        let value = self.mask.get_row(self.idx).map(|item_ids| MaskRow {
            row_id: self.idx,
            item_ids,
        });

        self.idx += 1;

        value
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn compress_sorts_and_dedups() {
        let interactions = Interactions::from(vec![
            Interaction::new(1, 3),
            Interaction::new(0, 2),
            Interaction::new(1, 0),
            Interaction::new(1, 3),
        ]);

        let mask = interactions.to_mask();

        assert_eq!(mask.shape(), (2, 4));
        assert_eq!(mask.nnz(), 3);
        assert_eq!(mask.get_row(0), Some(&[2][..]));
        assert_eq!(mask.get_row(1), Some(&[0, 3][..]));
        assert_eq!(mask.get_row(2), None);
    }

    #[test]
    fn push_rejects_out_of_range_ids() {
        let mut interactions = Interactions::new(2, 3);

        assert!(interactions.push(Interaction::new(1, 2)).is_ok());
        assert_eq!(
            interactions.push(Interaction::new(2, 0)),
            Err(DataError::UserOutOfBounds {
                user_id: 2,
                num_users: 2
            })
        );
        assert_eq!(
            interactions.push(Interaction::new(0, 3)),
            Err(DataError::ItemOutOfBounds {
                item_id: 3,
                num_items: 3
            })
        );
        assert_eq!(interactions.len(), 1);
    }

    #[test]
    fn empty_rows_are_kept() {
        let mut interactions = Interactions::new(3, 2);
        interactions.push(Interaction::new(2, 1)).unwrap();

        let mask = interactions.to_mask();
        let rows: Vec<_> = mask.iter_rows().map(|row| row.item_ids.len()).collect();

        assert_eq!(rows, vec![0, 0, 1]);
    }

    #[test]
    fn dense_conversions_agree() {
        let dense = array![[0_u8, 1, 0, 1], [0, 0, 0, 0], [1, 1, 1, 1]];
        let mask = ObservationMask::from_dense(dense.view());

        assert_eq!(mask.nnz(), 6);
        assert!(mask.contains(0, 3));
        assert!(!mask.contains(1, 0));
        assert!(!mask.contains(7, 0));
        assert_eq!(mask.to_dense(), dense);

        let float_mask = ObservationMask::from_dense(array![[0.0_f32, 1.0], [1.0, 0.0]].view());
        assert_eq!(float_mask.get_row(1), Some(&[0][..]));
    }

    #[test]
    fn deserialization_round_trips() {
        let mask = ObservationMask::from_rows(5, vec![vec![4, 0], vec![], vec![2]]).unwrap();
        let json = serde_json::to_string(&mask).unwrap();

        assert_eq!(serde_json::from_str::<ObservationMask>(&json).unwrap(), mask);
    }

    #[test]
    fn deserialization_rejects_malformed_masks() {
        let parse = |json: &str| serde_json::from_str::<ObservationMask>(json);

        // Item past the declared width.
        assert!(parse(r#"{"num_rows":1,"num_items":3,"row_pointers":[0,1],"item_ids":[7]}"#).is_err());
        // Unsorted and duplicated items.
        assert!(parse(r#"{"num_rows":1,"num_items":3,"row_pointers":[0,2],"item_ids":[2,1]}"#).is_err());
        assert!(parse(r#"{"num_rows":1,"num_items":3,"row_pointers":[0,2],"item_ids":[1,1]}"#).is_err());
        // Pointers that do not cover the items, or have the wrong length.
        assert!(parse(r#"{"num_rows":1,"num_items":3,"row_pointers":[0,1],"item_ids":[0,1]}"#).is_err());
        assert!(parse(r#"{"num_rows":2,"num_items":3,"row_pointers":[0,1],"item_ids":[0]}"#).is_err());
        assert!(parse(r#"{"num_rows":2,"num_items":3,"row_pointers":[0,2,1],"item_ids":[0]}"#).is_err());
        assert!(parse(r#"{"num_rows":0,"num_items":3,"row_pointers":[],"item_ids":[]}"#).is_err());

        let raw = RawMask {
            num_rows: 1,
            num_items: 3,
            row_pointers: vec![0, 1],
            item_ids: vec![7],
        };
        assert_eq!(
            ObservationMask::try_from(raw),
            Err(DataError::ItemOutOfBounds {
                item_id: 7,
                num_items: 3
            })
        );
    }

    #[test]
    fn from_rows_validates_items() {
        let mask = ObservationMask::from_rows(4, vec![vec![3, 1, 1], vec![]]).unwrap();

        assert_eq!(mask.get_row(0), Some(&[1, 3][..]));
        assert_eq!(mask.shape(), (2, 4));

        assert_eq!(
            ObservationMask::from_rows(2, vec![vec![0, 2]]),
            Err(DataError::ItemOutOfBounds {
                item_id: 2,
                num_items: 2
            })
        );
    }
}
