// src/utility_matrix.rs

use log::{debug, info, warn};
use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;
use std::time::Instant;

use crate::dataset::{ItemCatalog, RatingsTable};
use crate::ThreadSafeStdError;

/// Bidirectional mapping between external identifiers and matrix positions.
///
/// Positions follow the first-seen order of identifiers in the ratings table.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    ids: Vec<i64>,
    position_by_id: HashMap<i64, usize>,
}

impl IdentifierMap {
    /// Registers `id` if unseen and returns its position.
    fn intern(&mut self, id: i64) -> usize {
        if let Some(&pos) = self.position_by_id.get(&id) {
            return pos;
        }
        let pos = self.ids.len();
        self.ids.push(id);
        self.position_by_id.insert(id, pos);
        pos
    }

    pub fn position(&self, id: i64) -> Option<usize> {
        self.position_by_id.get(&id).copied()
    }

    pub fn id_at(&self, position: usize) -> Option<i64> {
        self.ids.get(position).copied()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn contains(&self, id: i64) -> bool {
        self.position_by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Dense users × items rating matrix.
///
/// Cells with no observed rating hold `0.0`, so "unrated" and "rated zero"
/// are indistinguishable here. The identifier maps are built in the same pass
/// as the values and are never rebuilt separately.
#[derive(Debug, Clone)]
pub struct UtilityMatrix {
    values: Array2<f64>,
    users: IdentifierMap,
    items: IdentifierMap,
}

impl UtilityMatrix {
    /// Pivots `ratings` into a dense matrix.
    ///
    /// `catalog` is only consulted to report rated items that have no
    /// metadata; such items still get a column.
    pub fn build(ratings: &RatingsTable, catalog: &ItemCatalog) -> Result<Self, ThreadSafeStdError> {
        let start_time = Instant::now();
        if ratings.is_empty() {
            return Err("Cannot build a utility matrix from an empty ratings table.".into());
        }

        let mut users = IdentifierMap::default();
        let mut items = IdentifierMap::default();
        let mut cells: Vec<(usize, usize, f64)> = Vec::with_capacity(ratings.len());
        for record in ratings.records() {
            let row = users.intern(record.user_id);
            let col = items.intern(record.item_id);
            cells.push((row, col, record.rating));
        }

        let mut values = Array2::<f64>::zeros((users.len(), items.len()));
        for (row, col, rating) in cells {
            values[[row, col]] = rating;
        }

        let missing_metadata = items.ids().iter().filter(|&&id| !catalog.contains(id)).count();
        if missing_metadata > 0 {
            warn!(
                "{} of {} rated items have no metadata row; they will be skipped in results.",
                missing_metadata,
                items.len()
            );
        }

        let filled = ratings.len() as f64 / (users.len() * items.len()) as f64;
        debug!("Utility matrix fill ratio: {:.4}", filled);
        info!(
            "Built utility matrix ({} users x {} items) in {:?}",
            users.len(),
            items.len(),
            start_time.elapsed()
        );
        Ok(Self { values, users, items })
    }

    /// Builds a matrix directly from values and id lists, in row/column order.
    ///
    /// # Errors
    /// Returns an error if the id lists do not match the matrix shape or contain duplicates.
    pub fn from_parts(values: Array2<f64>, user_ids: &[i64], item_ids: &[i64]) -> Result<Self, ThreadSafeStdError> {
        if values.nrows() != user_ids.len() || values.ncols() != item_ids.len() {
            return Err(format!(
                "Matrix shape {:?} does not match {} user ids and {} item ids.",
                values.dim(),
                user_ids.len(),
                item_ids.len()
            )
            .into());
        }
        if values.is_empty() {
            return Err("Utility matrix has zero users or zero items.".into());
        }
        let mut users = IdentifierMap::default();
        for &id in user_ids {
            if users.contains(id) {
                return Err(format!("Duplicate user id {} in user id list.", id).into());
            }
            users.intern(id);
        }
        let mut items = IdentifierMap::default();
        for &id in item_ids {
            if items.contains(id) {
                return Err(format!("Duplicate item id {} in item id list.", id).into());
            }
            items.intern(id);
        }
        Ok(Self { values, users, items })
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn users(&self) -> &IdentifierMap {
        &self.users
    }

    pub fn items(&self) -> &IdentifierMap {
        &self.items
    }

    pub fn num_users(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_items(&self) -> usize {
        self.values.ncols()
    }

    /// The stored ratings of one user, or `None` for an unknown user.
    pub fn user_row(&self, user_id: i64) -> Option<ArrayView1<'_, f64>> {
        self.users.position(user_id).map(|row| self.values.row(row))
    }
}
