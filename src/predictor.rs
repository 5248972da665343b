// src/predictor.rs

use log::debug;
use ndarray::{Array1, ArrayView1};
use serde::Serialize;
use std::fmt;

use crate::dataset::ItemCatalog;
use crate::trainer::LowRankModel;
use crate::utility_matrix::UtilityMatrix;

/// Score given to items the user already rated. Below every finite prediction,
/// so a masked item can never outrank or tie an unrated one.
pub const MASKED_SCORE: f64 = f64::NEG_INFINITY;

/// One ranked prediction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    pub item_id: i64,
    pub title: String,
    pub score: f64,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Score: {:.2})", self.title, self.score)
    }
}

/// Read-only view over a fitted model that turns reconstructed rows into
/// ranked recommendations.
#[derive(Debug, Clone, Copy)]
pub struct Predictor<'a> {
    model: &'a LowRankModel,
    matrix: &'a UtilityMatrix,
    catalog: &'a ItemCatalog,
}

impl<'a> Predictor<'a> {
    /// `model` must have been fitted on `matrix`.
    pub fn new(model: &'a LowRankModel, matrix: &'a UtilityMatrix, catalog: &'a ItemCatalog) -> Self {
        Self { model, matrix, catalog }
    }

    /// Reconstructed ratings for `user_id` with already-rated items set to
    /// [`MASKED_SCORE`]. `None` if the user is unknown.
    pub fn masked_scores(&self, user_id: i64) -> Option<Array1<f64>> {
        let user_position = self.matrix.users().position(user_id)?;
        let mut scores = self.model.predict_row(user_position)?;
        let original = self.matrix.values().row(user_position);
        scores
            .iter_mut()
            .zip(original.iter())
            .filter(|(_, &rated)| rated > 0.0)
            .for_each(|(score, _)| *score = MASKED_SCORE);
        Some(scores)
    }

    /// The `top_n` highest-scoring items `user_id` has not rated, best first.
    ///
    /// Returns `None` if the user is unknown. Ties keep item-column order.
    /// Selected items with no metadata row are dropped, so the result may be
    /// shorter than `top_n`.
    pub fn recommend(&self, user_id: i64, top_n: usize) -> Option<Vec<Recommendation>> {
        let scores = self.masked_scores(user_id)?;
        let ranked = rank_top_n(scores.view(), top_n);

        let mut recommendations = Vec::with_capacity(ranked.len());
        for (item_position, score) in ranked {
            let Some(item_id) = self.matrix.items().id_at(item_position) else {
                continue;
            };
            match self.catalog.get(item_id) {
                Some(item) => recommendations.push(Recommendation {
                    item_id,
                    title: item.title.clone(),
                    score,
                }),
                None => debug!("Skipping recommended item {} for user {}: no metadata.", item_id, user_id),
            }
        }
        Some(recommendations)
    }
}

/// Indices and scores of the `top_n` highest scores, descending.
/// Entries equal to [`MASKED_SCORE`] or NaN are never returned.
/// Equal scores keep ascending index order.
pub fn rank_top_n(scores: ArrayView1<'_, f64>, top_n: usize) -> Vec<(usize, f64)> {
    let mut candidates: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score != MASKED_SCORE && !score.is_nan())
        .map(|(idx, &score)| (idx, score))
        .collect();
    // Stable: ties stay in index order.
    candidates.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    candidates.truncate(top_n);
    candidates
}
