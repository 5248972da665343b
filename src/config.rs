// src/config.rs

use std::path::PathBuf;

use crate::ThreadSafeStdError;

/// Inputs and parameters for building a [`crate::Recommender`].
#[derive(Clone, Debug)]
pub struct RecommenderConfig {
    /// CSV with `userId,movieId,rating` columns.
    pub ratings_path: PathBuf,
    /// CSV with `movieId,title,genres` columns.
    pub items_path: PathBuf,
    /// Number of principal components (k). Must be at most the number of rated items.
    pub n_components: usize,
    /// `top_n` used by `recommend_default`.
    pub default_top_n: usize,
    /// `limit` used by `history_default`.
    pub history_limit: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            ratings_path: PathBuf::from("data/ratings.csv"),
            items_path: PathBuf::from("data/movies.csv"),
            n_components: 20,
            default_top_n: 5,
            history_limit: 100,
        }
    }
}

impl RecommenderConfig {
    /// Checks the parameters that can be validated before any data is loaded.
    /// The upper bound on `n_components` is checked at fit time.
    pub fn validate(&self) -> Result<(), ThreadSafeStdError> {
        if self.n_components == 0 {
            return Err("n_components must be greater than 0.".into());
        }
        if self.default_top_n == 0 {
            return Err("default_top_n must be greater than 0.".into());
        }
        if self.history_limit == 0 {
            return Err("history_limit must be greater than 0.".into());
        }
        Ok(())
    }
}
