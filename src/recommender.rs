// src/recommender.rs

//! The trained recommender context.
//!
//! Lifecycle: load the tables, build the utility matrix, fit the model, then
//! query. [`Recommender::initialize`] runs the whole sequence and either
//! returns a fully trained value or an error, so a half-trained model is never
//! observable. Once built, a `Recommender` is immutable and can be shared
//! across threads without locking.

use log::{debug, info};
use rayon::prelude::*;
use std::time::Instant;

use crate::config::RecommenderConfig;
use crate::dataset::{ItemCatalog, RatingsTable};
use crate::diagnostics::FitDiagnostics;
use crate::history::{HistoryReporter, UserHistory};
use crate::predictor::{Predictor, Recommendation};
use crate::trainer::LowRankModel;
use crate::utility_matrix::UtilityMatrix;
use crate::ThreadSafeStdError;

#[derive(Debug, Clone)]
pub struct Recommender {
    ratings: RatingsTable,
    catalog: ItemCatalog,
    matrix: UtilityMatrix,
    model: LowRankModel,
    default_top_n: usize,
    history_limit: usize,
}

impl Recommender {
    /// Loads both CSV files named by `config`, builds the utility matrix and
    /// fits the model with `config.n_components`.
    ///
    /// # Errors
    /// Any load, validation or fit failure aborts initialization.
    pub fn initialize(config: &RecommenderConfig) -> Result<Self, ThreadSafeStdError> {
        let start_time = Instant::now();
        config.validate()?;

        let ratings = RatingsTable::from_path(&config.ratings_path)?;
        let catalog = ItemCatalog::from_path(&config.items_path)?;
        let mut recommender = Self::fit(ratings, catalog, config.n_components)?;
        recommender.default_top_n = config.default_top_n;
        recommender.history_limit = config.history_limit;

        if log::log_enabled!(log::Level::Debug) {
            let diagnostics = recommender.diagnostics()?;
            debug!(
                "Fit diagnostics: explained variance {:.4}, relative reconstruction error {:.4}, orthogonality error {:.2e}",
                diagnostics.cumulative_explained_variance,
                diagnostics.relative_reconstruction_error,
                diagnostics.basis_orthogonality_error
            );
        }
        info!("Recommender initialized in {:?}", start_time.elapsed());
        Ok(recommender)
    }

    /// Builds the utility matrix from already-loaded tables and fits a model
    /// with `n_components` components.
    pub fn fit(ratings: RatingsTable, catalog: ItemCatalog, n_components: usize) -> Result<Self, ThreadSafeStdError> {
        let matrix = UtilityMatrix::build(&ratings, &catalog)?;
        let model = LowRankModel::fit(&matrix, n_components)?;
        let defaults = RecommenderConfig::default();
        Ok(Self {
            ratings,
            catalog,
            matrix,
            model,
            default_top_n: defaults.default_top_n,
            history_limit: defaults.history_limit,
        })
    }

    /// Retrains from scratch on the same tables with a different `n_components`.
    pub fn refit(&self, n_components: usize) -> Result<Self, ThreadSafeStdError> {
        let model = LowRankModel::fit(&self.matrix, n_components)?;
        Ok(Self {
            ratings: self.ratings.clone(),
            catalog: self.catalog.clone(),
            matrix: self.matrix.clone(),
            model,
            default_top_n: self.default_top_n,
            history_limit: self.history_limit,
        })
    }

    pub fn predictor(&self) -> Predictor<'_> {
        Predictor::new(&self.model, &self.matrix, &self.catalog)
    }

    pub fn history_reporter(&self) -> HistoryReporter<'_> {
        HistoryReporter::new(&self.ratings, &self.catalog, self.matrix.users())
    }

    /// Top `top_n` unrated items for `user_id`, best first. `None` if the
    /// user is unknown.
    pub fn recommend(&self, user_id: i64, top_n: usize) -> Option<Vec<Recommendation>> {
        self.predictor().recommend(user_id, top_n)
    }

    /// [`Self::recommend`] with the configured default `top_n`.
    pub fn recommend_default(&self, user_id: i64) -> Option<Vec<Recommendation>> {
        self.recommend(user_id, self.default_top_n)
    }

    /// Runs [`Self::recommend`] for every id in parallel. Output order matches `user_ids`.
    pub fn recommend_batch(&self, user_ids: &[i64], top_n: usize) -> Vec<(i64, Option<Vec<Recommendation>>)> {
        let predictor = self.predictor();
        user_ids
            .par_iter()
            .map(|&user_id| (user_id, predictor.recommend(user_id, top_n)))
            .collect()
    }

    /// Rating count, mean rating and the `limit` highest-rated items of
    /// `user_id`. `None` if the user is unknown.
    pub fn get_user_raw_data(&self, user_id: i64, limit: usize) -> Option<UserHistory> {
        self.history_reporter().get_user_raw_data(user_id, limit)
    }

    /// [`Self::get_user_raw_data`] with the configured default limit.
    pub fn history_default(&self, user_id: i64) -> Option<UserHistory> {
        self.get_user_raw_data(user_id, self.history_limit)
    }

    pub fn diagnostics(&self) -> Result<FitDiagnostics, ThreadSafeStdError> {
        FitDiagnostics::compute(&self.model, &self.matrix)
    }

    pub fn model(&self) -> &LowRankModel {
        &self.model
    }

    pub fn matrix(&self) -> &UtilityMatrix {
        &self.matrix
    }

    pub fn ratings(&self) -> &RatingsTable {
        &self.ratings
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }
}
