// Rating-matrix recommender built on covariance PCA

#![doc = include_str!("../README.md")]

use std::error::Error;

pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod history;
pub mod linalg_backends;
pub mod predictor;
pub mod recommender;
pub mod trainer;
pub mod utility_matrix;

#[cfg(test)]
mod recommender_tests;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

pub use config::RecommenderConfig;
pub use dataset::{ItemCatalog, ItemRecord, RatingRecord, RatingsTable};
pub use diagnostics::FitDiagnostics;
pub use history::{HistoryEntry, UserHistory};
pub use predictor::{Predictor, Recommendation};
pub use recommender::Recommender;
pub use trainer::LowRankModel;
pub use utility_matrix::{IdentifierMap, UtilityMatrix};
