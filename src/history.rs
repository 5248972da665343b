// src/history.rs

use log::debug;
use serde::Serialize;
use std::fmt;

use crate::dataset::{ItemCatalog, RatingsTable};
use crate::utility_matrix::IdentifierMap;

/// One rated item in a user's history sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub item_id: i64,
    pub title: String,
    pub rating: f64,
    pub genres: Vec<String>,
}

/// Descriptive statistics of one user's ratings plus their top-rated items.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserHistory {
    pub user_id: i64,
    /// Number of rows for this user in the ratings table.
    pub total: usize,
    /// Mean over those rows.
    pub mean: f64,
    /// Highest-rated items first, at most `limit` long.
    pub sample: Vec<HistoryEntry>,
}

impl fmt::Display for UserHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User {} | Total: {} | Mean: {:.2}", self.user_id, self.total, self.mean)?;
        for entry in &self.sample {
            write!(
                f,
                "\n| {} | Rating: {:?} | {} |",
                entry.title,
                entry.rating,
                entry.genres.join("|")
            )?;
        }
        Ok(())
    }
}

/// Builds per-user summaries straight from the raw tables.
#[derive(Debug, Clone, Copy)]
pub struct HistoryReporter<'a> {
    ratings: &'a RatingsTable,
    catalog: &'a ItemCatalog,
    users: &'a IdentifierMap,
}

impl<'a> HistoryReporter<'a> {
    /// `users` is the identifier map of the utility matrix built from `ratings`;
    /// it decides which user ids exist.
    pub fn new(ratings: &'a RatingsTable, catalog: &'a ItemCatalog, users: &'a IdentifierMap) -> Self {
        Self { ratings, catalog, users }
    }

    /// The user's rated items joined with metadata, highest rating first.
    /// Equal ratings keep ratings-table order; rows without metadata are skipped.
    /// `None` if the user is unknown.
    ///
    /// The ranking is recomputed on every call.
    pub fn ranked_entries(&self, user_id: i64) -> Option<impl Iterator<Item = HistoryEntry> + 'a> {
        if !self.users.contains(user_id) {
            return None;
        }
        let catalog = self.catalog;
        let mut joined: Vec<HistoryEntry> = self
            .ratings
            .rows_for_user(user_id)
            .filter_map(|record| match catalog.get(record.item_id) {
                Some(item) => Some(HistoryEntry {
                    item_id: record.item_id,
                    title: item.title.clone(),
                    rating: record.rating,
                    genres: item.genres.clone(),
                }),
                None => {
                    debug!("History of user {}: item {} has no metadata.", user_id, record.item_id);
                    None
                }
            })
            .collect();
        joined.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        Some(joined.into_iter())
    }

    /// Count, mean and the `limit` highest-rated items of `user_id`.
    /// `None` if the user is unknown.
    pub fn get_user_raw_data(&self, user_id: i64, limit: usize) -> Option<UserHistory> {
        let entries = self.ranked_entries(user_id)?;

        let (total, sum) = self
            .ratings
            .rows_for_user(user_id)
            .fold((0usize, 0.0f64), |(count, sum), record| (count + 1, sum + record.rating));
        let mean = if total > 0 { sum / total as f64 } else { f64::NAN };

        Some(UserHistory {
            user_id,
            total,
            mean,
            sample: entries.take(limit).collect(),
        })
    }
}
