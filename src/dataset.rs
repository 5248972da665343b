// src/dataset.rs

//! Typed tabular inputs: the ratings table and the item metadata catalog.
//!
//! Both tables are read from CSV files with a header row. Column names follow
//! the MovieLens layout (`userId,movieId,rating` and `movieId,title,genres`);
//! extra columns such as `timestamp` are ignored.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::ThreadSafeStdError;

/// Placeholder MovieLens uses for an item without genre tags.
const NO_GENRES_PLACEHOLDER: &str = "(no genres listed)";
const GENRE_DELIMITER: char = '|';

/// One observed rating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "movieId")]
    pub item_id: i64,
    pub rating: f64,
}

/// One row of item metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemRecord {
    pub item_id: i64,
    pub title: String,
    pub genres: Vec<String>,
}

/// Row layout of the items CSV before the genre column is split.
#[derive(Debug, Deserialize)]
struct ItemCsvRow {
    #[serde(rename = "movieId")]
    item_id: i64,
    title: String,
    genres: String,
}

impl From<ItemCsvRow> for ItemRecord {
    fn from(row: ItemCsvRow) -> Self {
        Self {
            item_id: row.item_id,
            title: row.title,
            genres: split_genres(&row.genres),
        }
    }
}

/// Splits a `|`-delimited genre column into tags.
pub fn split_genres(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NO_GENRES_PLACEHOLDER {
        return Vec::new();
    }
    trimmed
        .split(GENRE_DELIMITER)
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect()
}

fn open_csv<P: AsRef<Path>>(path: P, what: &str) -> Result<BufReader<File>, ThreadSafeStdError> {
    let file = File::open(path.as_ref())
        .map_err(|e| format!("Failed to open {} file at {:?}: {}", what, path.as_ref(), e))?;
    Ok(BufReader::new(file))
}

/// The raw ratings table, validated at construction.
///
/// Row order is preserved exactly as read; it defines the first-seen ordering
/// of users and items in the utility matrix and the tie order of history samples.
#[derive(Debug, Clone)]
pub struct RatingsTable {
    records: Vec<RatingRecord>,
    rows_by_user: HashMap<i64, Vec<usize>>,
}

impl RatingsTable {
    /// Validates `records` and indexes them by user.
    ///
    /// # Errors
    /// Returns an error if the table is empty, a rating is not finite, or the
    /// same `(user, item)` pair is rated more than once.
    pub fn new(records: Vec<RatingRecord>) -> Result<Self, ThreadSafeStdError> {
        if records.is_empty() {
            return Err("Ratings table is empty.".into());
        }

        let mut seen_pairs: HashSet<(i64, i64)> = HashSet::with_capacity(records.len());
        let mut rows_by_user: HashMap<i64, Vec<usize>> = HashMap::new();
        for (row_idx, record) in records.iter().enumerate() {
            if !record.rating.is_finite() {
                return Err(format!(
                    "Ratings row {} (user {}, item {}) has a non-finite rating: {}",
                    row_idx, record.user_id, record.item_id, record.rating
                )
                .into());
            }
            if !seen_pairs.insert((record.user_id, record.item_id)) {
                return Err(format!(
                    "Ratings row {} duplicates an earlier rating of item {} by user {}.",
                    row_idx, record.item_id, record.user_id
                )
                .into());
            }
            rows_by_user.entry(record.user_id).or_default().push(row_idx);
        }

        debug!(
            "Ratings table validated: {} rows, {} distinct users.",
            records.len(),
            rows_by_user.len()
        );
        Ok(Self { records, rows_by_user })
    }

    /// Parses a ratings CSV (with header) from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ThreadSafeStdError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for (row_idx, row) in csv_reader.deserialize::<RatingRecord>().enumerate() {
            let record = row.map_err(|e| format!("Malformed ratings row {}: {}", row_idx, e))?;
            records.push(record);
        }
        Self::new(records)
    }

    /// Loads the ratings CSV at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ThreadSafeStdError> {
        let table = Self::from_reader(open_csv(&path, "ratings")?)?;
        info!("Loaded {} ratings from {:?}", table.len(), path.as_ref());
        Ok(table)
    }

    pub fn records(&self) -> &[RatingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_users(&self) -> usize {
        self.rows_by_user.len()
    }

    /// All rows of one user, in table order. Empty for an unknown user.
    pub fn rows_for_user(&self, user_id: i64) -> impl Iterator<Item = &RatingRecord> + '_ {
        self.rows_by_user
            .get(&user_id)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&row_idx| &self.records[row_idx])
    }
}

/// Item metadata keyed by item id.
///
/// When an id appears more than once the first row wins.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    items: Vec<ItemRecord>,
    position_by_id: HashMap<i64, usize>,
}

impl ItemCatalog {
    /// # Errors
    /// Returns an error if `items` is empty.
    pub fn new(items: Vec<ItemRecord>) -> Result<Self, ThreadSafeStdError> {
        if items.is_empty() {
            return Err("Item metadata table is empty.".into());
        }
        let mut kept = Vec::with_capacity(items.len());
        let mut position_by_id = HashMap::with_capacity(items.len());
        for item in items {
            if position_by_id.contains_key(&item.item_id) {
                warn!(
                    "Duplicate metadata row for item {} ({:?}); keeping the first one.",
                    item.item_id, item.title
                );
                continue;
            }
            position_by_id.insert(item.item_id, kept.len());
            kept.push(item);
        }
        Ok(Self { items: kept, position_by_id })
    }

    /// Parses an items CSV (with header) from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ThreadSafeStdError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut items = Vec::new();
        for (row_idx, row) in csv_reader.deserialize::<ItemCsvRow>().enumerate() {
            let row = row.map_err(|e| format!("Malformed items row {}: {}", row_idx, e))?;
            items.push(ItemRecord::from(row));
        }
        Self::new(items)
    }

    /// Loads the items CSV at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ThreadSafeStdError> {
        let catalog = Self::from_reader(open_csv(&path, "items")?)?;
        info!("Loaded {} items from {:?}", catalog.len(), path.as_ref());
        Ok(catalog)
    }

    pub fn get(&self, item_id: i64) -> Option<&ItemRecord> {
        self.position_by_id.get(&item_id).map(|&pos| &self.items[pos])
    }

    pub fn contains(&self, item_id: i64) -> bool {
        self.position_by_id.contains_key(&item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.iter()
    }
}
