//! Trains a recommender on MovieLens-style CSV files and prints
//! recommendations and a rating history for one user.
//!
//! Usage: `cargo run --example recommend_demo -- <ratings.csv> <movies.csv> [user_id] [k]`
//! Set `RUST_LOG=info` (or `debug`) to see training progress.

use pca_recommender::{Recommender, RecommenderConfig, ThreadSafeStdError};
use std::env;

fn main() -> Result<(), ThreadSafeStdError> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let defaults = RecommenderConfig::default();
    let config = RecommenderConfig {
        ratings_path: args.get(1).map(Into::into).unwrap_or(defaults.ratings_path),
        items_path: args.get(2).map(Into::into).unwrap_or(defaults.items_path),
        n_components: match args.get(4) {
            Some(raw) => raw.parse()?,
            None => defaults.n_components,
        },
        ..RecommenderConfig::default()
    };
    let user_id: i64 = match args.get(3) {
        Some(raw) => raw.parse()?,
        None => 1,
    };

    let recommender = Recommender::initialize(&config)?;
    println!(
        "Trained on {} users x {} items with k={}",
        recommender.matrix().num_users(),
        recommender.matrix().num_items(),
        recommender.model().n_components()
    );

    match recommender.recommend_default(user_id) {
        Some(recs) => {
            println!("\nTop {} recommendations for user {}:", recs.len(), user_id);
            for rec in &recs {
                println!("  {}", rec);
            }
        }
        None => println!("\nUser {} not found.", user_id),
    }

    if let Some(history) = recommender.get_user_raw_data(user_id, 10) {
        println!("\n{}", history);
    }

    let diagnostics = recommender.diagnostics()?;
    println!(
        "\nExplained variance: {:.2}%",
        diagnostics.cumulative_explained_variance * 100.0
    );
    Ok(())
}
