use crate::dataset::{ItemCatalog, ItemRecord, RatingRecord, RatingsTable};
use crate::predictor::MASKED_SCORE;
use crate::recommender::Recommender;
use crate::trainer::LowRankModel;
use crate::utility_matrix::UtilityMatrix;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const TOLERANCE: f64 = 1e-8;

/// Random MovieLens-like data: every user rates roughly `density` of the
/// items with half-star ratings, and always at least one item.
fn generate_random_ratings(n_users: usize, n_items: usize, density: f64, seed: u64) -> (RatingsTable, ItemCatalog) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut records = Vec::new();
    for user in 0..n_users {
        let user_id = (user + 1) as i64;
        let mut rated_any = false;
        for item in 0..n_items {
            if rng.gen_bool(density) {
                let half_stars: u32 = rng.gen_range(1..=10);
                records.push(RatingRecord {
                    user_id,
                    item_id: ((item + 1) * 10) as i64,
                    rating: half_stars as f64 * 0.5,
                });
                rated_any = true;
            }
        }
        if !rated_any {
            records.push(RatingRecord { user_id, item_id: 10, rating: 3.0 });
        }
    }
    let items = (0..n_items)
        .map(|item| ItemRecord {
            item_id: ((item + 1) * 10) as i64,
            title: format!("Movie {}", item + 1),
            genres: vec!["Drama".to_string()],
        })
        .collect();
    (RatingsTable::new(records).unwrap(), ItemCatalog::new(items).unwrap())
}

fn centered(matrix: &UtilityMatrix, model: &LowRankModel) -> Array2<f64> {
    matrix.values() - model.mean()
}

// Helper for comparing matrices allowing for a sign flip per column
fn assert_columns_close_up_to_sign(a: ArrayView2<f64>, b: ArrayView2<f64>, tolerance: f64, context: &str) {
    assert_eq!(a.dim(), b.dim(), "Dimension mismatch for {}", context);
    for c in 0..a.ncols() {
        let col_a = a.column(c);
        let col_b = b.column(c);
        let direct = col_a.iter().zip(col_b.iter()).all(|(x, y)| (x - y).abs() < tolerance);
        let flipped = col_a.iter().zip(col_b.iter()).all(|(x, y)| (x + y).abs() < tolerance);
        assert!(
            direct || flipped,
            "Column {} differs beyond sign for {}:\n{:?}\nvs\n{:?}",
            c,
            context,
            col_a,
            col_b
        );
    }
}

#[test]
fn test_reconstruction_error_is_monotone_in_k() {
    let (ratings, catalog) = generate_random_ratings(25, 10, 0.4, 42);
    let matrix = UtilityMatrix::build(&ratings, &catalog).unwrap();
    let n_items = matrix.num_items();

    let mut previous = f64::INFINITY;
    for k in 1..=n_items {
        let model = LowRankModel::fit(&matrix, k).unwrap();
        let error = model.reconstruction_error(&matrix).unwrap();
        println!("k={} reconstruction error={:.6}", k, error);
        assert!(
            error <= previous + TOLERANCE,
            "Reconstruction error increased from {} to {} at k={}",
            previous,
            error,
            k
        );
        previous = error;
    }
}

#[test]
fn test_full_rank_reproduces_centered_matrix() {
    let (ratings, catalog) = generate_random_ratings(15, 8, 0.5, 7);
    let matrix = UtilityMatrix::build(&ratings, &catalog).unwrap();
    let model = LowRankModel::fit(&matrix, matrix.num_items()).unwrap();

    let expected = centered(&matrix, &model);
    let reconstructed = model.reconstruct_centered();
    for (a, b) in reconstructed.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
    assert_abs_diff_eq!(model.reconstruction_error(&matrix).unwrap(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_basis_matches_svd_of_centered_matrix() {
    use ndarray_linalg::SVD;

    let (ratings, catalog) = generate_random_ratings(30, 12, 0.5, 1926);
    let matrix = UtilityMatrix::build(&ratings, &catalog).unwrap();
    let k = 4;
    let model = LowRankModel::fit(&matrix, k).unwrap();

    let (_, singular_values, vt) = centered(&matrix, &model).svd(false, true).unwrap();
    let vt = vt.unwrap();
    let svd_basis = vt.t().slice(ndarray::s![.., ..k]).to_owned();

    assert_columns_close_up_to_sign(model.basis().view(), svd_basis.view(), 1e-6, "basis vs SVD right singular vectors");
    for i in 0..k {
        assert_abs_diff_eq!(model.eigenvalues()[i], singular_values[i].powi(2), epsilon = 1e-6);
    }
}

#[test]
fn test_refit_is_stable_up_to_sign() {
    let (ratings, catalog) = generate_random_ratings(20, 9, 0.4, 3);
    let matrix = UtilityMatrix::build(&ratings, &catalog).unwrap();
    let first = LowRankModel::fit(&matrix, 3).unwrap();
    let second = LowRankModel::fit(&matrix, 3).unwrap();
    assert_columns_close_up_to_sign(first.basis().view(), second.basis().view(), TOLERANCE, "basis across refits");
    for (a, b) in first.reconstruct_centered().iter().zip(second.reconstruct_centered().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = TOLERANCE);
    }
}

#[test]
fn test_recommend_never_returns_rated_items() {
    let (ratings, catalog) = generate_random_ratings(20, 10, 0.5, 11);
    let base = Recommender::fit(ratings, catalog, 1).unwrap();

    let n_items = base.matrix().num_items();
    for k in [1, 3, 10] {
        let recommender = base.refit(k.min(n_items)).unwrap();
        for &user_id in recommender.matrix().users().ids() {
            let rated: Vec<i64> = recommender.ratings().rows_for_user(user_id).map(|r| r.item_id).collect();
            for top_n in [1, 5, 100] {
                let recs = recommender.recommend(user_id, top_n).unwrap();
                assert!(recs.len() <= top_n);
                assert!(recs.len() <= n_items - rated.len());
                for rec in &recs {
                    assert!(
                        !rated.contains(&rec.item_id),
                        "User {} was recommended already-rated item {} (k={}, top_n={})",
                        user_id,
                        rec.item_id,
                        k,
                        top_n
                    );
                    assert!(rec.score.is_finite());
                }
            }
        }
    }
}

#[test]
fn test_large_top_n_returns_every_unrated_item() {
    let (ratings, catalog) = generate_random_ratings(12, 8, 0.5, 5);
    let recommender = Recommender::fit(ratings, catalog, 2).unwrap();
    let n_items = recommender.matrix().num_items();
    for &user_id in recommender.matrix().users().ids() {
        let rated = recommender.ratings().rows_for_user(user_id).count();
        let recs = recommender.recommend(user_id, usize::MAX).unwrap();
        assert_eq!(recs.len(), n_items - rated);
    }
}

#[test]
fn test_recommend_is_sorted_and_deterministic() {
    let (ratings, catalog) = generate_random_ratings(20, 15, 0.3, 99);
    let recommender = Recommender::fit(ratings, catalog, 5).unwrap();

    for &user_id in recommender.matrix().users().ids() {
        let first = recommender.recommend(user_id, 7).unwrap();
        let second = recommender.recommend(user_id, 7).unwrap();
        assert_eq!(first, second, "Repeated recommend calls differ for user {}", user_id);
        for pair in first.windows(2) {
            assert!(pair[0].score >= pair[1].score, "Scores not descending: {:?}", pair);
        }
    }
}

#[test]
fn test_masked_scores_mark_every_rated_item() {
    let (ratings, catalog) = generate_random_ratings(10, 6, 0.5, 21);
    let recommender = Recommender::fit(ratings, catalog, 2).unwrap();
    let predictor = recommender.predictor();
    for &user_id in recommender.matrix().users().ids() {
        let scores = predictor.masked_scores(user_id).unwrap();
        let row = recommender.matrix().user_row(user_id).unwrap();
        for (score, rating) in scores.iter().zip(row.iter()) {
            if *rating > 0.0 {
                assert_eq!(*score, MASKED_SCORE);
            } else {
                assert!(score.is_finite());
            }
        }
    }
    assert!(predictor.masked_scores(-1).is_none());
}

#[test]
fn test_history_total_matches_raw_rows() {
    let (ratings, catalog) = generate_random_ratings(25, 10, 0.4, 8);
    let recommender = Recommender::fit(ratings, catalog, 3).unwrap();
    for &user_id in recommender.matrix().users().ids() {
        let expected = recommender
            .ratings()
            .records()
            .iter()
            .filter(|r| r.user_id == user_id)
            .count();
        let history = recommender.get_user_raw_data(user_id, 3).unwrap();
        assert_eq!(history.total, expected);
        assert!(history.sample.len() <= 3);
        for pair in history.sample.windows(2) {
            assert!(pair[0].rating >= pair[1].rating);
        }
    }
}

#[test]
fn test_unknown_user_is_not_found() {
    let (ratings, catalog) = generate_random_ratings(5, 4, 0.5, 1);
    let recommender = Recommender::fit(ratings, catalog, 2).unwrap();
    assert!(recommender.recommend(-1, 5).is_none());
    assert!(recommender.get_user_raw_data(-1, 5).is_none());
    assert!(recommender.recommend(10_000, 5).is_none());
}

#[test]
fn test_two_user_scenario_recommends_unrated_item() {
    let ratings = RatingsTable::new(vec![
        RatingRecord { user_id: 1, item_id: 10, rating: 5.0 },
        RatingRecord { user_id: 1, item_id: 20, rating: 3.0 },
        RatingRecord { user_id: 2, item_id: 20, rating: 4.0 },
        RatingRecord { user_id: 2, item_id: 30, rating: 2.0 },
    ])
    .unwrap();
    let catalog = ItemCatalog::new(
        [10, 20, 30]
            .iter()
            .map(|&item_id| ItemRecord { item_id, title: format!("Item {}", item_id), genres: vec![] })
            .collect(),
    )
    .unwrap();

    let recommender = Recommender::fit(ratings, catalog, 2).unwrap();
    let recs = recommender.recommend(1, 1).unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].item_id, 30);
    assert_eq!(recs[0].title, "Item 30");
    assert!(recs[0].score.is_finite());
}

#[test]
fn test_items_without_metadata_are_skipped() {
    let ratings = RatingsTable::new(vec![
        RatingRecord { user_id: 1, item_id: 10, rating: 5.0 },
        RatingRecord { user_id: 2, item_id: 20, rating: 4.0 },
        RatingRecord { user_id: 2, item_id: 30, rating: 4.0 },
    ])
    .unwrap();
    // Item 20 has no metadata row.
    let catalog = ItemCatalog::new(vec![
        ItemRecord { item_id: 10, title: "Ten".into(), genres: vec![] },
        ItemRecord { item_id: 30, title: "Thirty".into(), genres: vec![] },
    ])
    .unwrap();
    let recommender = Recommender::fit(ratings, catalog, 1).unwrap();

    let scores = recommender.predictor().masked_scores(1).unwrap();
    assert!(scores.iter().filter(|s| s.is_finite()).count() == 2);
    let recs = recommender.recommend(1, 2).unwrap();
    assert_eq!(recs.len(), 1, "only the item with metadata survives: {:?}", recs);
    assert_eq!(recs[0].item_id, 30);
}

#[test]
fn test_batch_matches_single_queries() {
    let (ratings, catalog) = generate_random_ratings(16, 9, 0.4, 17);
    let recommender = Recommender::fit(ratings, catalog, 3).unwrap();
    let user_ids = vec![3, -1, 1, 16, 8];
    let batch = recommender.recommend_batch(&user_ids, 4);
    assert_eq!(batch.len(), user_ids.len());
    for ((user_id, recs), &expected_id) in batch.iter().zip(user_ids.iter()) {
        assert_eq!(*user_id, expected_id);
        assert_eq!(*recs, recommender.recommend(expected_id, 4));
    }
    assert!(batch[1].1.is_none());
}

#[test]
fn test_concurrent_queries_share_one_model() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Recommender>();

    let (ratings, catalog) = generate_random_ratings(20, 10, 0.4, 64);
    let recommender = Recommender::fit(ratings, catalog, 4).unwrap();
    let expected: Vec<_> = (1..=20).map(|u| recommender.recommend(u, 3)).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    (1..=20)
                        .map(|u| {
                            let _ = recommender.get_user_raw_data(u, 5);
                            recommender.recommend(u, 3)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_refit_rejects_k_above_item_count() {
    let (ratings, catalog) = generate_random_ratings(6, 4, 0.6, 2);
    let recommender = Recommender::fit(ratings, catalog, 2).unwrap();
    let n_items = recommender.matrix().num_items();
    assert!(recommender.refit(n_items + 1).is_err());
    assert!(recommender.refit(0).is_err());
    assert_eq!(recommender.refit(n_items).unwrap().model().n_components(), n_items);
}
