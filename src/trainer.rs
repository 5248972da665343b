// src/trainer.rs

//! Covariance PCA over the utility matrix.
//!
//! ## Sign of the basis
//! Eigenvectors are only defined up to sign, so two correct solvers (or two
//! LAPACK builds) may return `v` and `-v` for the same component. Every basis
//! column is flipped so that its largest-magnitude entry is positive, which
//! makes repeated fits on the same data agree. Predictions are `U_k V_kᵀ`, in
//! which the sign cancels, so nothing downstream depends on this convention.

use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use std::time::Instant;

use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use crate::utility_matrix::UtilityMatrix;
use crate::ThreadSafeStdError;

/// How many leading eigenvalues are echoed at debug level after a fit.
const LOGGED_EIGENVALUES: usize = 10;

/// A trained low-rank model: per-item means, the top-k basis and the
/// per-user coefficients. Immutable once fitted.
#[derive(Debug, Clone)]
pub struct LowRankModel {
    /// Mean rating of each item over all users (zero-filled cells included).
    /// Shape: (n_items)
    mean: Array1<f64>,
    /// Top-k eigenvectors of the centered covariance, as columns, by descending eigenvalue.
    /// Shape: (n_items, k)
    basis: Array2<f64>,
    /// Projection of each user's centered row onto the basis.
    /// Shape: (n_users, k)
    coefficients: Array2<f64>,
    /// Retained eigenvalues of `XᵀX`, descending, clamped to be non-negative.
    /// Shape: (k)
    eigenvalues: Array1<f64>,
    /// Sum of all (clamped) eigenvalues, i.e. the trace of `XᵀX`.
    total_variance: f64,
}

impl LowRankModel {
    /// Fits the model to `matrix`, keeping `n_components` eigenvectors.
    ///
    /// 1. Per-item mean over all rows.
    /// 2. Subtract the mean from every row.
    /// 3. Covariance `XᵀX` of the centered matrix (items × items).
    /// 4. Symmetric eigen-decomposition.
    /// 5. Keep the `n_components` eigenvectors with the largest eigenvalues.
    /// 6. Coefficients `X · V_k`.
    ///
    /// # Errors
    /// Returns an error if `n_components` is outside `1..=n_items`, or if the
    /// eigen-decomposition fails.
    pub fn fit(matrix: &UtilityMatrix, n_components: usize) -> Result<Self, ThreadSafeStdError> {
        let start_time = Instant::now();
        let data_matrix = matrix.values();
        let n_users = data_matrix.nrows();
        let n_items = data_matrix.ncols();

        if n_users == 0 || n_items == 0 {
            return Err("Utility matrix has zero users or zero items.".into());
        }
        if n_components == 0 || n_components > n_items {
            return Err(format!(
                "Number of components k={} is out of range; it must satisfy 1 <= k <= {} (item count).",
                n_components, n_items
            )
            .into());
        }

        info!(
            "Fitting PCA with k={} on {} users x {} items.",
            n_components, n_users, n_items
        );

        let mean_vector = data_matrix
            .mean_axis(Axis(0))
            .ok_or("Failed to compute the per-item mean of the utility matrix.")?;
        let centered = center_rows(data_matrix.view(), mean_vector.view());

        let cov_matrix = centered.t().dot(&centered);
        debug!("Covariance matrix shape: {:?}", cov_matrix.dim());

        let backend = LinAlgBackendProvider::<f64>::new();
        let eigh_output = backend
            .eigh_upper(&cov_matrix)
            .map_err(|e| format!("Eigen decomposition of covariance matrix failed: {}", e))?;

        let mut eig_pairs: Vec<(f64, Array1<f64>)> = eigh_output
            .eigenvalues
            .into_iter()
            .zip(eigh_output.eigenvectors.columns().into_iter().map(|col| col.to_owned()))
            .collect();
        // Stable sort: equal eigenvalues keep the solver's order.
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let total_variance: f64 = eig_pairs.iter().map(|(val, _)| val.max(0.0)).sum();

        let mut basis = Array2::<f64>::zeros((n_items, n_components));
        let mut eigenvalues = Vec::with_capacity(n_components);
        for (component_idx, (eig_val, eig_vec)) in eig_pairs.into_iter().take(n_components).enumerate() {
            eigenvalues.push(eig_val.max(0.0));
            let mut column = basis.slice_mut(s![.., component_idx]);
            column.assign(&canonical_unit_vector(eig_vec));
        }
        let eigenvalues = Array1::from(eigenvalues);
        debug!(
            "Leading eigenvalues: {:?}",
            eigenvalues.slice(s![..n_components.min(LOGGED_EIGENVALUES)])
        );

        let coefficients = centered.dot(&basis);

        info!("Fitted PCA (k={}) in {:?}", n_components, start_time.elapsed());
        Ok(Self {
            mean: mean_vector,
            basis,
            coefficients,
            eigenvalues,
            total_variance,
        })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// The basis `V_k`, shape (n_items, k). Columns are unit length and
    /// mutually orthogonal; their sign is a convention (see module docs).
    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    /// The coefficients `U_k`, shape (n_users, k), rows in utility-matrix order.
    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn total_variance(&self) -> f64 {
        self.total_variance
    }

    pub fn n_components(&self) -> usize {
        self.basis.ncols()
    }

    pub fn num_items(&self) -> usize {
        self.basis.nrows()
    }

    pub fn num_users(&self) -> usize {
        self.coefficients.nrows()
    }

    /// Predicted ratings for the user at matrix row `user_position`:
    /// `U_k[user] · V_kᵀ + mean`. `None` if the row is out of range.
    pub fn predict_row(&self, user_position: usize) -> Option<Array1<f64>> {
        if user_position >= self.num_users() {
            return None;
        }
        let user_coefficients = self.coefficients.row(user_position);
        Some(self.basis.dot(&user_coefficients) + &self.mean)
    }

    /// `U_k V_kᵀ`, the rank-k approximation of the centered training matrix.
    pub fn reconstruct_centered(&self) -> Array2<f64> {
        self.coefficients.dot(&self.basis.t())
    }

    /// Sum of squared differences between the centered `matrix` and its
    /// rank-k reconstruction.
    ///
    /// # Errors
    /// Returns an error if `matrix` does not have the shape the model was fitted on.
    pub fn reconstruction_error(&self, matrix: &UtilityMatrix) -> Result<f64, ThreadSafeStdError> {
        Ok(self.per_user_reconstruction_error(matrix)?.sum())
    }

    /// Squared reconstruction error of each user row.
    pub fn per_user_reconstruction_error(&self, matrix: &UtilityMatrix) -> Result<Array1<f64>, ThreadSafeStdError> {
        let values = matrix.values();
        if values.dim() != (self.num_users(), self.num_items()) {
            return Err(format!(
                "Matrix shape {:?} does not match the fitted model ({} users x {} items).",
                values.dim(),
                self.num_users(),
                self.num_items()
            )
            .into());
        }
        let errors: Vec<f64> = (0..self.num_users())
            .into_par_iter()
            .map(|row| {
                let reconstructed = self.basis.dot(&self.coefficients.row(row));
                values
                    .row(row)
                    .iter()
                    .zip(self.mean.iter())
                    .zip(reconstructed.iter())
                    .map(|((&x, &m), &r)| (x - m - r).powi(2))
                    .sum::<f64>()
            })
            .collect();
        Ok(Array1::from(errors))
    }
}

/// Returns `data` with `mean` subtracted from every row.
fn center_rows(data: ArrayView2<'_, f64>, mean: ArrayView1<'_, f64>) -> Array2<f64> {
    let mut centered = data.to_owned();
    centered
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            row -= &mean;
        });
    centered
}

/// Normalizes `vector` to unit length and flips it so that its
/// largest-magnitude entry is positive. A zero vector stays zero.
fn canonical_unit_vector(mut vector: Array1<f64>) -> Array1<f64> {
    let norm = vector.dot(&vector).sqrt();
    if norm <= 1e-12 {
        vector.fill(0.0);
        return vector;
    }
    vector.mapv_inplace(|x| x / norm);

    let mut pivot = 0.0_f64;
    for &x in vector.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        vector.mapv_inplace(|x| -x);
    }
    vector
}
