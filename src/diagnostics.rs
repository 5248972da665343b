// src/diagnostics.rs

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::trainer::LowRankModel;
use crate::utility_matrix::UtilityMatrix;
use crate::ThreadSafeStdError;

/// Summary of how well a fitted model represents its training matrix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub num_users: usize,
    pub num_items: usize,
    pub n_components: usize,

    // --- Spectrum ---
    pub eigenvalues: Vec<f64>,
    pub total_variance: f64,
    pub explained_variance_ratio: Vec<f64>, // eigenvalue / total_variance
    pub cumulative_explained_variance: f64,

    // --- Reconstruction ---
    pub reconstruction_error: f64,          // ||X_c - U_k V_k^T||_F^2
    pub relative_reconstruction_error: f64, // reconstruction_error / ||X_c||_F^2
    pub max_user_reconstruction_error: f64,

    // --- Basis quality ---
    pub basis_orthogonality_error: f64, // ||I - V_k^T V_k||_F
}

impl FitDiagnostics {
    /// Computes diagnostics for `model` against the matrix it was fitted on.
    pub fn compute(model: &LowRankModel, matrix: &UtilityMatrix) -> Result<Self, ThreadSafeStdError> {
        let per_user = model.per_user_reconstruction_error(matrix)?;
        let reconstruction_error = per_user.sum();
        let max_user_reconstruction_error = per_user.iter().cloned().fold(0.0_f64, f64::max);

        // ||X_c||_F^2 equals the trace of X_c^T X_c, i.e. the sum of all eigenvalues.
        let total_variance = model.total_variance();
        let eigenvalues = model.eigenvalues().to_vec();
        let explained_variance_ratio: Vec<f64> = if total_variance > f64::EPSILON {
            eigenvalues.iter().map(|v| v / total_variance).collect()
        } else {
            vec![0.0; eigenvalues.len()]
        };
        let cumulative_explained_variance = explained_variance_ratio.iter().sum();
        let relative_reconstruction_error = if total_variance > f64::EPSILON {
            reconstruction_error / total_variance
        } else {
            0.0
        };

        Ok(Self {
            num_users: model.num_users(),
            num_items: model.num_items(),
            n_components: model.n_components(),
            eigenvalues,
            total_variance,
            explained_variance_ratio,
            cumulative_explained_variance,
            reconstruction_error,
            relative_reconstruction_error,
            max_user_reconstruction_error,
            basis_orthogonality_error: orthogonality_error(model.basis().view()),
        })
    }
}

/// `||I - QᵀQ||_F` for a matrix whose columns should be orthonormal.
pub fn orthogonality_error(q: ArrayView2<'_, f64>) -> f64 {
    let k = q.ncols();
    let deviation = Array2::<f64>::eye(k) - q.t().dot(&q);
    deviation.iter().map(|x| x * x).sum::<f64>().sqrt()
}
