// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use std::marker::PhantomData;

use crate::ThreadSafeStdError;

/// Dispatches symmetric eigen-decompositions to the backend selected
/// by Cargo features (`ndarray-linalg` by default, `faer` with `backend_faer`).
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues, in the order produced by the solver (ascending for both backends).
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Symmetric eigendecomposition reading the upper triangle of `matrix`.
/// Implementers expect `matrix` to be square and symmetric.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>, ThreadSafeStdError>;
}

use ndarray_linalg::{Eigh as NdLinalgEigh, UPLO};

/// LAPACK-backed solver via `ndarray-linalg` (`dsyevd`).
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

impl BackendEigh<f64> for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(format!(
                "Matrix must be square for eigendecomposition, got {}x{}.",
                matrix.nrows(),
                matrix.ncols()
            )
            .into());
        }
        if matrix.is_empty() {
            return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendEigh, EighOutput};
    use crate::ThreadSafeStdError;
    use ndarray::{Array1, Array2, ShapeBuilder};
    use faer::{ColRef, MatRef};

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn faer_mat_to_ndarray(faer_mat: MatRef<'_, f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        let nrows = faer_mat.nrows();
        let ncols = faer_mat.ncols();
        let mut data_vec = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data_vec.push(faer_mat[(i, j)]);
            }
        }
        Array2::from_shape_vec((nrows, ncols).f(), data_vec)
            .map_err(|e| format!("Shape mismatch creating ndarray from faer Mat: {}", e).into())
    }

    fn faer_col_to_ndarray_vec(faer_col: ColRef<'_, f64>) -> Array1<f64> {
        (0..faer_col.nrows()).map(|i| faer_col[i]).collect()
    }

    impl BackendEigh<f64> for FaerLinAlgBackend {
        fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
            let (nrows, ncols) = matrix.dim();
            if nrows != ncols {
                return Err(format!(
                    "Matrix must be square for eigendecomposition, got {}x{}.",
                    nrows, ncols
                )
                .into());
            }
            if matrix.is_empty() {
                return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
            }
            // faer needs contiguous memory; covariance matrices built by `dot` are
            // standard layout, anything else is copied first.
            let contiguous = matrix.as_standard_layout();
            let slice = contiguous
                .as_slice()
                .ok_or("Failed to get a contiguous slice from the covariance matrix.")?;
            let faer_mat_view = MatRef::from_row_major_slice(slice, nrows, ncols);
            let eig = faer_mat_view
                .self_adjoint_eigen(faer::Side::Upper)
                .map_err(|e| format!("faer self-adjoint eigendecomposition failed: {:?}", e))?;
            Ok(EighOutput {
                eigenvalues: faer_col_to_ndarray_vec(eig.S().column_vector()),
                eigenvectors: faer_mat_to_ndarray(eig.U())?,
            })
        }
    }
}

// Only `f64` backends exist; feature selection happens in the body.
impl BackendEigh<f64> for LinAlgBackendProvider<f64> {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_faer")]
        {
            faer_specific_code::FaerLinAlgBackend.eigh_upper(matrix)
        }
        #[cfg(not(feature = "backend_faer"))]
        {
            NdarrayLinAlgBackend.eigh_upper(matrix)
        }
    }
}
