// src/linalg_backends.rs

use log::{debug, info};
use ndarray::{Array1, Array2};
use std::marker::PhantomData;

use crate::error::{RecognitionError, Result};

/// Dispatches decompositions to the backend selected by compile-time features.
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
    /// Eigenvalues in ascending order.
    pub eigenvalues: Array1<F>,
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Symmetric eigendecomposition reading the upper triangle.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>>;
}

/// LU-based inverse and determinant of a square matrix.
pub trait BackendLu<F: 'static + Copy + Send + Sync> {
    fn inverse(&self, matrix: &Array2<F>) -> Result<Array2<F>>;
    fn determinant(&self, matrix: &Array2<F>) -> Result<F>;
}

// --- ndarray-linalg (LAPACK) backend ---
use ndarray_linalg::{Determinant as NdLinalgDet, Eigh as NdLinalgEigh, Inverse as NdLinalgInv, UPLO};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

impl BackendEigh<f64> for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>> {
        let (eigenvalues, eigenvectors) =
            matrix.eigh(UPLO::Upper).map_err(|e| RecognitionError::Backend {
                op: "eigh",
                detail: e.to_string(),
            })?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendLu<f64> for NdarrayLinAlgBackend {
    fn inverse(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        matrix.inv().map_err(|e| RecognitionError::Backend {
            op: "inverse",
            detail: e.to_string(),
        })
    }

    fn determinant(&self, matrix: &Array2<f64>) -> Result<f64> {
        matrix.det().map_err(|e| RecognitionError::Backend {
            op: "determinant",
            detail: e.to_string(),
        })
    }
}

// --- faer backend ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{BackendEigh, EighOutput};
    use crate::error::{RecognitionError, Result};
    use ndarray::{Array1, Array2, ShapeBuilder};

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn faer_mat_to_ndarray(faer_mat: faer::MatRef<'_, f64>) -> Array2<f64> {
        let nrows = faer_mat.nrows();
        let ncols = faer_mat.ncols();
        let mut data_vec = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data_vec.push(faer_mat[(i, j)]);
            }
        }
        Array2::from_shape_vec((nrows, ncols).f(), data_vec)
            .unwrap_or_else(|_| Array2::zeros((nrows, ncols).f()))
    }

    impl BackendEigh<f64> for FaerLinAlgBackend {
        fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>> {
            let (nrows, ncols) = matrix.dim();
            if nrows != ncols {
                return Err(RecognitionError::dims(
                    "eigh",
                    format!("matrix must be square, got {}x{}", nrows, ncols),
                ));
            }
            if matrix.is_empty() {
                return Ok(EighOutput {
                    eigenvalues: Array1::zeros(0),
                    eigenvectors: Array2::zeros((0, 0)),
                });
            }
            // faer needs a contiguous buffer; a standard-layout copy is cheap next to the decomposition.
            let contiguous = matrix.as_standard_layout();
            let slice = contiguous.as_slice().ok_or_else(|| RecognitionError::Backend {
                op: "eigh",
                detail: "matrix is not contiguous".to_string(),
            })?;
            let view = faer::MatRef::from_row_major_slice(slice, nrows, ncols);
            let eig = view
                .self_adjoint_eigen(faer::Side::Upper)
                .map_err(|e| RecognitionError::Backend {
                    op: "eigh",
                    detail: format!("{:?}", e),
                })?;
            let s = eig.S().column_vector();
            let eigenvalues = Array1::from_iter((0..s.nrows()).map(|i| s[i]));
            Ok(EighOutput {
                eigenvalues,
                eigenvectors: faer_mat_to_ndarray(eig.U()),
            })
        }
    }
}

#[cfg(feature = "backend_faer")]
impl<F> BackendEigh<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    faer_specific_code::FaerLinAlgBackend: BackendEigh<F>,
{
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>> {
        faer_specific_code::FaerLinAlgBackend.eigh_upper(matrix)
    }
}

#[cfg(not(feature = "backend_faer"))]
impl<F> BackendEigh<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendEigh<F>,
{
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>> {
        NdarrayLinAlgBackend.eigh_upper(matrix)
    }
}

// LU stays on ndarray-linalg for every feature set.
impl<F> BackendLu<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendLu<F>,
{
    fn inverse(&self, matrix: &Array2<F>) -> Result<Array2<F>> {
        NdarrayLinAlgBackend.inverse(matrix)
    }

    fn determinant(&self, matrix: &Array2<F>) -> Result<F> {
        NdarrayLinAlgBackend.determinant(matrix)
    }
}

/// Name of the eigen-solver backend compiled into this build.
pub fn backend_name() -> &'static str {
    if cfg!(feature = "backend_faer") {
        "faer"
    } else {
        "ndarray-linalg"
    }
}

/// Brackets the lifetime of an accelerated backend.
///
/// The numeric routines never consult this value; it only logs the
/// init/finalize transitions so a run's backend is visible in the output.
#[derive(Debug)]
pub struct BackendSession {
    accelerated: bool,
}

impl BackendSession {
    pub fn init(request_accelerator: bool) -> Self {
        let accelerated = request_accelerator && cfg!(feature = "backend_faer");
        if request_accelerator && !accelerated {
            info!(
                "Accelerated backend requested but not compiled in; using {}",
                backend_name()
            );
        } else {
            info!("Linear algebra backend: {}", backend_name());
        }
        Self { accelerated }
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }
}

impl Drop for BackendSession {
    fn drop(&mut self) {
        debug!("Finalizing {} backend session", backend_name());
    }
}
