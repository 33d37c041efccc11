// Principal component analysis (PCA)

use log::{debug, info, warn};
use ndarray::{s, Array1, Array2};

use crate::error::{RecognitionError, Result};
use crate::matrix::{self, Matrix};

/// Learned principal axes of a centered sample matrix.
#[derive(Debug, Clone)]
pub struct PcaBasis {
    /// Unit-length principal axes as columns.
    /// Shape: (n_features, n_components)
    pub basis: Matrix,
    /// Variance along each axis, largest first.
    /// Shape: (n_components)
    pub eigenvalues: Array1<f64>,
}

/// Largest meaningful component count for centered data, `min(m, n - 1)`.
/// Also the count used when none is requested.
pub fn default_components(n_features: usize, n_samples: usize) -> usize {
    n_features.min(n_samples.saturating_sub(1))
}

/// Fits principal axes to a centered sample matrix `x` (features × samples).
///
/// Uses the m×m covariance `X·Xᵗ/(n-1)` when the feature count is at most the
/// sample count, and otherwise the n×n Gram matrix `Xᵗ·X/(n-1)` whose
/// eigenvectors are mapped back to feature space (the usual trick for face
/// images, where pixels vastly outnumber samples).
///
/// # Errors
/// `InsufficientSamples` if fewer than two samples are given, or if
/// `n_components` is zero or exceeds `min(m, n - 1)`.
pub fn fit(x: &Matrix, n_components: Option<usize>) -> Result<PcaBasis> {
    let (n_features, n_samples) = x.dim();
    if n_samples < 2 || n_features == 0 {
        return Err(RecognitionError::InsufficientSamples(format!(
            "PCA needs at least 2 samples with at least 1 feature, got {}x{}",
            n_features, n_samples
        )));
    }

    let max_rank = default_components(n_features, n_samples);
    let n1 = n_components.unwrap_or(max_rank);
    if n1 == 0 || n1 > max_rank {
        return Err(RecognitionError::InsufficientSamples(format!(
            "PCA requested {} components but {} samples of dimension {} support at most {}",
            n1, n_samples, n_features, max_rank
        )));
    }

    let start_time = std::time::Instant::now();
    let denom = (n_samples - 1) as f64;

    let (basis, eigenvalues) = if n_features <= n_samples {
        debug!("PCA covariance path: {}x{} covariance", n_features, n_features);
        let cov_matrix = matrix::product(x, x, false, true)? / denom;
        let eig = matrix::eigen_descending(&cov_matrix)?;

        let mut rotation = matrix::leading_columns(&eig.eigenvectors, n1);
        let norms = matrix::column_norms(&rotation).mapv(|v| if v > 1e-9 { v } else { 1.0 });
        matrix::normalize_columns(&mut rotation, &norms)?;
        let eigenvalues = eig.eigenvalues.slice(s![..n1]).mapv(|v| v.max(0.0));
        (rotation, eigenvalues)
    } else {
        debug!("PCA Gram path: {}x{} Gram matrix", n_samples, n_samples);
        let gram_matrix = matrix::product(x, x, true, false)? / denom;
        let eig = matrix::eigen_descending(&gram_matrix)?;

        let mut rotation = Array2::<f64>::zeros((n_features, n1));
        let mut eigenvalues = Array1::<f64>::zeros(n1);
        for i in 0..n1 {
            let eigval = eig.eigenvalues[i];
            eigenvalues[i] = eigval.max(0.0);
            // V_i = X·u_i / sqrt(lambda_i·(n-1)) has unit norm for a nonzero eigenvalue.
            let lam_sqrt = eigval.max(1e-12).sqrt();
            let mut axis_i = x.dot(&eig.eigenvectors.column(i));
            axis_i.mapv_inplace(|v| v / (lam_sqrt * denom.sqrt()));

            // Re-normalize to absorb rounding in the Gram eigenvectors.
            let norm_val = axis_i.dot(&axis_i).sqrt();
            if norm_val > 1e-9 {
                axis_i.mapv_inplace(|v| v / norm_val);
            } else {
                warn!("PCA axis {} has zero variance; leaving it as a zero column", i);
                axis_i.fill(0.0);
            }
            rotation.column_mut(i).assign(&axis_i);
        }
        (rotation, eigenvalues)
    };

    matrix::ensure_finite(&basis, "PCA basis")?;
    info!(
        "PCA computed {} components from {} samples of dimension {} in {:?}",
        n1,
        n_samples,
        n_features,
        start_time.elapsed()
    );
    Ok(PcaBasis { basis, eigenvalues })
}
