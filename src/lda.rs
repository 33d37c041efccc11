// src/lda.rs

use log::{debug, info};
use ndarray::{Array1, Array2, Axis};

use crate::config::LdaParams;
use crate::error::{RecognitionError, Result};
use crate::matrix::{self, Matrix};
use crate::pca;

/// Within-class scatter eigenvalues at or below this fraction of the largest are treated as zero.
const SCATTER_TOLERANCE: f64 = 1e-10;

/// Learned discriminant basis mapping feature space straight to the Fisher subspace.
#[derive(Debug, Clone)]
pub struct LdaBasis {
    /// Shape: (n_features, n2)
    pub basis: Matrix,
    /// Generalized eigenvalues of the kept directions, largest first.
    pub eigenvalues: Array1<f64>,
}

/// Class means (columns) and member counts of `x` partitioned by `labels`.
fn class_means(x: &Matrix, labels: &[usize], n_classes: usize) -> (Matrix, Vec<usize>) {
    let mut means = Array2::<f64>::zeros((x.nrows(), n_classes));
    let mut counts = vec![0usize; n_classes];
    for (col, &class_idx) in x.columns().into_iter().zip(labels) {
        counts[class_idx] += 1;
        let mut mean = means.column_mut(class_idx);
        mean += &col;
    }
    for (mut mean, &count) in means.columns_mut().into_iter().zip(&counts) {
        if count > 0 {
            mean /= count as f64;
        }
    }
    (means, counts)
}

/// Computes (Sw, Sb) for the samples in the columns of `x`.
pub fn scatter_matrices(x: &Matrix, labels: &[usize], n_classes: usize) -> Result<(Matrix, Matrix)> {
    if labels.len() != x.ncols() {
        return Err(RecognitionError::dims(
            "scatter_matrices",
            format!("{} labels for {} samples", labels.len(), x.ncols()),
        ));
    }
    let d = x.nrows();
    let overall_mean = x
        .mean_axis(Axis(1))
        .ok_or_else(|| RecognitionError::InsufficientSamples("no samples".to_string()))?;
    let (means, counts) = class_means(x, labels, n_classes);

    let mut sw = Array2::<f64>::zeros((d, d));
    for (col, &class_idx) in x.columns().into_iter().zip(labels) {
        let diff = (&col - &means.column(class_idx)).insert_axis(Axis(1));
        sw += &diff.dot(&diff.t());
    }

    let mut sb = Array2::<f64>::zeros((d, d));
    for (class_idx, &count) in counts.iter().enumerate() {
        if count > 0 {
            let diff = (&means.column(class_idx) - &overall_mean).insert_axis(Axis(1));
            sb += &(diff.dot(&diff.t()) * count as f64);
        }
    }
    Ok((sw, sb))
}

/// Fits Fisher discriminant directions to centered `x` with per-sample class indices.
///
/// The samples are first reduced by PCA to `n1` dimensions so the within-class
/// scatter can be invertible, then `Sb·v = λ·Sw·v` is solved in that space as
/// the symmetric problem `Sw^{-1/2}·Sb·Sw^{-1/2}`. The returned basis is the
/// product of the PCA and Fisher bases.
///
/// # Errors
/// * `InsufficientSamples` for fewer than two classes or `n2 >= c`.
/// * `UndersampledScatter` when the within-class scatter is singular.
pub fn fit(x: &Matrix, labels: &[usize], n_classes: usize, params: &LdaParams) -> Result<LdaBasis> {
    let n_samples = x.ncols();
    if labels.len() != n_samples {
        return Err(RecognitionError::dims(
            "lda",
            format!("{} labels for {} samples", labels.len(), n_samples),
        ));
    }
    if n_classes < 2 {
        return Err(RecognitionError::InsufficientSamples(format!(
            "LDA needs at least 2 classes, got {}",
            n_classes
        )));
    }
    let n1 = params
        .n1
        .unwrap_or_else(|| n_samples.saturating_sub(n_classes).min(x.nrows()));
    let n2 = params.n2.unwrap_or(n_classes - 1);
    if n2 >= n_classes {
        return Err(RecognitionError::InsufficientSamples(format!(
            "LDA n2 ({}) must be smaller than the number of classes ({})",
            n2, n_classes
        )));
    }
    if n2 > n1 {
        return Err(RecognitionError::InsufficientSamples(format!(
            "LDA n2 ({}) exceeds the PCA stage dimension n1 ({})",
            n2, n1
        )));
    }

    let start_time = std::time::Instant::now();
    let pca_stage = pca::fit(x, Some(n1))?;
    let projected = matrix::product(&pca_stage.basis, x, true, false)?;
    let (sw, sb) = scatter_matrices(&projected, labels, n_classes)?;
    debug!("LDA scatter matrices in {} dimensions", n1);

    let (sw_inv_sqrt, _) = matrix::inverse_sqrtm(&sw, SCATTER_TOLERANCE).map_err(|e| match e {
        RecognitionError::Singularity(detail) => RecognitionError::UndersampledScatter(detail),
        other => other,
    })?;
    let symmetric = sw_inv_sqrt.dot(&sb).dot(&sw_inv_sqrt);
    let eig = matrix::eigen_descending(&symmetric)?;

    let w_fld = sw_inv_sqrt.dot(&matrix::leading_columns(&eig.eigenvectors, n2));
    let mut basis = pca_stage.basis.dot(&w_fld);
    let norms = matrix::column_norms(&basis).mapv(|v| if v > 1e-12 { v } else { 1.0 });
    matrix::normalize_columns(&mut basis, &norms)?;
    matrix::ensure_finite(&basis, "LDA basis")?;

    info!(
        "LDA computed {} discriminant directions ({} classes, PCA stage {}) in {:?}",
        n2,
        n_classes,
        n1,
        start_time.elapsed()
    );
    Ok(LdaBasis {
        basis,
        eigenvalues: eig.eigenvalues.slice(ndarray::s![..n2]).to_owned(),
    })
}
