// src/bayes.rs

use log::debug;
use ndarray::{Array1, ArrayView1, Axis};

use crate::config::{BayesParams, CovarianceModel};
use crate::error::{RecognitionError, Result};
use crate::matrix::{self, Matrix};

/// Class covariance eigenvalues at or below this fraction of the largest are treated as zero.
const COVARIANCE_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
enum Precision {
    /// `Σ^{-1/2}`
    Full(Matrix),
    /// `1/σ` per dimension
    Diagonal(Array1<f64>),
}

#[derive(Debug, Clone)]
struct ClassGaussian {
    mean: Array1<f64>,
    precision: Precision,
    log_det: f64,
}

impl ClassGaussian {
    /// `-½ (x-μ)ᵗ Σ⁻¹ (x-μ) - ½ ln|Σ|`
    fn discriminant(&self, x: ArrayView1<f64>) -> f64 {
        let diff = &x - &self.mean;
        let mahalanobis = match &self.precision {
            Precision::Full(w) => {
                let y = w.dot(&diff);
                y.dot(&y)
            }
            Precision::Diagonal(inv_std) => diff
                .iter()
                .zip(inv_std.iter())
                .map(|(d, s)| (d * s) * (d * s))
                .sum(),
        };
        -0.5 * mahalanobis - 0.5 * self.log_det
    }
}

/// Equal-prior Gaussian classifier over training projections.
#[derive(Debug, Clone)]
pub struct BayesClassifier {
    classes: Vec<ClassGaussian>,
}

impl BayesClassifier {
    /// Estimates one Gaussian per label index from the columns of `p`.
    ///
    /// # Errors
    /// * `InsufficientSamples` if any class has fewer than two members, or
    ///   with a full covariance, no more members than projected dimensions.
    /// * `Singularity` if a class covariance is singular despite enough members.
    pub fn fit(p: &Matrix, labels: &[usize], n_classes: usize, params: &BayesParams) -> Result<Self> {
        if labels.len() != p.ncols() {
            return Err(RecognitionError::dims(
                "bayes",
                format!("{} labels for {} training projections", labels.len(), p.ncols()),
            ));
        }

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (j, &label) in labels.iter().enumerate() {
            members
                .get_mut(label)
                .ok_or_else(|| RecognitionError::InvalidParameter(format!("label index {} out of range", label)))?
                .push(j);
        }

        let classes = members
            .iter()
            .enumerate()
            .map(|(class_idx, idx)| {
                if idx.len() < 2 {
                    return Err(RecognitionError::InsufficientSamples(format!(
                        "Bayes class {} has {} samples, needs at least 2",
                        class_idx,
                        idx.len()
                    )));
                }
                // n_c samples span at most n_c - 1 directions
                if params.covariance == CovarianceModel::Full && idx.len() <= p.nrows() {
                    return Err(RecognitionError::InsufficientSamples(format!(
                        "Bayes class {} has {} samples, a full covariance in {} dimensions needs at least {}",
                        class_idx,
                        idx.len(),
                        p.nrows(),
                        p.nrows() + 1
                    )));
                }
                let samples = p.select(Axis(1), idx);
                let mean = samples
                    .mean_axis(Axis(1))
                    .ok_or_else(|| RecognitionError::InsufficientSamples("empty class".to_string()))?;
                let cov = matrix::covariance(&samples)?;
                let (precision, log_det) = match params.covariance {
                    CovarianceModel::Full => {
                        let (w, log_det) = matrix::inverse_sqrtm(&cov, COVARIANCE_TOLERANCE)
                            .map_err(|e| match e {
                                RecognitionError::Singularity(detail) => RecognitionError::Singularity(
                                    format!("Bayes class {} covariance: {}", class_idx, detail),
                                ),
                                other => other,
                            })?;
                        (Precision::Full(w), log_det)
                    }
                    CovarianceModel::Diagonal => {
                        let variances = cov.diag().to_owned();
                        if let Some(d) = variances.iter().position(|&v| !(v > 0.0)) {
                            return Err(RecognitionError::Singularity(format!(
                                "Bayes class {} has zero variance in dimension {}",
                                class_idx, d
                            )));
                        }
                        let log_det = variances.iter().map(|v| v.ln()).sum();
                        (Precision::Diagonal(variances.mapv(|v| 1.0 / v.sqrt())), log_det)
                    }
                };
                Ok(ClassGaussian {
                    mean,
                    precision,
                    log_det,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Bayes fitted {} classes ({:?} covariance) in {} dimensions",
            classes.len(),
            params.covariance,
            p.nrows()
        );
        Ok(Self { classes })
    }

    /// Discriminant value of `x` for each class, indexed by label index.
    pub fn discriminants(&self, x: ArrayView1<f64>) -> Result<Vec<f64>> {
        let dim = self.classes.first().map_or(0, |c| c.mean.len());
        if x.len() != dim {
            return Err(RecognitionError::dims(
                "bayes",
                format!("sample has {} dimensions, classes have {}", x.len(), dim),
            ));
        }
        Ok(self.classes.iter().map(|c| c.discriminant(x)).collect())
    }

    /// Label index with the largest discriminant; ties go to the lowest index.
    pub fn classify(&self, x: ArrayView1<f64>) -> Result<usize> {
        let scores = self.discriminants(x)?;
        let mut best: Option<(usize, f64)> = None;
        for (class_idx, &score) in scores.iter().enumerate() {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((class_idx, score));
            }
        }
        best.map(|(class_idx, _)| class_idx)
            .ok_or_else(|| RecognitionError::InsufficientSamples("Bayes classifier has no classes".to_string()))
    }
}
