// src/config.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RecognitionError, Result};

/// Contrast function used by the ICA fixed-point iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcaNonlinearity {
    Pow3,
    Tanh,
    Gauss,
}

impl FromStr for IcaNonlinearity {
    type Err = RecognitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pow3" => Ok(IcaNonlinearity::Pow3),
            "tanh" => Ok(IcaNonlinearity::Tanh),
            "gauss" => Ok(IcaNonlinearity::Gauss),
            _ => Err(RecognitionError::UnknownSelector {
                kind: "ICA nonlinearity",
                value: s.to_string(),
                expected: "pow3, tanh, gauss",
            }),
        }
    }
}

/// Distance used by the kNN classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    L1,
    L2,
    Cosine,
}

impl FromStr for DistanceMetric {
    type Err = RecognitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L1" => Ok(DistanceMetric::L1),
            "L2" => Ok(DistanceMetric::L2),
            "COS" => Ok(DistanceMetric::Cosine),
            _ => Err(RecognitionError::UnknownSelector {
                kind: "distance",
                value: s.to_string(),
                expected: "L1, L2, COS",
            }),
        }
    }
}

/// Shape of the per-class covariance estimated by the Bayes classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CovarianceModel {
    Full,
    Diagonal,
}

impl FromStr for CovarianceModel {
    type Err = RecognitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(CovarianceModel::Full),
            "diag" => Ok(CovarianceModel::Diagonal),
            _ => Err(RecognitionError::UnknownSelector {
                kind: "Bayes covariance model",
                value: s.to_string(),
                expected: "full, diag",
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PcaParams {
    /// Number of principal components. `None` means `min(m, n - 1)`.
    pub n1: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LdaParams {
    /// PCA stage dimension. `None` means `n - c`.
    pub n1: Option<usize>,
    /// Number of discriminant directions. `None` means `c - 1`.
    pub n2: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaParams {
    /// Whitening dimension. `None` means `min(m, n - 1)`.
    pub n1: Option<usize>,
    /// Number of independent components. `None` means `n1`.
    pub n2: Option<usize>,
    pub nonlinearity: IcaNonlinearity,
    pub max_iterations: usize,
    pub epsilon: f64,
    /// Turn non-convergence into an error instead of a logged warning.
    pub require_convergence: bool,
}

impl Default for IcaParams {
    fn default() -> Self {
        Self {
            n1: None,
            n2: None,
            nonlinearity: IcaNonlinearity::Pow3,
            max_iterations: 1000,
            epsilon: 0.0001,
            require_convergence: false,
        }
    }
}

/// A feature extraction algorithm together with its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureExtractor {
    Identity,
    Pca(PcaParams),
    Lda(LdaParams),
    Ica(IcaParams),
}

/// Discriminant of [`FeatureExtractor`]. Its ordering is the canonical
/// order of trained sections in a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    Identity,
    Pca,
    Lda,
    Ica,
}

impl FeatureExtractor {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureExtractor::Identity => FeatureKind::Identity,
            FeatureExtractor::Pca(_) => FeatureKind::Pca,
            FeatureExtractor::Lda(_) => FeatureKind::Lda,
            FeatureExtractor::Ica(_) => FeatureKind::Ica,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Identity => "identity",
            FeatureKind::Pca => "PCA",
            FeatureKind::Lda => "LDA",
            FeatureKind::Ica => "ICA",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnParams {
    pub k: usize,
    pub distance: DistanceMetric,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            k: 1,
            distance: DistanceMetric::L2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesParams {
    pub covariance: CovarianceModel,
}

impl Default for BayesParams {
    fn default() -> Self {
        Self {
            covariance: CovarianceModel::Full,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassifierKind {
    Knn(KnnParams),
    Bayes(BayesParams),
}

impl Default for ClassifierKind {
    fn default() -> Self {
        ClassifierKind::Knn(KnnParams::default())
    }
}

/// Everything a [`crate::model::ClassificationModel`] needs to train and predict.
///
/// The same configuration must be supplied when loading a saved model: the
/// file does not record which feature algorithms it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub features: Vec<FeatureExtractor>,
    pub classifier: ClassifierKind,
    /// Seed for the ICA weight initialisation.
    pub random_seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            features: vec![FeatureExtractor::Pca(PcaParams::default())],
            classifier: ClassifierKind::default(),
            random_seed: 2_718_281_828,
        }
    }
}

fn positive(name: &str, value: Option<usize>) -> Result<()> {
    match value {
        Some(0) => Err(RecognitionError::InvalidParameter(format!(
            "{} must be at least 1",
            name
        ))),
        _ => Ok(()),
    }
}

impl ModelConfig {
    /// Features in canonical order.
    pub fn ordered_features(&self) -> Vec<&FeatureExtractor> {
        let mut features: Vec<&FeatureExtractor> = self.features.iter().collect();
        features.sort_by_key(|f| f.kind());
        features
    }

    /// Checks every hyperparameter before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(RecognitionError::InvalidParameter(
                "at least one feature algorithm must be enabled".to_string(),
            ));
        }
        let mut kinds: Vec<FeatureKind> = self.features.iter().map(|f| f.kind()).collect();
        kinds.sort();
        if let Some(pair) = kinds.windows(2).find(|w| w[0] == w[1]) {
            return Err(RecognitionError::InvalidParameter(format!(
                "feature algorithm {} configured more than once",
                pair[0]
            )));
        }

        for feature in &self.features {
            match feature {
                FeatureExtractor::Identity => {}
                FeatureExtractor::Pca(p) => positive("pca n1", p.n1)?,
                FeatureExtractor::Lda(p) => {
                    positive("lda n1", p.n1)?;
                    positive("lda n2", p.n2)?;
                    if let (Some(n1), Some(n2)) = (p.n1, p.n2) {
                        if n2 > n1 {
                            return Err(RecognitionError::InvalidParameter(format!(
                                "lda n2 ({}) cannot exceed lda n1 ({})",
                                n2, n1
                            )));
                        }
                    }
                }
                FeatureExtractor::Ica(p) => {
                    positive("ica n1", p.n1)?;
                    positive("ica n2", p.n2)?;
                    if let (Some(n1), Some(n2)) = (p.n1, p.n2) {
                        if n2 > n1 {
                            return Err(RecognitionError::InvalidParameter(format!(
                                "ica n2 ({}) cannot exceed ica n1 ({})",
                                n2, n1
                            )));
                        }
                    }
                    if p.max_iterations == 0 {
                        return Err(RecognitionError::InvalidParameter(
                            "ica max_iterations must be at least 1".to_string(),
                        ));
                    }
                    if !(p.epsilon.is_finite() && p.epsilon > 0.0) {
                        return Err(RecognitionError::InvalidParameter(format!(
                            "ica epsilon must be positive, got {}",
                            p.epsilon
                        )));
                    }
                }
            }
        }

        if let ClassifierKind::Knn(knn) = &self.classifier {
            if knn.k == 0 {
                return Err(RecognitionError::InvalidParameter(
                    "knn k must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}
