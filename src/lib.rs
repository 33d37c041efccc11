// Subspace face and genome recognition

#![doc = include_str!("../README.md")]

pub mod bayes;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod ica;
pub mod knn;
pub mod lda;
pub mod linalg_backends;
pub mod matrix;
pub mod model;
pub mod model_file;
pub mod pca;
pub mod stream;

pub use config::{
    BayesParams, ClassifierKind, CovarianceModel, DistanceMetric, FeatureExtractor, FeatureKind,
    IcaNonlinearity, IcaParams, KnnParams, LdaParams, ModelConfig, PcaParams,
};
pub use dataset::{DataEntry, DataLabel, DataType, Dataset, SampleSource};
pub use error::{RecognitionError, Result};
pub use matrix::Matrix;
pub use model::{ClassificationModel, ModelState, PredictionReport};

#[cfg(test)]
mod pca_tests;
