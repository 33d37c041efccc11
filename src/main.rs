//! Command-line front end.
//!
//! Usage:
//!   facerec [OPTIONS]
//!
//! Examples:
//!   # Train a PCA model on a directory of labeled PGM images and save it
//!   facerec --train data/train --pca --pca_n1 20
//!
//!   # Load the saved model and report accuracy on a test directory
//!   facerec --test data/test --pca
//!
//!   # Serve predictions: each '1' on stdin classifies data/stream, '0' quits
//!   facerec --stream data/stream --lda --bayes

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use log::{info, warn};

use facerec::config::{
    BayesParams, ClassifierKind, CovarianceModel, DistanceMetric, FeatureExtractor, IcaNonlinearity, IcaParams,
    KnnParams, LdaParams, ModelConfig, PcaParams,
};
use facerec::dataset::DataType;
use facerec::linalg_backends::BackendSession;
use facerec::model::ClassificationModel;
use facerec::stream;

#[derive(Parser)]
#[command(name = "facerec")]
#[command(about = "Subspace face and genome recognition (PCA / LDA / ICA with kNN or Bayes)")]
#[command(version)]
#[command(group(ArgGroup::new("mode").required(true).multiple(true).args(["train", "test", "stream"])))]
#[command(group(ArgGroup::new("feature").args(["pca", "lda", "ica"])))]
struct Args {
    /// Use the accelerated linear algebra backend if it was compiled in
    #[arg(long)]
    gpu: bool,

    /// Log level (0=warn, [1]=info, 2=debug, 3=trace)
    #[arg(long, default_value = "1")]
    loglevel: u8,

    /// Train a model with a training set
    #[arg(long, value_name = "DIR")]
    train: Option<PathBuf>,

    /// Perform recognition on a test set
    #[arg(long, value_name = "DIR")]
    test: Option<PathBuf>,

    /// Perform recognition on an input stream
    #[arg(long, value_name = "DIR", conflicts_with = "test")]
    stream: Option<PathBuf>,

    /// Model file
    #[arg(long, value_name = "PATH", default_value = "./model.dat")]
    model: PathBuf,

    /// Data type (genome, [image])
    #[arg(long, default_value = "image")]
    data: DataType,

    /// Use PCA for feature extraction
    #[arg(long)]
    pca: bool,

    /// Use LDA for feature extraction
    #[arg(long)]
    lda: bool,

    /// Use ICA for feature extraction
    #[arg(long)]
    ica: bool,

    /// Use the kNN classifier (default)
    #[arg(long)]
    knn: bool,

    /// Use the Bayes classifier
    #[arg(long, conflicts_with = "knn")]
    bayes: bool,

    /// Number of principal components to compute
    #[arg(long = "pca_n1", value_name = "N")]
    pca_n1: Option<usize>,

    /// Number of principal components to compute
    #[arg(long = "lda_n1", value_name = "N")]
    lda_n1: Option<usize>,

    /// Number of Fisherfaces to compute
    #[arg(long = "lda_n2", value_name = "N")]
    lda_n2: Option<usize>,

    /// Number of principal components to compute
    #[arg(long = "ica_n1", value_name = "N")]
    ica_n1: Option<usize>,

    /// Number of independent components to estimate
    #[arg(long = "ica_n2", value_name = "N")]
    ica_n2: Option<usize>,

    /// Nonlinearity function to use ([pow3], tanh, gauss)
    #[arg(long = "ica_nonl", default_value = "pow3")]
    ica_nonl: IcaNonlinearity,

    /// Maximum iterations
    #[arg(long = "ica_max_iter", value_name = "N", default_value = "1000")]
    ica_max_iter: usize,

    /// Convergence threshold for w
    #[arg(long = "ica_eps", value_name = "X", default_value = "0.0001")]
    ica_eps: f64,

    /// Fail instead of warning when an ICA component does not converge
    #[arg(long = "ica_require_convergence")]
    ica_require_convergence: bool,

    /// Number of nearest neighbors to use
    #[arg(long = "knn_k", value_name = "N", default_value = "1")]
    knn_k: usize,

    /// Distance function to use (L1, [L2], COS)
    #[arg(long = "knn_dist", default_value = "L2")]
    knn_dist: DistanceMetric,

    /// Bayes class covariance ([full], diag)
    #[arg(long = "bayes_cov", default_value = "full")]
    bayes_cov: CovarianceModel,

    /// Seed for the ICA weight initialisation
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn model_config(&self) -> ModelConfig {
        let feature = if self.pca {
            FeatureExtractor::Pca(PcaParams { n1: self.pca_n1 })
        } else if self.lda {
            FeatureExtractor::Lda(LdaParams {
                n1: self.lda_n1,
                n2: self.lda_n2,
            })
        } else if self.ica {
            FeatureExtractor::Ica(IcaParams {
                n1: self.ica_n1,
                n2: self.ica_n2,
                nonlinearity: self.ica_nonl,
                max_iterations: self.ica_max_iter,
                epsilon: self.ica_eps,
                require_convergence: self.ica_require_convergence,
            })
        } else {
            FeatureExtractor::Identity
        };

        let classifier = if self.bayes {
            ClassifierKind::Bayes(BayesParams {
                covariance: self.bayes_cov,
            })
        } else {
            ClassifierKind::Knn(KnnParams {
                k: self.knn_k,
                distance: self.knn_dist,
            })
        };

        let defaults = ModelConfig::default();
        ModelConfig {
            features: vec![feature],
            classifier,
            random_seed: self.seed.unwrap_or(defaults.random_seed),
        }
    }
}

fn init_logging(loglevel: u8) {
    let level = match loglevel {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.loglevel);

    let config = args.model_config();
    config.validate().context("invalid configuration")?;

    let session = BackendSession::init(args.gpu);
    let source = args.data.source();

    let mut model = match &args.train {
        Some(dir) => {
            let mut model = ClassificationModel::new(config)?;
            model
                .train_directory(dir, source.as_ref())
                .with_context(|| format!("training on {}", dir.display()))?;
            model
        }
        None => ClassificationModel::load(config, &args.model)
            .with_context(|| format!("loading model {}", args.model.display()))?,
    };

    if let Some(dir) = &args.test {
        let report = model
            .predict_directory(dir, source.as_ref())
            .with_context(|| format!("testing on {}", dir.display()))?;
        for (kind, e) in &report.skipped {
            warn!("{} was not evaluated: {}", kind, e);
        }
        for outcome in &report.outcomes {
            if args.loglevel >= 2 {
                println!("{:#}\n", outcome);
            } else {
                println!("{}", outcome);
            }
        }
    } else if let Some(dir) = &args.stream {
        let stdin = io::stdin();
        let stdout = io::stdout();
        stream::run_stream(&model, dir, source.as_ref(), stdin.lock(), stdout.lock())
            .with_context(|| format!("streaming from {}", dir.display()))?;
    } else {
        model
            .save(&args.model)
            .with_context(|| format!("saving model {}", args.model.display()))?;
    }

    for (kind, e) in model.failed_features() {
        warn!("{} could not be trained: {}", kind, e);
    }
    info!(
        "Done ({} backend{})",
        facerec::linalg_backends::backend_name(),
        if session.is_accelerated() { ", accelerated" } else { "" }
    );
    Ok(())
}
