// src/model.rs

use log::{debug, info, warn};
use ndarray::ArrayView1;
use rayon::prelude::*;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::bayes::BayesClassifier;
use crate::config::{ClassifierKind, FeatureExtractor, FeatureKind, KnnParams, ModelConfig};
use crate::dataset::{Dataset, SampleSource};
use crate::diagnostics::IcaDiagnostics;
use crate::error::{RecognitionError, Result};
use crate::matrix::{self, Matrix};
use crate::model_file::{self, ModelFileContents, ModelSection};
use crate::{ica, knn, lda, pca};

/// Lifecycle of a [`ClassificationModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Untrained,
    Trained,
    Persisted,
    Loaded,
}

/// Basis and training projections of one feature algorithm.
#[derive(Debug, Clone)]
pub struct TrainedFeature {
    pub kind: FeatureKind,
    /// `None` for the identity variant, which uses centered samples directly.
    pub basis: Option<Matrix>,
    /// Shape: (n_out, n_train)
    pub projection: Matrix,
    /// Present only for ICA trained in this process.
    pub ica_diagnostics: Option<IcaDiagnostics>,
}

impl TrainedFeature {
    /// `Wᵗ · x_centered`, or `x_centered` itself for the identity variant.
    pub fn project(&self, x_centered: &Matrix) -> Result<Matrix> {
        match &self.basis {
            Some(w) => matrix::product(w, x_centered, true, false),
            None => Ok(x_centered.clone()),
        }
    }
}

/// Prediction for one test entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub name: String,
    pub predicted: String,
    /// Ground-truth label name, if the test entry is labeled.
    pub expected: Option<String>,
}

impl Prediction {
    pub fn is_correct(&self) -> bool {
        self.expected.as_deref() == Some(self.predicted.as_str())
    }
}

/// Predictions of one feature algorithm over a test set.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmOutcome {
    pub kind: FeatureKind,
    pub predictions: Vec<Prediction>,
}

impl AlgorithmOutcome {
    pub fn correct(&self) -> usize {
        self.predictions.iter().filter(|p| p.is_correct()).count()
    }

    /// Percentage of labeled test entries predicted correctly.
    pub fn accuracy(&self) -> Option<f64> {
        let labeled = self.predictions.iter().filter(|p| p.expected.is_some()).count();
        if labeled == 0 {
            None
        } else {
            Some(100.0 * self.correct() as f64 / labeled as f64)
        }
    }
}

/// Prints the accuracy as `{:.2}`; the alternate form lists every prediction first.
impl fmt::Display for AlgorithmOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "  {}", self.kind)?;
            for p in &self.predictions {
                let base = Path::new(&p.name)
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.name.clone());
                let marker = match &p.expected {
                    Some(expected) if expected != &p.predicted => "(!)",
                    _ => "",
                };
                writeln!(f, "    {:<10} -> {:<4} {}", base, p.predicted, marker)?;
            }
            match self.accuracy() {
                Some(accuracy) => write!(
                    f,
                    "    {} / {} matched, {:.2}%",
                    self.correct(),
                    self.predictions.len(),
                    accuracy
                ),
                None => write!(f, "    {} unlabeled samples", self.predictions.len()),
            }
        } else {
            match self.accuracy() {
                Some(accuracy) => write!(f, "{:.2}", accuracy),
                None => write!(f, "-"),
            }
        }
    }
}

/// Result of one predict pass.
#[derive(Debug, Default)]
pub struct PredictionReport {
    pub outcomes: Vec<AlgorithmOutcome>,
    /// Algorithms whose classifier could not be built, with the reason.
    pub skipped: Vec<(FeatureKind, RecognitionError)>,
}

impl PredictionReport {
    pub fn outcome(&self, kind: FeatureKind) -> Option<&AlgorithmOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}

enum Classifier<'a> {
    Knn {
        projection: &'a Matrix,
        labels: &'a [usize],
        params: &'a KnnParams,
    },
    Bayes(BayesClassifier),
}

impl Classifier<'_> {
    fn classify(&self, sample: ArrayView1<f64>) -> Result<usize> {
        match self {
            Classifier::Knn {
                projection,
                labels,
                params,
            } => knn::classify(projection, labels, sample, params),
            Classifier::Bayes(bayes) => bayes.classify(sample),
        }
    }
}

/// Training catalog, mean sample and one trained section per configured
/// feature algorithm.
#[derive(Debug)]
pub struct ClassificationModel {
    config: ModelConfig,
    state: ModelState,
    dataset: Dataset,
    mean: Option<Matrix>,
    features: Vec<TrainedFeature>,
    failed: Vec<(FeatureKind, RecognitionError)>,
}

impl ClassificationModel {
    /// Validates `config` and returns an untrained model.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Model configuration: {}",
            serde_json::to_string(&config).unwrap_or_else(|e| format!("<unserializable: {}>", e))
        );
        Ok(Self {
            config,
            state: ModelState::Untrained,
            dataset: Dataset::new(),
            mean: None,
            features: Vec::new(),
            failed: Vec::new(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Mean training sample as an `m × 1` column.
    pub fn mean(&self) -> Option<&Matrix> {
        self.mean.as_ref()
    }

    /// Successfully trained algorithms in canonical order.
    pub fn features(&self) -> &[TrainedFeature] {
        &self.features
    }

    pub fn feature(&self, kind: FeatureKind) -> Option<&TrainedFeature> {
        self.features.iter().find(|f| f.kind == kind)
    }

    /// Algorithms that could not be trained on this data set.
    pub fn failed_features(&self) -> &[(FeatureKind, RecognitionError)] {
        &self.failed
    }

    /// Trains every configured algorithm on the labeled `dataset`.
    ///
    /// `InsufficientSamples` and `UndersampledScatter` only disqualify the
    /// algorithm that raised them; see [`Self::failed_features`]. Any other
    /// error aborts training and leaves the model untrained.
    pub fn train(&mut self, dataset: Dataset, source: &dyn SampleSource) -> Result<()> {
        if self.state != ModelState::Untrained {
            return Err(RecognitionError::InvalidState(format!(
                "train requires an untrained model, model is {:?}",
                self.state
            )));
        }
        let start_time = std::time::Instant::now();
        let labels = dataset.label_indices()?;
        let n_classes = dataset.labels().len();
        info!("Training set: {} samples, {} classes", dataset.len(), n_classes);

        let mut x = dataset.sample_matrix(source)?;
        let mean = matrix::mean_column(&x)?;
        matrix::subtract_columns(&mut x, &mean)?;
        matrix::ensure_finite(&x, "centered training samples")?;

        let mut features = Vec::new();
        let mut failed = Vec::new();
        for extractor in self.config.ordered_features() {
            let kind = extractor.kind();
            let fitted = match extractor {
                FeatureExtractor::Identity => Ok((None, None)),
                FeatureExtractor::Pca(params) => {
                    pca::fit(&x, params.n1).map(|p| (Some(p.basis), None))
                }
                FeatureExtractor::Lda(params) => {
                    lda::fit(&x, &labels, n_classes, params).map(|l| (Some(l.basis), None))
                }
                FeatureExtractor::Ica(params) => ica::fit(&x, params, self.config.random_seed)
                    .map(|i| (Some(i.basis), Some(i.diagnostics))),
            };

            match fitted {
                Ok((basis, ica_diagnostics)) => {
                    let projection = match &basis {
                        Some(w) => matrix::product(w, &x, true, false)?,
                        None => x.clone(),
                    };
                    matrix::ensure_finite(&projection, "training projection")?;
                    if let Some(diagnostics) = &ica_diagnostics {
                        debug!(
                            "ICA diagnostics: {}",
                            serde_json::to_string(diagnostics).unwrap_or_default()
                        );
                    }
                    debug!(
                        "{}: projection {}x{}",
                        kind,
                        projection.nrows(),
                        projection.ncols()
                    );
                    features.push(TrainedFeature {
                        kind,
                        basis,
                        projection,
                        ica_diagnostics,
                    });
                }
                Err(e) if e.is_per_algorithm() => {
                    warn!("{} skipped: {}", kind, e);
                    failed.push((kind, e));
                }
                Err(e) => return Err(e),
            }
        }

        if features.is_empty() {
            warn!("No feature algorithm could be trained on this data set");
        }
        info!("Training finished in {:?}", start_time.elapsed());

        self.dataset = dataset;
        self.mean = Some(mean);
        self.features = features;
        self.failed = failed;
        self.state = ModelState::Trained;
        Ok(())
    }

    /// Scans a labeled directory and trains on it.
    pub fn train_directory<P: AsRef<Path>>(&mut self, path: P, source: &dyn SampleSource) -> Result<()> {
        let dataset = Dataset::from_directory(path, true)?;
        self.train(dataset, source)
    }

    fn require_predictable(&self) -> Result<&Matrix> {
        match (self.state, &self.mean) {
            (ModelState::Untrained, _) | (_, None) => Err(RecognitionError::InvalidState(
                "predict requires a trained or loaded model".to_string(),
            )),
            (_, Some(mean)) => Ok(mean),
        }
    }

    fn classifier<'a>(&'a self, feature: &'a TrainedFeature, labels: &'a [usize]) -> Result<Classifier<'a>> {
        Ok(match &self.config.classifier {
            ClassifierKind::Knn(params) => Classifier::Knn {
                projection: &feature.projection,
                labels,
                params,
            },
            ClassifierKind::Bayes(params) => Classifier::Bayes(BayesClassifier::fit(
                &feature.projection,
                labels,
                self.dataset.labels().len(),
                params,
            )?),
        })
    }

    /// Classifies every entry of `dataset` with each trained algorithm.
    ///
    /// Entries may be unlabeled; accuracy then is `None`. Per-sample
    /// classification runs in parallel with results kept in entry order.
    pub fn predict(&self, dataset: &Dataset, source: &dyn SampleSource) -> Result<PredictionReport> {
        let mean = self.require_predictable()?;
        let start_time = std::time::Instant::now();
        info!("Test set: {} samples, {} classes", dataset.len(), dataset.labels().len());

        let mut x_test = dataset.sample_matrix(source)?;
        if x_test.nrows() != mean.nrows() {
            return Err(RecognitionError::dims(
                "predict",
                format!(
                    "test samples have {} values, model was trained on {}",
                    x_test.nrows(),
                    mean.nrows()
                ),
            ));
        }
        matrix::subtract_columns(&mut x_test, mean)?;
        let train_labels = self.dataset.label_indices()?;

        let mut report = PredictionReport::default();
        for feature in &self.features {
            let classifier = match self.classifier(feature, &train_labels) {
                Ok(c) => c,
                Err(e) if e.is_per_algorithm() => {
                    warn!("{} classifier unavailable: {}", feature.kind, e);
                    report.skipped.push((feature.kind, e));
                    continue;
                }
                Err(e) => return Err(e),
            };
            let p_test = feature.project(&x_test)?;
            matrix::ensure_finite(&p_test, "test projection")?;

            let predicted: Vec<usize> = (0..p_test.ncols())
                .into_par_iter()
                .map(|j| classifier.classify(p_test.column(j)))
                .collect::<Result<Vec<usize>>>()?;

            let predictions = dataset
                .entries()
                .iter()
                .zip(predicted)
                .map(|(entry, label_idx)| Prediction {
                    name: entry.name.clone(),
                    predicted: self.dataset.labels()[label_idx].name.clone(),
                    expected: dataset.label_of(entry).map(|l| l.name.clone()),
                })
                .collect();
            let outcome = AlgorithmOutcome {
                kind: feature.kind,
                predictions,
            };
            if let Some(accuracy) = outcome.accuracy() {
                info!(
                    "{}: {} / {} matched, {:.2}%",
                    feature.kind,
                    outcome.correct(),
                    outcome.predictions.len(),
                    accuracy
                );
            }
            report.outcomes.push(outcome);
        }
        info!("Recognition finished in {:?}", start_time.elapsed());
        Ok(report)
    }

    /// Scans a labeled directory and predicts on it.
    pub fn predict_directory<P: AsRef<Path>>(&self, path: P, source: &dyn SampleSource) -> Result<PredictionReport> {
        let dataset = Dataset::from_directory(path, true)?;
        self.predict(&dataset, source)
    }

    /// Predicted label name of every entry of an unlabeled `dataset`, per algorithm.
    pub fn predict_labels(
        &self,
        dataset: &Dataset,
        source: &dyn SampleSource,
    ) -> Result<Vec<(FeatureKind, Vec<(String, String)>)>> {
        let report = self.predict(dataset, source)?;
        Ok(report
            .outcomes
            .into_iter()
            .map(|o| {
                let labels = o.predictions.into_iter().map(|p| (p.name, p.predicted)).collect();
                (o.kind, labels)
            })
            .collect())
    }

    /// Writes the model file.
    ///
    /// Refused while untrained, and when any configured algorithm failed to
    /// train, since the file cannot mark a section as absent.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mean = self.require_predictable()?.clone();
        if let Some((kind, e)) = self.failed.first() {
            return Err(RecognitionError::InvalidState(format!(
                "cannot save a model whose {} training failed ({})",
                kind, e
            )));
        }

        let contents = ModelFileContents {
            dataset: self.dataset.clone(),
            mean,
            sections: self
                .features
                .iter()
                .map(|f| ModelSection {
                    kind: f.kind,
                    basis: f.basis.clone(),
                    projection: f.projection.clone(),
                })
                .collect(),
        };
        let file = File::create(path).map_err(|e| RecognitionError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        model_file::write_model(&mut writer, &contents).map_err(|e| RecognitionError::io(path, e))?;
        info!("Saved model to {}", path.display());
        if self.state == ModelState::Trained {
            self.state = ModelState::Persisted;
        }
        Ok(())
    }

    /// Reads a model file written with the same feature configuration.
    pub fn load<P: AsRef<Path>>(config: ModelConfig, path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut model = Self::new(config)?;
        let kinds: Vec<FeatureKind> = model.config.ordered_features().iter().map(|f| f.kind()).collect();

        let file = File::open(path).map_err(|e| RecognitionError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let contents = model_file::read_model(&mut reader, &kinds, &path.display().to_string())?;

        let n_train = contents.dataset.len();
        for section in &contents.sections {
            if section.projection.ncols() != n_train {
                return Err(RecognitionError::Format {
                    path: path.display().to_string(),
                    detail: format!(
                        "{} projection has {} columns for {} entries",
                        section.kind,
                        section.projection.ncols(),
                        n_train
                    ),
                });
            }
        }
        info!(
            "Loaded model from {}: {} samples, {} classes, {} algorithms",
            path.display(),
            n_train,
            contents.dataset.labels().len(),
            contents.sections.len()
        );

        model.dataset = contents.dataset;
        model.mean = Some(contents.mean);
        model.features = contents
            .sections
            .into_iter()
            .map(|s| TrainedFeature {
                kind: s.kind,
                basis: s.basis,
                projection: s.projection,
                ica_diagnostics: None,
            })
            .collect();
        model.state = ModelState::Loaded;
        Ok(model)
    }
}
