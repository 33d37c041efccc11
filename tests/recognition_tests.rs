// tests/recognition_tests.rs

use facerec::config::{
    BayesParams, ClassifierKind, CovarianceModel, DistanceMetric, FeatureExtractor, FeatureKind, IcaParams,
    KnnParams, LdaParams, ModelConfig, PcaParams,
};
use facerec::dataset::{Dataset, GenomeSource, InMemorySource};
use facerec::model::{ClassificationModel, ModelState};
use facerec::stream;
use facerec::RecognitionError;

use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::io::Cursor;
use std::sync::Once;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env).is_test(true).try_init();
    });
}

const DIM: usize = 10;

fn class_center(class: &str) -> Array1<f64> {
    match class {
        "alice" => Array1::from_shape_fn(DIM, |i| i as f64),
        _ => Array1::from_shape_fn(DIM, |i| (DIM - i) as f64 * 2.0),
    }
}

fn noisy(center: &Array1<f64>, rng: &mut ChaCha8Rng, scale: f64) -> Array1<f64> {
    center.mapv(|v| v + rng.gen_range(-scale..scale))
}

/// Two classes with three samples each, plus a labeled test set drawn around the same centers.
fn two_class_data() -> (Dataset, Dataset, InMemorySource) {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut source = InMemorySource::new();
    let mut train = Dataset::new();
    let mut test = Dataset::new();
    for class in ["alice", "bob"] {
        let center = class_center(class);
        for k in 0..3 {
            let name = format!("train/{}_{}", class, k);
            source.insert(name.clone(), noisy(&center, &mut rng, 0.5));
            train.push(name, Some(class));

            let name = format!("test/{}_{}", class, k);
            source.insert(name.clone(), noisy(&center, &mut rng, 0.5));
            test.push(name, Some(class));
        }
    }
    (train, test, source)
}

fn config(features: Vec<FeatureExtractor>, classifier: ClassifierKind) -> ModelConfig {
    ModelConfig {
        features,
        classifier,
        ..ModelConfig::default()
    }
}

fn pca4() -> FeatureExtractor {
    FeatureExtractor::Pca(PcaParams { n1: Some(4) })
}

#[test]
fn pca_knn_on_two_classes() {
    init();
    let (train, test, source) = two_class_data();
    let mut model = ClassificationModel::new(config(vec![pca4()], ClassifierKind::default())).unwrap();
    model.train(train, &source).unwrap();
    assert_eq!(model.state(), ModelState::Trained);

    let pca = model.feature(FeatureKind::Pca).unwrap();
    assert_eq!(pca.basis.as_ref().unwrap().dim(), (DIM, 4));
    assert_eq!(pca.projection.dim(), (4, 6));

    let report = model.predict(&test, &source).unwrap();
    let outcome = report.outcome(FeatureKind::Pca).unwrap();
    assert_eq!(outcome.accuracy(), Some(100.0));
    assert_eq!(format!("{}", outcome), "100.00");
    assert!(format!("{:#}", outcome).contains("6 / 6 matched, 100.00%"));
}

#[test]
fn training_samples_classify_as_themselves() {
    init();
    let (train, _, source) = two_class_data();
    for distance in [DistanceMetric::L1, DistanceMetric::L2, DistanceMetric::Cosine] {
        let classifier = ClassifierKind::Knn(KnnParams { k: 1, distance });
        let mut model = ClassificationModel::new(config(vec![pca4()], classifier)).unwrap();
        model.train(train.clone(), &source).unwrap();
        let report = model.predict(&train, &source).unwrap();
        assert_eq!(report.outcomes[0].accuracy(), Some(100.0), "{:?}", distance);
    }
}

#[test]
fn every_feature_algorithm_trains_and_predicts() {
    init();
    let (train, test, source) = two_class_data();
    let features = vec![
        FeatureExtractor::Ica(IcaParams { n1: Some(4), ..IcaParams::default() }),
        FeatureExtractor::Identity,
        FeatureExtractor::Lda(LdaParams::default()),
        pca4(),
    ];
    let mut model = ClassificationModel::new(config(features, ClassifierKind::default())).unwrap();
    model.train(train.clone(), &source).unwrap();
    assert!(model.failed_features().is_empty());

    let kinds: Vec<FeatureKind> = model.features().iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![FeatureKind::Identity, FeatureKind::Pca, FeatureKind::Lda, FeatureKind::Ica]
    );
    assert!(model.feature(FeatureKind::Identity).unwrap().basis.is_none());
    assert_eq!(model.feature(FeatureKind::Lda).unwrap().projection.nrows(), 1);
    assert!(model.feature(FeatureKind::Ica).unwrap().ica_diagnostics.is_some());

    let report = model.predict(&test, &source).unwrap();
    for kind in [FeatureKind::Identity, FeatureKind::Pca, FeatureKind::Lda] {
        assert_eq!(report.outcome(kind).unwrap().accuracy(), Some(100.0), "{}", kind);
    }
    // ICA distances equal whitened PCA distances, so exact training samples still match.
    let report = model.predict(&train, &source).unwrap();
    assert_eq!(report.outcome(FeatureKind::Ica).unwrap().accuracy(), Some(100.0));
}

#[test]
fn bayes_classifier_on_discriminant_projection() {
    init();
    let (train, test, source) = two_class_data();
    for covariance in [CovarianceModel::Full, CovarianceModel::Diagonal] {
        let classifier = ClassifierKind::Bayes(BayesParams { covariance });
        let features = vec![FeatureExtractor::Lda(LdaParams::default())];
        let mut model = ClassificationModel::new(config(features, classifier)).unwrap();
        model.train(train.clone(), &source).unwrap();
        let report = model.predict(&test, &source).unwrap();
        assert_eq!(report.outcomes[0].accuracy(), Some(100.0), "{:?}", covariance);
    }
}

#[test]
fn save_then_load_round_trips_exactly() {
    init();
    let (train, test, source) = two_class_data();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.dat");

    let cfg = config(vec![pca4()], ClassifierKind::default());
    let mut model = ClassificationModel::new(cfg.clone()).unwrap();
    model.train(train, &source).unwrap();
    model.save(&path).unwrap();
    assert_eq!(model.state(), ModelState::Persisted);

    let loaded = ClassificationModel::load(cfg, &path).unwrap();
    assert_eq!(loaded.state(), ModelState::Loaded);
    assert_eq!(loaded.dataset(), model.dataset());
    assert_eq!(loaded.mean(), model.mean());
    let (a, b) = (model.feature(FeatureKind::Pca).unwrap(), loaded.feature(FeatureKind::Pca).unwrap());
    assert_eq!(a.basis, b.basis);
    assert_eq!(a.projection, b.projection);

    let before = model.predict(&test, &source).unwrap();
    let after = loaded.predict(&test, &source).unwrap();
    assert_eq!(before.outcomes, after.outcomes);
}

#[test]
fn lda_with_too_many_discriminants_fails_alone() {
    init();
    let (train, test, source) = two_class_data();
    let features = vec![
        pca4(),
        FeatureExtractor::Lda(LdaParams { n1: None, n2: Some(2) }),
    ];
    let mut model = ClassificationModel::new(config(features, ClassifierKind::default())).unwrap();
    model.train(train, &source).unwrap();

    let failed = model.failed_features();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, FeatureKind::Lda);
    assert!(matches!(failed[0].1, RecognitionError::InsufficientSamples(_)));

    let report = model.predict(&test, &source).unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].accuracy(), Some(100.0));

    let dir = tempfile::tempdir().unwrap();
    let err = model.save(dir.path().join("model.dat")).unwrap_err();
    assert!(matches!(err, RecognitionError::InvalidState(_)));
}

#[test]
fn lifecycle_is_enforced() {
    init();
    let (train, test, source) = two_class_data();
    let mut model = ClassificationModel::new(ModelConfig::default()).unwrap();
    assert!(matches!(model.predict(&test, &source), Err(RecognitionError::InvalidState(_))));
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        model.save(dir.path().join("m.dat")),
        Err(RecognitionError::InvalidState(_))
    ));

    model.train(train.clone(), &source).unwrap();
    assert!(matches!(model.train(train, &source), Err(RecognitionError::InvalidState(_))));

    let missing = ClassificationModel::load(ModelConfig::default(), dir.path().join("absent.dat"));
    assert!(matches!(missing, Err(RecognitionError::Io { .. })));
}

#[test]
fn unlabeled_test_samples_get_predictions_without_accuracy() {
    init();
    let (train, _, mut source) = two_class_data();
    let mut model = ClassificationModel::new(config(vec![pca4()], ClassifierKind::default())).unwrap();
    model.train(train, &source).unwrap();

    source.insert("query", class_center("bob"));
    let mut unlabeled = Dataset::new();
    unlabeled.push("query", None);
    let report = model.predict(&unlabeled, &source).unwrap();
    assert_eq!(report.outcomes[0].accuracy(), None);

    let labels = model.predict_labels(&unlabeled, &source).unwrap();
    assert_eq!(labels, vec![(FeatureKind::Pca, vec![("query".to_string(), "bob".to_string())])]);
}

#[test]
fn mismatched_test_dimension_is_rejected() {
    init();
    let (train, _, mut source) = two_class_data();
    let mut model = ClassificationModel::new(config(vec![pca4()], ClassifierKind::default())).unwrap();
    model.train(train, &source).unwrap();

    source.insert("short", Array1::zeros(DIM - 1));
    let mut test = Dataset::new();
    test.push("short", Some("alice"));
    let err = model.predict(&test, &source).unwrap_err();
    assert!(matches!(err, RecognitionError::DimensionMismatch { .. }));
}

#[test]
fn stream_runs_one_pass_per_read_token() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let train_dir = dir.path().join("train");
    let stream_dir = dir.path().join("stream");
    fs::create_dir(&train_dir).unwrap();
    fs::create_dir(&stream_dir).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let to_text = |v: &Array1<f64>| v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(" ");
    for class in ["alice", "bob"] {
        let center = class_center(class);
        for k in 0..3 {
            let sample = noisy(&center, &mut rng, 0.5);
            fs::write(train_dir.join(format!("{}_{}.txt", class, k)), to_text(&sample)).unwrap();
        }
    }
    fs::write(stream_dir.join("q1.txt"), to_text(&class_center("alice"))).unwrap();
    fs::write(stream_dir.join("q2.txt"), to_text(&class_center("bob"))).unwrap();

    let mut model = ClassificationModel::new(config(vec![pca4()], ClassifierKind::default())).unwrap();
    model.train_directory(&train_dir, &GenomeSource).unwrap();

    let mut output = Vec::new();
    let passes = stream::run_stream(
        &model,
        &stream_dir,
        &GenomeSource,
        Cursor::new(b"x1\n 1?0 1".to_vec()),
        &mut output,
    )
    .unwrap();
    assert_eq!(passes, 2);

    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("q1.txt") && lines[0].ends_with("  alice"));
    assert!(lines[1].contains("q2.txt") && lines[1].ends_with("  bob"));
    assert_eq!(lines[0..2], lines[2..4]);

    // end of input also stops the loop
    let passes = stream::run_stream(&model, &stream_dir, &GenomeSource, Cursor::new(b"1".to_vec()), Vec::<u8>::new()).unwrap();
    assert_eq!(passes, 1);
}

#[test]
fn full_bayes_skips_classes_smaller_than_the_subspace() {
    init();
    let (train, test, source) = two_class_data();

    // three samples per class cannot support a full 4x4 covariance
    let full = ClassifierKind::Bayes(BayesParams { covariance: CovarianceModel::Full });
    let mut model = ClassificationModel::new(config(vec![pca4()], full)).unwrap();
    model.train(train.clone(), &source).unwrap();
    let report = model.predict(&test, &source).unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, FeatureKind::Pca);
    assert!(matches!(report.skipped[0].1, RecognitionError::InsufficientSamples(_)));

    let diagonal = ClassifierKind::Bayes(BayesParams { covariance: CovarianceModel::Diagonal });
    let mut model = ClassificationModel::new(config(vec![pca4()], diagonal)).unwrap();
    model.train(train, &source).unwrap();
    let report = model.predict(&test, &source).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.outcome(FeatureKind::Pca).unwrap().accuracy(), Some(100.0));
}

#[test]
fn singleton_class_skips_bayes_but_predict_succeeds() {
    init();
    let (mut train, test, mut source) = two_class_data();
    source.insert("train/carol_0", class_center("alice").mapv(|v| -v));
    train.push("train/carol_0", Some("carol"));

    let features = vec![FeatureExtractor::Identity, FeatureExtractor::Pca(PcaParams { n1: Some(2) })];
    let diagonal = ClassifierKind::Bayes(BayesParams { covariance: CovarianceModel::Diagonal });
    let mut model = ClassificationModel::new(config(features, diagonal)).unwrap();
    model.train(train, &source).unwrap();
    assert!(model.failed_features().is_empty());

    let report = model.predict(&test, &source).unwrap();
    assert!(report.outcomes.is_empty());
    let skipped: Vec<FeatureKind> = report.skipped.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(skipped, vec![FeatureKind::Identity, FeatureKind::Pca]);
    for (_, e) in &report.skipped {
        assert!(matches!(e, RecognitionError::InsufficientSamples(_)));
    }
}

#[test]
fn stream_over_empty_directory_keeps_serving() {
    init();
    let (train, _, source) = two_class_data();
    let mut model = ClassificationModel::new(config(vec![pca4()], ClassifierKind::default())).unwrap();
    model.train(train, &source).unwrap();

    let empty = tempfile::tempdir().unwrap();
    let mut output = Vec::new();
    let passes = stream::run_stream(&model, empty.path(), &source, Cursor::new(b"1 1 0 1".to_vec()), &mut output)
        .unwrap();
    assert_eq!(passes, 2);
    assert!(output.is_empty());
}

#[test]
fn lda_only_model_file_has_no_pca_section() {
    init();
    let (train, _, source) = two_class_data();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lda.dat");

    let lda_only = config(vec![FeatureExtractor::Lda(LdaParams::default())], ClassifierKind::default());
    let mut model = ClassificationModel::new(lda_only.clone()).unwrap();
    model.train(train, &source).unwrap();
    model.save(&path).unwrap();

    let loaded = ClassificationModel::load(lda_only, &path).unwrap();
    assert_eq!(loaded.features().len(), 1);
    assert_eq!(loaded.features()[0].kind, FeatureKind::Lda);

    // a reader expecting PCA before LDA runs out of data
    let with_pca = config(
        vec![pca4(), FeatureExtractor::Lda(LdaParams::default())],
        ClassifierKind::default(),
    );
    assert!(ClassificationModel::load(with_pca, &path).is_err());
}
