use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use facerec::config::{BayesParams, CovarianceModel, DistanceMetric, IcaParams, KnnParams};
use facerec::{bayes::BayesClassifier, ica, knn, matrix, pca};
use ndarray::{Array, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Random centered data, features × samples.
fn generate_data(n_features: usize, n_samples: usize) -> Array2<f64> {
    let mut x = Array::random((n_features, n_samples), Uniform::new(0., 10.));
    let mean = matrix::mean_column(&x).unwrap();
    matrix::subtract_columns(&mut x, &mean).unwrap();
    x
}

fn round_robin_labels(n_samples: usize, n_classes: usize) -> Vec<usize> {
    (0..n_samples).map(|j| j % n_classes).collect()
}

fn bench_pca_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("pca_fit");

    // Tall shapes use the covariance path, wide ones the Gram path.
    for &(n_features, n_samples) in [(50, 200), (200, 500), (4096, 100)].iter() {
        let data = generate_data(n_features, n_samples);
        group.throughput(Throughput::Elements((n_samples * n_features) as u64));
        group.bench_with_input(
            BenchmarkId::new("fit", format!("{}x{}", n_features, n_samples)),
            &data,
            |b, x| b.iter(|| pca::fit(x, Some(20)).unwrap()),
        );
    }
    group.finish();
}

fn bench_ica_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ica_fit");
    group.sample_size(20);

    let data = generate_data(400, 80);
    let params = IcaParams {
        n1: Some(20),
        n2: Some(10),
        max_iterations: 200,
        ..IcaParams::default()
    };
    group.bench_function("fit/400x80", |b| b.iter(|| ica::fit(&data, &params, 42).unwrap()));
    group.finish();
}

fn bench_classifiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    let p = generate_data(20, 400);
    let labels = round_robin_labels(400, 10);
    let probe = generate_data(20, 1);

    for (name, distance) in [("L1", DistanceMetric::L1), ("L2", DistanceMetric::L2), ("COS", DistanceMetric::Cosine)] {
        let params = KnnParams { k: 5, distance };
        group.bench_function(BenchmarkId::new("knn", name), |b| {
            b.iter(|| knn::classify(&p, &labels, probe.column(0), &params).unwrap())
        });
    }

    for (name, covariance) in [("full", CovarianceModel::Full), ("diag", CovarianceModel::Diagonal)] {
        let params = BayesParams { covariance };
        group.bench_function(BenchmarkId::new("bayes_fit", name), |b| {
            b.iter(|| BayesClassifier::fit(&p, &labels, 10, &params).unwrap())
        });
        let fitted = BayesClassifier::fit(&p, &labels, 10, &params).unwrap();
        group.bench_function(BenchmarkId::new("bayes_classify", name), |b| {
            b.iter(|| fitted.classify(probe.column(0)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pca_fit, bench_ica_fit, bench_classifiers);
criterion_main!(benches);
