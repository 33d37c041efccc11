use crate::error::RecognitionError;
use crate::matrix::{self, Matrix};
use crate::pca;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Random centered data, features × samples, with decaying per-feature scale
/// so the principal axes are well separated.
fn generate_centered_data(n_features: usize, n_samples: usize, seed: u64) -> Matrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut x = Array2::from_shape_fn((n_features, n_samples), |(i, _)| {
        rng.gen_range(-1.0..1.0) * (n_features - i) as f64
    });
    let mean = matrix::mean_column(&x).unwrap();
    matrix::subtract_columns(&mut x, &mean).unwrap();
    x
}

fn assert_columns_equal_up_to_sign(a: ArrayView1<f64>, b: ArrayView1<f64>, tol: f64) {
    let sign = if a.dot(&b) < 0.0 { -1.0 } else { 1.0 };
    for (x, y) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(*x, sign * y, epsilon = tol);
    }
}

fn reconstruction_error(x: &Matrix, w: &Matrix) -> f64 {
    let p = w.t().dot(x);
    let diff = x - &w.dot(&p);
    diff.iter().map(|v| v * v).sum::<f64>()
}

#[test]
fn basis_has_requested_shape_and_orthonormal_columns() {
    let x = generate_centered_data(4, 30, 42);
    let fitted = pca::fit(&x, Some(3)).unwrap();
    assert_eq!(fitted.basis.dim(), (4, 3));
    assert_eq!(fitted.eigenvalues.len(), 3);

    let gram = fitted.basis.t().dot(&fitted.basis);
    for ((i, j), v) in gram.indexed_iter() {
        assert_abs_diff_eq!(*v, if i == j { 1.0 } else { 0.0 }, epsilon = 1e-10);
    }
    assert!(fitted.eigenvalues.windows(2).into_iter().all(|w| w[0] >= w[1]));
}

#[test]
fn eigenvalues_are_projection_variances() {
    let x = generate_centered_data(5, 40, 7);
    let fitted = pca::fit(&x, None).unwrap();
    let p = fitted.basis.t().dot(&x);
    let variances = p.var_axis(Axis(1), 1.0);
    for (v, lambda) in variances.iter().zip(fitted.eigenvalues.iter()) {
        assert_abs_diff_eq!(*v, *lambda, epsilon = 1e-9);
    }
}

#[test]
fn gram_path_matches_covariance_eigenvectors() {
    // 12 features, 6 samples: the Gram path is taken.
    let x = generate_centered_data(12, 6, 3);
    let fitted = pca::fit(&x, Some(4)).unwrap();
    assert_eq!(fitted.basis.dim(), (12, 4));

    let cov = x.dot(&x.t()) / 5.0;
    let reference = matrix::eigen_descending(&cov).unwrap();
    for i in 0..4 {
        assert_abs_diff_eq!(fitted.eigenvalues[i], reference.eigenvalues[i], epsilon = 1e-9);
        assert_columns_equal_up_to_sign(
            fitted.basis.column(i),
            reference.eigenvectors.column(i),
            1e-8,
        );
    }
}

#[test]
fn reconstruction_error_decreases_with_components() {
    let x = generate_centered_data(10, 8, 11);
    let max = pca::default_components(10, 8);
    assert_eq!(max, 7);

    let errors: Vec<f64> = (1..=max)
        .map(|n1| reconstruction_error(&x, &pca::fit(&x, Some(n1)).unwrap().basis))
        .collect();
    for pair in errors.windows(2) {
        assert!(pair[1] < pair[0], "reconstruction error did not decrease: {:?}", errors);
    }
    // centered data of rank n - 1 is reproduced exactly by all components
    assert_abs_diff_eq!(errors[max - 1], 0.0, epsilon = 1e-8);
}

#[test]
fn too_many_components_are_rejected() {
    let x = generate_centered_data(3, 10, 5);
    assert_eq!(pca::default_components(3, 10), 3);
    assert!(matches!(
        pca::fit(&x, Some(4)),
        Err(RecognitionError::InsufficientSamples(_))
    ));
    assert!(matches!(
        pca::fit(&x, Some(0)),
        Err(RecognitionError::InsufficientSamples(_))
    ));

    let single = generate_centered_data(3, 1, 5);
    assert!(matches!(
        pca::fit(&single, None),
        Err(RecognitionError::InsufficientSamples(_))
    ));
}
