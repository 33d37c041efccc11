// src/knn.rs

use ndarray::ArrayView1;

use crate::config::{DistanceMetric, KnnParams};
use crate::error::{RecognitionError, Result};
use crate::matrix::Matrix;

/// Distance between two projected samples.
///
/// `Cosine` is `1 - cos(a, b)`; a zero vector is at distance 1 from everything.
pub fn distance(metric: DistanceMetric, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    match metric {
        DistanceMetric::L1 => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
        DistanceMetric::L2 => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Cosine => {
            let norm_a = a.dot(&a).sqrt();
            let norm_b = b.dot(&b).sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - a.dot(&b) / (norm_a * norm_b)
            }
        }
    }
}

/// Indices of the training columns of `p` ordered by distance to `sample`.
///
/// The sort is stable, so equidistant samples keep training order.
pub fn rank_neighbors(p: &Matrix, sample: ArrayView1<f64>, metric: DistanceMetric) -> Result<Vec<(usize, f64)>> {
    if sample.len() != p.nrows() {
        return Err(RecognitionError::dims(
            "knn",
            format!("sample has {} dimensions, projections have {}", sample.len(), p.nrows()),
        ));
    }
    let mut ranked: Vec<(usize, f64)> = p
        .columns()
        .into_iter()
        .enumerate()
        .map(|(j, col)| (j, distance(metric, col, sample)))
        .collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(ranked)
}

/// Majority vote among the `k` nearest training projections.
///
/// `train_labels[j]` is the label index of column `j` of `p`. `k` is clamped
/// to the training set size. A tied vote goes to the tied label whose
/// nearest member ranks first.
pub fn classify(p: &Matrix, train_labels: &[usize], sample: ArrayView1<f64>, params: &KnnParams) -> Result<usize> {
    if train_labels.len() != p.ncols() {
        return Err(RecognitionError::dims(
            "knn",
            format!("{} labels for {} training projections", train_labels.len(), p.ncols()),
        ));
    }
    if p.ncols() == 0 {
        return Err(RecognitionError::InsufficientSamples(
            "kNN has no training projections".to_string(),
        ));
    }

    let ranked = rank_neighbors(p, sample, params.distance)?;
    let k = params.k.clamp(1, ranked.len());

    // (label, votes) in order of first appearance among the neighbors
    let mut tally: Vec<(usize, usize)> = Vec::new();
    for &(j, _) in &ranked[..k] {
        let label = train_labels[j];
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some((_, votes)) => *votes += 1,
            None => tally.push((label, 1)),
        }
    }

    let mut best = tally[0];
    for &(label, votes) in &tally[1..] {
        if votes > best.1 {
            best = (label, votes);
        }
    }
    Ok(best.0)
}
