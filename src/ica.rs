// src/ica.rs

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

use crate::config::{IcaNonlinearity, IcaParams};
use crate::diagnostics::{self, ComponentConvergence, IcaDiagnostics};
use crate::error::{RecognitionError, Result};
use crate::matrix::{self, Matrix};
use crate::pca;

/// Whitening eigenvalues at or below this fraction of the largest mean the
/// requested dimension exceeds the rank of the data.
const WHITENING_TOLERANCE: f64 = 1e-10;

/// Weight vectors shorter than this after orthogonalization are degenerate.
const DEGENERATE_NORM: f64 = 1e-12;

/// Learned ICA basis and how each component's iteration ended.
#[derive(Debug, Clone)]
pub struct IcaBasis {
    /// `W_pca · D^{-1/2} · B`
    /// Shape: (n_features, n2)
    pub basis: Matrix,
    pub diagnostics: IcaDiagnostics,
}

/// `g(u)` and `g'(u)` of the contrast function.
fn contrast(nonlinearity: IcaNonlinearity, u: f64) -> (f64, f64) {
    match nonlinearity {
        IcaNonlinearity::Pow3 => (u * u * u, 3.0 * u * u),
        IcaNonlinearity::Tanh => {
            let t = u.tanh();
            (t, 1.0 - t * t)
        }
        IcaNonlinearity::Gauss => {
            let e = (-0.5 * u * u).exp();
            (u * e, (1.0 - u * u) * e)
        }
    }
}

/// Removes the projections of `w` onto the first `found` columns of `b`.
fn deflate(w: &mut Array1<f64>, b: &Array2<f64>, found: usize) {
    for prev in b.columns().into_iter().take(found) {
        let proj = w.dot(&prev);
        w.scaled_add(-proj, &prev);
    }
}

fn unit(mut w: Array1<f64>) -> Option<Array1<f64>> {
    let norm = w.dot(&w).sqrt();
    if !norm.is_finite() || norm < DEGENERATE_NORM {
        return None;
    }
    w /= norm;
    Some(w)
}

/// Fits independent components to centered `x` (features × samples) by
/// deflationary FastICA on PCA-whitened data.
///
/// Each component starts from a Gaussian vector drawn from a ChaCha8 stream
/// seeded with `seed`, so fits are reproducible.
///
/// # Errors
/// * `InsufficientSamples` when `n2 > n1`, or when the data has fewer than
///   `n1` non-degenerate principal directions.
/// * `NonConvergence` for the first component that hits `max_iterations`,
///   only when `params.require_convergence` is set.
pub fn fit(x: &Matrix, params: &IcaParams, seed: u64) -> Result<IcaBasis> {
    let (n_features, n_samples) = x.dim();
    let n1 = params
        .n1
        .unwrap_or_else(|| pca::default_components(n_features, n_samples));
    let n2 = params.n2.unwrap_or(n1);
    if n2 == 0 || n2 > n1 {
        return Err(RecognitionError::InsufficientSamples(format!(
            "ICA n2 ({}) must be between 1 and the whitening dimension n1 ({})",
            n2, n1
        )));
    }

    let start_time = std::time::Instant::now();
    let pca_stage = pca::fit(x, Some(n1))?;
    let largest = pca_stage.eigenvalues.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    if let Some(pos) = pca_stage
        .eigenvalues
        .iter()
        .position(|&v| v <= WHITENING_TOLERANCE * largest)
    {
        return Err(RecognitionError::InsufficientSamples(format!(
            "ICA whitening dimension {} exceeds the rank of the data (principal direction {} has no variance)",
            n1, pos
        )));
    }

    // whitening: D^{-1/2} · W_pcaᵗ, (n1 × m)
    let inv_sqrt = pca_stage.eigenvalues.mapv(|v| 1.0 / v.sqrt());
    let whitening = &pca_stage.basis.t() * &inv_sqrt.insert_axis(Axis(1));
    let z = whitening.dot(x);
    debug!("ICA whitened data to {}x{}", z.nrows(), z.ncols());

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| RecognitionError::InvalidParameter(format!("ICA initial distribution: {}", e)))?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = n_samples as f64;

    let mut b = Array2::<f64>::zeros((n1, n2));
    let mut components = Vec::with_capacity(n2);
    for p in 0..n2 {
        // Redraw until the start vector survives deflation.
        let mut w = loop {
            let mut candidate = Array1::random_using(n1, normal, &mut rng);
            deflate(&mut candidate, &b, p);
            if let Some(w) = unit(candidate) {
                break w;
            }
        };

        let mut converged = false;
        let mut delta = f64::INFINITY;
        let mut iterations = 0;
        while iterations < params.max_iterations {
            iterations += 1;
            let u = z.t().dot(&w);
            let mut g = Array1::<f64>::zeros(n_samples);
            let mut g_prime_sum = 0.0;
            for (gi, &ui) in g.iter_mut().zip(u.iter()) {
                let (value, derivative) = contrast(params.nonlinearity, ui);
                *gi = value;
                g_prime_sum += derivative;
            }

            let mut w_new = z.dot(&g) / n;
            w_new.scaled_add(-g_prime_sum / n, &w);
            deflate(&mut w_new, &b, p);
            let w_new = match unit(w_new) {
                Some(w_new) => w_new,
                None => {
                    warn!("ICA component {} collapsed at iteration {}; keeping last iterate", p, iterations);
                    break;
                }
            };

            delta = 1.0 - w_new.dot(&w).abs();
            w = w_new;
            if delta < params.epsilon {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "ICA component {} did not converge in {} iterations (delta {:e}); keeping last iterate",
                p, iterations, delta
            );
            if params.require_convergence {
                return Err(RecognitionError::NonConvergence {
                    component: p,
                    iterations,
                });
            }
        } else {
            debug!("ICA component {} converged after {} iterations", p, iterations);
        }

        b.column_mut(p).assign(&w);
        components.push(ComponentConvergence {
            component: p,
            iterations,
            converged,
            final_delta: delta,
        });
    }

    let basis = whitening.t().dot(&b);
    matrix::ensure_finite(&basis, "ICA basis")?;
    let diagnostics = IcaDiagnostics {
        orthogonality_error: diagnostics::compute_orthogonality_error(&b.view()),
        components,
    };

    info!(
        "ICA computed {} components (whitening {}, {} iterations total, {} unconverged) in {:?}",
        n2,
        n1,
        diagnostics.total_iterations(),
        diagnostics.unconverged().count(),
        start_time.elapsed()
    );
    Ok(IcaBasis { basis, diagnostics })
}
