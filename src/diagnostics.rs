// src/diagnostics.rs

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Outcome of the fixed-point iteration for one independent component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConvergence {
    pub component: usize,
    /// Iterations actually run (at most `max_iterations`).
    pub iterations: usize,
    pub converged: bool,
    /// `1 - |wᵗ·w_old|` after the last update.
    pub final_delta: f64,
}

/// Per-run record of an ICA fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcaDiagnostics {
    pub components: Vec<ComponentConvergence>,
    /// ||I - BᵗB||_F of the unmixing directions in whitened space.
    pub orthogonality_error: Option<f64>,
}

impl IcaDiagnostics {
    pub fn all_converged(&self) -> bool {
        self.components.iter().all(|c| c.converged)
    }

    /// Components that hit the iteration limit.
    pub fn unconverged(&self) -> impl Iterator<Item = &ComponentConvergence> {
        self.components.iter().filter(|c| !c.converged)
    }

    pub fn total_iterations(&self) -> usize {
        self.components.iter().map(|c| c.iterations).sum()
    }
}

/// Frobenius norm of a matrix.
pub fn compute_frob_norm(matrix: &ArrayView2<f64>) -> f64 {
    matrix.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Computes orthogonality error ||I - QᵗQ||_F.
pub fn compute_orthogonality_error(q_matrix: &ArrayView2<f64>) -> Option<f64> {
    if q_matrix.nrows() == 0 || q_matrix.ncols() == 0 {
        return None;
    }
    let qtq = q_matrix.t().dot(q_matrix);
    let diff = Array2::<f64>::eye(qtq.nrows()) - qtq;
    Some(compute_frob_norm(&diff.view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn orthonormal_columns_have_zero_error() {
        let q = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let err = compute_orthogonality_error(&q.view()).unwrap();
        assert!(err < 1e-15);

        let skewed = array![[1.0, 1.0], [0.0, 1.0]];
        assert!(compute_orthogonality_error(&skewed.view()).unwrap() > 0.5);
        assert!(compute_orthogonality_error(&Array2::<f64>::zeros((0, 2)).view()).is_none());
    }

    #[test]
    fn summary_counts_unconverged_components() {
        let diagnostics = IcaDiagnostics {
            components: vec![
                ComponentConvergence { component: 0, iterations: 12, converged: true, final_delta: 1e-7 },
                ComponentConvergence { component: 1, iterations: 50, converged: false, final_delta: 0.3 },
            ],
            orthogonality_error: Some(0.0),
        };
        assert!(!diagnostics.all_converged());
        assert_eq!(diagnostics.unconverged().count(), 1);
        assert_eq!(diagnostics.total_iterations(), 62);
    }
}
