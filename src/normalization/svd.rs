//! Singular value decomposition by one-sided Jacobi rotations
//!
//! A compact, dependency-free SVD sufficient for the sample-dimension
//! decompositions used in bias-trend identification: the matrices are
//! (complete peptides) x (samples), so the column dimension is small.
//!
//! Sweeps of plane rotations orthogonalize the column pairs of a working
//! copy; on convergence the column norms are the singular values and the
//! accumulated rotations form the right singular vectors. Order and sign
//! are canonicalized so that repeated runs on identical input produce
//! identical output: singular values descend, and each right singular
//! vector is flipped so its largest-magnitude entry is positive.

use ndarray::{Array2, ArrayView2};

const MAX_SWEEPS: usize = 60;
const ORTHO_TOL: f64 = 1e-12;

/// Thin SVD result: singular values with matching right singular vectors
#[derive(Debug, Clone)]
pub struct Svd {
    /// Singular values, descending
    pub singular_values: Vec<f64>,
    /// Right singular vectors, one column per singular value (n_cols x n_cols)
    pub right_vectors: Array2<f64>,
}

/// Decompose `a` (m x n). Column count must be at least 1.
pub fn jacobi_svd(a: ArrayView2<'_, f64>) -> Svd {
    let (m, n) = a.dim();
    let mut u = a.to_owned();
    let mut v: Array2<f64> = Array2::eye(n);

    for _sweep in 0..MAX_SWEEPS {
        let mut rotated = false;

        for p in 0..n.saturating_sub(1) {
            for q in (p + 1)..n {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = 0.0;
                for i in 0..m {
                    let up = u[[i, p]];
                    let uq = u[[i, q]];
                    alpha += up * up;
                    beta += uq * uq;
                    gamma += up * uq;
                }

                if gamma.abs() <= ORTHO_TOL * (alpha * beta).sqrt().max(f64::MIN_POSITIVE) {
                    continue;
                }
                rotated = true;

                // Jacobi rotation angle zeroing the (p, q) inner product
                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;

                for i in 0..m {
                    let up = u[[i, p]];
                    let uq = u[[i, q]];
                    u[[i, p]] = c * up - s * uq;
                    u[[i, q]] = s * up + c * uq;
                }
                for i in 0..n {
                    let vp = v[[i, p]];
                    let vq = v[[i, q]];
                    v[[i, p]] = c * vp - s * vq;
                    v[[i, q]] = s * vp + c * vq;
                }
            }
        }

        if !rotated {
            break;
        }
    }

    // Singular values are the column norms of the rotated working copy
    let mut order: Vec<(f64, usize)> = (0..n)
        .map(|j| {
            let norm = (0..m).map(|i| u[[i, j]] * u[[i, j]]).sum::<f64>().sqrt();
            (norm, j)
        })
        .collect();
    order.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut singular_values = Vec::with_capacity(n);
    let mut right_vectors = Array2::zeros((n, n));
    for (out_col, &(sv, src_col)) in order.iter().enumerate() {
        singular_values.push(sv);

        // Canonical sign: largest-magnitude entry made positive
        let mut max_abs = 0.0;
        let mut sign = 1.0;
        for i in 0..n {
            let val = v[[i, src_col]];
            if val.abs() > max_abs {
                max_abs = val.abs();
                sign = if val < 0.0 { -1.0 } else { 1.0 };
            }
        }
        for i in 0..n {
            right_vectors[[i, out_col]] = sign * v[[i, src_col]];
        }
    }

    Svd {
        singular_values,
        right_vectors,
    }
}

impl Svd {
    /// Percent of total variance captured by each component.
    ///
    /// Shares are `s_i^2 / sum(s_j^2)` scaled to percent; the values sum to
    /// at most 100.
    pub fn variance_explained(&self) -> Vec<f64> {
        let total: f64 = self.singular_values.iter().map(|s| s * s).sum();
        if total <= 0.0 {
            return vec![0.0; self.singular_values.len()];
        }
        self.singular_values
            .iter()
            .map(|s| 100.0 * s * s / total)
            .collect()
    }
}
