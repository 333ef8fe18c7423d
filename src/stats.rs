//! Shared numerical routines: means, variances, and small least-squares solves
//!
//! The solver is a plain normal-equations approach with Gaussian elimination
//! and partial pivoting. Design matrices in this crate are small (peptide and
//! treatment indicator columns), so this is adequate without pulling in a
//! LAPACK backend.

use ndarray::{Array1, Array2, ArrayView1};

/// Mean of a slice. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance. Returns 0.0 for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Mean of the non-missing entries of a row. None if every entry is missing.
pub fn observed_mean(row: ArrayView1<'_, f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &v in row.iter() {
        if !v.is_nan() {
            sum += v;
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Solve the square system `a * x = b` by Gaussian elimination with partial
/// pivoting. Returns None when the matrix is singular to working precision.
pub fn solve_linear(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }

    // Augmented working copy
    let mut m = a.to_owned();
    let mut rhs = b.to_owned();

    for col in 0..n {
        // Partial pivoting: largest absolute value in the remaining column
        let mut pivot_row = col;
        let mut pivot_val = m[[col, col]].abs();
        for row in (col + 1)..n {
            let v = m[[row, col]].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = row;
            }
        }

        if pivot_val < 1e-12 {
            return None;
        }

        if pivot_row != col {
            for j in 0..n {
                let tmp = m[[col, j]];
                m[[col, j]] = m[[pivot_row, j]];
                m[[pivot_row, j]] = tmp;
            }
            rhs.swap(col, pivot_row);
        }

        for row in (col + 1)..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                m[[row, j]] -= factor * m[[col, j]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for j in (row + 1)..n {
            acc -= m[[row, j]] * x[j];
        }
        x[row] = acc / m[[row, row]];
    }

    Some(x)
}

/// Ordinary least squares via the normal equations.
///
/// Returns the coefficient vector and the residual sum of squares, or None
/// when `X'X` is singular (rank-deficient design).
pub fn ols_fit(x: &Array2<f64>, y: &Array1<f64>) -> Option<(Array1<f64>, f64)> {
    let (n, p) = x.dim();
    if y.len() != n || n < p || p == 0 {
        return None;
    }

    // X'X and X'y
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);

    let beta = solve_linear(&xtx, &xty)?;

    let fitted = x.dot(&beta);
    let rss = y
        .iter()
        .zip(fitted.iter())
        .map(|(&yi, &fi)| (yi - fi).powi(2))
        .sum();

    Some((beta, rss))
}
