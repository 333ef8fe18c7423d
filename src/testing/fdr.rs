//! Benjamini-Hochberg false discovery rate correction

/// Adjust p-values to control the false discovery rate.
///
/// NaN entries (untested proteins) stay NaN and do not count toward the
/// number of tests. Adjusted values are monotone in the input ranking and
/// capped at 1.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    if n == 0 {
        return vec![];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let pa = pvalues[a];
        let pb = pvalues[b];
        match (pa.is_nan(), pb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => pa.partial_cmp(&pb).unwrap(),
        }
    });

    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    let mut adjusted = vec![f64::NAN; n];
    let mut running_min = f64::INFINITY;
    let mut rank = m;

    for &i in order.iter().rev() {
        let p = pvalues[i];
        if p.is_finite() {
            let candidate = (p * m as f64 / rank as f64).min(1.0);
            running_min = running_min.min(candidate);
            adjusted[i] = running_min;
            rank -= 1;
        }
    }

    adjusted
}
