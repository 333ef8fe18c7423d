//! Per-protein F-statistics from the peptide + treatment linear model
//!
//! The protein's peptide block is modeled additively with peptide and
//! treatment effects; the F-statistic tests the treatment effect. Complete
//! blocks use the closed-form sum-of-squares decomposition (peptide and
//! treatment factors are orthogonal when every peptide is observed in every
//! sample); blocks with missing cells fall back to an explicit least-squares
//! comparison of the full model against the peptide-only model.

use ndarray::{Array1, Array2, ArrayView2};

use crate::data::TreatmentLayout;
use crate::stats::ols_fit;

/// Floor on the error mean square, keeping F finite for noise-free blocks
const MS_ERROR_FLOOR: f64 = 1e-12;

/// F-statistic for the treatment effect of one protein
#[derive(Debug, Clone, Copy)]
pub struct FTest {
    pub statistic: f64,
    pub df_treatment: f64,
    pub df_error: f64,
}

/// Compute the treatment-effect F-statistic for a protein block.
///
/// Returns None when the statistic is degenerate: fewer than two peptide
/// rows, fewer than two treatment levels, no error degrees of freedom, or a
/// rank-deficient design on the observed cells.
pub fn protein_f_statistic(
    block: ArrayView2<'_, f64>,
    treatment: &TreatmentLayout,
) -> Option<FTest> {
    let (n_rows, n_cols) = block.dim();
    if n_rows < 2 || treatment.n_levels() < 2 || n_cols != treatment.n_samples() {
        return None;
    }

    if block.iter().all(|v| !v.is_nan()) {
        balanced_f(block, treatment)
    } else {
        least_squares_f(block, treatment)
    }
}

/// Closed-form two-way decomposition for a fully observed block
fn balanced_f(block: ArrayView2<'_, f64>, treatment: &TreatmentLayout) -> Option<FTest> {
    let (n_rows, n_cols) = block.dim();
    let n_levels = treatment.n_levels();
    let n_total = (n_rows * n_cols) as f64;

    let grand = block.iter().sum::<f64>() / n_total;

    let ss_total: f64 = block.iter().map(|&v| (v - grand).powi(2)).sum();

    let mut ss_peptide = 0.0;
    for i in 0..n_rows {
        let row_mean = block.row(i).sum() / n_cols as f64;
        ss_peptide += n_cols as f64 * (row_mean - grand).powi(2);
    }

    let mut ss_treatment = 0.0;
    for group in treatment.groups() {
        let cells = (n_rows * group.len()) as f64;
        let mut sum = 0.0;
        for &j in group {
            for i in 0..n_rows {
                sum += block[[i, j]];
            }
        }
        let group_mean = sum / cells;
        ss_treatment += cells * (group_mean - grand).powi(2);
    }

    let df_treatment = (n_levels - 1) as f64;
    let df_error = n_total - n_rows as f64 - n_levels as f64 + 1.0;
    if df_error < 1.0 {
        return None;
    }

    let ss_error = (ss_total - ss_peptide - ss_treatment).max(0.0);
    let ms_error = (ss_error / df_error).max(MS_ERROR_FLOOR);

    Some(FTest {
        statistic: (ss_treatment / df_treatment) / ms_error,
        df_treatment,
        df_error,
    })
}

/// Model comparison on the observed cells: peptide + treatment vs peptide only
fn least_squares_f(block: ArrayView2<'_, f64>, treatment: &TreatmentLayout) -> Option<FTest> {
    let (n_rows, n_cols) = block.dim();
    let n_levels = treatment.n_levels();

    let observed: Vec<(usize, usize)> = (0..n_rows)
        .flat_map(|i| (0..n_cols).map(move |j| (i, j)))
        .filter(|&(i, j)| !block[[i, j]].is_nan())
        .collect();
    let n_obs = observed.len();

    let p_reduced = n_rows; // intercept + (n_rows - 1) peptide indicators
    let p_full = n_rows + n_levels - 1;
    let df_treatment = (n_levels - 1) as f64;
    let df_error = n_obs as f64 - p_full as f64;
    if df_error < 1.0 {
        return None;
    }

    let y: Array1<f64> = observed.iter().map(|&(i, j)| block[[i, j]]).collect();

    let mut x_full = Array2::zeros((n_obs, p_full));
    let mut x_reduced = Array2::zeros((n_obs, p_reduced));
    for (r, &(i, j)) in observed.iter().enumerate() {
        x_full[[r, 0]] = 1.0;
        x_reduced[[r, 0]] = 1.0;
        if i > 0 {
            x_full[[r, i]] = 1.0;
            x_reduced[[r, i]] = 1.0;
        }
        let level = treatment.level_of(j);
        if level > 0 {
            x_full[[r, n_rows + level - 1]] = 1.0;
        }
    }

    let (_, rss_full) = ols_fit(&x_full, &y)?;
    let (_, rss_reduced) = ols_fit(&x_reduced, &y)?;

    let ms_error = (rss_full / df_error).max(MS_ERROR_FLOOR);
    let statistic = ((rss_reduced - rss_full).max(0.0) / df_treatment) / ms_error;

    Some(FTest {
        statistic,
        df_treatment,
        df_error,
    })
}

/// Log2 fold change of a protein block: mean observed intensity of the last
/// treatment level minus the first (reference) level.
pub fn fold_change(block: ArrayView2<'_, f64>, treatment: &TreatmentLayout) -> f64 {
    let group_mean = |group: &[usize]| -> f64 {
        let mut sum = 0.0;
        let mut n = 0usize;
        for &j in group {
            for i in 0..block.nrows() {
                let v = block[[i, j]];
                if !v.is_nan() {
                    sum += v;
                    n += 1;
                }
            }
        }
        if n == 0 {
            f64::NAN
        } else {
            sum / n as f64
        }
    };

    let groups = treatment.groups();
    group_mean(&groups[groups.len() - 1]) - group_mean(&groups[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{array, Array2};

    fn two_group_layout() -> TreatmentLayout {
        TreatmentLayout::new(
            vec!["a", "a", "a", "b", "b", "b"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
        .unwrap()
    }

    fn noisy_block(effect: f64) -> Array2<f64> {
        let mut block = Array2::zeros((4, 6));
        for i in 0..4 {
            for j in 0..6 {
                let noise = (((i * 31 + j * 17) % 7) as f64 - 3.0) * 0.05;
                let group = if j < 3 { 0.0 } else { effect };
                block[[i, j]] = 12.0 + i as f64 * 0.5 + group + noise;
            }
        }
        block
    }

    #[test]
    fn test_strong_effect_yields_large_f() {
        let treatment = two_group_layout();
        let strong = protein_f_statistic(noisy_block(2.0).view(), &treatment).unwrap();
        let null = protein_f_statistic(noisy_block(0.0).view(), &treatment).unwrap();
        assert!(strong.statistic > 10.0 * null.statistic.max(1.0));
        assert_abs_diff_eq!(strong.df_treatment, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(strong.df_error, 24.0 - 4.0 - 2.0 + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_block_scores_zero() {
        let treatment = two_group_layout();
        let block = Array2::from_elem((3, 6), 10.0);
        let f = protein_f_statistic(block.view(), &treatment).unwrap();
        assert_eq!(f.statistic, 0.0);
    }

    #[test]
    fn test_degenerate_cases_return_none() {
        let treatment = two_group_layout();
        let single_peptide = Array2::from_elem((1, 6), 10.0);
        assert!(protein_f_statistic(single_peptide.view(), &treatment).is_none());

        let one_group = TreatmentLayout::new(vec!["a".to_string(); 6]).unwrap();
        let block = Array2::from_elem((3, 6), 10.0);
        assert!(protein_f_statistic(block.view(), &one_group).is_none());
    }

    #[test]
    fn test_balanced_and_least_squares_paths_agree() {
        let treatment = two_group_layout();
        let block = noisy_block(1.0);

        let closed = balanced_f(block.view(), &treatment).unwrap();
        let ls = least_squares_f(block.view(), &treatment).unwrap();
        assert_relative_eq!(closed.statistic, ls.statistic, max_relative = 1e-6);
        assert_abs_diff_eq!(closed.df_error, ls.df_error, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_cells_use_least_squares_path() {
        let treatment = two_group_layout();
        let mut block = noisy_block(1.5);
        block[[0, 2]] = f64::NAN;
        block[[2, 4]] = f64::NAN;
        let f = protein_f_statistic(block.view(), &treatment).unwrap();
        assert!(f.statistic > 1.0);
        assert_abs_diff_eq!(f.df_error, 22.0 - 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fold_change_sign_and_magnitude() {
        let treatment = two_group_layout();
        let block = array![
            [10.0, 10.0, 10.0, 12.0, 12.0, 12.0],
            [11.0, 11.0, 11.0, 13.0, 13.0, 13.0],
        ];
        assert_abs_diff_eq!(fold_change(block.view(), &treatment), 2.0, epsilon = 1e-12);
    }
}
