//! Eigenvector-based bias-trend normalization
//!
//! Systematic, non-biological intensity trends are identified by singular
//! value decomposition of the treatment-residual matrix over the peptides
//! observed in every sample, then projected out of all peptides (complete or
//! not) by per-peptide least squares on the observed coordinates.
//!
//! Identification and removal are two separate pure calls: the caller
//! inspects the `TrendAnalysis` (typically plotting variance shares) and
//! passes the number of trends to remove explicitly to `apply_removal`.

use ndarray::{Array1, Array2, Axis};

use super::svd::{jacobi_svd, Svd};
use crate::data::{Exclusion, ExclusionStage, IntensityMatrix, PeptideMetadata, TreatmentLayout};
use crate::error::{ProteoError, Result};
use crate::stats::ols_fit;

/// Minimum complete peptides required to support the decomposition
pub const MIN_COMPLETE_PEPTIDES: usize = 10;

/// A residual trend explaining less than this share of variance (percent)
/// is not suggested for removal.
const TREND_VARIANCE_FLOOR_PCT: f64 = 5.0;

/// Bias-trend decomposition of the complete-peptide submatrix
#[derive(Debug, Clone)]
pub struct TrendAnalysis {
    /// Row indices (into the analyzed matrix) of the complete peptides
    pub complete_rows: Vec<usize>,
    /// Number of peptides left out of the SVD for having missing values
    pub n_excluded_from_svd: usize,
    /// Sample count the trends are defined over
    pub n_samples: usize,
    /// Singular values of the raw complete submatrix
    pub raw_singular_values: Vec<f64>,
    /// Percent variance explained per raw component
    pub raw_variance_explained: Vec<f64>,
    /// Singular values of the treatment-residual submatrix
    pub residual_singular_values: Vec<f64>,
    /// Percent variance explained per residual component
    pub residual_variance_explained: Vec<f64>,
    /// Right singular vectors of the residual submatrix, one column per
    /// trend (n_samples x n_components), strongest first
    pub trends: Array2<f64>,
    /// Default number of trends to remove; always overridable by the caller
    pub suggested_trends: usize,
}

/// Normalized output: input matrix with the chosen trends projected out
#[derive(Debug, Clone)]
pub struct NormalizedResult {
    pub matrix: IntensityMatrix,
    pub metadata: PeptideMetadata,
    /// Number of trends that were removed
    pub trends_removed: usize,
    /// Peptides that could not be fit and were dropped
    pub excluded: Vec<Exclusion>,
}

/// Identify bias trends from the peptides observed in every sample.
///
/// Fails with `InsufficientData` when fewer than [`MIN_COMPLETE_PEPTIDES`]
/// complete peptides are available.
pub fn identify_trends(
    matrix: &IntensityMatrix,
    treatment: &TreatmentLayout,
    metadata: &PeptideMetadata,
) -> Result<TrendAnalysis> {
    metadata.check_alignment(matrix)?;
    treatment.check_alignment(matrix.n_samples())?;

    let complete_rows = matrix.complete_rows();
    if complete_rows.len() < MIN_COMPLETE_PEPTIDES {
        return Err(ProteoError::InsufficientData {
            reason: format!(
                "{} peptides with no missing values; at least {} required for trend identification",
                complete_rows.len(),
                MIN_COMPLETE_PEPTIDES
            ),
        });
    }
    let n_excluded_from_svd = matrix.n_peptides() - complete_rows.len();

    let complete = matrix.intensities().select(Axis(0), &complete_rows);

    // Treatment-residual matrix: per-peptide group means subtracted
    let mut residual = complete.clone();
    for (i, row) in complete.axis_iter(Axis(0)).enumerate() {
        let means = treatment.observed_group_means(row);
        for j in 0..row.len() {
            // Complete rows have every group observed
            let m = means[treatment.level_of(j)].unwrap_or(0.0);
            residual[[i, j]] -= m;
        }
    }

    let raw_svd = jacobi_svd(complete.view());
    let residual_svd: Svd = jacobi_svd(residual.view());

    let residual_variance_explained = residual_svd.variance_explained();
    let suggested_trends = match residual_variance_explained.first() {
        Some(&top) if top >= TREND_VARIANCE_FLOOR_PCT => 1,
        _ => 0,
    };

    Ok(TrendAnalysis {
        complete_rows,
        n_excluded_from_svd,
        n_samples: matrix.n_samples(),
        raw_variance_explained: raw_svd.variance_explained(),
        raw_singular_values: raw_svd.singular_values,
        residual_singular_values: residual_svd.singular_values,
        residual_variance_explained,
        trends: residual_svd.right_vectors,
        suggested_trends,
    })
}

/// Remove the top `k` bias trends from every peptide.
///
/// For each peptide the treatment-residual of its observed values is
/// regressed on the same-indexed entries of the chosen trend vectors, and
/// the fitted bias is subtracted. `k == 0` is the identity transform.
/// Peptides with fewer observed values than `k` cannot be fit; they are
/// excluded from the output and recorded.
pub fn apply_removal(
    matrix: &IntensityMatrix,
    metadata: &PeptideMetadata,
    treatment: &TreatmentLayout,
    analysis: &TrendAnalysis,
    k: usize,
) -> Result<NormalizedResult> {
    metadata.check_alignment(matrix)?;
    treatment.check_alignment(matrix.n_samples())?;

    if matrix.n_samples() != analysis.n_samples {
        return Err(ProteoError::Alignment {
            expected: format!("matrix with {} samples", analysis.n_samples),
            got: format!("{} samples", matrix.n_samples()),
        });
    }
    if k > analysis.trends.ncols() {
        return Err(ProteoError::InvalidInput {
            reason: format!(
                "cannot remove {} trends; only {} were identified",
                k,
                analysis.trends.ncols()
            ),
        });
    }

    if k == 0 {
        return Ok(NormalizedResult {
            matrix: matrix.clone(),
            metadata: metadata.clone(),
            trends_removed: 0,
            excluded: Vec::new(),
        });
    }

    let n_samples = matrix.n_samples();
    let mut kept_rows: Vec<usize> = Vec::new();
    let mut kept_values: Vec<f64> = Vec::new();
    let mut excluded: Vec<Exclusion> = Vec::new();

    for i in 0..matrix.n_peptides() {
        let row = matrix.row(i);
        let observed: Vec<usize> = (0..n_samples).filter(|&j| !row[j].is_nan()).collect();
        let peptide_id = &matrix.peptide_ids()[i];

        if observed.len() < k {
            log::warn!(
                "Peptide '{}' has {} observed values, fewer than the {} trends to remove; dropping",
                peptide_id,
                observed.len(),
                k
            );
            excluded.push(Exclusion::new(
                peptide_id,
                ExclusionStage::Normalization,
                &format!("{} observed values cannot support {} trends", observed.len(), k),
            ));
            continue;
        }

        let means = treatment.observed_group_means(row);

        // Residual of the observed values against their group means
        let y: Array1<f64> = observed
            .iter()
            .map(|&j| row[j] - means[treatment.level_of(j)].unwrap_or(0.0))
            .collect();

        let mut x = Array2::zeros((observed.len(), k));
        for (r, &j) in observed.iter().enumerate() {
            for c in 0..k {
                x[[r, c]] = analysis.trends[[j, c]];
            }
        }

        let fit = ols_fit(&x, &y);
        let (beta, _rss) = match fit {
            Some(f) => f,
            None => {
                excluded.push(Exclusion::new(
                    peptide_id,
                    ExclusionStage::Normalization,
                    "trend regression is singular on the observed coordinates",
                ));
                continue;
            }
        };

        let fitted = x.dot(&beta);
        let mut new_row = vec![f64::NAN; n_samples];
        for (r, &j) in observed.iter().enumerate() {
            new_row[j] = row[j] - fitted[r];
        }

        kept_rows.push(i);
        kept_values.extend_from_slice(&new_row);
    }

    if kept_rows.is_empty() {
        return Err(ProteoError::EmptyData {
            reason: "no peptides survived trend removal".to_string(),
        });
    }

    let values = Array2::from_shape_vec((kept_rows.len(), n_samples), kept_values).map_err(
        |e| ProteoError::NumericalInstability {
            operation: "trend removal".to_string(),
            details: e.to_string(),
        },
    )?;
    let kept_ids: Vec<String> = kept_rows
        .iter()
        .map(|&i| matrix.peptide_ids()[i].clone())
        .collect();

    Ok(NormalizedResult {
        matrix: IntensityMatrix::new(values, kept_ids, matrix.sample_ids().to_vec())?,
        metadata: metadata.subset(&kept_rows)?,
        trends_removed: k,
        excluded,
    })
}
