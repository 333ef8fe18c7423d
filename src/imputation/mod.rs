//! Model-based imputation of censored and missing peptide intensities
//!
//! Missingness is treated as a two-mechanism mixture. A cell missing
//! completely at random (MCAR) is refilled from the protein's fitted value
//! plus an empirical residual draw; an abundance-dependent (left-censored)
//! cell is refilled from the lower tail of the fitted normal distribution,
//! bounded above by the smallest observed value of its peptide. The MCAR
//! share is either caller-supplied or estimated from the fraction of
//! missingness the censoring mechanism cannot explain.
//!
//! All draws come from per-protein streams derived from the master seed, so
//! reruns on identical input are bit-identical.

mod model;

pub use model::{fit_two_way, TwoWayFit};

use ndarray::Array2;
use rand::Rng;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::data::{Exclusion, ExclusionStage, IntensityMatrix, PeptideMetadata, TreatmentLayout};
use crate::error::{ProteoError, Result};
use crate::rng::{derive_stream, IMPUTE_TAG};

/// Minimum number of missing cells required to estimate the MCAR share
const MIN_MISSING_FOR_ESTIMATE: usize = 10;

/// Floor for the truncated-tail quantile, keeping draws finite
const MIN_TAIL_PROB: f64 = 1e-12;

/// MCAR proportion: a caller-supplied constant or estimated from the data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum McarProportion {
    /// Use this proportion, in [0, 1]
    Fixed(f64),
    /// Estimate from the share of missingness unexplained by abundance
    Estimate,
}

/// Imputation parameters
#[derive(Debug, Clone)]
pub struct ImputeParams {
    pub pi_mcar: McarProportion,
    /// Master seed for the per-protein random streams
    pub seed: u64,
}

/// Imputed output: a complete matrix with aligned metadata
#[derive(Debug, Clone)]
pub struct ImputedResult {
    pub matrix: IntensityMatrix,
    pub metadata: PeptideMetadata,
    /// The MCAR proportion actually used (supplied or estimated)
    pub pi_mcar: f64,
    /// Proteins and peptides that could not be modeled
    pub excluded: Vec<Exclusion>,
}

struct ProteinFit {
    /// Ordinal of the protein in metadata first-appearance order; indexes
    /// the protein's random stream
    ordinal: u64,
    /// Surviving global row indices, in original order
    rows: Vec<usize>,
    fit: TwoWayFit,
}

/// Impute every missing cell of the peptides that can be modeled.
///
/// Proteins with too few peptides or observations are dropped and recorded
/// in the result, not silently absorbed; the call fails only when nothing
/// at all can be modeled.
pub fn impute(
    matrix: &IntensityMatrix,
    treatment: &TreatmentLayout,
    metadata: &PeptideMetadata,
    params: &ImputeParams,
) -> Result<ImputedResult> {
    metadata.check_alignment(matrix)?;
    treatment.check_alignment(matrix.n_samples())?;

    if let McarProportion::Fixed(pi) = params.pi_mcar {
        if !(0.0..=1.0).contains(&pi) {
            return Err(ProteoError::InvalidInput {
                reason: format!("MCAR proportion must lie in [0, 1], got {}", pi),
            });
        }
    }

    let mut excluded: Vec<Exclusion> = Vec::new();
    let mut fits: Vec<ProteinFit> = Vec::new();

    for (ordinal, (protein_id, rows)) in metadata.protein_groups().into_iter().enumerate() {
        match fit_protein(matrix, treatment, &protein_id, &rows, &mut excluded) {
            Some((kept_rows, fit)) => fits.push(ProteinFit {
                ordinal: ordinal as u64,
                rows: kept_rows,
                fit,
            }),
            None => continue,
        }
    }

    if fits.is_empty() {
        return Err(ProteoError::EmptyData {
            reason: "no protein had enough observed values to fit the imputation model"
                .to_string(),
        });
    }

    let pi_mcar = match params.pi_mcar {
        McarProportion::Fixed(pi) => pi,
        McarProportion::Estimate => estimate_pi_mcar(matrix, &fits)?,
    };

    // Fill the missing cells of every surviving protein block
    let mut values: Array2<f64> = matrix.intensities().to_owned();
    for pf in &fits {
        let mut rng = derive_stream(params.seed, IMPUTE_TAG, pf.ordinal);

        for (local_i, &row) in pf.rows.iter().enumerate() {
            // Censoring bound: smallest observed value of this peptide
            let bound = matrix
                .row(row)
                .iter()
                .filter(|v| !v.is_nan())
                .fold(f64::INFINITY, |acc, &v| acc.min(v));

            for j in 0..matrix.n_samples() {
                if !values[[row, j]].is_nan() {
                    continue;
                }
                let fitted = pf.fit.fitted[[local_i, j]];
                let mechanism: f64 = rng.gen();

                let drawn = if mechanism < pi_mcar {
                    let r = pf.fit.residuals[rng.gen_range(0..pf.fit.residuals.len())];
                    fitted + r
                } else {
                    censored_draw(fitted, pf.fit.sigma, bound, rng.gen())?
                };
                values[[row, j]] = drawn;
            }
        }
    }

    let mut kept: Vec<usize> = fits.iter().flat_map(|pf| pf.rows.iter().copied()).collect();
    kept.sort_unstable();

    let out_matrix = IntensityMatrix::new(
        values.select(ndarray::Axis(0), &kept),
        kept.iter().map(|&i| matrix.peptide_ids()[i].clone()).collect(),
        matrix.sample_ids().to_vec(),
    )?;

    Ok(ImputedResult {
        matrix: out_matrix,
        metadata: metadata.subset(&kept)?,
        pi_mcar,
        excluded,
    })
}

/// Fit one protein, recording exclusions for unusable peptides or the whole
/// protein. Returns the surviving rows and the model fit.
fn fit_protein(
    matrix: &IntensityMatrix,
    treatment: &TreatmentLayout,
    protein_id: &str,
    rows: &[usize],
    excluded: &mut Vec<Exclusion>,
) -> Option<(Vec<usize>, TwoWayFit)> {
    // Peptides with nothing observed cannot anchor an effect
    let mut kept_rows: Vec<usize> = Vec::with_capacity(rows.len());
    for &row in rows {
        if matrix.row(row).iter().all(|v| v.is_nan()) {
            excluded.push(Exclusion::new(
                &matrix.peptide_ids()[row],
                ExclusionStage::Imputation,
                "no observed values",
            ));
        } else {
            kept_rows.push(row);
        }
    }

    if kept_rows.is_empty() {
        excluded.push(Exclusion::new(
            protein_id,
            ExclusionStage::Imputation,
            "no peptide has any observed value",
        ));
        return None;
    }

    let block = matrix.intensities().select(ndarray::Axis(0), &kept_rows);

    // A group with no observed cell at all is a presence/absence pattern,
    // not an imputable protein
    for (k, level) in treatment.levels().iter().enumerate() {
        let group_observed = kept_rows.iter().enumerate().any(|(local_i, _)| {
            (0..matrix.n_samples())
                .any(|j| treatment.level_of(j) == k && !block[[local_i, j]].is_nan())
        });
        if !group_observed {
            excluded.push(Exclusion::new(
                protein_id,
                ExclusionStage::Imputation,
                &format!("treatment group '{}' has no observed values", level),
            ));
            return None;
        }
    }

    let n_observed = block.iter().filter(|v| !v.is_nan()).count();
    let n_params = kept_rows.len() + treatment.n_levels();
    if n_observed < n_params {
        excluded.push(Exclusion::new(
            protein_id,
            ExclusionStage::Imputation,
            &format!(
                "{} observed values cannot support a model with {} parameters",
                n_observed, n_params
            ),
        ));
        return None;
    }

    match fit_two_way(block.view(), treatment) {
        Some(fit) => Some((kept_rows, fit)),
        None => {
            excluded.push(Exclusion::new(
                protein_id,
                ExclusionStage::Imputation,
                "peptide/treatment model could not be fit",
            ));
            None
        }
    }
}

/// One draw from Normal(fitted, sigma) truncated above at `bound`,
/// via the inverse CDF.
fn censored_draw(fitted: f64, sigma: f64, bound: f64, u: f64) -> Result<f64> {
    let normal = Normal::new(fitted, sigma).map_err(|e| ProteoError::NumericalInstability {
        operation: "censored tail draw".to_string(),
        details: e.to_string(),
    })?;
    let tail = normal.cdf(bound);
    let q = (u * tail).max(MIN_TAIL_PROB);
    Ok(normal.inverse_cdf(q).min(bound))
}

/// Estimate the MCAR share as twice the fraction of missing cells whose
/// fitted abundance lies above the protein-median fitted abundance:
/// missingness in the upper abundance half is unexplained by censoring.
fn estimate_pi_mcar(matrix: &IntensityMatrix, fits: &[ProteinFit]) -> Result<f64> {
    let mut n_missing = 0usize;
    let mut n_above = 0usize;

    for pf in fits {
        let mut all_fitted: Vec<f64> = pf.fit.fitted.iter().copied().collect();
        all_fitted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = all_fitted[all_fitted.len() / 2];

        for (local_i, &row) in pf.rows.iter().enumerate() {
            for j in 0..matrix.n_samples() {
                if matrix.row(row)[j].is_nan() {
                    n_missing += 1;
                    if pf.fit.fitted[[local_i, j]] > median {
                        n_above += 1;
                    }
                }
            }
        }
    }

    if n_missing == 0 {
        return Err(ProteoError::Estimation {
            reason: "no missing cells to estimate from".to_string(),
        });
    }
    if n_missing < MIN_MISSING_FOR_ESTIMATE {
        return Err(ProteoError::Estimation {
            reason: format!(
                "only {} missing cells; at least {} required for a stable estimate",
                n_missing, MIN_MISSING_FOR_ESTIMATE
            ),
        });
    }

    Ok((2.0 * n_above as f64 / n_missing as f64).clamp(0.0, 1.0))
}
