//! proteodiff: differential expression analysis for peptide-level proteomics
//!
//! This crate implements the numerical core of a peptide-level
//! mass-spectrometry differential expression workflow:
//!
//! 1. **Bias-trend normalization**: systematic intensity trends are found by
//!    SVD on the treatment-residuals of fully observed peptides and projected
//!    out of every peptide (`normalization`).
//! 2. **Model-based imputation**: missing intensities are refilled under a
//!    mixture of random and left-censored missingness per protein
//!    (`imputation`).
//! 3. **Differential expression**: per-protein F-statistics from a peptide +
//!    treatment model, combined across datasets and scored by seeded
//!    permutation (`testing`), with presence/absence testing for proteins
//!    that lack quantitative data.
//!
//! Loading tabular files, plotting, and report generation are external
//! collaborators; the core consumes and produces structured matrices with
//! aligned metadata.
//!
//! # Example
//!
//! ```ignore
//! use proteodiff::prelude::*;
//!
//! let dataset = Dataset::new(matrix, metadata, treatment)?;
//!
//! let analysis = identify_trends(&dataset.matrix, &dataset.treatment, &dataset.metadata)?;
//! let normalized = apply_removal(
//!     &dataset.matrix, &dataset.metadata, &dataset.treatment,
//!     &analysis, analysis.suggested_trends,
//! )?;
//!
//! let imputed = impute(
//!     &normalized.matrix, &dataset.treatment, &normalized.metadata,
//!     &ImputeParams { pi_mcar: McarProportion::Fixed(0.05), seed: 42 },
//! )?;
//!
//! let results = peptide_level_test(&imputed.matrix, &dataset.treatment, &imputed.metadata)?;
//! println!("{}", results.summary(0.05));
//! ```

pub mod data;
pub mod error;
pub mod imputation;
pub mod normalization;
pub mod reconcile;
pub mod rng;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{
        Dataset, Exclusion, ExclusionStage, IntensityMatrix, PeptideMetadata, TreatmentLayout,
    };
    pub use crate::error::{ProteoError, Result};
    pub use crate::imputation::{impute, ImputeParams, ImputedResult, McarProportion};
    pub use crate::normalization::{
        apply_removal, identify_trends, NormalizedResult, TrendAnalysis,
    };
    pub use crate::reconcile::{partition, subset_to_proteins, PartitionedProteins};
    pub use crate::testing::{
        multi_dataset_test, peptide_level_test, presence_absence_test, CancelToken,
        DifferentialResults, PermutationParams, ProteinTest,
    };
}

use prelude::*;

/// Parameters for the single-dataset convenience pipeline
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Bias trends to remove; None uses the suggestion from trend
    /// identification
    pub trends_to_remove: Option<usize>,
    pub impute: ImputeParams,
}

/// Outputs of every stage of the single-dataset pipeline
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub analysis: TrendAnalysis,
    pub normalized: NormalizedResult,
    pub imputed: ImputedResult,
    pub results: DifferentialResults,
}

/// Run normalization, imputation, and differential expression on one dataset
pub fn run_pipeline(dataset: &Dataset, params: &PipelineParams) -> Result<PipelineOutput> {
    let analysis = identify_trends(&dataset.matrix, &dataset.treatment, &dataset.metadata)?;
    let k = params.trends_to_remove.unwrap_or(analysis.suggested_trends);
    let normalized = apply_removal(
        &dataset.matrix,
        &dataset.metadata,
        &dataset.treatment,
        &analysis,
        k,
    )?;

    let imputed = impute(
        &normalized.matrix,
        &dataset.treatment,
        &normalized.metadata,
        &params.impute,
    )?;

    let results = peptide_level_test(&imputed.matrix, &dataset.treatment, &imputed.metadata)?;

    Ok(PipelineOutput {
        analysis,
        normalized,
        imputed,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// The reference end-to-end scenario: two treatment groups of three
    /// samples, 100 peptides over two proteins, no missing values. Protein A
    /// carries a strong group-mean separation; protein B is constant across
    /// samples.
    fn scenario_dataset() -> Dataset {
        let n_pep = 100;
        let mut values = Array2::zeros((n_pep, 6));
        for i in 0..n_pep {
            for j in 0..6 {
                if i < 50 {
                    let noise = (((i * 31 + j * 17) % 13) as f64 - 6.0) * 0.03;
                    let effect = if j >= 3 { 2.0 } else { 0.0 };
                    values[[i, j]] = 16.0 + 0.05 * i as f64 + effect + noise;
                } else {
                    // Protein B: peptide level only, identical across samples
                    values[[i, j]] = 14.0 + 0.05 * i as f64;
                }
            }
        }

        let peptide_ids: Vec<String> = (0..n_pep).map(|i| format!("pep{}", i)).collect();
        let protein_ids: Vec<String> = (0..n_pep)
            .map(|i| {
                if i < 50 {
                    "protA".to_string()
                } else {
                    "protB".to_string()
                }
            })
            .collect();

        Dataset::new(
            IntensityMatrix::new(
                values,
                peptide_ids.clone(),
                (0..6).map(|j| format!("s{}", j)).collect(),
            )
            .unwrap(),
            PeptideMetadata::new(peptide_ids, protein_ids).unwrap(),
            TreatmentLayout::new(
                vec!["control", "control", "control", "treated", "treated", "treated"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let dataset = scenario_dataset();

        // Normalization with zero trends removed is the identity
        let analysis =
            identify_trends(&dataset.matrix, &dataset.treatment, &dataset.metadata).unwrap();
        let normalized = apply_removal(
            &dataset.matrix,
            &dataset.metadata,
            &dataset.treatment,
            &analysis,
            0,
        )
        .unwrap();
        assert_eq!(normalized.matrix.n_peptides(), normalized.metadata.n_peptides());
        assert_eq!(normalized.matrix.n_peptides(), 100);

        // No missing values: imputation passes the matrix through unchanged
        let imputed = impute(
            &normalized.matrix,
            &dataset.treatment,
            &normalized.metadata,
            &ImputeParams {
                pi_mcar: McarProportion::Fixed(0.05),
                seed: 42,
            },
        )
        .unwrap();
        assert_eq!(imputed.matrix.n_peptides(), imputed.metadata.n_peptides());
        assert_eq!(
            imputed.matrix.intensities(),
            normalized.matrix.intensities()
        );

        // Permutation-based differential expression
        let imputed_dataset = Dataset::new(
            imputed.matrix.clone(),
            imputed.metadata.clone(),
            dataset.treatment.clone(),
        )
        .unwrap();
        let results = multi_dataset_test(
            &[imputed_dataset],
            &PermutationParams::new(200, 42),
        )
        .unwrap();

        let prot_a = results.rows.iter().find(|r| r.protein_id == "protA").unwrap();
        let prot_b = results.rows.iter().find(|r| r.protein_id == "protB").unwrap();

        assert!(prot_a.adj_p_value < 0.05);
        assert!(prot_b.adj_p_value > 0.2);
        assert!(prot_a.log2_fold_change > 1.5);
        assert!(prot_a.p_value > 0.0 && prot_b.p_value <= 1.0);
    }

    #[test]
    fn test_run_pipeline_smoke() {
        let dataset = scenario_dataset();
        let output = run_pipeline(
            &dataset,
            &PipelineParams {
                trends_to_remove: Some(0),
                impute: ImputeParams {
                    pi_mcar: McarProportion::Fixed(0.05),
                    seed: 7,
                },
            },
        )
        .unwrap();

        assert_eq!(output.results.rows.len(), 2);
        let summary = output.results.summary(0.05);
        assert!(summary.contains("2 proteins tested"));

        // Alignment invariant holds after every stage
        assert_eq!(
            output.normalized.matrix.n_peptides(),
            output.normalized.metadata.n_peptides()
        );
        assert_eq!(
            output.imputed.matrix.n_peptides(),
            output.imputed.metadata.n_peptides()
        );
    }
}
