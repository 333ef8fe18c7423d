//! Differential expression testing
//!
//! Single-dataset testing fits the peptide + treatment model per protein and
//! converts the treatment F-statistic to a parametric p-value. Multi-dataset
//! testing sums per-dataset F-statistics into one combined score per protein
//! and estimates significance by seeded permutation. Both apply
//! Benjamini-Hochberg correction across proteins.

mod anova;
mod fdr;
mod permutation;
mod presence;

pub use anova::{fold_change, protein_f_statistic, FTest};
pub use fdr::benjamini_hochberg;
pub use permutation::{CancelToken, PermutationParams};
pub use presence::{presence_absence_test, presence_stat};

use std::collections::HashMap;

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::data::{Dataset, Exclusion, ExclusionStage, IntensityMatrix, PeptideMetadata, TreatmentLayout};
use crate::error::{ProteoError, Result};
use permutation::{permutation_pvalues, TestedProtein};

/// Per-protein test outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinTest {
    pub protein_id: String,
    /// Peptides contributing to the statistic (summed across datasets)
    pub n_peptides: usize,
    /// Difference of treatment-group means on the log2 scale
    pub log2_fold_change: f64,
    /// Test statistic: F for one dataset, sum of F across datasets
    pub statistic: f64,
    pub p_value: f64,
    /// Benjamini-Hochberg adjusted p-value
    pub adj_p_value: f64,
    /// Passthrough annotations from the first peptide of the protein
    pub annotations: HashMap<String, String>,
}

/// Full result of a differential expression run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferentialResults {
    pub rows: Vec<ProteinTest>,
    /// Proteins that could not be tested, individually attributed
    pub excluded: Vec<Exclusion>,
}

impl DifferentialResults {
    /// Text summary of significant calls at the given adjusted-p cutoff
    pub fn summary(&self, alpha: f64) -> String {
        let tested = self.rows.len();
        let significant: Vec<&ProteinTest> = self
            .rows
            .iter()
            .filter(|r| r.adj_p_value < alpha)
            .collect();
        let up = significant.iter().filter(|r| r.log2_fold_change > 0.0).count();
        let down = significant.iter().filter(|r| r.log2_fold_change < 0.0).count();

        format!(
            "{} proteins tested, {} significant at adjusted p < {} ({} up, {} down), {} excluded",
            tested,
            significant.len(),
            alpha,
            up,
            down,
            self.excluded.len()
        )
    }
}

/// One protein's peptide rows in each dataset, plus propagated annotations
pub(crate) struct ProteinEntry {
    pub id: String,
    pub rows_per_dataset: Vec<Vec<usize>>,
    pub annotations: HashMap<String, String>,
}

/// Union of proteins across datasets, in first-appearance order
pub(crate) fn collect_protein_entries(datasets: &[Dataset]) -> Vec<ProteinEntry> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<ProteinEntry> = Vec::new();

    for (d, ds) in datasets.iter().enumerate() {
        for (protein_id, rows) in ds.metadata.protein_groups() {
            let idx = *index.entry(protein_id.clone()).or_insert_with(|| {
                entries.push(ProteinEntry {
                    id: protein_id.clone(),
                    rows_per_dataset: vec![Vec::new(); datasets.len()],
                    annotations: HashMap::new(),
                });
                entries.len() - 1
            });

            if entries[idx].annotations.is_empty() {
                for name in ds.metadata.annotation_names() {
                    if let Some(values) = ds.metadata.annotation(name) {
                        entries[idx]
                            .annotations
                            .insert(name.to_string(), values[rows[0]].clone());
                    }
                }
            }
            entries[idx].rows_per_dataset[d] = rows;
        }
    }

    entries
}

/// Single-dataset differential expression with parametric p-values.
///
/// Proteins with fewer than two peptides have a degenerate F-statistic and
/// are excluded (recorded), never reported as NaN rows.
pub fn peptide_level_test(
    matrix: &IntensityMatrix,
    treatment: &TreatmentLayout,
    metadata: &PeptideMetadata,
) -> Result<DifferentialResults> {
    metadata.check_alignment(matrix)?;
    treatment.check_alignment(matrix.n_samples())?;
    if treatment.n_levels() < 2 {
        return Err(ProteoError::InvalidInput {
            reason: "differential expression requires at least two treatment groups".to_string(),
        });
    }

    let mut rows: Vec<ProteinTest> = Vec::new();
    let mut excluded: Vec<Exclusion> = Vec::new();
    let mut pvalues: Vec<f64> = Vec::new();

    for (protein_id, protein_rows) in metadata.protein_groups() {
        if protein_rows.len() < 2 {
            excluded.push(Exclusion::new(
                &protein_id,
                ExclusionStage::DifferentialExpression,
                "fewer than two peptides",
            ));
            continue;
        }

        let block = matrix.intensities().select(Axis(0), &protein_rows);
        let f = match protein_f_statistic(block.view(), treatment) {
            Some(f) => f,
            None => {
                excluded.push(Exclusion::new(
                    &protein_id,
                    ExclusionStage::DifferentialExpression,
                    "insufficient observations for the peptide/treatment model",
                ));
                continue;
            }
        };

        let dist = FisherSnedecor::new(f.df_treatment, f.df_error).map_err(|e| {
            ProteoError::NumericalInstability {
                operation: "F-distribution p-value".to_string(),
                details: e.to_string(),
            }
        })?;
        let p = 1.0 - dist.cdf(f.statistic);

        let mut annotations = HashMap::new();
        for name in metadata.annotation_names() {
            if let Some(values) = metadata.annotation(name) {
                annotations.insert(name.to_string(), values[protein_rows[0]].clone());
            }
        }

        pvalues.push(p);
        rows.push(ProteinTest {
            protein_id,
            n_peptides: protein_rows.len(),
            log2_fold_change: fold_change(block.view(), treatment),
            statistic: f.statistic,
            p_value: p,
            adj_p_value: f64::NAN,
            annotations,
        });
    }

    if rows.is_empty() {
        return Err(ProteoError::EmptyData {
            reason: "no protein could be tested".to_string(),
        });
    }

    let adjusted = benjamini_hochberg(&pvalues);
    for (row, adj) in rows.iter_mut().zip(adjusted) {
        row.adj_p_value = adj;
    }

    Ok(DifferentialResults { rows, excluded })
}

/// Multi-dataset differential expression with a permutation null.
///
/// All datasets must share the protein identifier scheme and semantically
/// aligned treatment labels; that alignment is the caller's precondition.
/// The combined statistic for a protein is the sum of its per-dataset
/// F-statistics over the datasets that contain it with at least two
/// peptides.
pub fn multi_dataset_test(
    datasets: &[Dataset],
    params: &PermutationParams,
) -> Result<DifferentialResults> {
    if datasets.is_empty() {
        return Err(ProteoError::EmptyData {
            reason: "no datasets supplied".to_string(),
        });
    }
    for ds in datasets {
        if ds.treatment.n_levels() < 2 {
            return Err(ProteoError::InvalidInput {
                reason: "differential expression requires at least two treatment groups"
                    .to_string(),
            });
        }
    }

    let entries = collect_protein_entries(datasets);

    let mut tested: Vec<TestedProtein> = Vec::new();
    let mut rows: Vec<ProteinTest> = Vec::new();
    let mut excluded: Vec<Exclusion> = Vec::new();

    for entry in &entries {
        let mut observed = 0.0;
        let mut fold_changes: Vec<f64> = Vec::new();
        let mut n_peptides = 0usize;
        // Rows kept only where the statistic is defined, so permutations
        // recompute exactly the datasets that contributed to the observed
        // statistic
        let mut usable_rows: Vec<Vec<usize>> = vec![Vec::new(); datasets.len()];
        let mut any = false;

        for (d, ds) in datasets.iter().enumerate() {
            let protein_rows = &entry.rows_per_dataset[d];
            if protein_rows.len() < 2 {
                continue;
            }
            let block = ds.matrix.intensities().select(Axis(0), protein_rows);
            if let Some(f) = protein_f_statistic(block.view(), &ds.treatment) {
                observed += f.statistic;
                fold_changes.push(fold_change(block.view(), &ds.treatment));
                n_peptides += protein_rows.len();
                usable_rows[d] = protein_rows.clone();
                any = true;
            }
        }

        if !any {
            excluded.push(Exclusion::new(
                &entry.id,
                ExclusionStage::DifferentialExpression,
                "fewer than two peptides (or too few observations) in every dataset",
            ));
            continue;
        }

        tested.push(TestedProtein {
            rows_per_dataset: usable_rows,
            observed,
        });
        rows.push(ProteinTest {
            protein_id: entry.id.clone(),
            n_peptides,
            log2_fold_change: crate::stats::mean(&fold_changes),
            statistic: observed,
            p_value: f64::NAN,
            adj_p_value: f64::NAN,
            annotations: entry.annotations.clone(),
        });
    }

    if rows.is_empty() {
        return Err(ProteoError::EmptyData {
            reason: "no protein could be tested in any dataset".to_string(),
        });
    }

    let pvalues = permutation_pvalues(datasets, &tested, params, &|block, treatment| {
        protein_f_statistic(block, treatment).map(|f| f.statistic)
    })?;
    let adjusted = benjamini_hochberg(&pvalues);
    for (row, (p, adj)) in rows.iter_mut().zip(pvalues.iter().zip(adjusted.iter())) {
        row.p_value = *p;
        row.adj_p_value = *adj;
    }

    Ok(DifferentialResults { rows, excluded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn two_group_layout() -> TreatmentLayout {
        TreatmentLayout::new(
            vec!["a", "a", "a", "b", "b", "b"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
        .unwrap()
    }

    /// Two proteins of four peptides each; protUp carries a group effect.
    fn test_dataset(effect: f64, seed_offset: usize) -> Dataset {
        let mut values = Array2::zeros((8, 6));
        for i in 0..8 {
            for j in 0..6 {
                let noise =
                    (((i * 31 + j * 17 + seed_offset) % 13) as f64 - 6.0) * 0.03;
                let group = if i < 4 && j >= 3 { effect } else { 0.0 };
                values[[i, j]] = 14.0 + 0.4 * i as f64 + group + noise;
            }
        }
        let mut metadata = PeptideMetadata::new(
            (0..8).map(|i| format!("pep{}_{}", seed_offset, i)).collect(),
            (0..8)
                .map(|i| {
                    if i < 4 {
                        "protUp".to_string()
                    } else {
                        "protNull".to_string()
                    }
                })
                .collect(),
        )
        .unwrap();
        metadata
            .add_annotation("gene", vec!["geneX".to_string(); 8])
            .unwrap();

        Dataset::new(
            IntensityMatrix::new(
                values,
                (0..8).map(|i| format!("pep{}_{}", seed_offset, i)).collect(),
                (0..6).map(|j| format!("s{}", j)).collect(),
            )
            .unwrap(),
            metadata,
            two_group_layout(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_dataset_parametric() {
        let ds = test_dataset(2.0, 0);
        let results = peptide_level_test(&ds.matrix, &ds.treatment, &ds.metadata).unwrap();

        assert_eq!(results.rows.len(), 2);
        let up = results.rows.iter().find(|r| r.protein_id == "protUp").unwrap();
        let null = results.rows.iter().find(|r| r.protein_id == "protNull").unwrap();

        assert!(up.adj_p_value < 0.01);
        assert!(null.adj_p_value > 0.2);
        assert!(up.log2_fold_change > 1.5);
        assert_eq!(up.annotations.get("gene").unwrap(), "geneX");
    }

    #[test]
    fn test_degenerate_protein_excluded() {
        let mut values = Array2::zeros((3, 6));
        for i in 0..3 {
            for j in 0..6 {
                values[[i, j]] = 10.0 + i as f64 + 0.1 * j as f64;
            }
        }
        let matrix = IntensityMatrix::new(
            values,
            (0..3).map(|i| format!("pep{}", i)).collect(),
            (0..6).map(|j| format!("s{}", j)).collect(),
        )
        .unwrap();
        let metadata = PeptideMetadata::new(
            (0..3).map(|i| format!("pep{}", i)).collect(),
            vec![
                "protPair".to_string(),
                "protPair".to_string(),
                "protSolo".to_string(),
            ],
        )
        .unwrap();
        let treatment = two_group_layout();

        let results = peptide_level_test(&matrix, &treatment, &metadata).unwrap();
        assert_eq!(results.rows.len(), 1);
        assert_eq!(results.excluded.len(), 1);
        assert_eq!(results.excluded[0].id, "protSolo");
        assert!(!results.rows.iter().any(|r| r.p_value.is_nan()));
    }

    #[test]
    fn test_combined_statistic_is_sum_of_dataset_f() {
        let ds1 = test_dataset(1.5, 0);
        let ds2 = test_dataset(1.5, 5);

        let f = |ds: &Dataset, protein: &str| -> f64 {
            let rows = ds.metadata.rows_for_protein(protein);
            let block = ds.matrix.intensities().select(Axis(0), &rows);
            protein_f_statistic(block.view(), &ds.treatment)
                .unwrap()
                .statistic
        };
        let expected = f(&ds1, "protUp") + f(&ds2, "protUp");

        let params = PermutationParams::new(49, 11);
        let results = multi_dataset_test(&[ds1, ds2], &params).unwrap();
        let up = results.rows.iter().find(|r| r.protein_id == "protUp").unwrap();
        assert!((up.statistic - expected).abs() < 1e-9);
    }

    #[test]
    fn test_multi_dataset_pvalues_and_ranking() {
        let ds1 = test_dataset(2.0, 0);
        let ds2 = test_dataset(2.0, 5);
        let params = PermutationParams::new(199, 7);

        let results = multi_dataset_test(&[ds1, ds2], &params).unwrap();
        let up = results.rows.iter().find(|r| r.protein_id == "protUp").unwrap();
        let null = results.rows.iter().find(|r| r.protein_id == "protNull").unwrap();

        assert!(up.p_value > 0.0 && up.p_value <= 1.0);
        assert!(null.p_value > 0.0 && null.p_value <= 1.0);
        assert!(up.p_value < null.p_value);
    }

    #[test]
    fn test_ranking_stable_across_permutation_counts() {
        for n in [50usize, 100] {
            let params = PermutationParams::new(n, 13);
            let results =
                multi_dataset_test(&[test_dataset(2.5, 0)], &params).unwrap();
            let up = results.rows.iter().find(|r| r.protein_id == "protUp").unwrap();
            let null = results
                .rows
                .iter()
                .find(|r| r.protein_id == "protNull")
                .unwrap();
            assert!(up.p_value < null.p_value);
        }
    }

    #[test]
    fn test_protein_in_one_dataset_still_tested() {
        let ds1 = test_dataset(1.0, 0);

        // Second dataset carries only protNull
        let base = test_dataset(1.0, 5);
        let rows = base.metadata.rows_for_protein("protNull");
        let ds2 = base.subset_peptides(&rows).unwrap();

        let params = PermutationParams::new(49, 3);
        let results = multi_dataset_test(&[ds1, ds2], &params).unwrap();
        assert_eq!(results.rows.len(), 2);
        let up = results.rows.iter().find(|r| r.protein_id == "protUp").unwrap();
        assert_eq!(up.n_peptides, 4);
    }

    #[test]
    fn test_summary_counts() {
        let ds = test_dataset(2.0, 0);
        let results = peptide_level_test(&ds.matrix, &ds.treatment, &ds.metadata).unwrap();
        let text = results.summary(0.05);
        assert!(text.contains("2 proteins tested"));
        assert!(text.contains("1 significant"));
    }
}
