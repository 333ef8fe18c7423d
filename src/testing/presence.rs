//! Presence/absence differential testing
//!
//! For proteins without enough quantitative data to survive normalization
//! and imputation, the per-sample quantity is binary: whether any peptide of
//! the protein was observed in that sample. The per-dataset statistic is the
//! between-group sum of squares of the group presence frequencies, weighted
//! by group size; combination across datasets and the permutation null reuse
//! the quantitative engine's machinery, so the two engines score disjoint
//! protein sets with the same significance framework.

use ndarray::{ArrayView2, Axis};

use crate::data::{Dataset, TreatmentLayout};
use crate::error::{ProteoError, Result};
use crate::testing::fdr::benjamini_hochberg;
use crate::testing::permutation::{permutation_pvalues, PermutationParams, TestedProtein};
use crate::testing::{collect_protein_entries, DifferentialResults, ProteinTest};

/// Between-group dispersion of presence frequencies for one protein block
pub fn presence_stat(block: ArrayView2<'_, f64>, treatment: &TreatmentLayout) -> Option<f64> {
    if block.nrows() == 0 {
        return None;
    }

    let presence: Vec<f64> = (0..block.ncols())
        .map(|j| {
            let seen = (0..block.nrows()).any(|i| !block[[i, j]].is_nan());
            if seen {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    let overall = presence.iter().sum::<f64>() / presence.len() as f64;
    let stat = treatment
        .groups()
        .iter()
        .map(|group| {
            let freq = group.iter().map(|&j| presence[j]).sum::<f64>() / group.len() as f64;
            group.len() as f64 * (freq - overall).powi(2)
        })
        .sum();
    Some(stat)
}

/// Difference in presence frequency between the last and first treatment level
fn presence_fold_change(block: ArrayView2<'_, f64>, treatment: &TreatmentLayout) -> f64 {
    let freq = |group: &[usize]| -> f64 {
        group
            .iter()
            .map(|&j| {
                if (0..block.nrows()).any(|i| !block[[i, j]].is_nan()) {
                    1.0
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / group.len() as f64
    };
    let groups = treatment.groups();
    freq(&groups[groups.len() - 1]) - freq(&groups[0])
}

/// Permutation test on presence/absence patterns across datasets.
///
/// Input matrices are the raw (pre-normalization) intensities of the
/// proteins the quantitative pipeline excluded; callers keep the two
/// protein sets disjoint.
pub fn presence_absence_test(
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
                reason: "presence/absence testing requires at least two treatment groups"
                    .to_string(),
            });
        }
    }

    let entries = collect_protein_entries(datasets);

    let mut tested: Vec<TestedProtein> = Vec::new();
    let mut rows: Vec<ProteinTest> = Vec::new();

    for entry in &entries {
        let mut observed = 0.0;
        let mut fold_changes: Vec<f64> = Vec::new();
        let mut n_peptides = 0usize;
        let mut any = false;

        for (d, ds) in datasets.iter().enumerate() {
            let protein_rows = &entry.rows_per_dataset[d];
            if protein_rows.is_empty() {
                continue;
            }
            let block = ds.matrix.intensities().select(Axis(0), protein_rows);
            if let Some(s) = presence_stat(block.view(), &ds.treatment) {
                observed += s;
                fold_changes.push(presence_fold_change(block.view(), &ds.treatment));
                n_peptides += protein_rows.len();
                any = true;
            }
        }

        if !any {
            continue;
        }

        tested.push(TestedProtein {
            rows_per_dataset: entry.rows_per_dataset.clone(),
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

    let pvalues = permutation_pvalues(datasets, &tested, params, &|block, treatment| {
        presence_stat(block, treatment)
    })?;
    let adjusted = benjamini_hochberg(&pvalues);
    for (row, (p, adj)) in rows.iter_mut().zip(pvalues.iter().zip(adjusted.iter())) {
        row.p_value = *p;
        row.adj_p_value = *adj;
    }

    Ok(DifferentialResults {
        rows,
        excluded: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{IntensityMatrix, PeptideMetadata};
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

    /// protPresent is seen only in group "b"; protBoth is seen everywhere.
    fn presence_dataset() -> Dataset {
        let mut values = Array2::from_elem((4, 6), f64::NAN);
        // protPresent: two peptides, observed only in samples 3..6
        for i in 0..2 {
            for j in 3..6 {
                values[[i, j]] = 12.0 + i as f64;
            }
        }
        // protBoth: observed in every sample
        for i in 2..4 {
            for j in 0..6 {
                values[[i, j]] = 15.0 + i as f64;
            }
        }

        Dataset::new(
            IntensityMatrix::new(
                values,
                (0..4).map(|i| format!("pep{}", i)).collect(),
                (0..6).map(|j| format!("s{}", j)).collect(),
            )
            .unwrap(),
            PeptideMetadata::new(
                (0..4).map(|i| format!("pep{}", i)).collect(),
                vec![
                    "protPresent".to_string(),
                    "protPresent".to_string(),
                    "protBoth".to_string(),
                    "protBoth".to_string(),
                ],
            )
            .unwrap(),
            two_group_layout(),
        )
        .unwrap()
    }

    #[test]
    fn test_presence_stat_separates_patterns() {
        let ds = presence_dataset();
        let split_block = ds.matrix.intensities().select(Axis(0), &[0, 1]);
        let both_block = ds.matrix.intensities().select(Axis(0), &[2, 3]);

        let split = presence_stat(split_block.view(), &ds.treatment).unwrap();
        let both = presence_stat(both_block.view(), &ds.treatment).unwrap();
        assert!(split > 1.0);
        assert_eq!(both, 0.0);
    }

    #[test]
    fn test_group_restricted_protein_ranks_first() {
        let ds = presence_dataset();
        let params = PermutationParams::new(199, 9);
        let results = presence_absence_test(&[ds], &params).unwrap();

        assert_eq!(results.rows.len(), 2);
        let split = results
            .rows
            .iter()
            .find(|r| r.protein_id == "protPresent")
            .unwrap();
        let both = results.rows.iter().find(|r| r.protein_id == "protBoth").unwrap();

        assert!(split.p_value < both.p_value);
        assert_eq!(both.p_value, 1.0);
        assert!(split.p_value > 0.0 && split.p_value <= 1.0);
        // Present in "b", absent in "a"
        assert_eq!(split.log2_fold_change, 1.0);
    }

    #[test]
    fn test_deterministic_under_reruns() {
        let params = PermutationParams::new(99, 21);
        let a = presence_absence_test(&[presence_dataset()], &params).unwrap();
        let b = presence_absence_test(&[presence_dataset()], &params).unwrap();
        let pa: Vec<f64> = a.rows.iter().map(|r| r.p_value).collect();
        let pb: Vec<f64> = b.rows.iter().map(|r| r.p_value).collect();
        assert_eq!(pa, pb);
    }
}
