//! Treatment-group layout for the sample columns

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{ProteoError, Result};

/// Categorical treatment assignment, one label per sample column.
///
/// Levels are the sorted unique labels; each level maps to the sample
/// indices carrying it. The label vector's length must equal the intensity
/// matrix's column count at every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentLayout {
    /// Raw label per sample, in column order
    labels: Vec<String>,
    /// Sorted unique levels
    levels: Vec<String>,
    /// Sample indices per level, parallel to `levels`
    groups: Vec<Vec<usize>>,
    /// Level index per sample, parallel to `labels`
    level_of_sample: Vec<usize>,
}

impl TreatmentLayout {
    /// Build a layout from per-sample labels
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(ProteoError::EmptyData {
                reason: "Treatment vector is empty".to_string(),
            });
        }

        let mut levels: Vec<String> = labels.clone();
        levels.sort();
        levels.dedup();

        let groups: Vec<Vec<usize>> = levels
            .iter()
            .map(|level| {
                labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| *l == level)
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();

        let level_of_sample: Vec<usize> = labels
            .iter()
            .map(|l| levels.iter().position(|lev| lev == l).unwrap())
            .collect();

        Ok(Self {
            labels,
            levels,
            groups,
            level_of_sample,
        })
    }

    /// Number of samples
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    /// Number of treatment levels
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Sorted unique levels
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Raw per-sample labels
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Sample indices per level
    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    /// Level index of one sample column
    pub fn level_of(&self, sample_idx: usize) -> usize {
        self.level_of_sample[sample_idx]
    }

    /// Check the column-count invariant against a matrix width
    pub fn check_alignment(&self, n_columns: usize) -> Result<()> {
        if self.labels.len() != n_columns {
            return Err(ProteoError::Alignment {
                expected: format!("treatment vector of length {}", n_columns),
                got: format!("length {}", self.labels.len()),
            });
        }
        Ok(())
    }

    /// Per-level means of the observed (non-NaN) entries of one peptide row.
    ///
    /// A level with no observed entries yields None.
    pub fn observed_group_means(&self, row: ArrayView1<'_, f64>) -> Vec<Option<f64>> {
        self.groups
            .iter()
            .map(|samples| {
                let mut sum = 0.0;
                let mut n = 0usize;
                for &j in samples {
                    let v = row[j];
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
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn layout() -> TreatmentLayout {
        TreatmentLayout::new(
            vec!["treated", "control", "treated", "control"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_levels_sorted_and_grouped() {
        let l = layout();
        assert_eq!(l.levels(), &["control".to_string(), "treated".to_string()]);
        assert_eq!(l.groups()[0], vec![1, 3]);
        assert_eq!(l.groups()[1], vec![0, 2]);
        assert_eq!(l.level_of(0), 1);
        assert_eq!(l.level_of(1), 0);
    }

    #[test]
    fn test_alignment_check() {
        let l = layout();
        assert!(l.check_alignment(4).is_ok());
        assert!(matches!(
            l.check_alignment(3),
            Err(ProteoError::Alignment { .. })
        ));
    }

    #[test]
    fn test_observed_group_means_with_missing() {
        let l = layout();
        let row = array![10.0, f64::NAN, 12.0, 4.0];
        let means = l.observed_group_means(row.view());
        // control samples are 1 and 3; sample 1 is missing
        assert_eq!(means[0], Some(4.0));
        assert_eq!(means[1], Some(11.0));

        let row2 = array![10.0, f64::NAN, 12.0, f64::NAN];
        let means2 = l.observed_group_means(row2.view());
        assert_eq!(means2[0], None);
    }
}
