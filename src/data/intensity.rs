//! Peptide intensity matrix
//!
//! Rows are peptide observations, columns are biological samples. Values are
//! on the log2 scale. Missing observations are stored as NaN; zero is never a
//! valid stand-in for a missing value and is rejected at construction.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{ProteoError, Result};

/// A peptide-by-sample intensity matrix with aligned identifiers
#[derive(Debug, Clone)]
pub struct IntensityMatrix {
    /// Intensity data (peptides x samples), NaN marks a missing cell
    intensities: Array2<f64>,
    /// Peptide identifiers, one per row
    peptide_ids: Vec<String>,
    /// Sample identifiers, one per column
    sample_ids: Vec<String>,
}

impl IntensityMatrix {
    /// Create a new intensity matrix from log2-scale data.
    ///
    /// Values must be finite or NaN (missing); exact zeros are rejected
    /// because the missing-value sentinel is NaN, never zero.
    pub fn new(
        intensities: Array2<f64>,
        peptide_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_peptides, n_samples) = intensities.dim();

        if peptide_ids.len() != n_peptides {
            return Err(ProteoError::Alignment {
                expected: format!("{} peptide IDs", n_peptides),
                got: format!("{} peptide IDs", peptide_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(ProteoError::Alignment {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if intensities.iter().any(|&v| v.is_infinite()) {
            return Err(ProteoError::InvalidInput {
                reason: "Intensities must be finite or NaN".to_string(),
            });
        }

        if intensities.iter().any(|&v| v == 0.0) {
            return Err(ProteoError::InvalidInput {
                reason: "Zero intensities are not allowed; mark missing values as NaN"
                    .to_string(),
            });
        }

        {
            let mut seen = std::collections::HashSet::new();
            for id in &peptide_ids {
                if !seen.insert(id) {
                    log::warn!("Duplicate peptide ID in intensity matrix: '{}'", id);
                }
            }
        }

        Ok(Self {
            intensities,
            peptide_ids,
            sample_ids,
        })
    }

    /// Number of peptide rows
    pub fn n_peptides(&self) -> usize {
        self.intensities.nrows()
    }

    /// Number of sample columns
    pub fn n_samples(&self) -> usize {
        self.intensities.ncols()
    }

    /// View of the intensity data
    pub fn intensities(&self) -> ArrayView2<'_, f64> {
        self.intensities.view()
    }

    /// Peptide identifiers
    pub fn peptide_ids(&self) -> &[String] {
        &self.peptide_ids
    }

    /// Sample identifiers
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Intensities for one peptide row
    pub fn row(&self, peptide_idx: usize) -> ArrayView1<'_, f64> {
        self.intensities.row(peptide_idx)
    }

    /// Count of missing cells per peptide row
    pub fn missing_per_row(&self) -> Vec<usize> {
        self.intensities
            .axis_iter(Axis(0))
            .map(|row| row.iter().filter(|v| v.is_nan()).count())
            .collect()
    }

    /// Count of missing cells per sample column
    pub fn missing_per_column(&self) -> Vec<usize> {
        self.intensities
            .axis_iter(Axis(1))
            .map(|col| col.iter().filter(|v| v.is_nan()).count())
            .collect()
    }

    /// Indices of peptide rows observed in every sample
    pub fn complete_rows(&self) -> Vec<usize> {
        self.intensities
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether the matrix has no missing cells
    pub fn is_complete(&self) -> bool {
        self.intensities.iter().all(|v| !v.is_nan())
    }

    /// Log2-transform a raw-scale matrix.
    ///
    /// All observed values must be strictly positive.
    pub fn log2_transform(&self) -> Result<Self> {
        if self
            .intensities
            .iter()
            .any(|&v| !v.is_nan() && v <= 0.0)
        {
            return Err(ProteoError::InvalidInput {
                reason: "log2 transform requires strictly positive observed intensities"
                    .to_string(),
            });
        }
        let transformed = self.intensities.mapv(|v| if v.is_nan() { v } else { v.log2() });
        Self::new(transformed, self.peptide_ids.clone(), self.sample_ids.clone())
    }

    /// Subset to specific peptide rows, preserving order of `peptide_indices`
    pub fn subset_peptides(&self, peptide_indices: &[usize]) -> Result<Self> {
        let new_data = self.intensities.select(Axis(0), peptide_indices);
        let new_ids: Vec<String> = peptide_indices
            .iter()
            .map(|&i| self.peptide_ids[i].clone())
            .collect();
        Self::new(new_data, new_ids, self.sample_ids.clone())
    }

    /// Subset to specific sample columns
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_data = self.intensities.select(Axis(1), sample_indices);
        let new_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();
        Self::new(new_data, self.peptide_ids.clone(), new_ids)
    }
}
