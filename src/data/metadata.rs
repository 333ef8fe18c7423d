//! Peptide metadata aligned row-for-row with the intensity matrix
//!
//! The required columns are the unique peptide identifier and the protein
//! identifier. Any further annotation columns (gene IDs and the like) are an
//! explicitly typed passthrough bag: validated once at construction, carried
//! along untouched, never interpreted numerically.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::data::IntensityMatrix;
use crate::error::{ProteoError, Result};

/// Row metadata for an intensity matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeptideMetadata {
    /// Unique peptide identifiers, one per matrix row
    peptide_ids: Vec<String>,
    /// Protein identifier for each peptide row
    protein_ids: Vec<String>,
    /// Passthrough annotation columns (column name -> values per row)
    annotations: HashMap<String, Vec<String>>,
}

impl PeptideMetadata {
    /// Create metadata from the two required columns
    pub fn new(peptide_ids: Vec<String>, protein_ids: Vec<String>) -> Result<Self> {
        if protein_ids.len() != peptide_ids.len() {
            return Err(ProteoError::Alignment {
                expected: format!("{} protein IDs", peptide_ids.len()),
                got: format!("{} protein IDs", protein_ids.len()),
            });
        }

        {
            let mut seen = HashSet::new();
            for id in &peptide_ids {
                if !seen.insert(id.clone()) {
                    return Err(ProteoError::InvalidInput {
                        reason: format!("Duplicate peptide ID '{}'; peptide IDs must be unique", id),
                    });
                }
            }
        }

        Ok(Self {
            peptide_ids,
            protein_ids,
            annotations: HashMap::new(),
        })
    }

    /// Add a passthrough annotation column
    pub fn add_annotation(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.peptide_ids.len() {
            return Err(ProteoError::Alignment {
                expected: format!("{} values", self.peptide_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        self.annotations.insert(name.to_string(), values);
        Ok(())
    }

    /// Number of peptide rows
    pub fn n_peptides(&self) -> usize {
        self.peptide_ids.len()
    }

    /// Peptide identifiers
    pub fn peptide_ids(&self) -> &[String] {
        &self.peptide_ids
    }

    /// Protein identifiers, parallel to the peptide rows
    pub fn protein_ids(&self) -> &[String] {
        &self.protein_ids
    }

    /// Annotation column values, if present
    pub fn annotation(&self, name: &str) -> Option<&Vec<String>> {
        self.annotations.get(name)
    }

    /// Names of the passthrough annotation columns
    pub fn annotation_names(&self) -> Vec<&str> {
        self.annotations.keys().map(|s| s.as_str()).collect()
    }

    /// Unique protein identifiers in first-appearance order
    pub fn protein_order(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for id in &self.protein_ids {
            if seen.insert(id.clone()) {
                order.push(id.clone());
            }
        }
        order
    }

    /// Group peptide rows by protein, in first-appearance order.
    ///
    /// Every protein maps to a non-empty set of row indices.
    pub fn protein_groups(&self) -> Vec<(String, Vec<usize>)> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (row, id) in self.protein_ids.iter().enumerate() {
            match positions.get(id.as_str()) {
                Some(&g) => groups[g].1.push(row),
                None => {
                    positions.insert(id.as_str(), groups.len());
                    groups.push((id.clone(), vec![row]));
                }
            }
        }
        groups
    }

    /// Row indices belonging to one protein
    pub fn rows_for_protein(&self, protein_id: &str) -> Vec<usize> {
        self.protein_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| id.as_str() == protein_id)
            .map(|(i, _)| i)
            .collect()
    }

    /// Subset to specific peptide rows, preserving order of `indices`
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        let new_peptides: Vec<String> = indices
            .iter()
            .map(|&i| self.peptide_ids[i].clone())
            .collect();
        let new_proteins: Vec<String> = indices
            .iter()
            .map(|&i| self.protein_ids[i].clone())
            .collect();

        let mut out = PeptideMetadata::new(new_peptides, new_proteins)?;
        for (name, values) in &self.annotations {
            let new_values: Vec<String> = indices.iter().map(|&i| values[i].clone()).collect();
            out.add_annotation(name, new_values)?;
        }
        Ok(out)
    }

    /// Verify the lockstep invariant against an intensity matrix
    pub fn check_alignment(&self, matrix: &IntensityMatrix) -> Result<()> {
        if self.n_peptides() != matrix.n_peptides() {
            return Err(ProteoError::Alignment {
                expected: format!("{} metadata rows", matrix.n_peptides()),
                got: format!("{} metadata rows", self.n_peptides()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> PeptideMetadata {
        let peptides = vec!["pep1", "pep2", "pep3", "pep4"]
            .into_iter()
            .map(String::from)
            .collect();
        let proteins = vec!["protA", "protB", "protA", "protB"]
            .into_iter()
            .map(String::from)
            .collect();
        PeptideMetadata::new(peptides, proteins).unwrap()
    }

    #[test]
    fn test_protein_groups_first_appearance_order() {
        let meta = sample_metadata();
        let groups = meta.protein_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "protA");
        assert_eq!(groups[0].1, vec![0, 2]);
        assert_eq!(groups[1].0, "protB");
        assert_eq!(groups[1].1, vec![1, 3]);
    }

    #[test]
    fn test_duplicate_peptide_ids_rejected() {
        let peptides: Vec<String> = vec!["pep1", "pep1"].into_iter().map(String::from).collect();
        let proteins: Vec<String> = vec!["protA", "protA"].into_iter().map(String::from).collect();
        assert!(PeptideMetadata::new(peptides, proteins).is_err());
    }

    #[test]
    fn test_annotation_passthrough_in_subset() {
        let mut meta = sample_metadata();
        meta.add_annotation(
            "gene",
            vec!["g1", "g2", "g1", "g2"].into_iter().map(String::from).collect(),
        )
        .unwrap();

        let sub = meta.subset(&[3, 0]).unwrap();
        assert_eq!(sub.peptide_ids(), &["pep4".to_string(), "pep1".to_string()]);
        assert_eq!(sub.protein_ids(), &["protB".to_string(), "protA".to_string()]);
        assert_eq!(
            sub.annotation("gene").unwrap(),
            &vec!["g2".to_string(), "g1".to_string()]
        );
    }

    #[test]
    fn test_annotation_length_mismatch_rejected() {
        let mut meta = sample_metadata();
        assert!(meta
            .add_annotation("gene", vec!["g1".to_string()])
            .is_err());
    }
}
