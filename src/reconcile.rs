//! Multi-dataset reconciliation
//!
//! Splits the protein sets of several datasets by identifier presence:
//! proteins common to every dataset go through the combined quantitative
//! test, proteins unique to one dataset are routed separately (often to
//! presence/absence analysis). Subsetting preserves the row/metadata
//! lockstep invariant and is fully deterministic.

use std::collections::HashSet;

use crate::data::Dataset;
use crate::error::{ProteoError, Result};

/// Protein identifiers split by dataset membership
#[derive(Debug, Clone)]
pub struct PartitionedProteins {
    /// Present in every dataset, in first-appearance order
    pub common: Vec<String>,
    /// Present in more than one but not all datasets
    pub partial: Vec<String>,
    /// Present in exactly one dataset, listed per dataset
    pub unique_per_dataset: Vec<Vec<String>>,
}

/// Partition protein identifiers by presence across the given datasets
pub fn partition(datasets: &[Dataset]) -> Result<PartitionedProteins> {
    if datasets.is_empty() {
        return Err(ProteoError::EmptyData {
            reason: "no datasets to partition".to_string(),
        });
    }

    let per_dataset: Vec<Vec<String>> = datasets
        .iter()
        .map(|ds| ds.metadata.protein_order())
        .collect();
    let sets: Vec<HashSet<&String>> = per_dataset
        .iter()
        .map(|order| order.iter().collect())
        .collect();

    let membership = |id: &String| -> usize { sets.iter().filter(|s| s.contains(id)).count() };

    // Union in first-appearance order across datasets
    let mut seen: HashSet<&String> = HashSet::new();
    let mut common = Vec::new();
    let mut partial = Vec::new();
    for order in &per_dataset {
        for id in order {
            if !seen.insert(id) {
                continue;
            }
            let n = membership(id);
            if n == datasets.len() && datasets.len() > 1 {
                common.push(id.clone());
            } else if n > 1 {
                partial.push(id.clone());
            }
        }
    }
    if datasets.len() == 1 {
        common = per_dataset[0].clone();
    }

    let unique_per_dataset: Vec<Vec<String>> = per_dataset
        .iter()
        .map(|order| {
            order
                .iter()
                .filter(|id| membership(id) == 1 && datasets.len() > 1)
                .cloned()
                .collect()
        })
        .collect();

    Ok(PartitionedProteins {
        common,
        partial,
        unique_per_dataset,
    })
}

/// Restrict a dataset to the peptide rows of the given proteins, keeping
/// original row order and metadata alignment.
pub fn subset_to_proteins(dataset: &Dataset, proteins: &[String]) -> Result<Dataset> {
    let keep: HashSet<&String> = proteins.iter().collect();
    let rows: Vec<usize> = dataset
        .metadata
        .protein_ids()
        .iter()
        .enumerate()
        .filter(|(_, id)| keep.contains(id))
        .map(|(i, _)| i)
        .collect();

    if rows.is_empty() {
        return Err(ProteoError::EmptyData {
            reason: "no peptide rows match the requested proteins".to_string(),
        });
    }

    dataset.subset_peptides(&rows)
}
