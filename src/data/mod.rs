//! Data structures: intensity matrix, row metadata, treatment layout
//!
//! The row order of the intensity matrix and the metadata table are kept in
//! lockstep at every stage; any row removal removes the same row from both.

mod intensity;
mod metadata;
mod treatment;

pub use intensity::IntensityMatrix;
pub use metadata::PeptideMetadata;
pub use treatment::TreatmentLayout;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pipeline stage at which an entity was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionStage {
    Normalization,
    Imputation,
    DifferentialExpression,
    PresenceAbsence,
}

/// A recorded per-entity exclusion.
///
/// Every peptide or protein dropped by a stage is individually attributable;
/// exclusions are data in the stage's result, never an opaque count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    /// Peptide or protein identifier
    pub id: String,
    /// Stage that dropped the entity
    pub stage: ExclusionStage,
    /// Human-readable reason
    pub reason: String,
}

impl Exclusion {
    pub fn new(id: &str, stage: ExclusionStage, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }
}

/// One dataset: intensity matrix, row metadata, and treatment layout with
/// all alignment invariants checked once at construction.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub matrix: IntensityMatrix,
    pub metadata: PeptideMetadata,
    pub treatment: TreatmentLayout,
}

impl Dataset {
    pub fn new(
        matrix: IntensityMatrix,
        metadata: PeptideMetadata,
        treatment: TreatmentLayout,
    ) -> Result<Self> {
        metadata.check_alignment(&matrix)?;
        treatment.check_alignment(matrix.n_samples())?;
        Ok(Self {
            matrix,
            metadata,
            treatment,
        })
    }

    /// Subset peptide rows, keeping matrix and metadata in lockstep
    pub fn subset_peptides(&self, indices: &[usize]) -> Result<Self> {
        Dataset::new(
            self.matrix.subset_peptides(indices)?,
            self.metadata.subset(indices)?,
            self.treatment.clone(),
        )
    }
}
