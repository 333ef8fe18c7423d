//! Bias-trend normalization (EigenMS)

mod eigen;
mod svd;

pub use eigen::{
    apply_removal, identify_trends, NormalizedResult, TrendAnalysis, MIN_COMPLETE_PEPTIDES,
};
pub use svd::{jacobi_svd, Svd};
