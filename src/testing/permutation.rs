//! Multi-dataset permutation testing
//!
//! The combined statistic for a protein is the sum of its per-dataset
//! statistics. The null distribution is built by row-restricted permutation:
//! within each dataset, every peptide row's observations are independently
//! reassigned across the sample columns, which preserves treatment-group
//! sizes by construction. Datasets are permuted independently of one another
//! in each iteration.
//!
//! Every (iteration, dataset) pair draws from its own derived stream, so
//! permutation outcomes are independent of execution order and parallelism
//! degree; the permutation loop is evaluated through a rayon parallel
//! iterator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::data::Dataset;
use crate::error::{ProteoError, Result};
use crate::rng::{derive_stream2, PERMUTE_TAG};

/// Cooperative cancellation flag, checked at permutation-iteration
/// granularity. A cancelled run returns `ProteoError::Cancelled` instead of
/// a partial p-value.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Parameters of a permutation test
#[derive(Debug, Clone)]
pub struct PermutationParams {
    /// Number of permutation iterations; at least 500 recommended, since
    /// the smallest attainable p-value is 1 / (n_permutations + 1)
    pub n_permutations: usize,
    /// Master seed for the derived permutation streams
    pub seed: u64,
    /// Optional external interruption
    pub cancel: Option<CancelToken>,
}

impl PermutationParams {
    pub fn new(n_permutations: usize, seed: u64) -> Self {
        Self {
            n_permutations,
            seed,
            cancel: None,
        }
    }
}

/// A protein entry prepared for permutation: its peptide rows in each
/// dataset (empty where absent or degenerate) and the observed combined
/// statistic.
pub(crate) struct TestedProtein {
    pub rows_per_dataset: Vec<Vec<usize>>,
    pub observed: f64,
}

/// Per-dataset statistic evaluated on a (possibly permuted) peptide block
pub(crate) type BlockStat = dyn Fn(ArrayView2<'_, f64>, &crate::data::TreatmentLayout) -> Option<f64>
    + Sync;

/// Shuffle each row of the matrix independently across columns
fn permute_rows(values: ArrayView2<'_, f64>, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let mut out = values.to_owned();
    let n_cols = out.ncols();
    let mut buffer: Vec<f64> = Vec::with_capacity(n_cols);
    for mut row in out.axis_iter_mut(Axis(0)) {
        buffer.clear();
        buffer.extend(row.iter().copied());
        buffer.shuffle(rng);
        for (j, &v) in buffer.iter().enumerate() {
            row[j] = v;
        }
    }
    out
}

/// Add-one-smoothed permutation p-values for the tested proteins.
///
/// Returns, per protein, the proportion of permuted combined statistics at
/// least as large as the observed one; never exactly zero.
pub(crate) fn permutation_pvalues(
    datasets: &[Dataset],
    tested: &[TestedProtein],
    params: &PermutationParams,
    stat: &BlockStat,
) -> Result<Vec<f64>> {
    if params.n_permutations == 0 {
        return Err(ProteoError::InvalidInput {
            reason: "permutation count must be at least 1".to_string(),
        });
    }
    if params.n_permutations < 500 {
        log::warn!(
            "{} permutations gives coarse p-value resolution (minimum nonzero p ~ {:.4}); \
             500 or more are recommended",
            params.n_permutations,
            1.0 / (params.n_permutations as f64 + 1.0)
        );
    }

    let cancelled = || {
        params
            .cancel
            .as_ref()
            .map(|c| c.is_cancelled())
            .unwrap_or(false)
    };

    let n_tested = tested.len();
    let exceed: Vec<u64> = (0..params.n_permutations)
        .into_par_iter()
        .map(|t| {
            if cancelled() {
                return Vec::new();
            }

            let mut combined = vec![0.0f64; n_tested];
            for (d, dataset) in datasets.iter().enumerate() {
                let mut rng = derive_stream2(params.seed, PERMUTE_TAG, t as u64, d as u64);
                let permuted = permute_rows(dataset.matrix.intensities(), &mut rng);

                for (idx, protein) in tested.iter().enumerate() {
                    let rows = &protein.rows_per_dataset[d];
                    if rows.is_empty() {
                        continue;
                    }
                    let block = permuted.select(Axis(0), rows);
                    if let Some(s) = stat(block.view(), &dataset.treatment) {
                        combined[idx] += s;
                    }
                }
            }

            tested
                .iter()
                .enumerate()
                .map(|(idx, protein)| u64::from(combined[idx] >= protein.observed))
                .collect::<Vec<u64>>()
        })
        .reduce(
            || vec![0u64; n_tested],
            |a, b| {
                if a.is_empty() {
                    return b;
                }
                if b.is_empty() {
                    return a;
                }
                a.iter().zip(b.iter()).map(|(x, y)| x + y).collect()
            },
        );

    if cancelled() {
        return Err(ProteoError::Cancelled);
    }

    let denom = params.n_permutations as f64 + 1.0;
    Ok(exceed
        .into_iter()
        .map(|count| (1.0 + count as f64) / denom)
        .collect())
}
