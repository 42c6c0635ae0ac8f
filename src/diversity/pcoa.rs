//! Principal coordinates analysis (classical multidimensional scaling).

use super::DistanceMatrix;
use crate::error::{ReportError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative cutoff below which an eigenvalue is treated as zero.
const EIGEN_TOLERANCE: f64 = 1e-10;

/// Sample positions on the principal coordinate axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ordination {
    pub sample_ids: Vec<String>,
    /// Positive eigenvalues, descending.
    pub eigenvalues: Vec<f64>,
    pub proportion_explained: Vec<f64>,
    /// Samples × axes.
    pub coordinates: DMatrix<f64>,
}

impl Ordination {
    pub fn n_axes(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Coordinates of every sample on axis `k` (0-based), or `None` if the
    /// axis was not retained.
    pub fn axis(&self, k: usize) -> Option<Vec<f64>> {
        (k < self.n_axes()).then(|| self.coordinates.column(k).iter().copied().collect())
    }
}

/// Classical PCoA of a distance matrix.
///
/// Gower-centres `-½D²`, decomposes it and keeps axes with positive
/// eigenvalues. Each axis is oriented so its largest-magnitude coordinate is
/// positive.
pub fn pcoa(dm: &DistanceMatrix) -> Result<Ordination> {
    let n = dm.len();
    if n < 3 {
        return Err(ReportError::InvalidParameter(format!(
            "PCoA needs at least 3 samples, got {}",
            n
        )));
    }

    let a = dm.data.map(|d| -0.5 * d * d);
    let row_means: Vec<f64> = a.row_iter().map(|r| r.mean()).collect();
    let col_means: Vec<f64> = a.column_iter().map(|c| c.mean()).collect();
    let grand_mean = a.mean();
    let centred = DMatrix::from_fn(n, n, |i, j| {
        a[(i, j)] - row_means[i] - col_means[j] + grand_mean
    });

    let eigen = SymmetricEigen::new(centred);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| eigen.eigenvalues[y].total_cmp(&eigen.eigenvalues[x]));

    let largest = eigen.eigenvalues[order[0]];
    if largest <= 0.0 {
        return Err(ReportError::Statistics(
            "PCoA found no positive eigenvalues (all distances zero?)".to_string(),
        ));
    }
    let kept: Vec<usize> = order
        .into_iter()
        .filter(|&k| eigen.eigenvalues[k] > EIGEN_TOLERANCE * largest)
        .collect();

    let eigenvalues: Vec<f64> = kept.iter().map(|&k| eigen.eigenvalues[k]).collect();
    let positive_total: f64 = eigen.eigenvalues.iter().filter(|&&v| v > 0.0).sum();
    let proportion_explained = eigenvalues.iter().map(|v| v / positive_total).collect();

    let mut coordinates = DMatrix::zeros(n, kept.len());
    for (axis, &k) in kept.iter().enumerate() {
        let scale = eigen.eigenvalues[k].sqrt();
        let vector = eigen.eigenvectors.column(k);
        let anchor = vector
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        let sign = if anchor < 0.0 { -1.0 } else { 1.0 };
        for i in 0..n {
            coordinates[(i, axis)] = sign * vector[i] * scale;
        }
    }

    debug!("PCoA retained {} axes for {} samples", kept.len(), n);
    Ok(Ordination {
        sample_ids: dm.ids.clone(),
        eigenvalues,
        proportion_explained,
        coordinates,
    })
}
