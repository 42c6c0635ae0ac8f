//! Between-sample dissimilarities.

use crate::data::FeatureTable;
use crate::error::{ReportError, Result};
use crate::report::{Cell, ReportTable};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Dissimilarity measure between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetaMetric {
    #[default]
    BrayCurtis,
    Jaccard,
}

impl BetaMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "braycurtis" => Some(Self::BrayCurtis),
            "jaccard" => Some(Self::Jaccard),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BrayCurtis => "braycurtis",
            Self::Jaccard => "jaccard",
        }
    }

    /// Dissimilarity between two abundance vectors of equal length.
    pub fn distance(&self, u: &[f64], v: &[f64]) -> f64 {
        match self {
            Self::BrayCurtis => {
                let (mut diff, mut total) = (0.0, 0.0);
                for (a, b) in u.iter().zip(v) {
                    diff += (a - b).abs();
                    total += a + b;
                }
                if total > 0.0 {
                    diff / total
                } else {
                    0.0
                }
            }
            Self::Jaccard => {
                let (mut shared, mut union) = (0usize, 0usize);
                for (a, b) in u.iter().zip(v) {
                    let (pa, pb) = (*a > 0.0, *b > 0.0);
                    if pa && pb {
                        shared += 1;
                    }
                    if pa || pb {
                        union += 1;
                    }
                }
                if union > 0 {
                    1.0 - shared as f64 / union as f64
                } else {
                    0.0
                }
            }
        }
    }
}

impl std::fmt::Display for BetaMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Symmetric sample × sample dissimilarity matrix with a zero diagonal.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    pub ids: Vec<String>,
    pub data: DMatrix<f64>,
}

impl DistanceMatrix {
    /// Wrap a square matrix, checking shape and symmetry.
    pub fn new(ids: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        if !data.is_square() || data.nrows() != ids.len() {
            return Err(ReportError::DimensionMismatch {
                expected: ids.len(),
                actual: data.nrows(),
            });
        }
        let n = ids.len();
        for i in 0..n {
            if data[(i, i)] != 0.0 {
                return Err(ReportError::InvalidParameter(format!(
                    "Distance matrix diagonal is not zero for '{}'",
                    ids[i]
                )));
            }
            for j in (i + 1)..n {
                if (data[(i, j)] - data[(j, i)]).abs() > 1e-12 {
                    return Err(ReportError::InvalidParameter(
                        "Distance matrix is not symmetric".to_string(),
                    ));
                }
            }
        }
        Ok(Self { ids, data })
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|s| s == id)
    }

    /// Restrict to the named samples, in the given order.
    pub fn subset(&self, ids: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = self
            .ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let positions = ids
            .iter()
            .map(|id| {
                index.get(id.as_str()).copied().ok_or_else(|| {
                    ReportError::SampleMismatch(format!(
                        "Sample '{}' not found in distance matrix",
                        id
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let n = positions.len();
        let data = DMatrix::from_fn(n, n, |i, j| self.data[(positions[i], positions[j])]);
        Ok(Self {
            ids: ids.to_vec(),
            data,
        })
    }

    /// Full matrix as a report table (samples × samples).
    pub fn to_report_table(&self, title: &str) -> ReportTable {
        let mut table = ReportTable::new(title, "", self.ids.clone());
        for (i, id) in self.ids.iter().enumerate() {
            let cells = (0..self.len())
                .map(|j| Cell::number(self.data[(i, j)], 6))
                .collect();
            table.push_row(id.clone(), cells);
        }
        table
    }
}

/// Pairwise dissimilarities between every pair of samples.
///
/// Rows of the upper triangle are computed in parallel.
pub fn beta_diversity(table: &FeatureTable, metric: BetaMetric) -> Result<DistanceMatrix> {
    let n = table.n_samples();
    if n == 0 {
        return Err(ReportError::EmptyData(
            "Cannot compute beta diversity without samples".to_string(),
        ));
    }

    let columns: Vec<Vec<f64>> = (0..n).into_par_iter().map(|c| table.col_dense(c)).collect();
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| metric.distance(&columns[i], &columns[j]))
                .collect()
        })
        .collect();

    let mut data = DMatrix::zeros(n, n);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &d) in row.iter().enumerate() {
            let j = i + 1 + offset;
            data[(i, j)] = d;
            data[(j, i)] = d;
        }
    }

    debug!("Computed {} distance matrix for {} samples", metric, n);
    Ok(DistanceMatrix {
        ids: table.sample_ids().to_vec(),
        data,
    })
}
