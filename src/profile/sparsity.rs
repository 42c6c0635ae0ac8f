//! How many zeros an ASV table carries, overall and per axis.

use super::median;
use crate::data::FeatureTable;
use serde::{Deserialize, Serialize};

/// Zero structure of a feature table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparsityProfile {
    /// Features × samples.
    pub cells: usize,
    pub observed_cells: usize,
    /// Fraction of cells that are zero.
    pub sparsity: f64,
    /// Per feature, fraction of samples where it is absent.
    pub feature_sparsity: Vec<f64>,
    /// Per sample, fraction of features it lacks.
    pub sample_sparsity: Vec<f64>,
    pub mean_feature_sparsity: f64,
    pub median_feature_sparsity: f64,
    pub mean_sample_sparsity: f64,
    pub median_sample_sparsity: f64,
    /// Features seen in exactly one sample.
    pub n_singleton_features: usize,
    /// Features seen in no sample.
    pub n_absent_features: usize,
}

impl SparsityProfile {
    pub fn zero_cells(&self) -> usize {
        self.cells - self.observed_cells
    }

    /// More than half of the cells are zero, typical for amplicon data.
    pub fn is_highly_sparse(&self) -> bool {
        self.sparsity > 0.5
    }
}

impl std::fmt::Display for SparsityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = |v: f64| v * 100.0;
        writeln!(f, "Zeros")?;
        writeln!(
            f,
            "  {} of {} cells are zero ({:.2}%)",
            self.zero_cells(),
            self.cells,
            pct(self.sparsity)
        )?;
        writeln!(
            f,
            "  per feature: mean {:.2}%, median {:.2}%",
            pct(self.mean_feature_sparsity),
            pct(self.median_feature_sparsity)
        )?;
        writeln!(
            f,
            "  per sample:  mean {:.2}%, median {:.2}%",
            pct(self.mean_sample_sparsity),
            pct(self.median_sample_sparsity)
        )?;
        writeln!(f, "  singleton features: {}", self.n_singleton_features)?;
        writeln!(f, "  absent features:    {}", self.n_absent_features)
    }
}

/// Profile the zero structure of `table`.
pub fn profile_sparsity(table: &FeatureTable) -> SparsityProfile {
    let (n_features, n_samples) = (table.n_features(), table.n_samples());
    let cells = n_features * n_samples;
    let observed_cells = table.nnz();
    let share = |missing: usize, of: usize| if of == 0 { 0.0 } else { missing as f64 / of as f64 };

    let row_nnz = table.row_nnz();
    let feature_sparsity: Vec<f64> = row_nnz
        .iter()
        .map(|&seen| share(n_samples - seen, n_samples))
        .collect();

    let mut col_nnz = vec![0usize; n_samples];
    for (_, col) in table.data().iter().filter(|(v, _)| **v != 0.0).map(|(_, (r, c))| (r, c)) {
        col_nnz[col] += 1;
    }
    let sample_sparsity: Vec<f64> = col_nnz
        .iter()
        .map(|&seen| share(n_features - seen, n_features))
        .collect();

    let mean = |v: &[f64]| if v.is_empty() { 0.0 } else { v.iter().sum::<f64>() / v.len() as f64 };

    SparsityProfile {
        cells,
        observed_cells,
        sparsity: share(cells - observed_cells, cells),
        mean_feature_sparsity: mean(&feature_sparsity),
        median_feature_sparsity: median(&feature_sparsity),
        mean_sample_sparsity: mean(&sample_sparsity),
        median_sample_sparsity: median(&sample_sparsity),
        n_singleton_features: row_nnz.iter().filter(|&&seen| seen == 1).count(),
        n_absent_features: row_nnz.iter().filter(|&&seen| seen == 0).count(),
        feature_sparsity,
        sample_sparsity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    /// asv3 is a singleton, asv4 was filtered to zero upstream.
    fn rhizosphere() -> FeatureTable {
        FeatureTable::from_reader(Cursor::new(
            "#OTU ID\trh1\trh2\trh3\trh4\n\
             asv1\t10\t20\t0\t5\n\
             asv2\t100\t200\t150\t175\n\
             asv3\t1\t0\t0\t0\n\
             asv4\t0\t0\t0\t0\n",
        ))
        .unwrap()
    }

    #[test]
    fn test_overall_sparsity() {
        let profile = profile_sparsity(&rhizosphere());
        assert_eq!(profile.cells, 16);
        assert_eq!(profile.observed_cells, 8);
        assert_eq!(profile.zero_cells(), 8);
        assert_relative_eq!(profile.sparsity, 0.5);
        assert!(!profile.is_highly_sparse());
    }

    #[test]
    fn test_axis_sparsity_and_rare_features() {
        let profile = profile_sparsity(&rhizosphere());
        assert_relative_eq!(profile.feature_sparsity[0], 0.25);
        assert_relative_eq!(profile.feature_sparsity[3], 1.0);
        // rh3 only holds asv2
        assert_relative_eq!(profile.sample_sparsity[2], 0.75);
        assert_eq!(profile.n_singleton_features, 1);
        assert_eq!(profile.n_absent_features, 1);
        assert!(profile.to_string().contains("8 of 16 cells are zero"));
    }
}
