//! Prevalence-based feature filtering.

use crate::data::FeatureTable;
use crate::error::{ReportError, Result};
use rayon::prelude::*;
use tracing::debug;

/// Keep features present in at least `threshold` proportion of samples.
///
/// A feature is present in a sample when its abundance is above zero. The
/// sample requirement is `ceil(threshold * n_samples)`.
pub fn filter_prevalence(table: &FeatureTable, threshold: f64) -> Result<FeatureTable> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ReportError::InvalidParameter(
            "Prevalence threshold must be between 0 and 1".to_string(),
        ));
    }

    let min_samples = (threshold * table.n_samples() as f64).ceil() as usize;

    let keep_indices: Vec<usize> = (0..table.n_features())
        .into_par_iter()
        .filter(|&row| {
            let nnz = table.data().outer_view(row).map(|v| v.nnz()).unwrap_or(0);
            nnz >= min_samples
        })
        .collect();

    if keep_indices.is_empty() {
        return Err(ReportError::EmptyData(format!(
            "No features pass prevalence threshold of {:.1}%",
            threshold * 100.0
        )));
    }

    debug!(
        "Prevalence filter kept {} of {} features",
        keep_indices.len(),
        table.n_features()
    );
    table.subset_features(&keep_indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn create_test_table() -> FeatureTable {
        // feat_0 in 4/4 samples, feat_1 in 2/4, feat_2 in 1/4
        let mut tri_mat = TriMat::new((3, 4));
        for col in 0..4 {
            tri_mat.add_triplet(0, col, 10.0);
        }
        tri_mat.add_triplet(1, 0, 3.0);
        tri_mat.add_triplet(1, 2, 1.0);
        tri_mat.add_triplet(2, 3, 7.0);

        let feature_ids = (0..3).map(|i| format!("feat_{}", i)).collect();
        let sample_ids = (0..4).map(|i| format!("S{}", i)).collect();
        FeatureTable::new(tri_mat.to_csr(), feature_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_filter_half() {
        let table = create_test_table();
        let filtered = filter_prevalence(&table, 0.5).unwrap();
        assert_eq!(filtered.feature_ids(), &["feat_0", "feat_1"]);
    }

    #[test]
    fn test_zero_threshold_keeps_all() {
        let table = create_test_table();
        assert_eq!(filter_prevalence(&table, 0.0).unwrap().n_features(), 3);
    }

    #[test]
    fn test_invalid_threshold() {
        let table = create_test_table();
        assert!(filter_prevalence(&table, 1.5).is_err());
        assert!(filter_prevalence(&table, -0.1).is_err());
    }
}
