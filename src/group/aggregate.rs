//! Per-treatment aggregation of a feature table.

use super::TreatmentGroups;
use crate::data::FeatureTable;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// How replicate samples of a treatment are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
}

impl Aggregation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "mean" | "average" => Some(Self::Mean),
            _ => None,
        }
    }
}

/// Dense features × treatments table.
#[derive(Debug, Clone)]
pub struct GroupedTable {
    pub feature_ids: Vec<String>,
    /// Lineage (or feature ID) per feature.
    pub labels: Vec<String>,
    pub treatments: Vec<String>,
    pub data: DMatrix<f64>,
}

/// Combine each treatment's samples into one column.
///
/// Empty treatments produce an all-zero column.
pub fn aggregate(
    table: &FeatureTable,
    groups: &TreatmentGroups,
    aggregation: Aggregation,
) -> GroupedTable {
    let n_features = table.n_features();
    let mut data = DMatrix::zeros(n_features, groups.len());

    for (t_idx, treatment) in groups.iter().enumerate() {
        if treatment.is_empty() {
            continue;
        }
        for &col in &treatment.sample_indices {
            for row in 0..n_features {
                data[(row, t_idx)] += table.get(row, col);
            }
        }
        if aggregation == Aggregation::Mean {
            let n = treatment.len() as f64;
            data.column_mut(t_idx).iter_mut().for_each(|v| *v /= n);
        }
    }

    GroupedTable {
        feature_ids: table.feature_ids().to_vec(),
        labels: (0..n_features)
            .map(|row| table.feature_label(row).to_string())
            .collect(),
        treatments: groups.names().into_iter().map(String::from).collect(),
        data,
    }
}

impl GroupedTable {
    pub fn n_features(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_treatments(&self) -> usize {
        self.data.ncols()
    }

    /// Total of each treatment column.
    pub fn column_totals(&self) -> Vec<f64> {
        self.data.column_iter().map(|c| c.sum()).collect()
    }

    /// Total of each feature row across treatments.
    pub fn row_totals(&self) -> Vec<f64> {
        self.data.row_iter().map(|r| r.sum()).collect()
    }

    pub fn column(&self, t_idx: usize) -> Vec<f64> {
        self.data.column(t_idx).iter().copied().collect()
    }

    pub fn row(&self, f_idx: usize) -> Vec<f64> {
        self.data.row(f_idx).iter().copied().collect()
    }

    /// Each treatment column divided by its total.
    pub fn relative_by_column(&self) -> DMatrix<f64> {
        let mut rel = self.data.clone();
        for (j, total) in self.column_totals().into_iter().enumerate() {
            if total > 0.0 {
                rel.column_mut(j).iter_mut().for_each(|v| *v /= total);
            }
        }
        rel
    }

    /// Each feature row divided by its total across treatments.
    pub fn relative_by_row(&self) -> DMatrix<f64> {
        let mut rel = self.data.clone();
        for (i, total) in self.row_totals().into_iter().enumerate() {
            if total > 0.0 {
                rel.row_mut(i).iter_mut().for_each(|v| *v /= total);
            }
        }
        rel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Metadata;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn grouped(aggregation: Aggregation) -> GroupedTable {
        let table = FeatureTable::from_reader(Cursor::new(
            "#OTU ID\tS1\tS2\tS3\tS4\ttaxonomy\n\
             asv1\t10\t20\t0\t0\tk__Bacteria; g__A\n\
             asv2\t0\t0\t5\t15\tk__Bacteria; g__B\n\
             asv3\t0\t0\t0\t0\tk__Bacteria; g__C\n",
        ))
        .unwrap();
        let metadata = Metadata::from_reader(Cursor::new(
            "id\tsite\nS1\tx\nS2\tx\nS3\ty\nS4\ty\n",
        ))
        .unwrap();
        let requested = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let groups = TreatmentGroups::resolve(&table, &metadata, "site", Some(&requested)).unwrap();
        aggregate(&table, &groups, aggregation)
    }

    #[test]
    fn test_sum_and_mean() {
        let sum = grouped(Aggregation::Sum);
        assert_eq!(sum.data[(0, 0)], 30.0);
        assert_eq!(sum.data[(1, 1)], 20.0);
        assert_eq!(sum.column(2), vec![0.0, 0.0, 0.0]);
        assert_eq!(sum.labels[1], "k__Bacteria; g__B");

        let mean = grouped(Aggregation::Mean);
        assert_eq!(mean.data[(0, 0)], 15.0);
        assert_eq!(mean.data[(1, 1)], 10.0);
    }

    #[test]
    fn test_relative_tables_keep_zero_lines() {
        let g = grouped(Aggregation::Sum);
        let by_col = g.relative_by_column();
        assert_relative_eq!(by_col[(0, 0)], 1.0);
        assert_eq!(by_col[(0, 2)], 0.0);
        assert!(by_col.iter().all(|v| v.is_finite()));

        let by_row = g.relative_by_row();
        assert_relative_eq!(by_row[(1, 1)], 1.0);
        assert_eq!(by_row.row(2).sum(), 0.0);
    }

    #[test]
    fn test_parse_aggregation() {
        assert_eq!(Aggregation::parse("Mean"), Some(Aggregation::Mean));
        assert_eq!(Aggregation::parse("max"), None);
    }
}
