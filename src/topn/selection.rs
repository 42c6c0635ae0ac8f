//! Round-robin top-N selection and the `Other` remainder.
//!
//! Each treatment ranks features by its own abundance. Selection walks the
//! rankings in turn, one rank depth at a time, so every treatment contributes
//! its most abundant taxa before any treatment contributes its second tier.

use crate::data::taxonomy::{format_label, matches_exclusion, SequenceKind};
use crate::data::FeatureTable;
use crate::error::{ReportError, Result};
use crate::group::{aggregate, Aggregation, GroupedTable, TreatmentGroups};
use crate::report::{Cell, ReportTable};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use crate::data::taxonomy::OTHER_LABEL;

/// Options shared by the taxa bar and correlation analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopTaxaOptions {
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Lineage substring of features never selected (e.g. `k__Virus`).
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub kind: SequenceKind,
}

impl Default for TopTaxaOptions {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::Sum,
            exclude: None,
            kind: SequenceKind::Generic,
        }
    }
}

fn is_excluded(label: &str, exclude: Option<&str>) -> bool {
    exclude.map_or(false, |pattern| matches_exclusion(label, pattern))
}

/// Select `n` feature rows by round robin over treatment columns.
///
/// Returns row indices in selection order. Features whose label matches
/// `exclude` are never selected. `n` above the number of eligible features is
/// capped.
pub fn select_top_n(grouped: &GroupedTable, n: usize, exclude: Option<&str>) -> Result<Vec<usize>> {
    if n == 0 {
        return Err(ReportError::InvalidParameter(
            "Number of top taxa must be at least 1".to_string(),
        ));
    }
    if grouped.n_treatments() == 0 {
        return Err(ReportError::EmptyData(
            "No treatments to select top taxa from".to_string(),
        ));
    }

    let eligible: Vec<usize> = (0..grouped.n_features())
        .filter(|&row| !is_excluded(&grouped.labels[row], exclude))
        .collect();
    if eligible.is_empty() {
        return Err(ReportError::EmptyData(
            "Every feature is excluded from top-N selection".to_string(),
        ));
    }

    let n = if n > eligible.len() {
        warn!(
            "Requested top {} taxa but only {} are available; using {}",
            n,
            eligible.len(),
            eligible.len()
        );
        eligible.len()
    } else {
        n
    };

    // sort_by is stable, so ties keep table order
    let orders: Vec<Vec<usize>> = (0..grouped.n_treatments())
        .map(|t| {
            let mut order = eligible.clone();
            order.sort_by(|&a, &b| grouped.data[(b, t)].total_cmp(&grouped.data[(a, t)]));
            order
        })
        .collect();

    let mut top: Vec<usize> = Vec::with_capacity(n);
    let mut depth = 0;
    while top.len() < n {
        for order in &orders {
            if let Some(&candidate) = order.get(depth) {
                if !top.contains(&candidate) {
                    top.push(candidate);
                }
            }
            if top.len() >= n {
                break;
            }
        }
        depth += 1;
    }

    debug!("Selected top {} taxa after {} rounds", top.len(), depth);
    Ok(top)
}

/// Selected taxa plus an `Other` row, per treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopTaxa {
    pub treatments: Vec<String>,
    /// Feature ID per row; the last row is `Other`.
    pub feature_ids: Vec<String>,
    /// Raw lineage per row.
    pub lineages: Vec<String>,
    /// Display label per row.
    pub labels: Vec<String>,
    /// Rows × treatments abundances.
    pub data: DMatrix<f64>,
    /// Feature IDs removed by the exclusion pattern.
    pub excluded: Vec<String>,
    pub aggregation: Aggregation,
}

impl TopTaxa {
    /// Aggregate the table by treatment and build the top-N view.
    pub fn from_table(
        table: &FeatureTable,
        groups: &TreatmentGroups,
        n: usize,
        options: &TopTaxaOptions,
    ) -> Result<Self> {
        let grouped = aggregate(table, groups, options.aggregation);
        Self::build(&grouped, n, options)
    }

    /// Select top taxa from an aggregated table.
    ///
    /// Selected rows are ordered by the first treatment, most abundant first.
    /// `Other` holds everything else, excluded features included.
    pub fn build(grouped: &GroupedTable, n: usize, options: &TopTaxaOptions) -> Result<Self> {
        let exclude = options.exclude.as_deref();
        let mut selected = select_top_n(grouped, n, exclude)?;
        selected.sort_by(|&a, &b| grouped.data[(b, 0)].total_cmp(&grouped.data[(a, 0)]));

        let n_treatments = grouped.n_treatments();
        let n_rows = selected.len() + 1;
        let mut data = DMatrix::zeros(n_rows, n_treatments);
        for (row, &feature) in selected.iter().enumerate() {
            data.row_mut(row).copy_from(&grouped.data.row(feature));
        }
        for feature in 0..grouped.n_features() {
            if !selected.contains(&feature) {
                for t in 0..n_treatments {
                    data[(n_rows - 1, t)] += grouped.data[(feature, t)];
                }
            }
        }

        let fallback = options.kind.unresolved_label();
        let mut feature_ids: Vec<String> =
            selected.iter().map(|&f| grouped.feature_ids[f].clone()).collect();
        let mut lineages: Vec<String> = selected.iter().map(|&f| grouped.labels[f].clone()).collect();
        let mut labels: Vec<String> = lineages.iter().map(|l| format_label(l, fallback)).collect();
        feature_ids.push(OTHER_LABEL.to_string());
        lineages.push(OTHER_LABEL.to_string());
        labels.push(OTHER_LABEL.to_string());

        let excluded = (0..grouped.n_features())
            .filter(|&f| is_excluded(&grouped.labels[f], exclude))
            .map(|f| grouped.feature_ids[f].clone())
            .collect();

        Ok(Self {
            treatments: grouped.treatments.clone(),
            feature_ids,
            lineages,
            labels,
            data,
            excluded,
            aggregation: options.aggregation,
        })
    }

    /// Number of selected taxa, not counting `Other`.
    pub fn n_selected(&self) -> usize {
        self.data.nrows() - 1
    }

    /// Each treatment as a percentage of its total; columns sum to 100.
    pub fn percentages(&self) -> DMatrix<f64> {
        let mut pct = self.data.clone();
        for mut column in pct.column_iter_mut() {
            let total = column.sum();
            if total > 0.0 {
                column.iter_mut().for_each(|v| *v = *v / total * 100.0);
            }
        }
        pct
    }

    /// Percentage table, treatments × raw lineages.
    pub fn percentage_table(&self) -> ReportTable {
        let pct = self.percentages();
        let mut table = ReportTable::new(
            "Relative abundance (%)",
            "Treatment",
            self.lineages.clone(),
        );
        for (t, name) in self.treatments.iter().enumerate() {
            let cells = (0..pct.nrows()).map(|r| Cell::number(pct[(r, t)], 6)).collect();
            table.push_row(name.clone(), cells);
        }
        table
    }

    /// Abundance table, raw lineages × treatments.
    pub fn count_table(&self) -> ReportTable {
        let title = match self.aggregation {
            Aggregation::Sum => "Summed abundance",
            Aggregation::Mean => "Mean abundance",
        };
        let mut table = ReportTable::new(title, "Taxon", self.treatments.clone());
        for (r, lineage) in self.lineages.iter().enumerate() {
            let cells = (0..self.data.ncols())
                .map(|t| Cell::number(self.data[(r, t)], 6))
                .collect();
            table.push_row(lineage.clone(), cells);
        }
        table
    }

    /// Counts by treatment with formatted taxon labels as columns.
    pub fn prism_table(&self) -> ReportTable {
        let mut table = ReportTable::new("Top taxa", "Treatment", self.labels.clone());
        for (t, name) in self.treatments.iter().enumerate() {
            let cells = (0..self.data.nrows())
                .map(|r| Cell::number(self.data[(r, t)], 6))
                .collect();
            table.push_row(name.clone(), cells);
        }
        table
    }

    /// Percentage table followed by the abundance table.
    pub fn to_report_tables(&self) -> Vec<ReportTable> {
        vec![self.percentage_table(), self.count_table()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grouped(rows: &[(&str, [f64; 2])]) -> GroupedTable {
        let n = rows.len();
        GroupedTable {
            feature_ids: (0..n).map(|i| format!("asv{}", i)).collect(),
            labels: rows.iter().map(|(l, _)| l.to_string()).collect(),
            treatments: vec!["T1".to_string(), "T2".to_string()],
            data: DMatrix::from_fn(n, 2, |i, j| rows[i].1[j]),
        }
    }

    fn fixture() -> GroupedTable {
        grouped(&[
            ("k__Bacteria; g__A", [50.0, 1.0]),
            ("k__Bacteria; g__B", [40.0, 2.0]),
            ("k__Bacteria; g__C", [1.0, 60.0]),
            ("k__Bacteria; g__D", [2.0, 30.0]),
            ("k__Virus; g__V", [100.0, 100.0]),
            ("k__Bacteria; g__E", [3.0, 3.0]),
        ])
    }

    #[test]
    fn test_round_robin_alternates_treatments() {
        let top = select_top_n(&fixture(), 4, None).unwrap();
        // V tops both columns; then T1 picks A, T2 picks C, then T1 picks B
        assert_eq!(top, vec![4, 0, 2, 1]);
    }

    #[test]
    fn test_exclusion_skips_features() {
        let top = select_top_n(&fixture(), 3, Some("k__Virus")).unwrap();
        assert_eq!(top, vec![0, 2, 1]);
    }

    #[test]
    fn test_n_capped_and_zero_rejected() {
        let top = select_top_n(&fixture(), 50, Some("k__Virus")).unwrap();
        assert_eq!(top.len(), 5);
        assert!(select_top_n(&fixture(), 0, None).is_err());
    }

    #[test]
    fn test_ties_keep_table_order() {
        let g = grouped(&[("a", [1.0, 1.0]), ("b", [1.0, 1.0]), ("c", [1.0, 1.0])]);
        assert_eq!(select_top_n(&g, 2, None).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_build_with_other_row() {
        let options = TopTaxaOptions {
            exclude: Some("k__Virus".to_string()),
            kind: SequenceKind::Bacterial,
            ..Default::default()
        };
        let top = TopTaxa::build(&fixture(), 3, &options).unwrap();

        assert_eq!(top.n_selected(), 3);
        // sorted by T1 descending: A (50), B (40), C (1)
        assert_eq!(top.labels, vec!["g__A", "g__B", "g__C", "Other"]);
        // Other = D + V + E
        assert_relative_eq!(top.data[(3, 0)], 105.0);
        assert_relative_eq!(top.data[(3, 1)], 133.0);
        assert_eq!(top.excluded, vec!["asv4"]);

        let pct = top.percentages();
        for t in 0..2 {
            assert_relative_eq!(pct.column(t).sum(), 100.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_report_tables_layout() {
        let top = TopTaxa::build(&fixture(), 2, &TopTaxaOptions::default()).unwrap();
        let tables = top.to_report_tables();
        assert_eq!(tables[0].columns.last().map(String::as_str), Some("Other"));
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[1].rows.len(), 3);
        assert_eq!(top.prism_table().columns[0], "g__V");
    }
}
