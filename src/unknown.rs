//! Most abundant features that are not classified to a given rank.

use crate::data::taxonomy::{is_resolved_at, Rank};
use crate::data::FeatureTable;
use crate::error::{ReportError, Result};
use crate::report::{Cell, ReportTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownFeature {
    pub feature_id: String,
    pub lineage: String,
    pub total: f64,
    /// Share of the whole table, in percent.
    pub relative_percent: f64,
    /// Fraction of samples where the feature is present.
    pub prevalence: f64,
}

/// The `n` most abundant features not resolved at `rank`.
///
/// Ordered by total abundance, largest first; ties keep table order.
pub fn top_unknown(table: &FeatureTable, n: usize, rank: Rank) -> Result<Vec<UnknownFeature>> {
    if n == 0 {
        return Err(ReportError::InvalidParameter(
            "Number of unknown features must be at least 1".to_string(),
        ));
    }

    let totals = table.row_sums();
    let grand_total: f64 = totals.iter().sum();
    let present = table.row_nnz();
    let n_samples = table.n_samples().max(1) as f64;

    let mut unknown: Vec<usize> = (0..table.n_features())
        .filter(|&row| !is_resolved_at(table.feature_label(row), rank))
        .collect();
    debug!(
        "{} of {} features are unresolved at {}",
        unknown.len(),
        table.n_features(),
        rank.name()
    );
    unknown.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]));
    unknown.truncate(n);

    Ok(unknown
        .into_iter()
        .map(|row| UnknownFeature {
            feature_id: table.feature_ids()[row].clone(),
            lineage: table.feature_label(row).to_string(),
            total: totals[row],
            relative_percent: if grand_total > 0.0 {
                totals[row] / grand_total * 100.0
            } else {
                0.0
            },
            prevalence: present[row] as f64 / n_samples,
        })
        .collect())
}

/// Report table of unknown features.
pub fn unknown_table(features: &[UnknownFeature], rank: Rank) -> ReportTable {
    let mut table = ReportTable::new(
        format!("Features unresolved at {}", rank.name()),
        "Feature ID",
        vec![
            "Taxonomy".to_string(),
            "Total abundance".to_string(),
            "Relative abundance (%)".to_string(),
            "Prevalence".to_string(),
        ],
    );
    for f in features {
        table.push_row(
            f.feature_id.clone(),
            vec![
                Cell::text(f.lineage.clone()),
                Cell::number(f.total, 6),
                Cell::number(f.relative_percent, 4),
                Cell::number(f.prevalence, 4),
            ],
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn table() -> FeatureTable {
        FeatureTable::from_reader(Cursor::new(
            "#OTU ID\tS1\tS2\ttaxonomy\n\
             a\t10\t10\tk__Bacteria; p__Firmicutes; g__Bacillus\n\
             b\t30\t0\tk__Bacteria; p__Firmicutes; g__\n\
             c\t5\t5\tUnassigned\n\
             d\t40\t0\tk__Bacteria; f__Lachnospiraceae\n",
        ))
        .unwrap()
    }

    #[test]
    fn test_unknown_at_genus() {
        let unknown = top_unknown(&table(), 10, Rank::Genus).unwrap();
        let ids: Vec<&str> = unknown.iter().map(|u| u.feature_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "c"]);
        assert_relative_eq!(unknown[0].relative_percent, 40.0);
        assert_relative_eq!(unknown[2].prevalence, 1.0);
        assert_relative_eq!(unknown[1].prevalence, 0.5);
    }

    #[test]
    fn test_truncate_and_rank() {
        assert_eq!(top_unknown(&table(), 1, Rank::Genus).unwrap().len(), 1);
        // "b" stops at phylum and "c" has no ranks
        let at_family = top_unknown(&table(), 10, Rank::Family).unwrap();
        let ids: Vec<&str> = at_family.iter().map(|u| u.feature_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(top_unknown(&table(), 0, Rank::Genus).is_err());
    }

    #[test]
    fn test_table_rows() {
        let unknown = top_unknown(&table(), 2, Rank::Genus).unwrap();
        let t = unknown_table(&unknown, Rank::Genus);
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.rows[0].1[0], Cell::text("k__Bacteria; f__Lachnospiraceae"));
    }
}
