//! Sample filters driven by metadata and library totals.

use crate::data::{FeatureTable, Metadata};
use crate::error::{ReportError, Result};
use tracing::{debug, warn};

/// Keep table samples that have a non-missing value in `column`.
///
/// Table samples absent from the metadata are dropped as well.
pub fn filter_samples_non_missing(
    table: &FeatureTable,
    metadata: &Metadata,
    column: &str,
) -> Result<FeatureTable> {
    let present = metadata.non_missing_ids(column)?;
    let keep: Vec<usize> = table
        .sample_ids()
        .iter()
        .enumerate()
        .filter(|(_, sid)| present.contains(sid))
        .map(|(i, _)| i)
        .collect();

    if keep.is_empty() {
        return Err(ReportError::EmptyData(format!(
            "No feature-table samples have a value for '{}'",
            column
        )));
    }
    debug!(
        "{} of {} samples have a value for '{}'",
        keep.len(),
        table.n_samples(),
        column
    );
    table.subset_samples(&keep)
}

/// Remove samples whose total abundance is zero.
pub fn drop_empty_samples(table: &FeatureTable) -> Result<FeatureTable> {
    let totals = table.col_sums();
    let mut keep = Vec::with_capacity(totals.len());
    for (i, total) in totals.iter().enumerate() {
        if *total > 0.0 {
            keep.push(i);
        } else {
            warn!("Dropping sample {} with no observations", table.sample_ids()[i]);
        }
    }

    if keep.is_empty() {
        return Err(ReportError::EmptyData(
            "Every sample in the table is empty".to_string(),
        ));
    }
    if keep.len() == totals.len() {
        return Ok(table.clone());
    }
    table.subset_samples(&keep)
}
