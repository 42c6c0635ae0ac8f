//! Sequencing-depth filter.

use crate::data::FeatureTable;
use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a sequencing-depth filter kept and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySizeFilterResult {
    pub n_before: usize,
    pub n_after: usize,
    /// Dropped samples with their total reads, in table order.
    pub removed: Vec<(String, f64)>,
    pub retained_min: f64,
    pub retained_max: f64,
    pub retained_median: f64,
}

impl LibrarySizeFilterResult {
    pub fn n_removed(&self) -> usize {
        self.removed.len()
    }
}

impl std::fmt::Display for LibrarySizeFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Depth filter kept {} of {} samples",
            self.n_after, self.n_before
        )?;
        for (sample, depth) in &self.removed {
            writeln!(f, "  dropped {} ({} reads)", sample, depth)?;
        }
        writeln!(
            f,
            "  retained depth: {} to {} (median {})",
            self.retained_min, self.retained_max, self.retained_median
        )
    }
}

fn median_of_sorted(values: &[f64]) -> f64 {
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 0 => (values[n / 2 - 1] + values[n / 2]) / 2.0,
        _ => values[n / 2],
    }
}

/// Keep samples whose total reads lie in `[min, max]` and report the cut.
///
/// `None` leaves that side of the range open. Nothing left is `EmptyData`.
pub fn filter_library_size_with_stats(
    table: &FeatureTable,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<(FeatureTable, LibrarySizeFilterResult)> {
    let lo = min.unwrap_or(0.0);
    let hi = max.unwrap_or(f64::INFINITY);
    if hi < lo {
        return Err(ReportError::InvalidParameter(format!(
            "Library size range is empty: min {} exceeds max {}",
            lo, hi
        )));
    }

    let depths = table.col_sums();
    let (kept, dropped): (Vec<usize>, Vec<usize>) =
        (0..depths.len()).partition(|&i| (lo..=hi).contains(&depths[i]));
    if kept.is_empty() {
        return Err(ReportError::EmptyData(format!(
            "Every sample falls outside the library size range {} to {}",
            lo, hi
        )));
    }

    let removed: Vec<(String, f64)> = dropped
        .iter()
        .map(|&i| (table.sample_ids()[i].clone(), depths[i]))
        .collect();
    for (sample, depth) in &removed {
        debug!("Library size filter drops {} ({} reads)", sample, depth);
    }

    let mut retained: Vec<f64> = kept.iter().map(|&i| depths[i]).collect();
    retained.sort_by(f64::total_cmp);
    let result = LibrarySizeFilterResult {
        n_before: depths.len(),
        n_after: kept.len(),
        removed,
        retained_min: retained[0],
        retained_max: retained[retained.len() - 1],
        retained_median: median_of_sorted(&retained),
    };

    Ok((table.subset_samples(&kept)?, result))
}

/// Keep samples whose total reads lie in `[min, max]`.
pub fn filter_library_size(
    table: &FeatureTable,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<FeatureTable> {
    filter_library_size_with_stats(table, min, max).map(|(filtered, _)| filtered)
}
