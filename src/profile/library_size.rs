//! Sequencing depth per sample.

use super::median;
use crate::data::FeatureTable;
use serde::{Deserialize, Serialize};

/// Distribution of per-sample read totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySizeProfile {
    pub sample_ids: Vec<String>,
    /// Total reads per sample, in table order.
    pub depths: Vec<f64>,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Coefficient of variation.
    pub cv: f64,
    /// Samples more than 2 SD below the mean.
    pub shallow: Vec<String>,
    /// Samples more than 2 SD above the mean.
    pub deep: Vec<String>,
    /// Samples with no reads.
    pub empty: Vec<String>,
}

impl LibrarySizeProfile {
    pub fn n_samples(&self) -> usize {
        self.depths.len()
    }

    /// Depths vary by more than half the mean.
    pub fn is_highly_variable(&self) -> bool {
        self.cv > 0.5
    }

    /// Samples with fewer than `threshold` reads.
    pub fn samples_below(&self, threshold: f64) -> Vec<&str> {
        self.sample_ids
            .iter()
            .zip(&self.depths)
            .filter(|(_, &depth)| depth < threshold)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl std::fmt::Display for LibrarySizeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sequencing depth ({} samples)", self.n_samples())?;
        writeln!(f, "  range:  {} to {}", self.min, self.max)?;
        writeln!(f, "  mean:   {:.2} (sd {:.2}, cv {:.2})", self.mean, self.std_dev, self.cv)?;
        writeln!(f, "  median: {:.2}", self.median)?;
        let list = |ids: &[String]| if ids.is_empty() { "none".to_string() } else { ids.join(", ") };
        writeln!(f, "  shallow (< mean - 2 sd): {}", list(&self.shallow))?;
        writeln!(f, "  deep (> mean + 2 sd):    {}", list(&self.deep))?;
        writeln!(f, "  empty:                   {}", list(&self.empty))
    }
}

/// Profile per-sample read totals of `table`.
pub fn profile_library_size(table: &FeatureTable) -> LibrarySizeProfile {
    let depths = table.col_sums();
    let sample_ids = table.sample_ids().to_vec();
    let n = depths.len() as f64;

    let (mean, std_dev) = if depths.is_empty() {
        (0.0, 0.0)
    } else {
        let mean = depths.iter().sum::<f64>() / n;
        let var = depths.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n;
        (mean, var.sqrt())
    };
    let (min, max) = depths
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, &d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
        .unwrap_or((0.0, 0.0));

    let pick = |keep: &dyn Fn(f64) -> bool| -> Vec<String> {
        sample_ids
            .iter()
            .zip(&depths)
            .filter(|(_, &d)| keep(d))
            .map(|(id, _)| id.clone())
            .collect()
    };
    let shallow = pick(&|d| d < mean - 2.0 * std_dev);
    let deep = pick(&|d| d > mean + 2.0 * std_dev);
    let empty = pick(&|d| d == 0.0);

    LibrarySizeProfile {
        median: median(&depths),
        cv: if mean > 0.0 { std_dev / mean } else { 0.0 },
        mean,
        std_dev,
        min,
        max,
        shallow,
        deep,
        empty,
        sample_ids,
        depths,
    }
}
