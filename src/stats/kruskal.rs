//! Kruskal-Wallis H test on independent samples.

use super::rank::{rank_average, tie_sizes};
use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Result of a Kruskal-Wallis test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KruskalResult {
    /// Tie-corrected H statistic.
    pub statistic: f64,
    pub p_value: f64,
    /// Degrees of freedom (non-empty groups - 1).
    pub df: usize,
}

/// Kruskal-Wallis H test.
///
/// Empty groups are ignored. Ranks are averaged over ties in the pooled data
/// and H is divided by the tie correction `1 - Σ(t³ - t) / (N³ - N)`. The
/// p-value is the upper tail of χ² with k - 1 degrees of freedom.
pub fn kruskal(groups: &[&[f64]]) -> Result<KruskalResult> {
    let groups: Vec<&[f64]> = groups.iter().copied().filter(|g| !g.is_empty()).collect();
    if groups.len() < 2 {
        return Err(ReportError::InvalidParameter(
            "Kruskal-Wallis needs at least two non-empty groups".to_string(),
        ));
    }

    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    if pooled.iter().any(|v| v.is_nan()) {
        return Err(ReportError::Statistics(
            "Kruskal-Wallis input contains NaN".to_string(),
        ));
    }

    let n = pooled.len() as f64;
    let ties = tie_sizes(&pooled);
    let tie_sum: f64 = ties.iter().map(|&t| (t as f64).powi(3) - t as f64).sum();
    let correction = 1.0 - tie_sum / (n.powi(3) - n);
    if correction <= 0.0 {
        return Err(ReportError::Statistics(
            "All numbers are identical in Kruskal-Wallis".to_string(),
        ));
    }

    let ranks = rank_average(&pooled);
    let mut offset = 0;
    let mut sum_term = 0.0;
    for group in &groups {
        let r: f64 = ranks[offset..offset + group.len()].iter().sum();
        sum_term += r * r / group.len() as f64;
        offset += group.len();
    }

    let h = (12.0 / (n * (n + 1.0)) * sum_term - 3.0 * (n + 1.0)) / correction;
    let df = groups.len() - 1;
    let chi_sq =
        ChiSquared::new(df as f64).map_err(|e| ReportError::Statistics(e.to_string()))?;

    Ok(KruskalResult {
        statistic: h,
        p_value: chi_sq.sf(h).clamp(0.0, 1.0),
        df,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_three_groups() {
        let a = [2.9, 3.0, 2.5, 2.6, 3.2];
        let b = [3.8, 2.7, 4.0, 2.4];
        let c = [2.8, 3.4, 3.7, 2.2, 2.0];
        let result = kruskal(&[&a, &b, &c]).unwrap();
        assert_eq!(result.df, 2);
        assert_relative_eq!(result.statistic, 0.771428571428, epsilon = 1e-9);
        assert_relative_eq!(result.p_value, 0.679964773578, epsilon = 1e-6);
    }

    #[test]
    fn test_two_groups_separated() {
        let result = kruskal(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]).unwrap();
        assert_relative_eq!(result.statistic, 27.0 / 7.0, epsilon = 1e-9);
        assert_relative_eq!(result.p_value, 0.049534613435, epsilon = 1e-6);
    }

    #[test]
    fn test_tie_correction() {
        let result = kruskal(&[&[1.0, 1.0, 2.0], &[2.0, 3.0, 3.0]]).unwrap();
        assert_relative_eq!(result.statistic, 10.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(result.p_value, 0.067889154861, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_groups_ignored() {
        let with_empty = kruskal(&[&[1.0, 2.0, 3.0], &[], &[4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(with_empty.df, 1);
        assert!(matches!(
            kruskal(&[&[1.0, 2.0], &[]]),
            Err(ReportError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_identical_values() {
        assert!(matches!(
            kruskal(&[&[2.0, 2.0], &[2.0, 2.0]]),
            Err(ReportError::Statistics(_))
        ));
    }
}
