//! Spearman rank correlation.

use super::rank::rank_average;
use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Spearman correlation with a two-sided p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpearmanResult {
    pub rho: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Spearman's ρ: Pearson correlation of average ranks.
///
/// The p-value uses Student's t with n - 2 degrees of freedom. With two
/// observations ρ is ±1 and p is NaN. A constant input gives NaN for both.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<SpearmanResult> {
    if x.len() != y.len() {
        return Err(ReportError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    let n = x.len();
    if n < 2 {
        return Err(ReportError::InvalidParameter(
            "Spearman correlation needs at least two observations".to_string(),
        ));
    }

    let rho = pearson(&rank_average(x), &rank_average(y));
    if rho.is_nan() {
        return Ok(SpearmanResult {
            rho,
            p_value: f64::NAN,
            n,
        });
    }

    let df = (n - 2) as f64;
    let p_value = if n == 2 {
        f64::NAN
    } else if rho.abs() >= 1.0 {
        0.0
    } else {
        let t = rho * (df / (1.0 - rho * rho)).sqrt();
        let dist =
            StudentsT::new(0.0, 1.0, df).map_err(|e| ReportError::Statistics(e.to_string()))?;
        (2.0 * dist.sf(t.abs())).min(1.0)
    };

    Ok(SpearmanResult {
        rho: rho.clamp(-1.0, 1.0),
        p_value,
        n,
    })
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}
