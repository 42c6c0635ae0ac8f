//! Within-sample diversity and its comparison across treatments.

use crate::correct::correct_bh;
use crate::data::FeatureTable;
use crate::error::{ReportError, Result};
use crate::group::TreatmentGroups;
use crate::stats::{kruskal, KruskalResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Alpha diversity metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaMetric {
    /// Shannon entropy, base 2.
    #[default]
    Shannon,
    /// Gini-Simpson index, 1 - Σp².
    Simpson,
    ObservedFeatures,
    /// Shannon divided by log2 of observed features.
    PielouEvenness,
    /// Bias-corrected Chao1 richness estimate.
    Chao1,
}

impl AlphaMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "shannon" | "shannon_entropy" => Some(Self::Shannon),
            "simpson" => Some(Self::Simpson),
            "observed_features" | "observed_otus" | "observed" => Some(Self::ObservedFeatures),
            "pielou_e" | "pielou" | "pielou_evenness" => Some(Self::PielouEvenness),
            "chao1" => Some(Self::Chao1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Shannon => "shannon",
            Self::Simpson => "simpson",
            Self::ObservedFeatures => "observed_features",
            Self::PielouEvenness => "pielou_e",
            Self::Chao1 => "chao1",
        }
    }

    /// Compute the metric for one sample's abundance vector.
    pub fn compute(&self, abundances: &[f64]) -> f64 {
        let total: f64 = abundances.iter().sum();
        let observed = abundances.iter().filter(|&&v| v > 0.0).count();
        let shannon = || {
            -abundances
                .iter()
                .filter(|&&v| v > 0.0)
                .map(|&v| {
                    let p = v / total;
                    p * p.log2()
                })
                .sum::<f64>()
        };

        match self {
            Self::Shannon => shannon(),
            Self::Simpson => {
                1.0 - abundances
                    .iter()
                    .map(|&v| (v / total).powi(2))
                    .sum::<f64>()
            }
            Self::ObservedFeatures => observed as f64,
            Self::PielouEvenness => {
                if observed <= 1 {
                    0.0
                } else {
                    shannon() / (observed as f64).log2()
                }
            }
            Self::Chao1 => {
                let f1 = abundances.iter().filter(|&&v| v == 1.0).count() as f64;
                let f2 = abundances.iter().filter(|&&v| v == 2.0).count() as f64;
                observed as f64 + f1 * (f1 - 1.0) / (2.0 * (f2 + 1.0))
            }
        }
    }
}

impl std::fmt::Display for AlphaMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One metric value per sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaDiversity {
    pub metric: AlphaMetric,
    pub sample_ids: Vec<String>,
    pub values: Vec<f64>,
}

impl AlphaDiversity {
    pub fn get(&self, sample_id: &str) -> Option<f64> {
        self.sample_ids
            .iter()
            .position(|s| s == sample_id)
            .map(|i| self.values[i])
    }
}

/// Compute an alpha metric for every sample.
///
/// Samples with no observations are rejected; drop them first with
/// [`crate::filter::drop_empty_samples`].
pub fn alpha_diversity(table: &FeatureTable, metric: AlphaMetric) -> Result<AlphaDiversity> {
    let totals = table.col_sums();
    if let Some(col) = totals.iter().position(|&t| t <= 0.0) {
        return Err(ReportError::EmptyData(format!(
            "Sample '{}' has no observations",
            table.sample_ids()[col]
        )));
    }

    let values: Vec<f64> = (0..table.n_samples())
        .into_par_iter()
        .map(|col| metric.compute(&table.col_dense(col)))
        .collect();

    Ok(AlphaDiversity {
        metric,
        sample_ids: table.sample_ids().to_vec(),
        values,
    })
}

/// Scores of one treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaGroup {
    pub name: String,
    /// `(sample, score)` sorted ascending by score.
    pub labeled_scores: Vec<(String, f64)>,
    /// Scores in treatment sample order.
    pub raw_scores: Vec<f64>,
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl AlphaGroup {
    fn new(name: String, samples: Vec<(String, f64)>) -> Self {
        let raw_scores: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
        let mut labeled_scores = samples;
        labeled_scores.sort_by(|a, b| a.1.total_cmp(&b.1));

        let n = raw_scores.len();
        let sorted: Vec<f64> = labeled_scores.iter().map(|(_, v)| *v).collect();
        let (mean, median, min, max) = if n == 0 {
            (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
        } else {
            let median = if n % 2 == 0 {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            } else {
                sorted[n / 2]
            };
            (
                sorted.iter().sum::<f64>() / n as f64,
                median,
                sorted[0],
                sorted[n - 1],
            )
        };

        Self {
            name,
            labeled_scores,
            raw_scores,
            n,
            mean,
            median,
            min,
            max,
        }
    }
}

/// Alpha scores split by treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaGroups {
    pub metric: AlphaMetric,
    pub groups: Vec<AlphaGroup>,
}

impl AlphaGroups {
    /// Split scores by treatment. Samples without a score are skipped.
    pub fn build(alpha: &AlphaDiversity, groups: &TreatmentGroups) -> Self {
        let groups = groups
            .iter()
            .map(|t| {
                let samples = t
                    .sample_ids
                    .iter()
                    .filter_map(|sid| alpha.get(sid).map(|v| (sid.clone(), v)))
                    .collect();
                AlphaGroup::new(t.name.clone(), samples)
            })
            .collect();
        Self {
            metric: alpha.metric,
            groups,
        }
    }
}

/// Kruskal-Wallis between one pair of treatments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseKruskal {
    pub group1: String,
    pub group2: String,
    pub n1: usize,
    pub n2: usize,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub q_value: Option<f64>,
    /// Why the pair could not be tested.
    pub note: Option<String>,
}

impl PairwiseKruskal {
    /// Comparison label, e.g. `clay vs sand`.
    pub fn label(&self) -> String {
        format!("{} vs {}", self.group1, self.group2)
    }
}

/// Overall and pairwise group significance of alpha scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaSignificance {
    pub overall: Option<KruskalResult>,
    pub overall_note: Option<String>,
    pub pairwise: Vec<PairwiseKruskal>,
}

/// Kruskal-Wallis across all treatments and between every pair.
///
/// A comparison that cannot be tested is reported with a note instead of
/// aborting the whole analysis.
pub fn alpha_significance(groups: &AlphaGroups) -> AlphaSignificance {
    let all: Vec<&[f64]> = groups.groups.iter().map(|g| g.raw_scores.as_slice()).collect();
    let (overall, overall_note) = match kruskal(&all) {
        Ok(r) => (Some(r), None),
        Err(e) => {
            warn!("Overall Kruskal-Wallis not computed: {}", e);
            (None, Some(e.to_string()))
        }
    };

    let mut pairwise = Vec::new();
    for (i, a) in groups.groups.iter().enumerate() {
        for b in &groups.groups[i + 1..] {
            let mut entry = PairwiseKruskal {
                group1: a.name.clone(),
                group2: b.name.clone(),
                n1: a.n,
                n2: b.n,
                statistic: None,
                p_value: None,
                q_value: None,
                note: None,
            };
            if a.n == 0 || b.n == 0 {
                entry.note = Some("treatment has no samples".to_string());
            } else {
                match kruskal(&[&a.raw_scores, &b.raw_scores]) {
                    Ok(r) => {
                        entry.statistic = Some(r.statistic);
                        entry.p_value = Some(r.p_value);
                    }
                    Err(e) => entry.note = Some(e.to_string()),
                }
            }
            if let Some(note) = &entry.note {
                warn!("{} not tested: {}", entry.label(), note);
            }
            pairwise.push(entry);
        }
    }

    let p_values: Vec<f64> = pairwise
        .iter()
        .map(|p| p.p_value.unwrap_or(f64::NAN))
        .collect();
    for (entry, q) in pairwise.iter_mut().zip(correct_bh(&p_values)) {
        if !q.is_nan() {
            entry.q_value = Some(q);
        }
    }

    AlphaSignificance {
        overall,
        overall_note,
        pairwise,
    }
}
