//! PERMANOVA: permutational multivariate analysis of variance on a
//! distance matrix.
//!
//! The pseudo-F statistic compares within-group and between-group sums of
//! squared distances. Its significance is the proportion of label
//! permutations that give a pseudo-F at least as large as the observed one:
//!
//! ```text
//! p = (#{F_perm >= F_obs} + 1) / (permutations + 1)
//! ```

use crate::correct::correct_bh;
use crate::diversity::DistanceMatrix;
use crate::error::{ReportError, Result};
use crate::group::TreatmentGroups;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Configuration for permutation testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanovaConfig {
    pub permutations: usize,
    /// Base seed. Permutation `i` is seeded with `seed + i`.
    pub seed: u64,
    pub parallel: bool,
}

impl Default for PermanovaConfig {
    fn default() -> Self {
        Self {
            permutations: 999,
            seed: 42,
            parallel: true,
        }
    }
}

/// Outcome of one PERMANOVA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanovaResult {
    pub sample_size: usize,
    pub n_groups: usize,
    /// Pseudo-F.
    pub statistic: f64,
    /// NaN when no permutations were run.
    pub p_value: f64,
    pub permutations: usize,
}

/// PERMANOVA between one pair of treatments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwisePermanova {
    pub group1: String,
    pub group2: String,
    pub sample_size: usize,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub q_value: Option<f64>,
    /// Why the pair could not be tested.
    pub note: Option<String>,
}

/// Deterministic xorshift64 generator for label shuffles.
struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        // xorshift is stuck at zero
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Fisher-Yates shuffle
    fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            slice.swap(i, j);
        }
    }
}

/// Squared distances of the upper triangle, with the total sum.
struct SquaredDistances {
    n: usize,
    d2: Vec<f64>,
    total: f64,
}

impl SquaredDistances {
    fn new(dm: &DistanceMatrix) -> Self {
        let n = dm.len();
        let mut d2 = vec![0.0; n * n];
        let mut total = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let v = dm.get(i, j).powi(2);
                d2[i * n + j] = v;
                total += v;
            }
        }
        Self { n, d2, total }
    }

    fn pseudo_f(&self, codes: &[usize], group_sizes: &[usize]) -> f64 {
        let n = self.n;
        let a = group_sizes.len() as f64;
        let mut within = vec![0.0; group_sizes.len()];
        for i in 0..n {
            for j in (i + 1)..n {
                if codes[i] == codes[j] {
                    within[codes[i]] += self.d2[i * n + j];
                }
            }
        }
        let s_w: f64 = within
            .iter()
            .zip(group_sizes)
            .map(|(w, &size)| w / size as f64)
            .sum();
        let s_t = self.total / n as f64;
        let s_a = s_t - s_w;
        (s_a / (a - 1.0)) / (s_w / (n as f64 - a))
    }
}

/// Run PERMANOVA with one group label per distance-matrix sample.
pub fn permanova(
    dm: &DistanceMatrix,
    grouping: &[String],
    config: &PermanovaConfig,
) -> Result<PermanovaResult> {
    if grouping.len() != dm.len() {
        return Err(ReportError::DimensionMismatch {
            expected: dm.len(),
            actual: grouping.len(),
        });
    }

    let mut code_of: HashMap<&str, usize> = HashMap::new();
    let mut group_sizes: Vec<usize> = Vec::new();
    let codes: Vec<usize> = grouping
        .iter()
        .map(|g| {
            let next = code_of.len();
            let code = *code_of.entry(g.as_str()).or_insert(next);
            if code == group_sizes.len() {
                group_sizes.push(0);
            }
            group_sizes[code] += 1;
            code
        })
        .collect();

    let n = dm.len();
    let n_groups = group_sizes.len();
    if n_groups < 2 {
        return Err(ReportError::InvalidParameter(
            "PERMANOVA needs at least two groups".to_string(),
        ));
    }
    if n <= n_groups {
        return Err(ReportError::InvalidParameter(format!(
            "PERMANOVA needs more samples ({}) than groups ({})",
            n, n_groups
        )));
    }

    let sq = SquaredDistances::new(dm);
    let observed = sq.pseudo_f(&codes, &group_sizes);
    // all distances zero: no spread to partition
    if observed.is_nan() {
        return Err(ReportError::Statistics(
            "PERMANOVA pseudo-F is undefined because every distance is zero".to_string(),
        ));
    }

    let permuted_stat = |perm_idx: usize| {
        let mut rng = SimpleRng::new(config.seed.wrapping_add(perm_idx as u64));
        let mut shuffled = codes.clone();
        rng.shuffle(&mut shuffled);
        sq.pseudo_f(&shuffled, &group_sizes)
    };

    let n_extreme = if config.parallel {
        (0..config.permutations)
            .into_par_iter()
            .map(permuted_stat)
            .filter(|&f| !f.is_nan() && f >= observed)
            .count()
    } else {
        (0..config.permutations)
            .map(permuted_stat)
            .filter(|&f| !f.is_nan() && f >= observed)
            .count()
    };

    let p_value = if config.permutations == 0 {
        f64::NAN
    } else {
        (n_extreme as f64 + 1.0) / (config.permutations as f64 + 1.0)
    };

    debug!(
        "PERMANOVA: N={} groups={} F={:.4} p={:.4}",
        n, n_groups, observed, p_value
    );

    Ok(PermanovaResult {
        sample_size: n,
        n_groups,
        statistic: observed,
        p_value,
        permutations: config.permutations,
    })
}

/// PERMANOVA for every pair of treatments, with BH q-values over the pairs
/// that could be tested.
pub fn pairwise_permanova(
    dm: &DistanceMatrix,
    groups: &TreatmentGroups,
    config: &PermanovaConfig,
) -> Result<Vec<PairwisePermanova>> {
    let members: Vec<(&str, Vec<String>)> = groups
        .iter()
        .map(|t| {
            let ids = t
                .sample_ids
                .iter()
                .filter(|id| dm.index_of(id).is_some())
                .cloned()
                .collect();
            (t.name.as_str(), ids)
        })
        .collect();

    let mut results = Vec::new();
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            let (name1, ids1) = &members[i];
            let (name2, ids2) = &members[j];
            let mut ids = ids1.clone();
            ids.extend(ids2.iter().cloned());
            let labels: Vec<String> = std::iter::repeat(name1.to_string())
                .take(ids1.len())
                .chain(std::iter::repeat(name2.to_string()).take(ids2.len()))
                .collect();

            let outcome = if ids1.is_empty() || ids2.is_empty() {
                Err(ReportError::InvalidParameter(
                    "one of the treatments has no samples".to_string(),
                ))
            } else {
                dm.subset(&ids).and_then(|sub| permanova(&sub, &labels, config))
            };

            let entry = match outcome {
                Ok(r) => PairwisePermanova {
                    group1: name1.to_string(),
                    group2: name2.to_string(),
                    sample_size: r.sample_size,
                    statistic: Some(r.statistic),
                    p_value: Some(r.p_value),
                    q_value: None,
                    note: None,
                },
                Err(e) => {
                    warn!("Skipping PERMANOVA {} vs {}: {}", name1, name2, e);
                    PairwisePermanova {
                        group1: name1.to_string(),
                        group2: name2.to_string(),
                        sample_size: ids.len(),
                        statistic: None,
                        p_value: None,
                        q_value: None,
                        note: Some(e.to_string()),
                    }
                }
            };
            results.push(entry);
        }
    }

    let p_values: Vec<f64> = results
        .iter()
        .map(|r| r.p_value.unwrap_or(f64::NAN))
        .collect();
    for (r, q) in results.iter_mut().zip(correct_bh(&p_values)) {
        if !q.is_nan() {
            r.q_value = Some(q);
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::n_tested;
    use crate::group::Treatment;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// Two tight clusters far apart.
    fn clustered() -> (DistanceMatrix, Vec<String>) {
        let pos: [f64; 6] = [0.0, 0.1, 0.2, 5.0, 5.1, 5.2];
        let n = pos.len();
        let data = DMatrix::from_fn(n, n, |i, j| (pos[i] - pos[j]).abs());
        let ids = (0..n).map(|i| format!("S{}", i)).collect();
        let labels = ["a", "a", "a", "b", "b", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        (DistanceMatrix::new(ids, data).unwrap(), labels)
    }

    #[test]
    fn test_pseudo_f_by_hand() {
        // d(0,1)=1, d(0,2)=2, d(1,2)=1 ; groups {0,1} vs {2}
        let data = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0]);
        let dm = DistanceMatrix::new(vec!["x".into(), "y".into(), "z".into()], data).unwrap();
        let labels = vec!["g".to_string(), "g".to_string(), "h".to_string()];
        let config = PermanovaConfig {
            permutations: 0,
            ..Default::default()
        };
        let result = permanova(&dm, &labels, &config).unwrap();
        // S_T = 6/3 = 2, S_W = 1/2 = 0.5, S_A = 1.5, F = 1.5 / (0.5 / 1) = 3
        assert_relative_eq!(result.statistic, 3.0, epsilon = 1e-12);
        assert!(result.p_value.is_nan());
    }

    #[test]
    fn test_separated_clusters_are_significant() {
        let (dm, labels) = clustered();
        let result = permanova(&dm, &labels, &PermanovaConfig::default()).unwrap();
        assert!(result.statistic > 100.0);
        // only relabellings that reproduce the split reach the observed F
        assert!(result.p_value < 0.2);
        assert_eq!(result.permutations, 999);
    }

    #[test]
    fn test_deterministic_across_modes() {
        let (dm, labels) = clustered();
        let parallel = PermanovaConfig {
            permutations: 199,
            seed: 7,
            parallel: true,
        };
        let sequential = PermanovaConfig {
            parallel: false,
            ..parallel.clone()
        };
        let a = permanova(&dm, &labels, &parallel).unwrap();
        let b = permanova(&dm, &labels, &sequential).unwrap();
        assert_eq!(a.p_value, b.p_value);
    }

    #[test]
    fn test_invalid_grouping() {
        let (dm, _) = clustered();
        let one_group = vec!["a".to_string(); 6];
        assert!(permanova(&dm, &one_group, &PermanovaConfig::default()).is_err());
        assert!(permanova(&dm, &one_group[..3], &PermanovaConfig::default()).is_err());
    }

    fn line_distances(pos: &[f64]) -> DistanceMatrix {
        let n = pos.len();
        let data = DMatrix::from_fn(n, n, |i, j| (pos[i] - pos[j]).abs());
        DistanceMatrix::new((0..n).map(|i| format!("S{}", i)).collect(), data).unwrap()
    }

    fn treatment(name: &str, ids: std::ops::Range<usize>) -> Treatment {
        Treatment {
            name: name.to_string(),
            sample_indices: ids.clone().collect(),
            sample_ids: ids.map(|i| format!("S{}", i)).collect(),
        }
    }

    #[test]
    fn test_identical_samples_are_not_significant() {
        let dm = line_distances(&[0.0; 6]);
        let labels: Vec<String> = ["a", "a", "a", "b", "b", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = permanova(&dm, &labels, &PermanovaConfig::default());
        assert!(matches!(result, Err(ReportError::Statistics(_))));
    }

    #[test]
    fn test_pairwise_notes_identical_pair() {
        // soil a and b are indistinguishable, c sits apart
        let dm = line_distances(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 5.1, 5.2]);
        let groups = TreatmentGroups {
            column: "soil".to_string(),
            treatments: vec![treatment("a", 0..3), treatment("b", 3..6), treatment("c", 6..9)],
        };
        let config = PermanovaConfig {
            permutations: 99,
            ..Default::default()
        };
        let pairs = pairwise_permanova(&dm, &groups, &config).unwrap();
        assert_eq!(pairs.len(), 3);

        let ab = &pairs[0];
        assert_eq!((ab.group1.as_str(), ab.group2.as_str()), ("a", "b"));
        assert!(ab.p_value.is_none() && ab.q_value.is_none() && ab.statistic.is_none());
        assert!(ab.note.as_deref().unwrap().contains("every distance is zero"));

        let p_values: Vec<f64> = pairs.iter().map(|r| r.p_value.unwrap_or(f64::NAN)).collect();
        assert_eq!(n_tested(&p_values), 2);
        // a-c and b-c share one layout and one seed, so BH over two leaves q = p
        for pair in &pairs[1..] {
            assert_eq!(pair.q_value, pair.p_value);
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = SimpleRng::new(0);
        let mut values: Vec<usize> = (0..10).collect();
        rng.shuffle(&mut values);
        let mut sorted = values.clone();
        sorted.sort();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }
}
