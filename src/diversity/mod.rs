//! Alpha diversity, beta diversity and principal coordinates analysis.

pub mod alpha;
pub mod beta;
pub mod pcoa;

pub use alpha::{
    alpha_diversity, alpha_significance, AlphaDiversity, AlphaGroup, AlphaGroups, AlphaMetric,
    AlphaSignificance, PairwiseKruskal,
};
pub use beta::{beta_diversity, BetaMetric, DistanceMatrix};
pub use pcoa::{pcoa, Ordination};
