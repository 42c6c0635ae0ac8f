//! Statistical tests used by the diversity and correlation reports.

pub mod kruskal;
pub mod permanova;
pub mod rank;
pub mod spearman;

pub use kruskal::{kruskal, KruskalResult};
pub use permanova::{
    pairwise_permanova, permanova, PairwisePermanova, PermanovaConfig, PermanovaResult,
};
pub use rank::rank_average;
pub use spearman::{spearman, SpearmanResult};
