//! Amplicon Feature-Table Reports
//!
//! This library turns an ASV/OTU feature table and its sample metadata into
//! diversity, composition and correlation reports.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (FeatureTable, Metadata, taxonomy lineages)
//! - **group**: Treatment resolution and per-treatment aggregation
//! - **filter**: Sample and feature filters
//! - **profile**: Table profiling (sparsity, library size)
//! - **diversity**: Alpha metrics, beta distances and PCoA
//! - **stats**: Kruskal-Wallis, Spearman and PERMANOVA
//! - **correct**: Multiple testing correction (Benjamini-Hochberg)
//! - **topn**: Round-robin top-N taxon selection
//! - **unknown**: Abundant features without a name at a given rank
//! - **correlation**: Taxon/metadata correlation across treatments
//! - **report**: CSV, Markdown and HTML report tables
//! - **plot**: SVG charts
//! - **pipeline**: End-to-end analyses and YAML batch runs
//!
//! # Example
//!
//! ```no_run
//! use amplicon_report::prelude::*;
//! use std::path::Path;
//!
//! let table = FeatureTable::from_tsv("feature-table.tsv").unwrap();
//! let metadata = Metadata::from_tsv("sample-metadata.tsv").unwrap();
//!
//! let summary = AlphaAnalysis {
//!     column: "soil".to_string(),
//!     treatments: vec![],
//!     metric: AlphaMetric::Shannon,
//!     title: None,
//! }
//! .run(&table, &metadata, Path::new("results/alpha-output"))
//! .unwrap();
//! println!("{} samples scored", summary.n_samples);
//! ```

pub mod correct;
pub mod correlation;
pub mod data;
pub mod diversity;
pub mod error;
pub mod filter;
pub mod group;
pub mod pipeline;
pub mod plot;
pub mod profile;
pub mod report;
pub mod stats;
pub mod topn;
pub mod unknown;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::correct::correct_bh;
    pub use crate::correlation::{
        correlate, CorrelationConfig, CorrelationMode, CorrelationResult, TaxaSelection,
    };
    pub use crate::data::{
        format_label, FeatureTable, Lineage, Metadata, Rank, SequenceKind, Variable,
        VariableType,
    };
    pub use crate::diversity::{
        alpha_diversity, alpha_significance, beta_diversity, pcoa, AlphaDiversity, AlphaGroups,
        AlphaMetric, AlphaSignificance, BetaMetric, DistanceMatrix, Ordination,
    };
    pub use crate::error::{ReportError, Result};
    pub use crate::filter::{
        drop_empty_samples, filter_library_size, filter_library_size_with_stats,
        filter_prevalence, filter_samples_non_missing, LibrarySizeFilterResult,
    };
    pub use crate::group::{aggregate, Aggregation, GroupedTable, Treatment, TreatmentGroups};
    pub use crate::pipeline::{
        example_config, run_config, AlphaAnalysis, AnalysisConfig, AnalysisStep, BetaAnalysis,
        CorrelationAnalysis, TableFilters, TaxaBarAnalysis, UnknownAnalysis,
    };
    pub use crate::profile::{
        profile_library_size, profile_sparsity, profile_table, LibrarySizeProfile,
        SparsityProfile, TableProfile,
    };
    pub use crate::report::{Cell, Report, ReportTable};
    pub use crate::stats::{
        kruskal, pairwise_permanova, permanova, spearman, KruskalResult, PermanovaConfig,
        PermanovaResult, SpearmanResult,
    };
    pub use crate::topn::{read_taxa_list, select_top_n, TopTaxa, TopTaxaOptions};
    pub use crate::unknown::{top_unknown, UnknownFeature};
}
