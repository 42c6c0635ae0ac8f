//! Analysis runners and batch configuration.

mod analyses;
mod runner;

pub use analyses::{
    AlphaAnalysis, AlphaSummary, BetaAnalysis, BetaSummary, CorrelationAnalysis,
    CorrelationSummary, TaxaBarAnalysis, TaxaBarSummary, UnknownAnalysis, UnknownSummary,
};
pub use runner::{
    example_config, load_table, run_config, AnalysisConfig, AnalysisOutcome, AnalysisStep,
    RunSummary, TableFilters,
};
