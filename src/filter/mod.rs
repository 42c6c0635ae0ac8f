//! Sample- and feature-level filters applied before analyses.

mod library_size;
mod prevalence;
mod samples;

pub use library_size::{filter_library_size, filter_library_size_with_stats, LibrarySizeFilterResult};
pub use prevalence::filter_prevalence;
pub use samples::{drop_empty_samples, filter_samples_non_missing};
