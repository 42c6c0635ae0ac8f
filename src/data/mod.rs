//! Core data structures: feature tables, sample metadata and taxonomy.

mod feature_table;
mod metadata;
pub mod taxonomy;

pub use feature_table::FeatureTable;
pub use metadata::{Metadata, Variable, VariableType};
pub use taxonomy::{format_label, Lineage, Rank, SequenceKind};
