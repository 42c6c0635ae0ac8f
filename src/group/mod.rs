//! Grouping of samples into treatments and per-treatment aggregation.

mod aggregate;
mod treatments;

pub use aggregate::{aggregate, Aggregation, GroupedTable};
pub use treatments::{Treatment, TreatmentGroups};
