//! Whole-table summary printed by the `profile` command.

use super::{profile_library_size, profile_sparsity, LibrarySizeProfile, SparsityProfile};
use crate::data::FeatureTable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProfile {
    pub n_features: usize,
    pub n_samples: usize,
    pub has_taxonomy: bool,
    pub total_abundance: f64,
    pub sparsity: SparsityProfile,
    pub library_size: LibrarySizeProfile,
}

impl std::fmt::Display for TableProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Feature Table")?;
        writeln!(f, "  Features:  {}", self.n_features)?;
        writeln!(f, "  Samples:   {}", self.n_samples)?;
        writeln!(f, "  Taxonomy:  {}", if self.has_taxonomy { "yes" } else { "no" })?;
        writeln!(f, "  Total:     {}", self.total_abundance)?;
        writeln!(f)?;
        write!(f, "{}", self.sparsity)?;
        writeln!(f)?;
        write!(f, "{}", self.library_size)
    }
}

pub fn profile_table(table: &FeatureTable) -> TableProfile {
    let library_size = profile_library_size(table);
    TableProfile {
        n_features: table.n_features(),
        n_samples: table.n_samples(),
        has_taxonomy: table.has_taxonomy(),
        total_abundance: library_size.depths.iter().sum(),
        sparsity: profile_sparsity(table),
        library_size,
    }
}
