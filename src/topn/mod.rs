//! Top-N taxon selection across treatments.

mod selection;
mod taxa_list;

pub use selection::{select_top_n, TopTaxa, TopTaxaOptions, OTHER_LABEL};
pub use taxa_list::read_taxa_list;
