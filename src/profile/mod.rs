//! Feature-table inspection: sparsity, sequencing depth and an overall summary.

mod library_size;
mod sparsity;
mod summary;

pub use library_size::{profile_library_size, LibrarySizeProfile};
pub use sparsity::{profile_sparsity, SparsityProfile};
pub use summary::{profile_table, TableProfile};

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}
