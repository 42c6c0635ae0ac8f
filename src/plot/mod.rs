//! SVG charts for the analysis reports.

mod bar;
mod boxplot;
mod bubble;
mod scatter;
mod svg;

pub use bar::stacked_bar;
pub use boxplot::{boxplot, BoxStats};
pub use bubble::bubble_grid;
pub use scatter::scatter;
pub use svg::{diverging_color, palette_color, write_svg, PALETTE};
