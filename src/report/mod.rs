//! Rendering of result tables to CSV, Markdown and HTML reports.

mod document;
mod table;

pub use document::{output_dir, Report, TIMESTAMP_FORMAT};
pub use table::{html_escape, round_to, Cell, ReportTable};
