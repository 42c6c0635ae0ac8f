//! A labelled table of text and numeric cells.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write;

/// One table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Text(String),
    /// Value and the number of decimals it is rounded to.
    Number(f64, usize),
    Missing,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn number(value: f64, precision: usize) -> Self {
        Cell::Number(value, precision)
    }

    /// `Number` for `Some`, `Missing` for `None`.
    pub fn optional(value: Option<f64>, precision: usize) -> Self {
        value.map_or(Cell::Missing, |v| Cell::Number(v, precision))
    }

    /// `Text` for `Some`, `Missing` for `None`.
    pub fn optional_text(value: Option<&str>) -> Self {
        value.map_or(Cell::Missing, |s| Cell::Text(s.to_string()))
    }

    /// Text shown in every output format.
    ///
    /// Numbers are rounded and printed without trailing zeros. NaN prints as
    /// `nan`.
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v, precision) => format_number(*v, *precision),
            Cell::Missing => String::new(),
        }
    }
}

/// Round half away from zero to `digits` decimals.
pub fn round_to(value: f64, digits: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits as i32);
    let rounded = (value * factor).round() / factor;
    // -0.0 prints as "-0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn format_number(value: f64, precision: usize) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        round_to(value, precision).to_string()
    }
}

/// Escape text for inclusion in HTML.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn markdown_escape(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// A table with a row label column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTable {
    pub title: String,
    /// Header of the row label column.
    pub index_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Cell>)>,
}

impl ReportTable {
    pub fn new(title: impl Into<String>, index_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            title: title.into(),
            index_name: index_name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding short rows with `Missing`.
    pub fn push_row(&mut self, label: impl Into<String>, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Missing);
        self.rows.push((label.into(), cells));
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write as CSV with a header row.
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        let mut header = vec![self.index_name.clone()];
        header.extend(self.columns.iter().cloned());
        out.write_record(&header)?;
        for (label, cells) in &self.rows {
            let mut record = vec![label.clone()];
            record.extend(cells.iter().map(Cell::display));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }

    /// GitHub-flavoured pipe table.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "| {} |", markdown_escape(&self.index_name));
        for col in &self.columns {
            let _ = write!(out, " {} |", markdown_escape(col));
        }
        out.push('\n');
        out.push_str("|:---|");
        for _ in &self.columns {
            out.push_str("---:|");
        }
        out.push('\n');
        for (label, cells) in &self.rows {
            let _ = write!(out, "| {} |", markdown_escape(label));
            for cell in cells {
                let _ = write!(out, " {} |", markdown_escape(&cell.display()));
            }
            out.push('\n');
        }
        out
    }

    /// Bootstrap-styled HTML table.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<table class=\"table table-striped\">\n  <thead>\n    <tr>");
        let _ = write!(out, "<th>{}</th>", html_escape(&self.index_name));
        for col in &self.columns {
            let _ = write!(out, "<th>{}</th>", html_escape(col));
        }
        out.push_str("</tr>\n  </thead>\n  <tbody>\n");
        for (label, cells) in &self.rows {
            let _ = write!(out, "    <tr><th>{}</th>", html_escape(label));
            for cell in cells {
                let _ = write!(out, "<td>{}</td>", html_escape(&cell.display()));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("  </tbody>\n</table>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReportTable {
        let mut table = ReportTable::new("Scores", "Treatment", vec!["H".into(), "p".into()]);
        table.push_row("a vs b", vec![Cell::number(3.857142857, 4), Cell::number(0.0495346, 3)]);
        table.push_row("a | c", vec![Cell::Missing, Cell::text("<n/a>")]);
        table.push_row("short", vec![Cell::number(f64::NAN, 3)]);
        table
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::number(0.820782681668, 6).display(), "0.820783");
        assert_eq!(Cell::number(2.0, 3).display(), "2");
        assert_eq!(Cell::number(-0.0001, 3).display(), "0");
        assert_eq!(Cell::number(f64::NAN, 3).display(), "nan");
        assert_eq!(Cell::optional(None, 2).display(), "");
    }

    #[test]
    fn test_csv() {
        let mut buf = Vec::new();
        sample().to_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Treatment,H,p");
        assert_eq!(lines[1], "a vs b,3.8571,0.05");
        assert_eq!(lines[3], "short,nan,");
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let md = sample().to_markdown();
        assert!(md.starts_with("| Treatment | H | p |\n|:---|---:|---:|\n"));
        assert!(md.contains("| a \\| c |"));
    }

    #[test]
    fn test_html_escapes_text() {
        let html = sample().to_html();
        assert!(html.starts_with("<table class=\"table table-striped\">"));
        assert!(html.contains("<td>&lt;n/a&gt;</td>"));
        assert_eq!(html.matches("<tr>").count(), 4);
    }
}
