//! Multi-section stats reports written as CSV, Markdown and HTML.

use super::table::{html_escape, ReportTable};
use crate::error::Result;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Timestamp layout of the "Date file was generated" line.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S";

const BOOTSTRAP_CSS: &str =
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css";

/// A titled report made of table sections.
#[derive(Debug, Clone)]
pub struct Report {
    pub title: String,
    /// Free-text lines shown under the title.
    pub notes: Vec<String>,
    pub generated_at: DateTime<Local>,
    pub sections: Vec<ReportTable>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: Vec::new(),
            generated_at: Local::now(),
            sections: Vec::new(),
        }
    }

    pub fn note(mut self, line: impl Into<String>) -> Self {
        self.notes.push(line.into());
        self
    }

    /// Add a table. Its title becomes the section heading.
    pub fn section(mut self, table: ReportTable) -> Self {
        self.sections.push(table);
        self
    }

    pub fn timestamp(&self) -> String {
        self.generated_at.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        for line in &self.notes {
            out.push_str(line);
            out.push_str("\n\n");
        }
        out.push_str(&format!("Date file was generated: {}\n", self.timestamp()));
        for table in &self.sections {
            out.push_str(&format!("\n## {}\n\n", table.title));
            out.push_str(&table.to_markdown());
        }
        out
    }

    pub fn to_html(&self) -> String {
        let title = html_escape(&self.title);
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        out.push_str("  <meta charset=\"utf-8\">\n");
        out.push_str(&format!("  <title>{}</title>\n", title));
        out.push_str(&format!("  <link rel=\"stylesheet\" href=\"{}\">\n", BOOTSTRAP_CSS));
        out.push_str("</head>\n<body>\n<div class=\"container\">\n");
        out.push_str(&format!("<h1>{}</h1>\n", title));
        for line in &self.notes {
            out.push_str(&format!("<p>{}</p>\n", html_escape(line)));
        }
        out.push_str(&format!("<p>Date file was generated: {}</p>\n", self.timestamp()));
        for table in &self.sections {
            out.push_str(&format!("<h2>{}</h2>\n", html_escape(&table.title)));
            out.push_str(&table.to_html());
        }
        out.push_str("</div>\n</body>\n</html>\n");
        out
    }

    /// Write `<stem>.csv`, `<stem>.md` and `<stem>.html` into `dir`.
    ///
    /// The first section goes to `<stem>.csv`; section `n` (1-based, n > 1)
    /// goes to `<stem>_<n>.csv`. Returns the paths written.
    pub fn write_all(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        for (i, table) in self.sections.iter().enumerate() {
            let name = if i == 0 {
                format!("{}.csv", stem)
            } else {
                format!("{}_{}.csv", stem, i + 1)
            };
            let path = dir.join(name);
            table.to_csv(BufWriter::new(File::create(&path)?))?;
            written.push(path);
        }

        let md = dir.join(format!("{}.md", stem));
        fs::write(&md, self.to_markdown())?;
        written.push(md);

        let html = dir.join(format!("{}.html", stem));
        fs::write(&html, self.to_html())?;
        written.push(html);

        for path in &written {
            debug!("Wrote {}", path.display());
        }
        info!("Report '{}' written to {}", self.title, dir.display());
        Ok(written)
    }
}

/// Create `<base>/<name>` if missing and return it.
pub fn output_dir(base: &Path, name: &str) -> Result<PathBuf> {
    let dir = base.join(name);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Cell;
    use tempfile::TempDir;

    fn report() -> Report {
        let mut first = ReportTable::new("Scores", "Sample", vec!["shannon".into()]);
        first.push_row("S1", vec![Cell::number(1.5, 3)]);
        let mut second = ReportTable::new("Kruskal-Wallis", "Test", vec!["H".into()]);
        second.push_row("all", vec![Cell::number(0.77, 3)]);
        Report::new("Alpha <diversity>")
            .note("Metric: shannon")
            .section(first)
            .section(second)
    }

    #[test]
    fn test_markdown_layout() {
        let md = report().to_markdown();
        assert!(md.starts_with("# Alpha <diversity>\n\nMetric: shannon\n\nDate file was generated: "));
        assert!(md.contains("\n## Scores\n\n| Sample | shannon |"));
        assert!(md.contains("## Kruskal-Wallis"));
    }

    #[test]
    fn test_html_document() {
        let html = report().to_html();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("bootstrap@5.3.3"));
        assert!(html.contains("<h1>Alpha &lt;diversity&gt;</h1>"));
        assert!(html.contains("<p>Date file was generated: "));
        assert_eq!(html.matches("<h2>").count(), 2);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = report().timestamp();
        // dd/mm/yy HH:MM:SS
        assert_eq!(ts.len(), 17);
        assert_eq!(&ts[2..3], "/");
        assert_eq!(&ts[8..9], " ");
    }

    #[test]
    fn test_write_all() {
        let tmp = TempDir::new().unwrap();
        let dir = output_dir(tmp.path(), "alpha-output").unwrap();
        let written = report().write_all(&dir, "alpha_diversity_stats").unwrap();

        assert_eq!(written.len(), 4);
        assert!(dir.join("alpha_diversity_stats.csv").exists());
        assert!(dir.join("alpha_diversity_stats_2.csv").exists());
        assert!(dir.join("alpha_diversity_stats.md").exists());
        assert!(dir.join("alpha_diversity_stats.html").exists());

        let csv = std::fs::read_to_string(dir.join("alpha_diversity_stats.csv")).unwrap();
        assert_eq!(csv, "Sample,shannon\nS1,1.5\n");
    }
}
