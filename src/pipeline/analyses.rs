//! End-to-end analyses: filter, compute, plot and report.

use crate::correlation::{correlate, CorrelationConfig, CorrelationResult};
use crate::data::taxonomy::Rank;
use crate::data::{FeatureTable, Metadata};
use crate::diversity::{
    alpha_diversity, alpha_significance, beta_diversity, pcoa, AlphaGroup, AlphaGroups,
    AlphaMetric, AlphaSignificance, BetaMetric,
};
use crate::error::Result;
use crate::filter::{drop_empty_samples, filter_samples_non_missing};
use crate::group::{Aggregation, TreatmentGroups};
use crate::plot::{boxplot, bubble_grid, scatter, stacked_bar, write_svg};
use crate::report::{round_to, Cell, Report, ReportTable};
use crate::stats::{
    pairwise_permanova, permanova, PairwisePermanova, PermanovaConfig, PermanovaResult,
};
use crate::topn::{TopTaxa, TopTaxaOptions};
use crate::unknown::{top_unknown, unknown_table, UnknownFeature};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub(crate) const TABLE_NOTE: &str =
    "To find further sequence specific information, refer to table 03 generated previously";
pub(crate) const FURTHER_NOTE: &str =
    "Please refer to the excel or csv file generated to perform further analysis.";

fn treatment_filter(list: &[String]) -> Option<&[String]> {
    (!list.is_empty()).then_some(list)
}

/// File stem safe for the output directory.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

fn default_permutations() -> usize {
    PermanovaConfig::default().permutations
}

fn default_seed() -> u64 {
    PermanovaConfig::default().seed
}

fn default_rank() -> Rank {
    Rank::Genus
}

// ---------------------------------------------------------------------------
// Alpha diversity
// ---------------------------------------------------------------------------

/// Alpha diversity per treatment with Kruskal-Wallis tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaAnalysis {
    /// Metadata column holding the treatments.
    pub column: String,
    /// Treatments to keep; empty means every level.
    #[serde(default)]
    pub treatments: Vec<String>,
    #[serde(default)]
    pub metric: AlphaMetric,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaSummary {
    pub metric: AlphaMetric,
    pub n_samples: usize,
    pub groups: Vec<AlphaGroup>,
    pub significance: AlphaSignificance,
    pub outputs: Vec<PathBuf>,
}

impl AlphaAnalysis {
    pub fn run(
        &self,
        table: &FeatureTable,
        metadata: &Metadata,
        out_dir: &Path,
    ) -> Result<AlphaSummary> {
        info!("Alpha diversity ({}) by '{}'", self.metric, self.column);
        fs::create_dir_all(out_dir)?;

        let filtered = filter_samples_non_missing(table, metadata, &self.column)?;
        let filtered = drop_empty_samples(&filtered)?;
        let groups = TreatmentGroups::resolve(
            &filtered,
            metadata,
            &self.column,
            treatment_filter(&self.treatments),
        )?;
        let alpha = alpha_diversity(&filtered, self.metric)?;
        let grouped = AlphaGroups::build(&alpha, &groups);
        let significance = alpha_significance(&grouped);

        let title = self
            .title
            .clone()
            .unwrap_or_else(|| format!("{} by {}", self.metric, self.column));
        let series: Vec<(String, Vec<f64>)> = grouped
            .groups
            .iter()
            .map(|g| (g.name.clone(), g.raw_scores.clone()))
            .collect();
        let plot_path = out_dir.join("alpha_plot.svg");
        write_svg(&plot_path, &boxplot(&title, self.metric.name(), &series))?;

        let report = Report::new("Alpha diversity stats")
            .note(TABLE_NOTE)
            .note(FURTHER_NOTE)
            .section(alpha_scores_table(&grouped))
            .section(kruskal_table(&significance))
            .section(pairwise_kruskal_table(&significance));
        let mut outputs = vec![plot_path];
        outputs.extend(report.write_all(out_dir, "alpha_diversity_stats")?);

        Ok(AlphaSummary {
            metric: self.metric,
            n_samples: grouped.groups.iter().map(|g| g.n).sum(),
            groups: grouped.groups,
            significance,
            outputs,
        })
    }
}

fn alpha_scores_table(grouped: &AlphaGroups) -> ReportTable {
    let columns = ["n", "mean", "median", "min", "max", "scores"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut table = ReportTable::new(
        format!("{} scores per treatment", grouped.metric),
        "Treatment",
        columns,
    );
    for g in &grouped.groups {
        let scores = g
            .labeled_scores
            .iter()
            .map(|(sid, v)| format!("{}: {}", sid, round_to(*v, 6)))
            .collect::<Vec<_>>()
            .join(", ");
        table.push_row(
            g.name.clone(),
            vec![
                Cell::number(g.n as f64, 0),
                Cell::number(g.mean, 6),
                Cell::number(g.median, 6),
                Cell::number(g.min, 6),
                Cell::number(g.max, 6),
                Cell::text(scores),
            ],
        );
    }
    table
}

fn kruskal_table(significance: &AlphaSignificance) -> ReportTable {
    let columns = ["H", "df", "p-value", "note"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut table = ReportTable::new("Kruskal-Wallis (all treatments)", "Test", columns);
    let note = Cell::optional_text(significance.overall_note.as_deref());
    let cells = match &significance.overall {
        Some(r) => vec![
            Cell::number(r.statistic, 6),
            Cell::number(r.df as f64, 0),
            Cell::number(r.p_value, 6),
            note,
        ],
        None => vec![Cell::Missing, Cell::Missing, Cell::Missing, note],
    };
    table.push_row("Kruskal-Wallis", cells);
    table
}

fn pairwise_kruskal_table(significance: &AlphaSignificance) -> ReportTable {
    let columns = ["n1", "n2", "H", "p-value", "q-value", "note"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut table = ReportTable::new("Pairwise Kruskal-Wallis", "Comparison", columns);
    for pair in &significance.pairwise {
        table.push_row(
            pair.label(),
            vec![
                Cell::number(pair.n1 as f64, 0),
                Cell::number(pair.n2 as f64, 0),
                Cell::optional(pair.statistic, 6),
                Cell::optional(pair.p_value, 6),
                Cell::optional(pair.q_value, 6),
                Cell::optional_text(pair.note.as_deref()),
            ],
        );
    }
    table
}

// ---------------------------------------------------------------------------
// Beta diversity
// ---------------------------------------------------------------------------

/// Distance matrix, PCoA and PERMANOVA over selected treatments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaAnalysis {
    pub column: String,
    #[serde(default)]
    pub treatments: Vec<String>,
    #[serde(default)]
    pub metric: BetaMetric,
    #[serde(default = "default_permutations")]
    pub permutations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaSummary {
    pub metric: BetaMetric,
    pub n_samples: usize,
    pub proportion_explained: Vec<f64>,
    pub permanova: Option<PermanovaResult>,
    pub permanova_note: Option<String>,
    pub pairwise: Vec<PairwisePermanova>,
    pub outputs: Vec<PathBuf>,
}

impl BetaAnalysis {
    pub fn run(
        &self,
        table: &FeatureTable,
        metadata: &Metadata,
        out_dir: &Path,
    ) -> Result<BetaSummary> {
        info!("Beta diversity ({}) by '{}'", self.metric, self.column);
        fs::create_dir_all(out_dir)?;

        let selected = TreatmentGroups::resolve(
            table,
            metadata,
            &self.column,
            treatment_filter(&self.treatments),
        )?;
        let names: Vec<String> = selected.names().into_iter().map(String::from).collect();
        let subset = drop_empty_samples(&table.select_samples(&selected.all_sample_ids())?)?;
        let groups = TreatmentGroups::resolve(&subset, metadata, &self.column, Some(names.as_slice()))?;

        let dm = beta_diversity(&subset, self.metric)?;
        let ordination = pcoa(&dm)?;
        let labels: Vec<String> = groups
            .labels_for(&dm.ids)
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();

        let config = PermanovaConfig {
            permutations: self.permutations,
            seed: self.seed,
            parallel: true,
        };
        let (overall, permanova_note) = match permanova(&dm, &labels, &config) {
            Ok(result) => (Some(result), None),
            Err(e) => {
                warn!("PERMANOVA not computed: {}", e);
                (None, Some(e.to_string()))
            }
        };
        let pairwise = pairwise_permanova(&dm, &groups, &config)?;

        let axis_label = |k: usize| match ordination.proportion_explained.get(k) {
            Some(p) => format!("PC{} ({}%)", k + 1, round_to(p * 100.0, 2)),
            None => format!("PC{}", k + 1),
        };
        let pc1 = ordination.axis(0).unwrap_or_default();
        let pc2 = ordination.axis(1).unwrap_or_else(|| vec![0.0; dm.len()]);
        let points: Vec<(String, f64, f64)> = labels
            .iter()
            .zip(pc1.iter().zip(&pc2))
            .map(|(label, (x, y))| (label.clone(), *x, *y))
            .collect();
        let title = self
            .title
            .clone()
            .unwrap_or_else(|| format!("{} PCoA by {}", self.metric, self.column));
        let plot_path = out_dir.join("beta_pcoa.svg");
        write_svg(&plot_path, &scatter(&title, &axis_label(0), &axis_label(1), &points))?;

        let dm_path = out_dir.join("distance_matrix.csv");
        dm.to_report_table(&format!("{} distance matrix", self.metric))
            .to_csv(BufWriter::new(File::create(&dm_path)?))?;

        let report = Report::new("Beta diversity stats")
            .note(format!("Metric: {}", self.metric))
            .note(FURTHER_NOTE)
            .section(coordinates_table(&ordination.sample_ids, &labels, &ordination.coordinates))
            .section(proportion_table(&ordination.eigenvalues, &ordination.proportion_explained))
            .section(permanova_table(overall.as_ref(), permanova_note.as_deref()))
            .section(pairwise_permanova_table(&pairwise));
        let mut outputs = vec![plot_path, dm_path];
        outputs.extend(report.write_all(out_dir, "beta_diversity_stats")?);

        Ok(BetaSummary {
            metric: self.metric,
            n_samples: dm.len(),
            proportion_explained: ordination.proportion_explained.clone(),
            permanova: overall,
            permanova_note,
            pairwise,
            outputs,
        })
    }
}

fn coordinates_table(
    sample_ids: &[String],
    labels: &[String],
    coordinates: &nalgebra::DMatrix<f64>,
) -> ReportTable {
    let mut columns = vec!["Treatment".to_string()];
    columns.extend((1..=coordinates.ncols()).map(|k| format!("PC{}", k)));
    let mut table = ReportTable::new("PCoA coordinates", "Sample", columns);
    for (i, sid) in sample_ids.iter().enumerate() {
        let mut cells = vec![Cell::text(labels.get(i).cloned().unwrap_or_default())];
        cells.extend(coordinates.row(i).iter().map(|v| Cell::number(*v, 6)));
        table.push_row(sid.clone(), cells);
    }
    table
}

fn proportion_table(eigenvalues: &[f64], proportions: &[f64]) -> ReportTable {
    let mut table = ReportTable::new(
        "Proportion explained",
        "Axis",
        vec!["Eigenvalue".to_string(), "Proportion explained".to_string()],
    );
    for (k, (eigen, prop)) in eigenvalues.iter().zip(proportions).enumerate() {
        table.push_row(
            format!("PC{}", k + 1),
            vec![Cell::number(*eigen, 6), Cell::number(*prop, 6)],
        );
    }
    table
}

fn permanova_table(result: Option<&PermanovaResult>, note: Option<&str>) -> ReportTable {
    let columns = [
        "sample size",
        "number of groups",
        "pseudo-F",
        "p-value",
        "number of permutations",
        "note",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let mut table = ReportTable::new("PERMANOVA", "Test", columns);
    let cells = match result {
        Some(r) => vec![
            Cell::number(r.sample_size as f64, 0),
            Cell::number(r.n_groups as f64, 0),
            Cell::number(r.statistic, 6),
            Cell::number(r.p_value, 6),
            Cell::number(r.permutations as f64, 0),
            Cell::optional_text(note),
        ],
        None => vec![
            Cell::Missing,
            Cell::Missing,
            Cell::Missing,
            Cell::Missing,
            Cell::Missing,
            Cell::optional_text(note),
        ],
    };
    table.push_row("PERMANOVA", cells);
    table
}

fn pairwise_permanova_table(pairs: &[PairwisePermanova]) -> ReportTable {
    let columns = ["sample size", "pseudo-F", "p-value", "q-value", "note"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut table = ReportTable::new("Pairwise PERMANOVA", "Comparison", columns);
    for pair in pairs {
        table.push_row(
            format!("{} vs {}", pair.group1, pair.group2),
            vec![
                Cell::number(pair.sample_size as f64, 0),
                Cell::optional(pair.statistic, 6),
                Cell::optional(pair.p_value, 6),
                Cell::optional(pair.q_value, 6),
                Cell::optional_text(pair.note.as_deref()),
            ],
        );
    }
    table
}

// ---------------------------------------------------------------------------
// Taxa bar
// ---------------------------------------------------------------------------

/// Top-N taxa per treatment as a stacked bar chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxaBarAnalysis {
    pub column: String,
    #[serde(default)]
    pub treatments: Vec<String>,
    pub n: usize,
    #[serde(default)]
    pub options: TopTaxaOptions,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxaBarSummary {
    pub treatments: Vec<String>,
    /// Display labels of the selected taxa, `Other` excluded.
    pub taxa: Vec<String>,
    pub n_excluded: usize,
    pub outputs: Vec<PathBuf>,
}

impl TaxaBarAnalysis {
    pub fn run(
        &self,
        table: &FeatureTable,
        metadata: &Metadata,
        out_dir: &Path,
    ) -> Result<TaxaBarSummary> {
        info!("Top {} taxa by '{}'", self.n, self.column);
        fs::create_dir_all(out_dir)?;

        let groups = TreatmentGroups::resolve(
            table,
            metadata,
            &self.column,
            treatment_filter(&self.treatments),
        )?;
        let top = TopTaxa::from_table(table, &groups, self.n, &self.options)?;

        let pct = top.percentages();
        let series: Vec<(String, Vec<f64>)> = top
            .labels
            .iter()
            .enumerate()
            .map(|(r, label)| (label.clone(), pct.row(r).iter().copied().collect()))
            .collect();
        let title = self.title.clone().unwrap_or_else(|| self.column.clone());
        let plot_path = out_dir.join(format!("{}.svg", file_stem(&title)));
        write_svg(
            &plot_path,
            &stacked_bar(&title, "Relative abundance (%)", &top.treatments, &series),
        )?;

        let prism_path = out_dir.join(format!("{}.csv", file_stem(&self.column)));
        top.prism_table()
            .to_csv(BufWriter::new(File::create(&prism_path)?))?;

        let method = match top.aggregation {
            Aggregation::Sum => "sum of replicates",
            Aggregation::Mean => "mean of replicates",
        };
        let mut report = Report::new("Top taxa stats")
            .note(format!(
                "Method: top {} taxa by round robin over treatments, {}",
                top.n_selected(),
                method
            ))
            .note(TABLE_NOTE)
            .note(FURTHER_NOTE);
        if let Some(pattern) = &self.options.exclude {
            report = report.note(format!(
                "Excluded {} features matching '{}'",
                top.excluded.len(),
                pattern
            ));
        }
        for section in top.to_report_tables() {
            report = report.section(section);
        }
        let mut outputs = vec![plot_path, prism_path];
        outputs.extend(report.write_all(out_dir, "top_n_stats")?);

        let n_selected = top.n_selected();
        Ok(TaxaBarSummary {
            treatments: top.treatments,
            taxa: top.labels.into_iter().take(n_selected).collect(),
            n_excluded: top.excluded.len(),
            outputs,
        })
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// Spearman correlations rendered as a bubble grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationAnalysis {
    pub config: CorrelationConfig,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub result: CorrelationResult,
    pub outputs: Vec<PathBuf>,
}

impl CorrelationAnalysis {
    pub fn run(
        &self,
        table: &FeatureTable,
        metadata: &Metadata,
        out_dir: &Path,
    ) -> Result<CorrelationSummary> {
        info!(
            "Correlating taxa with {} across treatments of '{}'",
            self.config.columns.join(", "),
            self.config.group_column
        );
        fs::create_dir_all(out_dir)?;

        let result = correlate(table, metadata, &self.config)?;

        let title = self
            .title
            .clone()
            .unwrap_or_else(|| "Spearman correlation".to_string());
        let plot_path = out_dir.join("corr_analysis.svg");
        write_svg(
            &plot_path,
            &bubble_grid(&title, &result.taxa, &result.columns, &result.rho),
        )?;

        let report = Report::new("Correlation analysis stats")
            .note(TABLE_NOTE)
            .note(FURTHER_NOTE)
            .section(result.to_report_table())
            .section(result.q_table())
            .section(result.column_table());
        let mut outputs = vec![plot_path];
        outputs.extend(report.write_all(out_dir, "correlation_analysis_stats")?);

        Ok(CorrelationSummary { result, outputs })
    }
}

// ---------------------------------------------------------------------------
// Unknown features
// ---------------------------------------------------------------------------

/// Most abundant features without a name at `rank`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownAnalysis {
    pub n: usize,
    #[serde(default = "default_rank")]
    pub rank: Rank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownSummary {
    pub rank: Rank,
    pub features: Vec<UnknownFeature>,
    pub outputs: Vec<PathBuf>,
}

impl UnknownAnalysis {
    pub fn run(&self, table: &FeatureTable, out_dir: &Path) -> Result<UnknownSummary> {
        info!("Top {} features unresolved at {}", self.n, self.rank.name());
        fs::create_dir_all(out_dir)?;

        let features = top_unknown(table, self.n, self.rank)?;
        if features.is_empty() {
            warn!("Every feature is resolved at {}", self.rank.name());
        }

        let report = Report::new("Top unknown ASVs")
            .note(FURTHER_NOTE)
            .section(unknown_table(&features, self.rank));
        let outputs = report.write_all(out_dir, "top_unknown_asvs")?;

        Ok(UnknownSummary {
            rank: self.rank,
            features,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn fixtures() -> (FeatureTable, Metadata) {
        let table = FeatureTable::from_reader(Cursor::new(
            "#OTU ID\tS1\tS2\tS3\tS4\tS5\tS6\ttaxonomy\n\
             f1\t10\t12\t1\t0\t5\t6\tk__Bacteria; g__Alpha\n\
             f2\t3\t2\t20\t25\t4\t4\tk__Bacteria; g__Beta\n\
             f3\t0\t1\t2\t1\t9\t11\tk__Bacteria; f__Gamma; g__\n\
             f4\t5\t5\t5\t5\t5\t5\tk__Bacteria\n",
        ))
        .unwrap();
        let metadata = Metadata::from_reader(Cursor::new(
            "#SampleID\tsoil\tph\n\
             S1\tclay\t5.1\n\
             S2\tclay\t5.3\n\
             S3\tsand\t6.2\n\
             S4\tsand\t6.0\n\
             S5\tloam\t7.1\n\
             S6\tloam\tNA\n",
        ))
        .unwrap();
        (table, metadata)
    }

    #[test]
    fn test_alpha_writes_outputs() {
        let (table, metadata) = fixtures();
        let dir = TempDir::new().unwrap();
        let analysis = AlphaAnalysis {
            column: "soil".to_string(),
            treatments: Vec::new(),
            metric: AlphaMetric::Shannon,
            title: None,
        };
        let summary = analysis.run(&table, &metadata, dir.path()).unwrap();

        assert_eq!(summary.n_samples, 6);
        assert_eq!(summary.groups.len(), 3);
        assert_eq!(summary.significance.pairwise.len(), 3);
        assert!(dir.path().join("alpha_plot.svg").exists());
        assert!(dir.path().join("alpha_diversity_stats.md").exists());
        assert!(dir.path().join("alpha_diversity_stats_3.csv").exists());
    }

    #[test]
    fn test_beta_restricts_to_treatments() {
        let (table, metadata) = fixtures();
        let dir = TempDir::new().unwrap();
        let analysis = BetaAnalysis {
            column: "soil".to_string(),
            treatments: vec!["clay".to_string(), "sand".to_string()],
            metric: BetaMetric::BrayCurtis,
            permutations: 99,
            seed: 7,
            title: None,
        };
        let summary = analysis.run(&table, &metadata, dir.path()).unwrap();

        assert_eq!(summary.n_samples, 4);
        assert_eq!(summary.pairwise.len(), 1);
        assert!(dir.path().join("distance_matrix.csv").exists());
        assert!(dir.path().join("beta_pcoa.svg").exists());
    }

    #[test]
    fn test_taxa_bar_outputs() {
        let (table, metadata) = fixtures();
        let dir = TempDir::new().unwrap();
        let analysis = TaxaBarAnalysis {
            column: "soil".to_string(),
            treatments: Vec::new(),
            n: 2,
            options: TopTaxaOptions::default(),
            title: Some("Soil taxa".to_string()),
        };
        let summary = analysis.run(&table, &metadata, dir.path()).unwrap();

        assert_eq!(summary.taxa.len(), 2);
        assert!(dir.path().join("Soil taxa.svg").exists());
        assert!(dir.path().join("soil.csv").exists());
        assert!(dir.path().join("top_n_stats.html").exists());
    }

    #[test]
    fn test_unknown_report() {
        let (table, _) = fixtures();
        let dir = TempDir::new().unwrap();
        let summary = UnknownAnalysis {
            n: 5,
            rank: Rank::Genus,
        }
        .run(&table, dir.path())
        .unwrap();

        let ids: Vec<&str> = summary.features.iter().map(|f| f.feature_id.as_str()).collect();
        assert_eq!(ids, vec!["f4", "f3"]);
        assert!(dir.path().join("top_unknown_asvs.csv").exists());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("a/b: c"), "a_b_ c");
    }
}
