//! Config-driven batch runs of several analyses over one table.

use super::analyses::{
    AlphaAnalysis, AlphaSummary, BetaAnalysis, BetaSummary, CorrelationAnalysis,
    CorrelationSummary, TaxaBarAnalysis, TaxaBarSummary, UnknownAnalysis, UnknownSummary,
};
use crate::correlation::{CorrelationConfig, CorrelationMode, TaxaSelection};
use crate::data::taxonomy::{Rank, SequenceKind};
use crate::data::{FeatureTable, Metadata};
use crate::diversity::{AlphaMetric, BetaMetric};
use crate::error::{ReportError, Result};
use crate::filter::{filter_library_size_with_stats, filter_prevalence};
use crate::group::Aggregation;
use crate::report::output_dir;
use crate::topn::TopTaxaOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One analysis in a batch config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisStep {
    Alpha(AlphaAnalysis),
    Beta(BetaAnalysis),
    TaxaBar(TaxaBarAnalysis),
    Correlation(CorrelationAnalysis),
    Unknown(UnknownAnalysis),
}

impl AnalysisStep {
    /// Tag used in configs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alpha(_) => "alpha",
            Self::Beta(_) => "beta",
            Self::TaxaBar(_) => "taxa_bar",
            Self::Correlation(_) => "correlation",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Sub-directory of the output root this step writes into.
    pub fn output_name(&self) -> &'static str {
        match self {
            Self::Alpha(_) => "alpha-output",
            Self::Beta(_) => "beta-output",
            Self::TaxaBar(_) => "taxonomic-output",
            Self::Correlation(_) => "correlation-output",
            Self::Unknown(_) => "unknown-asvs-output",
        }
    }

    fn run(
        &self,
        table: &FeatureTable,
        metadata: Option<&Metadata>,
        out_root: &Path,
    ) -> Result<AnalysisOutcome> {
        let out_dir = output_dir(out_root, self.output_name())?;
        let meta = || {
            metadata.ok_or_else(|| {
                ReportError::InvalidParameter("this analysis needs a metadata file".to_string())
            })
        };

        Ok(match self {
            Self::Alpha(a) => AnalysisOutcome::Alpha(a.run(table, meta()?, &out_dir)?),
            Self::Beta(b) => AnalysisOutcome::Beta(b.run(table, meta()?, &out_dir)?),
            Self::TaxaBar(t) => AnalysisOutcome::TaxaBar(t.run(table, meta()?, &out_dir)?),
            Self::Correlation(c) => {
                AnalysisOutcome::Correlation(c.run(table, meta()?, &out_dir)?)
            }
            Self::Unknown(u) => AnalysisOutcome::Unknown(u.run(table, &out_dir)?),
        })
    }
}

/// Summary of one finished step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Alpha(AlphaSummary),
    Beta(BetaSummary),
    TaxaBar(TaxaBarSummary),
    Correlation(CorrelationSummary),
    Unknown(UnknownSummary),
}

impl AnalysisOutcome {
    /// Files written by the step.
    pub fn outputs(&self) -> &[PathBuf] {
        match self {
            Self::Alpha(s) => &s.outputs,
            Self::Beta(s) => &s.outputs,
            Self::TaxaBar(s) => &s.outputs,
            Self::Correlation(s) => &s.outputs,
            Self::Unknown(s) => &s.outputs,
        }
    }
}

/// Table-level filters applied once before any analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableFilters {
    #[serde(default)]
    pub min_library_size: Option<f64>,
    #[serde(default)]
    pub max_library_size: Option<f64>,
    /// Minimum fraction of samples a feature must be present in.
    #[serde(default)]
    pub min_prevalence: Option<f64>,
}

impl TableFilters {
    pub fn is_empty(&self) -> bool {
        self.min_library_size.is_none()
            && self.max_library_size.is_none()
            && self.min_prevalence.is_none()
    }

    pub fn apply(&self, table: FeatureTable) -> Result<FeatureTable> {
        let mut table = table;
        if self.min_library_size.is_some() || self.max_library_size.is_some() {
            let (filtered, stats) = filter_library_size_with_stats(
                &table,
                self.min_library_size,
                self.max_library_size,
            )?;
            info!(
                "Library size filter kept {} of {} samples",
                stats.n_after, stats.n_before
            );
            table = filtered;
        }
        if let Some(threshold) = self.min_prevalence {
            let before = table.n_features();
            table = filter_prevalence(&table, threshold)?;
            info!(
                "Prevalence filter kept {} of {} features",
                table.n_features(),
                before
            );
        }
        Ok(table)
    }
}

/// Batch configuration for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Feature table (BIOM TSV export or plain TSV).
    pub table: PathBuf,
    /// Sample metadata map file.
    #[serde(default)]
    pub metadata: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// The table has samples as rows instead of columns.
    #[serde(default)]
    pub samples_as_rows: bool,
    #[serde(default, skip_serializing_if = "TableFilters::is_empty")]
    pub filters: TableFilters,
    pub analyses: Vec<AnalysisStep>,
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ReportError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ReportError::from)
    }
}

/// Result of a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub outcomes: Vec<AnalysisOutcome>,
}

/// Read the feature table, transposing when samples are rows.
pub fn load_table<P: AsRef<Path>>(path: P, samples_as_rows: bool) -> Result<FeatureTable> {
    let table = FeatureTable::from_tsv(path)?;
    if samples_as_rows {
        table.transpose()
    } else {
        Ok(table)
    }
}

/// Load the inputs once and run every step in order.
///
/// A failing step aborts the run; the error names the step.
pub fn run_config(config: &AnalysisConfig) -> Result<RunSummary> {
    info!("Running '{}' ({} analyses)", config.name, config.analyses.len());
    let table = config
        .filters
        .apply(load_table(&config.table, config.samples_as_rows)?)?;
    let metadata = config
        .metadata
        .as_ref()
        .map(Metadata::from_tsv)
        .transpose()?;
    fs::create_dir_all(&config.output_dir)?;

    let mut outcomes = Vec::with_capacity(config.analyses.len());
    for (i, step) in config.analyses.iter().enumerate() {
        let outcome = step
            .run(&table, metadata.as_ref(), &config.output_dir)
            .map_err(|e| {
                ReportError::Analysis(format!("Step {} ({}) failed: {}", i + 1, step.kind(), e))
            })?;
        info!(
            "Step {} ({}) wrote {} files",
            i + 1,
            step.kind(),
            outcome.outputs().len()
        );
        outcomes.push(outcome);
    }

    Ok(RunSummary {
        name: config.name.clone(),
        outcomes,
    })
}

/// A config covering every analysis, for `ampr example`.
pub fn example_config() -> AnalysisConfig {
    let treatments = vec![
        "clay".to_string(),
        "loam".to_string(),
        "sand".to_string(),
    ];
    AnalysisConfig {
        name: "soil-survey".to_string(),
        description: Some("Diversity, top taxa and correlations by soil type".to_string()),
        table: PathBuf::from("feature-table.tsv"),
        metadata: Some(PathBuf::from("sample-metadata.tsv")),
        output_dir: PathBuf::from("results"),
        samples_as_rows: false,
        filters: TableFilters {
            min_library_size: Some(1000.0),
            max_library_size: None,
            min_prevalence: None,
        },
        analyses: vec![
            AnalysisStep::Alpha(AlphaAnalysis {
                column: "soil".to_string(),
                treatments: treatments.clone(),
                metric: AlphaMetric::Shannon,
                title: Some("Shannon diversity by soil".to_string()),
            }),
            AnalysisStep::Beta(BetaAnalysis {
                column: "soil".to_string(),
                treatments: treatments.clone(),
                metric: BetaMetric::BrayCurtis,
                permutations: 999,
                seed: 42,
                title: None,
            }),
            AnalysisStep::TaxaBar(TaxaBarAnalysis {
                column: "soil".to_string(),
                treatments: treatments.clone(),
                n: 10,
                options: TopTaxaOptions {
                    aggregation: Aggregation::Sum,
                    exclude: Some("k__Virus".to_string()),
                    kind: SequenceKind::Bacterial,
                },
                title: None,
            }),
            AnalysisStep::Correlation(CorrelationAnalysis {
                config: CorrelationConfig {
                    group_column: "soil".to_string(),
                    treatments,
                    columns: vec!["ph".to_string(), "moisture".to_string()],
                    taxa: TaxaSelection::TopN { n: 10 },
                    mode: CorrelationMode::Mean,
                    exclude: None,
                    kind: SequenceKind::Bacterial,
                },
                title: None,
            }),
            AnalysisStep::Unknown(UnknownAnalysis {
                n: 20,
                rank: Rank::Genus,
            }),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_example_config_yaml_roundtrip() {
        let config = example_config();
        let yaml = config.to_yaml().unwrap();
        let loaded = AnalysisConfig::from_yaml(&yaml).unwrap();

        assert_eq!(loaded.name, "soil-survey");
        assert_eq!(loaded.analyses.len(), 5);
        let kinds: Vec<&str> = loaded.analyses.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec!["alpha", "beta", "taxa_bar", "correlation", "unknown"]);
    }

    #[test]
    fn test_correlation_step_yaml() {
        let yaml = r#"
name: corr
table: table.tsv
metadata: map.tsv
output_dir: out
analyses:
  - kind: correlation
    config:
      group_column: plot
      treatments: [A, B, C]
      columns: [ph]
      taxa:
        select: top_n
        n: 5
      mode: relative
"#;
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        match &config.analyses[0] {
            AnalysisStep::Correlation(c) => {
                assert_eq!(c.config.taxa, TaxaSelection::TopN { n: 5 });
                assert_eq!(c.config.mode, CorrelationMode::Relative);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
name: minimal
table: table.tsv
output_dir: out
analyses:
  - kind: alpha
    column: soil
  - kind: unknown
    n: 5
"#;
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert!(config.metadata.is_none());
        assert!(!config.samples_as_rows);
        assert!(config.filters.is_empty());
        match &config.analyses[0] {
            AnalysisStep::Alpha(a) => {
                assert_eq!(a.metric, AlphaMetric::Shannon);
                assert!(a.treatments.is_empty());
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &config.analyses[1] {
            AnalysisStep::Unknown(u) => assert_eq!(u.rank, Rank::Genus),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_step_error_names_step() {
        let dir = TempDir::new().unwrap();
        let table_path = dir.path().join("table.tsv");
        fs::write(&table_path, "#OTU ID\tS1\tS2\nf1\t1\t2\nf2\t3\t0\n").unwrap();

        let config = AnalysisConfig {
            name: "broken".to_string(),
            description: None,
            table: table_path,
            metadata: None,
            output_dir: dir.path().join("out"),
            samples_as_rows: false,
            filters: TableFilters::default(),
            analyses: vec![AnalysisStep::Alpha(AlphaAnalysis {
                column: "soil".to_string(),
                treatments: Vec::new(),
                metric: AlphaMetric::Shannon,
                title: None,
            })],
        };
        let err = run_config(&config).unwrap_err();
        assert!(err.to_string().contains("Step 1 (alpha) failed"));
    }

    #[test]
    fn test_filters_apply_in_order() {
        let table = FeatureTable::from_reader(std::io::Cursor::new(
            "#OTU ID\tS1\tS2\tS3\nf1\t50\t1\t40\nf2\t0\t1\t10\nf3\t0\t0\t5\n",
        ))
        .unwrap();
        let filters = TableFilters {
            min_library_size: Some(10.0),
            max_library_size: None,
            min_prevalence: Some(0.6),
        };
        let filtered = filters.apply(table).unwrap();
        assert_eq!(filtered.sample_ids(), &["S1".to_string(), "S3".to_string()]);
        // f1 is in both samples, f2 and f3 only in S3
        assert_eq!(filtered.feature_ids(), &["f1".to_string()]);
    }

    #[test]
    fn test_missing_table_fails_before_steps() {
        let dir = TempDir::new().unwrap();
        let mut config = example_config();
        config.table = dir.path().join("absent.tsv");
        config.output_dir = dir.path().join("out");
        assert!(matches!(run_config(&config), Err(ReportError::Io(_))));
    }
}
