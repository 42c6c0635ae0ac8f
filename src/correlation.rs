//! Spearman correlation between per-treatment taxon abundance and
//! per-treatment means of numeric metadata columns.

use crate::correct::correct_bh;
use crate::data::taxonomy::{format_label, SequenceKind};
use crate::data::{FeatureTable, Metadata, VariableType};
use crate::error::{ReportError, Result};
use crate::group::{aggregate, Aggregation, TreatmentGroups};
use crate::report::{round_to, Cell, ReportTable};
use crate::stats::spearman;
use crate::topn::select_top_n;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Which taxa are correlated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "select", rename_all = "snake_case")]
pub enum TaxaSelection {
    All,
    /// Round-robin top N on the summed table.
    TopN { n: usize },
    /// Feature IDs, lineages or display labels.
    List { taxa: Vec<String> },
}

/// How replicate abundances become one value per treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMode {
    /// Mean of replicates.
    #[default]
    Mean,
    /// Sum of replicates divided by the taxon's total across treatments.
    Relative,
}

impl CorrelationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Some(Self::Mean),
            "relative" | "normalized" => Some(Self::Relative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Metadata column holding the treatment of each sample.
    pub group_column: String,
    pub treatments: Vec<String>,
    /// Numeric metadata columns to correlate against.
    pub columns: Vec<String>,
    pub taxa: TaxaSelection,
    #[serde(default)]
    pub mode: CorrelationMode,
    /// Lineage substring never picked by `TopN`.
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub kind: SequenceKind,
}

impl CorrelationConfig {
    fn validate(&self, metadata: &Metadata) -> Result<()> {
        if self.treatments.is_empty() {
            return Err(ReportError::InvalidParameter(
                "At least one treatment is required for correlation".to_string(),
            ));
        }
        if self.columns.is_empty() {
            return Err(ReportError::InvalidParameter(
                "At least one correlation column is required".to_string(),
            ));
        }
        for column in &self.columns {
            match metadata.column_type(column) {
                None => return Err(ReportError::MissingColumn(column.clone())),
                Some(VariableType::Continuous) => {}
                Some(VariableType::Categorical) => {
                    return Err(ReportError::InvalidParameter(format!(
                        "Correlation column '{}' is not numeric",
                        column
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Correlation of every selected taxon with every column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub treatments: Vec<String>,
    /// Display labels.
    pub taxa: Vec<String>,
    /// Lineages (or feature IDs when the table has no taxonomy).
    pub raw_taxa: Vec<String>,
    pub columns: Vec<String>,
    /// Taxa × treatments values that were correlated.
    pub taxa_values: DMatrix<f64>,
    /// Columns × treatments means.
    pub column_values: DMatrix<f64>,
    /// Taxa × columns.
    pub rho: DMatrix<f64>,
    pub p: DMatrix<f64>,
    /// BH q-values over every test with a p-value.
    pub q: DMatrix<f64>,
}

fn resolve_taxa(
    table: &FeatureTable,
    groups: &TreatmentGroups,
    config: &CorrelationConfig,
) -> Result<Vec<usize>> {
    let fallback = config.kind.unresolved_label();
    let rows = match &config.taxa {
        TaxaSelection::All => (0..table.n_features()).collect(),
        TaxaSelection::TopN { n } => {
            let summed = aggregate(table, groups, Aggregation::Sum);
            select_top_n(&summed, *n, config.exclude.as_deref())?
        }
        TaxaSelection::List { taxa: wanted } => {
            let mut rows = Vec::with_capacity(wanted.len());
            for name in wanted {
                let found = (0..table.n_features()).find(|&row| {
                    let lineage = table.feature_label(row);
                    table.feature_ids()[row] == *name
                        || lineage == name
                        || format_label(lineage, fallback) == *name
                });
                match found {
                    Some(row) if !rows.contains(&row) => rows.push(row),
                    Some(_) => {}
                    None => warn!("Taxon '{}' is not in the feature table", name),
                }
            }
            rows
        }
    };
    if rows.is_empty() {
        return Err(ReportError::EmptyData(
            "No taxa selected for correlation".to_string(),
        ));
    }
    Ok(rows)
}

/// Run Spearman correlations across treatments.
pub fn correlate(
    table: &FeatureTable,
    metadata: &Metadata,
    config: &CorrelationConfig,
) -> Result<CorrelationResult> {
    config.validate(metadata)?;
    let groups = TreatmentGroups::resolve(
        table,
        metadata,
        &config.group_column,
        Some(config.treatments.as_slice()),
    )?;
    let n_treatments = groups.len();
    if n_treatments < 3 {
        warn!(
            "Only {} treatments; Spearman p-values need at least 3",
            n_treatments
        );
    }

    let rows = resolve_taxa(table, &groups, config)?;
    let values = match config.mode {
        CorrelationMode::Mean => aggregate(table, &groups, Aggregation::Mean).data,
        CorrelationMode::Relative => aggregate(table, &groups, Aggregation::Sum).relative_by_row(),
    };
    let taxa_values = DMatrix::from_fn(rows.len(), n_treatments, |i, t| values[(rows[i], t)]);

    let column_values = DMatrix::from_fn(config.columns.len(), n_treatments, |c, t| {
        let column = &config.columns[c];
        let present: Vec<f64> = groups.treatments[t]
            .sample_ids
            .iter()
            .filter_map(|sid| metadata.numeric(sid, column))
            .collect();
        if present.is_empty() {
            f64::NAN
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        }
    });

    let n_taxa = rows.len();
    let n_columns = config.columns.len();
    let mut rho = DMatrix::from_element(n_taxa, n_columns, f64::NAN);
    let mut p = DMatrix::from_element(n_taxa, n_columns, f64::NAN);

    for c in 0..n_columns {
        let usable: Vec<usize> = (0..n_treatments)
            .filter(|&t| column_values[(c, t)].is_finite())
            .collect();
        if usable.len() < 2 {
            warn!(
                "Column '{}' has values for {} treatments; skipping",
                config.columns[c],
                usable.len()
            );
            continue;
        }
        let y: Vec<f64> = usable.iter().map(|&t| column_values[(c, t)]).collect();
        for i in 0..n_taxa {
            let x: Vec<f64> = usable.iter().map(|&t| taxa_values[(i, t)]).collect();
            let result = spearman(&x, &y)?;
            rho[(i, c)] = result.rho;
            p[(i, c)] = result.p_value;
        }
    }

    let q_flat = correct_bh(p.as_slice());
    let q = DMatrix::from_column_slice(n_taxa, n_columns, &q_flat);

    let fallback = config.kind.unresolved_label();
    let raw_taxa: Vec<String> = rows
        .iter()
        .map(|&row| table.feature_label(row).to_string())
        .collect();
    let taxa = raw_taxa.iter().map(|l| format_label(l, fallback)).collect();

    info!(
        "Correlated {} taxa with {} columns across {} treatments",
        n_taxa, n_columns, n_treatments
    );
    debug!("Mode: {:?}", config.mode);

    Ok(CorrelationResult {
        treatments: groups.names().into_iter().map(String::from).collect(),
        taxa,
        raw_taxa,
        columns: config.columns.clone(),
        taxa_values,
        column_values,
        rho,
        p,
        q,
    })
}

fn format_rounded(value: f64, digits: usize) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        round_to(value, digits).to_string()
    }
}

impl CorrelationResult {
    /// Taxa × columns of `Statistic: <rho>, pvalue: <p>` cells.
    pub fn to_report_table(&self) -> ReportTable {
        let mut table = ReportTable::new("Spearman results", "Taxon", self.columns.clone());
        for (i, label) in self.taxa.iter().enumerate() {
            let cells = (0..self.columns.len())
                .map(|c| {
                    Cell::text(format!(
                        "Statistic: {}, pvalue: {}",
                        format_rounded(self.rho[(i, c)], 6),
                        format_rounded(self.p[(i, c)], 3)
                    ))
                })
                .collect();
            table.push_row(label.clone(), cells);
        }
        table
    }

    /// Taxa × columns of BH q-values, labelled by raw lineage.
    pub fn q_table(&self) -> ReportTable {
        let mut table =
            ReportTable::new("Benjamini-Hochberg q-values", "Taxon", self.columns.clone());
        for (i, lineage) in self.raw_taxa.iter().enumerate() {
            let cells = (0..self.columns.len())
                .map(|c| Cell::number(self.q[(i, c)], 3))
                .collect();
            table.push_row(lineage.clone(), cells);
        }
        table
    }

    /// Treatment means of the correlation columns.
    pub fn column_table(&self) -> ReportTable {
        let mut table = ReportTable::new("Treatment means", "Treatment", self.columns.clone());
        for (t, name) in self.treatments.iter().enumerate() {
            let cells = (0..self.columns.len())
                .map(|c| Cell::number(self.column_values[(c, t)], 6))
                .collect();
            table.push_row(name.clone(), cells);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn fixtures() -> (FeatureTable, Metadata) {
        let table = FeatureTable::from_reader(Cursor::new(
            "#OTU ID\tA1\tA2\tB1\tB2\tC1\tC2\tD1\ttaxonomy\n\
             up\t1\t1\t4\t4\t9\t9\t16\tk__Bacteria; g__Rising\n\
             down\t9\t9\t4\t4\t1\t1\t0\tk__Bacteria; g__Falling\n\
             flat\t5\t5\t5\t5\t5\t5\t5\tk__Bacteria; p__Flat\n",
        ))
        .unwrap();
        let metadata = Metadata::from_reader(Cursor::new(
            "#SampleID\tplot\tmoisture\tsite\n\
             A1\tA\t10\tx\n\
             A2\tA\t12\tx\n\
             B1\tB\t20\ty\n\
             B2\tB\t22\ty\n\
             C1\tC\t30\tx\n\
             C2\tC\tNA\ty\n\
             D1\tD\t40\tx\n",
        ))
        .unwrap();
        (table, metadata)
    }

    fn config(taxa: TaxaSelection) -> CorrelationConfig {
        CorrelationConfig {
            group_column: "plot".to_string(),
            treatments: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            columns: vec!["moisture".to_string()],
            taxa,
            mode: CorrelationMode::Mean,
            exclude: None,
            kind: SequenceKind::Bacterial,
        }
    }

    #[test]
    fn test_monotone_correlations() {
        let (table, metadata) = fixtures();
        let result = correlate(&table, &metadata, &config(TaxaSelection::All)).unwrap();

        assert_eq!(result.taxa, vec!["g__Rising", "g__Falling", "p__Flat"]);
        assert_relative_eq!(result.column_values[(0, 0)], 11.0);
        // C2 is missing
        assert_relative_eq!(result.column_values[(0, 2)], 30.0);
        assert_relative_eq!(result.rho[(0, 0)], 1.0);
        assert_relative_eq!(result.rho[(1, 0)], -1.0);
        assert!(result.rho[(2, 0)].is_nan());
        assert_eq!(result.p[(0, 0)], 0.0);
        assert!(result.q[(2, 0)].is_nan());
    }

    #[test]
    fn test_report_cells() {
        let (table, metadata) = fixtures();
        let result = correlate(&table, &metadata, &config(TaxaSelection::All)).unwrap();
        let report = result.to_report_table();
        assert_eq!(report.rows[1].1[0].display(), "Statistic: -1, pvalue: 0");
        assert_eq!(report.rows[2].1[0].display(), "Statistic: nan, pvalue: nan");
    }

    #[test]
    fn test_list_and_top_n_selection() {
        let (table, metadata) = fixtures();
        let list = TaxaSelection::List {
            taxa: vec![
                "g__Falling".to_string(),
                "missing".to_string(),
                "up".to_string(),
            ],
        };
        let result = correlate(&table, &metadata, &config(list)).unwrap();
        assert_eq!(result.raw_taxa, vec!["k__Bacteria; g__Falling", "k__Bacteria; g__Rising"]);

        let top = correlate(&table, &metadata, &config(TaxaSelection::TopN { n: 1 })).unwrap();
        assert_eq!(top.taxa.len(), 1);
    }

    #[test]
    fn test_relative_mode() {
        let (table, metadata) = fixtures();
        let mut cfg = config(TaxaSelection::All);
        cfg.mode = CorrelationMode::Relative;
        let result = correlate(&table, &metadata, &cfg).unwrap();
        // "up" sums 2, 8, 18, 16 over total 44
        assert_relative_eq!(result.taxa_values[(0, 0)], 2.0 / 44.0);
        assert_relative_eq!(result.taxa_values.row(0).sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_categorical_column() {
        let (table, metadata) = fixtures();
        let mut cfg = config(TaxaSelection::All);
        cfg.columns = vec!["site".to_string()];
        assert!(matches!(
            correlate(&table, &metadata, &cfg),
            Err(ReportError::InvalidParameter(_))
        ));
        cfg.columns = vec!["nitrogen".to_string()];
        assert!(matches!(
            correlate(&table, &metadata, &cfg),
            Err(ReportError::MissingColumn(_))
        ));
    }
}
