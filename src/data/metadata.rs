//! Sample metadata (map file) handling.

use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A variable value that can be categorical or continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }
}

/// Inferred type of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Sample metadata: one row per sample, one column per variable.
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Sample IDs in file order.
    sample_ids: Vec<String>,
    /// Column names (excluding the sample ID column).
    column_names: Vec<String>,
    /// Typed values: sample_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
    /// Raw cell text, used for level matching.
    raw: HashMap<String, HashMap<String, String>>,
    /// Inferred type of each column.
    column_types: HashMap<String, VariableType>,
}

fn is_missing_token(value: &str) -> bool {
    matches!(value, "" | "NA" | "na" | "NaN" | "nan")
}

impl Metadata {
    /// Load metadata from a TSV map file.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse metadata from any buffered reader.
    ///
    /// The first line is the header; its first column names the sample ID
    /// (`#SampleID`, `sample-id`, `id`, ...). Later lines starting with `#`,
    /// such as `#q2:types` directives, are skipped.
    ///
    /// Columns are inferred as continuous if all non-missing values parse as
    /// numbers, otherwise categorical.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ReportError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.trim_end_matches('\r').split('\t').collect();
        if header.len() < 2 {
            return Err(ReportError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut raw_rows: Vec<(String, Vec<String>)> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let sample_id = fields[0].trim().to_string();
            let values: Vec<String> = (0..column_names.len())
                .map(|i| fields.get(i + 1).map(|s| s.trim().to_string()).unwrap_or_default())
                .collect();
            raw_rows.push((sample_id, values));
        }

        if raw_rows.is_empty() {
            return Err(ReportError::EmptyData("No samples in metadata".to_string()));
        }

        let mut column_types = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            let all_numeric = raw_rows.iter().all(|(_, values)| {
                let v = values[col_idx].as_str();
                is_missing_token(v) || v.parse::<f64>().is_ok()
            });
            let any_present = raw_rows
                .iter()
                .any(|(_, values)| !is_missing_token(&values[col_idx]));
            let var_type = if all_numeric && any_present {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            column_types.insert(col_name.clone(), var_type);
        }

        let mut sample_ids = Vec::with_capacity(raw_rows.len());
        let mut data = HashMap::new();
        let mut raw = HashMap::new();

        for (sample_id, values) in raw_rows {
            if data.contains_key(&sample_id) {
                return Err(ReportError::SampleMismatch(format!(
                    "Duplicate sample '{}' in metadata",
                    sample_id
                )));
            }
            let mut sample_data = HashMap::new();
            let mut sample_raw = HashMap::new();

            for (col_name, value) in column_names.iter().zip(values) {
                let var = if is_missing_token(&value) {
                    Variable::Missing
                } else {
                    match column_types.get(col_name) {
                        Some(VariableType::Continuous) => value
                            .parse::<f64>()
                            .map(Variable::Continuous)
                            .unwrap_or(Variable::Missing),
                        Some(VariableType::Categorical) | None => {
                            Variable::Categorical(value.clone())
                        }
                    }
                };
                sample_data.insert(col_name.clone(), var);
                sample_raw.insert(col_name.clone(), value);
            }
            sample_ids.push(sample_id.clone());
            data.insert(sample_id.clone(), sample_data);
            raw.insert(sample_id, sample_raw);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
            raw,
            column_types,
        })
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Number of columns (variables).
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Check if a sample exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    fn require_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(ReportError::MissingColumn(column.to_string()))
        }
    }

    /// Get a variable value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// Raw cell text for a sample and column.
    pub fn raw(&self, sample_id: &str, column: &str) -> Option<&str> {
        self.raw
            .get(sample_id)
            .and_then(|m| m.get(column))
            .map(String::as_str)
    }

    /// Numeric value of a continuous column, if present.
    pub fn numeric(&self, sample_id: &str, column: &str) -> Option<f64> {
        self.get(sample_id, column).and_then(Variable::as_continuous)
    }

    /// Get all values for a column in sample order.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        self.require_column(column)?;
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| self.get(sid, column).unwrap_or(&Variable::Missing))
            .collect())
    }

    /// Get the inferred type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Distinct non-missing values of a column in first-appearance order.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        self.require_column(column)?;
        let mut seen = HashSet::new();
        let mut levels = Vec::new();
        for sid in &self.sample_ids {
            if self.get(sid, column).map_or(true, Variable::is_missing) {
                continue;
            }
            if let Some(value) = self.raw(sid, column) {
                if seen.insert(value.to_string()) {
                    levels.push(value.to_string());
                }
            }
        }
        Ok(levels)
    }

    /// Samples whose raw value in `column` equals `level`, in file order.
    pub fn ids_where(&self, column: &str, level: &str) -> Result<Vec<String>> {
        self.require_column(column)?;
        Ok(self
            .sample_ids
            .iter()
            .filter(|sid| self.raw(sid, column) == Some(level))
            .filter(|sid| !self.get(sid, column).map_or(true, Variable::is_missing))
            .cloned()
            .collect())
    }

    /// Samples with a non-missing value in `column`, in file order.
    pub fn non_missing_ids(&self, column: &str) -> Result<Vec<String>> {
        self.require_column(column)?;
        Ok(self
            .sample_ids
            .iter()
            .filter(|sid| !self.get(sid, column).map_or(true, Variable::is_missing))
            .cloned()
            .collect())
    }

    /// Subset metadata to only include specified samples.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let mut new_data = HashMap::new();
        let mut new_raw = HashMap::new();
        let mut new_sample_ids = Vec::new();

        for sid in sample_ids {
            match (self.data.get(sid), self.raw.get(sid)) {
                (Some(sample_data), Some(sample_raw)) => {
                    new_data.insert(sid.clone(), sample_data.clone());
                    new_raw.insert(sid.clone(), sample_raw.clone());
                    new_sample_ids.push(sid.clone());
                }
                _ => {
                    return Err(ReportError::SampleMismatch(format!(
                        "Sample '{}' not found in metadata",
                        sid
                    )));
                }
            }
        }

        Ok(Self {
            sample_ids: new_sample_ids,
            column_names: self.column_names.clone(),
            data: new_data,
            raw: new_raw,
            column_types: self.column_types.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    const MAP: &str = "#SampleID\tTreatment\tpH\tday\n\
                       #q2:types\tcategorical\tnumeric\tcategorical\n\
                       B001\tSoil\t6.5\t1\n\
                       B002\tRoot\t7.0\t2\n\
                       B003\tSoil\tNA\t1\n\
                       B004\t\t6.8\t2\n";

    fn load() -> Metadata {
        Metadata::from_reader(Cursor::new(MAP)).unwrap()
    }

    #[test]
    fn test_load_skips_directives() {
        let meta = load();
        assert_eq!(meta.n_samples(), 4);
        assert_eq!(meta.n_columns(), 3);
        assert_eq!(meta.sample_ids(), &["B001", "B002", "B003", "B004"]);
        assert_eq!(meta.column_names(), &["Treatment", "pH", "day"]);
    }

    #[test]
    fn test_type_inference() {
        let meta = load();
        assert_eq!(meta.column_type("Treatment"), Some(VariableType::Categorical));
        assert_eq!(meta.column_type("pH"), Some(VariableType::Continuous));
        assert_eq!(meta.numeric("B002", "pH"), Some(7.0));
        assert!(meta.get("B003", "pH").unwrap().is_missing());
    }

    #[test]
    fn test_levels_first_appearance() {
        let meta = load();
        assert_eq!(meta.levels("Treatment").unwrap(), vec!["Soil", "Root"]);
    }

    #[test]
    fn test_ids_where_matches_raw_text() {
        let meta = load();
        assert_eq!(meta.ids_where("Treatment", "Soil").unwrap(), vec!["B001", "B003"]);
        // numeric-looking levels still match by text
        assert_eq!(meta.ids_where("day", "2").unwrap(), vec!["B002", "B004"]);
        assert!(meta.ids_where("Treatment", "Leaf").unwrap().is_empty());
    }

    #[test]
    fn test_non_missing_ids() {
        let meta = load();
        assert_eq!(
            meta.non_missing_ids("Treatment").unwrap(),
            vec!["B001", "B002", "B003"]
        );
    }

    #[test]
    fn test_missing_column() {
        let meta = load();
        assert!(matches!(
            meta.ids_where("Nope", "x"),
            Err(ReportError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let text = "id\tgroup\nS1\ta\nS1\tb\n";
        assert!(matches!(
            Metadata::from_reader(Cursor::new(text)),
            Err(ReportError::SampleMismatch(_))
        ));
    }

    #[test]
    fn test_subset_samples_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", MAP).unwrap();
        file.flush().unwrap();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        let subset = meta
            .subset_samples(&["B003".to_string(), "B001".to_string()])
            .unwrap();
        assert_eq!(subset.sample_ids(), &["B003", "B001"]);
        assert_eq!(subset.raw("B001", "Treatment"), Some("Soil"));
        assert!(meta.subset_samples(&["X".to_string()]).is_err());
    }
}
