//! Sparse feature table holding ASV/OTU abundances across samples.

use crate::error::{ReportError, Result};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A sparse abundance table of features (ASVs/OTUs/collapsed taxa) by samples.
///
/// Rows represent features, columns represent samples, matching the BIOM
/// convention. Values are `f64` so that both raw frequency tables and
/// relative-frequency tables can be loaded.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Sparse matrix in CSR format (features × samples)
    data: CsMat<f64>,
    /// Feature identifiers (row names)
    feature_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
    /// Optional lineage string per feature
    taxonomy: Option<Vec<String>>,
}

impl FeatureTable {
    /// Create a new FeatureTable from a sparse matrix and identifiers.
    pub fn new(
        data: CsMat<f64>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != feature_ids.len() {
            return Err(ReportError::DimensionMismatch {
                expected: nrows,
                actual: feature_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(ReportError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            feature_ids,
            sample_ids,
            taxonomy: None,
        })
    }

    /// Attach a lineage string to every feature.
    pub fn with_taxonomy(mut self, taxonomy: Vec<String>) -> Result<Self> {
        if taxonomy.len() != self.n_features() {
            return Err(ReportError::DimensionMismatch {
                expected: self.n_features(),
                actual: taxonomy.len(),
            });
        }
        self.taxonomy = Some(taxonomy);
        Ok(self)
    }

    /// Load a feature table from a BIOM-TSV or plain TSV file.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse a feature table from any buffered reader.
    ///
    /// Expected format:
    /// - Optional leading comment lines (`# Constructed from biom file`)
    /// - Header: feature ID column, then sample IDs, optionally a trailing
    ///   `taxonomy` column
    /// - Subsequent rows: feature ID followed by abundances
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header_line = loop {
            let line = lines
                .next()
                .ok_or_else(|| ReportError::EmptyData("Empty feature table".to_string()))??;
            let trimmed = line.trim_start();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('#')
                && !trimmed.starts_with("#OTU ID")
                && !trimmed.starts_with("#OTU_ID")
            {
                continue;
            }
            break line;
        };

        let header: Vec<&str> = header_line.trim_end_matches(['\r', '\n']).split('\t').collect();
        let has_taxonomy = header
            .last()
            .map(|h| h.trim().eq_ignore_ascii_case("taxonomy"))
            .unwrap_or(false)
            && header.len() > 2;
        let sample_end = if has_taxonomy { header.len() - 1 } else { header.len() };
        if sample_end < 2 {
            return Err(ReportError::EmptyData(
                "Feature table must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..sample_end]
            .iter()
            .map(|s| s.trim().to_string())
            .collect();
        let n_samples = sample_ids.len();

        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut feature_ids: Vec<String> = Vec::new();
        let mut taxonomy: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let row_idx = feature_ids.len();
            feature_ids.push(fields[0].trim().to_string());

            for col_idx in 0..n_samples {
                let raw = fields.get(col_idx + 1).map(|s| s.trim()).unwrap_or("");
                let value: f64 = parse_abundance(raw).ok_or_else(|| ReportError::InvalidValue {
                    value: raw.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                if value > 0.0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }

            if has_taxonomy {
                let lineage = fields
                    .get(sample_end)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                taxonomy.push(lineage);
            }
        }

        let n_features = feature_ids.len();
        if n_features == 0 {
            return Err(ReportError::EmptyData("No features in table".to_string()));
        }

        let mut tri_mat = TriMat::new((n_features, n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        let table = Self::new(tri_mat.to_csr(), feature_ids, sample_ids)?;
        if has_taxonomy {
            table.with_taxonomy(taxonomy)
        } else {
            Ok(table)
        }
    }

    /// Write the table in BIOM-TSV layout.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "#OTU ID")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        if self.taxonomy.is_some() {
            write!(writer, "\ttaxonomy")?;
        }
        writeln!(writer)?;

        for (row_idx, feature_id) in self.feature_ids.iter().enumerate() {
            write!(writer, "{}", feature_id)?;
            for col_idx in 0..self.n_samples() {
                write!(writer, "\t{}", self.get(row_idx, col_idx))?;
            }
            if let Some(tax) = &self.taxonomy {
                write!(writer, "\t{}", tax[row_idx])?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Swap the sample and feature axes.
    ///
    /// Used for tables exported with samples as rows. Taxonomy is dropped
    /// because it no longer describes the rows.
    pub fn transpose(&self) -> Result<Self> {
        let mut tri_mat = TriMat::new((self.n_samples(), self.n_features()));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                tri_mat.add_triplet(col, row, val);
            }
        }
        Self::new(
            tri_mat.to_csr(),
            self.sample_ids.clone(),
            self.feature_ids.clone(),
        )
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of features (rows).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Total number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    /// Feature identifiers.
    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<f64> {
        &self.data
    }

    /// Whether lineage strings were loaded.
    pub fn has_taxonomy(&self) -> bool {
        self.taxonomy.is_some()
    }

    /// Lineage string for a feature, if a taxonomy column was present.
    pub fn taxonomy(&self, row: usize) -> Option<&str> {
        self.taxonomy
            .as_ref()
            .and_then(|t| t.get(row))
            .map(String::as_str)
    }

    /// Lineage when present, otherwise the feature ID.
    ///
    /// Collapsed tables use the lineage itself as the feature ID, so this is
    /// the string label formatting and taxon filters operate on.
    pub fn feature_label(&self, row: usize) -> &str {
        match self.taxonomy(row) {
            Some(t) if !t.is_empty() => t,
            _ => &self.feature_ids[row],
        }
    }

    /// Position of a sample by ID.
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|s| s == sample_id)
    }

    /// Map from sample ID to column index.
    pub fn sample_index_map(&self) -> HashMap<&str, usize> {
        self.sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect()
    }

    /// Get a dense vector for a specific row (feature).
    pub fn row_dense(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Get a dense vector for a specific column (sample).
    pub fn col_dense(&self, col: usize) -> Vec<f64> {
        (0..self.n_features())
            .map(|row| self.get(row, col))
            .collect()
    }

    /// Compute row sums (total abundance per feature).
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n_features())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Compute column sums (library sizes per sample).
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Number of samples in which each feature is present.
    pub fn row_nnz(&self) -> Vec<usize> {
        (0..self.n_features())
            .map(|row| self.data.outer_view(row).map(|v| v.nnz()).unwrap_or(0))
            .collect()
    }

    /// Subset the table to include only specified features (by index).
    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        let n_features = indices.len();
        let n_samples = self.n_samples();

        let mut tri_mat = TriMat::new((n_features, n_samples));
        let mut new_feature_ids = Vec::with_capacity(n_features);
        let mut new_taxonomy = self.taxonomy.as_ref().map(|_| Vec::with_capacity(n_features));

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_features() {
                return Err(ReportError::InvalidParameter(format!(
                    "Feature index {} out of bounds",
                    old_row
                )));
            }
            new_feature_ids.push(self.feature_ids[old_row].clone());
            if let (Some(dst), Some(src)) = (new_taxonomy.as_mut(), self.taxonomy.as_ref()) {
                dst.push(src[old_row].clone());
            }

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        let table = Self::new(tri_mat.to_csr(), new_feature_ids, self.sample_ids.clone())?;
        match new_taxonomy {
            Some(tax) => table.with_taxonomy(tax),
            None => Ok(table),
        }
    }

    /// Subset the table to include only specified samples (by index).
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        let n_features = self.n_features();
        let n_samples = indices.len();

        let mut col_map: HashMap<usize, usize> = HashMap::with_capacity(n_samples);
        for (new_idx, &old_idx) in indices.iter().enumerate() {
            if col_map.insert(old_idx, new_idx).is_some() {
                return Err(ReportError::InvalidParameter(format!(
                    "Sample index {} selected more than once",
                    old_idx
                )));
            }
        }

        let mut new_sample_ids = Vec::with_capacity(n_samples);
        for &old_col in indices {
            if old_col >= self.n_samples() {
                return Err(ReportError::InvalidParameter(format!(
                    "Sample index {} out of bounds",
                    old_col
                )));
            }
            new_sample_ids.push(self.sample_ids[old_col].clone());
        }

        let mut tri_mat = TriMat::new((n_features, n_samples));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                if let Some(&new_col) = col_map.get(&old_col) {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        let table = Self::new(tri_mat.to_csr(), self.feature_ids.clone(), new_sample_ids)?;
        match &self.taxonomy {
            Some(tax) => table.with_taxonomy(tax.clone()),
            None => Ok(table),
        }
    }

    /// Subset to the named samples, in the given order.
    pub fn select_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let index = self.sample_index_map();
        let indices = sample_ids
            .iter()
            .map(|sid| {
                index.get(sid.as_str()).copied().ok_or_else(|| {
                    ReportError::SampleMismatch(format!(
                        "Sample '{}' not found in feature table",
                        sid
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        self.subset_samples(&indices)
    }

    /// Convert to a dense matrix.
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut dense = nalgebra::DMatrix::zeros(self.n_features(), self.n_samples());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                dense[(row, col)] = val;
            }
        }
        dense
    }
}

fn parse_abundance(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return Some(0.0);
    }
    let value: f64 = raw.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}
