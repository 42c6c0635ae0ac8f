//! Resolution of treatment levels to feature-table sample columns.

use crate::data::{FeatureTable, Metadata};
use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One treatment level and the table columns that belong to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub name: String,
    /// Column indices into the feature table.
    pub sample_indices: Vec<usize>,
    pub sample_ids: Vec<String>,
}

impl Treatment {
    pub fn len(&self) -> usize {
        self.sample_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_indices.is_empty()
    }
}

/// Ordered treatments of one metadata column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentGroups {
    pub column: String,
    pub treatments: Vec<Treatment>,
}

impl TreatmentGroups {
    /// Resolve treatment levels of `column` to table columns.
    ///
    /// When `treatments` is `None` every level of the column is used, in the
    /// order it first appears in the metadata. Samples listed in the metadata
    /// but absent from the table are skipped.
    pub fn resolve(
        table: &FeatureTable,
        metadata: &Metadata,
        column: &str,
        treatments: Option<&[String]>,
    ) -> Result<Self> {
        if !metadata.has_column(column) {
            return Err(ReportError::MissingColumn(column.to_string()));
        }

        let names: Vec<String> = match treatments {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => metadata.levels(column)?,
        };

        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ReportError::InvalidParameter(format!(
                    "Treatment '{}' listed more than once",
                    name
                )));
            }
        }

        let index = table.sample_index_map();
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let mut sample_indices = Vec::new();
            let mut sample_ids = Vec::new();
            for sid in metadata.ids_where(column, &name)? {
                match index.get(sid.as_str()) {
                    Some(&col) => {
                        sample_indices.push(col);
                        sample_ids.push(sid);
                    }
                    None => warn!("{} is not in the feature table", sid),
                }
            }
            if sample_indices.is_empty() {
                warn!("Treatment '{}' has no samples in the feature table", name);
            } else {
                debug!("Treatment '{}': {} samples", name, sample_indices.len());
            }
            resolved.push(Treatment {
                name,
                sample_indices,
                sample_ids,
            });
        }

        if resolved.iter().all(Treatment::is_empty) {
            return Err(ReportError::EmptyData(format!(
                "No samples of column '{}' are present in the feature table",
                column
            )));
        }

        Ok(Self {
            column: column.to_string(),
            treatments: resolved,
        })
    }

    /// Number of treatments, including empty ones.
    pub fn len(&self) -> usize {
        self.treatments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.treatments.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.treatments.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Treatment> {
        self.treatments.iter()
    }

    /// All sample IDs across treatments, in treatment order.
    pub fn all_sample_ids(&self) -> Vec<String> {
        self.treatments
            .iter()
            .flat_map(|t| t.sample_ids.iter().cloned())
            .collect()
    }

    /// Treatment name for each sample of `sample_ids`, or `None` if the
    /// sample belongs to no treatment.
    pub fn labels_for(&self, sample_ids: &[String]) -> Vec<Option<String>> {
        sample_ids
            .iter()
            .map(|sid| {
                self.treatments
                    .iter()
                    .find(|t| t.sample_ids.contains(sid))
                    .map(|t| t.name.clone())
            })
            .collect()
    }
}
