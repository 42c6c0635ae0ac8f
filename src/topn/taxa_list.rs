//! Reading taxa back from a previous top-N report.

use super::OTHER_LABEL;
use crate::error::{ReportError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Taxa named in the header of a top-N CSV.
///
/// The first column is the row label; `Other` is dropped.
pub fn read_taxa_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    read_taxa_from(File::open(path)?)
}

fn read_taxa_from<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let taxa: Vec<String> = rdr
        .headers()?
        .iter()
        .skip(1)
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && h != OTHER_LABEL)
        .collect();

    if taxa.is_empty() {
        return Err(ReportError::EmptyData(
            "Taxa list has no taxon columns".to_string(),
        ));
    }
    Ok(taxa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_header_without_other() {
        let text = "Treatment,k__Bacteria; g__A,k__Bacteria; g__B,Other\nT1,10,20,70\n";
        let taxa = read_taxa_from(Cursor::new(text)).unwrap();
        assert_eq!(taxa, vec!["k__Bacteria; g__A", "k__Bacteria; g__B"]);
    }

    #[test]
    fn test_header_only_other() {
        assert!(read_taxa_from(Cursor::new("Treatment,Other\n")).is_err());
    }

    #[test]
    fn test_read_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "Treatment,\"g__A, strain 1\",Other\n").unwrap();
        assert_eq!(read_taxa_list(file.path()).unwrap(), vec!["g__A, strain 1"]);
    }
}
