//! CSV input: header-keyed records in file order.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One data row of an input file. Values are looked up by column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    /// 1-based data row number (the header is row 0).
    pub row: usize,
    values: Vec<String>,
    index: HashMap<String, usize>,
}

impl InputRecord {
    pub fn new(row: usize, headers: &[String], values: Vec<String>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();
        Self { row, values, index }
    }

    /// Build a record from `(column, value)` pairs; handy for tests and synthetic rows.
    pub fn from_pairs(row: usize, pairs: &[(&str, &str)]) -> Self {
        let headers: Vec<String> = pairs.iter().map(|(h, _)| h.to_string()).collect();
        let values = pairs.iter().map(|(_, v)| v.to_string()).collect();
        Self::new(row, &headers, values)
    }

    /// Value of a column, or `""` when the column or cell is absent.
    pub fn get(&self, column: &str) -> &str {
        self.index
            .get(column)
            .and_then(|&i| self.values.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Trimmed value of a column, `None` when blank.
    pub fn non_blank(&self, column: &str) -> Option<&str> {
        let value = self.get(column).trim();
        (!value.is_empty()).then_some(value)
    }

    /// Raw values in source column order, as echoed into status reports.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// A parsed input file.
#[derive(Debug, Clone, Default)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub records: Vec<InputRecord>,
}

/// Read a CSV file with a header row.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<InputTable, InputError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Reading input CSV");
    let file = File::open(path).map_err(|source| InputError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_records(file)?;
    info!(path = %path.display(), rows = table.records.len(), "Input CSV read");
    Ok(table)
}

/// Parse CSV text from any reader. Short rows are padded with empty cells; blank cells
/// past the last header (trailing commas) are dropped, other extra cells are kept.
pub fn parse_records<R: Read>(reader: R) -> Result<InputTable, InputError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        let mut values: Vec<String> = record.iter().map(str::to_string).collect();
        if values.iter().all(|v| v.trim().is_empty()) {
            debug!(row = idx + 1, "Skipping blank CSV line");
            continue;
        }
        values.resize(headers.len().max(values.len()), String::new());
        while values.len() > headers.len() && values.last().is_some_and(|v| v.trim().is_empty()) {
            values.pop();
        }
        records.push(InputRecord::new(idx + 1, &headers, values));
    }

    Ok(InputTable { headers, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_keyed_by_header_and_keep_order() {
        let text = "code,questions,name\nQ1,\"A,B\",First\nQ2,C\n";
        let table = parse_records(text.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["code", "questions", "name"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].get("questions"), "A,B");
        assert_eq!(table.records[0].row, 1);
        assert_eq!(table.records[1].get("name"), "");
        assert_eq!(table.records[1].values().len(), 3);
        assert_eq!(table.records[1].get("missing"), "");
    }

    #[test]
    fn trailing_blank_cells_past_the_header_are_dropped() {
        let text = "code,name\nQ1,First,\nQ2,Second,,extra\n";
        let table = parse_records(text.as_bytes()).unwrap();
        assert_eq!(table.records[0].values(), ["Q1", "First"]);
        assert_eq!(table.records[1].values(), ["Q2", "Second", "", "extra"]);
    }

    #[test]
    fn non_blank_trims_and_rejects_whitespace() {
        let rec = InputRecord::from_pairs(1, &[("code", "  P1 "), ("name", "   ")]);
        assert_eq!(rec.non_blank("code"), Some("P1"));
        assert_eq!(rec.non_blank("name"), None);
    }
}
