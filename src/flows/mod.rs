//! Flow records produced by the external extraction tool.
//!
//! The tool writes one CSV row per flow. Columns are kept by name; cells are
//! numbers where they parse as such (including `Infinity`/`NaN`, which
//! aggregation later skips) and text otherwise.

mod extractor;

pub use extractor::{ExternalFlowExtractor, ExtractionError};

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum FlowTableError {
    #[error("failed to open flow table {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed flow table: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FlowValue {
    fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return FlowValue::Missing;
        }
        match cell.parse::<f64>() {
            Ok(v) => FlowValue::Number(v),
            Err(_) => FlowValue::Text(cell.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlowValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// One row, viewed through its table's column names
#[derive(Debug, Clone, Copy)]
pub struct FlowRecord<'a> {
    table: &'a FlowTable,
    values: &'a [FlowValue],
}

impl<'a> FlowRecord<'a> {
    pub fn get(&self, column: &str) -> Option<&'a FlowValue> {
        let idx = *self.table.index.get(column)?;
        self.values.get(idx)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<FlowValue>>,
}

impl FlowTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<FlowValue>>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(|c| c.trim().to_string()).collect();
        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            // Some tool versions repeat a header; the first occurrence wins
            index.entry(name.clone()).or_insert(i);
        }
        Self {
            columns,
            index,
            rows,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, FlowTableError> {
        let file = std::fs::File::open(path).map_err(|source| FlowTableError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FlowTableError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut row: Vec<FlowValue> = record.iter().take(width).map(FlowValue::parse).collect();
            row.resize(width, FlowValue::Missing);
            rows.push(row);
        }
        Ok(Self::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> Option<FlowRecord<'_>> {
        self.rows.get(i).map(|values| FlowRecord {
            table: self,
            values,
        })
    }

    /// Finite numeric values of a column, in row order. `None` if the column is absent.
    pub fn finite_values(&self, column: &str) -> Option<Vec<f64>> {
        let idx = *self.index.get(column)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.get(idx).and_then(FlowValue::as_f64))
                .filter(|v| v.is_finite())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Flow ID, Src IP, Flow Duration, Flow Bytes/s,Label\n\
        a,10.0.0.1,100,Infinity,BENIGN\n\
        b,10.0.0.2,300,12.5,BENIGN\n\
        c,10.0.0.3,,NaN\n";

    #[test]
    fn headers_trimmed_and_cells_typed() {
        let t = FlowTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(t.len(), 3);
        assert!(t.has_column("Src IP"));
        assert!(t.has_column("Flow Duration"));

        let r = t.row(0).unwrap();
        assert_eq!(r.get("Src IP"), Some(&FlowValue::Text("10.0.0.1".into())));
        assert_eq!(r.get("Flow Duration"), Some(&FlowValue::Number(100.0)));
        // short row is padded
        assert_eq!(t.row(2).unwrap().get("Label"), Some(&FlowValue::Missing));
    }

    #[test]
    fn finite_values_skip_inf_nan_and_blanks() {
        let t = FlowTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(t.finite_values("Flow Bytes/s"), Some(vec![12.5]));
        assert_eq!(t.finite_values("Flow Duration"), Some(vec![100.0, 300.0]));
        assert_eq!(t.finite_values("Src IP"), Some(vec![]));
        assert_eq!(t.finite_values("Dst Port"), None);
    }

    #[test]
    fn header_only_file_is_empty_table() {
        let t = FlowTable::from_reader("Flow IAT Max,Idle Std\n".as_bytes()).unwrap();
        assert!(t.is_empty());
        assert_eq!(t.columns().len(), 2);
    }
}
