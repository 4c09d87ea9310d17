use crate::error::{ForecastError, ForecastResult};
use chrono::{NaiveDate, NaiveDateTime};

/// A single table value.
///
/// Columns are homogeneous in intent, but any row may hold `Null`; the
/// consumers decide what to do with the hole (the feature assembler drops
/// the row, it never imputes).
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Timestamp(NaiveDateTime),
    Text(String),
    Null,
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            _ => false,
        }
    }
}

/// Columnar in-memory table.
///
/// The numeric and timestamp classification is computed once here and is
/// immutable afterwards; re-deriving it requires building a new `Dataset`.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    numeric_columns: Vec<String>,
    timestamp_column: Option<String>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> ForecastResult<Dataset> {
        for (n_row, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ForecastError::RaggedRow {
                    row: n_row,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }

        // A column is a timestamp column when most of its non-null cells are
        // timestamps; the first such column wins. A column is numeric when
        // most of its non-null cells are numbers. Ties are neither.
        let mut timestamp_column = None;
        let mut numeric_columns = Vec::new();
        for (n_col, name) in columns.iter().enumerate() {
            let mut n_filled = 0;
            let mut n_numbers = 0;
            let mut n_timestamps = 0;
            for row in &rows {
                match &row[n_col] {
                    Cell::Number(_) => {
                        n_filled += 1;
                        n_numbers += 1;
                    }
                    Cell::Timestamp(_) => {
                        n_filled += 1;
                        n_timestamps += 1;
                    }
                    Cell::Text(_) => n_filled += 1,
                    Cell::Null => {}
                }
            }
            if timestamp_column.is_none() && n_timestamps * 2 > n_filled {
                timestamp_column = Some(name.clone());
            } else if n_numbers * 2 > n_filled {
                numeric_columns.push(name.clone());
            }
        }

        Ok(Dataset {
            columns,
            rows,
            numeric_columns,
            timestamp_column,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    pub fn timestamp_column(&self) -> Option<&str> {
        self.timestamp_column.as_ref().map(|s| s.as_str())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.numeric_columns.iter().any(|c| c == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }
}

/// Capability injected by the host application: anything that can turn an
/// external source (CSV, XLSX, ...) into a typed table. The core itself
/// never touches files.
pub trait DatasetLoader {
    fn load(&self, input: &str) -> ForecastResult<Dataset>;
}

fn parse_cell(raw: &str) -> Cell {
    let raw = raw.trim();
    if raw.is_empty() {
        return Cell::Null;
    }
    if let Ok(x) = raw.parse::<f64>() {
        return Cell::Number(x);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Cell::Timestamp(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Cell::Timestamp(ts);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Cell::Timestamp(d.and_hms_opt(0, 0, 0).expect("midnight"));
    }
    Cell::Text(raw.to_string())
}

/// Util for parsing a CSV with a header row into a dataset.
///
/// Cell types are inferred per value: number, then timestamp, then text;
/// blank cells become `Null`.
pub fn parse_csv(data: &str, sep: &str) -> ForecastResult<Dataset> {
    let mut lines = data.split("\n").filter(|l| l.len() != 0);
    let columns: Vec<String> = match lines.next() {
        Some(header) => header.split(sep).map(|c| c.trim().to_string()).collect(),
        None => Vec::new(),
    };
    let rows: Vec<Vec<Cell>> = lines
        .map(|l| l.split(sep).map(parse_cell).collect())
        .collect();
    Dataset::new(columns, rows)
}

/// `DatasetLoader` over in-memory CSV text, for tests and collaborators.
pub struct CsvLoader {
    pub sep: String,
}

impl DatasetLoader for CsvLoader {
    fn load(&self, input: &str) -> ForecastResult<Dataset> {
        parse_csv(input, &self.sep)
    }
}
