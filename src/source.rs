// 📥 Source Extracts - Raw rows keyed by header strings
// Rows arrive already parsed (header → cell); the CSV adapter below is the
// only file reader in the crate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

// ============================================================================
// CELL VALUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Empty,
}

impl CellValue {
    /// Text cell, or `Empty` when the text is blank
    pub fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(text.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Identifier text, trimmed. Whole numbers render without a fraction
    /// so a numeric `12345` and a text `"12345"` name the same donor.
    pub fn as_identifier(&self) -> Option<String> {
        let id = match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            CellValue::Number(n) if n.is_finite() => n.to_string(),
            _ => String::new(),
        };

        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// Non-negative monetary amount, or `None` when the cell is blank,
    /// unparseable or negative. Accepts `$1,250.00` style text.
    pub fn as_amount(&self) -> Option<f64> {
        let value = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .chars()
                    .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
                    .collect();
                cleaned.parse::<f64>().ok()?
            }
            CellValue::Bool(_) | CellValue::Empty => return None,
        };

        if value.is_finite() && value >= 0.0 {
            Some(value)
        } else {
            None
        }
    }

    /// Spreadsheet truthiness for flag columns
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Text(s) => {
                let t = s.trim().to_lowercase();
                !t.is_empty() && !matches!(t.as_str(), "false" | "no" | "n" | "0" | "f")
            }
            CellValue::Empty => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        CellValue::from_text(text)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

// ============================================================================
// SOURCE ROW / SOURCE
// ============================================================================

/// One row of one extract, keyed by the raw header strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    cells: BTreeMap<String, CellValue>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a cell
    pub fn with(mut self, header: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.insert(header.into(), value.into());
        self
    }

    pub fn insert(&mut self, header: impl Into<String>, value: CellValue) {
        self.cells.insert(header.into(), value);
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(|h| h.as_str())
    }
}

/// One extract: a name for logs and reports, its headers, and its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl Source {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<SourceRow>) -> Self {
        Source {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Build a source whose headers are the union of every row's keys,
    /// in first-seen order.
    pub fn from_rows(name: impl Into<String>, rows: Vec<SourceRow>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in &rows {
            for header in row.headers() {
                if !headers.iter().any(|h| h == header) {
                    headers.push(header.to_string());
                }
            }
        }

        Source::new(name, headers, rows)
    }

    /// Read a CSV extract. The first record is the header row; blank cells
    /// become `CellValue::Empty`, everything else stays text.
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let name = name.into();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("Failed to read header row of {}", name))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for (line_num, result) in rdr.records().enumerate() {
            let record = result.with_context(|| {
                format!("Failed to parse CSV line {} in {}", line_num + 2, name)
            })?;

            // A repeated header keeps the first column's cell
            let mut row = SourceRow::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                row.cells
                    .entry(header.clone())
                    .or_insert_with(|| CellValue::from_text(cell));
            }
            rows.push(row);
        }

        Ok(Source::new(name, headers, rows))
    }

    /// Open and read a CSV extract; the file name becomes the source name
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        Source::from_csv_reader(name, file)
    }
}

// ============================================================================
// TESTS
// ============================================================================
