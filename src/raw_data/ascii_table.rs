//! # ASCII scan tables
//!
//! Structured, column-typed view of the data block of a NICOS `.dat` file.
//!
//! The column names come from the `Scan data` section of the header. Column types are either
//! given explicitly ([`ArrayFormat::Structured`](crate::instrument::ArrayFormat::Structured))
//! or inferred from the first data row with [`cell_kind`]:
//!
//! * `^[+-]?\d+$` → 8-byte integer,
//! * a float literal → 8-byte float,
//! * anything else → fixed-width string, the width being the length of the first-row cell.
//!   Longer cells in later rows are truncated to that width.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::FileNumber;
use crate::metadata::classifier::{cell_kind, CellKind};
use crate::nredux_errors::ReductionError;

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Declared name and storage type of one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: CellKind,
}

impl ColumnSpec {
    pub fn new(name: &str, kind: CellKind) -> Self {
        ColumnSpec {
            name: name.to_string(),
            kind,
        }
    }
}

/// Typed storage of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    I64(Vec<i64>),
    F64(Vec<f64>),
    Str { width: usize, values: Vec<String> },
}

impl Column {
    fn with_kind(kind: CellKind, capacity: usize) -> Self {
        match kind {
            CellKind::Integer => Column::I64(Vec::with_capacity(capacity)),
            CellKind::Float => Column::F64(Vec::with_capacity(capacity)),
            CellKind::Text(width) => Column::Str {
                width,
                values: Vec::with_capacity(capacity),
            },
        }
    }

    fn push(&mut self, cell: &str) -> Result<(), ReductionError> {
        let bad_cell =
            |kind: &str| ReductionError::TableParseError(format!("'{cell}' is not {kind}"));
        match self {
            Column::I64(v) => v.push(cell.parse().map_err(|_| bad_cell("an integer"))?),
            Column::F64(v) => v.push(cell.parse().map_err(|_| bad_cell("a float"))?),
            Column::Str { width, values } => values.push(truncate(cell, *width).to_string()),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self {
            Column::I64(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::Str { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of an integer or float column.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::I64(v) => Some(v.iter().map(|&i| i as f64).collect()),
            Column::F64(v) => Some(v.clone()),
            Column::Str { .. } => None,
        }
    }

    fn cell_text(&self, row: usize) -> Option<String> {
        match self {
            Column::I64(v) => v.get(row).map(|i| i.to_string()),
            Column::F64(v) => v.get(row).map(|f| f.to_string()),
            Column::Str { values, .. } => values.get(row).cloned(),
        }
    }
}

/// Longest prefix of `cell` fitting in `width` bytes, cut on a character boundary.
fn truncate(cell: &str, width: usize) -> &str {
    if cell.len() <= width {
        return cell;
    }
    let mut end = width;
    while !cell.is_char_boundary(end) {
        end -= 1;
    }
    &cell[..end]
}

/// Rows of an ASCII scan, one typed column per declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredTable {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl StructuredTable {
    /// Column specification inferred from the first data row.
    ///
    /// Return
    /// ----------
    /// * One [`ColumnSpec`] per name, or `TableParseError` when names and cells disagree in
    ///   number.
    pub fn infer_columns(
        first_row: &[&str],
        names: &[String],
    ) -> Result<Vec<ColumnSpec>, ReductionError> {
        if first_row.len() != names.len() {
            return Err(ReductionError::TableParseError(format!(
                "{} column names for {} cells in the first row",
                names.len(),
                first_row.len()
            )));
        }
        Ok(names
            .iter()
            .zip(first_row)
            .map(|(name, cell)| ColumnSpec::new(name, cell_kind(cell)))
            .collect())
    }

    /// Build a table from pre-split rows.
    pub fn from_rows(rows: &[Vec<&str>], specs: &[ColumnSpec]) -> Result<Self, ReductionError> {
        let mut columns: Vec<Column> = specs
            .iter()
            .map(|s| Column::with_kind(s.kind, rows.len()))
            .collect();

        for row in rows {
            if row.len() != specs.len() {
                return Err(ReductionError::TableParseError(format!(
                    "row of {} cells for {} columns",
                    row.len(),
                    specs.len()
                )));
            }
            for (column, cell) in columns.iter_mut().zip(row) {
                column.push(cell)?;
            }
        }

        Ok(StructuredTable {
            names: specs.iter().map(|s| s.name.clone()).collect(),
            columns,
            rows: rows.len(),
        })
    }

    /// Read the data block of an ASCII scan file.
    ///
    /// Arguments
    /// -----------------
    /// * `text` – whole file content; blank lines and `#` comment lines are skipped.
    /// * `names` – column names from the `Scan data` header section.
    /// * `specs` – explicit column specification; inferred from the first row when `None`.
    pub fn parse(
        text: &str,
        names: &[String],
        specs: Option<&[ColumnSpec]>,
    ) -> Result<Self, ReductionError> {
        let rows: Vec<Vec<&str>> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.split_whitespace().collect())
            .collect();

        let specs = match (specs, rows.first()) {
            (Some(specs), _) => specs.to_vec(),
            (None, Some(first)) => Self::infer_columns(first, names)?,
            (None, None) => names
                .iter()
                .map(|n| ColumnSpec::new(n, CellKind::Float))
                .collect(),
        };
        Self::from_rows(&rows, &specs)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    /// Detector file numbers referenced by the scan.
    ///
    /// The last column of a NICOS scan holds the detector file name of every point; the first
    /// run of digits in it is the file number.
    pub fn file_numbers(&self) -> Result<Vec<FileNumber>, ReductionError> {
        let Some(last) = self.columns.last() else {
            return Err(ReductionError::TableParseError("table has no columns".into()));
        };
        (0..self.rows)
            .map(|row| {
                let text = last.cell_text(row).unwrap_or_default();
                DIGITS_RE
                    .find(&text)
                    .and_then(|m| m.as_str().parse::<FileNumber>().ok())
                    .ok_or_else(|| {
                        ReductionError::TableParseError(format!("no file number in '{text}'"))
                    })
            })
            .collect()
    }
}
