//! Column tables exchanged with physics stages.
//!
//! A gd table is plain text: a `#` header naming the columns as
//! `label [unit]`, then whitespace separated rows. Lines starting with `!` or
//! `*` are comments.

use crate::volume::{CubeError, VoxelCube};

use std::{fmt::Write as _, fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("column {column} out of range, table has {columns} columns")]
    NoSuchColumn { column: usize, columns: usize },

    #[error("lookup table needs at least two points")]
    TooFewPoints,

    #[error("lookup table x values must be finite and strictly increasing (point {index})")]
    NotIncreasing { index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub label: String,
    pub unit: Option<String>,
}

impl Column {
    pub fn new(label: impl Into<String>, unit: Option<&str>) -> Self {
        Self {
            label: label.into(),
            unit: unit.map(str::to_string),
        }
    }
}

/// Rows of `(x, y1..yn)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GdTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<f64>>,
}

impl GdTable {
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut table = GdTable::default();
        let mut width = None;

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('!') || trimmed.starts_with('*') {
                continue;
            }
            if let Some(header) = trimmed.strip_prefix('#') {
                if table.columns.is_empty() {
                    table.columns = parse_columns(header);
                }
                continue;
            }

            let row = trimmed
                .split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|_| TableError::Parse {
                        line: line_number,
                        message: format!("'{}' is not a number", token),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let expected = *width.get_or_insert(row.len());
            if row.len() != expected {
                return Err(TableError::Parse {
                    line: line_number,
                    message: format!("row has {} values, expected {}", row.len(), expected),
                });
            }
            table.rows.push(row);
        }

        if let Some(width) = width {
            if !table.columns.is_empty() && table.columns.len() != width {
                log::warn!(
                    "gd header names {} columns but rows hold {}",
                    table.columns.len(),
                    width
                );
            }
        }
        Ok(table)
    }

    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if !self.columns.is_empty() {
            let header: Vec<String> = self
                .columns
                .iter()
                .map(|column| match &column.unit {
                    Some(unit) => format!("{} [{}]", column.label, unit),
                    None => column.label.clone(),
                })
                .collect();
            let _ = writeln!(out, "# {}", header.join("  "));
        }
        for row in &self.rows {
            let values: Vec<String> = row.iter().map(|value| format!("{:e}", value)).collect();
            let _ = writeln!(out, "{}", values.join(" "));
        }
        out
    }

    /// Number of columns, taken from the rows when present.
    pub fn width(&self) -> usize {
        self.rows.first().map_or(self.columns.len(), Vec::len)
    }

    pub fn column(&self, column: usize) -> Result<Vec<f64>, TableError> {
        let columns = self.width();
        if column >= columns {
            return Err(TableError::NoSuchColumn { column, columns });
        }
        Ok(self.rows.iter().map(|row| row[column]).collect())
    }
}

fn parse_columns(header: &str) -> Vec<Column> {
    let mut columns = Vec::new();
    let mut tokens = header.split_whitespace().peekable();
    while let Some(label) = tokens.next() {
        let unit = match tokens.peek() {
            Some(next) if next.starts_with('[') && next.ends_with(']') => tokens
                .next()
                .map(|unit| unit.trim_start_matches('[').trim_end_matches(']')),
            _ => None,
        };
        columns.push(Column::new(label, unit));
    }
    columns
}

/// Piecewise linear `y(x)`, clamped to the end values outside the knots.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    points: Vec<(f64, f64)>,
}

impl LookupTable {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, TableError> {
        if points.len() < 2 {
            return Err(TableError::TooFewPoints);
        }
        if let Some(index) = points.iter().position(|(x, y)| !x.is_finite() || y.is_nan()) {
            return Err(TableError::NotIncreasing { index });
        }
        if let Some(index) = points.windows(2).position(|pair| pair[1].0 <= pair[0].0) {
            return Err(TableError::NotIncreasing { index: index + 1 });
        }
        Ok(Self { points })
    }

    /// Uses column 0 as x and `column` as y.
    pub fn from_gd_table(table: &GdTable, column: usize) -> Result<Self, TableError> {
        let x = table.column(0)?;
        let y = table.column(column)?;
        Self::new(x.into_iter().zip(y).collect())
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn apply(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let points = &self.points;
        let (first, last) = (points[0], points[points.len() - 1]);
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        // first index with knot x > value; never 0 or len here
        let upper = points.partition_point(|&(knot, _)| knot <= x);
        let (x0, y0) = points[upper - 1];
        let (x1, y1) = points[upper];
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

impl VoxelCube {
    /// New `f32` cube with every voxel mapped through `table`.
    pub fn apply_lookup(&self, table: &LookupTable) -> Result<VoxelCube, CubeError> {
        let (cast, _) = self.cast(crate::data_type::DataType::Float64, 1.0, 0.0);
        let array = cast
            .array::<f64>()
            .ok_or_else(|| CubeError::Format("cast to f64 lost its type".to_string()))?
            .mapv(|value| table.apply(value) as f32);
        Ok(VoxelCube::new(array, self.frame().clone())?
            .with_byte_order(self.byte_order())
            .with_metadata(self.metadata().clone()))
    }
}
