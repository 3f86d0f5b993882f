//! Source collaborator contract.
//!
//! The statistics database is reached through [`Source`], which runs one
//! query and hands back every row fully materialized as [`SourceRecord`]s.
//! A failed query or a row that cannot be read yields an error and no rows,
//! so a partially collected snapshot can never be built.

use crate::errors::{Result, StatsError};
use async_trait::async_trait;

/// One column value as read from the source
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
}

impl Cell {
    fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "NULL",
            Cell::Text(_) => "text",
            Cell::Int(_) => "integer",
            Cell::Float(_) => "float",
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// A fully materialized source row with positional, typed accessors
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRecord {
    cells: Vec<Cell>,
}

impl SourceRecord {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn cell(&self, index: usize) -> std::result::Result<&Cell, StatsError> {
        self.cells.get(index).ok_or(StatsError::MissingColumn {
            index,
            len: self.cells.len(),
        })
    }

    /// Non-null text column
    pub fn text(&self, index: usize) -> std::result::Result<String, StatsError> {
        match self.cell(index)? {
            Cell::Text(value) => Ok(value.clone()),
            Cell::Null => Err(StatsError::UnexpectedNull { index }),
            other => Err(StatsError::ColumnType {
                index,
                expected: "text",
                found: other.type_name(),
            }),
        }
    }

    /// Non-null integer column
    pub fn int(&self, index: usize) -> std::result::Result<i64, StatsError> {
        match self.cell(index)? {
            Cell::Int(value) => Ok(*value),
            Cell::Null => Err(StatsError::UnexpectedNull { index }),
            other => Err(StatsError::ColumnType {
                index,
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    /// Non-null numeric column; integers widen to `f64`
    pub fn float(&self, index: usize) -> std::result::Result<f64, StatsError> {
        self.nullable_float(index)?
            .ok_or(StatsError::UnexpectedNull { index })
    }

    /// Nullable numeric column; integers widen to `f64`
    pub fn nullable_float(&self, index: usize) -> std::result::Result<Option<f64>, StatsError> {
        match self.cell(index)? {
            Cell::Float(value) => Ok(Some(*value)),
            Cell::Int(value) => Ok(Some(*value as f64)),
            Cell::Null => Ok(None),
            other => Err(StatsError::ColumnType {
                index,
                expected: "float",
                found: other.type_name(),
            }),
        }
    }

    /// Nullable numeric column with SQL NULL coalesced to zero
    pub fn float_or_zero(&self, index: usize) -> std::result::Result<f64, StatsError> {
        Ok(self.nullable_float(index)?.unwrap_or(0.0))
    }
}

impl From<Vec<Cell>> for SourceRecord {
    fn from(cells: Vec<Cell>) -> Self {
        Self::new(cells)
    }
}

/// The statistics database a collector reads from
#[async_trait]
pub trait Source: Send {
    /// Run `query` and return every row, or an error and no rows
    async fn fetch(&mut self, query: &str) -> Result<Vec<SourceRecord>>;

    /// Release the underlying connection
    async fn close(&mut self) -> Result<()>;
}
