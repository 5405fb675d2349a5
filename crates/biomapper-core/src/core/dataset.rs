// biomapper-core/src/core/dataset.rs
// ============================================================================
// Module: Biomapper Dataset Model
// Description: Ordered record collections addressed by dataset keys.
// Purpose: Provide the immutable tabular unit actions read and produce.
// Dependencies: crate::core::{error, value}, serde
// ============================================================================

//! ## Overview
//! A dataset is an ordered sequence of records sharing one stable column
//! set. Datasets are immutable once inserted into the execution context;
//! transformations always emit new datasets under new keys. Rows that omit
//! a column carry an explicit null so the column set stays uniform.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::value::CellValue;

// ============================================================================
// SECTION: Records
// ============================================================================

/// One dataset row: column name to cell value.
pub type Record = BTreeMap<String, CellValue>;

// ============================================================================
// SECTION: Dataset
// ============================================================================

/// Ordered collection of records with a stable column set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Dataset {
    /// Column names in declaration order.
    columns: Vec<String>,
    /// Rows in insertion order.
    rows: Vec<Record>,
}

impl Dataset {
    /// Creates an empty dataset with the given column set.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// Creates a dataset from prepared rows.
    ///
    /// Missing columns are filled with null; columns absent from the
    /// declared set are rejected to keep the column set stable.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Internal`] error when a row carries an
    /// undeclared column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Record>) -> Result<Self, EngineError> {
        let mut dataset = Self::new(columns);
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Appends one row, normalizing it to the declared column set.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Internal`] error when the row carries an
    /// undeclared column.
    pub fn push_row(&mut self, mut row: Record) -> Result<(), EngineError> {
        for column in row.keys() {
            if !self.columns.iter().any(|declared| declared == column) {
                return Err(EngineError::new(
                    ErrorKind::Internal,
                    format!("row carries undeclared column: {column}"),
                ));
            }
        }
        for column in &self.columns {
            row.entry(column.clone()).or_insert(CellValue::Null);
        }
        self.rows.push(row);
        Ok(())
    }

    /// Returns the column names in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true when the column is declared.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|declared| declared == column)
    }

    /// Requires the column to be declared.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::MissingColumn`] error naming the column.
    pub fn require_column(&self, column: &str) -> Result<(), EngineError> {
        if self.has_column(column) {
            return Ok(());
        }
        Err(EngineError::new(
            ErrorKind::MissingColumn,
            format!("column not found: {column} (available: {})", self.columns.join(", ")),
        ))
    }

    /// Iterates one column's cells in row order.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a CellValue> {
        self.rows.iter().map(move |row| row.get(column).unwrap_or(&CellValue::Null))
    }

    /// Returns a dataset with the same columns and the given subset of rows.
    #[must_use]
    pub fn with_rows(&self, rows: Vec<Record>) -> Self {
        Self { columns: self.columns.clone(), rows }
    }

    /// Returns a dataset extended with extra declared columns.
    ///
    /// Existing rows carry null for the new columns; duplicates are
    /// ignored.
    #[must_use]
    pub fn with_additional_columns(&self, extra: &[String]) -> Self {
        let mut columns = self.columns.clone();
        for column in extra {
            if !columns.iter().any(|declared| declared == column) {
                columns.push(column.clone());
            }
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut copy = row.clone();
                for column in &columns {
                    copy.entry(column.clone()).or_insert(CellValue::Null);
                }
                copy
            })
            .collect();
        Self { columns, rows }
    }
}
