//! Tabular data model shared by every stage.
//!
//! A [`Dataset`] is a polars `DataFrame` plus a [`SemanticType`] tag per
//! column and a stable id per row. Tags are assigned once at ingestion so
//! stages branch on a closed enum instead of inspecting physical dtypes.
//! Row ids are the row positions at ingestion; they survive row filtering,
//! which keeps outlier indices recorded early in a run meaningful later on.

use crate::error::{ProcessingError, Result};
use crate::temporal::looks_like_date;
use crate::utils::{is_numeric_dtype, is_temporal_dtype};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How many non-missing text values are sampled to detect date columns.
pub const DATE_SAMPLE_SIZE: usize = 5;

/// Semantic type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Temporal,
    Boolean,
}

impl SemanticType {
    /// Lowercase name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
            Self::Temporal => "temporal",
            Self::Boolean => "boolean",
        }
    }
}

/// A type-tagged table with stable row identities.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    types: BTreeMap<String, SemanticType>,
    row_ids: Vec<usize>,
}

impl Dataset {
    /// Wrap a DataFrame, inferring a semantic type for every column.
    pub fn from_frame(frame: DataFrame) -> Result<Self> {
        let mut types = BTreeMap::new();
        for column in frame.get_columns() {
            let tag = infer_semantic_type(column.as_materialized_series())?;
            types.insert(column.name().to_string(), tag);
        }
        let row_ids = (0..frame.height()).collect();

        Ok(Self {
            frame,
            types,
            row_ids,
        })
    }

    /// Override the inferred tag of a column.
    pub fn with_type(mut self, column: &str, tag: SemanticType) -> Result<Self> {
        self.require(column)?;
        self.types.insert(column.to_string(), tag);
        Ok(self)
    }

    /// Borrow the underlying frame.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Consume the dataset, returning the frame.
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.frame.shape()
    }

    /// Stable ids of the current rows, in row order.
    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    /// Column names in frame order.
    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Tag of a column, if it exists.
    pub fn semantic_type(&self, name: &str) -> Option<SemanticType> {
        self.types.get(name).copied()
    }

    /// Names of the columns carrying `tag`, in frame order.
    pub fn columns_of_type(&self, tag: SemanticType) -> Vec<String> {
        self.column_names()
            .into_iter()
            .filter(|name| self.types.get(name) == Some(&tag))
            .collect()
    }

    /// Fail with `ColumnNotFound` unless the column exists.
    pub fn require(&self, name: &str) -> Result<SemanticType> {
        self.semantic_type(name)
            .ok_or_else(|| ProcessingError::ColumnNotFound(name.to_string()))
    }

    /// Fail unless the column exists and carries `tag`.
    pub fn require_type(&self, name: &str, tag: SemanticType) -> Result<()> {
        if self.require(name)? != tag {
            return Err(ProcessingError::UnsupportedType {
                column: name.to_string(),
                expected: tag.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Values of a numeric column as f64. NaN counts as missing.
    pub fn numeric_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.require_type(name, SemanticType::Numeric)?;
        let series = self.frame.column(name)?.as_materialized_series();
        let floats = series.cast(&DataType::Float64)?;
        Ok(floats
            .f64()?
            .into_iter()
            .map(|value| value.filter(|v| !v.is_nan()))
            .collect())
    }

    /// A numeric column as a Float64 series with NaN replaced by null.
    pub fn numeric_series(&self, name: &str) -> Result<Series> {
        Ok(Series::new(name.into(), self.numeric_values(name)?))
    }

    /// Values of any column rendered as text, missing stays `None`.
    pub fn text_values(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.require(name)?;
        let series = self.frame.column(name)?.as_materialized_series();
        let text = series.cast(&DataType::String)?;
        Ok(text
            .str()?
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    /// Number of missing cells in a column (NaN included for numerics).
    pub fn missing_count(&self, name: &str) -> Result<usize> {
        match self.require(name)? {
            SemanticType::Numeric => Ok(self
                .numeric_values(name)?
                .iter()
                .filter(|v| v.is_none())
                .count()),
            _ => Ok(self.frame.column(name)?.null_count()),
        }
    }

    /// Insert or replace a Float64 column tagged numeric. Non-finite values
    /// are stored as missing.
    pub fn set_numeric(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<()> {
        let values: Vec<Option<f64>> = values
            .into_iter()
            .map(|value| value.filter(|v| v.is_finite()))
            .collect();
        self.set_column(
            Series::new(name.into(), values),
            SemanticType::Numeric,
        )
    }

    /// Insert or replace a column. New columns are appended at the end.
    pub fn set_column(&mut self, series: Series, tag: SemanticType) -> Result<()> {
        if series.len() != self.height() && self.width() > 0 {
            return Err(ProcessingError::MalformedInput(format!(
                "column '{}' has {} values, dataset has {} rows",
                series.name(),
                series.len(),
                self.height()
            )));
        }
        let name = series.name().to_string();
        self.frame.with_column(series)?;
        self.types.insert(name, tag);
        Ok(())
    }

    /// Remove a column.
    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        self.require(name)?;
        self.frame.drop_in_place(name)?;
        self.types.remove(name);
        Ok(())
    }

    /// Keep only the rows whose mask entry is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Result<Dataset> {
        let mask = BooleanChunked::from_slice("mask".into(), keep);
        let frame = self.frame.filter(&mask)?;
        let row_ids = self
            .row_ids
            .iter()
            .zip(keep)
            .filter(|(_, keep)| **keep)
            .map(|(id, _)| *id)
            .collect();

        Ok(Dataset {
            frame,
            types: self.types.clone(),
            row_ids,
        })
    }
}

/// Assign a semantic type from the physical dtype. Text columns whose first
/// non-missing values all look like dates are tagged temporal.
fn infer_semantic_type(series: &Series) -> Result<SemanticType> {
    let dtype = series.dtype();
    if is_numeric_dtype(dtype) {
        return Ok(SemanticType::Numeric);
    }
    if is_temporal_dtype(dtype) {
        return Ok(SemanticType::Temporal);
    }
    if matches!(dtype, DataType::Boolean) {
        return Ok(SemanticType::Boolean);
    }
    if matches!(dtype, DataType::String) {
        let sample: Vec<&str> = series
            .str()?
            .into_iter()
            .flatten()
            .take(DATE_SAMPLE_SIZE)
            .collect();
        if !sample.is_empty() && sample.iter().all(|value| looks_like_date(value)) {
            return Ok(SemanticType::Temporal);
        }
    }
    Ok(SemanticType::Categorical)
}
