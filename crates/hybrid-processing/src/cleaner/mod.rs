//! Duplicate row removal.
//!
//! Duplicates are found with polars `unique_stable` over the selected
//! columns plus a row index, so surviving rows keep their original order and
//! row ids. NaN in a float column compares equal to a missing cell.

use crate::config::DuplicateKeep;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::types::{ActionType, StageLog};
use polars::prelude::*;
use tracing::{debug, info};

const ROW_INDEX: &str = "row";

/// Removes repeated rows.
pub struct DuplicateRemover;

impl DuplicateRemover {
    /// Remove duplicate rows, returning the deduplicated dataset and the
    /// number of rows removed.
    ///
    /// `subset` restricts the comparison to some columns (all columns when
    /// `None`); unknown names are skipped with a warning. `keep` chooses
    /// whether the first or last occurrence survives. Running it twice
    /// removes nothing the second time.
    pub fn dedupe(
        dataset: &Dataset,
        subset: Option<&[String]>,
        keep: DuplicateKeep,
        log: &mut StageLog,
    ) -> Result<(Dataset, usize)> {
        let columns: Vec<String> = match subset {
            Some(subset) => subset
                .iter()
                .filter(|column| match dataset.require(column) {
                    Ok(_) => true,
                    Err(e) => {
                        log.warn(&e);
                        false
                    }
                })
                .cloned()
                .collect(),
            None => dataset.column_names(),
        };

        let height = dataset.height();
        if columns.is_empty() || height < 2 {
            return Ok((dataset.clone(), 0));
        }

        // Key columns are renamed by position so the row index cannot clash
        // with a user column.
        let mut keys = Vec::with_capacity(columns.len());
        let mut key_names = Vec::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            let name = format!("key_{}", position);
            let mut key = comparison_key(dataset, column)?;
            key.rename(name.as_str().into());
            keys.push(key.into_column());
            key_names.push(name);
        }

        let strategy = match keep {
            DuplicateKeep::First => UniqueKeepStrategy::First,
            DuplicateKeep::Last => UniqueKeepStrategy::Last,
        };
        let survivors = DataFrame::new(keys)?
            .with_row_index(ROW_INDEX.into(), None)?
            .unique_stable(Some(key_names.as_slice()), strategy, None)?;

        let removed = height - survivors.height();
        debug!("Found {} duplicate rows on {} columns", removed, columns.len());
        if removed == 0 {
            return Ok((dataset.clone(), 0));
        }

        let mut keep_mask = vec![false; height];
        for row in survivors
            .column(ROW_INDEX)?
            .as_materialized_series()
            .idx()?
            .into_no_null_iter()
        {
            keep_mask[row as usize] = true;
        }

        let pct = removed as f64 / height as f64 * 100.0;
        info!("Removed {} duplicate rows ({:.1}%)", removed, pct);
        log.action(
            ActionType::DuplicatesRemoved,
            "dataset",
            format!("Removed {} duplicate rows ({:.1}%)", removed, pct),
        );

        Ok((dataset.filter_rows(&keep_mask)?, removed))
    }
}

/// Column as compared for equality. Float NaN becomes null.
fn comparison_key(dataset: &Dataset, column: &str) -> Result<Series> {
    let series = dataset.frame().column(column)?.as_materialized_series();
    if !series.dtype().is_float() {
        return Ok(series.clone());
    }

    let floats = series.cast(&DataType::Float64)?;
    let cleaned: Float64Chunked = floats
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect();
    Ok(cleaned.into_series())
}
