//! Outlier treatment driven by a detection report.

use super::OutlierReport;
use crate::config::OutlierTreatmentMethod;
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::types::{ActionType, StageLog};
use crate::utils::{clip_values, group_partitions, present, quantile};
use tracing::info;

/// Lower percentile used for capping.
pub const CAP_LOWER_QUANTILE: f64 = 0.05;

/// Upper percentile used for capping.
pub const CAP_UPPER_QUANTILE: f64 = 0.95;

/// Applies a treatment to the columns named in an [`OutlierReport`].
pub struct OutlierTreatment;

impl OutlierTreatment {
    /// Treat the reported columns.
    ///
    /// - `Winsorize` clips to the IQR fences stored in the report, per group
    ///   when the report was grouped, and falls back to the 5th/95th
    ///   percentiles for columns without fences and for rows outside every
    ///   fenced group.
    /// - `Cap` clips to the 5th/95th percentiles.
    /// - `Remove` drops every row flagged by any method on any column.
    /// - `LogTransform` replaces values with `ln(1 + x)`.
    pub fn treat(
        dataset: &Dataset,
        method: OutlierTreatmentMethod,
        report: &OutlierReport,
        log: &mut StageLog,
    ) -> Result<Dataset> {
        if report.is_empty() {
            return Ok(dataset.clone());
        }

        if method == OutlierTreatmentMethod::Remove {
            return remove_flagged(dataset, report, log);
        }

        let mut treated = dataset.clone();
        for column in report.columns.keys() {
            let mut values = match treated.numeric_values(column) {
                Ok(values) => values,
                Err(e) => {
                    log.warn(&e);
                    continue;
                }
            };

            let changed = match method {
                OutlierTreatmentMethod::Winsorize => winsorize(&treated, column, &mut values, report)?,
                OutlierTreatmentMethod::Cap => cap(&mut values),
                OutlierTreatmentMethod::LogTransform => log_transform(column, &mut values, log),
                OutlierTreatmentMethod::Remove => 0,
            };

            treated.set_numeric(column, values)?;
            if changed > 0 {
                log.action(
                    ActionType::OutlierHandled,
                    column,
                    format!("{:?}: {} values changed", method, changed),
                );
            }
        }

        Ok(treated)
    }
}

fn remove_flagged(dataset: &Dataset, report: &OutlierReport, log: &mut StageLog) -> Result<Dataset> {
    let flagged = report.flagged_rows();
    let keep: Vec<bool> = dataset
        .row_ids()
        .iter()
        .map(|id| !flagged.contains(id))
        .collect();
    let removed = keep.iter().filter(|&&k| !k).count();

    if removed == 0 {
        return Ok(dataset.clone());
    }

    info!("Removing {} outlier rows", removed);
    log.action(
        ActionType::RowsRemoved,
        "dataset",
        format!("Removed {} rows flagged as outliers", removed),
    );
    dataset.filter_rows(&keep)
}

fn winsorize(
    dataset: &Dataset,
    column: &str,
    values: &mut [Option<f64>],
    report: &OutlierReport,
) -> Result<usize> {
    let fences = report.columns.get(column).and_then(|methods| {
        methods
            .values()
            .find(|result| result.bounds.is_some() || !result.group_bounds.is_empty())
    });

    let Some(fences) = fences else {
        return Ok(cap(values));
    };

    if let Some(bounds) = fences.bounds {
        return Ok(clip_values(values, bounds.lower, bounds.upper));
    }

    // Grouped fences: clip each partition with its own bounds. Rows without a
    // group key, or in a group that had no fences, get the column percentiles.
    let Some(group_by) = report.group_by.as_deref() else {
        return Ok(cap(values));
    };
    let keys = dataset.text_values(group_by)?;
    let fallback = percentile_bounds(values);
    let mut fenced = vec![false; values.len()];
    let mut changed = 0;
    for (key, rows) in group_partitions(&keys) {
        let Some(bounds) = fences.group_bounds.get(&key) else {
            continue;
        };
        for row in rows {
            fenced[row] = true;
            changed += clip_row(values, row, bounds.lower, bounds.upper);
        }
    }
    if let Some((lower, upper)) = fallback {
        for row in (0..values.len()).filter(|&row| !fenced[row]) {
            changed += clip_row(values, row, lower, upper);
        }
    }
    Ok(changed)
}

fn clip_row(values: &mut [Option<f64>], row: usize, lower: f64, upper: f64) -> usize {
    clip_values(&mut values[row..=row], lower, upper)
}

/// 5th and 95th percentiles of the present values.
fn percentile_bounds(values: &[Option<f64>]) -> Option<(f64, f64)> {
    let observed = present(values);
    Some((
        quantile(&observed, CAP_LOWER_QUANTILE)?,
        quantile(&observed, CAP_UPPER_QUANTILE)?,
    ))
}

fn cap(values: &mut [Option<f64>]) -> usize {
    match percentile_bounds(values) {
        Some((lower, upper)) => clip_values(values, lower, upper),
        None => 0,
    }
}

fn log_transform(column: &str, values: &mut [Option<f64>], log: &mut StageLog) -> usize {
    if values.iter().flatten().any(|&v| v <= -1.0) {
        log.warn(&ProcessingError::TransformFailure {
            column: column.to_string(),
            transform: "log1p".to_string(),
            reason: "values at or below -1 become missing".to_string(),
        });
    }

    let mut changed = 0;
    for value in values.iter_mut() {
        if let Some(v) = *value {
            *value = Some(v.ln_1p()).filter(|t| t.is_finite());
            changed += 1;
        }
    }
    changed
}
