//! Imputation module for handling missing values.
//!
//! [`MissingValueImputer`] runs in two passes: columns whose missing ratio
//! exceeds the threshold are dropped first, then the remaining selected
//! columns are filled with the configured strategy:
//! - statistical fills (mean, median, mode, group mean, interpolation)
//! - univariate KNN imputation
//! - dropping incomplete rows

mod knn;
mod statistical;

pub use knn::{DEFAULT_NEIGHBORS, KnnImputer};
pub use statistical::StatisticalImputer;

use crate::config::MissingStrategy;
use crate::dataset::{Dataset, SemanticType};
use crate::error::{ProcessingError, Result};
use crate::types::{ActionType, StageLog};
use crate::utils::group_partitions;
use polars::prelude::*;
use tracing::{debug, info};

/// Fills or drops missing values.
pub struct MissingValueImputer;

impl MissingValueImputer {
    /// Impute the selected columns.
    ///
    /// `columns` defaults to every numeric column except `group_by`. The
    /// `Mode` strategy also accepts explicitly listed categorical columns.
    pub fn impute(
        dataset: &Dataset,
        strategy: MissingStrategy,
        columns: Option<&[String]>,
        group_by: Option<&str>,
        threshold: f64,
        log: &mut StageLog,
    ) -> Result<Dataset> {
        let selected: Vec<String> = match columns {
            Some(columns) => columns.to_vec(),
            None => dataset
                .columns_of_type(SemanticType::Numeric)
                .into_iter()
                .filter(|name| Some(name.as_str()) != group_by)
                .collect(),
        };

        let mut imputed = dataset.clone();
        let rows = dataset.height();

        // Pass 1: drop columns above the missing threshold.
        let mut to_fill = Vec::new();
        for column in selected {
            let missing = match imputed.missing_count(&column) {
                Ok(missing) => missing,
                Err(e) => {
                    log.warn(&e);
                    continue;
                }
            };
            if missing == 0 || rows == 0 {
                continue;
            }

            let ratio = missing as f64 / rows as f64;
            if ratio > threshold {
                imputed.drop_column(&column)?;
                info!("Dropped '{}' ({:.1}% missing)", column, ratio * 100.0);
                log.action(
                    ActionType::ColumnRemoved,
                    &column,
                    format!(
                        "Dropped column with {:.1}% missing values (threshold {:.1}%)",
                        ratio * 100.0,
                        threshold * 100.0
                    ),
                );
            } else {
                to_fill.push(column);
            }
        }

        if to_fill.is_empty() {
            return Ok(imputed);
        }
        debug!("Imputing {} columns with {:?}", to_fill.len(), strategy);

        // Pass 2: fill.
        match strategy {
            MissingStrategy::Drop => drop_incomplete_rows(&imputed, &to_fill, log),
            MissingStrategy::GroupMean => {
                let group_by = group_by.ok_or_else(|| {
                    ProcessingError::MalformedInput(
                        "group_mean imputation needs a group_by column".to_string(),
                    )
                })?;
                let groups = group_partitions(&imputed.text_values(group_by)?);

                for column in &to_fill {
                    let Some(series) = numeric_or_warn(&imputed, column, log) else {
                        continue;
                    };
                    let (filled, empty_groups) =
                        StatisticalImputer::fill_group_mean(&series, &groups)?;
                    for key in empty_groups {
                        log.warn_message(
                            "NO_VALID_VALUES",
                            Some(column),
                            format!(
                                "group '{}' has no values in '{}'; its rows stay missing",
                                key, column
                            ),
                        );
                    }
                    let count = series.null_count() - filled.null_count();
                    imputed.set_column(filled, SemanticType::Numeric)?;
                    record_fill(log, column, count, "group mean");
                }
                Ok(imputed)
            }
            _ => {
                for column in &to_fill {
                    if strategy == MissingStrategy::Mode
                        && imputed.semantic_type(column) == Some(SemanticType::Categorical)
                    {
                        fill_text_mode(&mut imputed, column, log)?;
                        continue;
                    }

                    let Some(series) = numeric_or_warn(&imputed, column, log) else {
                        continue;
                    };
                    let filled = match strategy {
                        MissingStrategy::Mean => StatisticalImputer::fill_mean(&series)?,
                        MissingStrategy::Median => StatisticalImputer::fill_median(&series)?,
                        MissingStrategy::Mode => StatisticalImputer::fill_mode(&series)?,
                        MissingStrategy::Knn => KnnImputer::default().fit_transform(&series)?,
                        MissingStrategy::Interpolate => {
                            Some(StatisticalImputer::interpolate(&series)?)
                        }
                        MissingStrategy::Drop | MissingStrategy::GroupMean => None,
                    };

                    match filled {
                        Some(filled) => {
                            let count = series.null_count() - filled.null_count();
                            imputed.set_column(filled, SemanticType::Numeric)?;
                            record_fill(log, column, count, strategy_name(strategy));
                        }
                        None => log.warn(&ProcessingError::NoValidValues(column.clone())),
                    }
                }
                Ok(imputed)
            }
        }
    }
}

fn numeric_or_warn(dataset: &Dataset, column: &str, log: &mut StageLog) -> Option<Series> {
    match dataset.numeric_series(column) {
        Ok(values) => Some(values),
        Err(e) => {
            log.warn(&e);
            None
        }
    }
}

fn fill_text_mode(dataset: &mut Dataset, column: &str, log: &mut StageLog) -> Result<()> {
    let mut values = dataset.text_values(column)?;
    match StatisticalImputer::fill_mode_text(&mut values) {
        Some(filled) => {
            dataset.set_column(
                Series::new(column.into(), values),
                SemanticType::Categorical,
            )?;
            record_fill(log, column, filled, "mode");
        }
        None => log.warn(&ProcessingError::NoValidValues(column.to_string())),
    }
    Ok(())
}

fn drop_incomplete_rows(dataset: &Dataset, columns: &[String], log: &mut StageLog) -> Result<Dataset> {
    let mut keep = vec![true; dataset.height()];
    for column in columns {
        let values = dataset.text_values(column)?;
        let numeric = dataset.numeric_values(column).ok();
        for row in 0..keep.len() {
            let missing = match &numeric {
                Some(numeric) => numeric[row].is_none(),
                None => values[row].is_none(),
            };
            if missing {
                keep[row] = false;
            }
        }
    }

    let removed = keep.iter().filter(|&&k| !k).count();
    if removed == 0 {
        return Ok(dataset.clone());
    }
    log.action(
        ActionType::RowsRemoved,
        "dataset",
        format!("Dropped {} rows with missing values", removed),
    );
    dataset.filter_rows(&keep)
}

fn record_fill(log: &mut StageLog, column: &str, filled: usize, method: &str) {
    if filled > 0 {
        log.action(
            ActionType::ValueImputed,
            column,
            format!("Filled {} missing values with {}", filled, method),
        );
    }
}

fn strategy_name(strategy: MissingStrategy) -> &'static str {
    match strategy {
        MissingStrategy::Drop => "drop",
        MissingStrategy::Mean => "mean",
        MissingStrategy::Median => "median",
        MissingStrategy::Mode => "mode",
        MissingStrategy::GroupMean => "group mean",
        MissingStrategy::Knn => "KNN (k=5)",
        MissingStrategy::Interpolate => "linear interpolation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStage;

    fn impute(
        df: DataFrame,
        strategy: MissingStrategy,
        columns: Option<&[String]>,
        group_by: Option<&str>,
    ) -> (Dataset, StageLog) {
        let dataset = Dataset::from_frame(df).unwrap();
        let mut log = StageLog::new(PipelineStage::Imputation);
        let imputed =
            MissingValueImputer::impute(&dataset, strategy, columns, group_by, 0.5, &mut log)
                .unwrap();
        (imputed, log)
    }

    #[test]
    fn test_column_above_threshold_is_dropped() {
        let df = df![
            "sparse" => [Some(1.0), None, None, None, Some(2.0)],
            "dense" => [Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)],
        ]
        .unwrap();
        let (imputed, log) = impute(df, MissingStrategy::Mean, None, None);

        assert!(!imputed.has_column("sparse"));
        assert_eq!(imputed.missing_count("dense").unwrap(), 0);
        assert_eq!(log.actions()[0].action_type, ActionType::ColumnRemoved);
    }

    #[test]
    fn test_ratio_at_threshold_is_filled() {
        let df = df!["half" => [Some(1.0), None, Some(3.0), None]].unwrap();
        let (imputed, _) = impute(df, MissingStrategy::Median, None, None);

        assert_eq!(
            imputed.numeric_values("half").unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0), Some(2.0)]
        );
    }

    #[test]
    fn test_group_by_column_is_not_imputed_by_default() {
        let df = df![
            "store" => [Some(1i64), Some(1), None, Some(2)],
            "sales" => [Some(10.0), None, Some(30.0), Some(40.0)],
        ]
        .unwrap();
        let (imputed, _) = impute(df, MissingStrategy::GroupMean, None, Some("store"));

        assert_eq!(imputed.missing_count("store").unwrap(), 1);
        assert_eq!(imputed.numeric_values("sales").unwrap()[1], Some(10.0));
    }

    #[test]
    fn test_group_mean_empty_group_warns() {
        let df = df![
            "g" => ["a", "a", "b", "a"],
            "v" => [Some(2.0), None, None, Some(4.0)],
        ]
        .unwrap();
        let (imputed, log) = impute(df, MissingStrategy::GroupMean, None, Some("g"));

        assert_eq!(
            imputed.numeric_values("v").unwrap(),
            vec![Some(2.0), Some(3.0), None, Some(4.0)]
        );
        assert_eq!(log.warnings()[0].code, "NO_VALID_VALUES");
    }

    #[test]
    fn test_mode_fills_explicit_text_column() {
        let df = df!["city" => [Some("Lyon"), None, Some("Paris"), Some("Lyon")]].unwrap();
        let columns = vec!["city".to_string()];
        let (imputed, _) = impute(df, MissingStrategy::Mode, Some(&columns), None);

        assert_eq!(
            imputed.text_values("city").unwrap()[1].as_deref(),
            Some("Lyon")
        );
        assert_eq!(
            imputed.semantic_type("city"),
            Some(SemanticType::Categorical)
        );
    }

    #[test]
    fn test_drop_removes_incomplete_rows() {
        let df = df![
            "a" => [Some(1.0), None, Some(3.0), Some(4.0)],
            "b" => [Some(1.0), Some(2.0), Some(3.0), None],
        ]
        .unwrap();
        let (imputed, log) = impute(df, MissingStrategy::Drop, None, None);

        assert_eq!(imputed.height(), 2);
        assert_eq!(imputed.row_ids(), &[0, 2]);
        assert_eq!(log.actions()[0].action_type, ActionType::RowsRemoved);
    }

    #[test]
    fn test_knn_and_interpolate() {
        let df = df!["v" => [Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)]].unwrap();
        let (imputed, _) = impute(df.clone(), MissingStrategy::Interpolate, None, None);
        assert_eq!(imputed.numeric_values("v").unwrap()[2], Some(3.0));

        let (imputed, _) = impute(df, MissingStrategy::Knn, None, None);
        assert_eq!(imputed.numeric_values("v").unwrap()[2], Some(3.0));
    }

    #[test]
    fn test_unknown_and_non_numeric_columns_warn() {
        let df = df![
            "city" => [Some("a"), None, Some("b")],
            "v" => [Some(1.0), None, Some(3.0)],
        ]
        .unwrap();
        let columns = vec!["city".to_string(), "ghost".to_string(), "v".to_string()];
        let (imputed, log) = impute(df, MissingStrategy::Mean, Some(&columns), None);

        let codes: Vec<&str> = log.warnings().iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["COLUMN_NOT_FOUND", "UNSUPPORTED_TYPE"]);
        assert_eq!(imputed.numeric_values("v").unwrap()[1], Some(2.0));
        assert_eq!(imputed.missing_count("city").unwrap(), 1);
    }
}
