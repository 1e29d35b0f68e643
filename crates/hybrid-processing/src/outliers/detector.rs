//! Outlier detection by IQR fences, z-scores and isolation forest.

use super::isolation_forest::{CONTAMINATION, IsolationForest};
use super::{IqrBounds, MethodOutliers, OutlierReport};
use crate::config::OutlierMethod;
use crate::dataset::{Dataset, SemanticType};
use crate::error::{ProcessingError, Result};
use crate::types::{ActionType, StageLog};
use crate::utils::{group_partitions, mean, present, quantile, std_dev, values_at};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Fence width in interquartile ranges.
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Absolute z-score above which a value is flagged.
pub const ZSCORE_THRESHOLD: f64 = 3.0;

/// Flags anomalous values per column.
pub struct OutlierDetector;

impl OutlierDetector {
    /// Run every method in `methods` on each column.
    ///
    /// `columns` defaults to all numeric columns except `group_by`. Columns
    /// that are missing or not numeric are skipped with a warning. With
    /// `group_by`, IQR fences and z-scores are computed per partition and
    /// rows without a group key are never flagged; the isolation forest
    /// always sees the whole column.
    pub fn detect(
        dataset: &Dataset,
        columns: Option<&[String]>,
        methods: &[OutlierMethod],
        group_by: Option<&str>,
        log: &mut StageLog,
    ) -> Result<OutlierReport> {
        let columns = match columns {
            Some(columns) => columns.to_vec(),
            None => dataset
                .columns_of_type(SemanticType::Numeric)
                .into_iter()
                .filter(|name| Some(name.as_str()) != group_by)
                .collect(),
        };

        let groups = match group_by {
            Some(group_by) => Some(group_partitions(&dataset.text_values(group_by)?)),
            None => None,
        };

        info!(
            "Detecting outliers in {} columns with {:?}",
            columns.len(),
            methods
        );

        let mut report = OutlierReport {
            group_by: group_by.map(str::to_string),
            ..Default::default()
        };
        let row_ids = dataset.row_ids();
        let total_rows = dataset.height();

        for column in &columns {
            let values = match dataset.numeric_values(column) {
                Ok(values) => values,
                Err(e) => {
                    log.warn(&e);
                    continue;
                }
            };

            for method in methods {
                let mut result = match (method, &groups) {
                    (OutlierMethod::Iqr, None) => iqr_global(&values),
                    (OutlierMethod::Iqr, Some(groups)) => iqr_grouped(&values, groups),
                    (OutlierMethod::ZScore, None) => match zscore_global(&values) {
                        Ok(flags) => Flags::rows(flags),
                        Err(e) => {
                            log.warn(&e.with_column(column));
                            Flags::rows(Vec::new())
                        }
                    },
                    (OutlierMethod::ZScore, Some(groups)) => {
                        let (positions, degenerate) = zscore_grouped(&values, groups);
                        for key in degenerate {
                            log.warn_message(
                                "STATISTICAL_DEGENERACY",
                                Some(column),
                                format!(
                                    "group '{}' of '{}' has zero or undefined standard deviation; z-score skipped",
                                    key, column
                                ),
                            );
                        }
                        Flags::rows(positions)
                    }
                    (OutlierMethod::IsolationForest, _) => {
                        Flags::rows(isolation_forest(&values))
                    }
                };

                let ids: Vec<usize> = result.positions.iter().map(|&row| row_ids[row]).collect();
                let mut outcome = MethodOutliers::from_rows(ids, total_rows);
                outcome.bounds = result.bounds.take();
                outcome.group_bounds = std::mem::take(&mut result.group_bounds);

                debug!(
                    "{} {}: {} outliers ({:.2}%)",
                    column,
                    method.as_str(),
                    outcome.count,
                    outcome.percentage
                );
                if outcome.count > 0 {
                    log.action(
                        ActionType::OutliersDetected,
                        column,
                        format!(
                            "{}: {} outliers ({:.2}%)",
                            method.as_str(),
                            outcome.count,
                            outcome.percentage
                        ),
                    );
                }
                report.insert(column, *method, outcome);
            }
        }

        Ok(report)
    }
}

/// Flagged row positions plus any fences that produced them.
#[derive(Default)]
struct Flags {
    positions: Vec<usize>,
    bounds: Option<IqrBounds>,
    group_bounds: BTreeMap<String, IqrBounds>,
}

impl Flags {
    fn rows(positions: Vec<usize>) -> Self {
        Self {
            positions,
            ..Default::default()
        }
    }
}

/// IQR fences of a set of values.
pub(crate) fn iqr_bounds(values: &[f64]) -> Option<IqrBounds> {
    let q1 = quantile(values, 0.25)?;
    let q3 = quantile(values, 0.75)?;
    let iqr = q3 - q1;
    Some(IqrBounds {
        lower: q1 - IQR_MULTIPLIER * iqr,
        upper: q3 + IQR_MULTIPLIER * iqr,
    })
}

fn outside(value: f64, bounds: &IqrBounds) -> bool {
    value < bounds.lower || value > bounds.upper
}

fn iqr_global(values: &[Option<f64>]) -> Flags {
    let Some(bounds) = iqr_bounds(&present(values)) else {
        return Flags::default();
    };

    let positions = values
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_some_and(|v| outside(v, &bounds)))
        .map(|(row, _)| row)
        .collect();

    Flags {
        positions,
        bounds: Some(bounds),
        group_bounds: BTreeMap::new(),
    }
}

fn iqr_grouped(values: &[Option<f64>], groups: &BTreeMap<String, Vec<usize>>) -> Flags {
    let mut flags = Flags::default();
    for (key, rows) in groups {
        let Some(bounds) = iqr_bounds(&values_at(values, rows)) else {
            continue;
        };
        flags.positions.extend(
            rows.iter()
                .copied()
                .filter(|&row| values[row].is_some_and(|v| outside(v, &bounds))),
        );
        flags.group_bounds.insert(key.clone(), bounds);
    }
    flags.positions.sort_unstable();
    flags
}

/// Rows with |z| above the threshold, using the sample standard deviation.
/// A zero or undefined deviation is reported instead of dividing by it.
fn zscore_global(values: &[Option<f64>]) -> std::result::Result<Vec<usize>, Degenerate> {
    let present = present(values);
    let (Some(mean), Some(std)) = (mean(&present), std_dev(&present, 1)) else {
        return Err(Degenerate);
    };
    if std == 0.0 || !std.is_finite() {
        return Err(Degenerate);
    }
    Ok(flag_zscores(values, 0..values.len(), mean, std))
}

/// Flagged rows plus the keys of groups whose deviation is zero or undefined.
fn zscore_grouped(
    values: &[Option<f64>],
    groups: &BTreeMap<String, Vec<usize>>,
) -> (Vec<usize>, Vec<String>) {
    let mut positions = Vec::new();
    let mut degenerate = Vec::new();
    for (key, rows) in groups {
        let present = values_at(values, rows);
        match (mean(&present), std_dev(&present, 1)) {
            (Some(mean), Some(std)) if std > 0.0 && std.is_finite() => {
                positions.extend(flag_zscores(values, rows.iter().copied(), mean, std));
            }
            _ => degenerate.push(key.clone()),
        }
    }
    positions.sort_unstable();
    (positions, degenerate)
}

fn flag_zscores(
    values: &[Option<f64>],
    rows: impl IntoIterator<Item = usize>,
    mean: f64,
    std: f64,
) -> Vec<usize> {
    rows.into_iter()
        .filter(|&row| values[row].is_some_and(|v| ((v - mean) / std).abs() > ZSCORE_THRESHOLD))
        .collect()
}

/// Only finite values are scored; infinite ones are never flagged.
fn isolation_forest(values: &[Option<f64>]) -> Vec<usize> {
    let (positions, present): (Vec<usize>, Vec<f64>) = values
        .iter()
        .enumerate()
        .filter_map(|(row, value)| value.filter(|v| v.is_finite()).map(|v| (row, v)))
        .unzip();

    IsolationForest::default()
        .fit_predict(&present, CONTAMINATION)
        .into_iter()
        .zip(positions)
        .filter(|(flagged, _)| *flagged)
        .map(|(_, row)| row)
        .collect()
}

/// Zero or undefined standard deviation.
struct Degenerate;

impl Degenerate {
    fn with_column(self, column: &str) -> ProcessingError {
        ProcessingError::StatisticalDegeneracy {
            column: column.to_string(),
            statistic: "standard deviation (z-score skipped)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStage;
    use polars::prelude::*;

    fn detect(df: DataFrame, methods: &[OutlierMethod], group_by: Option<&str>) -> (OutlierReport, StageLog) {
        let dataset = Dataset::from_frame(df).unwrap();
        let mut log = StageLog::new(PipelineStage::OutlierDetection);
        let report = OutlierDetector::detect(&dataset, None, methods, group_by, &mut log).unwrap();
        (report, log)
    }

    #[test]
    fn test_iqr_flags_only_extreme_value() {
        let df = df!["a" => [1.0, 2.0, 3.0, 4.0, 5.0, 100.0]].unwrap();
        let (report, _) = detect(df, &[OutlierMethod::Iqr], None);

        let result = report.get("a", OutlierMethod::Iqr).unwrap();
        assert_eq!(result.rows, vec![5]);
        let bounds = result.bounds.unwrap();
        assert!((bounds.lower - -1.5).abs() < 1e-12);
        assert!((bounds.upper - 8.5).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_flags_beyond_three_sigma() {
        let mut values = vec![10.0; 20];
        values.push(1000.0);
        let df = df!["a" => values].unwrap();
        let (report, _) = detect(df, &[OutlierMethod::ZScore], None);

        assert_eq!(report.get("a", OutlierMethod::ZScore).unwrap().rows, vec![20]);
    }

    #[test]
    fn test_zscore_constant_column_flags_nothing() {
        let df = df!["a" => [4.0, 4.0, 4.0, 4.0]].unwrap();
        let (report, log) = detect(df, &[OutlierMethod::ZScore], None);

        assert_eq!(report.get("a", OutlierMethod::ZScore).unwrap().count, 0);
        assert_eq!(log.warnings()[0].code, "STATISTICAL_DEGENERACY");
    }

    #[test]
    fn test_grouped_iqr_uses_group_bounds() {
        // 50 is normal in group "y" but an outlier in group "x"
        let df = df![
            "g" => ["x", "x", "x", "x", "x", "y", "y", "y", "y", "y"],
            "v" => [1.0, 2.0, 3.0, 4.0, 50.0, 48.0, 49.0, 50.0, 51.0, 52.0],
        ]
        .unwrap();
        let (report, _) = detect(df, &[OutlierMethod::Iqr], Some("g"));

        let result = report.get("v", OutlierMethod::Iqr).unwrap();
        assert_eq!(result.rows, vec![4]);
        assert_eq!(result.group_bounds.len(), 2);
        assert!(result.bounds.is_none());
        assert_eq!(report.group_by.as_deref(), Some("g"));
    }

    #[test]
    fn test_non_numeric_column_is_skipped_with_warning() {
        let df = df!["city" => ["a", "b", "c"]].unwrap();
        let dataset = Dataset::from_frame(df).unwrap();
        let mut log = StageLog::new(PipelineStage::OutlierDetection);
        let columns = vec!["city".to_string(), "ghost".to_string()];

        let report = OutlierDetector::detect(
            &dataset,
            Some(&columns),
            &[OutlierMethod::Iqr],
            None,
            &mut log,
        )
        .unwrap();

        assert!(report.is_empty());
        let codes: Vec<&str> = log.warnings().iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["UNSUPPORTED_TYPE", "COLUMN_NOT_FOUND"]);
    }

    #[test]
    fn test_methods_are_reported_independently() {
        let mut values: Vec<f64> = (0..30).map(|i| (i % 6) as f64).collect();
        values.push(90.0);
        let df = df!["a" => values].unwrap();
        let (report, _) = detect(
            df,
            &[OutlierMethod::Iqr, OutlierMethod::ZScore, OutlierMethod::IsolationForest],
            None,
        );

        let methods = &report.columns["a"];
        assert_eq!(methods.len(), 3);
        for result in methods.values() {
            assert!(result.rows.contains(&30));
        }
    }

    #[test]
    fn test_missing_values_are_never_flagged() {
        let df = df!["a" => [Some(1.0), None, Some(2.0), Some(3.0), Some(100.0)]].unwrap();
        let (report, _) = detect(df, &[OutlierMethod::Iqr], None);
        assert_eq!(report.get("a", OutlierMethod::Iqr).unwrap().rows, vec![4]);
    }

    #[test]
    fn test_grouped_zscore_warns_for_constant_group() {
        let mut groups = vec!["x"; 21];
        groups.extend(["y"; 3]);
        let mut values = vec![10.0; 20];
        values.push(1000.0);
        values.extend([7.0, 7.0, 7.0]);
        let df = df!["g" => groups, "v" => values].unwrap();

        let (report, log) = detect(df, &[OutlierMethod::ZScore], Some("g"));

        assert_eq!(report.get("v", OutlierMethod::ZScore).unwrap().rows, vec![20]);
        assert_eq!(log.warnings().len(), 1);
        assert_eq!(log.warnings()[0].code, "STATISTICAL_DEGENERACY");
        assert_eq!(log.warnings()[0].column.as_deref(), Some("v"));
        assert!(log.warnings()[0].message.contains("group 'y'"));
    }

    #[test]
    fn test_isolation_forest_handles_extreme_and_infinite_values() {
        let df = df!["a" => [-1e308, 0.0, 1.0, 2.0, 1e308]].unwrap();
        let (report, _) = detect(df, &[OutlierMethod::IsolationForest], None);
        assert!(report.get("a", OutlierMethod::IsolationForest).unwrap().count <= 5);

        let df = df!["a" => [1.0, 2.0, 3.0, f64::INFINITY]].unwrap();
        let (report, _) = detect(df, &[OutlierMethod::IsolationForest], None);
        let result = report.get("a", OutlierMethod::IsolationForest).unwrap();
        assert!(!result.rows.contains(&3));
    }
}
