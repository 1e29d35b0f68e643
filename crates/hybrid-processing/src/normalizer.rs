//! Global and per-group scaling of numeric columns.
//!
//! Global scaling replaces the column in place. Grouped scaling writes
//! `{col}_N` (min-max) or `{col}_S` (standard) so both variants can sit in
//! the same dataset. Fitted parameters come back as [`FitArtifact`]s.

use crate::config::{GroupNormalizationMethod, NormalizationMethod};
use crate::dataset::{Dataset, SemanticType};
use crate::error::{ProcessingError, Result};
use crate::types::{ActionType, FitArtifact, ScalerParams, StageLog};
use crate::utils::{
    group_partitions, mean, median, median_absolute_deviation, min_max, present, std_dev,
    values_at,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Numeric column scaler.
pub struct Normalizer;

impl Normalizer {
    /// Scale each column with `method`, in place.
    ///
    /// `columns` defaults to every numeric column except `group_by`.
    /// Standard scaling uses the population standard deviation. A column
    /// with zero spread becomes all zeros and a warning is recorded.
    pub fn normalize_global(
        dataset: &Dataset,
        method: NormalizationMethod,
        columns: Option<&[String]>,
        group_by: Option<&str>,
        log: &mut StageLog,
    ) -> Result<(Dataset, Vec<FitArtifact>)> {
        let columns = resolve_columns(dataset, columns, group_by);
        let mut normalized = dataset.clone();
        let mut artifacts = Vec::new();

        for column in &columns {
            let values = match dataset.numeric_values(column) {
                Ok(values) => values,
                Err(e) => {
                    log.warn(&e);
                    continue;
                }
            };

            let Some(params) = fit_global(&present(&values), method) else {
                log.warn(&ProcessingError::NoValidValues(column.clone()));
                continue;
            };
            if params.is_degenerate() {
                log.warn(&ProcessingError::StatisticalDegeneracy {
                    column: column.clone(),
                    statistic: spread_name(&params).to_string(),
                });
            }

            let scaled = values.iter().map(|v| v.map(|v| params.scale(v))).collect();
            normalized.set_numeric(column, scaled)?;
            debug!("Scaled '{}' with {:?}", column, params);
            log.action(
                ActionType::DataNormalized,
                column,
                format!("{:?} scaling", method),
            );
            artifacts.push(FitArtifact::Scaler {
                column: column.clone(),
                params,
            });
        }

        info!("Normalized {} columns ({:?})", artifacts.len(), method);
        Ok((normalized, artifacts))
    }

    /// Scale each column within the partitions of `group_by`.
    ///
    /// Standard scaling uses the sample standard deviation of the group. A
    /// group with a single value or zero spread maps to 0; rows without a
    /// group key stay missing.
    pub fn normalize_by_group(
        dataset: &Dataset,
        columns: Option<&[String]>,
        group_by: &str,
        method: GroupNormalizationMethod,
        log: &mut StageLog,
    ) -> Result<(Dataset, Vec<FitArtifact>)> {
        let groups = group_partitions(&dataset.text_values(group_by)?);
        let columns = resolve_columns(dataset, columns, Some(group_by));
        let suffix = match method {
            GroupNormalizationMethod::MinMax => "N",
            GroupNormalizationMethod::Standard => "S",
        };

        let mut normalized = dataset.clone();
        let mut artifacts = Vec::new();

        for column in &columns {
            let values = match dataset.numeric_values(column) {
                Ok(values) => values,
                Err(e) => {
                    log.warn(&e);
                    continue;
                }
            };

            let mut scaled = vec![None; values.len()];
            let mut fitted = BTreeMap::new();
            for (key, rows) in &groups {
                let group_values = values_at(&values, rows);
                let params = match fit_group(&group_values, method) {
                    Some(params) => params,
                    None if group_values.is_empty() => continue,
                    // a single value has no sample deviation
                    None => ScalerParams::Standard {
                        mean: group_values[0],
                        std: 0.0,
                    },
                };
                if params.is_degenerate() {
                    log.warn_message(
                        "STATISTICAL_DEGENERACY",
                        Some(column),
                        format!(
                            "group '{}' of '{}' has zero {}; scaled to 0",
                            key,
                            column,
                            spread_name(&params)
                        ),
                    );
                }
                for &row in rows {
                    scaled[row] = values[row].map(|v| params.scale(v));
                }
                fitted.insert(key.clone(), params);
            }

            let output = format!("{}_{}", column, suffix);
            normalized.set_numeric(&output, scaled)?;
            log.action(
                ActionType::DataNormalized,
                &output,
                format!("{:?} scaling of '{}' by '{}'", method, column, group_by),
            );
            artifacts.push(FitArtifact::GroupScaler {
                column: column.clone(),
                output_column: output,
                group_by: group_by.to_string(),
                groups: fitted,
            });
        }

        info!(
            "Normalized {} columns by '{}' ({:?})",
            artifacts.len(),
            group_by,
            method
        );
        Ok((normalized, artifacts))
    }
}

fn resolve_columns(dataset: &Dataset, columns: Option<&[String]>, group_by: Option<&str>) -> Vec<String> {
    match columns {
        Some(columns) => columns.to_vec(),
        None => dataset
            .columns_of_type(SemanticType::Numeric)
            .into_iter()
            .filter(|name| Some(name.as_str()) != group_by)
            .collect(),
    }
}

fn fit_global(values: &[f64], method: NormalizationMethod) -> Option<ScalerParams> {
    Some(match method {
        NormalizationMethod::Standard => ScalerParams::Standard {
            mean: mean(values)?,
            std: std_dev(values, 0)?,
        },
        NormalizationMethod::MinMax => {
            let (min, max) = min_max(values)?;
            ScalerParams::MinMax { min, max }
        }
        NormalizationMethod::Robust => ScalerParams::Robust {
            median: median(values)?,
            mad: median_absolute_deviation(values)?,
        },
    })
}

fn fit_group(values: &[f64], method: GroupNormalizationMethod) -> Option<ScalerParams> {
    Some(match method {
        GroupNormalizationMethod::MinMax => {
            let (min, max) = min_max(values)?;
            ScalerParams::MinMax { min, max }
        }
        GroupNormalizationMethod::Standard => ScalerParams::Standard {
            mean: mean(values)?,
            std: std_dev(values, 1)?,
        },
    })
}

fn spread_name(params: &ScalerParams) -> &'static str {
    match params {
        ScalerParams::Standard { .. } => "standard deviation",
        ScalerParams::MinMax { .. } => "range",
        ScalerParams::Robust { .. } => "median absolute deviation",
    }
}
