//! Distribution transforms.
//!
//! Every transform writes a new `{col}_{suffix}` column next to the source;
//! originals are never overwritten. Missing source cells stay missing in the
//! derived column.

mod boxcox;

pub use boxcox::{LAMBDA_BOUNDS, boxcox, fit_lambda, positive_shift};

use crate::config::TransformKind;
use crate::dataset::{Dataset, SemanticType};
use crate::error::{ProcessingError, Result};
use crate::types::{ActionType, StageLog};
use crate::utils::present;
use tracing::{debug, info};

/// Derives transformed copies of numeric columns.
pub struct DistributionTransformer;

impl DistributionTransformer {
    /// Apply each of `kinds` to each column.
    ///
    /// `columns` defaults to the numeric columns present before the stage,
    /// minus `group_by`.
    pub fn transform(
        dataset: &Dataset,
        columns: Option<&[String]>,
        kinds: &[TransformKind],
        group_by: Option<&str>,
        log: &mut StageLog,
    ) -> Result<Dataset> {
        let columns: Vec<String> = match columns {
            Some(columns) => columns.to_vec(),
            None => dataset
                .columns_of_type(SemanticType::Numeric)
                .into_iter()
                .filter(|name| Some(name.as_str()) != group_by)
                .collect(),
        };

        let mut transformed = dataset.clone();
        for column in &columns {
            let values = match dataset.numeric_values(column) {
                Ok(values) => values,
                Err(e) => {
                    log.warn(&e);
                    continue;
                }
            };

            for kind in kinds {
                let derived = match kind {
                    TransformKind::Log => log_transform(&values),
                    TransformKind::BoxCox => boxcox_transform(column, &values, log),
                    TransformKind::Sqrt => values.iter().map(|v| v.map(|v| v.abs().sqrt())).collect(),
                    TransformKind::Square => values.iter().map(|v| v.map(|v| v * v)).collect(),
                };

                let name = format!("{}_{}", column, kind.suffix());
                debug!("Deriving '{}'", name);
                transformed.set_numeric(&name, derived)?;
                log.action(
                    ActionType::ColumnDerived,
                    &name,
                    format!("{:?} transform of '{}'", kind, column),
                );
            }
        }

        info!(
            "Applied {} transforms to {} columns",
            kinds.len(),
            columns.len()
        );
        Ok(transformed)
    }
}

/// `ln(x)` when every value is positive, otherwise `ln(x + 1)`.
fn log_transform(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let all_positive = values.iter().flatten().all(|&v| v > 0.0);
    values
        .iter()
        .map(|value| {
            value.map(|v| if all_positive { v.ln() } else { v.ln_1p() })
        })
        .collect()
}

/// Shift into the positive domain and apply Box-Cox with a fitted lambda.
/// On fit failure the shifted values are kept and a warning is recorded.
fn boxcox_transform(column: &str, values: &[Option<f64>], log: &mut StageLog) -> Vec<Option<f64>> {
    let shift = positive_shift(&present(values));
    let shifted: Vec<Option<f64>> = values.iter().map(|v| v.map(|v| v + shift)).collect();

    match fit_lambda(&present(&shifted)) {
        Ok(lambda) => {
            info!("Box-Cox for '{}': lambda = {:.4}", column, lambda);
            shifted
                .iter()
                .map(|v| v.map(|v| boxcox(v, lambda)))
                .collect()
        }
        Err(reason) => {
            log.warn(&ProcessingError::TransformFailure {
                column: column.to_string(),
                transform: "boxcox".to_string(),
                reason,
            });
            shifted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStage;
    use polars::prelude::*;

    fn run(df: DataFrame, kinds: &[TransformKind]) -> (Dataset, StageLog) {
        let dataset = Dataset::from_frame(df).unwrap();
        let mut log = StageLog::new(PipelineStage::Transformation);
        let out = DistributionTransformer::transform(&dataset, None, kinds, None, &mut log).unwrap();
        (out, log)
    }

    #[test]
    fn test_derived_columns_are_added() {
        let df = df!["x" => [1.0, 4.0, 9.0]].unwrap();
        let (out, log) = run(
            df,
            &[TransformKind::Log, TransformKind::Sqrt, TransformKind::Square],
        );

        assert_eq!(
            out.column_names(),
            vec!["x", "x_log", "x_sqrt", "x_square"]
        );
        assert_eq!(
            out.numeric_values("x").unwrap(),
            vec![Some(1.0), Some(4.0), Some(9.0)]
        );
        assert_eq!(
            out.numeric_values("x_sqrt").unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
        assert_eq!(
            out.numeric_values("x_square").unwrap(),
            vec![Some(1.0), Some(16.0), Some(81.0)]
        );
        assert_eq!(log.actions().len(), 3);
    }

    #[test]
    fn test_log_switches_to_log1p_for_non_positive() {
        let positive = log_transform(&[Some(1.0), Some(std::f64::consts::E)]);
        assert_eq!(positive[0], Some(0.0));
        assert!((positive[1].unwrap() - 1.0).abs() < 1e-12);

        let with_zero = log_transform(&[Some(0.0), None, Some(1.0)]);
        assert_eq!(with_zero[0], Some(0.0));
        assert_eq!(with_zero[1], None);
        assert!((with_zero[2].unwrap() - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_is_sign_insensitive() {
        let df = df!["x" => [-4.0, 4.0]].unwrap();
        let (out, _) = run(df, &[TransformKind::Sqrt]);
        assert_eq!(
            out.numeric_values("x_sqrt").unwrap(),
            vec![Some(2.0), Some(2.0)]
        );
    }

    #[test]
    fn test_boxcox_constant_column_falls_back_to_shifted_values() {
        let df = df!["x" => [0.0, 0.0, 0.0]].unwrap();
        let (out, log) = run(df, &[TransformKind::BoxCox]);

        assert_eq!(
            out.numeric_values("x_boxcox").unwrap(),
            vec![Some(1.0), Some(1.0), Some(1.0)]
        );
        assert_eq!(log.warnings()[0].code, "TRANSFORM_FAILURE");
    }

    #[test]
    fn test_boxcox_fits_skewed_column() {
        let values: Vec<f64> = (1..=30).map(|i| (i as f64).powi(2)).collect();
        let df = df!["x" => values].unwrap();
        let (out, log) = run(df, &[TransformKind::BoxCox]);

        assert!(log.warnings().is_empty());
        let derived = out.numeric_values("x_boxcox").unwrap();
        assert!(derived.iter().all(|v| v.is_some()));
    }
}
