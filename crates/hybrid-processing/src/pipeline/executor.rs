//! Stage execution.
//!
//! Stages run in a fixed order against an immutable view of the current
//! dataset and hand back a new one. A stage that errors is recorded as
//! failed and its output is discarded, so the next stage sees the dataset
//! exactly as it was before the failure.

use crate::cleaner::DuplicateRemover;
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::dataset::Dataset;
use crate::encoder::CategoricalEncoder;
use crate::error::{ProcessingError, Result};
use crate::imputers::MissingValueImputer;
use crate::normalizer::Normalizer;
use crate::outliers::{OutlierDetector, OutlierReport, OutlierTreatment};
use crate::pipeline::progress::{PipelineStage, ProgressReporter, ProgressUpdate};
use crate::temporal::TemporalExtractor;
use crate::transforms::DistributionTransformer;
use crate::types::{FitArtifact, ProcessingReport, StageLog, StageOutcome};
use tracing::{debug, info, warn};

/// Mutable state of one run.
pub(crate) struct RunState {
    pub dataset: Dataset,
    pub report: ProcessingReport,
    pub artifacts: Vec<FitArtifact>,
}

impl RunState {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            report: ProcessingReport::new(dataset.shape()),
            dataset,
            artifacts: Vec::new(),
        }
    }
}

/// Runs the processing stages of one pipeline run.
pub struct StageExecutor<'a> {
    config: &'a PipelineConfig,
    progress: Option<&'a dyn ProgressReporter>,
}

impl<'a> StageExecutor<'a> {
    pub fn new(config: &'a PipelineConfig, progress: Option<&'a dyn ProgressReporter>) -> Self {
        Self { config, progress }
    }

    /// Run every stage in order. Stage failures never abort the run.
    pub(crate) fn execute(&self, state: &mut RunState) {
        let config = self.config;
        let group_by = config.group_by.as_deref();

        // 1. Outlier detection (read-only)
        let outliers = self
            .run_stage(state, PipelineStage::OutlierDetection, config.detect_outliers, |ds, log| {
                let report = OutlierDetector::detect(
                    ds,
                    config.outlier_columns.as_deref(),
                    &config.outlier_methods,
                    group_by,
                    log,
                )?;
                Ok((ds.clone(), report))
            })
            .unwrap_or_default();
        state.report.outliers = outliers.clone();

        // 2. Missing values
        self.run_stage(state, PipelineStage::Imputation, config.handle_missing, |ds, log| {
            let imputed = MissingValueImputer::impute(
                ds,
                config.missing_strategy,
                config.missing_columns.as_deref(),
                group_by,
                config.missing_threshold,
                log,
            )?;
            Ok((imputed, ()))
        });

        // 3. Duplicates
        if let Some(removed) =
            self.run_stage(state, PipelineStage::Deduplication, config.remove_duplicates, |ds, log| {
                DuplicateRemover::dedupe(
                    ds,
                    config.duplicate_subset.as_deref(),
                    config.duplicate_keep,
                    log,
                )
            })
        {
            state.report.duplicates_removed = removed;
        }

        // 4. Outlier treatment, driven by the detection report
        self.run_stage(state, PipelineStage::OutlierTreatment, config.handle_outliers, |ds, log| {
            let treated = OutlierTreatment::treat(ds, config.outlier_method, &outliers, log)?;
            Ok((treated, ()))
        });

        // 5. Distribution transforms
        self.run_stage(
            state,
            PipelineStage::Transformation,
            config.apply_transformations,
            |ds, log| {
                let transformed = DistributionTransformer::transform(
                    ds,
                    config.transform_columns.as_deref(),
                    &config.transformations,
                    group_by,
                    log,
                )?;
                Ok((transformed, ()))
            },
        );

        // 6. Normalization: grouped takes precedence over global
        let normalize = config.normalize_by_group || config.normalize_global;
        if let Some(artifacts) =
            self.run_stage(state, PipelineStage::Normalization, normalize, |ds, log| {
                if config.normalize_by_group {
                    let group_by = group_by.ok_or_else(|| {
                        ProcessingError::Config(ConfigValidationError::MissingGroupBy {
                            feature: "normalize_by_group".to_string(),
                        })
                    })?;
                    Normalizer::normalize_by_group(
                        ds,
                        config.normalize_columns.as_deref(),
                        group_by,
                        config.group_normalization_method,
                        log,
                    )
                } else {
                    Normalizer::normalize_global(
                        ds,
                        config.normalization_method,
                        config.normalize_columns.as_deref(),
                        group_by,
                        log,
                    )
                }
            })
        {
            state.artifacts.extend(artifacts);
        }

        // 7. Categorical encoding
        if let Some(artifacts) =
            self.run_stage(state, PipelineStage::Encoding, config.encode_categorical, |ds, log| {
                CategoricalEncoder::encode(
                    ds,
                    config.encoding_method,
                    config.encoding_columns.as_deref(),
                    group_by,
                    config.max_categories,
                    log,
                )
            })
        {
            state.artifacts.extend(artifacts);
        }

        // 8. Dates
        self.run_stage(
            state,
            PipelineStage::TemporalExtraction,
            config.normalize_dates,
            |ds, log| {
                let extracted = TemporalExtractor::extract(
                    ds,
                    config.date_columns.as_deref(),
                    &config.date_format,
                    config.extract_date_features,
                    log,
                )?;
                Ok((extracted, ()))
            },
        );

        state.report.count_artifacts(&state.artifacts);
    }

    /// Run one stage and record its outcome.
    ///
    /// On success the stage's dataset replaces the current one and its extra
    /// output is returned. On error the current dataset is kept, the error
    /// becomes a warning, and the stage's actions are discarded.
    pub(crate) fn run_stage<T>(
        &self,
        state: &mut RunState,
        stage: PipelineStage,
        enabled: bool,
        f: impl FnOnce(&Dataset, &mut StageLog) -> Result<(Dataset, T)>,
    ) -> Option<T> {
        let mut log = StageLog::new(stage);
        if !enabled {
            debug!("Skipping {} (disabled)", stage.display_name());
            state
                .report
                .record_stage(log, StageOutcome::Skipped, state.dataset.shape());
            return None;
        }

        info!("{}...", stage.display_name());
        self.report_progress(ProgressUpdate::new(
            stage,
            0.0,
            format!("{}...", stage.display_name()),
        ));

        let (outcome, value) = match f(&state.dataset, &mut log) {
            Ok((dataset, value)) => {
                state.dataset = dataset;
                (StageOutcome::Applied, Some(value))
            }
            Err(e) => {
                warn!("{} failed, keeping previous data: {}", stage.display_name(), e);
                log.warn(&e.with_context(format!("{} failed", stage.display_name())));
                (StageOutcome::Failed, None)
            }
        };

        state
            .report
            .record_stage(log, outcome, state.dataset.shape());
        self.report_progress(ProgressUpdate::new(
            stage,
            1.0,
            format!("{} complete", stage.display_name()),
        ));
        value
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = self.progress {
            reporter.report(update);
        }
    }
}

/// Run outlier detection alone with the detection settings of `config`.
pub fn detect_only(dataset: &Dataset, config: &PipelineConfig) -> Result<OutlierReport> {
    let mut log = StageLog::new(PipelineStage::OutlierDetection);
    OutlierDetector::detect(
        dataset,
        config.outlier_columns.as_deref(),
        &config.outlier_methods,
        config.group_by.as_deref(),
        &mut log,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionType;
    use polars::prelude::*;

    fn dataset() -> Dataset {
        let df = df![
            "value" => [Some(1.0), Some(2.0), None, Some(2.0), Some(100.0)],
            "city" => ["a", "b", "c", "b", "d"],
        ]
        .unwrap();
        Dataset::from_frame(df).unwrap()
    }

    #[test]
    fn test_failed_stage_keeps_previous_dataset() {
        let config = PipelineConfig::default();
        let executor = StageExecutor::new(&config, None);
        let mut state = RunState::new(dataset());

        let value = executor.run_stage(&mut state, PipelineStage::Encoding, true, |ds, log| {
            log.action(ActionType::CategoriesEncoded, "city", "half done");
            let mut broken = ds.clone();
            broken.drop_column("city")?;
            broken.drop_column("city")?;
            Ok((broken, ()))
        });

        assert!(value.is_none());
        assert!(state.dataset.has_column("city"));
        assert!(state.report.actions.is_empty());
        assert_eq!(state.report.warnings[0].code, "COLUMN_NOT_FOUND");
        assert_eq!(
            state.report.stage_outcome(PipelineStage::Encoding),
            Some(StageOutcome::Failed)
        );
    }

    #[test]
    fn test_disabled_stage_is_skipped() {
        let config = PipelineConfig::default();
        let executor = StageExecutor::new(&config, None);
        let mut state = RunState::new(dataset());

        let value = executor.run_stage(&mut state, PipelineStage::Deduplication, false, |ds, _| {
            Ok((ds.clone(), 1))
        });

        assert!(value.is_none());
        assert_eq!(
            state.report.stage_outcome(PipelineStage::Deduplication),
            Some(StageOutcome::Skipped)
        );
    }

    #[test]
    fn test_later_stages_run_after_a_failure() {
        // an unknown partition column breaks grouped detection only
        let config = PipelineConfig {
            group_by: Some("ghost".to_string()),
            ..Default::default()
        };
        let executor = StageExecutor::new(&config, None);
        let mut state = RunState::new(dataset());
        executor.execute(&mut state);

        assert_eq!(
            state.report.stage_outcome(PipelineStage::OutlierDetection),
            Some(StageOutcome::Failed)
        );
        assert_eq!(
            state.report.stage_outcome(PipelineStage::Encoding),
            Some(StageOutcome::Applied)
        );
        assert_eq!(state.report.stages.len(), 8);
        assert_eq!(state.dataset.missing_count("value").unwrap(), 0);
    }

    #[test]
    fn test_execute_records_every_stage_in_order() {
        let config = PipelineConfig::default();
        let executor = StageExecutor::new(&config, None);
        let mut state = RunState::new(dataset());
        executor.execute(&mut state);

        let stages: Vec<PipelineStage> = state.report.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, PipelineStage::PROCESSING.to_vec());
        // rows 1 and 3 are identical
        assert_eq!(state.report.duplicates_removed, 1);
        assert_eq!(state.dataset.height(), 4);
        assert!(state.report.fit_artifacts_created >= 2);
    }

    #[test]
    fn test_detect_only() {
        let config = PipelineConfig::builder()
            .outlier_methods(vec![crate::config::OutlierMethod::Iqr])
            .build()
            .unwrap();
        let report = detect_only(&dataset(), &config).unwrap();
        assert_eq!(report.flagged_rows().into_iter().collect::<Vec<_>>(), vec![4]);
    }
}
