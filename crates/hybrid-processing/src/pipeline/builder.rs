//! Pipeline orchestrator and builder.

use crate::config::{ConfigValidationError, PipelineConfig};
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::pipeline::executor::{RunState, StageExecutor};
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{FitArtifact, ProcessingReport};
use polars::prelude::DataFrame;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The processed dataset.
    pub dataset: Dataset,
    /// What happened during the run.
    pub report: ProcessingReport,
    /// Scalers and encoders fitted during the run.
    pub artifacts: Vec<FitArtifact>,
}

/// The processing pipeline.
///
/// A pipeline holds only its configuration and an optional progress
/// reporter. Each [`run`](Pipeline::run) starts from scratch, so one
/// pipeline can process any number of datasets.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_processing::{Pipeline, PipelineConfig, NormalizationMethod};
///
/// let config = PipelineConfig::builder()
///     .normalization_method(NormalizationMethod::MinMax)
///     .build()?;
///
/// let output = Pipeline::builder()
///     .config(config)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run(dataset)?;
///
/// println!("{} warnings", output.report.warnings.len());
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

// Pipelines may be moved to a worker thread
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every enabled stage over `dataset`.
    ///
    /// # Errors
    ///
    /// Only an empty dataset ([`ProcessingError::MalformedInput`]) or a
    /// config that references a missing column ([`ProcessingError::Config`])
    /// aborts the run. Every other problem ends up in the report.
    pub fn run(&self, dataset: Dataset) -> Result<PipelineOutput> {
        match self.run_internal(dataset) {
            Ok(output) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(output)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Wrap a polars frame in a [`Dataset`] and run the pipeline on it.
    pub fn run_frame(&self, frame: DataFrame) -> Result<PipelineOutput> {
        self.run(Dataset::from_frame(frame)?)
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, dataset: Dataset) -> Result<PipelineOutput> {
        let start_time = Instant::now();

        info!("Starting processing pipeline...");
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Validating input...",
        ));

        let (rows, columns) = dataset.shape();
        if rows == 0 || columns == 0 {
            return Err(ProcessingError::MalformedInput(format!(
                "dataset has {} rows and {} columns",
                rows, columns
            )));
        }
        self.config.validate_against(&dataset)?;
        info!("Input: {} rows x {} columns", rows, columns);

        let mut state = RunState::new(dataset);
        let reporter = self.progress_reporter.as_deref();
        StageExecutor::new(&self.config, reporter).execute(&mut state);

        let RunState {
            dataset,
            mut report,
            artifacts,
        } = state;
        report.finalize(dataset.shape(), start_time.elapsed().as_millis() as u64);

        info!(
            "Pipeline finished in {}ms: {} -> {} rows, {} -> {} columns, {} warnings",
            report.duration_ms,
            report.rows_before,
            report.rows_after,
            report.columns_before,
            report.columns_after,
            report.warnings.len()
        );

        Ok(PipelineOutput {
            dataset,
            report,
            artifacts,
        })
    }
}

/// Run the pipeline once with `config`.
///
/// Shorthand for building a [`Pipeline`] and discarding the fitted
/// artifacts.
pub fn run(dataset: Dataset, config: &PipelineConfig) -> Result<(Dataset, ProcessingReport)> {
    let pipeline = Pipeline::builder().config(config.clone()).build()?;
    let output = pipeline.run(dataset)?;
    Ok((output.dataset, output.report))
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// For anything beyond a simple callback, use
    /// [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
        })
    }
}
