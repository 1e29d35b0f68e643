//! Progress reporting for the processing pipeline.
//!
//! The pipeline emits a [`ProgressUpdate`] when each stage starts and ends.
//! Runs are synchronous and have no cancellation point; a caller that needs
//! a timeout wraps the whole run.
//!
//! # Example
//!
//! ```rust,ignore
//! use hybrid_processing::Pipeline;
//!
//! let output = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(dataset)?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the processing pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Validating input and configuration
    Initializing,
    /// Flagging outliers (read-only)
    OutlierDetection,
    /// Dropping sparse columns and filling missing values
    Imputation,
    /// Removing duplicate rows
    Deduplication,
    /// Clipping, removing or transforming flagged outliers
    OutlierTreatment,
    /// Deriving log/Box-Cox/sqrt/square columns
    Transformation,
    /// Global or per-group scaling
    Normalization,
    /// Encoding categorical columns
    Encoding,
    /// Parsing dates and deriving calendar features
    TemporalExtraction,
    /// Pipeline completed
    Complete,
    /// Pipeline stopped on a fatal error
    Failed,
}

impl PipelineStage {
    /// Processing stages in execution order.
    pub const PROCESSING: [PipelineStage; 8] = [
        Self::OutlierDetection,
        Self::Imputation,
        Self::Deduplication,
        Self::OutlierTreatment,
        Self::Transformation,
        Self::Normalization,
        Self::Encoding,
        Self::TemporalExtraction,
    ];

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::OutlierDetection => "Detecting Outliers",
            Self::Imputation => "Imputing Values",
            Self::Deduplication => "Removing Duplicates",
            Self::OutlierTreatment => "Treating Outliers",
            Self::Transformation => "Transforming Distributions",
            Self::Normalization => "Normalizing",
            Self::Encoding => "Encoding Categories",
            Self::TemporalExtraction => "Extracting Date Features",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall pipeline (0.0 - 1.0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::OutlierDetection => 0.15,
            Self::Imputation => 0.15,
            Self::Deduplication => 0.08,
            Self::OutlierTreatment => 0.10,
            Self::Transformation => 0.12,
            Self::Normalization => 0.13,
            Self::Encoding => 0.12,
            Self::TemporalExtraction => 0.13,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::OutlierDetection => 0.02,
            Self::Imputation => 0.17,
            Self::Deduplication => 0.32,
            Self::OutlierTreatment => 0.40,
            Self::Transformation => 0.50,
            Self::Normalization => 0.62,
            Self::Encoding => 0.75,
            Self::TemporalExtraction => 0.87,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// Progress of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: PipelineStage,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,
}

impl ProgressUpdate {
    /// Creates a progress update within a stage.
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Complete,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
        }
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Failed,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
        }
    }
}

/// Trait for receiving progress updates during processing.
///
/// Implementations must be `Send + Sync` so a pipeline can run on a worker
/// thread while reporting to another.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_processing::{ProgressReporter, ProgressUpdate};
///
/// struct StderrReporter;
///
/// impl ProgressReporter for StderrReporter {
///     fn report(&self, update: ProgressUpdate) {
///         eprintln!("{}: {}", update.stage.display_name(), update.message);
///     }
/// }
/// ```
pub trait ProgressReporter: Send + Sync {
    /// Called at the start and end of every stage.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
