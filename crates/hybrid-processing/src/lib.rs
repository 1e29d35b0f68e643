//! Hybrid Processing Library
//!
//! A configurable preprocessing pipeline for tabular data, built on Polars.
//!
//! # Overview
//!
//! One pipeline run takes a [`Dataset`] through up to eight stages, in a
//! fixed order:
//!
//! 1. **Outlier detection**: IQR fences, z-scores and an isolation forest,
//!    globally or per group
//! 2. **Missing values**: sparse columns are dropped, the rest filled by
//!    mean, median, mode, group mean, nearest neighbours or interpolation
//! 3. **Deduplication**: exact duplicate rows, optionally on a column subset
//! 4. **Outlier treatment**: winsorize, cap, remove or log-transform
//! 5. **Distribution transforms**: log, Box-Cox, square root and square
//! 6. **Normalization**: standard, min-max or robust scaling, globally or
//!    per group
//! 7. **Categorical encoding**: label, one-hot or frequency
//! 8. **Dates**: parsing plus calendar features
//!
//! Every stage can be turned off. A stage that fails leaves the dataset as
//! it was and the run continues; the returned [`ProcessingReport`] lists
//! what each stage did and every warning raised along the way.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hybrid_processing::{Dataset, OutlierTreatmentMethod, Pipeline, PipelineConfig};
//! use polars::prelude::*;
//!
//! let df = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("sales.csv".into()))?
//!     .finish()?;
//!
//! let config = PipelineConfig::builder()
//!     .group_by("store")
//!     .outlier_method(OutlierTreatmentMethod::Cap)
//!     .normalize_by_group(true)
//!     .build()?;
//!
//! let output = Pipeline::builder()
//!     .config(config)
//!     .build()?
//!     .run(Dataset::from_frame(df)?)?;
//!
//! println!("{} -> {} rows", output.report.rows_before, output.report.rows_after);
//! for artifact in &output.artifacts {
//!     println!("fitted {}", artifact.column());
//! }
//! ```
//!
//! When the fitted artifacts are not needed, [`run`] is a shorthand:
//!
//! ```rust,ignore
//! let (dataset, report) = hybrid_processing::run(dataset, &PipelineConfig::default())?;
//! ```
//!
//! # Configuration
//!
//! [`PipelineConfig`] is a flat record with a default for every field, so
//! a partial JSON document is a valid config:
//!
//! ```rust,ignore
//! let config = PipelineConfig::from_json_str(r#"{
//!     "missing_strategy": "median",
//!     "outlier_methods": ["iqr", "isolation_forest"],
//!     "encoding_method": "onehot"
//! }"#)?;
//! ```

pub mod cleaner;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod imputers;
pub mod normalizer;
pub mod outliers;
pub mod pipeline;
pub mod reporting;
pub mod temporal;
pub mod transforms;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use cleaner::DuplicateRemover;
pub use config::{
    ConfigValidationError, DuplicateKeep, EncodingMethod, GroupNormalizationMethod,
    MissingStrategy, NormalizationMethod, OutlierMethod, OutlierTreatmentMethod, PipelineConfig,
    PipelineConfigBuilder, TransformKind,
};
pub use dataset::{Dataset, SemanticType};
pub use encoder::CategoricalEncoder;
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use imputers::{KnnImputer, MissingValueImputer, StatisticalImputer};
pub use normalizer::Normalizer;
pub use outliers::{
    IqrBounds, IsolationForest, MethodOutliers, OutlierDetector, OutlierReport, OutlierTreatment,
};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineOutput, PipelineStage,
    ProgressReporter, ProgressUpdate, run,
};
pub use reporting::ReportWriter;
pub use temporal::TemporalExtractor;
pub use transforms::DistributionTransformer;
pub use types::{
    ActionType, EncoderMapping, FitArtifact, ProcessingAction, ProcessingReport,
    ProcessingWarning, ScalerParams, StageLog, StageOutcome, StageRecord,
};
