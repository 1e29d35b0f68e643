//! Report, audit and fit-artifact types.
//!
//! Every stage writes what it did into a [`StageLog`]; the orchestrator
//! merges the logs into one [`ProcessingReport`]. Fitted scaler and encoder
//! parameters come back as [`FitArtifact`] values next to the dataset instead
//! of living on a long-lived processor object.

use crate::config::EncodingMethod;
use crate::error::ProcessingError;
use crate::outliers::OutlierReport;
use crate::pipeline::PipelineStage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ============================================================================
// Stage Log
// ============================================================================

/// Collects actions and warnings produced by one stage.
#[derive(Debug, Clone)]
pub struct StageLog {
    stage: PipelineStage,
    actions: Vec<ProcessingAction>,
    warnings: Vec<ProcessingWarning>,
}

impl StageLog {
    /// Create an empty log for a stage.
    pub fn new(stage: PipelineStage) -> Self {
        Self {
            stage,
            actions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Record an action taken on the data.
    pub fn action(
        &mut self,
        action_type: ActionType,
        target: impl Into<String>,
        description: impl Into<String>,
    ) {
        let action = ProcessingAction {
            stage: self.stage,
            action_type,
            target: target.into(),
            description: description.into(),
        };
        debug!("[{}] {}", action.target, action.description);
        self.actions.push(action);
    }

    /// Record a non-fatal error as a warning.
    pub fn warn(&mut self, error: &ProcessingError) {
        self.warn_message(error.error_code(), error.column(), error.to_string());
    }

    /// Record a warning with an explicit code.
    pub fn warn_message(
        &mut self,
        code: &str,
        column: Option<&str>,
        message: impl Into<String>,
    ) {
        let warning = ProcessingWarning {
            stage: self.stage,
            code: code.to_string(),
            column: column.map(str::to_string),
            message: message.into(),
        };
        warn!("{}: {}", self.stage.display_name(), warning.message);
        self.warnings.push(warning);
    }

    pub fn actions(&self) -> &[ProcessingAction] {
        &self.actions
    }

    pub fn warnings(&self) -> &[ProcessingWarning] {
        &self.warnings
    }

    /// Split into actions and warnings.
    pub fn into_parts(self) -> (Vec<ProcessingAction>, Vec<ProcessingWarning>) {
        (self.actions, self.warnings)
    }
}

/// A single action taken during processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingAction {
    /// Stage that performed the action.
    pub stage: PipelineStage,
    /// Type of action performed.
    pub action_type: ActionType,
    /// Column name or "dataset".
    pub target: String,
    /// Human-readable description.
    pub description: String,
}

/// Types of actions that can be taken during processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A column was removed from the dataset.
    ColumnRemoved,
    /// One or more rows were removed from the dataset.
    RowsRemoved,
    /// Missing values were imputed.
    ValueImputed,
    /// Outliers were flagged by a detection method.
    OutliersDetected,
    /// Outliers were clipped, removed or transformed.
    OutlierHandled,
    /// Duplicate rows were removed.
    DuplicatesRemoved,
    /// A derived column was added.
    ColumnDerived,
    /// Data was normalized or scaled.
    DataNormalized,
    /// Categories were encoded.
    CategoriesEncoded,
    /// Text was parsed into dates.
    DatesParsed,
}

impl ActionType {
    /// Get a human-readable display name for the action type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ColumnRemoved => "Column Removed",
            Self::RowsRemoved => "Rows Removed",
            Self::ValueImputed => "Value Imputed",
            Self::OutliersDetected => "Outliers Detected",
            Self::OutlierHandled => "Outlier Handled",
            Self::DuplicatesRemoved => "Duplicates Removed",
            Self::ColumnDerived => "Column Derived",
            Self::DataNormalized => "Data Normalized",
            Self::CategoriesEncoded => "Categories Encoded",
            Self::DatesParsed => "Dates Parsed",
        }
    }
}

/// A non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingWarning {
    pub stage: PipelineStage,
    /// Error code, see [`ProcessingError::error_code`].
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub message: String,
}

// ============================================================================
// Fit Artifacts
// ============================================================================

/// Fitted parameters of a scaler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ScalerParams {
    Standard { mean: f64, std: f64 },
    MinMax { min: f64, max: f64 },
    Robust { median: f64, mad: f64 },
}

impl ScalerParams {
    /// Apply the fitted scaling to one value. A zero spread maps to 0.
    pub fn scale(&self, value: f64) -> f64 {
        let (center, spread) = match *self {
            Self::Standard { mean, std } => (mean, std),
            Self::MinMax { min, max } => (min, max - min),
            Self::Robust { median, mad } => (median, mad),
        };
        if spread == 0.0 || !spread.is_finite() {
            0.0
        } else {
            (value - center) / spread
        }
    }

    /// Whether the spread is zero, undefined or non-finite.
    pub fn is_degenerate(&self) -> bool {
        let spread = match *self {
            Self::Standard { std, .. } => std,
            Self::MinMax { min, max } => max - min,
            Self::Robust { mad, .. } => mad,
        };
        spread == 0.0 || !spread.is_finite()
    }
}

/// Fitted category mapping of an encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderMapping {
    /// value -> integer code
    Label(BTreeMap<String, i64>),
    /// categories in output column order
    OneHot(Vec<String>),
    /// value -> relative frequency
    Frequency(BTreeMap<String, f64>),
}

/// Per-column parameters fitted during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitArtifact {
    /// Global scaler for one column.
    Scaler { column: String, params: ScalerParams },
    /// Per-group scalers for one column.
    GroupScaler {
        column: String,
        output_column: String,
        group_by: String,
        groups: BTreeMap<String, ScalerParams>,
    },
    /// Category encoder for one column.
    Encoder {
        column: String,
        method: EncodingMethod,
        mapping: EncoderMapping,
    },
}

impl FitArtifact {
    /// Source column the artifact was fitted on.
    pub fn column(&self) -> &str {
        match self {
            Self::Scaler { column, .. }
            | Self::GroupScaler { column, .. }
            | Self::Encoder { column, .. } => column,
        }
    }

    pub fn is_scaler(&self) -> bool {
        matches!(self, Self::Scaler { .. } | Self::GroupScaler { .. })
    }

    pub fn is_encoder(&self) -> bool {
        matches!(self, Self::Encoder { .. })
    }
}

// ============================================================================
// Processing Report
// ============================================================================

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage ran and its output was kept.
    Applied,
    /// The stage is disabled in the config.
    Skipped,
    /// The stage failed; the dataset was left as it was before the stage.
    Failed,
}

/// Outcome and resulting shape of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    pub outcome: StageOutcome,
    pub rows_after: usize,
    pub columns_after: usize,
}

/// Audit report of one pipeline run.
///
/// # Example
///
/// ```rust,ignore
/// let (dataset, report) = hybrid_processing::run(dataset, &config)?;
/// println!("{} -> {} rows in {}ms", report.rows_before, report.rows_after, report.duration_ms);
/// for warning in &report.warnings {
///     println!("[{}] {}", warning.code, warning.message);
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Run start, RFC 3339.
    pub started_at: String,
    /// Run end, RFC 3339.
    pub finished_at: String,
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    /// Rows removed by the duplicate stage.
    pub duplicates_removed: usize,

    /// Outlier detection results, per column and method.
    pub outliers: OutlierReport,

    /// Number of scaler artifacts fitted.
    pub scalers_count: usize,
    /// Number of encoder artifacts fitted.
    pub encoders_count: usize,
    /// Total number of fit artifacts.
    pub fit_artifacts_created: usize,

    /// One record per stage, in execution order.
    pub stages: Vec<StageRecord>,
    /// Audit trail of actions taken.
    pub actions: Vec<ProcessingAction>,
    /// Non-fatal problems, in the order they occurred.
    pub warnings: Vec<ProcessingWarning>,
}

impl ProcessingReport {
    /// Start a report for a dataset of the given shape.
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            rows_before: shape.0,
            columns_before: shape.1,
            rows_after: shape.0,
            columns_after: shape.1,
            ..Default::default()
        }
    }

    /// Merge a stage log and record the stage outcome.
    pub fn record_stage(
        &mut self,
        log: StageLog,
        outcome: StageOutcome,
        shape: (usize, usize),
    ) {
        let stage = log.stage();
        let (actions, warnings) = log.into_parts();
        if outcome == StageOutcome::Applied {
            self.actions.extend(actions);
        }
        self.warnings.extend(warnings);
        self.stages.push(StageRecord {
            stage,
            outcome,
            rows_after: shape.0,
            columns_after: shape.1,
        });
    }

    /// Count fitted artifacts.
    pub fn count_artifacts(&mut self, artifacts: &[FitArtifact]) {
        self.scalers_count = artifacts.iter().filter(|a| a.is_scaler()).count();
        self.encoders_count = artifacts.iter().filter(|a| a.is_encoder()).count();
        self.fit_artifacts_created = artifacts.len();
    }

    /// Close the report with the final shape.
    pub fn finalize(&mut self, shape: (usize, usize), duration_ms: u64) {
        self.rows_after = shape.0;
        self.columns_after = shape.1;
        self.duration_ms = duration_ms;
        self.finished_at = chrono::Utc::now().to_rfc3339();
    }

    /// Flagged row counts: column -> method -> count.
    pub fn outlier_counts(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        self.outliers.counts()
    }

    /// Outcome recorded for a stage, if it ran.
    pub fn stage_outcome(&self, stage: PipelineStage) -> Option<StageOutcome> {
        self.stages
            .iter()
            .find(|record| record.stage == stage)
            .map(|record| record.outcome)
    }

    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_log_collects_actions_and_warnings() {
        let mut log = StageLog::new(PipelineStage::Normalization);
        log.action(ActionType::DataNormalized, "price", "Standard scaled");
        log.warn(&ProcessingError::StatisticalDegeneracy {
            column: "flat".to_string(),
            statistic: "variance".to_string(),
        });

        assert_eq!(log.actions().len(), 1);
        let warning = &log.warnings()[0];
        assert_eq!(warning.code, "STATISTICAL_DEGENERACY");
        assert_eq!(warning.column.as_deref(), Some("flat"));
        assert_eq!(warning.stage, PipelineStage::Normalization);
    }

    #[test]
    fn test_failed_stage_keeps_warnings_only() {
        let mut report = ProcessingReport::new((4, 2));
        let mut log = StageLog::new(PipelineStage::Encoding);
        log.action(ActionType::CategoriesEncoded, "city", "Label encoded");
        log.warn_message("POLARS_ERROR", None, "boom");

        report.record_stage(log, StageOutcome::Failed, (4, 2));

        assert!(report.actions.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.stage_outcome(PipelineStage::Encoding),
            Some(StageOutcome::Failed)
        );
    }

    #[test]
    fn test_scaler_params_scale() {
        let standard = ScalerParams::Standard {
            mean: 10.0,
            std: 2.0,
        };
        assert_eq!(standard.scale(14.0), 2.0);

        let minmax = ScalerParams::MinMax { min: 0.0, max: 4.0 };
        assert_eq!(minmax.scale(1.0), 0.25);

        let flat = ScalerParams::Robust {
            median: 3.0,
            mad: 0.0,
        };
        assert!(flat.is_degenerate());
        assert_eq!(flat.scale(100.0), 0.0);
    }

    #[test]
    fn test_count_artifacts() {
        let artifacts = vec![
            FitArtifact::Scaler {
                column: "a".to_string(),
                params: ScalerParams::MinMax { min: 0.0, max: 1.0 },
            },
            FitArtifact::Encoder {
                column: "b".to_string(),
                method: EncodingMethod::Label,
                mapping: EncoderMapping::Label(BTreeMap::new()),
            },
        ];
        let mut report = ProcessingReport::new((1, 2));
        report.count_artifacts(&artifacts);

        assert_eq!(report.scalers_count, 1);
        assert_eq!(report.encoders_count, 1);
        assert_eq!(report.fit_artifacts_created, 2);
    }

    #[test]
    fn test_report_serialization() {
        let mut report = ProcessingReport::new((10, 3));
        report.finalize((8, 4), 12);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["rows_before"], 10);
        assert_eq!(json["rows_after"], 8);
        assert_eq!(json["columns_after"], 4);
        assert!(json["warnings"].as_array().unwrap().is_empty());
    }
}
