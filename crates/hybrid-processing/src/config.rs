//! Configuration types for the processing pipeline.
//!
//! [`PipelineConfig`] is one flat record covering every stage. It can be
//! deserialized from a (partial) JSON document, where missing fields take
//! their defaults, or assembled with [`PipelineConfig::builder()`].
//!
//! Validation happens once, before the first stage runs:
//! [`PipelineConfig::validate`] checks ranges and option combinations and
//! [`PipelineConfig::validate_against`] checks references into the input
//! dataset.

use crate::dataset::Dataset;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Strategy for filling or dropping missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    /// Drop rows where the column is missing
    Drop,
    /// Fill with the column mean
    #[default]
    Mean,
    /// Fill with the column median
    Median,
    /// Fill with the most frequent value
    Mode,
    /// Fill with the mean of the row's `group_by` partition
    GroupMean,
    /// Nearest-neighbour fill on the column alone, which reduces to the
    /// mean of the observed values
    Knn,
    /// Linear interpolation by row order
    Interpolate,
}

/// Outlier detection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutlierMethod {
    #[serde(rename = "iqr")]
    Iqr,
    #[serde(rename = "zscore")]
    ZScore,
    #[serde(rename = "isolation_forest")]
    IsolationForest,
}

impl OutlierMethod {
    /// Key used in reports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iqr => "iqr",
            Self::ZScore => "zscore",
            Self::IsolationForest => "isolation_forest",
        }
    }
}

/// How flagged outliers are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlierTreatmentMethod {
    /// Clip to the detected IQR bounds, or to the 5th/95th percentiles
    #[default]
    Winsorize,
    /// Clip to the 5th/95th percentiles
    Cap,
    /// Drop every row flagged by any method
    Remove,
    /// Replace values with `ln(1 + x)`
    #[serde(alias = "transform")]
    LogTransform,
}

/// Distribution-stabilizing transform producing a derived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Log,
    BoxCox,
    Sqrt,
    Square,
}

impl TransformKind {
    /// Suffix of the derived column (`{col}_{suffix}`).
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::BoxCox => "boxcox",
            Self::Sqrt => "sqrt",
            Self::Square => "square",
        }
    }
}

/// Global scaling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMethod {
    /// (x - mean) / std
    #[default]
    Standard,
    /// (x - min) / (max - min)
    MinMax,
    /// (x - median) / MAD
    Robust,
}

/// Per-group scaling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupNormalizationMethod {
    /// Writes `{col}_N`
    #[default]
    MinMax,
    /// Writes `{col}_S`
    Standard,
}

/// Categorical encoding method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMethod {
    /// Integer codes in sorted order of the distinct values
    #[default]
    Label,
    /// One boolean column per distinct value
    OneHot,
    /// Relative frequency of the value
    Frequency,
}

/// Which occurrence of a duplicated row survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKeep {
    #[default]
    First,
    Last,
}

/// Configuration for the processing pipeline.
///
/// Column lists set to `None` mean "every column of the stage's semantic
/// type"; the `group_by` column is never picked up by a numeric default.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_processing::config::{PipelineConfig, MissingStrategy, OutlierMethod};
///
/// let config = PipelineConfig::builder()
///     .missing_strategy(MissingStrategy::Median)
///     .outlier_methods(vec![OutlierMethod::Iqr])
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run the missing-value stage.
    pub handle_missing: bool,
    /// Fill strategy for missing values.
    pub missing_strategy: MissingStrategy,
    /// Columns whose missing ratio exceeds this value are dropped (0.0 - 1.0).
    pub missing_threshold: f64,
    /// Columns the missing-value stage looks at.
    pub missing_columns: Option<Vec<String>>,
    /// Partition column for grouped detection, imputation and normalization.
    pub group_by: Option<String>,

    /// Run the duplicate removal stage.
    pub remove_duplicates: bool,
    /// Columns compared for equality; all columns when `None`.
    pub duplicate_subset: Option<Vec<String>>,
    /// Which duplicate survives.
    pub duplicate_keep: DuplicateKeep,

    /// Run outlier detection.
    pub detect_outliers: bool,
    /// Columns to scan for outliers.
    pub outlier_columns: Option<Vec<String>>,
    /// Detection methods, each reported independently.
    pub outlier_methods: Vec<OutlierMethod>,
    /// Run outlier treatment.
    pub handle_outliers: bool,
    /// Treatment applied to detected outliers.
    pub outlier_method: OutlierTreatmentMethod,

    /// Run the distribution transformer.
    pub apply_transformations: bool,
    /// Transforms to derive.
    pub transformations: Vec<TransformKind>,
    /// Columns to transform.
    pub transform_columns: Option<Vec<String>>,

    /// Normalize within `group_by` partitions (takes precedence over global).
    pub normalize_by_group: bool,
    /// Method for grouped normalization.
    pub group_normalization_method: GroupNormalizationMethod,
    /// Columns to normalize (grouped and global).
    pub normalize_columns: Option<Vec<String>>,
    /// Normalize whole columns.
    pub normalize_global: bool,
    /// Method for global normalization.
    pub normalization_method: NormalizationMethod,

    /// Run categorical encoding.
    pub encode_categorical: bool,
    /// Encoding method.
    pub encoding_method: EncodingMethod,
    /// Columns to encode.
    pub encoding_columns: Option<Vec<String>>,
    /// One-hot falls back to label encoding above this many categories.
    pub max_categories: usize,

    /// Run temporal parsing and feature extraction.
    pub normalize_dates: bool,
    /// Columns to parse as dates; auto-detected when `None`.
    pub date_columns: Option<Vec<String>>,
    /// Derive year/month/day/weekday/quarter/is_weekend columns.
    pub extract_date_features: bool,
    /// Preferred chrono format for parsing text dates.
    pub date_format: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            handle_missing: true,
            missing_strategy: MissingStrategy::default(),
            missing_threshold: 0.5,
            missing_columns: None,
            group_by: None,
            remove_duplicates: true,
            duplicate_subset: None,
            duplicate_keep: DuplicateKeep::default(),
            detect_outliers: true,
            outlier_columns: None,
            outlier_methods: vec![OutlierMethod::Iqr, OutlierMethod::ZScore],
            handle_outliers: true,
            outlier_method: OutlierTreatmentMethod::default(),
            apply_transformations: false,
            transformations: vec![TransformKind::Log],
            transform_columns: None,
            normalize_by_group: false,
            group_normalization_method: GroupNormalizationMethod::default(),
            normalize_columns: None,
            normalize_global: true,
            normalization_method: NormalizationMethod::default(),
            encode_categorical: true,
            encoding_method: EncodingMethod::default(),
            encoding_columns: None,
            max_categories: 50,
            normalize_dates: true,
            date_columns: None,
            extract_date_features: true,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Validate option ranges and combinations.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.missing_threshold) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "missing_threshold".to_string(),
                value: self.missing_threshold,
            });
        }

        if self.max_categories == 0 {
            return Err(ConfigValidationError::InvalidMaxCategories(
                self.max_categories,
            ));
        }

        if self.detect_outliers && self.outlier_methods.is_empty() {
            return Err(ConfigValidationError::EmptyMethodList {
                field: "outlier_methods".to_string(),
            });
        }

        if self.apply_transformations && self.transformations.is_empty() {
            return Err(ConfigValidationError::EmptyMethodList {
                field: "transformations".to_string(),
            });
        }

        let needs_group_by = if self.handle_missing
            && self.missing_strategy == MissingStrategy::GroupMean
        {
            Some("group_mean imputation")
        } else if self.normalize_by_group {
            Some("normalize_by_group")
        } else {
            None
        };

        if let Some(feature) = needs_group_by
            && self.group_by.is_none()
        {
            return Err(ConfigValidationError::MissingGroupBy {
                feature: feature.to_string(),
            });
        }

        if self.date_format.trim().is_empty() {
            return Err(ConfigValidationError::EmptyDateFormat);
        }

        Ok(())
    }

    /// Validate references into the dataset the config will run against.
    pub fn validate_against(
        &self,
        dataset: &Dataset,
    ) -> std::result::Result<(), ConfigValidationError> {
        self.validate()?;

        if let Some(group_by) = &self.group_by
            && !dataset.has_column(group_by)
        {
            return Err(ConfigValidationError::UnknownColumn {
                field: "group_by".to_string(),
                column: group_by.clone(),
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid max_categories: {0} (must be at least 1)")]
    InvalidMaxCategories(usize),

    #[error("'{field}' must not be empty while its stage is enabled")]
    EmptyMethodList { field: String },

    #[error("{feature} requires 'group_by' to be set")]
    MissingGroupBy { feature: String },

    #[error("'{field}' references unknown column '{column}'")]
    UnknownColumn { field: String, column: String },

    #[error("'date_format' must not be empty")]
    EmptyDateFormat,
}

/// Builder for [`PipelineConfig`] with fluent API.
///
/// Unset fields take the values of [`PipelineConfig::default()`].
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: Option<PipelineConfig>,
}

macro_rules! builder_setter {
    ($(#[$doc:meta])* $name:ident: $ty:ty) => {
        $(#[$doc])*
        pub fn $name(mut self, value: $ty) -> Self {
            self.config_mut().$name = value;
            self
        }
    };
}

impl PipelineConfigBuilder {
    fn config_mut(&mut self) -> &mut PipelineConfig {
        self.config.get_or_insert_with(PipelineConfig::default)
    }

    builder_setter!(
        /// Enable or disable the missing-value stage.
        handle_missing: bool
    );
    builder_setter!(
        /// Set the missing-value strategy.
        missing_strategy: MissingStrategy
    );
    builder_setter!(
        /// Set the column drop threshold (0.0 - 1.0).
        missing_threshold: f64
    );
    builder_setter!(
        /// Enable or disable duplicate removal.
        remove_duplicates: bool
    );
    builder_setter!(
        /// Set which duplicate survives.
        duplicate_keep: DuplicateKeep
    );
    builder_setter!(
        /// Enable or disable outlier detection.
        detect_outliers: bool
    );
    builder_setter!(
        /// Set the outlier detection methods.
        outlier_methods: Vec<OutlierMethod>
    );
    builder_setter!(
        /// Enable or disable outlier treatment.
        handle_outliers: bool
    );
    builder_setter!(
        /// Set the outlier treatment.
        outlier_method: OutlierTreatmentMethod
    );
    builder_setter!(
        /// Enable or disable distribution transforms.
        apply_transformations: bool
    );
    builder_setter!(
        /// Set the transforms to derive.
        transformations: Vec<TransformKind>
    );
    builder_setter!(
        /// Enable or disable grouped normalization.
        normalize_by_group: bool
    );
    builder_setter!(
        /// Set the grouped normalization method.
        group_normalization_method: GroupNormalizationMethod
    );
    builder_setter!(
        /// Enable or disable global normalization.
        normalize_global: bool
    );
    builder_setter!(
        /// Set the global normalization method.
        normalization_method: NormalizationMethod
    );
    builder_setter!(
        /// Enable or disable categorical encoding.
        encode_categorical: bool
    );
    builder_setter!(
        /// Set the encoding method.
        encoding_method: EncodingMethod
    );
    builder_setter!(
        /// Set the one-hot cardinality limit.
        max_categories: usize
    );
    builder_setter!(
        /// Enable or disable date parsing.
        normalize_dates: bool
    );
    builder_setter!(
        /// Enable or disable temporal feature columns.
        extract_date_features: bool
    );

    /// Set the partition column.
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.config_mut().group_by = Some(column.into());
        self
    }

    /// Restrict the missing-value stage to these columns.
    pub fn missing_columns(mut self, columns: Vec<String>) -> Self {
        self.config_mut().missing_columns = Some(columns);
        self
    }

    /// Compare only these columns when removing duplicates.
    pub fn duplicate_subset(mut self, columns: Vec<String>) -> Self {
        self.config_mut().duplicate_subset = Some(columns);
        self
    }

    /// Restrict outlier detection to these columns.
    pub fn outlier_columns(mut self, columns: Vec<String>) -> Self {
        self.config_mut().outlier_columns = Some(columns);
        self
    }

    /// Restrict transforms to these columns.
    pub fn transform_columns(mut self, columns: Vec<String>) -> Self {
        self.config_mut().transform_columns = Some(columns);
        self
    }

    /// Restrict normalization to these columns.
    pub fn normalize_columns(mut self, columns: Vec<String>) -> Self {
        self.config_mut().normalize_columns = Some(columns);
        self
    }

    /// Restrict encoding to these columns.
    pub fn encoding_columns(mut self, columns: Vec<String>) -> Self {
        self.config_mut().encoding_columns = Some(columns);
        self
    }

    /// Parse only these columns as dates.
    pub fn date_columns(mut self, columns: Vec<String>) -> Self {
        self.config_mut().date_columns = Some(columns);
        self
    }

    /// Set the preferred date format.
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.config_mut().date_format = format.into();
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}
