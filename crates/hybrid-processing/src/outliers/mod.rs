//! Outlier detection and treatment.
//!
//! Detection runs each requested method independently and stores the results
//! side by side in an [`OutlierReport`]; nothing merges them. Treatment reads
//! that report later in the run, so flagged rows are stored as stable row ids
//! (see [`Dataset::row_ids`](crate::dataset::Dataset::row_ids)).

mod detector;
mod isolation_forest;
mod treatment;

pub use detector::{IQR_MULTIPLIER, OutlierDetector, ZSCORE_THRESHOLD};
pub use isolation_forest::{CONTAMINATION, IsolationForest};
pub use treatment::{CAP_LOWER_QUANTILE, CAP_UPPER_QUANTILE, OutlierTreatment};

use crate::config::OutlierMethod;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lower and upper IQR fences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub lower: f64,
    pub upper: f64,
}

/// Result of one detection method on one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodOutliers {
    /// Ids of the flagged rows, ascending.
    pub rows: Vec<usize>,
    pub count: usize,
    /// Flagged rows as a percentage of all rows.
    pub percentage: f64,
    /// Global IQR fences (IQR method without grouping).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<IqrBounds>,
    /// Per-group IQR fences (IQR method with grouping).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub group_bounds: BTreeMap<String, IqrBounds>,
}

impl MethodOutliers {
    /// Build from flagged row ids.
    pub fn from_rows(rows: Vec<usize>, total_rows: usize) -> Self {
        let count = rows.len();
        let percentage = if total_rows == 0 {
            0.0
        } else {
            count as f64 / total_rows as f64 * 100.0
        };
        Self {
            rows,
            count,
            percentage,
            ..Default::default()
        }
    }
}

/// Outlier results per column and method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    /// Partition column used for grouped fences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    pub columns: BTreeMap<String, BTreeMap<OutlierMethod, MethodOutliers>>,
}

impl OutlierReport {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Record one method's result for a column.
    pub fn insert(&mut self, column: &str, method: OutlierMethod, result: MethodOutliers) {
        self.columns
            .entry(column.to_string())
            .or_default()
            .insert(method, result);
    }

    /// Result of a method on a column.
    pub fn get(&self, column: &str, method: OutlierMethod) -> Option<&MethodOutliers> {
        self.columns.get(column)?.get(&method)
    }

    /// Union of flagged row ids across every column and method.
    pub fn flagged_rows(&self) -> BTreeSet<usize> {
        self.columns
            .values()
            .flat_map(|methods| methods.values())
            .flat_map(|result| result.rows.iter().copied())
            .collect()
    }

    /// Flagged row counts: column -> method -> count.
    pub fn counts(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        self.columns
            .iter()
            .map(|(column, methods)| {
                let counts = methods
                    .iter()
                    .map(|(method, result)| (method.as_str().to_string(), result.count))
                    .collect();
                (column.clone(), counts)
            })
            .collect()
    }
}
