//! Shared utilities for the processing stages.
//!
//! Column values travel between stages as `Vec<Option<f64>>` (numeric) or
//! `Vec<Option<String>>` (text). The statistics helpers aggregate the
//! present values with polars; the rest partition rows by group key.

use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a date or datetime type.
#[inline]
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
}

/// Check if a DataType holds text.
#[inline]
pub fn is_text_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::String | DataType::Categorical(_, _))
}

// =============================================================================
// Descriptive Statistics
// =============================================================================

/// Collect the present values of a column.
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

/// Wrap values in a polars array so the aggregations below run on polars.
pub fn float_chunked(values: &[f64]) -> Float64Chunked {
    Float64Chunked::from_slice("values".into(), values)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    float_chunked(values).mean()
}

/// Variance with `ddof` delta degrees of freedom (0 = population, 1 = sample).
pub fn variance(values: &[f64], ddof: u8) -> Option<f64> {
    if values.len() <= ddof as usize {
        return None;
    }
    float_chunked(values).var(ddof)
}

/// Standard deviation with `ddof` delta degrees of freedom.
pub fn std_dev(values: &[f64], ddof: u8) -> Option<f64> {
    variance(values, ddof).map(f64::sqrt)
}

/// Quantile with linear interpolation between closest ranks (`q` in 0.0 - 1.0).
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    float_chunked(values)
        .quantile(q.clamp(0.0, 1.0), QuantileMethod::Linear)
        .ok()
        .flatten()
}

/// Median of the values.
pub fn median(values: &[f64]) -> Option<f64> {
    float_chunked(values).median()
}

/// Median absolute deviation from the median.
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let median = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
    self::median(&deviations)
}

/// Minimum and maximum of the values.
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let values = float_chunked(values);
    Some((values.min()?, values.max()?))
}

/// Most frequent item. Ties go to the item encountered first.
pub fn mode_first<T, I>(items: I) -> Option<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    // (count, first position)
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (position, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(item, _)| item)
}

// =============================================================================
// Grouping & Clipping
// =============================================================================

/// Row positions per group key, ordered by key. Rows with a missing key
/// belong to no group.
pub fn group_partitions(keys: &[Option<String>]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            groups.entry(key.clone()).or_default().push(row);
        }
    }
    groups
}

/// Present values at the given row positions.
pub fn values_at(values: &[Option<f64>], rows: &[usize]) -> Vec<f64> {
    rows.iter().filter_map(|&row| values[row]).collect()
}

/// Clip present values into `[lower, upper]`, returning the number changed.
pub fn clip_values(values: &mut [Option<f64>], lower: f64, upper: f64) -> usize {
    let mut changed = 0;
    for value in values.iter_mut().flatten() {
        let clipped = value.clamp(lower, upper);
        if clipped != *value {
            *value = clipped;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Quantile tests
    // ========================================================================

    #[test]
    fn test_quantile_linear_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert!((quantile(&values, 0.25).unwrap() - 2.25).abs() < 1e-12);
        assert!((quantile(&values, 0.75).unwrap() - 4.75).abs() < 1e-12);
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(100.0));
    }

    #[test]
    fn test_quantile_unsorted_input() {
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_quantile_empty() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(median(&[]), None);
    }

    // ========================================================================
    // Moment tests
    // ========================================================================

    #[test]
    fn test_mean_and_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), Some(5.0));
        assert_eq!(std_dev(&values, 0), Some(2.0));
        let sample = std_dev(&values, 1).unwrap();
        assert!((sample - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_sample_variance_needs_two_values() {
        assert_eq!(variance(&[3.0], 1), None);
        assert_eq!(variance(&[3.0], 0), Some(0.0));
    }

    #[test]
    fn test_median_absolute_deviation() {
        // median 3, deviations [2, 1, 0, 1, 97] -> median 1
        assert_eq!(
            median_absolute_deviation(&[1.0, 2.0, 3.0, 4.0, 100.0]),
            Some(1.0)
        );
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min_max(&[3.0, -1.0, 8.0]), Some((-1.0, 8.0)));
        assert_eq!(min_max(&[]), None);
    }

    // ========================================================================
    // Mode tests
    // ========================================================================

    #[test]
    fn test_mode_first_picks_most_frequent() {
        assert_eq!(mode_first(vec!["b", "a", "a", "c"]), Some("a"));
    }

    #[test]
    fn test_mode_first_ties_go_to_first_encountered() {
        assert_eq!(mode_first(vec!["x", "y", "y", "x", "z"]), Some("x"));
        assert_eq!(mode_first(vec![3, 1, 2]), Some(3));
        assert_eq!(mode_first(Vec::<i32>::new()), None);
    }

    // ========================================================================
    // Grouping tests
    // ========================================================================

    #[test]
    fn test_group_partitions_skips_missing_keys() {
        let keys = vec![
            Some("b".to_string()),
            Some("a".to_string()),
            None,
            Some("b".to_string()),
        ];
        let groups = group_partitions(&keys);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["a"], vec![1]);
        assert_eq!(groups["b"], vec![0, 3]);
    }

    #[test]
    fn test_clip_values_counts_changes() {
        let mut values = vec![Some(-5.0), Some(1.0), None, Some(50.0)];
        let changed = clip_values(&mut values, 0.0, 10.0);
        assert_eq!(changed, 2);
        assert_eq!(values, vec![Some(0.0), Some(1.0), None, Some(10.0)]);
    }

    #[test]
    fn test_dtype_helpers() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float32));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(is_temporal_dtype(&DataType::Date));
        assert!(is_text_dtype(&DataType::String));
    }
}
