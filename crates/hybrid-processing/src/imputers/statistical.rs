//! Statistical imputation methods.
//!
//! Provides mean, median, mode, group mean and interpolation fills over a
//! single Float64 column. Fills return a new series; `None` means the column
//! had no values to compute a fill from.

use crate::utils::{mean, mode_first, values_at};
use polars::prelude::*;
use std::collections::BTreeMap;

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Fill with the column mean.
    pub fn fill_mean(series: &Series) -> PolarsResult<Option<Series>> {
        if series.null_count() == series.len() {
            return Ok(None);
        }
        series.fill_null(FillNullStrategy::Mean).map(Some)
    }

    /// Fill with the column median.
    pub fn fill_median(series: &Series) -> PolarsResult<Option<Series>> {
        match series.median() {
            Some(median) => fill_with_value(series, median).map(Some),
            None => Ok(None),
        }
    }

    /// Fill with the most frequent value; ties go to the value seen first.
    pub fn fill_mode(series: &Series) -> PolarsResult<Option<Series>> {
        let values = series.f64()?;
        match mode_first(values.into_iter().flatten().map(f64::to_bits)) {
            Some(bits) => fill_with_value(series, f64::from_bits(bits)).map(Some),
            None => Ok(None),
        }
    }

    /// Mode fill for text columns.
    pub fn fill_mode_text(values: &mut [Option<String>]) -> Option<usize> {
        let fill = mode_first(values.iter().flatten().cloned())?;
        let mut filled = 0;
        for value in values.iter_mut().filter(|v| v.is_none()) {
            *value = Some(fill.clone());
            filled += 1;
        }
        Some(filled)
    }

    /// Fill each partition with its own mean.
    ///
    /// Also returns the keys of the groups that had no values at all; those
    /// rows stay missing, as do rows without a group key.
    pub fn fill_group_mean(
        series: &Series,
        groups: &BTreeMap<String, Vec<usize>>,
    ) -> PolarsResult<(Series, Vec<String>)> {
        let mut values: Vec<Option<f64>> = series.f64()?.into_iter().collect();
        let mut empty_groups = Vec::new();

        for (key, rows) in groups {
            if rows.iter().all(|&row| values[row].is_some()) {
                continue;
            }
            let Some(fill) = mean(&values_at(&values, rows)) else {
                empty_groups.push(key.clone());
                continue;
            };
            for &row in rows {
                values[row].get_or_insert(fill);
            }
        }

        Ok((Series::new(series.name().clone(), values), empty_groups))
    }

    /// Linear interpolation by row position.
    ///
    /// Interior gaps are interpolated between their neighbours, trailing
    /// gaps repeat the last value, leading gaps stay missing.
    pub fn interpolate(series: &Series) -> PolarsResult<Series> {
        interpolate(series, InterpolationMethod::Linear).fill_null(FillNullStrategy::Forward(None))
    }
}

fn fill_with_value(series: &Series, value: f64) -> PolarsResult<Series> {
    Ok(series.f64()?.fill_null_with_values(value)?.into_series())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::group_partitions;

    fn column(values: &[Option<f64>]) -> Series {
        Series::new("v".into(), values)
    }

    fn collect(series: &Series) -> Vec<Option<f64>> {
        series.f64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_fill_mean_and_median() {
        let series = column(&[Some(1.0), None, Some(2.0), Some(9.0)]);

        let mean = StatisticalImputer::fill_mean(&series).unwrap().unwrap();
        assert_eq!(collect(&mean)[1], Some(4.0));
        assert_eq!(mean.name().as_str(), "v");

        let median = StatisticalImputer::fill_median(&series).unwrap().unwrap();
        assert_eq!(collect(&median)[1], Some(2.0));
    }

    #[test]
    fn test_fill_mean_all_missing() {
        let series = column(&[None, None]);
        assert!(StatisticalImputer::fill_mean(&series).unwrap().is_none());
        assert!(StatisticalImputer::fill_median(&series).unwrap().is_none());
    }

    #[test]
    fn test_fill_mode_ties_go_to_first_seen() {
        let series = column(&[Some(7.0), Some(3.0), None, Some(3.0), Some(7.0)]);
        let filled = StatisticalImputer::fill_mode(&series).unwrap().unwrap();
        assert_eq!(collect(&filled)[2], Some(7.0));

        let mut text = vec![Some("b".to_string()), None, Some("a".to_string())];
        assert_eq!(StatisticalImputer::fill_mode_text(&mut text), Some(1));
        assert_eq!(text[1].as_deref(), Some("b"));
    }

    #[test]
    fn test_group_mean_leaves_empty_group_missing() {
        let keys: Vec<Option<String>> = ["a", "a", "b", "b"]
            .iter()
            .map(|k| Some(k.to_string()))
            .collect();
        let groups = group_partitions(&keys);
        let series = column(&[Some(2.0), None, None, None]);

        let (filled, empty) = StatisticalImputer::fill_group_mean(&series, &groups).unwrap();

        assert_eq!(empty, vec!["b".to_string()]);
        assert_eq!(collect(&filled), vec![Some(2.0), Some(2.0), None, None]);
    }

    #[test]
    fn test_interpolate() {
        let series = column(&[None, Some(1.0), None, None, Some(4.0), None]);
        let filled = StatisticalImputer::interpolate(&series).unwrap();

        assert_eq!(filled.null_count(), 1);
        let values = collect(&filled);
        assert_eq!(values[0], None);
        assert!((values[2].unwrap() - 2.0).abs() < 1e-12);
        assert!((values[3].unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(values[5], Some(4.0));
    }
}
