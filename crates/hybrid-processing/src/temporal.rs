//! Date parsing and calendar feature extraction.
//!
//! Text columns are parsed into a polars `Date` column. The configured
//! format is tried first, then a list of common layouts, then RFC 3339.
//! Entries that match none of them become missing.

use crate::dataset::{DATE_SAMPLE_SIZE, Dataset, SemanticType};
use crate::error::{ProcessingError, Result};
use crate::types::{ActionType, StageLog};
use crate::utils::is_temporal_dtype;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info};

/// Format tried first when none is configured.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Days from 0001-01-01 (day 1 of the common era) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

// Date pattern regexes - compiled once at startup
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^\d{4}[-/.]\d{1,2}[-/.]\d{1,2}$").expect("Invalid regex: YYYY-MM-DD"),
        Regex::new(r"^\d{1,2}[-/.]\d{1,2}[-/.]\d{4}$").expect("Invalid regex: DD-MM-YYYY"),
        Regex::new(r"^\d{4}-\d{2}-\d{2}\s\d{2}:\d{2}(:\d{2})?").expect("Invalid regex: datetime"),
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").expect("Invalid regex: ISO"),
    ]
});

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%m-%d-%Y",
    "%d.%m.%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Whether a text value has the shape of a date and parses as one.
pub fn looks_like_date(value: &str) -> bool {
    let value = value.trim();
    DATE_PATTERNS.iter().any(|pattern| pattern.is_match(value))
        && parse_date(value, DEFAULT_DATE_FORMAT).is_some()
}

/// Parse a date, trying `format` before the built-in layouts.
pub fn parse_date(value: &str, format: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(date) = parse_with(value, format) {
        return Some(date);
    }
    DATE_FORMATS
        .iter()
        .chain(DATETIME_FORMATS)
        .find_map(|format| parse_with(value, format))
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

fn parse_with(value: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, format)
                .ok()
                .map(|dt| dt.date())
        })
}

/// Days since the Unix epoch, the physical value of a polars `Date`.
pub fn to_epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Inverse of [`to_epoch_days`].
pub fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Parses date columns and derives calendar features.
pub struct TemporalExtractor;

impl TemporalExtractor {
    /// Parse each date column into a `Date` column.
    ///
    /// Without `date_columns`, every temporal column is used, plus text
    /// columns whose first non-missing values all look like dates. With
    /// `extract_features`, `{col}_year`, `_month`, `_day`, `_weekday`
    /// (Monday = 0), `_quarter` and `_is_weekend` are appended.
    pub fn extract(
        dataset: &Dataset,
        date_columns: Option<&[String]>,
        format: &str,
        extract_features: bool,
        log: &mut StageLog,
    ) -> Result<Dataset> {
        let columns: Vec<String> = match date_columns {
            Some(columns) => columns.to_vec(),
            None => detect_date_columns(dataset)?,
        };
        info!("Normalizing dates: {:?}", columns);

        let mut extracted = dataset.clone();
        for column in &columns {
            match dataset.require(column) {
                Ok(SemanticType::Temporal | SemanticType::Categorical) => {}
                Ok(_) => {
                    log.warn(&ProcessingError::UnsupportedType {
                        column: column.clone(),
                        expected: "temporal or text".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    log.warn(&e);
                    continue;
                }
            }

            let days = epoch_days(dataset, column, format)?;
            let non_missing = dataset.height() - dataset.frame().column(column)?.null_count();
            let parsed = days.iter().filter(|d| d.is_some()).count();
            if parsed == 0 {
                log.warn(&ProcessingError::NoValidValues(column.clone()));
                continue;
            }

            let dates = Series::new(column.as_str().into(), days.clone()).cast(&DataType::Date)?;
            extracted.set_column(dates, SemanticType::Temporal)?;
            log.action(
                ActionType::DatesParsed,
                column,
                format!(
                    "Parsed {} dates ({} unparsable set to missing)",
                    parsed,
                    non_missing.saturating_sub(parsed)
                ),
            );

            if extract_features {
                add_features(&mut extracted, column, &days)?;
                log.action(
                    ActionType::ColumnDerived,
                    column,
                    "Extracted year, month, day, weekday, quarter and is_weekend",
                );
            }
        }

        Ok(extracted)
    }
}

fn detect_date_columns(dataset: &Dataset) -> Result<Vec<String>> {
    let mut columns = Vec::new();
    for column in dataset.column_names() {
        match dataset.semantic_type(&column) {
            Some(SemanticType::Temporal) => columns.push(column),
            Some(SemanticType::Categorical) => {
                let sample: Vec<String> = dataset
                    .text_values(&column)?
                    .into_iter()
                    .flatten()
                    .take(DATE_SAMPLE_SIZE)
                    .collect();
                if !sample.is_empty() && sample.iter().all(|v| looks_like_date(v)) {
                    columns.push(column);
                }
            }
            _ => {}
        }
    }
    debug!("Detected {} date columns", columns.len());
    Ok(columns)
}

/// Epoch days per row: native date columns are cast, text is parsed.
fn epoch_days(dataset: &Dataset, column: &str, format: &str) -> Result<Vec<Option<i32>>> {
    let series = dataset.frame().column(column)?.as_materialized_series();
    if is_temporal_dtype(series.dtype()) {
        let days = series.cast(&DataType::Date)?.cast(&DataType::Int32)?;
        return Ok(days.i32()?.into_iter().collect());
    }

    Ok(dataset
        .text_values(column)?
        .iter()
        .map(|value| {
            value
                .as_deref()
                .and_then(|v| parse_date(v, format))
                .map(to_epoch_days)
        })
        .collect())
}

fn add_features(dataset: &mut Dataset, column: &str, days: &[Option<i32>]) -> Result<()> {
    let dates: Vec<Option<NaiveDate>> = days
        .iter()
        .map(|d| d.and_then(from_epoch_days))
        .collect();

    let int_feature = |suffix: &str, f: fn(&NaiveDate) -> i32| {
        let values: Vec<Option<i32>> = dates.iter().map(|d| d.as_ref().map(f)).collect();
        Series::new(format!("{}_{}", column, suffix).as_str().into(), values)
    };

    let features = [
        int_feature("year", |d| d.year()),
        int_feature("month", |d| d.month() as i32),
        int_feature("day", |d| d.day() as i32),
        int_feature("weekday", |d| d.weekday().num_days_from_monday() as i32),
        int_feature("quarter", |d| d.month0() as i32 / 3 + 1),
    ];
    for feature in features {
        dataset.set_column(feature, SemanticType::Numeric)?;
    }

    let weekend: Vec<Option<bool>> = dates
        .iter()
        .map(|d| d.map(|d| d.weekday().num_days_from_monday() >= 5))
        .collect();
    dataset.set_column(
        Series::new(format!("{}_is_weekend", column).as_str().into(), weekend),
        SemanticType::Boolean,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStage;

    // ========================================================================
    // Parsing tests
    // ========================================================================

    #[test]
    fn test_looks_like_date() {
        assert!(looks_like_date("2024-03-15"));
        assert!(looks_like_date("15/03/2024"));
        assert!(looks_like_date("2024-03-15 10:30:00"));
        assert!(looks_like_date("2024-03-15T10:30:00Z"));
        assert!(!looks_like_date("2024-13-45"));
        assert!(!looks_like_date("Paris"));
        assert!(!looks_like_date("12345"));
    }

    #[test]
    fn test_parse_date_prefers_configured_format() {
        // ambiguous day/month: the configured format wins
        assert_eq!(
            parse_date("03/04/2024", "%m/%d/%Y"),
            NaiveDate::from_ymd_opt(2024, 3, 4)
        );
        assert_eq!(
            parse_date("03/04/2024", "%d/%m/%Y"),
            NaiveDate::from_ymd_opt(2024, 4, 3)
        );
        assert_eq!(parse_date("garbage", "%Y-%m-%d"), None);
    }

    #[test]
    fn test_epoch_day_conversion() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(to_epoch_days(epoch), 0);
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(from_epoch_days(to_epoch_days(date)), Some(date));
    }

    // ========================================================================
    // Extraction tests
    // ========================================================================

    fn dataset() -> Dataset {
        let df = df![
            "joined" => [Some("2024-03-15"), Some("2024-03-16"), Some("not a date"), None],
            "city" => ["a", "b", "c", "d"],
        ]
        .unwrap();
        // one bad value keeps the column categorical at ingestion
        Dataset::from_frame(df).unwrap()
    }

    #[test]
    fn test_extract_parses_and_derives_features() {
        let mut log = StageLog::new(PipelineStage::TemporalExtraction);
        let columns = vec!["joined".to_string()];
        let out =
            TemporalExtractor::extract(&dataset(), Some(&columns), DEFAULT_DATE_FORMAT, true, &mut log)
                .unwrap();

        assert_eq!(out.frame().column("joined").unwrap().dtype(), &DataType::Date);
        assert_eq!(out.semantic_type("joined"), Some(SemanticType::Temporal));
        assert_eq!(out.missing_count("joined").unwrap(), 2);

        assert_eq!(
            out.numeric_values("joined_year").unwrap(),
            vec![Some(2024.0), Some(2024.0), None, None]
        );
        assert_eq!(out.numeric_values("joined_quarter").unwrap()[0], Some(1.0));
        // 2024-03-15 is a Friday, 2024-03-16 a Saturday
        let weekday = out.numeric_values("joined_weekday").unwrap();
        assert_eq!(weekday[0], Some(4.0));
        assert_eq!(weekday[1], Some(5.0));
        let weekend = out.text_values("joined_is_weekend").unwrap();
        assert_eq!(weekend[0].as_deref(), Some("false"));
        assert_eq!(weekend[1].as_deref(), Some("true"));
    }

    #[test]
    fn test_extract_without_features() {
        let mut log = StageLog::new(PipelineStage::TemporalExtraction);
        let columns = vec!["joined".to_string()];
        let out = TemporalExtractor::extract(
            &dataset(),
            Some(&columns),
            DEFAULT_DATE_FORMAT,
            false,
            &mut log,
        )
        .unwrap();

        assert_eq!(out.width(), 2);
    }

    #[test]
    fn test_auto_detection_uses_temporal_columns() {
        let df = df![
            "day" => ["2021-01-04", "2021-01-05"],
            "name" => ["x", "y"],
            "n" => [1i64, 2],
        ]
        .unwrap();
        let dataset = Dataset::from_frame(df).unwrap();
        let mut log = StageLog::new(PipelineStage::TemporalExtraction);
        let out = TemporalExtractor::extract(&dataset, None, DEFAULT_DATE_FORMAT, true, &mut log)
            .unwrap();

        assert!(out.has_column("day_month"));
        assert!(!out.has_column("name_month"));
        assert_eq!(log.actions()[0].action_type, ActionType::DatesParsed);
    }

    #[test]
    fn test_numeric_and_unparsable_columns_warn() {
        let df = df![
            "n" => [1i64, 2],
            "words" => ["alpha", "beta"],
        ]
        .unwrap();
        let dataset = Dataset::from_frame(df).unwrap();
        let mut log = StageLog::new(PipelineStage::TemporalExtraction);
        let columns = vec!["n".to_string(), "words".to_string()];
        let out = TemporalExtractor::extract(
            &dataset,
            Some(&columns),
            DEFAULT_DATE_FORMAT,
            true,
            &mut log,
        )
        .unwrap();

        let codes: Vec<&str> = log.warnings().iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["UNSUPPORTED_TYPE", "NO_VALID_VALUES"]);
        assert_eq!(out.width(), 2);
    }
}
