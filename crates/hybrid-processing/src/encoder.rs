//! Categorical encoding.

use crate::config::EncodingMethod;
use crate::dataset::{Dataset, SemanticType};
use crate::error::Result;
use crate::types::{ActionType, EncoderMapping, FitArtifact, StageLog};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Encodes categorical columns as numbers or indicator columns.
pub struct CategoricalEncoder;

impl CategoricalEncoder {
    /// Encode each column with `method`.
    ///
    /// `columns` defaults to every categorical column except `group_by`;
    /// listed columns of another type are skipped with a warning. Label
    /// codes follow the sorted order of the distinct values, so the same
    /// input always gets the same codes. One-hot falls back to label
    /// encoding when a column has more than `max_categories` values, or when
    /// an indicator name would replace a column already in the dataset.
    /// Missing cells stay missing under every method.
    pub fn encode(
        dataset: &Dataset,
        method: EncodingMethod,
        columns: Option<&[String]>,
        group_by: Option<&str>,
        max_categories: usize,
        log: &mut StageLog,
    ) -> Result<(Dataset, Vec<FitArtifact>)> {
        let columns: Vec<String> = match columns {
            Some(columns) => columns.to_vec(),
            None => dataset
                .columns_of_type(SemanticType::Categorical)
                .into_iter()
                .filter(|name| Some(name.as_str()) != group_by)
                .collect(),
        };

        let mut encoded = dataset.clone();
        let mut artifacts = Vec::new();

        for column in &columns {
            if let Err(e) = dataset.require_type(column, SemanticType::Categorical) {
                log.warn(&e);
                continue;
            }
            let values = dataset.text_values(column)?;
            let categories: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();

            let method = if method == EncodingMethod::OneHot && categories.len() > max_categories {
                log.warn_message(
                    "TOO_MANY_CATEGORIES",
                    Some(column),
                    format!(
                        "'{}' has {} categories (max {}); using label encoding",
                        column,
                        categories.len(),
                        max_categories
                    ),
                );
                EncodingMethod::Label
            } else {
                method
            };

            let method = match one_hot_collision(&encoded, column, &categories) {
                Some(existing) if method == EncodingMethod::OneHot => {
                    log.warn_message(
                        "COLUMN_EXISTS",
                        Some(column),
                        format!(
                            "one-hot column '{}' already exists; using label encoding for '{}'",
                            existing, column
                        ),
                    );
                    EncodingMethod::Label
                }
                _ => method,
            };

            let mapping = match method {
                EncodingMethod::Label => label_encode(&mut encoded, column, &values, &categories)?,
                EncodingMethod::OneHot => one_hot_encode(&mut encoded, column, &values, &categories)?,
                EncodingMethod::Frequency => frequency_encode(&mut encoded, column, &values)?,
            };

            debug!("Encoded '{}' ({} categories)", column, categories.len());
            log.action(
                ActionType::CategoriesEncoded,
                column,
                format!("{:?} encoding of {} categories", method, categories.len()),
            );
            artifacts.push(FitArtifact::Encoder {
                column: column.clone(),
                method,
                mapping,
            });
        }

        info!("Encoded {} columns", artifacts.len());
        Ok((encoded, artifacts))
    }
}

fn label_encode(
    dataset: &mut Dataset,
    column: &str,
    values: &[Option<String>],
    categories: &BTreeSet<&str>,
) -> Result<EncoderMapping> {
    let codes: BTreeMap<String, i64> = categories
        .iter()
        .enumerate()
        .map(|(code, value)| (value.to_string(), code as i64))
        .collect();

    let encoded: Vec<Option<i64>> = values
        .iter()
        .map(|value| value.as_ref().and_then(|v| codes.get(v).copied()))
        .collect();
    dataset.set_column(Series::new(column.into(), encoded), SemanticType::Numeric)?;

    Ok(EncoderMapping::Label(codes))
}

/// First indicator name `{column}_{value}` that is already taken.
fn one_hot_collision(dataset: &Dataset, column: &str, categories: &BTreeSet<&str>) -> Option<String> {
    categories
        .iter()
        .map(|category| indicator_name(column, category))
        .find(|name| dataset.has_column(name))
}

fn indicator_name(column: &str, category: &str) -> String {
    format!("{}_{}", column, category)
}

fn one_hot_encode(
    dataset: &mut Dataset,
    column: &str,
    values: &[Option<String>],
    categories: &BTreeSet<&str>,
) -> Result<EncoderMapping> {
    for category in categories {
        let indicator: Vec<Option<bool>> = values
            .iter()
            .map(|value| value.as_ref().map(|v| v == category))
            .collect();
        let name = indicator_name(column, category);
        dataset.set_column(Series::new(name.as_str().into(), indicator), SemanticType::Boolean)?;
    }
    dataset.drop_column(column)?;

    Ok(EncoderMapping::OneHot(
        categories.iter().map(|c| c.to_string()).collect(),
    ))
}

fn frequency_encode(
    dataset: &mut Dataset,
    column: &str,
    values: &[Option<String>],
) -> Result<EncoderMapping> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.clone()).or_default() += 1;
    }
    let total: usize = counts.values().sum();
    let frequencies: BTreeMap<String, f64> = counts
        .into_iter()
        .map(|(value, count)| (value, count as f64 / total as f64))
        .collect();

    let encoded: Vec<Option<f64>> = values
        .iter()
        .map(|value| value.as_ref().and_then(|v| frequencies.get(v).copied()))
        .collect();
    dataset.set_numeric(column, encoded)?;

    Ok(EncoderMapping::Frequency(frequencies))
}
