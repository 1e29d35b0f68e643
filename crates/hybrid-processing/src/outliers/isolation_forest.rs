//! Univariate isolation forest.
//!
//! Each tree isolates values of a random sub-sample by repeated uniform
//! splits between the current minimum and maximum. Values that are isolated
//! after few splits get a high anomaly score. The forest is seeded, so the
//! same input always yields the same flags.

use crate::utils::quantile;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Share of values labelled anomalous.
pub const CONTAMINATION: f64 = 0.1;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

enum Node {
    Leaf { size: usize },
    Split { at: f64, left: Box<Node>, right: Box<Node> },
}

/// Seeded isolation forest over a single feature.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_trees: usize,
    max_samples: usize,
    seed: u64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(100, 256, 42)
    }
}

impl IsolationForest {
    /// Create a forest with `n_trees` trees over sub-samples of at most
    /// `max_samples` values.
    pub fn new(n_trees: usize, max_samples: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            max_samples: max_samples.max(2),
            seed,
        }
    }

    /// Anomaly score in (0, 1] for every value; higher is more anomalous.
    /// Values are expected to be finite.
    pub fn score_samples(&self, values: &[f64]) -> Vec<f64> {
        let n = values.len();
        if n < 2 {
            return vec![0.0; n];
        }

        let sample_size = self.max_samples.min(n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let trees: Vec<Node> = (0..self.n_trees)
            .map(|_| {
                let sample: Vec<f64> = index::sample(&mut rng, n, sample_size)
                    .into_iter()
                    .map(|i| values[i])
                    .collect();
                build_tree(sample, 0, height_limit, &mut rng)
            })
            .collect();

        let normalizer = average_path_length(sample_size);
        values
            .iter()
            .map(|&value| {
                let mean_depth = trees
                    .iter()
                    .map(|tree| path_length(tree, value, 0))
                    .sum::<f64>()
                    / trees.len() as f64;
                2f64.powf(-mean_depth / normalizer)
            })
            .collect()
    }

    /// Label the `contamination` share of highest-scoring values anomalous.
    pub fn fit_predict(&self, values: &[f64], contamination: f64) -> Vec<bool> {
        let scores = self.score_samples(values);
        let Some(threshold) = quantile(&scores, 1.0 - contamination) else {
            return Vec::new();
        };
        scores.iter().map(|&score| score > threshold).collect()
    }
}

fn build_tree(sample: Vec<f64>, depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
    if depth >= height_limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    let (min, max) = sample
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min >= max {
        return Node::Leaf { size: sample.len() };
    }

    let at = split_point(min, max, rng.gen_range(0.0..1.0));
    let (left, right): (Vec<f64>, Vec<f64>) = sample.into_iter().partition(|&v| v < at);

    Node::Split {
        at,
        left: Box::new(build_tree(left, depth + 1, height_limit, rng)),
        right: Box::new(build_tree(right, depth + 1, height_limit, rng)),
    }
}

/// Point at fraction `t` of `[min, max]`. Interpolating from both ends
/// stays finite even when `max - min` overflows.
fn split_point(min: f64, max: f64, t: f64) -> f64 {
    let span = max - min;
    if span.is_finite() {
        min + t * span
    } else {
        min * (1.0 - t) + max * t
    }
}

fn path_length(node: &Node, value: f64, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split { at, left, right } => {
            if value < *at {
                path_length(left, value, depth + 1)
            } else {
                path_length(right, value, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` nodes.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_with_outlier() -> Vec<f64> {
        let mut values: Vec<f64> = (0..40).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
        values.push(500.0);
        values
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn test_outlier_scores_highest() {
        let values = clustered_with_outlier();
        let scores = IsolationForest::default().score_samples(&values);
        let outlier_score = *scores.last().unwrap();
        assert!(scores[..40].iter().all(|&s| s < outlier_score));
    }

    #[test]
    fn test_fit_predict_flags_extreme_value() {
        let values = clustered_with_outlier();
        let flags = IsolationForest::default().fit_predict(&values, CONTAMINATION);
        assert_eq!(flags.len(), values.len());
        assert!(flags[40]);
        assert!(flags.iter().filter(|&&f| f).count() <= 5);
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let values = clustered_with_outlier();
        let first = IsolationForest::default().score_samples(&values);
        let second = IsolationForest::default().score_samples(&values);
        assert_eq!(first, second);
    }

    #[test]
    fn test_constant_values_flag_nothing() {
        let values = vec![3.0; 20];
        let flags = IsolationForest::default().fit_predict(&values, CONTAMINATION);
        assert!(flags.iter().all(|&f| !f));
    }

    #[test]
    fn test_tiny_input() {
        assert_eq!(
            IsolationForest::default().fit_predict(&[1.0], CONTAMINATION),
            vec![false]
        );
        assert!(IsolationForest::default().fit_predict(&[], CONTAMINATION).is_empty());
    }

    #[test]
    fn test_split_point_stays_finite_on_overflowing_span() {
        let at = split_point(-1e308, 1e308, 0.75);
        assert!(at.is_finite());
        assert!(at > 0.0 && at < 1e308);
        assert_eq!(split_point(0.0, 10.0, 0.5), 5.0);
    }

    #[test]
    fn test_extreme_finite_values_do_not_overflow() {
        let values = [-1e308, 0.0, 1.0, 2.0, 1e308];
        let flags = IsolationForest::default().fit_predict(&values, CONTAMINATION);
        assert_eq!(flags.len(), values.len());
    }
}
