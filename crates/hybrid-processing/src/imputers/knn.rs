//! K-Nearest Neighbors imputation.

use polars::prelude::*;
use tracing::debug;

/// Neighbours averaged per missing cell.
pub const DEFAULT_NEIGHBORS: usize = 5;

/// Nearest-neighbour imputation over a single column.
///
/// Distances are nan-euclidean over the features a row has observed. With
/// the imputed column as the only feature, a row missing that value has no
/// observed feature and therefore no defined distance to any donor, so every
/// gap is filled with the mean of all observed values regardless of `k`.
pub struct KnnImputer {
    n_neighbors: usize,
}

impl Default for KnnImputer {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBORS)
    }
}

impl KnnImputer {
    /// Create a new KNN imputer with specified number of neighbors
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Fill every missing cell. `None` when the column has no observed value.
    pub fn fit_transform(&self, series: &Series) -> PolarsResult<Option<Series>> {
        let missing = series.null_count();
        if missing == series.len() {
            return Ok(None);
        }

        debug!(
            "KNN (k={}) imputing {} cells in '{}' from {} donors",
            self.n_neighbors,
            missing,
            series.name(),
            series.len() - missing
        );
        series.fill_null(FillNullStrategy::Mean).map(Some)
    }
}
