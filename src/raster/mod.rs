//! Collaborators that supply composites and reduce them over a station buffer.
//!
//! A hosted imagery backend implements [`RecordSource`] and [`RasterStatistics`];
//! the in-process [`InMemoryRecordSource`] and [`GridReducer`] cover local grids
//! and tests.

pub mod grid_reducer;
pub mod memory_source;
pub mod region;
pub mod retry;

pub use grid_reducer::{GridReducer, Weighting};
pub use memory_source::InMemoryRecordSource;
pub use region::{CoverageTolerance, Region};
pub use retry::{Attempted, BackoffStrategy, RetryPolicy};

use crate::error::BackendError;
use crate::models::{CompositeImage, ImageBands, Variable};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Per-variable region means; `None` where no valid pixel was covered.
pub type RegionMeans = BTreeMap<Variable, Option<f64>>;

pub trait RecordSource: Send + Sync {
    /// Composites of `product_id` dated within `[start, end]` (both inclusive),
    /// ordered by date, with their native bands and quality flags.
    fn query_record(
        &self,
        product_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BackendResult<Vec<CompositeImage>>;
}

pub trait RasterStatistics: Send + Sync {
    /// Mean of every band of `image` over `region`, evaluated at `scale_m`.
    ///
    /// Zero valid pixels yields `None` for that band, never zero or an error.
    fn reduce_region_mean(
        &self,
        image: &ImageBands,
        region: &Region,
        scale_m: f64,
        tolerance: CoverageTolerance,
    ) -> BackendResult<RegionMeans>;
}
