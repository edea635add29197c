use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{CompositeImage, ImageBands, ProductDescriptor, Variable};
use crate::processors::baseline::{BaselineExtent, BaselineStatistics};
use crate::processors::quality_mask::{FlagTally, MaskOutcome, QualityMaskEvaluator};
use crate::raster::{
    Attempted, CoverageTolerance, RasterStatistics, RecordSource, Region, RegionMeans, RetryPolicy,
};

/// A composite masked and converted to physical units.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bands: ImageBands,
    pub mask: MaskOutcome,
}

/// Masks `image` with its product's quality rule and converts every band.
///
/// Bands the descriptor names but the image lacks come out fully masked.
pub fn prepare_composite(product: &ProductDescriptor, image: &CompositeImage) -> Result<PreparedImage> {
    image.check_shape()?;

    let evaluator = QualityMaskEvaluator::for_product(product);
    let mask = evaluator.evaluate(&image.quality);
    let mut bands = ImageBands::new(image.date, image.grid);

    for band in &product.bands {
        let values = match image.bands.get(&band.name) {
            Some(raw) => raw
                .iter()
                .zip(mask.mask.iter())
                .map(|(raw, usable)| if *usable { band.to_physical(*raw) } else { None })
                .collect(),
            None => {
                warn!(
                    "{} composite {} has no band {}",
                    product.id, image.date, band.name
                );
                vec![None; image.grid.len()]
            }
        };
        bands.insert(band.variable, values);
    }

    Ok(PreparedImage { bands, mask })
}

/// Inclusive `[date - W, date + W]`
pub fn window_bounds(date: NaiveDate, window_days: i64) -> (NaiveDate, NaiveDate) {
    (
        date - Duration::days(window_days),
        date + Duration::days(window_days),
    )
}

pub fn select_window(
    images: &[CompositeImage],
    date: NaiveDate,
    window_days: i64,
) -> Vec<&CompositeImage> {
    let (start, end) = window_bounds(date, window_days);
    images
        .iter()
        .filter(|image| image.date >= start && image.date <= end)
        .collect()
}

/// Per-pixel mean over every image in the set, ignoring masked pixels.
///
/// The first image fixes the grid; images on other grids are left out.
pub fn temporal_mean(date: NaiveDate, images: &[ImageBands]) -> Option<ImageBands> {
    let first = images.first()?;
    let grid = first.grid;
    let mut mean = ImageBands::new(date, grid);

    for variable in first.bands.keys() {
        let mut sums = vec![0.0; grid.len()];
        let mut counts = vec![0usize; grid.len()];

        for image in images {
            if image.grid != grid {
                warn!("Composite {} left out of temporal mean: grid differs", image.date);
                continue;
            }
            let Some(values) = image.band(*variable) else {
                continue;
            };
            for (index, value) in values.iter().enumerate() {
                if let Some(v) = value.filter(|v| v.is_finite()) {
                    sums[index] += v;
                    counts[index] += 1;
                }
            }
        }

        let band = sums
            .iter()
            .zip(counts.iter())
            .map(|(sum, count)| (*count > 0).then(|| sum / *count as f64))
            .collect();
        mean.insert(*variable, band);
    }

    Some(mean)
}

/// One composite reduced to region means, with what it cost to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeOutcome {
    pub date: NaiveDate,
    pub values: RegionMeans,
    pub retries: u32,
    pub backend_failures: u32,
    /// Secondary composites averaged into the smoothed bands
    pub window_size: Option<usize>,
    /// Quality flags evaluated inside the smoothing window
    pub flags: FlagTally,
}

impl CompositeOutcome {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            values: RegionMeans::new(),
            retries: 0,
            backend_failures: 0,
            window_size: None,
            flags: FlagTally::default(),
        }
    }

    fn mark_missing(&mut self, variables: impl IntoIterator<Item = Variable>) {
        for variable in variables {
            self.values.insert(variable, None);
        }
    }
}

/// Reduces a product's record to one outcome per composite for a station buffer.
pub struct TemporalCompositor<'a> {
    source: &'a dyn RecordSource,
    reducer: &'a dyn RasterStatistics,
    retry: &'a RetryPolicy,
    region: Region,
    tolerance: CoverageTolerance,
}

impl<'a> TemporalCompositor<'a> {
    pub fn new(
        source: &'a dyn RecordSource,
        reducer: &'a dyn RasterStatistics,
        retry: &'a RetryPolicy,
        region: Region,
        tolerance: CoverageTolerance,
    ) -> Self {
        Self {
            source,
            reducer,
            retry,
            region,
            tolerance,
        }
    }

    fn reduce(&self, image: &ImageBands, scale_m: f64, label: &str) -> Attempted<RegionMeans> {
        self.retry.run(label, || {
            self.reducer
                .reduce_region_mean(image, &self.region, scale_m, self.tolerance)
        })
    }

    /// Reduces every band at the product's native resolution; a persistent
    /// backend failure leaves that composite's variables as no data.
    fn reduce_into(
        &self,
        outcome: &mut CompositeOutcome,
        image: &ImageBands,
        product: &ProductDescriptor,
    ) {
        let variables: Vec<Variable> = image.bands.keys().copied().collect();
        let label = format!("reduce {} {}", product.id, image.date);
        let attempted = self.reduce(image, product.resolution_m, &label);
        outcome.retries += attempted.retries;

        match attempted.result {
            Ok(means) => {
                outcome.mark_missing(variables);
                outcome.values.extend(means);
            }
            Err(err) => {
                warn!("{} failed permanently: {}; recording no data", label, err);
                outcome.backend_failures += 1;
                outcome.mark_missing(variables);
            }
        }
    }

    /// Region means of every composite, without a condition index.
    pub fn reduce_record(
        &self,
        product: &ProductDescriptor,
        images: &[ImageBands],
    ) -> Vec<CompositeOutcome> {
        images
            .par_iter()
            .map(|image| {
                let mut outcome = CompositeOutcome::new(image.date);
                self.reduce_into(&mut outcome, image, product);
                outcome
            })
            .collect()
    }

    /// Fixed-cadence path: unit-converted bands plus the condition index
    /// derived against a frozen baseline, reduced per composite.
    pub fn composite_fixed(
        &self,
        product: &ProductDescriptor,
        images: &[ImageBands],
        baseline: &BaselineStatistics,
    ) -> Vec<CompositeOutcome> {
        images
            .par_iter()
            .map(|image| {
                let mut outcome = CompositeOutcome::new(image.date);
                match &baseline.extent {
                    BaselineExtent::PerPixel { .. } => {
                        let mut bands = image.clone();
                        let index = image
                            .band(Variable::Ndvi)
                            .and_then(|ndvi| baseline.index_band(&image.grid, ndvi))
                            .unwrap_or_else(|| vec![None; image.grid.len()]);
                        bands.insert(Variable::Vci, index);
                        self.reduce_into(&mut outcome, &bands, product);
                    }
                    BaselineExtent::Regional { .. } => {
                        self.reduce_into(&mut outcome, image, product);
                        apply_regional_index(std::slice::from_mut(&mut outcome), baseline);
                    }
                }
                outcome
            })
            .collect()
    }

    /// Cross-product smoothing path.
    ///
    /// For each driving composite dated `d`, every secondary composite in
    /// `[d - W, d + W]` is masked, averaged per pixel, and the average is
    /// reduced at the secondary product's resolution.
    pub fn composite_smoothed(
        &self,
        driving: &ProductDescriptor,
        images: &[ImageBands],
        secondary: &ProductDescriptor,
        window_days: i64,
    ) -> Vec<CompositeOutcome> {
        images
            .par_iter()
            .map(|image| {
                let mut outcome = CompositeOutcome::new(image.date);
                self.reduce_into(&mut outcome, image, driving);
                self.smooth_into(&mut outcome, secondary, window_days);
                outcome
            })
            .collect()
    }

    fn smooth_into(
        &self,
        outcome: &mut CompositeOutcome,
        secondary: &ProductDescriptor,
        window_days: i64,
    ) {
        let date = outcome.date;
        let (start, end) = window_bounds(date, window_days);
        let label = format!("query {} {}..{}", secondary.id, start, end);
        let query = self
            .retry
            .run(&label, || self.source.query_record(&secondary.id, start, end));
        outcome.retries += query.retries;

        let record = match query.result {
            Ok(record) => record,
            Err(err) => {
                warn!("{} failed permanently: {}; recording no data", label, err);
                outcome.backend_failures += 1;
                outcome.mark_missing(secondary.variables());
                return;
            }
        };

        let selected = select_window(&record, date, window_days);
        let mut prepared = Vec::with_capacity(selected.len());
        for image in &selected {
            match prepare_composite(secondary, image) {
                Ok(p) => {
                    outcome.flags.record(&p.mask);
                    prepared.push(p.bands);
                }
                Err(err) => warn!("Skipping {} composite {}: {}", secondary.id, image.date, err),
            }
        }
        outcome.window_size = Some(prepared.len());

        match temporal_mean(date, &prepared) {
            Some(smoothed) => {
                debug!(
                    "Smoothed {} over {} composites around {}",
                    secondary.id,
                    prepared.len(),
                    date
                );
                self.reduce_into(outcome, &smoothed, secondary);
            }
            None => {
                debug!("No {} composite within {} days of {}", secondary.id, window_days, date);
                outcome.mark_missing(secondary.variables());
            }
        }
    }
}

/// Sets the condition index of each outcome from its NDVI region mean.
pub fn apply_regional_index(outcomes: &mut [CompositeOutcome], baseline: &BaselineStatistics) {
    for outcome in outcomes {
        let ndvi = outcome.values.get(&Variable::Ndvi).copied().flatten();
        outcome
            .values
            .insert(Variable::Vci, baseline.index_for_value(ndvi));
    }
}
