use tracing::{debug, warn};

use crate::config::BaselineStrategy;
use crate::models::{ImageBands, PixelGrid, Variable};
use crate::raster::Region;
use crate::utils::constants::{VCI_EPSILON, VCI_MAX, VCI_MIN};

/// `clamp(100 * (value - min) / (max - min + epsilon), 0, 100)`
pub fn condition_index(value: f64, min: f64, max: f64, epsilon: f64) -> f64 {
    let index = 100.0 * (value - min) / (max - min + epsilon);
    index.clamp(VCI_MIN, VCI_MAX)
}

#[derive(Debug, Clone, PartialEq)]
pub enum BaselineExtent {
    PerPixel {
        grid: PixelGrid,
        min: Vec<Option<f64>>,
        max: Vec<Option<f64>>,
    },
    Regional {
        min: Option<f64>,
        max: Option<f64>,
    },
}

/// Long-term min/max of the normalized index, frozen for the rest of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineStatistics {
    pub extent: BaselineExtent,
    pub epsilon: f64,
    /// Valid values the extremes were taken over
    pub observations: usize,
    /// No temporal variance anywhere, or nothing to compute from
    pub degenerate: bool,
}

impl BaselineStatistics {
    pub fn regional(min: f64, max: f64, epsilon: f64) -> Self {
        Self {
            extent: BaselineExtent::Regional {
                min: Some(min),
                max: Some(max),
            },
            epsilon,
            observations: 0,
            degenerate: max <= min,
        }
    }

    /// Condition index for a region mean (regional extent only)
    pub fn index_for_value(&self, value: Option<f64>) -> Option<f64> {
        match (&self.extent, value) {
            (BaselineExtent::Regional { min: Some(min), max: Some(max) }, Some(value)) => {
                Some(condition_index(value, *min, *max, self.epsilon))
            }
            _ => None,
        }
    }

    /// Per-pixel condition index band (per-pixel extent only)
    pub fn index_band(&self, grid: &PixelGrid, values: &[Option<f64>]) -> Option<Vec<Option<f64>>> {
        let BaselineExtent::PerPixel {
            grid: baseline_grid,
            min,
            max,
        } = &self.extent
        else {
            return None;
        };
        if baseline_grid != grid || values.len() != min.len() {
            return None;
        }

        Some(
            values
                .iter()
                .zip(min.iter().zip(max.iter()))
                .map(|(value, (min, max))| match (value, min, max) {
                    (Some(v), Some(lo), Some(hi)) => {
                        Some(condition_index(*v, *lo, *hi, self.epsilon))
                    }
                    _ => None,
                })
                .collect(),
        )
    }

    pub fn is_per_pixel(&self) -> bool {
        matches!(self.extent, BaselineExtent::PerPixel { .. })
    }

    /// Decides degeneracy over the pixels `region` covers at `scale_m`.
    ///
    /// Variance elsewhere in the grid does not give the station a usable signal;
    /// a buffer covering no pixel is degenerate. Regional extents are unchanged.
    pub fn for_region(mut self, region: &Region, scale_m: f64) -> Self {
        let BaselineExtent::PerPixel { grid, min, max } = &self.extent else {
            return self;
        };

        let footprint = region.footprint(grid, scale_m);
        let degenerate = footprint
            .iter()
            .all(|&index| lacks_variance(min[index], max[index]));

        if degenerate && !self.degenerate {
            warn!(
                "No temporal variance in the {} pixels under the station buffer",
                footprint.len()
            );
        }
        self.degenerate = degenerate;
        self
    }
}

fn lacks_variance(min: Option<f64>, max: Option<f64>) -> bool {
    match (min, max) {
        (Some(lo), Some(hi)) => hi <= lo,
        _ => true,
    }
}

pub struct BaselineBuilder {
    strategy: BaselineStrategy,
    epsilon: f64,
}

impl BaselineBuilder {
    pub fn new(strategy: BaselineStrategy) -> Self {
        Self {
            strategy,
            epsilon: VCI_EPSILON,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn strategy(&self) -> BaselineStrategy {
        self.strategy
    }

    /// Per-pixel extremes of `variable` across a masked, converted record.
    ///
    /// The first image fixes the grid; images on any other grid are skipped.
    pub fn build_pixel_wise(&self, images: &[ImageBands], variable: Variable) -> BaselineStatistics {
        let Some(grid) = images.iter().find(|i| i.band(variable).is_some()).map(|i| i.grid) else {
            warn!("No {} band in record, baseline is degenerate", variable);
            return BaselineStatistics {
                extent: BaselineExtent::Regional { min: None, max: None },
                epsilon: self.epsilon,
                observations: 0,
                degenerate: true,
            };
        };

        let mut min: Vec<Option<f64>> = vec![None; grid.len()];
        let mut max: Vec<Option<f64>> = vec![None; grid.len()];
        let mut observations = 0;

        for image in images {
            let Some(values) = image.band(variable) else {
                continue;
            };
            if image.grid != grid || values.len() != grid.len() {
                warn!(
                    "Skipping {} composite {} in baseline: grid differs from record",
                    variable, image.date
                );
                continue;
            }

            for (index, value) in values.iter().enumerate() {
                if let Some(v) = value.filter(|v| v.is_finite()) {
                    min[index] = Some(min[index].map_or(v, |m| m.min(v)));
                    max[index] = Some(max[index].map_or(v, |m| m.max(v)));
                    observations += 1;
                }
            }
        }

        let degenerate = min
            .iter()
            .zip(max.iter())
            .all(|(lo, hi)| lacks_variance(*lo, *hi));

        if degenerate {
            warn!(
                "Degenerate {} baseline over {} observations: no temporal variance",
                variable, observations
            );
        } else {
            debug!(
                "Pixel-wise {} baseline over {} observations",
                variable, observations
            );
        }

        BaselineStatistics {
            extent: BaselineExtent::PerPixel { grid, min, max },
            epsilon: self.epsilon,
            observations,
            degenerate,
        }
    }

    /// Extremes across a record of region means.
    pub fn build_regional(&self, values: &[Option<f64>]) -> BaselineStatistics {
        let valid: Vec<f64> = values
            .iter()
            .filter_map(|v| v.filter(|v| v.is_finite()))
            .collect();

        let min = valid.iter().copied().reduce(f64::min);
        let max = valid.iter().copied().reduce(f64::max);
        let degenerate = lacks_variance(min, max);

        if degenerate {
            warn!(
                "Degenerate regional baseline over {} observations",
                valid.len()
            );
        }

        BaselineStatistics {
            extent: BaselineExtent::Regional { min, max },
            epsilon: self.epsilon,
            observations: valid.len(),
            degenerate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn image(day: u32, grid: PixelGrid, values: Vec<Option<f64>>) -> ImageBands {
        let mut image = ImageBands::new(NaiveDate::from_ymd_opt(2001, 1, day).unwrap(), grid);
        image.insert(Variable::Ndvi, values);
        image
    }

    #[test]
    fn test_condition_index_examples() {
        assert!((condition_index(0.5, 0.2, 0.8, VCI_EPSILON) - 50.0).abs() < 0.01);
        assert!((condition_index(0.6, 0.2, 0.8, VCI_EPSILON) - 66.67).abs() < 0.01);
        assert!((condition_index(0.4, 0.2, 0.8, VCI_EPSILON) - 33.33).abs() < 0.01);
    }

    #[test]
    fn test_condition_index_is_clamped() {
        assert_eq!(condition_index(0.9, 0.2, 0.8, VCI_EPSILON), 100.0);
        assert_eq!(condition_index(-0.1, 0.2, 0.8, VCI_EPSILON), 0.0);
    }

    #[test]
    fn test_condition_index_finite_without_variance() {
        for value in [0.0, 0.01, 0.3, -0.2] {
            let index = condition_index(value, 0.01, 0.01, VCI_EPSILON);
            assert!(index.is_finite());
            assert!((VCI_MIN..=VCI_MAX).contains(&index));
        }
    }

    #[test]
    fn test_pixel_wise_extremes() {
        let grid = PixelGrid::new(1.0, 0.0, 0.5, 1, 2);
        let images = vec![
            image(1, grid, vec![Some(0.3), None]),
            image(17, grid, vec![Some(0.7), Some(0.4)]),
            image(31, grid, vec![Some(0.5), Some(0.2)]),
        ];

        let baseline = BaselineBuilder::new(BaselineStrategy::PixelWise)
            .build_pixel_wise(&images, Variable::Ndvi);

        assert_eq!(baseline.observations, 5);
        assert!(!baseline.degenerate);
        match &baseline.extent {
            BaselineExtent::PerPixel { min, max, .. } => {
                assert_eq!(min, &vec![Some(0.3), Some(0.2)]);
                assert_eq!(max, &vec![Some(0.7), Some(0.4)]);
                for (lo, hi) in min.iter().zip(max.iter()) {
                    assert!(hi.unwrap() >= lo.unwrap());
                }
            }
            other => panic!("unexpected extent {:?}", other),
        }

        let band = baseline.index_band(&grid, &[Some(0.5), Some(0.2)]).unwrap();
        assert!((band[0].unwrap() - 50.0).abs() < 0.01);
        assert_eq!(band[1], Some(0.0));
    }

    #[test]
    fn test_pixel_wise_skips_mismatched_grid() {
        let grid = PixelGrid::new(1.0, 0.0, 0.5, 1, 1);
        let other = PixelGrid::new(2.0, 0.0, 0.5, 1, 1);
        let images = vec![
            image(1, grid, vec![Some(0.3)]),
            image(17, other, vec![Some(0.9)]),
        ];

        let baseline = BaselineBuilder::new(BaselineStrategy::PixelWise)
            .build_pixel_wise(&images, Variable::Ndvi);
        assert_eq!(baseline.observations, 1);
        assert!(baseline.degenerate);
        assert!(baseline.index_band(&other, &[Some(0.9)]).is_none());
    }

    #[test]
    fn test_degenerate_baseline_still_yields_finite_index() {
        let grid = PixelGrid::new(1.0, 0.0, 0.5, 1, 1);
        let images = vec![image(1, grid, vec![Some(0.01)]), image(17, grid, vec![Some(0.01)])];

        let baseline = BaselineBuilder::new(BaselineStrategy::PixelWise)
            .build_pixel_wise(&images, Variable::Ndvi);
        assert!(baseline.degenerate);

        let band = baseline.index_band(&grid, &[Some(0.01)]).unwrap();
        assert!(band[0].unwrap().is_finite());
    }

    #[test]
    fn test_constant_station_pixels_are_degenerate() {
        // Centre pixel is permanent snow; the surrounding ring varies
        let grid = PixelGrid::centred_on(36.68, 3.22, 0.009, 3);
        let images: Vec<ImageBands> = [(1, 0.2), (17, 0.6), (31, 0.4)]
            .iter()
            .map(|&(day, ring)| {
                let mut values = vec![Some(ring); grid.len()];
                values[4] = Some(0.01);
                image(day, grid, values)
            })
            .collect();

        let baseline = BaselineBuilder::new(BaselineStrategy::PixelWise)
            .build_pixel_wise(&images, Variable::Ndvi);
        assert!(!baseline.degenerate);

        let station = baseline
            .clone()
            .for_region(&Region::new(36.68, 3.22, 300.0), 1000.0);
        assert!(station.degenerate);
        let band = station.index_band(&grid, &vec![Some(0.01); grid.len()]).unwrap();
        assert_eq!(band[4], Some(0.0));

        let wide = baseline.for_region(&Region::new(36.68, 3.22, 1500.0), 1000.0);
        assert!(!wide.degenerate);
    }

    #[test]
    fn test_regional_baseline() {
        let builder = BaselineBuilder::new(BaselineStrategy::Regional);
        let baseline = builder.build_regional(&[Some(0.5), None, Some(0.2), Some(0.8)]);

        assert_eq!(baseline.observations, 3);
        assert!(!baseline.degenerate);
        assert!((baseline.index_for_value(Some(0.5)).unwrap() - 50.0).abs() < 0.01);
        assert_eq!(baseline.index_for_value(None), None);

        let empty = builder.build_regional(&[None, None]);
        assert!(empty.degenerate);
        assert_eq!(empty.index_for_value(Some(0.5)), None);
    }
}
