use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::models::{ImageBands, PixelGrid};
use crate::raster::region::{CoverageTolerance, Region};
use crate::raster::{BackendResult, RasterStatistics, RegionMeans};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Pixels weighted by their cos(latitude) area
    #[default]
    AreaWeighted,
    Simple,
}

/// Region statistics over in-process grids at their native resolution,
/// taken over the buffer's [`Region::footprint`].
#[derive(Debug, Clone, Default)]
pub struct GridReducer {
    weighting: Weighting,
}

impl GridReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weighting(weighting: Weighting) -> Self {
        Self { weighting }
    }

    fn weight(&self, grid: &PixelGrid, index: usize) -> f64 {
        match self.weighting {
            Weighting::AreaWeighted => grid.cell_area_weight(index),
            Weighting::Simple => 1.0,
        }
    }

    fn band_mean(
        &self,
        grid: &PixelGrid,
        values: &[Option<f64>],
        pixels: &[usize],
        tolerance: CoverageTolerance,
    ) -> Option<f64> {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for &index in pixels {
            match values[index] {
                Some(value) if value.is_finite() => {
                    let weight = self.weight(grid, index);
                    weighted_sum += value * weight;
                    total_weight += weight;
                }
                _ if tolerance == CoverageTolerance::Strict => return None,
                _ => {}
            }
        }

        if total_weight > 0.0 {
            Some(weighted_sum / total_weight)
        } else {
            None
        }
    }
}

impl RasterStatistics for GridReducer {
    fn reduce_region_mean(
        &self,
        image: &ImageBands,
        region: &Region,
        scale_m: f64,
        tolerance: CoverageTolerance,
    ) -> BackendResult<RegionMeans> {
        if !scale_m.is_finite() || scale_m <= 0.0 {
            return Err(BackendError::InvalidRequest(format!(
                "scale must be positive, got {}",
                scale_m
            )));
        }

        let grid = &image.grid;
        for (variable, values) in &image.bands {
            if values.len() != grid.len() {
                return Err(BackendError::InvalidRequest(format!(
                    "band {} has {} pixels for a {}-pixel grid",
                    variable,
                    values.len(),
                    grid.len()
                )));
            }
        }

        let fully_covered = region.lies_within(grid);
        let pixels = region.footprint(grid, scale_m);

        let means = image
            .bands
            .iter()
            .map(|(variable, values)| {
                let mean = if tolerance == CoverageTolerance::Strict && !fully_covered {
                    None
                } else {
                    self.band_mean(grid, values, &pixels, tolerance)
                };
                (*variable, mean)
            })
            .collect();

        Ok(means)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variable;
    use chrono::NaiveDate;

    fn image(grid: PixelGrid, values: Vec<Option<f64>>) -> ImageBands {
        let mut image = ImageBands::new(NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(), grid);
        image.insert(Variable::Ndvi, values);
        image
    }

    #[test]
    fn test_mean_over_buffer() {
        let grid = PixelGrid::centred_on(36.68, 3.22, 0.009, 5);
        let image = image(grid, vec![Some(0.5); grid.len()]);
        let region = Region::new(36.68, 3.22, 1500.0);

        let means = GridReducer::new()
            .reduce_region_mean(&image, &region, 1000.0, CoverageTolerance::Partial)
            .unwrap();
        assert!((means[&Variable::Ndvi].unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_partial_coverage_averages_valid_pixels() {
        let grid = PixelGrid::centred_on(36.68, 3.22, 0.009, 3);
        let mut values = vec![Some(0.2); grid.len()];
        values[4] = None; // centre pixel masked
        values[1] = Some(0.8);
        let image = image(grid, values);
        let region = Region::new(36.68, 3.22, 1100.0);

        let reducer = GridReducer::with_weighting(Weighting::Simple);
        let pixels = region.footprint(&grid, 1000.0);
        assert_eq!(pixels, vec![1, 3, 4, 5, 7]);

        let means = reducer
            .reduce_region_mean(&image, &region, 1000.0, CoverageTolerance::Partial)
            .unwrap();
        let expected = (0.8 + 0.2 * 3.0) / 4.0;
        assert!((means[&Variable::Ndvi].unwrap() - expected).abs() < 1e-12);

        let strict = reducer
            .reduce_region_mean(&image, &region, 1000.0, CoverageTolerance::Strict)
            .unwrap();
        assert_eq!(strict[&Variable::Ndvi], None);
    }

    #[test]
    fn test_no_valid_pixels_is_no_data() {
        let grid = PixelGrid::centred_on(36.68, 3.22, 0.009, 3);
        let image = image(grid, vec![None; grid.len()]);
        let region = Region::new(36.68, 3.22, 1000.0);

        let means = GridReducer::new()
            .reduce_region_mean(&image, &region, 1000.0, CoverageTolerance::Partial)
            .unwrap();
        assert_eq!(means[&Variable::Ndvi], None);
    }

    #[test]
    fn test_small_buffer_falls_back_to_intersecting_pixels() {
        // Station sits on a pixel corner, no centre within 50 m
        let grid = PixelGrid::new(1.0, 0.0, 0.01, 2, 2);
        let region = Region::new(0.99, 0.01, 50.0);
        let pixels = region.footprint(&grid, 1113.0);
        assert_eq!(pixels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_buffer_outside_grid_is_no_data() {
        let grid = PixelGrid::new(10.0, 10.0, 0.01, 3, 3);
        let image = image(grid, vec![Some(1.0); grid.len()]);
        let region = Region::new(36.68, 3.22, 1000.0);

        let means = GridReducer::new()
            .reduce_region_mean(&image, &region, 1000.0, CoverageTolerance::Partial)
            .unwrap();
        assert_eq!(means[&Variable::Ndvi], None);
    }

    #[test]
    fn test_rejects_mismatched_band() {
        let grid = PixelGrid::new(1.0, 0.0, 0.01, 2, 2);
        let image = image(grid, vec![Some(1.0)]);
        let region = Region::new(0.99, 0.01, 500.0);
        assert!(GridReducer::new()
            .reduce_region_mean(&image, &region, 1000.0, CoverageTolerance::Partial)
            .is_err());
    }
}
