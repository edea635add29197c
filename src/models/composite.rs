use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ProcessingError, Result};
use crate::models::observation::Variable;

/// Regular lat/lon grid, row-major from the north-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelGrid {
    pub north: f64,
    pub west: f64,
    pub cell_size_deg: f64,
    pub rows: usize,
    pub cols: usize,
}

impl PixelGrid {
    pub fn new(north: f64, west: f64, cell_size_deg: f64, rows: usize, cols: usize) -> Self {
        Self {
            north,
            west,
            cell_size_deg,
            rows,
            cols,
        }
    }

    /// Grid of `size`x`size` cells centred on a point
    pub fn centred_on(latitude: f64, longitude: f64, cell_size_deg: f64, size: usize) -> Self {
        let half = cell_size_deg * size as f64 / 2.0;
        Self::new(latitude + half, longitude - half, cell_size_deg, size, size)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn south(&self) -> f64 {
        self.north - self.cell_size_deg * self.rows as f64
    }

    pub fn east(&self) -> f64 {
        self.west + self.cell_size_deg * self.cols as f64
    }

    /// Centre (lat, lon) of the cell at a row-major index
    pub fn cell_center(&self, index: usize) -> (f64, f64) {
        let row = index / self.cols;
        let col = index % self.cols;
        (
            self.north - (row as f64 + 0.5) * self.cell_size_deg,
            self.west + (col as f64 + 0.5) * self.cell_size_deg,
        )
    }

    /// Relative cell area; cells shrink with the cosine of latitude
    pub fn cell_area_weight(&self, index: usize) -> f64 {
        let (lat, _) = self.cell_center(index);
        lat.to_radians().cos().max(0.0)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude <= self.north
            && latitude >= self.south()
            && longitude >= self.west
            && longitude <= self.east()
    }
}

/// One timestamped observation of a product, as stored: integer codes plus quality flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeImage {
    pub product_id: String,
    pub date: NaiveDate,
    pub grid: PixelGrid,
    pub bands: BTreeMap<String, Vec<Option<i32>>>,
    pub quality: Vec<Option<i32>>,
}

impl CompositeImage {
    pub fn new(product_id: impl Into<String>, date: NaiveDate, grid: PixelGrid) -> Self {
        Self {
            product_id: product_id.into(),
            date,
            grid,
            bands: BTreeMap::new(),
            quality: vec![None; grid.len()],
        }
    }

    pub fn with_band(mut self, name: impl Into<String>, values: Vec<Option<i32>>) -> Self {
        self.bands.insert(name.into(), values);
        self
    }

    /// Band with every pixel set to one code
    pub fn with_uniform_band(self, name: impl Into<String>, value: i32) -> Self {
        let len = self.grid.len();
        self.with_band(name, vec![Some(value); len])
    }

    pub fn with_quality(mut self, flags: Vec<Option<i32>>) -> Self {
        self.quality = flags;
        self
    }

    pub fn with_uniform_quality(mut self, flag: i32) -> Self {
        self.quality = vec![Some(flag); self.grid.len()];
        self
    }

    /// Every band and the quality band must cover the grid exactly
    pub fn check_shape(&self) -> Result<()> {
        let expected = self.grid.len();
        if self.quality.len() != expected {
            return Err(ProcessingError::InvalidFormat(format!(
                "{} {}: quality band has {} pixels, grid has {}",
                self.product_id,
                self.date,
                self.quality.len(),
                expected
            )));
        }
        for (name, values) in &self.bands {
            if values.len() != expected {
                return Err(ProcessingError::InvalidFormat(format!(
                    "{} {}: band {} has {} pixels, grid has {}",
                    self.product_id,
                    self.date,
                    name,
                    values.len(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

/// A composite after masking and unit conversion, keyed by output variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBands {
    pub date: NaiveDate,
    pub grid: PixelGrid,
    pub bands: BTreeMap<Variable, Vec<Option<f64>>>,
}

impl ImageBands {
    pub fn new(date: NaiveDate, grid: PixelGrid) -> Self {
        Self {
            date,
            grid,
            bands: BTreeMap::new(),
        }
    }

    pub fn band(&self, variable: Variable) -> Option<&[Option<f64>]> {
        self.bands.get(&variable).map(|v| v.as_slice())
    }

    pub fn insert(&mut self, variable: Variable, values: Vec<Option<f64>>) {
        self.bands.insert(variable, values);
    }

    pub fn valid_pixels(&self, variable: Variable) -> usize {
        self.band(variable)
            .map(|b| b.iter().filter(|v| v.is_some()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_geometry() {
        let grid = PixelGrid::new(37.0, 3.0, 0.01, 10, 20);
        assert_eq!(grid.len(), 200);
        assert!((grid.south() - 36.9).abs() < 1e-9);
        assert!((grid.east() - 3.2).abs() < 1e-9);

        let (lat, lon) = grid.cell_center(21);
        assert!((lat - 36.985).abs() < 1e-9);
        assert!((lon - 3.015).abs() < 1e-9);

        assert!(grid.contains(36.95, 3.1));
        assert!(!grid.contains(37.5, 3.1));
    }

    #[test]
    fn test_centred_grid_contains_centre() {
        let grid = PixelGrid::centred_on(36.68, 3.22, 0.009, 5);
        assert!(grid.contains(36.68, 3.22));
        let (lat, lon) = grid.cell_center(12);
        assert!((lat - 36.68).abs() < 1e-9);
        assert!((lon - 3.22).abs() < 1e-9);
    }

    #[test]
    fn test_shape_check() {
        let date = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let grid = PixelGrid::new(1.0, 0.0, 0.5, 2, 2);
        let image = CompositeImage::new("P", date, grid)
            .with_uniform_band("NDVI", 5000)
            .with_uniform_quality(0);
        assert!(image.check_shape().is_ok());

        let broken = image.with_band("EVI", vec![Some(1)]);
        assert!(broken.check_shape().is_err());
    }
}
