use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

use crate::models::{PixelGrid, Station};
use crate::utils::constants::EARTH_RADIUS_M;
use crate::utils::coordinates::haversine_distance;

/// How a reduction treats a buffer that is only partly covered by valid data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageTolerance {
    /// Average whatever valid pixels the buffer covers
    #[default]
    Partial,
    /// No data unless the buffer lies inside the grid and every covered pixel is valid
    Strict,
}

/// Circular buffer around a station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

impl Region {
    pub fn new(latitude: f64, longitude: f64, radius_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_m,
        }
    }

    pub fn buffer(station: &Station) -> Self {
        Self::new(station.latitude, station.longitude, station.buffer_radius_m)
    }

    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_distance(self.latitude, self.longitude, latitude, longitude)
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.distance_to(latitude, longitude) <= self.radius_m
    }

    /// (north, south, west, east) in degrees
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let dlat = (self.radius_m / EARTH_RADIUS_M).to_degrees();
        let cos_lat = self.latitude.to_radians().cos().max(1e-6);
        let dlon = dlat / cos_lat;
        (
            self.latitude + dlat,
            self.latitude - dlat,
            self.longitude - dlon,
            self.longitude + dlon,
        )
    }

    pub fn lies_within(&self, grid: &PixelGrid) -> bool {
        let (north, south, west, east) = self.bounds();
        grid.contains(north, west) && grid.contains(south, east)
    }

    /// Row-major indices of the pixels of `grid` this buffer covers.
    ///
    /// A pixel belongs to the buffer when its centre does. Buffers smaller than a
    /// pixel fall back to every pixel within half a pixel diagonal (at `scale_m`)
    /// of the buffer edge.
    pub fn footprint(&self, grid: &PixelGrid, scale_m: f64) -> Vec<usize> {
        let distances: Vec<(usize, f64)> = (0..grid.len())
            .map(|index| {
                let (lat, lon) = grid.cell_center(index);
                (index, self.distance_to(lat, lon))
            })
            .collect();

        let inside: Vec<usize> = distances
            .iter()
            .filter(|(_, d)| *d <= self.radius_m)
            .map(|(i, _)| *i)
            .collect();
        if !inside.is_empty() {
            return inside;
        }

        let reach = self.radius_m + scale_m * FRAC_1_SQRT_2;
        distances
            .iter()
            .filter(|(_, d)| *d <= reach)
            .map(|(i, _)| *i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_contains_centre_and_excludes_far_points() {
        let region = Region::new(36.68, 3.22, 1000.0);
        assert!(region.contains(36.68, 3.22));
        assert!(region.contains(36.685, 3.22)); // ~556 m north
        assert!(!region.contains(36.7, 3.22)); // ~2.2 km north
    }

    #[test]
    fn test_bounds_span_radius() {
        let region = Region::new(0.0, 0.0, 111_195.0);
        let (north, south, west, east) = region.bounds();
        assert!((north - 1.0).abs() < 1e-3);
        assert!((south + 1.0).abs() < 1e-3);
        assert!((west + 1.0).abs() < 1e-3);
        assert!((east - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_lies_within_grid() {
        let grid = PixelGrid::centred_on(36.68, 3.22, 0.01, 11);
        assert!(Region::new(36.68, 3.22, 1000.0).lies_within(&grid));
        assert!(!Region::new(36.68, 3.22, 50_000.0).lies_within(&grid));
    }
}
