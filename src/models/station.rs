use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ProcessingError, Result};
use crate::utils::coordinates::validate_coordinates;

/// A ground location with the circular buffer its region statistics are taken over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Station {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1))]
    pub name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    #[serde(default)]
    pub elevation: Option<f64>,

    /// Köppen-Geiger class, e.g. "Csa"
    #[serde(default)]
    pub climate: Option<String>,

    pub buffer_radius_m: f64,
}

impl Station {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        buffer_radius_m: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            elevation: None,
            climate: None,
            buffer_radius_m,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_climate(mut self, climate: impl Into<String>) -> Self {
        self.climate = Some(climate.into());
        self
    }

    /// Checks every invariant a run depends on; failures are fatal before extraction.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        validate_coordinates(self.latitude, self.longitude)?;

        if !self.buffer_radius_m.is_finite() || self.buffer_radius_m <= 0.0 {
            return Err(ProcessingError::Config(format!(
                "Station {} has non-positive buffer radius {}",
                self.name, self.buffer_radius_m
            )));
        }

        Ok(())
    }
}
