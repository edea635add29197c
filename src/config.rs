//! Pipeline configuration.
//!
//! Everything a run needs is static: stations, date range, product
//! descriptors, smoothing window and retry policy. A config file is TOML,
//! with `MODIS__<SECTION>__<KEY>` environment variables overriding it:
//!
//! ```toml
//! [run]
//! start_date = "2001-01-01"
//! end_date = "2024-12-31"
//! smoothing_window_days = 8
//! baseline_strategy = "pixel_wise"
//!
//! [[stations]]
//! id = "60390"
//! name = "ALGER_DAR_EL_BEIDA_AG"
//! latitude = 36.6833
//! longitude = 3.2167
//! buffer_radius_m = 1000.0
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::models::{ProductSet, Station};
use crate::raster::{CoverageTolerance, RetryPolicy};
use crate::utils::constants::{DEFAULT_DEADLINE_SECONDS, DEFAULT_SMOOTHING_WINDOW_DAYS, VCI_EPSILON};

/// Where the long-term NDVI min/max is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStrategy {
    /// Per pixel across the record, before region reduction
    #[default]
    PixelWise,
    /// Across the record of region means
    Regional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    /// Half-width W of the [d - W, d + W] temperature smoothing window
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window_days: i64,

    #[serde(default)]
    pub baseline_strategy: BaselineStrategy,

    #[serde(default = "default_epsilon")]
    pub vci_epsilon: f64,

    #[serde(default)]
    pub coverage: CoverageTolerance,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Overall deadline for a multi-station run
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,
}

fn default_smoothing_window() -> i64 {
    DEFAULT_SMOOTHING_WINDOW_DAYS
}

fn default_epsilon() -> f64 {
    VCI_EPSILON
}

fn default_max_workers() -> usize {
    num_cpus::get()
}

fn default_deadline() -> u64 {
    DEFAULT_DEADLINE_SECONDS
}

impl RunSettings {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            smoothing_window_days: default_smoothing_window(),
            baseline_strategy: BaselineStrategy::default(),
            vci_epsilon: default_epsilon(),
            coverage: CoverageTolerance::default(),
            max_workers: default_max_workers(),
            deadline_seconds: default_deadline(),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }

    pub fn check(&self) -> Result<()> {
        if self.end_date <= self.start_date {
            return Err(ProcessingError::Config(format!(
                "Empty date range: {} to {}",
                self.start_date, self.end_date
            )));
        }
        if self.smoothing_window_days < 0 {
            return Err(ProcessingError::Config(format!(
                "Smoothing window must be non-negative, got {}",
                self.smoothing_window_days
            )));
        }
        if !self.vci_epsilon.is_finite() || self.vci_epsilon <= 0.0 {
            return Err(ProcessingError::Config(format!(
                "VCI epsilon must be positive, got {}",
                self.vci_epsilon
            )));
        }
        if self.max_workers == 0 {
            return Err(ProcessingError::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.deadline_seconds == 0 {
            return Err(ProcessingError::Config(
                "deadline_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub run: RunSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub stations: Vec<Station>,

    #[serde(default)]
    pub products: ProductSet,
}

impl PipelineConfig {
    /// Reference MODIS products over the given date range, no stations.
    pub fn reference(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            run: RunSettings::new(start_date, end_date),
            retry: RetryPolicy::default(),
            stations: Vec::new(),
            products: ProductSet::default(),
        }
    }

    pub fn with_station(mut self, station: Station) -> Self {
        self.stations.push(station);
        self
    }

    /// Loads and validates a config file, applying `MODIS__` environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading pipeline configuration from {}", path.display());

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(::config::Environment::with_prefix("MODIS").separator("__"))
            .build()?;

        let config: PipelineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks run settings, products and stations; any failure is fatal.
    pub fn validate(&self) -> Result<()> {
        self.run.check()?;
        self.products.check()?;

        let mut seen = HashSet::new();
        for station in &self.stations {
            station.check()?;
            if !seen.insert(station.id.as_str()) {
                return Err(ProcessingError::Config(format!(
                    "Duplicate station id {}",
                    station.id
                )));
            }
        }
        Ok(())
    }

    pub fn station(&self, id_or_name: &str) -> Option<&Station> {
        self.stations
            .iter()
            .find(|s| s.id == id_or_name || s.name == id_or_name)
    }
}
