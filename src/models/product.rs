use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ProcessingError, Result};
use crate::models::observation::{CadenceGroup, Variable};
use crate::utils::constants::{
    CADENCE_16_DAY, CADENCE_8_DAY, PRODUCT_LEAF_AREA, PRODUCT_TEMPERATURE, PRODUCT_VEGETATION,
    RESOLUTION_1KM, RESOLUTION_500M,
};

/// Bit layout a product's quality band is decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskRule {
    /// bits 0-1 <= 1
    VegetationIndex,
    /// bits 0-1 == 0
    Temperature,
    /// bits 0-1 <= 1, bit 3 clear (snow/ice), bit 5 clear (cloud)
    LeafArea,
}

/// One stored band and its conversion from integer code to physical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BandDescriptor {
    #[validate(length(min = 1))]
    pub name: String,
    pub variable: Variable,
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    /// Inclusive raw range; codes outside it are fill values
    pub valid_min: i32,
    pub valid_max: i32,
}

impl BandDescriptor {
    pub fn new(name: impl Into<String>, variable: Variable, scale: f64, offset: f64) -> Self {
        Self {
            name: name.into(),
            variable,
            scale,
            offset,
            valid_min: i32::MIN,
            valid_max: i32::MAX,
        }
    }

    pub fn with_valid_range(mut self, min: i32, max: i32) -> Self {
        self.valid_min = min;
        self.valid_max = max;
        self
    }

    /// Converts a stored code to physical units; fill codes become `None`.
    pub fn to_physical(&self, raw: Option<i32>) -> Option<f64> {
        let raw = raw?;
        if raw < self.valid_min || raw > self.valid_max {
            return None;
        }
        Some(raw as f64 * self.scale + self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProductDescriptor {
    #[validate(length(min = 1))]
    pub id: String,
    pub cadence_days: u32,
    pub resolution_m: f64,
    #[validate(length(min = 1))]
    pub bands: Vec<BandDescriptor>,
    pub quality_band: String,
    #[serde(default)]
    pub quality_fill: Option<i32>,
    #[serde(default = "default_quality_bits")]
    pub quality_bits: u32,
    pub mask_rule: MaskRule,
}

fn default_quality_bits() -> u32 {
    8
}

impl ProductDescriptor {
    /// MOD13A2 16-day 1 km vegetation indices
    pub fn vegetation_index() -> Self {
        Self {
            id: PRODUCT_VEGETATION.to_string(),
            cadence_days: CADENCE_16_DAY,
            resolution_m: RESOLUTION_1KM,
            bands: vec![
                BandDescriptor::new("NDVI", Variable::Ndvi, 0.0001, 0.0)
                    .with_valid_range(-2000, 10000),
                BandDescriptor::new("EVI", Variable::Evi, 0.0001, 0.0)
                    .with_valid_range(-2000, 10000),
            ],
            quality_band: "SummaryQA".to_string(),
            quality_fill: Some(-1),
            quality_bits: default_quality_bits(),
            mask_rule: MaskRule::VegetationIndex,
        }
    }

    /// MOD15A2H 8-day 500 m leaf area index and absorbed radiation fraction
    pub fn leaf_area() -> Self {
        Self {
            id: PRODUCT_LEAF_AREA.to_string(),
            cadence_days: CADENCE_8_DAY,
            resolution_m: RESOLUTION_500M,
            bands: vec![
                BandDescriptor::new("Lai_500m", Variable::Lai, 0.1, 0.0).with_valid_range(0, 100),
                BandDescriptor::new("Fpar_500m", Variable::Fapar, 0.01, 0.0)
                    .with_valid_range(0, 100),
            ],
            quality_band: "FparLai_QC".to_string(),
            quality_fill: Some(255),
            quality_bits: default_quality_bits(),
            mask_rule: MaskRule::LeafArea,
        }
    }

    /// MOD11A2 8-day 1 km daytime land-surface temperature, in degrees Celsius
    pub fn land_surface_temperature() -> Self {
        Self {
            id: PRODUCT_TEMPERATURE.to_string(),
            cadence_days: CADENCE_8_DAY,
            resolution_m: RESOLUTION_1KM,
            bands: vec![
                BandDescriptor::new("LST_Day_1km", Variable::Lst, 0.02, -273.15)
                    .with_valid_range(7500, 65535),
            ],
            quality_band: "QC_Day".to_string(),
            quality_fill: None,
            quality_bits: default_quality_bits(),
            mask_rule: MaskRule::Temperature,
        }
    }

    pub fn band_for(&self, variable: Variable) -> Option<&BandDescriptor> {
        self.bands.iter().find(|b| b.variable == variable)
    }

    pub fn variables(&self) -> Vec<Variable> {
        self.bands.iter().map(|b| b.variable).collect()
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        for band in &self.bands {
            band.validate()?;
            if !band.scale.is_finite() || band.scale == 0.0 || !band.offset.is_finite() {
                return Err(ProcessingError::Config(format!(
                    "Band {} of {} has an unusable scale/offset",
                    band.name, self.id
                )));
            }
            if band.valid_min > band.valid_max {
                return Err(ProcessingError::Config(format!(
                    "Band {} of {} has an empty valid range",
                    band.name, self.id
                )));
            }
        }
        if self.cadence_days == 0 {
            return Err(ProcessingError::Config(format!(
                "Product {} has a zero-day cadence",
                self.id
            )));
        }
        if !self.resolution_m.is_finite() || self.resolution_m <= 0.0 {
            return Err(ProcessingError::Config(format!(
                "Product {} has non-positive resolution {}",
                self.id, self.resolution_m
            )));
        }
        if self.quality_bits == 0 || self.quality_bits > 16 {
            return Err(ProcessingError::Config(format!(
                "Product {} declares {} quality bits",
                self.id, self.quality_bits
            )));
        }
        Ok(())
    }
}

/// The three products one station run draws on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSet {
    pub vegetation: ProductDescriptor,
    pub leaf_area: ProductDescriptor,
    pub temperature: ProductDescriptor,
}

impl ProductSet {
    pub fn check(&self) -> Result<()> {
        self.vegetation.check()?;
        self.leaf_area.check()?;
        self.temperature.check()?;

        if self.vegetation.band_for(Variable::Ndvi).is_none() {
            return Err(ProcessingError::Config(format!(
                "Vegetation product {} has no NDVI band for the condition index",
                self.vegetation.id
            )));
        }
        Ok(())
    }

    /// Products whose composites drive each cadence group's record
    pub fn driving(&self, group: CadenceGroup) -> &ProductDescriptor {
        match group {
            CadenceGroup::SixteenDay => &self.vegetation,
            CadenceGroup::EightDay => &self.leaf_area,
        }
    }
}

impl Default for ProductSet {
    fn default() -> Self {
        Self {
            vegetation: ProductDescriptor::vegetation_index(),
            leaf_area: ProductDescriptor::leaf_area(),
            temperature: ProductDescriptor::land_surface_temperature(),
        }
    }
}
