use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::utils::calendar::day_of_year;

/// A tracked biophysical variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variable {
    #[serde(rename = "NDVI")]
    Ndvi,
    #[serde(rename = "EVI")]
    Evi,
    #[serde(rename = "VCI")]
    Vci,
    #[serde(rename = "LAI")]
    Lai,
    #[serde(rename = "FAPAR")]
    Fapar,
    #[serde(rename = "LST")]
    Lst,
}

impl Variable {
    pub const ALL: [Variable; 6] = [
        Variable::Ndvi,
        Variable::Evi,
        Variable::Vci,
        Variable::Lai,
        Variable::Fapar,
        Variable::Lst,
    ];

    /// Column name used in persisted tables
    pub fn column(&self) -> &'static str {
        match self {
            Variable::Ndvi => "NDVI",
            Variable::Evi => "EVI",
            Variable::Vci => "VCI",
            Variable::Lai => "LAI",
            Variable::Fapar => "FAPAR",
            Variable::Lst => "LST",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.column().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Composite cadences whose series are assembled and aggregated separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CadenceGroup {
    SixteenDay,
    EightDay,
}

impl CadenceGroup {
    pub fn variables(&self) -> &'static [Variable] {
        match self {
            CadenceGroup::SixteenDay => &[Variable::Ndvi, Variable::Evi, Variable::Vci],
            CadenceGroup::EightDay => &[Variable::Lai, Variable::Fapar, Variable::Lst],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CadenceGroup::SixteenDay => "16Day",
            CadenceGroup::EightDay => "8Day",
        }
    }
}

/// One composite reduced to scalars for one station.
///
/// `None` is the only in-memory representation of "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub station: String,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day_of_year: u32,
    pub values: BTreeMap<Variable, Option<f64>>,
}

impl ObservationRecord {
    /// Builds a record, deriving the calendar fields from `date` itself.
    pub fn new(
        station: impl Into<String>,
        date: NaiveDate,
        values: BTreeMap<Variable, Option<f64>>,
    ) -> Self {
        Self {
            station: station.into(),
            date,
            year: date.year(),
            month: date.month(),
            day_of_year: day_of_year(date),
            values,
        }
    }

    pub fn value(&self, variable: Variable) -> Option<f64> {
        self.values.get(&variable).copied().flatten()
    }

    pub fn set(&mut self, variable: Variable, value: Option<f64>) {
        self.values.insert(variable, value);
    }

    pub fn has_any_value(&self) -> bool {
        self.values.values().any(|v| v.is_some())
    }
}

/// Date-ordered records for one station and cadence group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSeries {
    pub station: String,
    pub group: CadenceGroup,
    pub records: Vec<ObservationRecord>,
}

impl ObservationSeries {
    pub fn new(station: impl Into<String>, group: CadenceGroup) -> Self {
        Self {
            station: station.into(),
            group,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObservationRecord> {
        self.records.iter()
    }

    /// Number of records with no value for `variable`
    pub fn missing_count(&self, variable: Variable) -> usize {
        self.records
            .iter()
            .filter(|r| r.value(variable).is_none())
            .count()
    }
}
