use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ProcessingError, Result};
use crate::models::observation::{CadenceGroup, Variable};
use crate::utils::calendar::first_of_month;

/// One station-month of the merged climatology table.
///
/// `counts` holds how many valid observations fed each mean, so monthly
/// tables can be re-aggregated without losing weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRecord {
    pub station: String,
    pub year: i32,
    pub month: u32,
    pub date: NaiveDate,
    pub values: BTreeMap<Variable, Option<f64>>,
    pub counts: BTreeMap<Variable, usize>,
}

impl MonthlyRecord {
    pub fn builder() -> MonthlyRecordBuilder {
        MonthlyRecordBuilder::new()
    }

    pub fn key(&self) -> (String, i32, u32) {
        (self.station.clone(), self.year, self.month)
    }

    pub fn value(&self, variable: Variable) -> Option<f64> {
        self.values.get(&variable).copied().flatten()
    }

    pub fn count(&self, variable: Variable) -> usize {
        self.counts.get(&variable).copied().unwrap_or(0)
    }

    /// Whether any variable of the cadence group has a mean this month
    pub fn has_group(&self, group: CadenceGroup) -> bool {
        group.variables().iter().any(|v| self.value(*v).is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.has_group(CadenceGroup::SixteenDay) && self.has_group(CadenceGroup::EightDay)
    }
}

pub struct MonthlyRecordBuilder {
    station: Option<String>,
    year: Option<i32>,
    month: Option<u32>,
    values: BTreeMap<Variable, Option<f64>>,
    counts: BTreeMap<Variable, usize>,
}

impl Default for MonthlyRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MonthlyRecordBuilder {
    pub fn new() -> Self {
        Self {
            station: None,
            year: None,
            month: None,
            values: BTreeMap::new(),
            counts: BTreeMap::new(),
        }
    }

    pub fn station(mut self, station: impl Into<String>) -> Self {
        self.station = Some(station.into());
        self
    }

    pub fn year_month(mut self, year: i32, month: u32) -> Self {
        self.year = Some(year);
        self.month = Some(month);
        self
    }

    /// Records a variable's mean and the number of observations behind it
    pub fn mean(mut self, variable: Variable, mean: f64, count: usize) -> Self {
        self.values.insert(variable, Some(mean));
        self.counts.insert(variable, count);
        self
    }

    /// Marks a variable as absent for this month
    pub fn absent(mut self, variable: Variable) -> Self {
        self.values.insert(variable, None);
        self.counts.insert(variable, 0);
        self
    }

    pub fn build(self) -> Result<MonthlyRecord> {
        let station = self
            .station
            .ok_or_else(|| ProcessingError::MissingData("station".to_string()))?;
        let year = self
            .year
            .ok_or_else(|| ProcessingError::MissingData("year".to_string()))?;
        let month = self
            .month
            .ok_or_else(|| ProcessingError::MissingData("month".to_string()))?;
        let date = first_of_month(year, month).ok_or_else(|| {
            ProcessingError::InvalidFormat(format!("Invalid year/month {}-{}", year, month))
        })?;

        Ok(MonthlyRecord {
            station,
            year,
            month,
            date,
            values: self.values,
            counts: self.counts,
        })
    }
}
