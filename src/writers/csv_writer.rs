use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::models::{MonthlyRecord, ObservationSeries, Variable};
use crate::utils::constants::MISSING_SENTINEL;
use crate::utils::filename::{monthly_filename, series_filename};

/// How a missing value is written.
///
/// Readers accept either, so a table written one way re-reads with the same
/// missing observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingEncoding {
    /// The reserved -9999 value
    #[default]
    Sentinel,
    /// An empty field
    Empty,
}

impl FromStr for MissingEncoding {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sentinel" => Ok(MissingEncoding::Sentinel),
            "empty" | "null" => Ok(MissingEncoding::Empty),
            _ => Err(ProcessingError::Config(format!(
                "Unsupported missing-value encoding: {}",
                s
            ))),
        }
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub struct CsvWriter {
    missing: MissingEncoding,
    decimals: Option<u32>,
}

impl CsvWriter {
    pub fn new() -> Self {
        Self {
            missing: MissingEncoding::Sentinel,
            decimals: None,
        }
    }

    pub fn with_missing(mut self, missing: MissingEncoding) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_decimals(mut self, decimals: Option<u32>) -> Self {
        self.decimals = decimals;
        self
    }

    fn format_value(&self, value: Option<f64>) -> String {
        match value.filter(|v| v.is_finite()) {
            Some(v) => match self.decimals {
                Some(decimals) => round_to(v, decimals).to_string(),
                None => v.to_string(),
            },
            None => match self.missing {
                MissingEncoding::Sentinel => MISSING_SENTINEL.to_string(),
                MissingEncoding::Empty => String::new(),
            },
        }
    }

    /// `station,date,year,month,doy,<group variables>`
    pub fn write_series(&self, series: &ObservationSeries, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_series_to(series, file)?;
        debug!("Wrote {} records to {}", series.len(), path.display());
        Ok(())
    }

    pub fn write_series_to<W: Write>(&self, series: &ObservationSeries, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let variables = series.group.variables();

        let mut header = vec!["station", "date", "year", "month", "doy"];
        header.extend(variables.iter().map(|v| v.column()));
        csv_writer.write_record(&header)?;

        for record in series.iter() {
            let mut row = vec![
                record.station.clone(),
                record.date.format("%Y-%m-%d").to_string(),
                record.year.to_string(),
                record.month.to_string(),
                record.day_of_year.to_string(),
            ];
            row.extend(variables.iter().map(|v| self.format_value(record.value(*v))));
            csv_writer.write_record(&row)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// `station,year,month,date,<every variable in the table>`
    pub fn write_monthly(&self, records: &[MonthlyRecord], path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_monthly_to(records, file)?;
        debug!("Wrote {} monthly records to {}", records.len(), path.display());
        Ok(())
    }

    pub fn write_monthly_to<W: Write>(&self, records: &[MonthlyRecord], writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let variables = monthly_columns(records);

        let mut header = vec!["station", "year", "month", "date"];
        header.extend(variables.iter().map(|v| v.column()));
        csv_writer.write_record(&header)?;

        for record in records {
            let mut row = vec![
                record.station.clone(),
                record.year.to_string(),
                record.month.to_string(),
                record.date.format("%Y-%m-%d").to_string(),
            ];
            row.extend(variables.iter().map(|v| self.format_value(record.value(*v))));
            csv_writer.write_record(&row)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Writes every series and the monthly table under their default names.
    ///
    /// Series are written with full precision; the monthly table uses this
    /// writer's rounding.
    pub fn write_station_tables(
        &self,
        output_dir: &Path,
        station: &str,
        series: &[&ObservationSeries],
        monthly: &[MonthlyRecord],
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;
        let mut paths = Vec::with_capacity(series.len() + 1);

        let series_writer = CsvWriter::new().with_missing(self.missing);
        for s in series {
            let path = series_filename(output_dir, station, s.group);
            series_writer.write_series(s, &path)?;
            paths.push(path);
        }

        let path = monthly_filename(output_dir, station, "csv");
        self.write_monthly(monthly, &path)?;
        paths.push(path);

        Ok(paths)
    }
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Variable columns of a monthly table, in canonical order
pub fn monthly_columns(records: &[MonthlyRecord]) -> Vec<Variable> {
    let present: BTreeSet<Variable> = records
        .iter()
        .flat_map(|r| r.values.keys().copied())
        .collect();
    present.into_iter().collect()
}
