use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::models::{CadenceGroup, MonthlyRecord, ObservationRecord, ObservationSeries, Variable};
use crate::utils::constants::{MISSING_SENTINEL, SENTINEL_TOLERANCE};

/// Reads persisted series and monthly tables back into the in-memory model.
///
/// Missing values may be the sentinel, an empty field, or `NaN`; all of them
/// come back as `None`.
pub struct SeriesReader {
    sentinel: f64,
}

struct Columns {
    station: usize,
    date: Option<usize>,
    year: Option<usize>,
    month: Option<usize>,
    variables: Vec<(usize, Variable)>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };

        let station = find(&["station", "name"])
            .ok_or_else(|| ProcessingError::MissingData("station column".to_string()))?;
        let variables = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| Variable::from_column(h).map(|v| (i, v)))
            .collect();

        Ok(Self {
            station,
            date: find(&["date"]),
            year: find(&["year"]),
            month: find(&["month"]),
            variables,
        })
    }
}

impl SeriesReader {
    pub fn new() -> Self {
        Self {
            sentinel: MISSING_SENTINEL,
        }
    }

    pub fn with_sentinel(sentinel: f64) -> Self {
        Self { sentinel }
    }

    pub fn parse_value(&self, field: &str) -> Result<Option<f64>> {
        let field = field.trim();
        if field.is_empty() || field.eq_ignore_ascii_case("nan") {
            return Ok(None);
        }

        let value = field
            .parse::<f64>()
            .map_err(|_| ProcessingError::InvalidFormat(format!("Invalid value: '{}'", field)))?;
        if !value.is_finite() || (value - self.sentinel).abs() <= SENTINEL_TOLERANCE {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Reads a per-composite series table for one cadence group.
    ///
    /// Variable columns outside the group are ignored; calendar fields are
    /// derived from each row's date.
    pub fn read_series(&self, path: &Path, group: CadenceGroup) -> Result<ObservationSeries> {
        let file = File::open(path)?;
        let series = self.read_series_from(file, group)?;
        debug!(
            "Read {} {} records from {}",
            series.len(),
            group.label(),
            path.display()
        );
        Ok(series)
    }

    pub fn read_series_from<R: Read>(&self, reader: R, group: CadenceGroup) -> Result<ObservationSeries> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let columns = Columns::from_headers(csv_reader.headers()?)?;
        let date_column = columns
            .date
            .ok_or_else(|| ProcessingError::MissingData("date column".to_string()))?;

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let station = field(&row, columns.station)?;
            let date = parse_date(field(&row, date_column)?)?;

            let mut values = BTreeMap::new();
            for variable in group.variables() {
                values.insert(*variable, None);
            }
            for (index, variable) in &columns.variables {
                if group.variables().contains(variable) {
                    values.insert(*variable, self.parse_value(field(&row, *index)?)?);
                }
            }

            records.push(ObservationRecord::new(station, date, values));
        }

        let station = records
            .first()
            .map(|r| r.station.clone())
            .unwrap_or_default();
        Ok(ObservationSeries {
            station,
            group,
            records,
        })
    }

    /// Reads a monthly table; each present mean counts as one observation.
    pub fn read_monthly(&self, path: &Path) -> Result<Vec<MonthlyRecord>> {
        let file = File::open(path)?;
        self.read_monthly_from(file)
    }

    pub fn read_monthly_from<R: Read>(&self, reader: R) -> Result<Vec<MonthlyRecord>> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let columns = Columns::from_headers(csv_reader.headers()?)?;
        let (Some(year_column), Some(month_column)) = (columns.year, columns.month) else {
            return Err(ProcessingError::MissingData("year/month columns".to_string()));
        };

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let year = parse_int::<i32>(field(&row, year_column)?)?;
            let month = parse_int::<u32>(field(&row, month_column)?)?;

            let mut builder = MonthlyRecord::builder()
                .station(field(&row, columns.station)?)
                .year_month(year, month);
            for (index, variable) in &columns.variables {
                builder = match self.parse_value(field(&row, *index)?)? {
                    Some(mean) => builder.mean(*variable, mean, 1),
                    None => builder.absent(*variable),
                };
            }
            records.push(builder.build()?);
        }
        Ok(records)
    }
}

impl Default for SeriesReader {
    fn default() -> Self {
        Self::new()
    }
}

fn field(row: &StringRecord, index: usize) -> Result<&str> {
    row.get(index).ok_or_else(|| {
        ProcessingError::InvalidFormat(format!(
            "Row {:?} has no column {}",
            row.position().map(|p| p.line()),
            index
        ))
    })
}

/// ISO date, tolerating a trailing time part
fn parse_date(value: &str) -> Result<NaiveDate> {
    let date = value.get(..10).unwrap_or(value);
    Ok(NaiveDate::parse_from_str(date, "%Y-%m-%d")?)
}

fn parse_int<T: std::str::FromStr>(value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| ProcessingError::InvalidFormat(format!("Invalid integer: '{}'", value)))
}
