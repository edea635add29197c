use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{MonthlyRecord, ObservationSeries, Variable};
use crate::utils::constants::{MISSING_SENTINEL, SENTINEL_TOLERANCE};

type MonthKey = (String, i32, u32);

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    weighted_sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: f64, weight: usize) {
        self.weighted_sum += value * weight as f64;
        self.count += weight;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.weighted_sum / self.count as f64)
    }
}

/// Monthly table plus what the invalid-value filter removed.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub records: Vec<MonthlyRecord>,
    /// Individual values dropped as sentinel, null or non-finite
    pub invalid_values: usize,
    /// Station-months whose every value was filtered out
    pub empty_groups: usize,
}

/// Groups per-composite series by (station, year, month) and outer-merges the
/// cadences into one table.
pub struct MonthlyAggregator {
    sentinel: f64,
}

impl MonthlyAggregator {
    pub fn new() -> Self {
        Self {
            sentinel: MISSING_SENTINEL,
        }
    }

    pub fn with_sentinel(sentinel: f64) -> Self {
        Self { sentinel }
    }

    /// The value if it survives invalid-value filtering
    pub fn valid(&self, value: Option<f64>) -> Option<f64> {
        value.filter(|v| v.is_finite() && (v - self.sentinel).abs() > SENTINEL_TOLERANCE)
    }

    /// Mean of each variable per station-month, merged across every series.
    ///
    /// A month appears if any series has a valid value in it; variables of a
    /// cadence with nothing valid that month are absent, never zero.
    pub fn aggregate(&self, series: &[&ObservationSeries]) -> Result<Aggregation> {
        let columns: BTreeSet<Variable> = series
            .iter()
            .flat_map(|s| s.group.variables().iter().copied())
            .collect();

        let mut groups: BTreeMap<MonthKey, BTreeMap<Variable, Accumulator>> = BTreeMap::new();
        let mut invalid_values = 0;

        for s in series {
            debug!(
                "Grouping {} {} records for {}",
                s.len(),
                s.group.label(),
                s.station
            );
            for record in s.iter() {
                let group = groups
                    .entry((record.station.clone(), record.year, record.month))
                    .or_default();

                for variable in s.group.variables() {
                    match self.valid(record.value(*variable)) {
                        Some(value) => group.entry(*variable).or_default().add(value, 1),
                        None => invalid_values += 1,
                    }
                }
            }
        }

        self.build(groups, &columns, invalid_values)
    }

    /// Aggregates monthly records again, weighting each mean by its count.
    ///
    /// Feeding a table back in with the same keys reproduces the same means.
    pub fn reaggregate(&self, records: &[MonthlyRecord]) -> Result<Aggregation> {
        let columns: BTreeSet<Variable> = records
            .iter()
            .flat_map(|r| r.values.keys().copied())
            .collect();

        let mut groups: BTreeMap<MonthKey, BTreeMap<Variable, Accumulator>> = BTreeMap::new();
        let mut invalid_values = 0;

        for record in records {
            let group = groups.entry(record.key()).or_default();
            for variable in record.values.keys() {
                match self.valid(record.value(*variable)) {
                    // Tables read without counts weigh each mean once
                    Some(mean) => group
                        .entry(*variable)
                        .or_default()
                        .add(mean, record.count(*variable).max(1)),
                    None => invalid_values += 1,
                }
            }
        }

        self.build(groups, &columns, invalid_values)
    }

    fn build(
        &self,
        groups: BTreeMap<MonthKey, BTreeMap<Variable, Accumulator>>,
        columns: &BTreeSet<Variable>,
        invalid_values: usize,
    ) -> Result<Aggregation> {
        let mut aggregation = Aggregation {
            invalid_values,
            ..Default::default()
        };

        for ((station, year, month), accumulators) in groups {
            if accumulators.values().all(|a| a.count == 0) {
                debug!("No valid values for {} {}-{:02}", station, year, month);
                aggregation.empty_groups += 1;
                continue;
            }

            let mut builder = MonthlyRecord::builder()
                .station(station)
                .year_month(year, month);
            for variable in columns {
                builder = match accumulators.get(variable).and_then(|a| a.mean().map(|m| (m, a.count))) {
                    Some((mean, count)) => builder.mean(*variable, mean, count),
                    None => builder.absent(*variable),
                };
            }
            aggregation.records.push(builder.build()?);
        }

        info!(
            "Aggregated {} monthly records ({} invalid values, {} empty months)",
            aggregation.records.len(),
            aggregation.invalid_values,
            aggregation.empty_groups
        );
        Ok(aggregation)
    }
}

impl Default for MonthlyAggregator {
    fn default() -> Self {
        Self::new()
    }
}
