use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{CadenceGroup, ObservationRecord, ObservationSeries, Variable};
use crate::processors::compositor::CompositeOutcome;

/// Collects per-composite region means into one station's date-ordered series.
pub struct SeriesAssembler {
    station: String,
    group: CadenceGroup,
    records: Vec<ObservationRecord>,
}

impl SeriesAssembler {
    pub fn new(station: impl Into<String>, group: CadenceGroup) -> Self {
        Self {
            station: station.into(),
            group,
            records: Vec::new(),
        }
    }

    /// Adds one record per composite date.
    ///
    /// Every variable of the cadence group is present; anything the
    /// outcome lacks is recorded as no data.
    pub fn push(&mut self, outcome: &CompositeOutcome) {
        let values: BTreeMap<Variable, Option<f64>> = self
            .group
            .variables()
            .iter()
            .map(|variable| {
                let value = outcome
                    .values
                    .get(variable)
                    .copied()
                    .flatten()
                    .filter(|v| v.is_finite());
                (*variable, value)
            })
            .collect();

        self.records
            .push(ObservationRecord::new(self.station.clone(), outcome.date, values));
    }

    pub fn extend<'a>(&mut self, outcomes: impl IntoIterator<Item = &'a CompositeOutcome>) {
        for outcome in outcomes {
            self.push(outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Orders records by date; composites sharing a date keep arrival order.
    pub fn finish(mut self) -> ObservationSeries {
        self.records.sort_by_key(|r| r.date);
        debug!(
            "Assembled {} {} records for {}",
            self.records.len(),
            self.group.label(),
            self.station
        );

        ObservationSeries {
            station: self.station,
            group: self.group,
            records: self.records,
        }
    }
}
