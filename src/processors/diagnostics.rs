use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::Result;
use crate::models::{CadenceGroup, MonthlyRecord, ObservationSeries, Variable};
use crate::processors::baseline::BaselineStatistics;
use crate::processors::compositor::CompositeOutcome;
use crate::processors::monthly_aggregator::Aggregation;
use crate::processors::quality_mask::{FlagTally, MaskOutcome};
use crate::utils::calendar::months_between;

/// What a station run degraded, skipped or could not find.
///
/// Reported alongside the data; nothing here stops a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunDiagnostics {
    pub station: String,
    pub composites: BTreeMap<CadenceGroup, usize>,
    /// Records with no value, per variable
    pub no_data: BTreeMap<Variable, usize>,
    pub backend_failures: u32,
    pub retries: u32,
    pub failed_queries: Vec<String>,
    /// Quality flags of every composite masked in the run
    pub flags: FlagTally,
    pub degenerate_baseline: bool,
    pub baseline_observations: usize,
    /// Driving dates whose smoothing window held no secondary composite
    pub empty_smoothing_windows: Vec<NaiveDate>,
    pub invalid_values: usize,
    pub empty_months: usize,
    pub monthly_records: usize,
    /// Months in the run's range with no row in the monthly table
    pub missing_months: Vec<(i32, u32)>,
}

impl RunDiagnostics {
    pub fn new(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            ..Default::default()
        }
    }

    pub fn record_mask(&mut self, mask: &MaskOutcome) {
        self.flags.record(mask);
    }

    pub fn record_baseline(&mut self, baseline: &BaselineStatistics) {
        self.degenerate_baseline = baseline.degenerate;
        self.baseline_observations = baseline.observations;
    }

    pub fn record_query_failure(&mut self, description: impl Into<String>) {
        self.failed_queries.push(description.into());
    }

    pub fn record_outcomes(&mut self, outcomes: &[CompositeOutcome]) {
        for outcome in outcomes {
            self.retries += outcome.retries;
            self.backend_failures += outcome.backend_failures;
            self.flags.merge(&outcome.flags);
            if outcome.window_size == Some(0) {
                self.empty_smoothing_windows.push(outcome.date);
            }
        }
    }

    pub fn record_series(&mut self, series: &ObservationSeries) {
        *self.composites.entry(series.group).or_default() += series.len();
        for variable in series.group.variables() {
            *self.no_data.entry(*variable).or_default() += series.missing_count(*variable);
        }
    }

    /// Monthly totals, and every month of `[start, end]` the table lacks.
    pub fn record_monthly(&mut self, aggregation: &Aggregation, start: NaiveDate, end: NaiveDate) {
        self.invalid_values += aggregation.invalid_values;
        self.empty_months += aggregation.empty_groups;
        self.monthly_records += aggregation.records.len();
        self.missing_months = missing_months(&aggregation.records, start, end);
    }

    pub fn has_degradations(&self) -> bool {
        self.backend_failures > 0 || !self.failed_queries.is_empty() || self.degenerate_baseline
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!("=== Run Diagnostics: {} ===\n", self.station));
        for (group, count) in &self.composites {
            summary.push_str(&format!("{} composites: {}\n", group.label(), count));
        }
        if !self.no_data.is_empty() {
            summary.push_str("No-data records:\n");
            for (variable, count) in &self.no_data {
                summary.push_str(&format!("  {}: {}\n", variable, count));
            }
        }

        let flags = &self.flags;
        if flags.total() > 0 {
            summary.push_str(&format!(
                "Quality flags: {} accepted ({:.1}%), {} rejected\n",
                flags.accepted,
                100.0 * flags.accepted as f64 / flags.total() as f64,
                flags.rejected
            ));
        }
        if flags.malformed > 0 {
            summary.push_str(&format!("Malformed quality flags: {}\n", flags.malformed));
        }

        summary.push_str(&format!(
            "Backend: {} retries, {} permanent failures, {} failed record queries\n",
            self.retries,
            self.backend_failures,
            self.failed_queries.len()
        ));
        for query in self.failed_queries.iter().take(10) {
            summary.push_str(&format!("  {}\n", query));
        }

        if self.degenerate_baseline {
            summary.push_str(&format!(
                "Degenerate NDVI baseline ({} observations): no usable vegetation signal\n",
                self.baseline_observations
            ));
        }
        if !self.empty_smoothing_windows.is_empty() {
            summary.push_str(&format!(
                "Smoothing windows without temperature composites: {}\n",
                self.empty_smoothing_windows.len()
            ));
        }

        summary.push_str(&format!(
            "Monthly records: {} ({} invalid values filtered, {} empty months)\n",
            self.monthly_records, self.invalid_values, self.empty_months
        ));
        if !self.missing_months.is_empty() {
            summary.push_str(&format!("Missing months: {}\n", self.missing_months.len()));
            for (year, month) in self.missing_months.iter().take(10) {
                summary.push_str(&format!("  {}-{:02}\n", year, month));
            }
        }

        summary
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Calendar months of `[start, end]` with no monthly record
pub fn missing_months(records: &[MonthlyRecord], start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    months_between(start, end)
        .into_iter()
        .filter(|(year, month)| !records.iter().any(|r| r.year == *year && r.month == *month))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObservationRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_missing_months_are_reported() {
        let records = vec![MonthlyRecord::builder()
            .station("S")
            .year_month(2001, 2)
            .mean(Variable::Ndvi, 0.4, 1)
            .build()
            .unwrap()];

        let missing = missing_months(&records, date(2001, 1, 1), date(2001, 3, 31));
        assert_eq!(missing, vec![(2001, 1), (2001, 3)]);
    }

    #[test]
    fn test_series_no_data_counts() {
        let mut series = ObservationSeries::new("S", CadenceGroup::EightDay);
        let mut values = BTreeMap::new();
        values.insert(Variable::Lai, Some(1.0));
        values.insert(Variable::Lst, None);
        series
            .records
            .push(ObservationRecord::new("S", date(2001, 1, 1), values));

        let mut diagnostics = RunDiagnostics::new("S");
        diagnostics.record_series(&series);

        assert_eq!(diagnostics.composites[&CadenceGroup::EightDay], 1);
        assert_eq!(diagnostics.no_data[&Variable::Lst], 1);
        assert_eq!(diagnostics.no_data[&Variable::Fapar], 1);
        assert_eq!(diagnostics.no_data[&Variable::Lai], 0);
    }

    #[test]
    fn test_summary_flags_degradations() {
        let mut diagnostics = RunDiagnostics::new("ALGER");
        diagnostics.record_baseline(&BaselineStatistics::regional(0.1, 0.1, 1e-6));
        diagnostics.record_outcomes(&[CompositeOutcome {
            date: date(2001, 6, 10),
            values: BTreeMap::new(),
            retries: 2,
            backend_failures: 1,
            window_size: Some(0),
            flags: FlagTally {
                accepted: 0,
                rejected: 0,
                malformed: 3,
            },
        }]);

        assert!(diagnostics.has_degradations());
        let summary = diagnostics.summary();
        assert!(summary.contains("ALGER"));
        assert!(summary.contains("Degenerate NDVI baseline"));
        assert!(summary.contains("2 retries, 1 permanent failures"));
        assert!(summary.contains("without temperature composites: 1"));
        assert!(summary.contains("Malformed quality flags: 3"));
    }

    #[test]
    fn test_summary_reports_malformed_flags_alone() {
        let mut diagnostics = RunDiagnostics::new("S");
        diagnostics.flags.malformed = 3;

        let summary = diagnostics.summary();
        assert!(summary.contains("Malformed quality flags: 3"));
        assert!(summary.contains("0 accepted"));

        diagnostics.flags.malformed = 0;
        assert!(!diagnostics.summary().contains("Malformed"));
    }

    #[test]
    fn test_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagnostics.json");

        let mut diagnostics = RunDiagnostics::new("S");
        diagnostics.missing_months.push((2001, 4));
        diagnostics.write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["station"], "S");
        assert_eq!(json["missing_months"][0][1], 4);
    }
}
