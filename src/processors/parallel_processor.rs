use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{BaselineStrategy, PipelineConfig};
use crate::error::{ProcessingError, Result};
use crate::models::{
    CadenceGroup, ImageBands, MonthlyRecord, ObservationSeries, ProductDescriptor, Station,
    Variable,
};
use crate::processors::baseline::BaselineBuilder;
use crate::processors::compositor::{
    apply_regional_index, prepare_composite, CompositeOutcome, TemporalCompositor,
};
use crate::processors::diagnostics::RunDiagnostics;
use crate::processors::monthly_aggregator::MonthlyAggregator;
use crate::processors::series_assembler::SeriesAssembler;
use crate::raster::{RasterStatistics, RecordSource, Region};
use crate::utils::progress::ProgressReporter;

/// Everything one station run produces.
#[derive(Debug, Clone)]
pub struct StationOutput {
    pub station: Station,
    pub sixteen_day: ObservationSeries,
    pub eight_day: ObservationSeries,
    pub monthly: Vec<MonthlyRecord>,
    pub diagnostics: RunDiagnostics,
}

impl StationOutput {
    pub fn series(&self, group: CadenceGroup) -> &ObservationSeries {
        match group {
            CadenceGroup::SixteenDay => &self.sixteen_day,
            CadenceGroup::EightDay => &self.eight_day,
        }
    }
}

/// Extraction and aggregation for one station at a time.
///
/// Holds only immutable configuration and the shared collaborators, so clones
/// may run different stations concurrently.
#[derive(Clone)]
pub struct StationPipeline {
    config: Arc<PipelineConfig>,
    source: Arc<dyn RecordSource>,
    reducer: Arc<dyn RasterStatistics>,
    pool: Arc<rayon::ThreadPool>,
}

impl StationPipeline {
    /// Validates `config` up front; a bad configuration never starts a run.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn RecordSource>,
        reducer: Arc<dyn RasterStatistics>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.run.max_workers)
            .build()
            .map_err(|e| ProcessingError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            source,
            reducer,
            pool: Arc::new(pool),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extracts both cadence series for `station` and aggregates them by month.
    ///
    /// Backend failures degrade individual records to no data; only an invalid
    /// station is an error.
    pub fn run(&self, station: &Station) -> Result<StationOutput> {
        station.check()?;
        info!("Processing station {} ({})", station.name, station.id);

        let mut diagnostics = RunDiagnostics::new(&station.name);
        let compositor = TemporalCompositor::new(
            self.source.as_ref(),
            self.reducer.as_ref(),
            &self.config.retry,
            Region::buffer(station),
            self.config.run.coverage,
        );

        let (sixteen_day, eight_day) = self.pool.install(|| {
            let sixteen_day = self.sixteen_day(station, &compositor, &mut diagnostics);
            let eight_day = self.eight_day(station, &compositor, &mut diagnostics);
            (sixteen_day, eight_day)
        });

        let aggregation = MonthlyAggregator::new().aggregate(&[&sixteen_day, &eight_day])?;
        diagnostics.record_series(&sixteen_day);
        diagnostics.record_series(&eight_day);
        diagnostics.record_monthly(&aggregation, self.config.run.start_date, self.config.run.end_date);

        if diagnostics.has_degradations() {
            warn!(
                "Station {} completed with degradations; see diagnostics",
                station.name
            );
        }
        info!(
            "Station {}: {} 16-day, {} 8-day, {} monthly records",
            station.name,
            sixteen_day.len(),
            eight_day.len(),
            aggregation.records.len()
        );

        Ok(StationOutput {
            station: station.clone(),
            sixteen_day,
            eight_day,
            monthly: aggregation.records,
            diagnostics,
        })
    }

    /// Masked, converted record of `product` over the run's date range.
    ///
    /// A query that keeps failing yields an empty record.
    fn fetch_record(
        &self,
        product: &ProductDescriptor,
        diagnostics: &mut RunDiagnostics,
    ) -> Vec<ImageBands> {
        let run = &self.config.run;
        let label = format!("query {} {}..{}", product.id, run.start_date, run.end_date);
        let attempted = self.config.retry.run(&label, || {
            self.source
                .query_record(&product.id, run.start_date, run.end_date)
        });
        diagnostics.retries += attempted.retries;

        let images = match attempted.result {
            Ok(images) => images,
            Err(err) => {
                warn!("{} failed permanently: {}", label, err);
                diagnostics.record_query_failure(format!("{}: {}", label, err));
                return Vec::new();
            }
        };

        let prepared: Vec<_> = images
            .par_iter()
            .map(|image| (image.date, prepare_composite(product, image)))
            .collect();

        let mut record = Vec::with_capacity(prepared.len());
        for (date, result) in prepared {
            match result {
                Ok(p) => {
                    diagnostics.record_mask(&p.mask);
                    record.push(p.bands);
                }
                Err(err) => warn!("Skipping {} composite {}: {}", product.id, date, err),
            }
        }
        record
    }

    fn sixteen_day(
        &self,
        station: &Station,
        compositor: &TemporalCompositor<'_>,
        diagnostics: &mut RunDiagnostics,
    ) -> ObservationSeries {
        let product = &self.config.products.vegetation;
        let images = self.fetch_record(product, diagnostics);
        let builder = BaselineBuilder::new(self.config.run.baseline_strategy)
            .with_epsilon(self.config.run.vci_epsilon);

        // The baseline is complete before any index is derived from it
        let outcomes = match builder.strategy() {
            BaselineStrategy::PixelWise => {
                let baseline = builder
                    .build_pixel_wise(&images, Variable::Ndvi)
                    .for_region(&Region::buffer(station), product.resolution_m);
                diagnostics.record_baseline(&baseline);
                compositor.composite_fixed(product, &images, &baseline)
            }
            BaselineStrategy::Regional => {
                let mut outcomes = compositor.reduce_record(product, &images);
                let ndvi: Vec<Option<f64>> = outcomes
                    .iter()
                    .map(|o| o.values.get(&Variable::Ndvi).copied().flatten())
                    .collect();
                let baseline = builder.build_regional(&ndvi);
                diagnostics.record_baseline(&baseline);
                apply_regional_index(&mut outcomes, &baseline);
                outcomes
            }
        };

        self.assemble(station, CadenceGroup::SixteenDay, &outcomes, diagnostics)
    }

    fn eight_day(
        &self,
        station: &Station,
        compositor: &TemporalCompositor<'_>,
        diagnostics: &mut RunDiagnostics,
    ) -> ObservationSeries {
        let products = &self.config.products;
        let images = self.fetch_record(&products.leaf_area, diagnostics);
        let outcomes = compositor.composite_smoothed(
            &products.leaf_area,
            &images,
            &products.temperature,
            self.config.run.smoothing_window_days,
        );

        self.assemble(station, CadenceGroup::EightDay, &outcomes, diagnostics)
    }

    fn assemble(
        &self,
        station: &Station,
        group: CadenceGroup,
        outcomes: &[CompositeOutcome],
        diagnostics: &mut RunDiagnostics,
    ) -> ObservationSeries {
        diagnostics.record_outcomes(outcomes);
        let mut assembler = SeriesAssembler::new(&station.name, group);
        assembler.extend(outcomes);
        assembler.finish()
    }
}

/// Runs isolated station pipelines concurrently under one deadline.
pub struct ParallelProcessor {
    pipeline: StationPipeline,
}

impl ParallelProcessor {
    pub fn new(pipeline: StationPipeline) -> Self {
        Self { pipeline }
    }

    /// One result per station, in input order.
    ///
    /// A failing station does not affect the others. Exceeding the run
    /// deadline fails the whole call; blocking tasks still in flight finish
    /// in the background and their results are dropped.
    pub async fn process_stations(
        &self,
        stations: Vec<Station>,
        progress: Option<&ProgressReporter>,
    ) -> Result<Vec<Result<StationOutput>>> {
        let total = stations.len();
        let deadline = self.pipeline.config().run.deadline();

        if let Some(p) = progress {
            p.set_length(total as u64);
            p.set_message(&format!("Processing {} stations...", total));
        }

        let handles: Vec<_> = stations
            .into_iter()
            .map(|station| {
                let pipeline = self.pipeline.clone();
                tokio::task::spawn_blocking(move || pipeline.run(&station))
            })
            .collect();

        let work = async {
            let mut outputs = Vec::with_capacity(total);
            for handle in handles {
                outputs.push(handle.await?);
                if let Some(p) = progress {
                    p.increment(1);
                }
            }
            Ok::<_, ProcessingError>(outputs)
        };

        let outputs = tokio::time::timeout(deadline, work)
            .await
            .map_err(|_| ProcessingError::DeadlineExceeded {
                seconds: deadline.as_secs(),
            })??;

        if let Some(p) = progress {
            p.finish_with_message(&format!("Processed {} stations", total));
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompositeImage, PixelGrid};
    use crate::raster::{GridReducer, InMemoryRecordSource};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn station() -> Station {
        Station::new("60390", "ALGER_DAR_EL_BEIDA_AG", 36.6833, 3.2167, 1000.0)
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::reference(date(2001, 1, 1), date(2001, 2, 28))
            .with_station(station());
        config.run.max_workers = 2;
        config.retry = crate::raster::RetryPolicy::none();
        config
    }

    fn source() -> InMemoryRecordSource {
        let grid = PixelGrid::centred_on(36.6833, 3.2167, 0.009, 5);
        let products = crate::models::ProductSet::default();
        let ndvi = [(1, 5000), (17, 6000), (33, 4000)];

        let mut images = Vec::new();
        for (doy, raw) in ndvi {
            let day = date(2001, 1, 1) + chrono::Duration::days(doy - 1);
            images.push(
                CompositeImage::new(&products.vegetation.id, day, grid)
                    .with_uniform_band("NDVI", raw)
                    .with_uniform_band("EVI", raw / 2)
                    .with_uniform_quality(0),
            );
        }
        images.push(
            CompositeImage::new(&products.leaf_area.id, date(2001, 1, 9), grid)
                .with_uniform_band("Lai_500m", 12)
                .with_uniform_band("Fpar_500m", 40)
                .with_uniform_quality(0),
        );
        InMemoryRecordSource::new().with_images(images)
    }

    #[test]
    fn test_station_run() {
        let pipeline = StationPipeline::new(
            config(),
            Arc::new(source()),
            Arc::new(GridReducer::new()),
        )
        .unwrap();

        let output = pipeline.run(&station()).unwrap();
        assert_eq!(output.sixteen_day.len(), 3);
        assert_eq!(output.eight_day.len(), 1);
        assert_eq!(output.monthly.len(), 2);

        let january = &output.monthly[0];
        assert!((january.value(Variable::Ndvi).unwrap() - 0.55).abs() < 1e-9);
        assert!((january.value(Variable::Lai).unwrap() - 1.2).abs() < 1e-9);
        // no temperature composites were stored
        assert_eq!(january.value(Variable::Lst), None);
        assert_eq!(output.diagnostics.empty_smoothing_windows.len(), 1);
        assert_eq!(output.monthly[1].value(Variable::Lai), None);
    }

    #[test]
    fn test_every_flag_is_counted_once() {
        let grid = PixelGrid::centred_on(36.6833, 3.2167, 0.009, 5);
        let flags: Vec<Option<i32>> = (0..grid.len())
            .map(|i| match i % 5 {
                0 => Some(-1),
                1 => Some(1),
                _ => Some(0),
            })
            .collect();

        let mut source = source();
        source.insert(
            CompositeImage::new(
                &crate::models::ProductSet::default().temperature.id,
                date(2001, 1, 5),
                grid,
            )
            .with_uniform_band("LST_Day_1km", 14000)
            .with_quality(flags),
        );
        let pipeline =
            StationPipeline::new(config(), Arc::new(source), Arc::new(GridReducer::new()))
                .unwrap();

        let output = pipeline.run(&station()).unwrap();
        let flags = output.diagnostics.flags;
        // three vegetation, one leaf-area and one smoothed temperature composite
        assert_eq!(flags.total(), 5 * grid.len());
        assert_eq!(flags.malformed, 5);
        assert_eq!(flags.rejected, 5);
        assert_eq!(flags.accepted, 4 * grid.len() + 15);
        assert!(output.eight_day.records[0].value(Variable::Lst).is_some());
    }

    #[test]
    fn test_constant_station_pixels_flag_degenerate_baseline() {
        let grid = PixelGrid::centred_on(36.6833, 3.2167, 0.009, 3);
        let products = crate::models::ProductSet::default();
        let images: Vec<CompositeImage> = [(1, 2000), (17, 6000), (33, 4000)]
            .iter()
            .map(|&(doy, ring): &(i64, i32)| {
                let mut raw = vec![Some(ring); grid.len()];
                raw[4] = Some(100);
                let day = date(2001, 1, 1) + chrono::Duration::days(doy - 1);
                CompositeImage::new(&products.vegetation.id, day, grid)
                    .with_band("NDVI", raw)
                    .with_uniform_band("EVI", 1000)
                    .with_uniform_quality(0)
            })
            .collect();
        let pipeline = StationPipeline::new(
            config(),
            Arc::new(InMemoryRecordSource::new().with_images(images)),
            Arc::new(GridReducer::new()),
        )
        .unwrap();

        let mut snowfield = station();
        snowfield.buffer_radius_m = 300.0;
        let output = pipeline.run(&snowfield).unwrap();

        for record in output.sixteen_day.iter() {
            assert_eq!(record.value(Variable::Vci), Some(0.0));
        }
        assert!(output.diagnostics.degenerate_baseline);
        assert!(output.diagnostics.has_degradations());

        let output = pipeline.run(&station()).unwrap();
        assert!(!output.diagnostics.degenerate_baseline);
    }

    #[test]
    fn test_invalid_config_never_starts() {
        let mut config = config();
        config.stations[0].buffer_radius_m = 0.0;
        let result = StationPipeline::new(
            config,
            Arc::new(InMemoryRecordSource::new()),
            Arc::new(GridReducer::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stations_run_independently() {
        let pipeline = StationPipeline::new(
            config(),
            Arc::new(source()),
            Arc::new(GridReducer::new()),
        )
        .unwrap();
        let processor = ParallelProcessor::new(pipeline);

        let mut broken = station();
        broken.buffer_radius_m = -5.0;
        let results = processor
            .process_stations(vec![station(), broken], None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
