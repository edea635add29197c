use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::cli::args::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result};
use crate::models::{CadenceGroup, ObservationSeries};
use crate::processors::{MonthlyAggregator, RunDiagnostics};
use crate::readers::{SeriesReader, StationReader};
use crate::utils::filename::monthly_filename;
use crate::utils::progress::ProgressReporter;
use crate::writers::{CsvWriter, MissingEncoding, ParquetWriter};

pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(&cli);

    match cli.command {
        Commands::Aggregate {
            series_16,
            series_8,
            output_dir,
            station,
            format,
            compression,
            missing,
            decimals,
            diagnostics,
        } => {
            let progress = ProgressReporter::new_spinner("Reading series...", cli.quiet);
            let reader = SeriesReader::new();

            let mut series = Vec::new();
            for (path, group) in [
                (series_16, CadenceGroup::SixteenDay),
                (series_8, CadenceGroup::EightDay),
            ] {
                if let Some(path) = path {
                    series.push(reader.read_series(&path, group)?);
                }
            }
            if series.is_empty() {
                return Err(ProcessingError::Config(
                    "Provide --series-16 and/or --series-8".to_string(),
                ));
            }

            let station = station
                .or_else(|| series.iter().find(|s| !s.station.is_empty()).map(|s| s.station.clone()))
                .ok_or_else(|| ProcessingError::MissingData("station name".to_string()))?;

            progress.set_message("Aggregating monthly means...");
            let refs: Vec<&ObservationSeries> = series.iter().collect();
            let aggregation = MonthlyAggregator::new().aggregate(&refs)?;

            let mut report = RunDiagnostics::new(&station);
            for s in &series {
                report.record_series(s);
            }
            let dates: Vec<NaiveDate> = series
                .iter()
                .flat_map(|s| s.iter().map(|r| r.date))
                .collect();
            if let (Some(start), Some(end)) = (dates.iter().min(), dates.iter().max()) {
                report.record_monthly(&aggregation, *start, *end);
            }

            std::fs::create_dir_all(&output_dir)?;
            let output_file = monthly_filename(&output_dir, &station, format.extension());
            progress.set_message(&format!("Writing {}...", output_file.display()));

            match format {
                OutputFormat::Csv => {
                    let encoding: MissingEncoding = missing.parse()?;
                    CsvWriter::new()
                        .with_missing(encoding)
                        .with_decimals(Some(decimals))
                        .write_monthly(&aggregation.records, &output_file)?;
                }
                OutputFormat::Parquet => {
                    if missing != "sentinel" {
                        debug!("Parquet output always encodes missing values as nulls");
                    }
                    let writer = ParquetWriter::new()
                        .with_compression(&compression)?
                        .with_decimals(Some(decimals));
                    writer.write_monthly(&aggregation.records, &output_file)?;
                    if !aggregation.records.is_empty() {
                        let file_info = writer.get_file_info(&output_file)?;
                        progress.println(&file_info.summary());
                    }
                }
            }

            progress.finish_with_message(&format!(
                "Wrote {} monthly records to {}",
                aggregation.records.len(),
                output_file.display()
            ));

            if !cli.quiet {
                println!("\n{}", report.summary());
            }
            if let Some(path) = diagnostics {
                report.write_json(&path)?;
                info!("Diagnostics written to {}", path.display());
            }
        }

        Commands::CheckConfig { config, stations } => {
            let pipeline = PipelineConfig::from_file(&config)?;
            print_config(&config, &pipeline);

            if let Some(path) = stations {
                check_station_table(&path)?;
            }
        }
    }

    Ok(())
}

/// Installs the stderr subscriber; `RUST_LOG` overrides the CLI level.
fn setup_logging(cli: &Cli) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = cli.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("modis_processor={}", log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.quiet {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_ok() {
        debug!("Logging initialized at level: {}", log_level);
    }
}

fn print_config(path: &Path, config: &PipelineConfig) {
    let run = &config.run;
    println!("Configuration {} is valid", path.display());
    println!(
        "Date range: {} to {} (smoothing window ±{} days, {:?} baseline)",
        run.start_date, run.end_date, run.smoothing_window_days, run.baseline_strategy
    );
    println!(
        "Retries: {} ({:?} backoff from {}ms), workers: {}, deadline: {}s",
        config.retry.max_retries,
        config.retry.strategy,
        config.retry.base_delay_ms,
        run.max_workers,
        run.deadline_seconds
    );

    println!("\nProducts:");
    for product in [
        &config.products.vegetation,
        &config.products.leaf_area,
        &config.products.temperature,
    ] {
        let bands: Vec<&str> = product.bands.iter().map(|b| b.name.as_str()).collect();
        println!(
            "  {} every {} days at {} m: {} (quality {})",
            product.id,
            product.cadence_days,
            product.resolution_m,
            bands.join(", "),
            product.quality_band
        );
    }

    println!("\nStations ({}):", config.stations.len());
    for station in &config.stations {
        println!(
            "  {} {} ({:.4}, {:.4}) buffer {} m",
            station.id, station.name, station.latitude, station.longitude, station.buffer_radius_m
        );
    }
    if config.stations.is_empty() {
        warn!("No stations configured");
    }
}

fn check_station_table(path: &Path) -> Result<()> {
    let stations = StationReader::new().read_stations(path)?;
    println!("\nStation table {}: {} valid stations", path.display(), stations.len());
    for station in &stations {
        println!("  {} {}", station.id, station.name);
    }
    Ok(())
}
