use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::utils::constants::{COMPRESSION_SNAPPY, DEFAULT_DECIMALS};

#[derive(Parser)]
#[command(name = "modis-processor")]
#[command(about = "MODIS biophysical time-series extraction and monthly aggregation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Only log warnings and errors")]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge a station's 16-day and 8-day series into a monthly table
    Aggregate {
        #[arg(long, help = "16-day series CSV (NDVI, EVI, VCI)")]
        series_16: Option<PathBuf>,

        #[arg(long, help = "8-day series CSV (LAI, FAPAR, LST)")]
        series_8: Option<PathBuf>,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[arg(
            short,
            long,
            help = "Station name for the output file [default: taken from the series]"
        )]
        station: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        #[arg(short, long, default_value = COMPRESSION_SNAPPY)]
        compression: String,

        #[arg(
            long,
            default_value = "sentinel",
            help = "Missing-value encoding for CSV output: sentinel (-9999) or empty"
        )]
        missing: String,

        #[arg(long, default_value_t = DEFAULT_DECIMALS, help = "Decimal places in the monthly table")]
        decimals: u32,

        #[arg(long, help = "Write run diagnostics as JSON to this path")]
        diagnostics: Option<PathBuf>,
    },

    /// Load and validate a pipeline configuration file
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, help = "Additional station table to validate")]
        stations: Option<PathBuf>,
    },
}
