use crate::models::CadenceGroup;
use std::path::{Path, PathBuf};

/// Per-composite series filename: MODIS_TimeSeries_{16Day|8Day}_{station}.csv
pub fn series_filename(output_dir: &Path, station: &str, group: CadenceGroup) -> PathBuf {
    output_dir.join(format!(
        "MODIS_TimeSeries_{}_{}.csv",
        group.label(),
        sanitize(station)
    ))
}

/// Monthly table filename: MODIS_Monthly_{station}.{extension}
pub fn monthly_filename(output_dir: &Path, station: &str, extension: &str) -> PathBuf {
    output_dir.join(format!("MODIS_Monthly_{}.{}", sanitize(station), extension))
}

fn sanitize(station: &str) -> String {
    station
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
