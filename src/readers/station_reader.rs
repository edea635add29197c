use crate::error::{ProcessingError, Result};
use crate::models::Station;
use crate::utils::coordinates::parse_coordinate;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const DEFAULT_BUFFER_RADIUS_M: f64 = 1000.0;

/// Reads station tables of the form
/// `ID, NAME, LAT, LON[, ELEVATION[, CLIMATE[, RADIUS_M]]]`.
///
/// Coordinates may be decimal degrees or `DD:MM:SS`.
pub struct StationReader {
    skip_headers: bool,
    buffer_radius_m: f64,
}

impl StationReader {
    pub fn new() -> Self {
        Self {
            skip_headers: true,
            buffer_radius_m: DEFAULT_BUFFER_RADIUS_M,
        }
    }

    pub fn with_skip_headers(skip_headers: bool) -> Self {
        Self {
            skip_headers,
            ..Self::new()
        }
    }

    /// Radius used for rows that do not give one
    pub fn with_buffer_radius(mut self, radius_m: f64) -> Self {
        self.buffer_radius_m = radius_m;
        self
    }

    pub fn read_stations(&self, path: &Path) -> Result<Vec<Station>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut stations = Vec::new();

        for line_result in reader.lines() {
            let line = line_result?;

            if line.trim().is_empty() {
                continue;
            }

            // Data rows start with a numeric station id
            if self.skip_headers
                && !line
                    .trim_start()
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit())
            {
                continue;
            }

            if let Some(station) = self.parse_station_line(&line)? {
                stations.push(station);
            }
        }

        Ok(stations)
    }

    fn parse_station_line(&self, line: &str) -> Result<Option<Station>> {
        let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();

        if parts.len() < 4 {
            return Ok(None);
        }

        let latitude = parse_coordinate(parts[2])?;
        let longitude = parse_coordinate(parts[3])?;

        let elevation = match parts.get(4) {
            Some(value) if !value.is_empty() && *value != "-999" => {
                Some(value.parse::<f64>().map_err(|_| {
                    ProcessingError::InvalidFormat(format!("Invalid elevation: '{}'", value))
                })?)
            }
            _ => None,
        };

        let climate = parts
            .get(5)
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string());

        let buffer_radius_m = match parts.get(6) {
            Some(value) if !value.is_empty() => value.parse::<f64>().map_err(|_| {
                ProcessingError::InvalidFormat(format!("Invalid buffer radius: '{}'", value))
            })?,
            _ => self.buffer_radius_m,
        };

        let mut station = Station::new(parts[0], parts[1], latitude, longitude, buffer_radius_m);
        station.elevation = elevation;
        station.climate = climate;
        station.check()?;

        Ok(Some(station))
    }

    pub fn read_stations_map(&self, path: &Path) -> Result<HashMap<String, Station>> {
        let stations = self.read_stations(path)?;
        let mut map = HashMap::with_capacity(stations.len());

        for station in stations {
            map.insert(station.id.clone(), station);
        }

        Ok(map)
    }
}

impl Default for StationReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_station_line() {
        let reader = StationReader::new();

        let line = "60390, ALGER_DAR_EL_BEIDA_AG, 36:41:00, 3:13:00, 25, Csa";
        let station = reader.parse_station_line(line).unwrap().unwrap();

        assert_eq!(station.id, "60390");
        assert_eq!(station.name, "ALGER_DAR_EL_BEIDA_AG");
        assert!((station.latitude - 36.683333).abs() < 0.00001);
        assert!((station.longitude - 3.216667).abs() < 0.00001);
        assert_eq!(station.elevation, Some(25.0));
        assert_eq!(station.climate.as_deref(), Some("Csa"));
        assert_eq!(station.buffer_radius_m, 1000.0);
    }

    #[test]
    fn test_decimal_coordinates_and_radius() {
        let reader = StationReader::new().with_buffer_radius(500.0);

        let station = reader
            .parse_station_line("60571, BECHAR, 31.5, -2.25, , , 2000")
            .unwrap()
            .unwrap();
        assert_eq!(station.elevation, None);
        assert_eq!(station.climate, None);
        assert_eq!(station.buffer_radius_m, 2000.0);

        let station = reader
            .parse_station_line("60571, BECHAR, 31.5, -2.25")
            .unwrap()
            .unwrap();
        assert_eq!(station.buffer_radius_m, 500.0);
    }

    #[test]
    fn test_invalid_station_is_rejected() {
        let reader = StationReader::new();
        assert!(reader.parse_station_line("1, X, 95.0, 3.0").is_err());
        assert!(reader.parse_station_line("1, X, 36.0, 3.0, 10, Csa, 0").is_err());
        assert!(reader.parse_station_line("1, X").unwrap().is_none());
    }

    #[test]
    fn test_read_stations_file() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "ID, NAME, LAT, LON, ELEVATION, CLIMATE")?;
        writeln!(temp_file, "------,------,------,------,------,------")?;
        writeln!(temp_file)?;
        writeln!(temp_file, "60390, ALGER_DAR_EL_BEIDA_AG, 36.6833, 3.2167, 25, Csa")?;
        writeln!(temp_file, "60560, SAIDA, 34:52:00, 0:09:00, 752, BSk")?;

        let reader = StationReader::new();
        let stations = reader.read_stations(temp_file.path())?;

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, "60390");
        assert_eq!(stations[1].name, "SAIDA");

        let map = reader.read_stations_map(temp_file.path())?;
        assert!(map.contains_key("60560"));

        Ok(())
    }
}
