pub mod calendar;
pub mod constants;
pub mod coordinates;
pub mod filename;
pub mod progress;

pub use calendar::{day_of_year, first_of_month, months_between};
pub use constants::*;
pub use coordinates::{dms_to_decimal, haversine_distance, parse_coordinate};
pub use filename::{monthly_filename, series_filename};
pub use progress::ProgressReporter;
