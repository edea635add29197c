/// Sentinel written for missing values at the serialization boundary
pub const MISSING_SENTINEL: f64 = -9999.0;
/// Tolerance used when recognising the sentinel in re-read tables
pub const SENTINEL_TOLERANCE: f64 = 1e-6;

/// Condition index constants
pub const VCI_EPSILON: f64 = 1e-6;
pub const VCI_MIN: f64 = 0.0;
pub const VCI_MAX: f64 = 100.0;

/// Smoothing defaults
pub const DEFAULT_SMOOTHING_WINDOW_DAYS: i64 = 8;

/// Geographic constants
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Native resolutions (metres)
pub const RESOLUTION_1KM: f64 = 1000.0;
pub const RESOLUTION_500M: f64 = 500.0;

/// Native cadences (days)
pub const CADENCE_8_DAY: u32 = 8;
pub const CADENCE_16_DAY: u32 = 16;

/// Reference product identifiers
pub const PRODUCT_VEGETATION: &str = "MODIS/061/MOD13A2";
pub const PRODUCT_LEAF_AREA: &str = "MODIS/061/MOD15A2H";
pub const PRODUCT_TEMPERATURE: &str = "MODIS/061/MOD11A2";

/// Processing defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
pub const DEFAULT_DECIMALS: u32 = 4;
pub const DEFAULT_DEADLINE_SECONDS: u64 = 6 * 60 * 60;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
