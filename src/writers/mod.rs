pub mod csv_writer;
pub mod parquet_writer;

pub use csv_writer::{CsvWriter, MissingEncoding};
pub use parquet_writer::{ParquetFileInfo, ParquetWriter};
