use crate::error::{ProcessingError, Result};
use crate::models::{MonthlyRecord, ObservationSeries, Variable};
use crate::utils::constants::{
    COMPRESSION_GZIP, COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_ROW_GROUP_SIZE,
};
use crate::writers::csv_writer::{monthly_columns, round_to};
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// 1970-01-01 counted from the common era, the Date32 origin
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn to_date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn from_date32(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

/// Series and monthly tables with nullable Float64 variable columns.
///
/// Missing values are Parquet nulls; there is no sentinel in this format.
pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
    decimals: Option<u32>,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            decimals: None,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY => Compression::SNAPPY,
            COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
            COMPRESSION_LZ4 => Compression::LZ4,
            COMPRESSION_ZSTD => Compression::ZSTD(parquet::basic::ZstdLevel::default()),
            COMPRESSION_NONE => Compression::UNCOMPRESSED,
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    pub fn with_decimals(mut self, decimals: Option<u32>) -> Self {
        self.decimals = decimals;
        self
    }

    fn value_array(&self, values: impl Iterator<Item = Option<f64>>) -> ArrayRef {
        let values: Vec<Option<f64>> = values
            .map(|v| {
                v.filter(|v| v.is_finite())
                    .map(|v| self.decimals.map_or(v, |d| round_to(v, d)))
            })
            .collect();
        Arc::new(Float64Array::from(values))
    }

    fn write_batch(&self, schema: Arc<Schema>, batch: RecordBatch, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Write a monthly table; nothing is written for an empty table
    pub fn write_monthly(&self, records: &[MonthlyRecord], path: &Path) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let variables = monthly_columns(records);
        let mut fields = vec![
            Field::new("station", DataType::Utf8, false),
            Field::new("year", DataType::Int32, false),
            Field::new("month", DataType::UInt32, false),
            Field::new("date", DataType::Date32, false),
        ];
        fields.extend(
            variables
                .iter()
                .map(|v| Field::new(v.column(), DataType::Float64, true)),
        );
        let schema = Arc::new(Schema::new(fields));

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(
                records.iter().map(|r| r.station.clone()).collect::<Vec<_>>(),
            )),
            Arc::new(Int32Array::from(records.iter().map(|r| r.year).collect::<Vec<_>>())),
            Arc::new(UInt32Array::from(records.iter().map(|r| r.month).collect::<Vec<_>>())),
            Arc::new(Date32Array::from(
                records.iter().map(|r| to_date32(r.date)).collect::<Vec<_>>(),
            )),
        ];
        for variable in &variables {
            columns.push(self.value_array(records.iter().map(|r| r.value(*variable))));
        }

        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        self.write_batch(schema, batch, path)?;
        debug!("Wrote {} monthly records to {}", records.len(), path.display());
        Ok(())
    }

    /// Write a per-composite series for one cadence group
    pub fn write_series(&self, series: &ObservationSeries, path: &Path) -> Result<()> {
        if series.is_empty() {
            return Ok(());
        }

        let variables = series.group.variables();
        let mut fields = vec![
            Field::new("station", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
            Field::new("year", DataType::Int32, false),
            Field::new("month", DataType::UInt32, false),
            Field::new("doy", DataType::UInt32, false),
        ];
        fields.extend(
            variables
                .iter()
                .map(|v| Field::new(v.column(), DataType::Float64, true)),
        );
        let schema = Arc::new(Schema::new(fields));

        let records = &series.records;
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(
                records.iter().map(|r| r.station.clone()).collect::<Vec<_>>(),
            )),
            Arc::new(Date32Array::from(
                records.iter().map(|r| to_date32(r.date)).collect::<Vec<_>>(),
            )),
            Arc::new(Int32Array::from(records.iter().map(|r| r.year).collect::<Vec<_>>())),
            Arc::new(UInt32Array::from(records.iter().map(|r| r.month).collect::<Vec<_>>())),
            Arc::new(UInt32Array::from(
                records.iter().map(|r| r.day_of_year).collect::<Vec<_>>(),
            )),
        ];
        for variable in variables {
            columns.push(self.value_array(records.iter().map(|r| r.value(*variable))));
        }

        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        self.write_batch(schema, batch, path)?;
        debug!("Wrote {} records to {}", records.len(), path.display());
        Ok(())
    }

    /// Read a monthly table back; each present mean counts as one observation
    pub fn read_monthly(&self, path: &Path) -> Result<Vec<MonthlyRecord>> {
        let file = File::open(path)?;
        let parquet_reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in parquet_reader {
            let batch = batch_result?;
            let schema = batch.schema();

            let stations = column::<StringArray>(&batch, "station")?;
            let years = column::<Int32Array>(&batch, "year")?;
            let months = column::<UInt32Array>(&batch, "month")?;
            let dates = column::<Date32Array>(&batch, "date")?;

            let variables: Vec<(Variable, &Float64Array)> = schema
                .fields()
                .iter()
                .filter_map(|f| Variable::from_column(f.name()))
                .map(|v| column::<Float64Array>(&batch, v.column()).map(|c| (v, c)))
                .collect::<Result<_>>()?;

            for i in 0..batch.num_rows() {
                let mut builder = MonthlyRecord::builder()
                    .station(stations.value(i))
                    .year_month(years.value(i), months.value(i));
                for (variable, values) in &variables {
                    builder = if values.is_null(i) {
                        builder.absent(*variable)
                    } else {
                        builder.mean(*variable, values.value(i), 1)
                    };
                }

                let record = builder.build()?;
                if from_date32(dates.value(i)) != Some(record.date) {
                    return Err(ProcessingError::InvalidFormat(format!(
                        "Row {} date does not match {}-{:02}",
                        i, record.year, record.month
                    )));
                }
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Get file statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let file_metadata = metadata.file_metadata();
        let row_groups = metadata.num_row_groups();
        let total_rows = file_metadata.num_rows();
        let file_size = std::fs::metadata(path)?.len();

        let mut row_group_sizes = Vec::new();
        for i in 0..row_groups {
            row_group_sizes.push(metadata.row_group(i).num_rows());
        }

        Ok(ParquetFileInfo {
            total_rows,
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size,
            compression: self.compression,
        })
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let index = batch.schema().index_of(name)?;
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Invalid {} column type", name)))
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} KB\n\
            - Compression: {:?}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1024.0,
            self.compression,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CadenceGroup, ObservationRecord};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    fn monthly() -> Vec<MonthlyRecord> {
        vec![
            MonthlyRecord::builder()
                .station("S")
                .year_month(2001, 1)
                .mean(Variable::Ndvi, 0.55, 1)
                .mean(Variable::Lai, 1.2, 1)
                .build()
                .unwrap(),
            MonthlyRecord::builder()
                .station("S")
                .year_month(2001, 2)
                .mean(Variable::Ndvi, 0.4, 1)
                .absent(Variable::Lai)
                .build()
                .unwrap(),
        ]
    }

    #[test]
    fn test_write_empty_records() {
        let writer = ParquetWriter::new();
        let temp_file = NamedTempFile::new().unwrap();

        assert!(writer.write_monthly(&[], temp_file.path()).is_ok());
    }

    #[test]
    fn test_monthly_round_trip_keeps_nulls() -> Result<()> {
        let writer = ParquetWriter::new();
        let temp_file = NamedTempFile::new()?;

        let records = monthly();
        writer.write_monthly(&records, temp_file.path())?;
        let reread = writer.read_monthly(temp_file.path())?;

        assert_eq!(reread, records);
        assert_eq!(reread[1].value(Variable::Lai), None);

        let info = writer.get_file_info(temp_file.path())?;
        assert_eq!(info.total_rows, 2);
        Ok(())
    }

    #[test]
    fn test_write_series() -> Result<()> {
        let mut series = ObservationSeries::new("S", CadenceGroup::EightDay);
        let mut values = BTreeMap::new();
        values.insert(Variable::Lst, None);
        values.insert(Variable::Lai, Some(1.5));
        series.records.push(ObservationRecord::new(
            "S",
            NaiveDate::from_ymd_opt(2001, 6, 10).unwrap(),
            values,
        ));

        let temp_file = NamedTempFile::new()?;
        ParquetWriter::new().write_series(&series, temp_file.path())?;
        assert!(std::fs::metadata(temp_file.path())?.len() > 0);
        Ok(())
    }

    #[test]
    fn test_different_compressions() -> Result<()> {
        for compression in [
            COMPRESSION_SNAPPY,
            COMPRESSION_GZIP,
            COMPRESSION_LZ4,
            COMPRESSION_ZSTD,
            COMPRESSION_NONE,
        ] {
            let writer = ParquetWriter::new().with_compression(compression)?;
            let temp_file = NamedTempFile::new()?;
            let result = writer.write_monthly(&monthly(), temp_file.path());
            assert!(result.is_ok(), "Failed with compression: {}", compression);
        }
        assert!(ParquetWriter::new().with_compression("brotli9").is_err());
        Ok(())
    }

    #[test]
    fn test_date32_origin() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(to_date32(epoch), 0);
        assert_eq!(from_date32(11_323), NaiveDate::from_ymd_opt(2001, 1, 1));
    }
}
