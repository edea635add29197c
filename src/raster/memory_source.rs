use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::BackendError;
use crate::models::CompositeImage;
use crate::raster::{BackendResult, RecordSource};

/// Product records held in memory, keyed by product id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: HashMap<String, Vec<CompositeImage>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image: CompositeImage) {
        let record = self.records.entry(image.product_id.clone()).or_default();
        record.push(image);
        record.sort_by_key(|i| i.date);
    }

    pub fn with_images(mut self, images: impl IntoIterator<Item = CompositeImage>) -> Self {
        for image in images {
            self.insert(image);
        }
        self
    }

    pub fn record_len(&self, product_id: &str) -> usize {
        self.records.get(product_id).map(Vec::len).unwrap_or(0)
    }
}

impl RecordSource for InMemoryRecordSource {
    fn query_record(
        &self,
        product_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BackendResult<Vec<CompositeImage>> {
        if end < start {
            return Err(BackendError::InvalidRequest(format!(
                "empty date range {} to {}",
                start, end
            )));
        }

        Ok(self
            .records
            .get(product_id)
            .map(|record| {
                record
                    .iter()
                    .filter(|image| image.date >= start && image.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PixelGrid;

    fn image(product: &str, y: i32, m: u32, d: u32) -> CompositeImage {
        let grid = PixelGrid::new(1.0, 0.0, 0.5, 1, 1);
        CompositeImage::new(product, NaiveDate::from_ymd_opt(y, m, d).unwrap(), grid)
    }

    #[test]
    fn test_query_is_inclusive_and_ordered() {
        let source = InMemoryRecordSource::new().with_images(vec![
            image("LST", 2001, 6, 20),
            image("LST", 2001, 6, 5),
            image("LST", 2001, 6, 2),
            image("LAI", 2001, 6, 10),
        ]);

        let start = NaiveDate::from_ymd_opt(2001, 6, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2001, 6, 18).unwrap();
        let images = source.query_record("LST", start, end).unwrap();

        let dates: Vec<_> = images.iter().map(|i| i.date.to_string()).collect();
        assert_eq!(dates, vec!["2001-06-02", "2001-06-05"]);
        assert_eq!(source.record_len("LST"), 3);
        assert!(source.query_record("NDVI", start, end).unwrap().is_empty());
    }

    #[test]
    fn test_reversed_range_rejected() {
        let source = InMemoryRecordSource::new();
        let start = NaiveDate::from_ymd_opt(2001, 6, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2001, 6, 1).unwrap();
        assert!(source.query_record("LST", start, end).is_err());
    }
}
