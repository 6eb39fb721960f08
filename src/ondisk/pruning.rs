//! Row-group pruning by the `udt_bin` min/max statistics.
//!
//! Pruning is conservative: a row group without usable statistics is always kept.

use parquet::file::metadata::ParquetMetaData;

use crate::{identifier::ITEM_KEY_LEN, ondisk::schema::UDT_BIN_COL};

/// Inclusive byte range a scan is interested in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct KeyRange {
    lower: Vec<u8>,
    upper: Vec<u8>,
}

impl KeyRange {
    /// Exactly one key.
    pub(crate) fn point(key: Vec<u8>) -> Self {
        Self {
            lower: key.clone(),
            upper: key,
        }
    }

    /// The group key and every item key under `prefix`.
    pub(crate) fn group(group: Vec<u8>, prefix: &[u8]) -> Self {
        let mut upper = prefix.to_vec();
        upper.resize(ITEM_KEY_LEN, u8::MAX);
        Self {
            lower: group,
            upper,
        }
    }

    fn overlaps(&self, min: &[u8], max: &[u8]) -> bool {
        min <= self.upper.as_slice() && max >= self.lower.as_slice()
    }
}

/// Row groups of a file that may hold keys in `range`, in file order.
pub(crate) fn candidate_row_groups(metadata: &ParquetMetaData, range: &KeyRange) -> Vec<usize> {
    let leaf = metadata
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .position(|column| column.path().string() == UDT_BIN_COL);

    metadata
        .row_groups()
        .iter()
        .enumerate()
        .filter(|(_, row_group)| {
            let Some(stats) = leaf.and_then(|leaf| row_group.column(leaf).statistics()) else {
                return true;
            };
            match (stats.min_bytes_opt(), stats.max_bytes_opt()) {
                (Some(min), Some(max)) => range.overlaps(min, max),
                _ => true,
            }
        })
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parquet::arrow::{
        arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions},
        ArrowWriter,
    };

    use super::*;
    use crate::{
        identifier::to_compact_key,
        ondisk::{encode::encode_data_batch, schema::DATA_SCHEMA},
        record::DataRecord,
    };

    #[test]
    fn group_range_spans_group_and_items() {
        let group = to_compact_key("udt1__acme__scope__sn1__100").unwrap();
        let item = to_compact_key("udt1__acme__scope__sn1__100__7").unwrap();
        let range = KeyRange::group(group.to_bytes(), &group.extended_match_prefix());

        let group_bytes = group.to_bytes();
        let item_bytes = item.to_bytes();
        assert!(range.overlaps(&group_bytes, &group_bytes));
        assert!(range.overlaps(&item_bytes, &item_bytes));

        let mut last = group.extended_match_prefix().to_vec();
        last.resize(ITEM_KEY_LEN, u8::MAX);
        assert!(range.overlaps(&last, &[4]));
        assert!(!range.overlaps(&[4], &[4, 0]));
        assert!(!range.overlaps(&[1], &[1, 255]));
    }

    #[test]
    fn point_range_rejects_disjoint_stats() {
        let range = KeyRange::point(vec![3, 5, 5]);
        assert!(range.overlaps(&[3, 0], &[3, 9]));
        assert!(!range.overlaps(&[3, 6], &[3, 9]));
        assert!(!range.overlaps(&[2, 0], &[3, 5, 4]));
    }

    #[test]
    fn sorted_file_prunes_row_groups_outside_the_range() {
        let mut records: Vec<DataRecord> = (0..12)
            .map(|serial| {
                DataRecord::builder(format!("udt1__acme__scope__sn{serial}__100__1"))
                    .array(vec![serial as u8], vec![1], "uint8")
                    .domain_types(["time"])
                    .build()
                    .unwrap()
            })
            .collect();
        records.sort_by_key(|record| record.compact_key().to_bytes());

        let file = tempfile::tempfile().unwrap();
        let mut writer =
            ArrowWriter::try_new(file.try_clone().unwrap(), Arc::clone(&DATA_SCHEMA), None).unwrap();
        for chunk in records.chunks(4) {
            writer.write(&encode_data_batch(chunk).unwrap()).unwrap();
            writer.flush().unwrap();
        }
        writer.close().unwrap();

        let loaded = ArrowReaderMetadata::load(&file, ArrowReaderOptions::new()).unwrap();
        let metadata = loaded.metadata();
        assert_eq!(metadata.num_row_groups(), 3);

        for (idx, record) in records.iter().enumerate() {
            let range = KeyRange::point(record.compact_key().to_bytes());
            assert_eq!(candidate_row_groups(metadata, &range), [idx / 4]);
        }
        assert!(candidate_row_groups(metadata, &KeyRange::point(vec![0])).is_empty());

        let everything = KeyRange {
            lower: vec![0],
            upper: vec![u8::MAX; ITEM_KEY_LEN],
        };
        assert_eq!(candidate_row_groups(metadata, &everything), [0, 1, 2]);
    }
}
