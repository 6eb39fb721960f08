//! Arrow batches back to records.

use std::sync::Arc;

use arrow::{
    array::{
        Array, ArrayRef, AsArray, BinaryArray, BooleanArray, ListArray, RecordBatch, StringArray,
        UInt64Array,
    },
    datatypes::{
        Float32Type, Float64Type, Int32Type, Int64Type, TimestampSecondType, UInt32Type,
        UInt64Type,
    },
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    deposit::DepositError,
    identifier::CompactKey,
    ondisk::schema::{
        discard_column, field_column, ANNOTATION_SOFTWARE_COL, ANNOTATOR_COL, BIT_DEPTH_COL,
        DATA_COL, DATA_URI_COL, DISCARD_IN_FAVOUR_COL, DOMAIN_TYPES_COL, EXTENTS_COL,
        LAST_MODIFIED_COL, MIME_TYPE_COL, NUMERICAL_FORMAT_COL, ORIGIN_EXTENTS_COL, SHA256_COL,
        UDT_BIN_COL, UDT_COL, UUID_COL, VALUE_DOMAIN_COL,
    },
    record::{
        AnnotationRecord, ContentHash, DataRecord, FieldRegistry, FieldType, FieldValue,
        OCTET_STREAM,
    },
};

fn unexpected(column: &str, reason: impl Into<String>) -> DepositError {
    DepositError::UnexpectedColumn {
        column: column.to_string(),
        reason: reason.into(),
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, DepositError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| unexpected(name, "missing"))
}

fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, DepositError> {
    column(batch, name)?
        .as_string_opt::<i32>()
        .ok_or_else(|| unexpected(name, "expected utf8"))
}

fn binaries<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a BinaryArray, DepositError> {
    column(batch, name)?
        .as_binary_opt::<i32>()
        .ok_or_else(|| unexpected(name, "expected binary"))
}

fn u64s<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array, DepositError> {
    column(batch, name)?
        .as_primitive_opt::<UInt64Type>()
        .ok_or_else(|| unexpected(name, "expected uint64"))
}

fn lists<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ListArray, DepositError> {
    column(batch, name)?
        .as_list_opt::<i32>()
        .ok_or_else(|| unexpected(name, "expected list"))
}

fn list_values(list: &ListArray, row: usize, name: &str) -> Result<Vec<u64>, DepositError> {
    if list.is_null(row) {
        return Ok(Vec::new());
    }
    let values = list.value(row);
    let values = values
        .as_primitive_opt::<UInt64Type>()
        .ok_or_else(|| unexpected(name, "expected list<uint64>"))?;
    Ok(values.values().to_vec())
}

fn stamps(batch: &RecordBatch) -> Result<Vec<DateTime<Utc>>, DepositError> {
    let array = column(batch, LAST_MODIFIED_COL)?
        .as_primitive_opt::<TimestampSecondType>()
        .ok_or_else(|| unexpected(LAST_MODIFIED_COL, "expected timestamp(s)"))?;
    array
        .values()
        .iter()
        .map(|&seconds| {
            DateTime::from_timestamp(seconds, 0)
                .ok_or_else(|| unexpected(LAST_MODIFIED_COL, format!("{seconds} out of range")))
        })
        .collect()
}

fn content_hash(array: &BinaryArray, row: usize) -> Result<ContentHash, DepositError> {
    array
        .value(row)
        .try_into()
        .map_err(|_| unexpected(SHA256_COL, "expected 32-byte digest"))
}

pub(crate) fn decode_data_batch(batch: &RecordBatch) -> Result<Vec<DataRecord>, DepositError> {
    let udt = strings(batch, UDT_COL)?;
    let udt_bin = binaries(batch, UDT_BIN_COL)?;
    let data = binaries(batch, DATA_COL)?;
    let data_uri = strings(batch, DATA_URI_COL)?;
    let sha256 = binaries(batch, SHA256_COL)?;
    let mime_type = strings(batch, MIME_TYPE_COL)?;
    let numerical_format = strings(batch, NUMERICAL_FORMAT_COL)?;
    let domain_types = strings(batch, DOMAIN_TYPES_COL)?;
    let value_domain = strings(batch, VALUE_DOMAIN_COL)?;
    let bit_depth = u64s(batch, BIT_DEPTH_COL)?;
    let last_modified = stamps(batch)?;
    let extents = lists(batch, EXTENTS_COL)?;

    (0..batch.num_rows())
        .map(|row| -> Result<DataRecord, DepositError> {
            let row_extents = list_values(extents, row, EXTENTS_COL)?;
            let format = numerical_format.value(row);
            let domains: Vec<String> = serde_json::from_str(domain_types.value(row))?;

            let mut builder = DataRecord::builder(udt.value(row))
                .compact_key(CompactKey::from_bytes(udt_bin.value(row))?)
                .content_hash(content_hash(sha256, row)?)
                .content_type(mime_type.value(row))
                .numeric_format(format)
                .domain_types(domains)
                .value_domain(value_domain.value(row))
                .bit_depth(bit_depth.value(row))
                .extents(row_extents.clone())
                .last_modified(last_modified[row]);
            if data.is_valid(row) {
                let bytes = data.value(row).to_vec();
                builder = if mime_type.value(row) == OCTET_STREAM {
                    builder.array(bytes, row_extents, format)
                } else {
                    builder.blob(bytes, mime_type.value(row))
                };
            }
            if data_uri.is_valid(row) {
                builder = builder.data_uri(data_uri.value(row));
            }
            Ok(builder.build()?)
        })
        .collect()
}

fn field_value(
    array: &ArrayRef,
    field_type: FieldType,
    row: usize,
) -> Result<Option<FieldValue>, DepositError> {
    if array.is_null(row) {
        return Ok(None);
    }
    let value = match field_type {
        FieldType::Boolean => array.as_boolean_opt().map(|a| FieldValue::Boolean(a.value(row))),
        FieldType::Int32 => array
            .as_primitive_opt::<Int32Type>()
            .map(|a| FieldValue::Int32(a.value(row))),
        FieldType::Int64 => array
            .as_primitive_opt::<Int64Type>()
            .map(|a| FieldValue::Int64(a.value(row))),
        FieldType::UInt32 => array
            .as_primitive_opt::<UInt32Type>()
            .map(|a| FieldValue::UInt32(a.value(row))),
        FieldType::UInt64 => array
            .as_primitive_opt::<UInt64Type>()
            .map(|a| FieldValue::UInt64(a.value(row))),
        FieldType::Float32 => array
            .as_primitive_opt::<Float32Type>()
            .map(|a| FieldValue::Float32(a.value(row))),
        FieldType::Float64 => array
            .as_primitive_opt::<Float64Type>()
            .map(|a| FieldValue::Float64(a.value(row))),
        FieldType::Utf8 => array
            .as_string_opt::<i32>()
            .map(|a| FieldValue::Utf8(a.value(row).to_string())),
    };
    value
        .map(Some)
        .ok_or_else(|| unexpected("field", format!("expected {field_type:?}")))
}

pub(crate) fn decode_annotation_batch(
    batch: &RecordBatch,
    registry: &Arc<FieldRegistry>,
) -> Result<Vec<AnnotationRecord>, DepositError> {
    let udt = strings(batch, UDT_COL)?;
    let udt_bin = binaries(batch, UDT_BIN_COL)?;
    let uuid = binaries(batch, UUID_COL)?;
    let sha256 = binaries(batch, SHA256_COL)?;
    let last_modified = stamps(batch)?;
    let extents = lists(batch, EXTENTS_COL)?;
    let origin_extents = lists(batch, ORIGIN_EXTENTS_COL)?;
    let annotator = strings(batch, ANNOTATOR_COL)?;
    let annotation_software = strings(batch, ANNOTATION_SOFTWARE_COL)?;
    let discard_in_favour = binaries(batch, DISCARD_IN_FAVOUR_COL)?;

    let fields = registry
        .fields()
        .iter()
        .map(|def| -> Result<_, DepositError> {
            Ok((def, column(batch, &field_column(def.name()))?))
        })
        .collect::<Result<Vec<_>, DepositError>>()?;
    let discards = registry
        .discard_fields()
        .iter()
        .map(|name| -> Result<_, DepositError> {
            let column_name = discard_column(name);
            let flags = column(batch, &column_name)?
                .as_boolean_opt()
                .ok_or_else(|| unexpected(&column_name, "expected boolean"))?;
            Ok((name, flags))
        })
        .collect::<Result<Vec<(&String, &BooleanArray)>, DepositError>>()?;

    (0..batch.num_rows())
        .map(|row| -> Result<AnnotationRecord, DepositError> {
            let flat = list_values(extents, row, EXTENTS_COL)?;
            if flat.len() % 2 != 0 {
                return Err(unexpected(EXTENTS_COL, "odd number of extent bounds"));
            }
            let uuid = Uuid::from_slice(uuid.value(row))
                .map_err(|err| unexpected(UUID_COL, err.to_string()))?;

            let mut builder = AnnotationRecord::builder(udt.value(row), Arc::clone(registry))
                .compact_key(CompactKey::from_bytes(udt_bin.value(row))?)
                .content_hash(content_hash(sha256, row)?)
                .uuid(uuid)
                .last_modified(last_modified[row])
                .extents(flat.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect())
                .origin_extents(list_values(origin_extents, row, ORIGIN_EXTENTS_COL)?);
            if annotator.is_valid(row) {
                builder = builder.annotator(annotator.value(row));
            }
            if annotation_software.is_valid(row) {
                builder = builder.annotation_software(annotation_software.value(row));
            }
            if discard_in_favour.is_valid(row) {
                builder =
                    builder.discard_in_favour(CompactKey::from_bytes(discard_in_favour.value(row))?);
            }
            for (def, array) in &fields {
                if let Some(value) = field_value(array, def.field_type(), row)? {
                    builder = builder.field(def.name(), value);
                }
            }
            for (name, flags) in &discards {
                if flags.is_valid(row) && flags.value(row) {
                    builder = builder.discard(name.as_str());
                }
            }
            Ok(builder.build()?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ondisk::{
        encode::{encode_annotation_batch, encode_data_batch},
        schema::annotation_schema,
    };
    use crate::record::Payload;

    const NAME: &str = "udt1__acme__scope__sn1__1700000000__3";

    #[test]
    fn data_batch_keeps_payload_kinds_apart() {
        let frame = DataRecord::builder(NAME)
            .array(vec![9; 12], vec![2, 3], "uint16")
            .domain_types(["spatial", "spatial"])
            .value_domain("intensity")
            .build()
            .unwrap();
        let png = DataRecord::builder("udt1__acme__scope__sn1__1700000000")
            .blob(vec![0x89, b'P', b'N', b'G'], "image/png")
            .numeric_format("uint8")
            .extents(vec![1, 1])
            .domain_types(["spatial", "spatial"])
            .build()
            .unwrap();
        let remote = DataRecord::builder("udt1__acme__scope__sn2__1700000000")
            .data_uri("s3://bucket/frame.tif")
            .content_type("image/tiff")
            .content_hash([4; 32])
            .numeric_format("float32")
            .extents(vec![16])
            .domain_types(["time"])
            .build()
            .unwrap();

        let batch = encode_data_batch(&[frame.clone(), png.clone(), remote.clone()]).unwrap();
        let decoded = decode_data_batch(&batch).unwrap();

        assert_eq!(decoded[0].payload(), frame.payload());
        assert_eq!(decoded[0].value_domain(), "intensity");
        assert_eq!(decoded[0].bit_depth(), 16);
        assert_eq!(decoded[1].payload(), Some(&Payload::Blob(vec![0x89, b'P', b'N', b'G'])));
        assert_eq!(decoded[1].content_type(), "image/png");
        assert!(decoded[2].payload().is_none());
        assert_eq!(decoded[2].data_uri(), Some("s3://bucket/frame.tif"));
        assert_eq!(decoded[2].content_hash().unwrap(), [4; 32]);
        assert_eq!(decoded[2].compact_key(), remote.compact_key());
    }

    #[test]
    fn annotation_batch_restores_fields_and_flags() {
        let registry = Arc::new(
            FieldRegistry::new()
                .with_field("taxon", FieldType::Utf8)
                .unwrap()
                .with_field("count", FieldType::UInt32)
                .unwrap()
                .with_discard_field("taxon")
                .unwrap(),
        );
        let superseded = AnnotationRecord::builder(NAME, Arc::clone(&registry))
            .content_hash([1; 32])
            .extents(vec![(0, 2), (4, 9)])
            .field("taxon", "diatom")
            .discard("taxon")
            .discard_in_favour(CompactKey::from_canonical_name(NAME).unwrap())
            .build()
            .unwrap();
        let current = AnnotationRecord::builder(NAME, Arc::clone(&registry))
            .content_hash([1; 32])
            .field("count", 3u32)
            .annotation_software("labeller 2.1")
            .build()
            .unwrap();

        let schema = annotation_schema(&registry);
        let records = [superseded, current];
        let batch = encode_annotation_batch(&records, &registry, &schema).unwrap();
        let decoded = decode_annotation_batch(&batch, &registry).unwrap();

        assert_eq!(decoded, records);
        assert_eq!(decoded[0].discarded_fields(), ["taxon"]);
        assert_eq!(decoded[1].field("taxon"), None);
    }

    #[test]
    fn foreign_registry_is_rejected() {
        let registry = Arc::new(FieldRegistry::new());
        let other = Arc::new(FieldRegistry::new().with_field("x", FieldType::Int32).unwrap());
        let record = AnnotationRecord::builder(NAME, other)
            .content_hash([1; 32])
            .build()
            .unwrap();
        let schema = annotation_schema(&registry);
        assert!(matches!(
            encode_annotation_batch(&[record], &registry, &schema),
            Err(DepositError::FieldRegistryMismatch)
        ));
    }

    #[test]
    fn missing_columns_are_reported() {
        let batch = RecordBatch::new_empty(annotation_schema(&FieldRegistry::new()));
        assert!(matches!(
            decode_data_batch(&batch),
            Err(DepositError::UnexpectedColumn { ref column, .. }) if column == DATA_COL
        ));
    }
}
