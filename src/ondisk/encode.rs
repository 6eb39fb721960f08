//! Records to Arrow batches.

use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
        ListArray, RecordBatch, StringArray, TimestampSecondArray, UInt32Array, UInt64Array,
    },
    datatypes::{SchemaRef, UInt64Type},
};
use chrono::{DateTime, Utc};

use crate::{
    deposit::DepositError,
    ondisk::schema::{DATA_SCHEMA, TIMEZONE},
    record::{AnnotationRecord, DataRecord, FieldRegistry, FieldType, FieldValue, Payload},
};

fn timestamps<'a>(stamps: impl Iterator<Item = DateTime<Utc>> + 'a) -> ArrayRef {
    Arc::new(
        TimestampSecondArray::from_iter_values(stamps.map(|stamp| stamp.timestamp()))
            .with_timezone(TIMEZONE),
    )
}

fn u64_lists<'a, I>(rows: impl Iterator<Item = I> + 'a) -> ArrayRef
where
    I: IntoIterator<Item = u64>,
{
    Arc::new(ListArray::from_iter_primitive::<UInt64Type, _, _>(
        rows.map(|row| Some(row.into_iter().map(Some))),
    ))
}

pub(crate) fn encode_data_batch(records: &[DataRecord]) -> Result<RecordBatch, DepositError> {
    let hashes = records
        .iter()
        .map(DataRecord::content_hash)
        .collect::<Result<Vec<_>, _>>()?;
    let domain_types = records
        .iter()
        .map(|record| serde_json::to_string(record.domain_types()))
        .collect::<Result<Vec<_>, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(DataRecord::identifier),
        )),
        Arc::new(BinaryArray::from_iter_values(
            records.iter().map(|record| record.compact_key().to_bytes()),
        )),
        Arc::new(
            records
                .iter()
                .map(|record| record.payload().map(Payload::bytes))
                .collect::<BinaryArray>(),
        ),
        Arc::new(
            records
                .iter()
                .map(DataRecord::data_uri)
                .collect::<StringArray>(),
        ),
        Arc::new(BinaryArray::from_iter_values(hashes.iter())),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(DataRecord::content_type),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(DataRecord::numeric_format),
        )),
        Arc::new(StringArray::from_iter_values(domain_types.iter())),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(DataRecord::value_domain),
        )),
        Arc::new(UInt64Array::from_iter_values(
            records.iter().map(DataRecord::bit_depth),
        )),
        timestamps(records.iter().map(DataRecord::last_modified)),
        u64_lists(records.iter().map(|record| record.extents().to_vec())),
    ];

    Ok(RecordBatch::try_new(Arc::clone(&DATA_SCHEMA), columns)?)
}

macro_rules! field_column {
    ($records:expr, $idx:expr, $array:ty, $variant:ident) => {
        Arc::new(
            $records
                .iter()
                .map(|record| match &record.values()[$idx] {
                    Some(FieldValue::$variant(value)) => Some(value.clone()),
                    _ => None,
                })
                .collect::<$array>(),
        ) as ArrayRef
    };
}

pub(crate) fn encode_annotation_batch(
    records: &[AnnotationRecord],
    registry: &FieldRegistry,
    schema: &SchemaRef,
) -> Result<RecordBatch, DepositError> {
    if records
        .iter()
        .any(|record| record.registry().as_ref() != registry)
    {
        return Err(DepositError::FieldRegistryMismatch);
    }

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(AnnotationRecord::identifier),
        )),
        Arc::new(BinaryArray::from_iter_values(
            records.iter().map(|record| record.compact_key().to_bytes()),
        )),
        Arc::new(BinaryArray::from_iter_values(
            records.iter().map(|record| record.uuid().into_bytes()),
        )),
        Arc::new(BinaryArray::from_iter_values(
            records.iter().map(AnnotationRecord::content_hash),
        )),
        timestamps(records.iter().map(AnnotationRecord::last_modified)),
        u64_lists(records.iter().map(|record| {
            record
                .extents()
                .iter()
                .flat_map(|&(start, end)| [start, end])
                .collect::<Vec<_>>()
        })),
        u64_lists(records.iter().map(|record| record.origin_extents().to_vec())),
        Arc::new(
            records
                .iter()
                .map(AnnotationRecord::annotator)
                .collect::<StringArray>(),
        ),
        Arc::new(
            records
                .iter()
                .map(AnnotationRecord::annotation_software)
                .collect::<StringArray>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|record| record.discard_in_favour().map(|key| key.to_bytes()))
                .collect::<BinaryArray>(),
        ),
    ];

    for (idx, def) in registry.fields().iter().enumerate() {
        columns.push(match def.field_type() {
            FieldType::Boolean => field_column!(records, idx, BooleanArray, Boolean),
            FieldType::Int32 => field_column!(records, idx, Int32Array, Int32),
            FieldType::Int64 => field_column!(records, idx, Int64Array, Int64),
            FieldType::UInt32 => field_column!(records, idx, UInt32Array, UInt32),
            FieldType::UInt64 => field_column!(records, idx, UInt64Array, UInt64),
            FieldType::Float32 => field_column!(records, idx, Float32Array, Float32),
            FieldType::Float64 => field_column!(records, idx, Float64Array, Float64),
            FieldType::Utf8 => field_column!(records, idx, StringArray, Utf8),
        });
    }
    for idx in 0..registry.discard_fields().len() {
        columns.push(Arc::new(
            records
                .iter()
                .map(|record| Some(record.discard_flags()[idx]))
                .collect::<BooleanArray>(),
        ));
    }

    Ok(RecordBatch::try_new(Arc::clone(schema), columns)?)
}
