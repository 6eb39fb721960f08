use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, AsArray, BinaryArray, BooleanArray, Datum, Float32Array, Float64Array,
        Int32Array, Int64Array, RecordBatch, Scalar, StringArray, UInt32Array, UInt64Array,
    },
    compute::kernels::{boolean::or_kleene, cmp::eq},
    error::ArrowError,
};
use parquet::{
    arrow::{
        arrow_reader::{ArrowPredicate, ArrowPredicateFn, RowFilter},
        ProjectionMask,
    },
    schema::types::SchemaDescriptor,
};

use crate::record::FieldValue;

/// Rows whose key column equals `key`.
pub(crate) fn exact_key_filter(
    schema_descriptor: &SchemaDescriptor,
    column: usize,
    key: Vec<u8>,
) -> RowFilter {
    let key = BinaryArray::new_scalar(key);
    let predicate: Box<dyn ArrowPredicate> = Box::new(ArrowPredicateFn::new(
        ProjectionMask::roots(schema_descriptor, [column]),
        move |record_batch: RecordBatch| eq(record_batch.column(0), &key as &dyn Datum),
    ));
    RowFilter::new(vec![predicate])
}

/// Rows whose key column is the group key itself, or any item key starting with `prefix`.
pub(crate) fn group_or_item_filter(
    schema_descriptor: &SchemaDescriptor,
    column: usize,
    group: Vec<u8>,
    prefix: Vec<u8>,
) -> RowFilter {
    let group = BinaryArray::new_scalar(group);
    let predicate: Box<dyn ArrowPredicate> = Box::new(ArrowPredicateFn::new(
        ProjectionMask::roots(schema_descriptor, [column]),
        move |record_batch: RecordBatch| {
            let keys = record_batch.column(0);
            let is_group = eq(keys, &group as &dyn Datum)?;
            let is_item = starts_with(keys, &prefix)?;
            or_kleene(&is_group, &is_item)
        },
    ));
    RowFilter::new(vec![predicate])
}

fn starts_with(keys: &ArrayRef, prefix: &[u8]) -> Result<BooleanArray, ArrowError> {
    let keys = keys.as_binary_opt::<i32>().ok_or_else(|| {
        ArrowError::InvalidArgumentError(format!(
            "prefix match on {} column",
            keys.data_type()
        ))
    })?;
    Ok(keys
        .iter()
        .map(|key| key.map(|key| key.starts_with(prefix)))
        .collect())
}

fn scalar(value: &FieldValue) -> Scalar<ArrayRef> {
    let array: ArrayRef = match value {
        FieldValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
        FieldValue::Int32(v) => Arc::new(Int32Array::from(vec![*v])),
        FieldValue::Int64(v) => Arc::new(Int64Array::from(vec![*v])),
        FieldValue::UInt32(v) => Arc::new(UInt32Array::from(vec![*v])),
        FieldValue::UInt64(v) => Arc::new(UInt64Array::from(vec![*v])),
        FieldValue::Float32(v) => Arc::new(Float32Array::from(vec![*v])),
        FieldValue::Float64(v) => Arc::new(Float64Array::from(vec![*v])),
        FieldValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str()])),
    };
    Scalar::new(array)
}

/// Rows whose field column equals `value`. Null cells never match.
pub(crate) fn field_eq_filter(
    schema_descriptor: &SchemaDescriptor,
    column: usize,
    value: &FieldValue,
) -> RowFilter {
    let value = scalar(value);
    let predicate: Box<dyn ArrowPredicate> = Box::new(ArrowPredicateFn::new(
        ProjectionMask::roots(schema_descriptor, [column]),
        move |record_batch: RecordBatch| eq(record_batch.column(0), &value as &dyn Datum),
    ));
    RowFilter::new(vec![predicate])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_keeps_nulls() {
        let keys: ArrayRef = Arc::new(BinaryArray::from_opt_vec(vec![
            Some(&[3, 1, 2, 9][..]),
            Some(&[3, 1][..]),
            None,
            Some(&[2, 1, 2][..]),
        ]));
        let matched = starts_with(&keys, &[3, 1, 2]).unwrap();
        assert_eq!(
            matched.iter().collect::<Vec<_>>(),
            [Some(true), Some(false), None, Some(false)]
        );
    }

    #[test]
    fn field_scalars_compare_against_columns() {
        let column: ArrayRef = Arc::new(StringArray::from(vec![Some("diatom"), None, Some("copepod")]));
        let matched = eq(&column, &scalar(&FieldValue::Utf8("diatom".into())) as &dyn Datum).unwrap();
        assert_eq!(
            matched.iter().collect::<Vec<_>>(),
            [Some(true), None, Some(false)]
        );

        let column: ArrayRef = Arc::new(Float64Array::from(vec![1.5, 2.5]));
        let matched = eq(&column, &scalar(&FieldValue::Float64(2.5)) as &dyn Datum).unwrap();
        assert_eq!(matched.iter().collect::<Vec<_>>(), [Some(false), Some(true)]);
    }
}
