//! Arrow schemas of deposit files.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use once_cell::sync::Lazy;

use crate::{
    deposit::DepositError,
    record::{FieldRegistry, FieldType},
};

pub(crate) const UDT_COL: &str = "udt";
pub(crate) const UDT_BIN_COL: &str = "udt_bin";
pub(crate) const DATA_COL: &str = "data";
pub(crate) const DATA_URI_COL: &str = "data_uri";
pub(crate) const SHA256_COL: &str = "sha256";
pub(crate) const MIME_TYPE_COL: &str = "mime_type";
pub(crate) const NUMERICAL_FORMAT_COL: &str = "numerical_format";
pub(crate) const DOMAIN_TYPES_COL: &str = "domain_types";
pub(crate) const VALUE_DOMAIN_COL: &str = "value_domain";
pub(crate) const BIT_DEPTH_COL: &str = "bit_depth";
pub(crate) const LAST_MODIFIED_COL: &str = "last_modified";
pub(crate) const EXTENTS_COL: &str = "extents";
pub(crate) const UUID_COL: &str = "uuid";
pub(crate) const ORIGIN_EXTENTS_COL: &str = "origin_extents";
pub(crate) const ANNOTATOR_COL: &str = "annotator";
pub(crate) const ANNOTATION_SOFTWARE_COL: &str = "annotation_software";
pub(crate) const DISCARD_IN_FAVOUR_COL: &str = "discard_in_favour";

/// Column prefix of registered annotation fields.
pub const FIELD_PREFIX: &str = "field_";
/// Column prefix of discard flags.
pub const DISCARD_FIELD_PREFIX: &str = "discard_field_";

pub(crate) const TIMEZONE: &str = "UTC";

pub(crate) fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Second, Some(TIMEZONE.into()))
}

fn extents_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::UInt64, true))),
        false,
    )
}

fn identity_fields() -> Vec<Field> {
    vec![
        Field::new(UDT_COL, DataType::Utf8, false),
        Field::new(UDT_BIN_COL, DataType::Binary, false),
    ]
}

pub(crate) static DATA_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    let mut fields = identity_fields();
    fields.extend([
        Field::new(DATA_COL, DataType::Binary, true),
        Field::new(DATA_URI_COL, DataType::Utf8, true),
        Field::new(SHA256_COL, DataType::Binary, false),
        Field::new(MIME_TYPE_COL, DataType::Utf8, false),
        Field::new(NUMERICAL_FORMAT_COL, DataType::Utf8, false),
        Field::new(DOMAIN_TYPES_COL, DataType::Utf8, false),
        Field::new(VALUE_DOMAIN_COL, DataType::Utf8, false),
        Field::new(BIT_DEPTH_COL, DataType::UInt64, false),
        Field::new(LAST_MODIFIED_COL, timestamp_type(), false),
        extents_field(EXTENTS_COL),
    ]);
    Arc::new(Schema::new(fields))
});

/// Schema of an annotation file: fixed columns, then one column per registered field and one
/// boolean column per discard flag.
pub(crate) fn annotation_schema(registry: &FieldRegistry) -> SchemaRef {
    let mut fields = identity_fields();
    fields.extend([
        Field::new(UUID_COL, DataType::Binary, false),
        Field::new(SHA256_COL, DataType::Binary, false),
        Field::new(LAST_MODIFIED_COL, timestamp_type(), false),
        extents_field(EXTENTS_COL),
        extents_field(ORIGIN_EXTENTS_COL),
        Field::new(ANNOTATOR_COL, DataType::Utf8, true),
        Field::new(ANNOTATION_SOFTWARE_COL, DataType::Utf8, true),
        Field::new(DISCARD_IN_FAVOUR_COL, DataType::Binary, true),
    ]);
    fields.extend(registry.fields().iter().map(|def| {
        Field::new(
            field_column(def.name()),
            def.field_type().data_type(),
            true,
        )
    }));
    fields.extend(
        registry
            .discard_fields()
            .iter()
            .map(|name| Field::new(discard_column(name), DataType::Boolean, true)),
    );
    Arc::new(Schema::new(fields))
}

pub(crate) fn field_column(name: &str) -> String {
    format!("{FIELD_PREFIX}{name}")
}

pub(crate) fn discard_column(name: &str) -> String {
    format!("{DISCARD_FIELD_PREFIX}{name}")
}

/// Rebuild the field registry an annotation file was written with.
pub(crate) fn registry_from_schema(schema: &Schema) -> Result<FieldRegistry, DepositError> {
    let mut registry = FieldRegistry::new();
    for field in schema.fields() {
        if let Some(name) = field.name().strip_prefix(FIELD_PREFIX) {
            let field_type = FieldType::from_data_type(field.data_type()).ok_or_else(|| {
                DepositError::UnexpectedColumn {
                    column: field.name().clone(),
                    reason: format!("unsupported field type {}", field.data_type()),
                }
            })?;
            registry = registry.with_field(name, field_type)?;
        } else if let Some(name) = field.name().strip_prefix(DISCARD_FIELD_PREFIX) {
            registry = registry.with_discard_field(name)?;
        }
    }
    Ok(registry)
}
