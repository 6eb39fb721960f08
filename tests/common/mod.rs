//! Common fixtures for deposit integration tests.
#![allow(dead_code)]

use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{Int32Array, RecordBatch},
    datatypes::{DataType, Field, Schema},
};
use crabdeposit::{AnnotationRecord, DataRecord, FieldRegistry, FieldType};
use parquet::{arrow::ArrowWriter, file::metadata::KeyValue};

pub const EPOCH: u64 = 1_700_000_000;

/// Canonical item name of frame `instance` taken by camera `serial`.
pub fn item_name(serial: usize, epoch: u64, instance: usize) -> String {
    format!("udt1__acme__flowcam__SN{serial}__{epoch}__{instance}")
}

/// Canonical group name of camera `serial` at `epoch`.
pub fn group_name(serial: usize, epoch: u64) -> String {
    format!("udt1__acme__flowcam__SN{serial}__{epoch}")
}

/// 8x8 `uint8` frame filled with seeded noise.
pub fn frame(name: &str, seed: u64) -> DataRecord {
    let mut rng = fastrand::Rng::with_seed(seed);
    let bytes: Vec<u8> = std::iter::repeat_with(|| rng.u8(..)).take(64).collect();
    DataRecord::builder(name)
        .array(bytes, vec![8, 8], "uint8")
        .domain_types(["spatial 1e-6 m", "spatial 1e-6 m"])
        .build()
        .expect("frame record")
}

pub fn registry() -> Arc<FieldRegistry> {
    Arc::new(
        FieldRegistry::new()
            .with_field("taxon", FieldType::Utf8)
            .expect("taxon")
            .with_field("length", FieldType::Float64)
            .expect("length")
            .with_field("count", FieldType::UInt32)
            .expect("count")
            .with_discard_field("taxon")
            .expect("discard taxon"),
    )
}

/// Annotation of `data` with the given taxon.
pub fn label(data: &DataRecord, registry: &Arc<FieldRegistry>, taxon: &str) -> AnnotationRecord {
    AnnotationRecord::builder(data.identifier(), Arc::clone(registry))
        .content_hash(data.content_hash().expect("hash"))
        .extents(vec![(0, 4), (2, 8)])
        .origin_extents(vec![8, 8])
        .annotator("j.doe")
        .field("taxon", taxon)
        .field("length", 12.5f64)
        .build()
        .expect("annotation record")
}

/// A one-column Parquet file with arbitrary footer entries.
pub fn write_foreign_file(path: &Path, entries: Vec<KeyValue>) {
    let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, false)]));
    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![Arc::new(Int32Array::from(vec![1, 2, 3]))],
    )
    .expect("batch");
    let file = File::create(path).expect("create");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
    writer.write(&batch).expect("write");
    for entry in entries {
        writer.append_key_value_metadata(entry);
    }
    writer.close().expect("close");
}
