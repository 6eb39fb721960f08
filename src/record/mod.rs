//! Record model: data records, annotation records and the annotation field registry.

mod annotation;
mod data;
/// Record validation errors.
pub mod error;
mod field;

pub use annotation::{AnnotationRecord, AnnotationRecordBuilder};
pub use data::{DataRecord, DataRecordBuilder, Payload, DEFAULT_VALUE_DOMAIN, OCTET_STREAM};
pub use error::RecordError;
pub use field::{FieldDef, FieldRegistry, FieldType, FieldValue};
use sha2::{Digest, Sha256};

/// SHA-256 digest of a payload.
pub type ContentHash = [u8; 32];

pub(crate) fn sha256(bytes: &[u8]) -> ContentHash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    out
}
