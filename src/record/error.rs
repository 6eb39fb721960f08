use thiserror::Error;

use crate::{identifier::IdentifierError, record::FieldType};

/// Errors raised while constructing or reading back records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Neither an in-memory payload nor an external reference was supplied.
    #[error("data record needs an in-memory payload or an external reference")]
    MissingPayload,
    /// No extents given and the payload carries no shape.
    #[error("data extents missing and could not be inferred")]
    MissingExtents,
    /// No content type given and the payload is not an array.
    #[error("content type missing and could not be inferred")]
    MissingContentType,
    /// No numeric format given and the payload is not an array.
    #[error("numeric format missing and could not be inferred")]
    MissingNumericFormat,
    /// No per-axis domain-unit list given.
    #[error("per-axis domain types missing")]
    MissingDomainTypes,
    /// No bit depth given and none embedded in the numeric format.
    #[error("bit depth missing and could not be inferred from numeric format {0:?}")]
    MissingBitDepth(String),
    /// Domain-unit count disagrees with the array rank.
    #[error("{declared} domain types declared for a payload of rank {rank}")]
    DimensionMismatch {
        /// Number of domain-unit entries supplied.
        declared: usize,
        /// Rank of the array payload.
        rank: usize,
    },
    /// Explicit extents disagree with the array shape.
    #[error("extents {extents:?} differ from array shape {shape:?}")]
    ExtentsMismatch {
        /// Extents supplied to the builder.
        extents: Vec<u64>,
        /// Shape of the array payload.
        shape: Vec<u64>,
    },
    /// Array byte length disagrees with its shape and element format.
    #[error("array payload holds {actual} bytes, shape and format need {expected}")]
    PayloadLengthMismatch {
        /// Bytes implied by shape and element width.
        expected: u64,
        /// Bytes supplied.
        actual: usize,
    },
    /// The payload does not hash to the recorded content hash.
    #[error("payload hashes to {actual}, record carries {recorded}")]
    ContentHashMismatch {
        /// Hex of the hash carried by the record.
        recorded: String,
        /// Hex of the hash of the payload bytes.
        actual: String,
    },
    /// A typed view was requested of a payload that is not an element buffer.
    #[error("payload of type {0:?} is not an element buffer")]
    NotAnArray(String),
    /// A typed view was requested with the wrong element type.
    #[error("array elements are {format:?}, requested {requested}")]
    ElementTypeMismatch {
        /// Element format of the payload.
        format: String,
        /// Requested Arrow type.
        requested: String,
    },
    /// An annotation was built without the hash of the data it annotates.
    #[error("annotation records must carry the content hash of the data they annotate")]
    MissingContentHash,
    /// Payload bytes are only reachable through the external reference.
    #[error("payload is only available through its external reference")]
    PayloadUnavailable,
    /// The same field name was registered twice.
    #[error("field {0:?} registered twice")]
    DuplicateField(String),
    /// A value was supplied for a field the registry does not declare.
    #[error("field {0:?} is not registered")]
    UnknownField(String),
    /// A value's type differs from the registered field type.
    #[error("field {field:?} expects {expected:?}, got {actual:?}")]
    FieldTypeMismatch {
        /// Field name.
        field: String,
        /// Registered type.
        expected: FieldType,
        /// Supplied type.
        actual: FieldType,
    },
    /// Identifier could not be converted.
    #[error("identifier error: {0}")]
    Identifier(#[from] IdentifierError),
}
