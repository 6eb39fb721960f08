use std::{io, path::PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::{identifier::IdentifierError, record::FieldType, record::RecordError};

/// Errors raised while building, opening or querying a deposit.
#[derive(Debug, Error)]
pub enum DepositError {
    /// Footer `data_type` is missing or names no known kind.
    #[error("unrecognized deposit file {}: data_type {data_type:?}", path.display())]
    UnrecognizedDepositFile {
        /// File that failed to open.
        path: PathBuf,
        /// Stored `data_type`, if any.
        data_type: Option<String>,
    },
    /// Catalog length is not a whole number of group keys.
    #[error("malformed catalog of {len} bytes")]
    MalformedCatalog {
        /// Decoded catalog length in bytes.
        len: usize,
    },
    /// A footer entry could not be decoded.
    #[error("malformed footer metadata `{key}`: {reason}")]
    MalformedMetadata {
        /// Offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A strict lookup was given a compact key, which cannot be compared as text.
    #[error("strict matching needs a textual identifier, got a compact key")]
    AmbiguousIdentifierForm,
    /// An annotation was built against a different field registry than the deposit.
    #[error("annotation field registry differs from the deposit registry")]
    FieldRegistryMismatch,
    /// A field lookup value does not match the stored column type.
    #[error("field `{field}` is {expected:?}, lookup value is {actual:?}")]
    FieldTypeMismatch {
        /// Field name.
        field: String,
        /// Stored type.
        expected: FieldType,
        /// Type of the lookup value.
        actual: FieldType,
    },
    /// A stored column is missing or has an unexpected type.
    #[error("unexpected column `{column}`: {reason}")]
    UnexpectedColumn {
        /// Column name.
        column: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Identifier codec failure.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    /// Record validation failure.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// Parquet reader or writer failure.
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
    /// Arrow kernel or batch failure.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Domain-unit column could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
