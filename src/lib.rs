#![deny(missing_docs)]
//! Columnar deposit files for scientific sample records.
//!
//! Every sample is addressed by an identifier that hashes into a fixed-width compact key
//! (see [`identifier`]). Raw payloads become [`record::DataRecord`]s, their labels
//! [`record::AnnotationRecord`]s; [`deposit::DepositBuilder`] streams both into Parquet files
//! whose footers carry a catalog of the identifier groups inside, and
//! [`deposit::DepositIndex`] answers lookups by reading only the files and row groups that can
//! hold a match.

pub mod deposit;
pub mod identifier;
mod observability;
pub mod ondisk;
pub mod record;

pub use crate::{
    deposit::{
        BuildOutcome, BuildReport, DepositBuilder, DepositConfig, DepositError, DepositIndex,
        MatchMode, WriterOptions,
    },
    identifier::{CompactKey, Identifier, IdentifierError},
    record::{AnnotationRecord, DataRecord, FieldRegistry, FieldType, FieldValue, RecordError},
};
