//! On-disk layout of deposit files.
//!
//! Parquet schemas, footer metadata, batch codecs, row filters and row-group pruning. Everything
//! here is synchronous and works on one file at a time; the [`crate::deposit`] module composes
//! it into builds and lookups.

/// Row filters evaluated during Parquet decoding.
pub(crate) mod arrows;
pub(crate) mod decode;
pub(crate) mod encode;
/// Footer key/value metadata and the group-key catalog.
pub mod metadata;
pub(crate) mod pruning;
/// Arrow schemas and column names.
pub mod schema;

pub use metadata::{Catalog, DepositKind, FooterMetadata};
