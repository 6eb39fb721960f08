use arrow::{
    array::PrimitiveArray,
    buffer::{Buffer, ScalarBuffer},
    datatypes::{ArrowPrimitiveType, DataType},
};
use chrono::{DateTime, Timelike, Utc};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::{
    identifier::{to_compact_key, CompactKey},
    record::{sha256, ContentHash, RecordError},
};

/// Content type of raw C-order element buffers.
pub const OCTET_STREAM: &str = "application/octet-stream";
/// Value domain assumed when a producer names none.
pub const DEFAULT_VALUE_DOMAIN: &str = "magnitude";

static FORMAT_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digits regex"));

/// In-memory payload of a data record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Row-major element buffer, e.g. a camera frame.
    Array {
        /// Raw element bytes.
        bytes: Vec<u8>,
        /// Length of each axis.
        shape: Vec<u64>,
        /// Element format name, e.g. `uint8` or `float32`.
        format: String,
    },
    /// Already-encoded buffer such as a PNG; its content type must be supplied.
    Blob(Vec<u8>),
}

impl Payload {
    /// Raw bytes as persisted.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Payload::Array { bytes, .. } | Payload::Blob(bytes) => bytes,
        }
    }
}

/// A raw sensor payload anchored to an identifier.
#[derive(Clone, Debug)]
pub struct DataRecord {
    identifier: String,
    compact_key: CompactKey,
    payload: Option<Payload>,
    data_uri: Option<String>,
    content_type: String,
    numeric_format: String,
    domain_types: Vec<String>,
    value_domain: String,
    bit_depth: u64,
    extents: Vec<u64>,
    last_modified: DateTime<Utc>,
    content_hash: OnceCell<ContentHash>,
}

impl DataRecord {
    /// Start building a record for a canonical name or compact hex identifier.
    pub fn builder(identifier: impl Into<String>) -> DataRecordBuilder {
        DataRecordBuilder::new(identifier.into())
    }

    /// Identifier string as supplied by the producer.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Binary key derived from the identifier.
    pub fn compact_key(&self) -> &CompactKey {
        &self.compact_key
    }

    /// In-memory payload, absent for reference-only records.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// External reference to the payload.
    pub fn data_uri(&self) -> Option<&str> {
        self.data_uri.as_deref()
    }

    /// MIME type of the payload bytes.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Element format name.
    pub fn numeric_format(&self) -> &str {
        &self.numeric_format
    }

    /// Domain-unit tag per axis, e.g. `spatial 3.57e-07 m`.
    pub fn domain_types(&self) -> &[String] {
        &self.domain_types
    }

    /// What the values measure.
    pub fn value_domain(&self) -> &str {
        &self.value_domain
    }

    /// Significant bits per element.
    pub fn bit_depth(&self) -> u64 {
        self.bit_depth
    }

    /// Length of each axis.
    pub fn extents(&self) -> &[u64] {
        &self.extents
    }

    /// Last modification time, to the second.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Payload bytes. Remote retrieval through the external reference is not supported.
    pub fn as_bytes(&self) -> Result<&[u8], RecordError> {
        self.payload
            .as_ref()
            .map(Payload::bytes)
            .ok_or(RecordError::PayloadUnavailable)
    }

    /// SHA-256 of the payload, computed on first use unless supplied.
    pub fn content_hash(&self) -> Result<ContentHash, RecordError> {
        self.content_hash
            .get_or_try_init(|| self.as_bytes().map(sha256))
            .copied()
    }

    /// Re-hash the payload and compare it with the carried content hash.
    pub fn verify_content_hash(&self) -> Result<(), RecordError> {
        let actual = sha256(self.as_bytes()?);
        let recorded = self.content_hash()?;
        if actual != recorded {
            return Err(RecordError::ContentHashMismatch {
                recorded: hex::encode(recorded),
                actual: hex::encode(actual),
            });
        }
        Ok(())
    }

    /// Elements of an array payload in row-major order; [`Self::extents`] gives the shape.
    pub fn as_array<T: ArrowPrimitiveType>(&self) -> Result<PrimitiveArray<T>, RecordError> {
        let (bytes, format) = match &self.payload {
            Some(Payload::Array { bytes, format, .. }) => (bytes, format),
            Some(Payload::Blob(_)) => return Err(RecordError::NotAnArray(self.content_type.clone())),
            None => return Err(RecordError::PayloadUnavailable),
        };
        if element_type(format).as_ref() != Some(&T::DATA_TYPE) {
            return Err(RecordError::ElementTypeMismatch {
                format: format.clone(),
                requested: T::DATA_TYPE.to_string(),
            });
        }
        let len = bytes.len() / std::mem::size_of::<T::Native>();
        let values = ScalarBuffer::<T::Native>::new(Buffer::from_slice_ref(bytes.as_slice()), 0, len);
        Ok(PrimitiveArray::new(values, None))
    }
}

/// Validating constructor for [`DataRecord`].
#[derive(Clone, Debug)]
pub struct DataRecordBuilder {
    identifier: String,
    compact_key: Option<CompactKey>,
    payload: Option<Payload>,
    data_uri: Option<String>,
    content_type: Option<String>,
    numeric_format: Option<String>,
    domain_types: Option<Vec<String>>,
    value_domain: Option<String>,
    bit_depth: Option<u64>,
    extents: Option<Vec<u64>>,
    last_modified: Option<DateTime<Utc>>,
    content_hash: Option<ContentHash>,
}

impl DataRecordBuilder {
    fn new(identifier: String) -> Self {
        Self {
            identifier,
            compact_key: None,
            payload: None,
            data_uri: None,
            content_type: None,
            numeric_format: None,
            domain_types: None,
            value_domain: None,
            bit_depth: None,
            extents: None,
            last_modified: None,
            content_hash: None,
        }
    }

    /// Use a row-major element buffer as payload.
    pub fn array(self, bytes: Vec<u8>, shape: Vec<u64>, format: impl Into<String>) -> Self {
        self.payload(Payload::Array {
            bytes,
            shape,
            format: format.into(),
        })
    }

    /// Use an encoded buffer as payload.
    pub fn blob(self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.payload(Payload::Blob(bytes)).content_type(content_type)
    }

    /// Set the payload.
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the external reference.
    pub fn data_uri(mut self, uri: impl Into<String>) -> Self {
        self.data_uri = Some(uri.into());
        self
    }

    /// Set the content type. Ignored for array payloads.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the element format name. Ignored for array payloads.
    pub fn numeric_format(mut self, format: impl Into<String>) -> Self {
        self.numeric_format = Some(format.into());
        self
    }

    /// Set the per-axis domain-unit tags.
    pub fn domain_types<I, S>(mut self, domain_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_types = Some(domain_types.into_iter().map(Into::into).collect());
        self
    }

    /// Set the value domain.
    pub fn value_domain(mut self, value_domain: impl Into<String>) -> Self {
        self.value_domain = Some(value_domain.into());
        self
    }

    /// Set the bit depth explicitly.
    pub fn bit_depth(mut self, bit_depth: u64) -> Self {
        self.bit_depth = Some(bit_depth);
        self
    }

    /// Set the extents explicitly.
    pub fn extents(mut self, extents: Vec<u64>) -> Self {
        self.extents = Some(extents);
        self
    }

    /// Set the modification time.
    pub fn last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Use an already derived key instead of parsing the identifier.
    pub fn compact_key(mut self, key: CompactKey) -> Self {
        self.compact_key = Some(key);
        self
    }

    /// Use a known content hash instead of hashing the payload.
    pub fn content_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    /// Validate and assemble the record.
    ///
    /// An encoded buffer whose content type is [`OCTET_STREAM`] is an element buffer and is
    /// validated as one, shaped by the extents and typed by the numeric format.
    pub fn build(self) -> Result<DataRecord, RecordError> {
        if self.payload.is_none() && self.data_uri.is_none() {
            return Err(RecordError::MissingPayload);
        }

        let payload = match self.payload {
            Some(Payload::Blob(bytes)) if self.content_type.as_deref() == Some(OCTET_STREAM) => {
                Some(Payload::Array {
                    bytes,
                    shape: self.extents.clone().ok_or(RecordError::MissingExtents)?,
                    format: self
                        .numeric_format
                        .clone()
                        .ok_or(RecordError::MissingNumericFormat)?,
                })
            }
            payload => payload,
        };

        let (array_shape, array_format) = match &payload {
            Some(Payload::Array { shape, format, .. }) => (Some(shape), Some(format)),
            _ => (None, None),
        };

        let extents = self
            .extents
            .or_else(|| array_shape.cloned())
            .ok_or(RecordError::MissingExtents)?;
        let content_type = if array_shape.is_some() {
            OCTET_STREAM.to_string()
        } else {
            self.content_type.ok_or(RecordError::MissingContentType)?
        };
        let numeric_format = array_format
            .cloned()
            .or(self.numeric_format)
            .ok_or(RecordError::MissingNumericFormat)?;
        let domain_types = self.domain_types.ok_or(RecordError::MissingDomainTypes)?;
        if let Some(Payload::Array { bytes, shape, .. }) = &payload {
            if domain_types.len() != shape.len() {
                return Err(RecordError::DimensionMismatch {
                    declared: domain_types.len(),
                    rank: shape.len(),
                });
            }
            if &extents != shape {
                return Err(RecordError::ExtentsMismatch {
                    extents,
                    shape: shape.clone(),
                });
            }
            check_payload_length(bytes, shape, &numeric_format)?;
        }
        let bit_depth = match self.bit_depth {
            Some(bit_depth) => bit_depth,
            None => infer_bit_depth(&numeric_format)?,
        };
        let compact_key = match self.compact_key {
            Some(key) => key,
            None => to_compact_key(self.identifier.as_str())?,
        };
        let last_modified = self.last_modified.unwrap_or_else(Utc::now);

        let content_hash = OnceCell::new();
        if let Some(hash) = self.content_hash {
            let _ = content_hash.set(hash);
        }

        Ok(DataRecord {
            identifier: self.identifier,
            compact_key,
            payload,
            data_uri: self.data_uri,
            content_type,
            numeric_format,
            domain_types,
            value_domain: self
                .value_domain
                .unwrap_or_else(|| DEFAULT_VALUE_DOMAIN.to_string()),
            bit_depth,
            extents,
            last_modified: last_modified.with_nanosecond(0).unwrap_or(last_modified),
            content_hash,
        })
    }
}

/// Arrow type of a known element format name.
fn element_type(format: &str) -> Option<DataType> {
    let data_type = match format {
        "int8" => DataType::Int8,
        "int16" => DataType::Int16,
        "int32" => DataType::Int32,
        "int64" => DataType::Int64,
        "uint8" => DataType::UInt8,
        "uint16" => DataType::UInt16,
        "uint32" => DataType::UInt32,
        "uint64" => DataType::UInt64,
        "float16" => DataType::Float16,
        "float32" => DataType::Float32,
        "float64" => DataType::Float64,
        _ => return None,
    };
    Some(data_type)
}

/// Formats without a known fixed element width are not checked.
fn check_payload_length(bytes: &[u8], shape: &[u64], format: &str) -> Result<(), RecordError> {
    let Some(width) = element_type(format).and_then(|data_type| data_type.primitive_width()) else {
        return Ok(());
    };
    let expected = shape
        .iter()
        .fold(width as u64, |acc, &axis| acc.saturating_mul(axis));
    if expected != bytes.len() as u64 {
        return Err(RecordError::PayloadLengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn infer_bit_depth(numeric_format: &str) -> Result<u64, RecordError> {
    FORMAT_DIGITS
        .find(numeric_format)
        .and_then(|digits| digits.as_str().parse().ok())
        .ok_or_else(|| RecordError::MissingBitDepth(numeric_format.to_string()))
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::{Float32Type, UInt16Type, UInt8Type};
    use sha2::{Digest, Sha256};

    use super::*;

    const NAME: &str = "udt1__acme__scope__sn1__1700000000__3";

    fn frame() -> DataRecordBuilder {
        DataRecord::builder(NAME)
            .array(vec![1, 2, 3, 4, 5, 6], vec![2, 3], "uint8")
            .domain_types(["spatial 1e-6 m", "spatial 1e-6 m"])
    }

    #[test]
    fn array_payload_infers_layout() {
        let record = frame().build().unwrap();
        assert_eq!(record.extents(), &[2, 3]);
        assert_eq!(record.content_type(), OCTET_STREAM);
        assert_eq!(record.numeric_format(), "uint8");
        assert_eq!(record.bit_depth(), 8);
        assert_eq!(record.value_domain(), DEFAULT_VALUE_DOMAIN);
        assert_eq!(record.compact_key(), &to_compact_key(NAME).unwrap());
        assert_eq!(record.last_modified().nanosecond(), 0);
    }

    #[test]
    fn content_hash_is_sha256_of_payload() {
        let record = frame().build().unwrap();
        let expected: Vec<u8> = Sha256::digest([1u8, 2, 3, 4, 5, 6]).to_vec();
        assert_eq!(record.content_hash().unwrap().to_vec(), expected);
        assert_eq!(record.as_bytes().unwrap(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn supplied_hash_is_kept_and_verifiable() {
        let record = frame().content_hash([7; 32]).build().unwrap();
        assert_eq!(record.content_hash().unwrap(), [7; 32]);
        assert!(matches!(
            record.verify_content_hash(),
            Err(RecordError::ContentHashMismatch { recorded, .. }) if recorded == hex::encode([7u8; 32])
        ));

        frame().build().unwrap().verify_content_hash().unwrap();
        let digest: ContentHash = Sha256::digest([1u8, 2, 3, 4, 5, 6]).into();
        frame()
            .content_hash(digest)
            .build()
            .unwrap()
            .verify_content_hash()
            .unwrap();
    }

    #[test]
    fn array_extents_and_length_must_match_shape() {
        assert_eq!(
            frame().extents(vec![6]).build().unwrap_err(),
            RecordError::ExtentsMismatch {
                extents: vec![6],
                shape: vec![2, 3]
            }
        );
        assert_eq!(frame().extents(vec![2, 3]).build().unwrap().extents(), &[2, 3]);
        assert_eq!(
            DataRecord::builder(NAME)
                .array(vec![0; 6], vec![2, 3], "uint16")
                .domain_types(["spatial", "spatial"])
                .build()
                .unwrap_err(),
            RecordError::PayloadLengthMismatch {
                expected: 12,
                actual: 6
            }
        );
        // unknown element widths are not checked
        DataRecord::builder(NAME)
            .array(vec![0; 5], vec![2, 3], "rgb24")
            .domain_types(["spatial", "spatial"])
            .bit_depth(24)
            .build()
            .unwrap();
    }

    #[test]
    fn octet_stream_blob_is_an_element_buffer() {
        let blob = || {
            DataRecord::builder(NAME)
                .blob(vec![1, 2, 3, 4], OCTET_STREAM)
                .numeric_format("uint8")
                .extents(vec![2, 2])
        };
        assert_eq!(
            blob().domain_types(["packed"]).build().unwrap_err(),
            RecordError::DimensionMismatch {
                declared: 1,
                rank: 2
            }
        );

        let record = blob().domain_types(["spatial", "spatial"]).build().unwrap();
        assert_eq!(
            record.payload(),
            Some(&Payload::Array {
                bytes: vec![1, 2, 3, 4],
                shape: vec![2, 2],
                format: "uint8".into(),
            })
        );
        assert_eq!(
            DataRecord::builder(NAME)
                .blob(vec![1, 2, 3, 4], OCTET_STREAM)
                .extents(vec![2, 2])
                .domain_types(["spatial", "spatial"])
                .build()
                .unwrap_err(),
            RecordError::MissingNumericFormat
        );
    }

    #[test]
    fn typed_view_of_array_payload() {
        let values: Vec<u8> = [1u16, 2, 3, 513]
            .iter()
            .flat_map(|value| value.to_ne_bytes())
            .collect();
        let record = DataRecord::builder(NAME)
            .array(values, vec![2, 2], "uint16")
            .domain_types(["spatial", "spatial"])
            .build()
            .unwrap();

        let view = record.as_array::<UInt16Type>().unwrap();
        assert_eq!(view.values().to_vec(), [1, 2, 3, 513]);
        assert!(matches!(
            record.as_array::<Float32Type>(),
            Err(RecordError::ElementTypeMismatch { .. })
        ));

        let png = DataRecord::builder(NAME)
            .blob(vec![0x89], "image/png")
            .numeric_format("uint8")
            .extents(vec![1, 1])
            .domain_types(["spatial", "spatial"])
            .build()
            .unwrap();
        assert_eq!(
            png.as_array::<UInt8Type>().unwrap_err(),
            RecordError::NotAnArray("image/png".into())
        );
    }

    #[test]
    fn reference_only_records_need_a_hash() {
        let record = DataRecord::builder(NAME)
            .data_uri("s3://bucket/frame.png")
            .content_type("image/png")
            .numeric_format("uint16")
            .extents(vec![64, 64])
            .domain_types(["spatial", "spatial"])
            .build()
            .unwrap();
        assert_eq!(record.bit_depth(), 16);
        assert_eq!(record.as_bytes(), Err(RecordError::PayloadUnavailable));
        assert_eq!(record.content_hash(), Err(RecordError::PayloadUnavailable));
    }

    #[test]
    fn validation_failures() {
        assert_eq!(
            DataRecord::builder(NAME).build().unwrap_err(),
            RecordError::MissingPayload
        );
        assert_eq!(
            DataRecord::builder(NAME)
                .payload(Payload::Blob(vec![0]))
                .build()
                .unwrap_err(),
            RecordError::MissingExtents
        );
        assert_eq!(
            DataRecord::builder(NAME)
                .payload(Payload::Blob(vec![0]))
                .extents(vec![1])
                .build()
                .unwrap_err(),
            RecordError::MissingContentType
        );
        assert_eq!(
            DataRecord::builder(NAME)
                .blob(vec![0], "image/png")
                .extents(vec![1])
                .build()
                .unwrap_err(),
            RecordError::MissingNumericFormat
        );
        assert_eq!(
            DataRecord::builder(NAME)
                .array(vec![0], vec![1], "uint8")
                .build()
                .unwrap_err(),
            RecordError::MissingDomainTypes
        );
        assert_eq!(
            frame().domain_types(["spatial"]).build().unwrap_err(),
            RecordError::DimensionMismatch {
                declared: 1,
                rank: 2
            }
        );
        assert_eq!(
            DataRecord::builder(NAME)
                .array(vec![0], vec![1], "bool")
                .domain_types(["flag"])
                .build()
                .unwrap_err(),
            RecordError::MissingBitDepth("bool".into())
        );
        assert!(matches!(
            DataRecord::builder("not-an-identifier")
                .array(vec![0], vec![1], "uint8")
                .domain_types(["flag"])
                .build(),
            Err(RecordError::Identifier(_))
        ));
    }
}
