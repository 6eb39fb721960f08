//! Footer metadata of deposit files: file kind, group-key catalog and custom entries.
//!
//! Parquet key/value metadata is UTF-8 text, so binary values (the catalog and the
//! modification stamp) are stored as lowercase hex of their byte form.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use parquet::file::metadata::KeyValue;

use crate::{
    deposit::DepositError,
    identifier::{CompactKey, GROUP_KEY_LEN},
};

/// Key naming the kind of a deposit file.
pub const DATA_TYPE_KEY: &str = "data_type";
/// Catalog key of data files.
pub const CONTAINS_KEY: &str = "contains_udts";
/// Catalog key of annotation and region files.
pub const REFERENCES_KEY: &str = "references_udts";
/// Key of the 8-byte little-endian modification stamp.
pub const LAST_MODIFIED_KEY: &str = "last_modified";
/// Prefix of caller-supplied metadata keys.
pub const CUSTOM_PREFIX: &str = "x_";

/// Kind of records a deposit file holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepositKind {
    /// Data records.
    Data,
    /// Annotation records.
    Annotation,
    /// Legacy region-of-interest files. Catalogued, never scanned.
    Region,
}

impl DepositKind {
    /// Value stored under [`DATA_TYPE_KEY`].
    pub fn data_type(&self) -> &'static str {
        match self {
            DepositKind::Data => "CRAB_DATA_V1",
            DepositKind::Annotation => "CRAB_ANNOTATION_V1",
            DepositKind::Region => "CRAB_ROI_V1",
        }
    }

    /// Classify a [`DATA_TYPE_KEY`] value.
    pub fn from_data_type(value: &str) -> Option<Self> {
        [DepositKind::Data, DepositKind::Annotation, DepositKind::Region]
            .into_iter()
            .find(|kind| kind.data_type() == value)
    }

    /// Key the catalog is stored under for this kind.
    pub fn catalog_key(&self) -> &'static str {
        match self {
            DepositKind::Data => CONTAINS_KEY,
            DepositKind::Annotation | DepositKind::Region => REFERENCES_KEY,
        }
    }
}

/// Set of group keys present in, or referenced by, one deposit file.
///
/// The wire form is the concatenation of 21-byte group keys with no delimiter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    keys: Vec<CompactKey>,
}

impl Catalog {
    /// Catalog over the group keys of `keys`, in the given order.
    pub fn new(keys: impl IntoIterator<Item = CompactKey>) -> Self {
        Self {
            keys: keys.into_iter().map(|key| key.group_key()).collect(),
        }
    }

    /// Decode the wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, DepositError> {
        if bytes.len() % GROUP_KEY_LEN != 0 {
            return Err(DepositError::MalformedCatalog { len: bytes.len() });
        }
        let keys = bytes
            .chunks_exact(GROUP_KEY_LEN)
            .map(CompactKey::from_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.keys.len() * GROUP_KEY_LEN);
        for key in &self.keys {
            key.write_to(&mut buf);
        }
        buf
    }

    /// Group keys in stored order.
    pub fn keys(&self) -> &[CompactKey] {
        &self.keys
    }

    /// Whether the group of `key` is listed.
    pub fn contains(&self, key: &CompactKey) -> bool {
        self.keys.contains(&key.group_key())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no group is listed.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Typed view of the footer key/value metadata of one deposit file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FooterMetadata {
    kind: DepositKind,
    catalog: Catalog,
    last_modified: Option<DateTime<Utc>>,
    custom: BTreeMap<String, String>,
}

impl FooterMetadata {
    pub(crate) fn new(
        kind: DepositKind,
        catalog: Catalog,
        last_modified: DateTime<Utc>,
        custom: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind,
            catalog,
            last_modified: Some(last_modified),
            custom,
        }
    }

    /// Parse footer entries. A missing catalog reads as empty; a missing or unknown kind is fatal.
    pub(crate) fn from_key_values(
        path: &Path,
        entries: Option<&Vec<KeyValue>>,
    ) -> Result<Self, DepositError> {
        let lookup = |key: &str| {
            entries
                .into_iter()
                .flatten()
                .find(|entry| entry.key == key)
                .and_then(|entry| entry.value.as_deref())
        };

        let data_type = lookup(DATA_TYPE_KEY);
        let kind = data_type.and_then(DepositKind::from_data_type).ok_or_else(|| {
            DepositError::UnrecognizedDepositFile {
                path: path.to_path_buf(),
                data_type: data_type.map(str::to_string),
            }
        })?;

        let catalog = match lookup(kind.catalog_key()) {
            Some(value) => Catalog::decode(&decode_hex(kind.catalog_key(), value)?)?,
            None => Catalog::default(),
        };

        let last_modified = lookup(LAST_MODIFIED_KEY)
            .map(|value| {
                let bytes = decode_hex(LAST_MODIFIED_KEY, value)?;
                let stamp: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    DepositError::MalformedMetadata {
                        key: LAST_MODIFIED_KEY.to_string(),
                        reason: format!("expected 8 bytes, found {}", bytes.len()),
                    }
                })?;
                let seconds = i64::from_le_bytes(stamp);
                DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
                    DepositError::MalformedMetadata {
                        key: LAST_MODIFIED_KEY.to_string(),
                        reason: format!("timestamp {seconds} out of range"),
                    }
                })
            })
            .transpose()?;

        let custom = entries
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let name = entry.key.strip_prefix(CUSTOM_PREFIX)?;
                Some((name.to_string(), entry.value.clone().unwrap_or_default()))
            })
            .collect();

        Ok(Self {
            kind,
            catalog,
            last_modified,
            custom,
        })
    }

    pub(crate) fn to_key_values(&self) -> Vec<KeyValue> {
        let mut entries = vec![
            KeyValue::new(
                DATA_TYPE_KEY.to_string(),
                self.kind.data_type().to_string(),
            ),
            KeyValue::new(
                self.kind.catalog_key().to_string(),
                hex::encode(self.catalog.encode()),
            ),
        ];
        if let Some(last_modified) = self.last_modified {
            entries.push(KeyValue::new(
                LAST_MODIFIED_KEY.to_string(),
                hex::encode(last_modified.timestamp().to_le_bytes()),
            ));
        }
        entries.extend(self.custom.iter().map(|(name, value)| {
            KeyValue::new(format!("{CUSTOM_PREFIX}{name}"), value.clone())
        }));
        entries
    }

    /// Kind of the file.
    pub fn kind(&self) -> DepositKind {
        self.kind
    }

    /// Decoded catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Modification stamp written when the file was finalised.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Custom entries with the `x_` prefix stripped.
    pub fn custom(&self) -> &BTreeMap<String, String> {
        &self.custom
    }
}

fn decode_hex(key: &str, value: &str) -> Result<Vec<u8>, DepositError> {
    hex::decode(value).map_err(|err| DepositError::MalformedMetadata {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::to_compact_key;

    fn keys() -> Vec<CompactKey> {
        vec![
            to_compact_key("udt1__acme__scope__sn1__100").unwrap(),
            to_compact_key("udt1__acme__scope__sn2__200__9").unwrap(),
        ]
    }

    #[test]
    fn catalog_stores_group_keys_only() {
        let catalog = Catalog::new(keys());
        let bytes = catalog.encode();
        assert_eq!(bytes.len(), 2 * GROUP_KEY_LEN);
        assert!(catalog.keys().iter().all(CompactKey::is_group));
        assert!(catalog.contains(&keys()[1]));
        assert_eq!(Catalog::decode(&bytes).unwrap(), catalog);
        assert!(Catalog::decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn catalog_rejects_ragged_length() {
        let mut bytes = Catalog::new(keys()).encode();
        bytes.pop();
        assert!(matches!(
            Catalog::decode(&bytes),
            Err(DepositError::MalformedCatalog { len }) if len == 2 * GROUP_KEY_LEN - 1
        ));
    }

    #[test]
    fn footer_round_trips_through_key_values() {
        let mut custom = BTreeMap::new();
        custom.insert("cruise".to_string(), "JC241".to_string());
        let stamp = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let footer = FooterMetadata::new(
            DepositKind::Annotation,
            Catalog::new(keys()),
            stamp,
            custom,
        );

        let entries = footer.to_key_values();
        assert!(entries
            .iter()
            .any(|entry| entry.key == REFERENCES_KEY));
        assert!(entries.iter().any(|entry| entry.key == "x_cruise"));

        let parsed = FooterMetadata::from_key_values(Path::new("a.parquet"), Some(&entries)).unwrap();
        assert_eq!(parsed, footer);
        assert_eq!(parsed.custom().get("cruise").map(String::as_str), Some("JC241"));
    }

    #[test]
    fn unknown_or_missing_kind_is_unrecognized() {
        let path = Path::new("mystery.parquet");
        assert!(matches!(
            FooterMetadata::from_key_values(path, None),
            Err(DepositError::UnrecognizedDepositFile { data_type: None, .. })
        ));

        let entries = vec![KeyValue::new(
            DATA_TYPE_KEY.to_string(),
            "CRAB_SPECTRA_V9".to_string(),
        )];
        assert!(matches!(
            FooterMetadata::from_key_values(path, Some(&entries)),
            Err(DepositError::UnrecognizedDepositFile { data_type: Some(ref value), .. })
                if value == "CRAB_SPECTRA_V9"
        ));
    }

    #[test]
    fn region_files_use_references_key() {
        assert_eq!(
            DepositKind::from_data_type("CRAB_ROI_V1"),
            Some(DepositKind::Region)
        );
        assert_eq!(DepositKind::Region.catalog_key(), REFERENCES_KEY);
        assert_eq!(DepositKind::Data.catalog_key(), CONTAINS_KEY);
    }
}
