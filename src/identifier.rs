//! Identifier codec.
//!
//! One identifier, three representations:
//!
//! - *Canonical Name*: `udt1__<vendor>__<model>__<serial>__<epoch>[__<instance>]`, authored by
//!   humans and never recoverable from the other two forms.
//! - [`CompactKey`]: fixed-width binary form built from truncated SHA-256 digests and the raw
//!   epoch seconds. Tag 2 (21 bytes) is a group key, tag 3 (29 bytes) an item key.
//! - *Compact Hex*: `udt1_<vm>_<serial>_<epoch>[_<instance>]`, a lossless printable encoding of
//!   the compact key only.
//!
//! Digests are truncated on purpose and collisions are not detected.

use std::{borrow::Cow, fmt};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Scheme prefix shared by canonical names and compact hex strings.
pub const SCHEME: &str = "udt1";
/// Tag byte of a group key.
pub const GROUP_TAG: u8 = 2;
/// Tag byte of an item key.
pub const ITEM_TAG: u8 = 3;
/// Encoded width of a group key.
pub const GROUP_KEY_LEN: usize = 1 + VENDOR_MODEL_LEN + SERIAL_LEN + EPOCH_LEN;
/// Encoded width of an item key.
pub const ITEM_KEY_LEN: usize = GROUP_KEY_LEN + INSTANCE_LEN;

const VENDOR_MODEL_LEN: usize = 6;
const SERIAL_LEN: usize = 8;
const EPOCH_LEN: usize = 6;
const INSTANCE_LEN: usize = 8;

const NAME_SEPARATOR: &str = "__";
const HEX_SEPARATOR: char = '_';

/// Errors raised while converting between identifier representations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The input is neither a canonical name nor a compact hex string.
    #[error("malformed identifier: {0:?}")]
    MalformedIdentifier(String),
    /// A binary key carried a tag other than 2 or 3.
    #[error("unsupported compact key tag {0}")]
    UnsupportedTag(u8),
}

fn malformed(input: impl Into<String>) -> IdentifierError {
    IdentifierError::MalformedIdentifier(input.into())
}

/// Fixed-width binary identifier.
///
/// A key without an instance digest is a group key (tag 2); with one it is an item key (tag 3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompactKey {
    vendor_model: [u8; VENDOR_MODEL_LEN],
    serial: [u8; SERIAL_LEN],
    epoch: [u8; EPOCH_LEN],
    instance: Option<[u8; INSTANCE_LEN]>,
}

impl CompactKey {
    /// Derive a key from a canonical name.
    pub fn from_canonical_name(name: &str) -> Result<Self, IdentifierError> {
        let body = name
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix(NAME_SEPARATOR))
            .ok_or_else(|| malformed(name))?;
        let parts: Vec<&str> = body.split(NAME_SEPARATOR).collect();
        if !(4..=5).contains(&parts.len()) || parts.iter().any(|part| part.is_empty()) {
            return Err(malformed(name));
        }

        let vendor_model = truncated_digest(format!("{}__{}", parts[0], parts[1]).as_bytes());
        let serial = truncated_digest(parts[2].to_lowercase().as_bytes());
        let seconds: u64 = parts[3].parse().map_err(|_| malformed(name))?;
        let instance = parts.get(4).map(|instance| truncated_digest(instance.as_bytes()));

        Ok(Self {
            vendor_model,
            serial,
            epoch: encode_epoch(seconds),
            instance,
        })
    }

    /// Parse a compact hex string field by field.
    pub fn from_compact_hex(text: &str) -> Result<Self, IdentifierError> {
        let body = text
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix(HEX_SEPARATOR))
            .ok_or_else(|| malformed(text))?;
        let parts: Vec<&str> = body.split(HEX_SEPARATOR).collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(malformed(text));
        }

        Ok(Self {
            vendor_model: hex_field(parts[0], text)?,
            serial: hex_field(parts[1], text)?,
            epoch: hex_field(parts[2], text)?,
            instance: parts
                .get(3)
                .map(|field| hex_field(field, text))
                .transpose()?,
        })
    }

    /// Decode the binary wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentifierError> {
        let Some(&tag) = bytes.first() else {
            return Err(malformed("<empty compact key>"));
        };
        let expected = match tag {
            GROUP_TAG => GROUP_KEY_LEN,
            ITEM_TAG => ITEM_KEY_LEN,
            other => return Err(IdentifierError::UnsupportedTag(other)),
        };
        if bytes.len() != expected {
            return Err(malformed(format!(
                "tag {tag} key of {} bytes, expected {expected}",
                bytes.len()
            )));
        }

        let mut key = Self {
            vendor_model: [0; VENDOR_MODEL_LEN],
            serial: [0; SERIAL_LEN],
            epoch: [0; EPOCH_LEN],
            instance: None,
        };
        let mut offset = 1;
        for field in [
            &mut key.vendor_model[..],
            &mut key.serial[..],
            &mut key.epoch[..],
        ] {
            field.copy_from_slice(&bytes[offset..offset + field.len()]);
            offset += field.len();
        }
        if tag == ITEM_TAG {
            let mut instance = [0; INSTANCE_LEN];
            instance.copy_from_slice(&bytes[offset..]);
            key.instance = Some(instance);
        }
        Ok(key)
    }

    /// Tag byte: 2 for group keys, 3 for item keys.
    pub fn tag(&self) -> u8 {
        if self.instance.is_some() {
            ITEM_TAG
        } else {
            GROUP_TAG
        }
    }

    /// Whether this key carries no instance digest.
    pub fn is_group(&self) -> bool {
        self.instance.is_none()
    }

    /// Encoded width in bytes.
    pub fn encoded_len(&self) -> usize {
        if self.is_group() {
            GROUP_KEY_LEN
        } else {
            ITEM_KEY_LEN
        }
    }

    /// Append the binary wire form to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        buf.extend_from_slice(&self.vendor_model);
        buf.extend_from_slice(&self.serial);
        buf.extend_from_slice(&self.epoch);
        if let Some(instance) = &self.instance {
            buf.extend_from_slice(instance);
        }
    }

    /// Binary wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf
    }

    /// Low 48 bits of the epoch seconds this key was derived from.
    pub fn epoch_seconds(&self) -> u64 {
        let mut wide = [0u8; 8];
        wide[8 - EPOCH_LEN..].copy_from_slice(&self.epoch);
        u64::from_be_bytes(wide)
    }

    /// Truncated digest of `<vendor>__<model>`.
    pub fn vendor_model_digest(&self) -> &[u8] {
        &self.vendor_model
    }

    /// Truncated digest of the lower-cased device serial.
    pub fn serial_digest(&self) -> &[u8] {
        &self.serial
    }

    /// Truncated digest of the instance id, for item keys.
    pub fn instance_digest(&self) -> Option<&[u8]> {
        self.instance.as_ref().map(|instance| &instance[..])
    }

    /// Drop the instance digest. Idempotent on group keys.
    pub fn group_key(&self) -> Self {
        Self {
            instance: None,
            ..*self
        }
    }

    /// Group key bytes with the tag forced to the item tag.
    ///
    /// Any item key of this group starts with these bytes, whatever its instance. Only valid
    /// while the group and item tags differ in exactly the low bit.
    pub fn extended_match_prefix(&self) -> [u8; GROUP_KEY_LEN] {
        let mut prefix = [0u8; GROUP_KEY_LEN];
        let mut buf = Vec::with_capacity(GROUP_KEY_LEN);
        self.group_key().write_to(&mut buf);
        prefix.copy_from_slice(&buf);
        prefix[0] |= 1;
        prefix
    }

    /// Compact hex form. Never reconstructs the canonical name.
    pub fn to_compact_hex(&self) -> String {
        let mut out = format!(
            "{SCHEME}_{}_{}_{}",
            hex::encode(self.vendor_model),
            hex::encode(self.serial),
            hex::encode(self.epoch)
        );
        if let Some(instance) = &self.instance {
            out.push(HEX_SEPARATOR);
            out.push_str(&hex::encode(instance));
        }
        out
    }
}

impl fmt::Display for CompactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_compact_hex())
    }
}

impl fmt::Debug for CompactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompactKey({})", self.to_compact_hex())
    }
}

impl TryFrom<&[u8]> for CompactKey {
    type Error = IdentifierError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

/// Caller-facing identifier input: either a textual name or an already derived key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier<'a> {
    /// Canonical name or compact hex string.
    Name(Cow<'a, str>),
    /// Binary compact key.
    Key(CompactKey),
}

impl Identifier<'_> {
    /// Resolve to a compact key.
    pub fn compact_key(&self) -> Result<CompactKey, IdentifierError> {
        match self {
            Identifier::Name(name) => parse_name(name),
            Identifier::Key(key) => Ok(*key),
        }
    }

    /// Textual form, when the caller supplied one.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Identifier::Name(name) => Some(name),
            Identifier::Key(_) => None,
        }
    }
}

impl<'a> From<&'a str> for Identifier<'a> {
    fn from(name: &'a str) -> Self {
        Identifier::Name(Cow::Borrowed(name))
    }
}

impl<'a> From<&'a String> for Identifier<'a> {
    fn from(name: &'a String) -> Self {
        Identifier::Name(Cow::Borrowed(name.as_str()))
    }
}

impl From<String> for Identifier<'_> {
    fn from(name: String) -> Self {
        Identifier::Name(Cow::Owned(name))
    }
}

impl From<CompactKey> for Identifier<'_> {
    fn from(key: CompactKey) -> Self {
        Identifier::Key(key)
    }
}

impl From<&CompactKey> for Identifier<'_> {
    fn from(key: &CompactKey) -> Self {
        Identifier::Key(*key)
    }
}

fn parse_name(name: &str) -> Result<CompactKey, IdentifierError> {
    // The canonical prefix is a superset of the hex prefix, so test it first.
    if name.starts_with(&format!("{SCHEME}{NAME_SEPARATOR}")) {
        CompactKey::from_canonical_name(name)
    } else {
        CompactKey::from_compact_hex(name)
    }
}

/// Convert any identifier form into a compact key. Keys pass through unchanged.
pub fn to_compact_key<'a>(input: impl Into<Identifier<'a>>) -> Result<CompactKey, IdentifierError> {
    input.into().compact_key()
}

/// Compact hex form of a key.
pub fn to_canonical_string(key: &CompactKey) -> String {
    key.to_compact_hex()
}

/// Group key of any compact key.
pub fn to_group_key(key: &CompactKey) -> CompactKey {
    key.group_key()
}

/// Prefix matching every item key that belongs to `group`.
pub fn extended_match_prefix(group: &CompactKey) -> [u8; GROUP_KEY_LEN] {
    group.extended_match_prefix()
}

fn truncated_digest<const N: usize>(input: &[u8]) -> [u8; N] {
    let full = Sha256::digest(input);
    let mut out = [0u8; N];
    out.copy_from_slice(&full[..N]);
    out
}

fn encode_epoch(seconds: u64) -> [u8; EPOCH_LEN] {
    let mut out = [0u8; EPOCH_LEN];
    out.copy_from_slice(&seconds.to_be_bytes()[8 - EPOCH_LEN..]);
    out
}

fn hex_field<const N: usize>(field: &str, input: &str) -> Result<[u8; N], IdentifierError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(field, &mut out).map_err(|_| malformed(input))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP_NAME: &str =
        "udt1__usa_mc_lane_research_laboratories__imaging_flow_cytobot__ifcb107__1714521600";
    const ITEM_NAME: &str =
        "udt1__usa_mc_lane_research_laboratories__imaging_flow_cytobot__ifcb107__1714521600__42";

    #[test]
    fn canonical_names_yield_tagged_fixed_width_keys() {
        let group = to_compact_key(GROUP_NAME).unwrap();
        assert_eq!(group.tag(), GROUP_TAG);
        assert_eq!(group.to_bytes().len(), GROUP_KEY_LEN);

        let item = to_compact_key(ITEM_NAME).unwrap();
        assert_eq!(item.tag(), ITEM_TAG);
        assert_eq!(item.to_bytes().len(), ITEM_KEY_LEN);

        let grouped = to_group_key(&item);
        assert_eq!(grouped.tag(), GROUP_TAG);
        assert_eq!(grouped.to_bytes().len(), GROUP_KEY_LEN);
        assert_eq!(grouped, group);
        assert_eq!(&item.to_bytes()[1..GROUP_KEY_LEN], &group.to_bytes()[1..]);
    }

    #[test]
    fn conversions_are_idempotent() {
        let key = to_compact_key(ITEM_NAME).unwrap();
        assert_eq!(to_compact_key(key).unwrap(), key);
        assert_eq!(to_compact_key(&key).unwrap(), key);

        let group = to_group_key(&key);
        assert_eq!(to_group_key(&group), group);
    }

    #[test]
    fn compact_hex_round_trips_binary_form() {
        for name in [GROUP_NAME, ITEM_NAME] {
            let key = to_compact_key(name).unwrap();
            let text = to_canonical_string(&key);
            assert!(text.starts_with("udt1_"));
            assert_ne!(text, name);
            assert_eq!(to_compact_key(text.as_str()).unwrap(), key);
            assert_eq!(CompactKey::from_bytes(&key.to_bytes()).unwrap(), key);
        }
    }

    #[test]
    fn vendor_model_digest_ignores_serial_and_time() {
        let a = to_compact_key("udt1__acme__scope__sn1__100").unwrap();
        let b = to_compact_key("udt1__acme__scope__sn2__999__7").unwrap();
        let c = to_compact_key("udt1__acme__probe__sn1__100").unwrap();
        assert_eq!(a.vendor_model_digest(), b.vendor_model_digest());
        assert_ne!(a.vendor_model_digest(), c.vendor_model_digest());
        assert_ne!(a.serial_digest(), b.serial_digest());
    }

    #[test]
    fn serial_digest_is_case_insensitive() {
        let upper = to_compact_key("udt1__acme__scope__IFCB107__100").unwrap();
        let lower = to_compact_key("udt1__acme__scope__ifcb107__100").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn digests_match_truncated_sha256() {
        let key = to_compact_key("udt1__acme__scope__sn1__100__5").unwrap();
        assert_eq!(key.vendor_model_digest(), &Sha256::digest(b"acme__scope")[..6]);
        assert_eq!(key.serial_digest(), &Sha256::digest(b"sn1")[..8]);
        assert_eq!(key.instance_digest().unwrap(), &Sha256::digest(b"5")[..8]);
        assert_eq!(key.epoch_seconds(), 100);
    }

    #[test]
    fn epoch_keeps_low_48_bits() {
        let wide = (1u64 << 48) + 77;
        let key = to_compact_key(format!("udt1__acme__scope__sn1__{wide}")).unwrap();
        assert_eq!(key.epoch_seconds(), 77);
        assert!(to_canonical_string(&key).ends_with("_00000000004d"));
    }

    #[test]
    fn extended_prefix_sets_item_tag() {
        let group = to_compact_key(GROUP_NAME).unwrap();
        let prefix = extended_match_prefix(&group);
        assert_eq!(prefix[0], ITEM_TAG);
        assert_eq!(&prefix[1..], &group.to_bytes()[1..]);

        let item = to_compact_key(ITEM_NAME).unwrap();
        assert!(item.to_bytes().starts_with(&prefix));
        assert_eq!(item.extended_match_prefix(), prefix);
    }

    #[test]
    fn rejects_malformed_inputs() {
        for bad in [
            "",
            "udt2__acme__scope__sn1__100",
            "udt1__acme__scope__sn1",
            "udt1__acme__scope__sn1__notanumber",
            "udt1__acme__scope__sn1__100__1__extra",
            "udt1__acme____sn1__100",
            "udt1_zz_00_00",
            "udt1_0011_2233_4455",
            "udt1_001122334455_0011223344556677",
            "udt1_001122334455_0011223344556677_001122334455_00_11",
        ] {
            assert!(
                matches!(
                    to_compact_key(bad),
                    Err(IdentifierError::MalformedIdentifier(_))
                ),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn rejects_unknown_tags_and_lengths() {
        let mut bytes = to_compact_key(GROUP_NAME).unwrap().to_bytes();
        bytes[0] = 4;
        assert_eq!(
            CompactKey::from_bytes(&bytes),
            Err(IdentifierError::UnsupportedTag(4))
        );

        bytes[0] = ITEM_TAG;
        assert!(matches!(
            CompactKey::from_bytes(&bytes),
            Err(IdentifierError::MalformedIdentifier(_))
        ));
        assert!(CompactKey::from_bytes(&[]).is_err());
    }
}
