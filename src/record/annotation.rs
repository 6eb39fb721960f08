use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use uuid::Uuid;

use crate::{
    identifier::{to_compact_key, CompactKey},
    record::{ContentHash, DataRecord, FieldRegistry, FieldValue, RecordError},
};

/// An annotation of one data record.
///
/// Annotations are anchored to both the identifier and the content hash of the data they
/// describe, so a stale reference is detectable. Revisions are new records that point back via
/// [`AnnotationRecord::discard_in_favour`].
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationRecord {
    identifier: String,
    compact_key: CompactKey,
    content_hash: ContentHash,
    extents: Vec<(u64, u64)>,
    origin_extents: Vec<u64>,
    uuid: Uuid,
    annotator: Option<String>,
    annotation_software: Option<String>,
    last_modified: DateTime<Utc>,
    discard_in_favour: Option<CompactKey>,
    registry: Arc<FieldRegistry>,
    values: Vec<Option<FieldValue>>,
    discarded: Vec<bool>,
}

impl AnnotationRecord {
    /// Start building an annotation of the record named `identifier`.
    pub fn builder(
        identifier: impl Into<String>,
        registry: Arc<FieldRegistry>,
    ) -> AnnotationRecordBuilder {
        AnnotationRecordBuilder::new(identifier.into(), registry)
    }

    /// Identifier of the annotated data record.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Binary key of the annotated data record.
    pub fn compact_key(&self) -> &CompactKey {
        &self.compact_key
    }

    /// SHA-256 of the annotated data.
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Annotated region as `(start, end)` per axis.
    pub fn extents(&self) -> &[(u64, u64)] {
        &self.extents
    }

    /// Extents of the full source.
    pub fn origin_extents(&self) -> &[u64] {
        &self.origin_extents
    }

    /// Identity of this annotation instance.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Who annotated.
    pub fn annotator(&self) -> Option<&str> {
        self.annotator.as_deref()
    }

    /// Tool that produced the annotation.
    pub fn annotation_software(&self) -> Option<&str> {
        self.annotation_software.as_deref()
    }

    /// Last modification time, to the second.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Annotation superseding this one.
    pub fn discard_in_favour(&self) -> Option<&CompactKey> {
        self.discard_in_favour.as_ref()
    }

    /// Registry the field values are laid out against.
    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// Field values in registry order.
    pub fn values(&self) -> &[Option<FieldValue>] {
        &self.values
    }

    /// Value of a named field, if registered and set.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.registry
            .position(name)
            .and_then(|idx| self.values[idx].as_ref())
    }

    /// Whether the named field is flagged as discarded.
    pub fn is_discarded(&self, name: &str) -> bool {
        self.registry
            .discard_position(name)
            .is_some_and(|idx| self.discarded[idx])
    }

    /// Discard flags in registry order.
    pub fn discard_flags(&self) -> &[bool] {
        &self.discarded
    }

    /// Names of the fields flagged as discarded.
    pub fn discarded_fields(&self) -> Vec<&str> {
        self.registry
            .discard_fields()
            .iter()
            .zip(&self.discarded)
            .filter(|(_, discarded)| **discarded)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Whether this annotation is anchored to `data` as it currently is.
    ///
    /// False when the keys differ, or when the data hash differs or cannot be computed.
    pub fn references(&self, data: &DataRecord) -> bool {
        self.compact_key == *data.compact_key()
            && data
                .content_hash()
                .is_ok_and(|hash| hash == self.content_hash)
    }
}

/// Validating constructor for [`AnnotationRecord`].
#[derive(Clone, Debug)]
pub struct AnnotationRecordBuilder {
    identifier: String,
    registry: Arc<FieldRegistry>,
    compact_key: Option<CompactKey>,
    content_hash: Option<ContentHash>,
    extents: Vec<(u64, u64)>,
    origin_extents: Vec<u64>,
    uuid: Option<Uuid>,
    annotator: Option<String>,
    annotation_software: Option<String>,
    last_modified: Option<DateTime<Utc>>,
    discard_in_favour: Option<CompactKey>,
    values: Vec<(String, FieldValue)>,
    discards: Vec<String>,
}

impl AnnotationRecordBuilder {
    fn new(identifier: String, registry: Arc<FieldRegistry>) -> Self {
        Self {
            identifier,
            registry,
            compact_key: None,
            content_hash: None,
            extents: Vec::new(),
            origin_extents: Vec::new(),
            uuid: None,
            annotator: None,
            annotation_software: None,
            last_modified: None,
            discard_in_favour: None,
            values: Vec::new(),
            discards: Vec::new(),
        }
    }

    /// Hash of the annotated data. Required.
    pub fn content_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    /// Annotated region.
    pub fn extents(mut self, extents: Vec<(u64, u64)>) -> Self {
        self.extents = extents;
        self
    }

    /// Extents of the full source.
    pub fn origin_extents(mut self, origin_extents: Vec<u64>) -> Self {
        self.origin_extents = origin_extents;
        self
    }

    /// Fix the annotation identity. A random v4 UUID is used otherwise.
    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Who annotated.
    pub fn annotator(mut self, annotator: impl Into<String>) -> Self {
        self.annotator = Some(annotator.into());
        self
    }

    /// Tool that produced the annotation.
    pub fn annotation_software(mut self, software: impl Into<String>) -> Self {
        self.annotation_software = Some(software.into());
        self
    }

    /// Modification time.
    pub fn last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Mark this annotation as superseded by another.
    pub fn discard_in_favour(mut self, key: CompactKey) -> Self {
        self.discard_in_favour = Some(key);
        self
    }

    /// Use an already derived key instead of parsing the identifier.
    pub fn compact_key(mut self, key: CompactKey) -> Self {
        self.compact_key = Some(key);
        self
    }

    /// Set a registered field. Checked against the registry in [`Self::build`].
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    /// Flag a registered discard field.
    pub fn discard(mut self, name: impl Into<String>) -> Self {
        self.discards.push(name.into());
        self
    }

    /// Validate and assemble the record.
    pub fn build(self) -> Result<AnnotationRecord, RecordError> {
        let content_hash = self.content_hash.ok_or(RecordError::MissingContentHash)?;

        let mut values = vec![None; self.registry.fields().len()];
        for (name, value) in self.values {
            let idx = self
                .registry
                .position(&name)
                .ok_or_else(|| RecordError::UnknownField(name.clone()))?;
            let expected = self.registry.fields()[idx].field_type();
            if value.field_type() != expected {
                return Err(RecordError::FieldTypeMismatch {
                    field: name,
                    expected,
                    actual: value.field_type(),
                });
            }
            values[idx] = Some(value);
        }

        let mut discarded = vec![false; self.registry.discard_fields().len()];
        for name in self.discards {
            let idx = self
                .registry
                .discard_position(&name)
                .ok_or(RecordError::UnknownField(name))?;
            discarded[idx] = true;
        }

        let compact_key = match self.compact_key {
            Some(key) => key,
            None => to_compact_key(self.identifier.as_str())?,
        };
        let last_modified = self.last_modified.unwrap_or_else(Utc::now);

        Ok(AnnotationRecord {
            identifier: self.identifier,
            compact_key,
            content_hash,
            extents: self.extents,
            origin_extents: self.origin_extents,
            uuid: self.uuid.unwrap_or_else(Uuid::new_v4),
            annotator: self.annotator,
            annotation_software: self.annotation_software,
            last_modified: last_modified.with_nanosecond(0).unwrap_or(last_modified),
            discard_in_favour: self.discard_in_favour,
            registry: self.registry,
            values,
            discarded,
        })
    }
}
