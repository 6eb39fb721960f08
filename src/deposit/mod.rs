//! Building deposits and querying them.
//!
//! A deposit is a small set of Parquet files: one data file, one annotation file, and possibly
//! legacy region files from older producers. [`DepositBuilder`] writes them; [`DepositIndex`]
//! opens their footers, merges their catalogs and answers identifier and field lookups by
//! scanning only the files and row groups that can hold a match.

mod builder;
mod config;
mod error;
mod file;

use std::{collections::HashMap, path::Path};

pub use builder::{BuildOutcome, BuildReport, DepositBuilder, WrittenFile};
pub use config::{
    DepositCompression, DepositConfig, RecordSource, WriterOptions, DEFAULT_ANNOTATION_PATH,
    DEFAULT_DATA_PATH,
};
pub use error::DepositError;
pub use file::DepositFile;

use crate::{
    identifier::{CompactKey, Identifier, SCHEME},
    observability::{log_debug, log_info},
    ondisk::{
        arrows::{exact_key_filter, field_eq_filter, group_or_item_filter},
        decode::{decode_annotation_batch, decode_data_batch},
        metadata::DepositKind,
        pruning::KeyRange,
        schema::field_column,
    },
    record::{AnnotationRecord, DataRecord, FieldValue},
};

/// How lookups decide that a stored row matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Compare compact keys only. Digest collisions are accepted.
    #[default]
    Compact,
    /// Additionally compare the stored identifier text. Needs a textual identifier.
    Strict,
}

/// Identifier resolved for one lookup.
struct Target {
    key: CompactKey,
    /// Text to re-check in strict mode.
    text: Option<String>,
}

impl Target {
    fn resolve(id: Identifier<'_>, mode: MatchMode) -> Result<Self, DepositError> {
        let key = id.compact_key()?;
        let text = match mode {
            MatchMode::Compact => None,
            MatchMode::Strict => Some(
                id.as_name()
                    .ok_or(DepositError::AmbiguousIdentifierForm)?
                    .to_string(),
            ),
        };
        Ok(Self { key, text })
    }

    fn matches_exact(&self, stored: &str) -> bool {
        self.text.as_deref().map_or(true, |text| text == stored)
    }

    fn matches_group(&self, stored: &str) -> bool {
        let Some(text) = self.text.as_deref() else {
            return true;
        };
        let separator = if text.starts_with(&format!("{SCHEME}__")) {
            "__"
        } else {
            "_"
        };
        let group = if self.key.is_group() {
            text
        } else {
            text.rsplit_once(separator).map_or(text, |(group, _)| group)
        };
        stored == group
            || stored
                .strip_prefix(group)
                .is_some_and(|rest| rest.starts_with(separator))
    }
}

/// Read-only view over a set of deposit files.
#[derive(Debug, Default)]
pub struct DepositIndex {
    files: Vec<DepositFile>,
    catalog: HashMap<CompactKey, Vec<usize>>,
}

impl DepositIndex {
    /// Open every file in `paths` and merge their catalogs.
    ///
    /// Fails without an index if any file cannot be opened or classified.
    pub fn open<I, P>(paths: I) -> Result<Self, DepositError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let files = paths
            .into_iter()
            .map(DepositFile::open)
            .collect::<Result<Vec<_>, _>>()?;

        let mut catalog: HashMap<CompactKey, Vec<usize>> = HashMap::new();
        for (idx, file) in files.iter().enumerate() {
            for key in file.footer().catalog().keys() {
                let entry = catalog.entry(*key).or_default();
                if entry.last() != Some(&idx) {
                    entry.push(idx);
                }
            }
        }

        log_info!(
            component = "index",
            event = "deposit_index_opened",
            files = files.len(),
            groups = catalog.len(),
        );
        Ok(Self { files, catalog })
    }

    /// Opened files, in the order given to [`Self::open`].
    pub fn files(&self) -> &[DepositFile] {
        &self.files
    }

    /// File at `idx`.
    pub fn file(&self, idx: usize) -> Option<&DepositFile> {
        self.files.get(idx)
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is open.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every catalogued group key in compact hex form, sorted.
    pub fn all_group_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.catalog.keys().map(CompactKey::to_compact_hex).collect();
        keys.sort();
        keys
    }

    /// Indices of the files whose catalog lists the group of `id`.
    pub fn referencing_files<'a>(
        &self,
        id: impl Into<Identifier<'a>>,
    ) -> Result<Vec<usize>, DepositError> {
        let key = id.into().compact_key()?;
        Ok(self
            .catalog
            .get(&key.group_key())
            .cloned()
            .unwrap_or_default())
    }

    fn candidates(&self, key: &CompactKey, kind: DepositKind) -> impl Iterator<Item = &DepositFile> {
        self.catalog
            .get(&key.group_key())
            .into_iter()
            .flatten()
            .map(|&idx| &self.files[idx])
            .filter(move |file| file.kind() == kind)
    }

    /// The first data record stored under exactly `id`.
    pub fn lookup_exact<'a>(
        &self,
        id: impl Into<Identifier<'a>>,
        mode: MatchMode,
    ) -> Result<Option<DataRecord>, DepositError> {
        let target = Target::resolve(id.into(), mode)?;
        let key = target.key.to_bytes();
        let range = KeyRange::point(key.clone());

        let mut found = None;
        for file in self.candidates(&target.key, DepositKind::Data) {
            let column = file.key_column()?;
            file.scan(
                file.candidate_row_groups(&range),
                |schema| exact_key_filter(schema, column, key.clone()),
                |batch| {
                    found = decode_data_batch(batch)?
                        .into_iter()
                        .find(|record| target.matches_exact(record.identifier()));
                    Ok(found.is_none())
                },
            )?;
            if found.is_some() {
                break;
            }
        }

        log_debug!(
            component = "index",
            event = "lookup_exact",
            key = %target.key,
            found = found.is_some(),
        );
        Ok(found)
    }

    /// Every data record of the group of `id`: the group record itself and all its items.
    pub fn lookup_group_or_item<'a>(
        &self,
        id: impl Into<Identifier<'a>>,
        mode: MatchMode,
    ) -> Result<Vec<DataRecord>, DepositError> {
        let target = Target::resolve(id.into(), mode)?;
        let group = target.key.group_key().to_bytes();
        let prefix = target.key.extended_match_prefix();
        let range = KeyRange::group(group.clone(), &prefix);

        let mut records = Vec::new();
        for file in self.candidates(&target.key, DepositKind::Data) {
            let column = file.key_column()?;
            file.scan(
                file.candidate_row_groups(&range),
                |schema| group_or_item_filter(schema, column, group.clone(), prefix.to_vec()),
                |batch| {
                    records.extend(
                        decode_data_batch(batch)?
                            .into_iter()
                            .filter(|record| target.matches_group(record.identifier())),
                    );
                    Ok(true)
                },
            )?;
        }

        log_debug!(
            component = "index",
            event = "lookup_group_or_item",
            key = %target.key,
            matches = records.len(),
        );
        Ok(records)
    }

    /// Every annotation of the data record stored under exactly `id`.
    pub fn lookup_annotations_by_identifier<'a>(
        &self,
        id: impl Into<Identifier<'a>>,
        mode: MatchMode,
    ) -> Result<Vec<AnnotationRecord>, DepositError> {
        let target = Target::resolve(id.into(), mode)?;
        let key = target.key.to_bytes();
        let range = KeyRange::point(key.clone());

        let mut records = Vec::new();
        for file in self.candidates(&target.key, DepositKind::Annotation) {
            let column = file.key_column()?;
            let registry = file.annotation_registry();
            file.scan(
                file.candidate_row_groups(&range),
                |schema| exact_key_filter(schema, column, key.clone()),
                |batch| {
                    records.extend(
                        decode_annotation_batch(batch, &registry)?
                            .into_iter()
                            .filter(|record| target.matches_exact(record.identifier())),
                    );
                    Ok(true)
                },
            )?;
        }

        log_debug!(
            component = "index",
            event = "lookup_annotations_by_identifier",
            key = %target.key,
            matches = records.len(),
        );
        Ok(records)
    }

    /// Every annotation whose field `name` equals `value`, across all annotation files.
    ///
    /// Files that do not declare the field are skipped.
    pub fn lookup_annotations_by_field(
        &self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Vec<AnnotationRecord>, DepositError> {
        let value = value.into();
        let column_name = field_column(name);

        let mut records = Vec::new();
        for file in self
            .files
            .iter()
            .filter(|file| file.kind() == DepositKind::Annotation)
        {
            let registry = file.annotation_registry();
            let Some(expected) = registry.field_type(name) else {
                continue;
            };
            if expected != value.field_type() {
                return Err(DepositError::FieldTypeMismatch {
                    field: name.to_string(),
                    expected,
                    actual: value.field_type(),
                });
            }
            let column = file.column_index(&column_name)?;
            file.scan(
                (0..file.num_row_groups()).collect(),
                |schema| field_eq_filter(schema, column, &value),
                |batch| {
                    records.extend(decode_annotation_batch(batch, &registry)?);
                    Ok(true)
                },
            )?;
        }

        log_debug!(
            component = "index",
            event = "lookup_annotations_by_field",
            field = name,
            matches = records.len(),
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict(text: &str) -> Target {
        Target::resolve(Identifier::from(text), MatchMode::Strict).unwrap()
    }

    #[test]
    fn strict_group_match_respects_name_boundaries() {
        let target = strict("udt1__acme__scope__sn1__100__4");
        assert!(target.matches_group("udt1__acme__scope__sn1__100"));
        assert!(target.matches_group("udt1__acme__scope__sn1__100__9"));
        assert!(!target.matches_group("udt1__acme__scope__sn1__1000"));
        assert!(!target.matches_group("udt1__acme__scope__sn1__1000__4"));

        assert!(target.matches_exact("udt1__acme__scope__sn1__100__4"));
        assert!(!target.matches_exact("udt1__acme__scope__sn1__100__9"));
    }

    #[test]
    fn strict_group_match_on_compact_hex() {
        let key = CompactKey::from_canonical_name("udt1__acme__scope__sn1__100__4").unwrap();
        let hex = key.to_compact_hex();
        let group_hex = key.group_key().to_compact_hex();

        let target = strict(&hex);
        assert!(target.matches_group(&group_hex));
        assert!(target.matches_group(&hex));
        assert!(!target.matches_group("udt1__acme__scope__sn1__100__4"));
    }

    #[test]
    fn compact_mode_accepts_any_text() {
        let target = Target::resolve(Identifier::from("udt1__acme__scope__sn1__100"), MatchMode::Compact)
            .unwrap();
        assert!(target.matches_exact("anything"));
        assert!(target.matches_group("anything"));
    }
}
