use std::{collections::BTreeMap, fmt, path::PathBuf, sync::Arc};

use parquet::{
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};

use crate::{
    identifier::CompactKey,
    record::{AnnotationRecord, DataRecord, FieldRegistry},
};

/// Default output path of the data file.
pub const DEFAULT_DATA_PATH: &str = "crabdata.parquet";
/// Default output path of the annotation file.
pub const DEFAULT_ANNOTATION_PATH: &str = "crabannotation.parquet";

const MIB: usize = 1024 * 1024;
const KIB: usize = 1024;

/// Pull-based record producer consumed once by the builder.
pub type RecordSource<'a, T> = Box<dyn Iterator<Item = T> + 'a>;

/// Compression choices supported by the deposit writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DepositCompression {
    /// Leave pages uncompressed.
    None,
    /// Apply Zstd compression with default tuning.
    #[default]
    Zstd,
}

/// Sizing and encoding knobs of the Parquet writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    target_batch_bytes: usize,
    approx_data_record_bytes: usize,
    approx_annotation_record_bytes: usize,
    compression: DepositCompression,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            target_batch_bytes: 64 * MIB,
            approx_data_record_bytes: 32 * KIB,
            approx_annotation_record_bytes: KIB,
            compression: DepositCompression::default(),
        }
    }
}

impl WriterOptions {
    /// Bytes each row group should roughly hold.
    pub fn with_target_batch_bytes(mut self, bytes: usize) -> Self {
        self.target_batch_bytes = bytes;
        self
    }

    /// Expected size of one data record.
    pub fn with_approx_data_record_bytes(mut self, bytes: usize) -> Self {
        self.approx_data_record_bytes = bytes;
        self
    }

    /// Expected size of one annotation record.
    pub fn with_approx_annotation_record_bytes(mut self, bytes: usize) -> Self {
        self.approx_annotation_record_bytes = bytes;
        self
    }

    /// Choose the page compression.
    pub fn with_compression(mut self, compression: DepositCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Target row group size in bytes.
    pub fn target_batch_bytes(&self) -> usize {
        self.target_batch_bytes
    }

    /// Configured page compression.
    pub fn compression(&self) -> DepositCompression {
        self.compression
    }

    /// Data records per row group, at least one.
    pub fn data_batch_rows(&self) -> usize {
        batch_rows(self.target_batch_bytes, self.approx_data_record_bytes)
    }

    /// Annotation records per row group, at least one.
    pub fn annotation_batch_rows(&self) -> usize {
        batch_rows(self.target_batch_bytes, self.approx_annotation_record_bytes)
    }

    pub(crate) fn writer_properties(&self) -> WriterProperties {
        let builder = match self.compression {
            DepositCompression::None => {
                WriterProperties::builder().set_compression(Compression::UNCOMPRESSED)
            }
            DepositCompression::Zstd => {
                WriterProperties::builder().set_compression(Compression::ZSTD(ZstdLevel::default()))
            }
        };
        builder.build()
    }
}

fn batch_rows(target: usize, approx: usize) -> usize {
    target.checked_div(approx).unwrap_or(target).max(1)
}

/// Everything a [`DepositBuilder`](crate::deposit::DepositBuilder) needs for one build.
pub struct DepositConfig<'a> {
    data: Option<RecordSource<'a, DataRecord>>,
    annotations: Option<RecordSource<'a, AnnotationRecord>>,
    data_path: PathBuf,
    annotation_path: PathBuf,
    registry: Arc<FieldRegistry>,
    catalog: Option<Vec<CompactKey>>,
    custom: BTreeMap<String, String>,
    options: WriterOptions,
}

impl Default for DepositConfig<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> DepositConfig<'a> {
    /// Empty configuration with default paths and options.
    pub fn new() -> Self {
        Self {
            data: None,
            annotations: None,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            annotation_path: PathBuf::from(DEFAULT_ANNOTATION_PATH),
            registry: Arc::new(FieldRegistry::new()),
            catalog: None,
            custom: BTreeMap::new(),
            options: WriterOptions::default(),
        }
    }

    /// Data records to deposit.
    pub fn with_data<I>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = DataRecord>,
        I::IntoIter: 'a,
    {
        self.data = Some(Box::new(records.into_iter()));
        self
    }

    /// Annotation records to deposit.
    pub fn with_annotations<I>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = AnnotationRecord>,
        I::IntoIter: 'a,
    {
        self.annotations = Some(Box::new(records.into_iter()));
        self
    }

    /// Output path of the data file.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Output path of the annotation file.
    pub fn with_annotation_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.annotation_path = path.into();
        self
    }

    /// Annotation field registry.
    pub fn with_registry(mut self, registry: Arc<FieldRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the derived catalogs with the group keys of `keys`.
    pub fn with_catalog(mut self, keys: impl IntoIterator<Item = CompactKey>) -> Self {
        self.catalog = Some(keys.into_iter().collect());
        self
    }

    /// Add a custom footer entry, stored as `x_<name>`.
    pub fn with_custom_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    /// Writer sizing and compression.
    pub fn with_writer_options(mut self, options: WriterOptions) -> Self {
        self.options = options;
        self
    }

    /// Output path of the data file.
    pub fn data_path(&self) -> &PathBuf {
        &self.data_path
    }

    /// Output path of the annotation file.
    pub fn annotation_path(&self) -> &PathBuf {
        &self.annotation_path
    }

    /// Annotation field registry.
    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// Explicit catalog, if one was supplied.
    pub fn catalog(&self) -> Option<&[CompactKey]> {
        self.catalog.as_deref()
    }

    /// Custom footer entries without their prefix.
    pub fn custom_metadata(&self) -> &BTreeMap<String, String> {
        &self.custom
    }

    /// Writer sizing and compression.
    pub fn writer_options(&self) -> &WriterOptions {
        &self.options
    }

    pub(crate) fn take_data(&mut self) -> Option<RecordSource<'a, DataRecord>> {
        self.data.take()
    }

    pub(crate) fn take_annotations(&mut self) -> Option<RecordSource<'a, AnnotationRecord>> {
        self.annotations.take()
    }
}

impl fmt::Debug for DepositConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepositConfig")
            .field("has_data", &self.data.is_some())
            .field("has_annotations", &self.annotations.is_some())
            .field("data_path", &self.data_path)
            .field("annotation_path", &self.annotation_path)
            .field("registry", &self.registry)
            .field("catalog", &self.catalog)
            .field("custom", &self.custom)
            .field("options", &self.options)
            .finish()
    }
}
