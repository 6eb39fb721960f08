use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use parquet::{
    arrow::arrow_reader::{
        ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder, RowFilter,
    },
    file::metadata::ParquetMetaData,
    schema::types::SchemaDescriptor,
};

use crate::{
    deposit::DepositError,
    ondisk::{
        metadata::{DepositKind, FooterMetadata},
        pruning::{candidate_row_groups, KeyRange},
        schema::{registry_from_schema, UDT_BIN_COL},
    },
    record::FieldRegistry,
};

/// One opened deposit file: its footer, Arrow schema and, for annotations, its field registry.
#[derive(Clone, Debug)]
pub struct DepositFile {
    path: PathBuf,
    footer: FooterMetadata,
    metadata: ArrowReaderMetadata,
    registry: Option<Arc<FieldRegistry>>,
}

impl DepositFile {
    /// Load the footer of `path`. Row data is not read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DepositError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let metadata = ArrowReaderMetadata::load(&file, ArrowReaderOptions::new())?;
        let footer = FooterMetadata::from_key_values(
            path,
            metadata.metadata().file_metadata().key_value_metadata(),
        )?;
        let registry = match footer.kind() {
            DepositKind::Annotation => Some(Arc::new(registry_from_schema(metadata.schema())?)),
            DepositKind::Data | DepositKind::Region => None,
        };
        Ok(Self {
            path: path.to_path_buf(),
            footer,
            metadata,
            registry,
        })
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kind of records held.
    pub fn kind(&self) -> DepositKind {
        self.footer.kind()
    }

    /// Decoded footer metadata.
    pub fn footer(&self) -> &FooterMetadata {
        &self.footer
    }

    /// Arrow schema stored in the file.
    pub fn schema(&self) -> &SchemaRef {
        self.metadata.schema()
    }

    /// Field registry rebuilt from the schema of an annotation file.
    pub fn registry(&self) -> Option<&Arc<FieldRegistry>> {
        self.registry.as_ref()
    }

    /// Total rows across row groups.
    pub fn num_rows(&self) -> usize {
        self.parquet_metadata()
            .row_groups()
            .iter()
            .map(|row_group| row_group.num_rows() as usize)
            .sum()
    }

    /// Number of row groups.
    pub fn num_row_groups(&self) -> usize {
        self.parquet_metadata().num_row_groups()
    }

    /// Registry to decode annotation rows with. Empty for other kinds.
    pub(crate) fn annotation_registry(&self) -> Arc<FieldRegistry> {
        self.registry.clone().unwrap_or_default()
    }

    pub(crate) fn parquet_metadata(&self) -> &Arc<ParquetMetaData> {
        self.metadata.metadata()
    }

    pub(crate) fn column_index(&self, name: &str) -> Result<usize, DepositError> {
        self.schema()
            .index_of(name)
            .map_err(|_| DepositError::UnexpectedColumn {
                column: name.to_string(),
                reason: format!("missing from {}", self.path.display()),
            })
    }

    pub(crate) fn key_column(&self) -> Result<usize, DepositError> {
        self.column_index(UDT_BIN_COL)
    }

    /// Row groups that may hold keys in `range`.
    pub(crate) fn candidate_row_groups(&self, range: &KeyRange) -> Vec<usize> {
        candidate_row_groups(self.parquet_metadata(), range)
    }

    /// Decode the rows of `row_groups` that pass `filter`, in file order, handing each
    /// non-empty batch to `visit`. Returning `false` from `visit` stops the scan.
    pub(crate) fn scan<F, V>(
        &self,
        row_groups: Vec<usize>,
        filter: F,
        mut visit: V,
    ) -> Result<(), DepositError>
    where
        F: FnOnce(&SchemaDescriptor) -> RowFilter,
        V: FnMut(&RecordBatch) -> Result<bool, DepositError>,
    {
        if row_groups.is_empty() {
            return Ok(());
        }
        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(file, self.metadata.clone());
        let row_filter = filter(builder.parquet_schema());
        let reader = builder
            .with_row_groups(row_groups)
            .with_row_filter(row_filter)
            .build()?;
        for batch in reader {
            let batch = batch?;
            if batch.num_rows() > 0 && !visit(&batch)? {
                break;
            }
        }
        Ok(())
    }
}
