use std::{
    collections::BTreeSet,
    fs::File,
    iter::Peekable,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use chrono::Utc;
use parquet::arrow::ArrowWriter;

use crate::{
    deposit::{config::RecordSource, DepositConfig, DepositError, DepositIndex},
    identifier::CompactKey,
    observability::{log_debug, log_info, log_warn},
    ondisk::{
        encode::{encode_annotation_batch, encode_data_batch},
        metadata::{Catalog, DepositKind, FooterMetadata},
        schema::{annotation_schema, DATA_SCHEMA},
    },
    record::{AnnotationRecord, DataRecord},
};

/// Summary of one file written by a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenFile {
    /// Kind of records written.
    pub kind: DepositKind,
    /// Output location.
    pub path: PathBuf,
    /// Records written.
    pub rows: usize,
    /// Row groups written.
    pub batches: usize,
    /// Group keys listed in the footer catalog.
    pub catalog_len: usize,
}

/// What a build did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Files written, data first.
    pub files: Vec<WrittenFile>,
    /// Kinds whose source was absent or empty.
    pub skipped: Vec<DepositKind>,
}

/// Result of [`DepositBuilder::build`].
#[derive(Debug)]
pub struct BuildOutcome {
    /// Index over the files just written.
    pub index: DepositIndex,
    /// Per-file counts and skipped kinds.
    pub report: BuildReport,
}

/// Writes the configured record sources into deposit files.
#[derive(Debug)]
pub struct DepositBuilder<'a> {
    config: DepositConfig<'a>,
}

impl<'a> DepositBuilder<'a> {
    /// Builder over `config`.
    pub fn new(config: DepositConfig<'a>) -> Self {
        Self { config }
    }

    /// Drain every source into its file, finalise the footers and open the result.
    ///
    /// Sources are pulled one batch at a time. An empty source writes no file.
    pub fn build(mut self) -> Result<BuildOutcome, DepositError> {
        let mut report = BuildReport::default();

        let data = self.config.take_data();
        match non_empty(data) {
            Some(source) => {
                let path = self.config.data_path().clone();
                let rows = self.config.writer_options().data_batch_rows();
                let written = self.write_file(
                    DepositKind::Data,
                    &path,
                    Arc::clone(&DATA_SCHEMA),
                    source,
                    rows,
                    DataRecord::compact_key,
                    encode_data_batch,
                )?;
                report.files.push(written);
            }
            None => skip(&mut report, DepositKind::Data),
        }

        let annotations = self.config.take_annotations();
        match non_empty(annotations) {
            Some(source) => {
                let path = self.config.annotation_path().clone();
                let rows = self.config.writer_options().annotation_batch_rows();
                let registry = Arc::clone(self.config.registry());
                let schema = annotation_schema(&registry);
                let written = self.write_file(
                    DepositKind::Annotation,
                    &path,
                    Arc::clone(&schema),
                    source,
                    rows,
                    AnnotationRecord::compact_key,
                    |records| encode_annotation_batch(records, &registry, &schema),
                )?;
                report.files.push(written);
            }
            None => skip(&mut report, DepositKind::Annotation),
        }

        let index = DepositIndex::open(report.files.iter().map(|file| file.path.as_path()))?;
        Ok(BuildOutcome { index, report })
    }

    #[allow(clippy::too_many_arguments)]
    fn write_file<T, E>(
        &self,
        kind: DepositKind,
        path: &Path,
        schema: SchemaRef,
        mut source: Peekable<RecordSource<'a, T>>,
        batch_rows: usize,
        key: fn(&T) -> &CompactKey,
        encode: E,
    ) -> Result<WrittenFile, DepositError>
    where
        E: Fn(&[T]) -> Result<RecordBatch, DepositError>,
    {
        let options = self.config.writer_options();
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(options.writer_properties()))?;

        let explicit = self.config.catalog();
        let mut groups = BTreeSet::new();
        let mut rows = 0;
        let mut batches = 0;
        loop {
            let chunk: Vec<T> = source.by_ref().take(batch_rows).collect();
            if chunk.is_empty() {
                break;
            }
            let batch = encode(&chunk)?;
            writer.write(&batch)?;
            writer.flush()?;
            if explicit.is_none() {
                groups.extend(chunk.iter().map(|record| key(record).group_key()));
            }
            rows += chunk.len();
            batches += 1;
            log_debug!(
                component = "builder",
                event = "batch_written",
                kind = kind.data_type(),
                batch = batches,
                rows = chunk.len(),
            );
        }

        if let Some(keys) = explicit {
            groups = keys.iter().map(CompactKey::group_key).collect();
        }
        let catalog = Catalog::new(groups);
        let catalog_len = catalog.len();
        let footer = FooterMetadata::new(
            kind,
            catalog,
            Utc::now(),
            self.config.custom_metadata().clone(),
        );
        for entry in footer.to_key_values() {
            writer.append_key_value_metadata(entry);
        }
        writer.close()?;

        log_info!(
            component = "builder",
            event = "deposit_file_written",
            kind = kind.data_type(),
            path = %path.display(),
            rows = rows,
            batches = batches,
            catalog_len = catalog_len,
        );
        Ok(WrittenFile {
            kind,
            path: path.to_path_buf(),
            rows,
            batches,
            catalog_len,
        })
    }
}

fn non_empty<T>(source: Option<RecordSource<'_, T>>) -> Option<Peekable<RecordSource<'_, T>>> {
    let mut source = source?.peekable();
    source.peek()?;
    Some(source)
}

fn skip(report: &mut BuildReport, kind: DepositKind) {
    log_warn!(
        component = "builder",
        event = "empty_source_skipped",
        kind = kind.data_type(),
    );
    report.skipped.push(kind);
}
