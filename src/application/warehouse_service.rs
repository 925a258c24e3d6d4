// Warehouse service - one-time reference import and listing
use crate::application::batch_writer::{BatchSink, BatchWriter};
use crate::application::bucket_store::{BulkOutcome, StoreError, WarehouseRepository};
use crate::domain::warehouse::{FeatureCollection, WarehouseRef};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid feature collection: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("import aborted after {written} warehouses: {failed} rejected by the store")]
    Write { written: usize, failed: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

struct WarehouseSink {
    repository: Arc<dyn WarehouseRepository>,
}

#[async_trait]
impl BatchSink<WarehouseRef> for WarehouseSink {
    fn name(&self) -> &str {
        "warehouses"
    }

    async fn write_batch(&self, batch: &[WarehouseRef]) -> Result<BulkOutcome, StoreError> {
        self.repository.insert_warehouses(batch).await
    }
}

#[derive(Clone)]
pub struct WarehouseService {
    repository: Arc<dyn WarehouseRepository>,
    batch_size: usize,
}

impl WarehouseService {
    pub fn new(repository: Arc<dyn WarehouseRepository>, batch_size: usize) -> Self {
        Self {
            repository,
            batch_size,
        }
    }

    pub async fn list_warehouses(&self) -> Result<Vec<WarehouseRef>, StoreError> {
        self.repository.list_warehouses().await
    }

    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary, ImportError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.import_bytes(&bytes).await
    }

    /// Import every point feature of a GeoJSON feature collection.
    ///
    /// Writes go out every `batch_size` records plus a final forced flush.
    /// The first rejected write aborts the import; nothing is retried.
    pub async fn import_bytes(&self, bytes: &[u8]) -> Result<ImportSummary, ImportError> {
        let collection: FeatureCollection = serde_json::from_slice(bytes)?;
        let sink = Arc::new(WarehouseSink {
            repository: self.repository.clone(),
        });
        let mut writer = BatchWriter::<WarehouseRef>::new(sink, self.batch_size, 1);
        let mut summary = ImportSummary::default();

        for (index, feature) in collection.features.into_iter().enumerate() {
            match WarehouseRef::from_feature(feature) {
                Some(warehouse) => writer.enqueue(warehouse),
                None => {
                    tracing::warn!(index, "Skipping feature without point coordinates");
                    summary.skipped += 1;
                    continue;
                }
            }

            let report = writer.flush(false).await;
            summary.imported += report.written;
            if !report.is_clean() {
                return Err(ImportError::Write {
                    written: summary.imported,
                    failed: report.dropped,
                });
            }
        }

        let report = writer.flush(true).await;
        summary.imported += report.written;
        if !report.is_clean() {
            return Err(ImportError::Write {
                written: summary.imported,
                failed: report.dropped,
            });
        }

        tracing::info!(
            imported = summary.imported,
            skipped = summary.skipped,
            "Warehouse import finished"
        );
        Ok(summary)
    }
}
