// Repository traits for bucket and warehouse persistence
use crate::domain::bucket::{Bucket, UpsertOp};
use crate::domain::warehouse::WarehouseRef;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("malformed stored document: {0}")]
    Mapping(String),
}

/// A single rejected operation within a bulk call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpFailure {
    pub index: usize,
    pub reason: String,
}

/// Per-operation result of a bulk call that reached the store.
/// Operations not listed in `failures` were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub failures: Vec<OpFailure>,
}

impl BulkOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_indices(&self) -> HashSet<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

/// Bucket selection for read queries. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketFilter {
    pub vehicle_ids: Option<Vec<String>>,
    pub route_ids: Option<Vec<String>>,
}

impl BucketFilter {
    pub fn vehicles(vehicle_ids: Vec<String>) -> Self {
        Self {
            vehicle_ids: Some(vehicle_ids),
            route_ids: None,
        }
    }

    pub fn matches(&self, bucket: &Bucket) -> bool {
        let vehicle_ok = self
            .vehicle_ids
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|id| *id == bucket.vehicle_id));
        let route_ok = self
            .route_ids
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|id| *id == bucket.route_id));
        vehicle_ok && route_ok
    }
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Append one measurement to the open bucket of its vehicle+route, or
    /// create the bucket. Must be a single atomic store-side step.
    async fn upsert_measurement(&self, op: &UpsertOp) -> Result<(), StoreError>;

    /// Apply many upserts in one call; per-op failures are reported by index
    async fn bulk_upsert(&self, ops: &[UpsertOp]) -> Result<BulkOutcome, StoreError>;

    /// Matching buckets ordered by vehicle then `min_ts`
    async fn find_buckets(&self, filter: &BucketFilter) -> Result<Vec<Bucket>, StoreError>;

    /// Distinct vehicle ids with at least one bucket, sorted
    async fn list_vehicle_ids(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait WarehouseRepository: Send + Sync {
    async fn insert_warehouses(
        &self,
        warehouses: &[WarehouseRef],
    ) -> Result<BulkOutcome, StoreError>;

    async fn list_warehouses(&self) -> Result<Vec<WarehouseRef>, StoreError>;
}
