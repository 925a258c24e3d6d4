// In-memory bucket and warehouse store
use crate::application::bucket_store::{
    BucketFilter, BucketStore, BulkOutcome, StoreError, WarehouseRepository,
};
use crate::domain::bucket::{Bucket, UpsertOp};
use crate::domain::warehouse::WarehouseRef;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// Each upsert runs under one lock, so find-open-or-create is atomic
/// just like the conditional upsert in MongoDB.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<Vec<Bucket>>,
    warehouses: Mutex<Vec<WarehouseRef>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
}

fn apply(buckets: &mut Vec<Bucket>, op: &UpsertOp) {
    match buckets.iter_mut().find(|b| b.accepts(op)) {
        Some(bucket) => bucket.append(op.measurement.clone()),
        None => buckets.push(Bucket::open(op)),
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn upsert_measurement(&self, op: &UpsertOp) -> Result<(), StoreError> {
        let mut buckets = lock(&self.buckets)?;
        apply(&mut buckets, op);
        Ok(())
    }

    async fn bulk_upsert(&self, ops: &[UpsertOp]) -> Result<BulkOutcome, StoreError> {
        let mut buckets = lock(&self.buckets)?;
        for op in ops {
            apply(&mut buckets, op);
        }
        Ok(BulkOutcome::success())
    }

    async fn find_buckets(&self, filter: &BucketFilter) -> Result<Vec<Bucket>, StoreError> {
        let mut matching: Vec<Bucket> = lock(&self.buckets)?
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id).then(a.min_ts.cmp(&b.min_ts)));
        Ok(matching)
    }

    async fn list_vehicle_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = lock(&self.buckets)?
            .iter()
            .map(|b| b.vehicle_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl WarehouseRepository for MemoryStore {
    async fn insert_warehouses(
        &self,
        warehouses: &[WarehouseRef],
    ) -> Result<BulkOutcome, StoreError> {
        lock(&self.warehouses)?.extend_from_slice(warehouses);
        Ok(BulkOutcome::success())
    }

    async fn list_warehouses(&self) -> Result<Vec<WarehouseRef>, StoreError> {
        Ok(lock(&self.warehouses)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bucket::BUCKET_CAPACITY;
    use crate::domain::measurement::{GeoPoint, Measurement};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn ts(seq: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000, 0).unwrap() + Duration::seconds(seq)
    }

    fn op(vehicle: &str, route: &str, seq: i64) -> UpsertOp {
        UpsertOp::new(
            vehicle.to_string(),
            route.to_string(),
            Measurement::new(ts(seq), GeoPoint::new(7.0, 51.0), 60.0, 80.0, false),
        )
    }

    #[tokio::test]
    async fn test_up_to_capacity_fills_one_bucket() {
        let store = MemoryStore::default();
        for seq in 0..BUCKET_CAPACITY as i64 {
            store.upsert_measurement(&op("a", "R1", seq)).await.unwrap();
        }

        let buckets = store.find_buckets(&BucketFilter::default()).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].size, BUCKET_CAPACITY);
        assert_eq!(buckets[0].min_ts, ts(0));
        assert_eq!(buckets[0].max_ts, ts(BUCKET_CAPACITY as i64 - 1));
    }

    #[tokio::test]
    async fn test_overflow_opens_new_buckets() {
        let store = MemoryStore::default();
        let ops: Vec<UpsertOp> = (0..125).map(|seq| op("a", "R1", seq)).collect();
        store.bulk_upsert(&ops).await.unwrap();

        let buckets = store.find_buckets(&BucketFilter::default()).await.unwrap();
        let sizes: Vec<usize> = buckets.iter().map(|b| b.size).collect();
        assert_eq!(sizes, vec![60, 60, 5]);
        assert_eq!(buckets[1].min_ts, ts(60));
        assert_eq!(buckets[2].max_ts, ts(124));
    }

    #[tokio::test]
    async fn test_routes_get_separate_buckets() {
        let store = MemoryStore::default();
        store
            .bulk_upsert(&[op("a", "R1", 0), op("a", "R2", 1), op("a", "R1", 2)])
            .await
            .unwrap();

        let buckets = store.find_buckets(&BucketFilter::default()).await.unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].route_id, "R1");
        assert_eq!(buckets[0].size, 2);
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_exceed_capacity() {
        let store = Arc::new(MemoryStore::default());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..50 {
                    store
                        .upsert_measurement(&op("a", "R1", worker * 1000 + seq))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let buckets = store.find_buckets(&BucketFilter::default()).await.unwrap();
        let total: usize = buckets.iter().map(|b| b.size).sum();
        assert_eq!(total, 400);
        assert_eq!(buckets.len(), 400_usize.div_ceil(BUCKET_CAPACITY));
        assert!(buckets.iter().all(|b| b.size <= BUCKET_CAPACITY));
        assert_eq!(buckets.iter().filter(|b| b.is_open()).count(), 1);
    }

    #[tokio::test]
    async fn test_list_vehicle_ids_distinct_and_sorted() {
        let store = MemoryStore::default();
        store
            .bulk_upsert(&[op("b", "R1", 0), op("a", "R1", 1), op("b", "R2", 2)])
            .await
            .unwrap();
        assert_eq!(store.list_vehicle_ids().await.unwrap(), vec!["a", "b"]);
    }
}
